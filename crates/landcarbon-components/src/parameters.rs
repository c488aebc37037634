//! Parameters of the box-flow carbon calculators
//!
//! The default parameters describe a leaf in steady state: with constant land area and
//! the default soil time scale every pool keeps its initial stock.
//!
//! ```text
//!                 npp (per area)
//!   Atmosphere -----------------> [NPP] --1.0--> [VEGETATION]
//!       ^   ^                                         |
//!       |   |                                        0.1
//!       |   +--------0.5---------- [LITTER] <---------+
//!       |                             |
//!       |                            0.5
//!       |                             v
//!       +-------1/soil_time_scale-- [SOIL]
//! ```

use landcarbon_core::carbon_types::{BoxType, FlowType};
use landcarbon_core::errors::{CarbonError, CarbonResult};
use landcarbon_core::settings::CarbonSettings;
use landcarbon_core::timeseries::{FloatValue, Modeltime, PeriodVector, Year};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How the size of a flow is determined
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowRate {
    /// A fixed fraction of the source stock
    Fraction(FloatValue),
    /// The source stock divided by the soil time scale of the settings
    SoilTurnover,
    /// An amount of carbon per unit of land area.
    /// The rate may change over time and is interpolated between model periods.
    PerArea(PeriodVector),
}

impl FlowRate {
    /// Fraction of the source stock moved by a stock based rate, `None` for per-area rates
    pub fn stock_fraction(&self, settings: &CarbonSettings) -> Option<FloatValue> {
        match self {
            FlowRate::Fraction(fraction) => Some(*fraction),
            FlowRate::SoilTurnover => Some(1.0 / settings.soil_time_scale()),
            FlowRate::PerArea(_) => None,
        }
    }

    /// Per-area rate in `year`, `None` for stock based rates
    pub fn per_area(&self, modeltime: &Modeltime, year: Year) -> CarbonResult<Option<FloatValue>> {
        match self {
            FlowRate::PerArea(series) => series.value_at_year(modeltime, year).map(Some),
            _ => Ok(None),
        }
    }

    pub fn constant_per_area(value: FloatValue) -> Self {
        FlowRate::PerArea(PeriodVector::from(vec![value]))
    }
}

/// A rule moving carbon from one pool to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowDefinition {
    pub from: BoxType,
    pub to: BoxType,
    pub kind: FlowType,
    pub rate: FlowRate,
}

impl FlowDefinition {
    pub fn new(from: BoxType, to: BoxType, kind: FlowType, rate: FlowRate) -> Self {
        Self {
            from,
            to,
            kind,
            rate,
        }
    }

    fn validate(&self) -> CarbonResult<()> {
        let label = format!("flow {} -> {} ({})", self.from, self.to, self.kind);
        if self.from.is_wildcard() || self.to.is_wildcard() {
            return Err(CarbonError::invalid_parameter(
                &label,
                "flows must connect concrete pools",
            ));
        }
        if self.from == self.to {
            return Err(CarbonError::invalid_parameter(
                &label,
                "source and destination are the same pool",
            ));
        }
        if self.kind == FlowType::AnyFlow {
            return Err(CarbonError::invalid_parameter(
                &label,
                "the flow type must not be a wildcard",
            ));
        }
        if self.from == BoxType::Atmosphere && !matches!(self.rate, FlowRate::PerArea(_)) {
            // The atmosphere stock is unbounded and may be negative
            return Err(CarbonError::invalid_parameter(
                &label,
                "flows out of the atmosphere must use a per-area rate",
            ));
        }
        match &self.rate {
            FlowRate::Fraction(fraction) if !(0.0..=1.0).contains(fraction) => {
                Err(CarbonError::invalid_parameter(
                    &label,
                    format!("fraction {} is not within [0, 1]", fraction),
                ))
            }
            FlowRate::PerArea(series) if series.is_empty() => {
                Err(CarbonError::EmptySeries(label))
            }
            FlowRate::PerArea(series) if series.values().iter().any(|v| !v.is_finite() || *v < 0.0) => {
                Err(CarbonError::invalid_parameter(
                    &label,
                    "per-area rates must be finite and non-negative",
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Parameters of [`crate::carbon::BoxCarbonCalc`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxModelParameters {
    /// Initial carbon per unit of land area of each pool.
    /// Pools without an entry start empty.
    /// unit: carbon / area
    /// default: npp 0.5, vegetation 5.0, litter 0.5, soil 10.0
    pub densities: BTreeMap<BoxType, FloatValue>,

    /// Flow rules, applied every year to the stocks at the start of the year
    /// default: see the module documentation
    pub flows: Vec<FlowDefinition>,
}

impl Default for BoxModelParameters {
    fn default() -> Self {
        use BoxType::*;
        use FlowType::*;

        let densities = BTreeMap::from([
            (Npp, 0.5),
            (Vegetation, 5.0),
            (Litter, 0.5),
            // steady state at the default soil time scale of 40 years
            (Soil, 10.0),
        ]);

        let mut flows = vec![
            FlowDefinition::new(Atmosphere, Npp, BoxFlow, FlowRate::constant_per_area(0.5)),
            FlowDefinition::new(Npp, Vegetation, BoxFlow, FlowRate::Fraction(1.0)),
            FlowDefinition::new(Vegetation, Litter, BoxFlow, FlowRate::Fraction(0.1)),
            FlowDefinition::new(Litter, Soil, BoxFlow, FlowRate::Fraction(0.5)),
            FlowDefinition::new(Litter, Atmosphere, BoxFlow, FlowRate::Fraction(0.5)),
            FlowDefinition::new(Soil, Atmosphere, BoxFlow, FlowRate::SoilTurnover),
        ];
        // Land that is lost takes its share of every pool with it
        flows.extend(
            [Npp, Vegetation, Litter, Soil]
                .into_iter()
                .map(|pool| FlowDefinition::new(pool, Atmosphere, LucFlowOut, FlowRate::Fraction(1.0))),
        );
        flows.push(FlowDefinition::new(
            Atmosphere,
            Soil,
            LucFlowIn,
            FlowRate::constant_per_area(10.0),
        ));

        Self { densities, flows }
    }
}

impl BoxModelParameters {
    /// Initial density of a pool
    pub fn density(&self, box_type: BoxType) -> FloatValue {
        self.densities.get(&box_type).copied().unwrap_or(0.0)
    }

    pub fn validate(&self) -> CarbonResult<()> {
        validate_densities(&self.densities)?;
        self.flows.iter().try_for_each(FlowDefinition::validate)
    }
}

pub(crate) fn validate_densities(densities: &BTreeMap<BoxType, FloatValue>) -> CarbonResult<()> {
    for (box_type, density) in densities {
        if box_type.is_wildcard() {
            return Err(CarbonError::UnknownBoxName(box_type.to_string()));
        }
        if !density.is_finite() || *density < 0.0 {
            return Err(CarbonError::invalid_parameter(
                &format!("{} density", box_type),
                format!("{} is not a finite, non-negative value", density),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let parameters = BoxModelParameters::default();
        parameters.validate().unwrap();
        assert_eq!(parameters.density(BoxType::Soil), 10.0);
        assert_eq!(parameters.density(BoxType::Atmosphere), 0.0);
    }

    #[test]
    fn invalid_flows() {
        let mut parameters = BoxModelParameters::default();
        parameters.flows.push(FlowDefinition::new(
            BoxType::Soil,
            BoxType::Soil,
            FlowType::BoxFlow,
            FlowRate::Fraction(0.1),
        ));
        assert!(matches!(
            parameters.validate(),
            Err(CarbonError::InvalidParameter { .. })
        ));

        let flow = FlowDefinition::new(
            BoxType::Soil,
            BoxType::Atmosphere,
            FlowType::BoxFlow,
            FlowRate::Fraction(1.5),
        );
        assert!(flow.validate().is_err());

        let flow = FlowDefinition::new(
            BoxType::AnyBox,
            BoxType::Atmosphere,
            FlowType::BoxFlow,
            FlowRate::Fraction(0.5),
        );
        assert!(flow.validate().is_err());
    }

    #[test]
    fn atmosphere_outflows_need_a_per_area_rate() {
        for rate in [FlowRate::Fraction(0.5), FlowRate::SoilTurnover] {
            let flow =
                FlowDefinition::new(BoxType::Atmosphere, BoxType::Litter, FlowType::BoxFlow, rate);
            assert!(matches!(
                flow.validate(),
                Err(CarbonError::InvalidParameter { .. })
            ));
        }

        let flow = FlowDefinition::new(
            BoxType::Atmosphere,
            BoxType::Litter,
            FlowType::BoxFlow,
            FlowRate::constant_per_area(2.0),
        );
        flow.validate().unwrap();
    }

    #[test]
    fn negative_density() {
        let mut parameters = BoxModelParameters::default();
        parameters.densities.insert(BoxType::Litter, -1.0);
        assert!(parameters.validate().is_err());
    }

    #[test]
    fn stock_fractions() {
        let settings = CarbonSettings::default();
        assert_eq!(FlowRate::Fraction(0.3).stock_fraction(&settings), Some(0.3));
        assert_eq!(FlowRate::SoilTurnover.stock_fraction(&settings), Some(1.0 / 40.0));
        assert_eq!(FlowRate::constant_per_area(2.0).stock_fraction(&settings), None);
    }

    #[test]
    fn toml_round_trip() {
        let parameters = BoxModelParameters::default();
        let serialised = toml::to_string(&parameters).unwrap();
        let parsed: BoxModelParameters = toml::from_str(&serialised).unwrap();
        assert_eq!(parsed, parameters);
    }
}
