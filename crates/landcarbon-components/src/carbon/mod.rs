//! Carbon calculators
//!
//! Every land leaf owns one calculator. A calculator is created from its parameters,
//! initialised once the model time and settings are known, and is then asked to
//! calculate each model period in turn.

mod box_model;
mod ledger;
mod no_emissions;

pub use box_model::BoxCarbonCalc;
pub use ledger::{CarbonLedger, PoolFlows, PoolStocks};
pub use no_emissions::NoEmissCarbonCalc;

use crate::report::PeriodCarbonReport;
use landcarbon_core::carbon_types::{BoxType, FlowType};
use landcarbon_core::errors::{CarbonError, CarbonResult};
use landcarbon_core::land_tree::ConceptualRootKey;
use landcarbon_core::land_use_history::{get_land_use, LandUseHistory};
use landcarbon_core::settings::CarbonSettings;
use landcarbon_core::timeseries::{FloatValue, Modeltime, PeriodVector, Year};
use std::fmt::Debug;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Everything a calculator needs to know about the leaf it belongs to
#[derive(Debug, Clone, Copy)]
pub struct LeafContext<'a> {
    pub name: &'a str,
    pub conceptual_root: ConceptualRootKey,
    pub modeltime: &'a Modeltime,
    /// Land allocation solved by the model, per period
    pub simulated: &'a PeriodVector,
    pub history: Option<&'a LandUseHistory>,
    pub historical_share: FloatValue,
}

impl LeafContext<'_> {
    /// Land area of the leaf in `year`.
    ///
    /// Negative areas are treated as no land.
    pub fn land(&self, year: Year) -> CarbonResult<FloatValue> {
        get_land_use(
            year,
            self.history,
            self.historical_share,
            self.simulated,
            self.modeltime,
        )
        .map(|area| area.max(0.0))
    }
}

/// Calculates the carbon stocks and flows of a single land leaf.
#[typetag::serde(tag = "type")]
pub trait CarbonCalc: Debug + Send + Sync {
    /// Validate the parameters and seed the stocks at the first accounting year.
    ///
    /// Must be called before [`CarbonCalc::calc`]. Calling it again discards every
    /// calculated year.
    fn complete_init(
        &mut self,
        settings: Arc<CarbonSettings>,
        context: &LeafContext,
    ) -> CarbonResult<()>;

    /// Calculate every year up to and including the year of `period`.
    ///
    /// Periods must not go backwards. Calculating the most recent period again discards
    /// its years and recalculates them from the end of the previous period.
    fn calc(&mut self, period: usize, context: &LeafContext) -> CarbonResult<PeriodCarbonReport>;

    /// Last year with calculated results, `None` before initialisation
    fn calculated_through(&self) -> Option<Year>;

    /// Stock of `box_type` at the end of `year`
    fn stock(&self, box_type: BoxType, year: Year) -> CarbonResult<FloatValue>;

    /// Net flow of type `flow` into `box_type` during `year`
    fn net_flow(&self, box_type: BoxType, flow: FlowType, year: Year) -> CarbonResult<FloatValue>;

    /// Net flow of carbon from the land into the atmosphere during `year`
    fn net_emissions(&self, year: Year) -> CarbonResult<FloatValue> {
        self.net_flow(BoxType::Atmosphere, FlowType::AnyFlow, year)
    }
}

/// Calendar years covered by `period`.
///
/// A period spans the years after the previous period up to its own year. The first
/// period starts after the first accounting year.
pub fn period_years(
    modeltime: &Modeltime,
    settings: &CarbonSettings,
    period: usize,
) -> RangeInclusive<Year> {
    let first = match period {
        0 => settings.start_year() + 1,
        _ => modeltime.period_to_year(period - 1) + 1,
    };
    first..=modeltime.period_to_year(period)
}

/// Tracks which periods a calculator has processed
#[derive(Debug, Clone)]
pub(crate) struct PeriodCursor {
    current_period: Option<usize>,
    /// Last year with stored results
    last_year: Year,
}

impl PeriodCursor {
    pub fn new(start_year: Year) -> Self {
        Self {
            current_period: None,
            last_year: start_year,
        }
    }

    /// Years to calculate for `period`, rewinding if it is the current period
    pub fn advance(
        &mut self,
        category: &str,
        period: usize,
        modeltime: &Modeltime,
        settings: &CarbonSettings,
    ) -> CarbonResult<RangeInclusive<Year>> {
        if period >= modeltime.num_periods() {
            return Err(CarbonError::invalid_parameter(
                "period",
                format!(
                    "{} is not one of the {} model periods",
                    period,
                    modeltime.num_periods()
                ),
            ));
        }
        match self.current_period {
            Some(current) if period < current => {
                return Err(CarbonError::PeriodRegression {
                    category: category.to_string(),
                    requested: period,
                    current,
                });
            }
            Some(current) if period == current => {
                self.last_year = *period_years(modeltime, settings, period).start() - 1;
            }
            _ => {}
        }
        let years = (self.last_year + 1)..=modeltime.period_to_year(period);
        self.current_period = Some(period);
        Ok(years)
    }

    pub fn complete_year(&mut self, year: Year) {
        self.last_year = year;
    }

    pub fn last_year(&self) -> Year {
        self.last_year
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn years_of_each_period() {
        let modeltime = Modeltime::new(vec![1975, 1990, 2005]).unwrap();
        let settings = CarbonSettings::default();

        assert_eq!(period_years(&modeltime, &settings, 0), 1701..=1975);
        assert_eq!(period_years(&modeltime, &settings, 2), 1991..=2005);
    }

    #[test]
    fn cursor_rewinds_and_rejects_regression() {
        let modeltime = Modeltime::new(vec![1975, 1990, 2005]).unwrap();
        let settings = CarbonSettings::default();
        let mut cursor = PeriodCursor::new(settings.start_year());

        let years = cursor.advance("Forest", 0, &modeltime, &settings).unwrap();
        assert_eq!(years, 1701..=1975);
        cursor.complete_year(1975);

        let years = cursor.advance("Forest", 1, &modeltime, &settings).unwrap();
        assert_eq!(years, 1976..=1990);
        cursor.complete_year(1990);

        // Recalculating the current period starts again after the previous period
        let years = cursor.advance("Forest", 1, &modeltime, &settings).unwrap();
        assert_eq!(years, 1976..=1990);
        cursor.complete_year(1990);

        let err = cursor.advance("Forest", 0, &modeltime, &settings).unwrap_err();
        assert_eq!(
            err,
            CarbonError::PeriodRegression {
                category: "Forest".to_string(),
                requested: 0,
                current: 1
            }
        );
        assert!(cursor.advance("Forest", 3, &modeltime, &settings).is_err());
    }

    #[test]
    fn land_is_never_negative() {
        let modeltime = Modeltime::new(vec![2000, 2010]).unwrap();
        let simulated = PeriodVector::from(vec![10.0, -10.0]);
        let context = LeafContext {
            name: "Forest",
            conceptual_root: ConceptualRootKey::new(0),
            modeltime: &modeltime,
            simulated: &simulated,
            history: None,
            historical_share: 0.0,
        };
        assert_eq!(context.land(2005).unwrap(), 0.0);
        assert_eq!(context.land(2010).unwrap(), 0.0);
        assert_eq!(context.land(2000).unwrap(), 10.0);
    }
}
