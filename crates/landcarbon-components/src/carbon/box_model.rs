//! Box-flow carbon calculator
//!
//! Stocks are advanced one calendar year at a time in two steps. Land-use change rules are
//! sized from the stocks at the start of the year and applied, then the box flow rules are
//! sized from the stocks that remain. Within a step the order of the rules does not
//! matter.
//!
//! # Land-use change
//!
//! With `A0` the area in the previous year and `A1` the area this year:
//!
//! - `luc-flow-out` rules only act when land is lost. A stock rule with fraction `f` moves
//!   `f * (A0 - A1) / A0 * S`, a per-area rule moves `r * (A0 - A1)`.
//! - `luc-flow-in` rules only act when land is gained. A per-area rule moves
//!   `r * (A1 - A0)`, a stock rule moves `f * (A1 - A0) / A0 * S`.
//! - `luc-flow` rules act in whichever direction the area changed and are recorded under
//!   the matching directional flow type.

use super::ledger::{CarbonLedger, PoolFlows, PoolStocks};
use super::{period_years, CarbonCalc, LeafContext, PeriodCursor};
use crate::parameters::{BoxModelParameters, FlowDefinition};
use crate::report::{CarbonDiagnostic, PeriodCarbonReport};
use landcarbon_core::carbon_types::{BoxType, FlowType};
use landcarbon_core::errors::{CarbonError, CarbonResult};
use landcarbon_core::settings::CarbonSettings;
use landcarbon_core::timeseries::{FloatValue, Modeltime, Year};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Relative tolerance of the carbon conservation check
const CONSERVATION_TOLERANCE: FloatValue = 1e-9;

/// Carbon calculator that moves carbon between pools with configurable flow rules.
///
/// The atmosphere pool is the exchange ledger of the leaf with the global atmosphere.
/// Its stock is not bounded below, so it can supply any amount of carbon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxCarbonCalc {
    parameters: BoxModelParameters,
    #[serde(skip)]
    state: Option<ActiveState>,
}

#[derive(Debug, Clone)]
struct ActiveState {
    category: String,
    settings: Arc<CarbonSettings>,
    ledger: CarbonLedger,
    cursor: PeriodCursor,
}

/// A planned movement of carbon during a year
#[derive(Debug, Clone, Copy)]
struct Transfer {
    from: usize,
    to: usize,
    /// Position in [`FlowType::RECORDED`]
    flow: usize,
    amount: FloatValue,
}

impl Default for BoxCarbonCalc {
    fn default() -> Self {
        Self::from_parameters(BoxModelParameters::default())
    }
}

impl BoxCarbonCalc {
    pub fn from_parameters(parameters: BoxModelParameters) -> Self {
        Self {
            parameters,
            state: None,
        }
    }

    pub fn parameters(&self) -> &BoxModelParameters {
        &self.parameters
    }

    pub fn is_initialised(&self) -> bool {
        self.state.is_some()
    }

    fn active(&self) -> CarbonResult<&ActiveState> {
        self.state
            .as_ref()
            .ok_or_else(|| CarbonError::Uninitialized("box carbon calculator".to_string()))
    }

    /// Size of a single flow rule for one year, or `None` if the rule does not apply.
    ///
    /// Returns the amount and the recorded flow type.
    fn plan_flow(
        flow: &FlowDefinition,
        stocks: &PoolStocks,
        previous_area: FloatValue,
        area: FloatValue,
        settings: &CarbonSettings,
        modeltime: &Modeltime,
        year: Year,
    ) -> CarbonResult<Option<(FloatValue, FlowType)>> {
        let from = flow.from.index().unwrap_or_default();
        let stock = stocks[from].max(0.0);
        let fraction = flow.rate.stock_fraction(settings);
        let per_area = flow.rate.per_area(modeltime, year)?;

        let kind = match flow.kind {
            FlowType::LucFlow if area < previous_area => FlowType::LucFlowOut,
            FlowType::LucFlow if area > previous_area => FlowType::LucFlowIn,
            other => other,
        };

        let amount = match kind {
            FlowType::BoxFlow => match (fraction, per_area) {
                (Some(fraction), _) => fraction * stock,
                (None, Some(rate)) => rate * area,
                (None, None) => 0.0,
            },
            FlowType::LucFlowOut if area < previous_area => {
                let lost = previous_area - area;
                match (fraction, per_area) {
                    (Some(fraction), _) => fraction * (lost / previous_area) * stock,
                    (None, Some(rate)) => rate * lost,
                    (None, None) => 0.0,
                }
            }
            FlowType::LucFlowIn if area > previous_area => {
                let gained = area - previous_area;
                match (fraction, per_area) {
                    // Nothing to scale from when the leaf had no land
                    (Some(_), _) if previous_area <= 0.0 => 0.0,
                    (Some(fraction), _) => fraction * (gained / previous_area) * stock,
                    (None, Some(rate)) => rate * gained,
                    (None, None) => 0.0,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some((amount.max(0.0), kind)))
    }

    /// Scale down outflows that would overdraw a land pool
    fn limit_outflows(
        state: &ActiveState,
        period: usize,
        year: Year,
        stocks: &PoolStocks,
        transfers: &mut [Transfer],
        diagnostics: &mut Vec<CarbonDiagnostic>,
    ) {
        for (pool, box_type) in BoxType::POOLS.iter().enumerate() {
            if *box_type == BoxType::Atmosphere {
                continue;
            }
            let requested: FloatValue = transfers
                .iter()
                .filter(|t| t.from == pool)
                .map(|t| t.amount)
                .sum();
            let available = stocks[pool].max(0.0);
            if requested <= available {
                continue;
            }
            warn!(
                category = %state.category,
                period,
                year,
                box_type = %box_type,
                requested,
                available,
                "Outflows exceed the available stock and were scaled down"
            );
            diagnostics.push(CarbonDiagnostic::NegativeStock {
                period,
                year,
                box_type: *box_type,
                requested,
                available,
            });
            let scale = available / requested;
            transfers
                .iter_mut()
                .filter(|t| t.from == pool)
                .for_each(|t| t.amount *= scale);
        }
    }

    /// Advance the stocks by one year.
    ///
    /// Land-use change is applied first, then the box flows act on what remains.
    fn step_year(
        &self,
        state: &ActiveState,
        context: &LeafContext,
        period: usize,
        year: Year,
        diagnostics: &mut Vec<CarbonDiagnostic>,
    ) -> CarbonResult<(PoolStocks, PoolFlows)> {
        let start = state.ledger.pool_stocks(year - 1)?;
        let previous_area = context.land(year - 1)?;
        let area = context.land(year)?;

        let mut stocks = start;
        let mut flows: PoolFlows = Default::default();
        for land_use_change in [true, false] {
            let mut transfers = Vec::new();
            for flow in self
                .parameters
                .flows
                .iter()
                .filter(|f| f.kind.is_land_use_change() == land_use_change)
            {
                let planned = Self::plan_flow(
                    flow,
                    &stocks,
                    previous_area,
                    area,
                    &state.settings,
                    context.modeltime,
                    year,
                )?;
                if let Some((amount, kind)) = planned {
                    transfers.push(Transfer {
                        from: flow.from.index().unwrap_or_default(),
                        to: flow.to.index().unwrap_or_default(),
                        flow: kind.recorded_index().unwrap_or_default(),
                        amount,
                    });
                }
            }

            Self::limit_outflows(state, period, year, &stocks, &mut transfers, diagnostics);
            for transfer in &transfers {
                stocks[transfer.from] -= transfer.amount;
                stocks[transfer.to] += transfer.amount;
                flows[transfer.from][transfer.flow] -= transfer.amount;
                flows[transfer.to][transfer.flow] += transfer.amount;
            }
        }

        let before: FloatValue = start.iter().sum();
        let after: FloatValue = stocks.iter().sum();
        let tolerance = CONSERVATION_TOLERANCE * before.abs().max(1.0);
        if !((after - before).abs() <= tolerance) {
            warn!(
                category = %state.category,
                period,
                year,
                before,
                after,
                "Total carbon was not conserved"
            );
            diagnostics.push(CarbonDiagnostic::ConservationViolation {
                period,
                year,
                before,
                after,
            });
        }

        Ok((stocks, flows))
    }

    fn build_report(
        &self,
        state: &ActiveState,
        context: &LeafContext,
        period: usize,
        diagnostics: Vec<CarbonDiagnostic>,
    ) -> CarbonResult<PeriodCarbonReport> {
        let year = context.modeltime.period_to_year(period);
        let mut report =
            PeriodCarbonReport::new(context.name, context.conceptual_root, period, year);

        for pool in BoxType::POOLS {
            report.stocks.insert(pool, state.ledger.stock(pool, year)?);
            let mut flows = BTreeMap::new();
            for flow in FlowType::RECORDED {
                let mut total = 0.0;
                for y in period_years(context.modeltime, &state.settings, period) {
                    total += state.ledger.net_flow(pool, flow, y)?;
                }
                flows.insert(flow, total);
            }
            report.flows.insert(pool, flows);
        }
        report.net_emissions = report.net_flow(BoxType::Atmosphere, FlowType::AnyFlow);
        report.diagnostics = diagnostics;
        Ok(report)
    }
}

#[typetag::serde(name = "box")]
impl CarbonCalc for BoxCarbonCalc {
    fn complete_init(
        &mut self,
        settings: Arc<CarbonSettings>,
        context: &LeafContext,
    ) -> CarbonResult<()> {
        self.state = None;
        settings.validate_against(context.modeltime)?;
        self.parameters.validate()?;

        let start_year = settings.start_year();
        let area = context.land(start_year)?;
        let mut stocks: PoolStocks = Default::default();
        for (stock, pool) in stocks.iter_mut().zip(BoxType::POOLS) {
            *stock = self.parameters.density(pool) * area;
        }

        let mut ledger = CarbonLedger::new(start_year, settings.end_year())?;
        ledger.record_year(start_year, &stocks, &Default::default())?;
        debug!(
            category = context.name,
            start_year,
            area,
            "Initialised box carbon calculator"
        );

        self.state = Some(ActiveState {
            category: context.name.to_string(),
            cursor: PeriodCursor::new(start_year),
            settings,
            ledger,
        });
        Ok(())
    }

    fn calc(&mut self, period: usize, context: &LeafContext) -> CarbonResult<PeriodCarbonReport> {
        let mut state = match self.state.take() {
            Some(state) => state,
            None => return Err(CarbonError::Uninitialized(context.name.to_string())),
        };
        let result = self.calc_period(&mut state, period, context);
        self.state = Some(state);
        result
    }

    fn calculated_through(&self) -> Option<Year> {
        self.state.as_ref().map(|state| state.cursor.last_year())
    }

    fn stock(&self, box_type: BoxType, year: Year) -> CarbonResult<FloatValue> {
        self.active()?.ledger.stock(box_type, year)
    }

    fn net_flow(&self, box_type: BoxType, flow: FlowType, year: Year) -> CarbonResult<FloatValue> {
        self.active()?.ledger.net_flow(box_type, flow, year)
    }
}

impl BoxCarbonCalc {
    fn calc_period(
        &self,
        state: &mut ActiveState,
        period: usize,
        context: &LeafContext,
    ) -> CarbonResult<PeriodCarbonReport> {
        let years = state.cursor.advance(
            &state.category,
            period,
            context.modeltime,
            &state.settings,
        )?;

        let mut diagnostics = Vec::new();
        for year in years {
            let (stocks, flows) = self.step_year(state, context, period, year, &mut diagnostics)?;
            state.ledger.record_year(year, &stocks, &flows)?;
            state.cursor.complete_year(year);
        }
        self.build_report(state, context, period, diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameters::FlowRate;
    use approx::assert_relative_eq;
    use landcarbon_core::land_tree::ConceptualRootKey;
    use landcarbon_core::timeseries::PeriodVector;

    fn modeltime() -> Modeltime {
        Modeltime::new(vec![1975, 1990, 2005]).unwrap()
    }

    fn context<'a>(modeltime: &'a Modeltime, simulated: &'a PeriodVector) -> LeafContext<'a> {
        LeafContext {
            name: "Forest",
            conceptual_root: ConceptualRootKey::new(0),
            modeltime,
            simulated,
            history: None,
            historical_share: 0.0,
        }
    }

    fn initialised(simulated: &PeriodVector, modeltime: &Modeltime) -> BoxCarbonCalc {
        let mut calc = BoxCarbonCalc::default();
        calc.complete_init(
            Arc::new(CarbonSettings::default()),
            &context(modeltime, simulated),
        )
        .unwrap();
        calc
    }

    #[test]
    fn requires_init() {
        let modeltime = modeltime();
        let simulated = PeriodVector::from(vec![1.0]);
        let mut calc = BoxCarbonCalc::default();

        assert!(matches!(
            calc.calc(0, &context(&modeltime, &simulated)),
            Err(CarbonError::Uninitialized(_))
        ));
        assert!(matches!(
            calc.stock(BoxType::Soil, 1700),
            Err(CarbonError::Uninitialized(_))
        ));
    }

    #[test]
    fn seeds_stocks_from_density() {
        let modeltime = modeltime();
        let simulated = PeriodVector::from(vec![2.0, 2.0, 2.0]);
        let calc = initialised(&simulated, &modeltime);

        assert_eq!(calc.stock(BoxType::Vegetation, 1700).unwrap(), 10.0);
        assert_eq!(calc.stock(BoxType::Soil, 1700).unwrap(), 20.0);
        assert_eq!(calc.stock(BoxType::Atmosphere, 1700).unwrap(), 0.0);
        assert_eq!(calc.stock(BoxType::AnyBox, 1700).unwrap(), 32.0);
    }

    #[test]
    fn steady_state_with_constant_land() {
        let modeltime = modeltime();
        let simulated = PeriodVector::from(vec![3.0, 3.0, 3.0]);
        let mut calc = initialised(&simulated, &modeltime);
        let ctx = context(&modeltime, &simulated);

        for period in 0..3 {
            let report = calc.calc(period, &ctx).unwrap();
            assert!(!report.has_diagnostics());
            assert_relative_eq!(report.stock(BoxType::AnyBox), 48.0, max_relative = 1e-9);
            assert_relative_eq!(report.net_emissions, 0.0, epsilon = 1e-9);
        }
        assert_relative_eq!(calc.stock(BoxType::Soil, 2005).unwrap(), 30.0, max_relative = 1e-9);
    }

    #[test]
    fn losing_all_land_releases_all_carbon() {
        let modeltime = modeltime();
        let simulated = PeriodVector::from(vec![1.0, 1.0, 0.0]);
        let mut calc = initialised(&simulated, &modeltime);
        let ctx = context(&modeltime, &simulated);

        for period in 0..3 {
            calc.calc(period, &ctx).unwrap();
        }
        assert_relative_eq!(calc.stock(BoxType::AnyBox, 2005).unwrap(), 0.0, epsilon = 1e-12);
        // Everything that was on the land is now in the atmosphere ledger
        let released: FloatValue = (1991..=2005)
            .map(|y| calc.net_flow(BoxType::Atmosphere, FlowType::LucFlowOut, y).unwrap())
            .sum();
        assert!(released > 0.0);
        assert_relative_eq!(calc.stock(BoxType::Atmosphere, 2005).unwrap(), 16.0, max_relative = 1e-9);
    }

    #[test]
    fn recalculating_is_idempotent() {
        let modeltime = modeltime();
        let mut simulated = PeriodVector::from(vec![1.0, 2.0, 2.0]);
        let mut calc = initialised(&simulated, &modeltime);

        calc.calc(0, &context(&modeltime, &simulated)).unwrap();
        let first = calc.calc(1, &context(&modeltime, &simulated)).unwrap();
        let again = calc.calc(1, &context(&modeltime, &simulated)).unwrap();
        assert_eq!(first, again);

        // A new land allocation for the current period replaces the previous result
        simulated.set(1, 4.0).unwrap();
        let changed = calc.calc(1, &context(&modeltime, &simulated)).unwrap();
        assert!(changed.stock(BoxType::Soil) > first.stock(BoxType::Soil));

        let err = calc.calc(0, &context(&modeltime, &simulated)).unwrap_err();
        assert!(matches!(err, CarbonError::PeriodRegression { requested: 0, current: 1, .. }));
    }

    #[test]
    fn overdrawn_pool_is_scaled_and_reported() {
        let modeltime = modeltime();
        let simulated = PeriodVector::from(vec![1.0, 1.0, 1.0]);
        let parameters = BoxModelParameters {
            densities: BTreeMap::from([(BoxType::Vegetation, 1.0)]),
            flows: vec![
                FlowDefinition::new(
                    BoxType::Vegetation,
                    BoxType::Atmosphere,
                    FlowType::BoxFlow,
                    FlowRate::constant_per_area(5.0),
                ),
                FlowDefinition::new(
                    BoxType::Vegetation,
                    BoxType::Litter,
                    FlowType::BoxFlow,
                    FlowRate::Fraction(0.0),
                ),
            ],
        };
        let mut calc = BoxCarbonCalc::from_parameters(parameters);
        let ctx = context(&modeltime, &simulated);
        calc.complete_init(Arc::new(CarbonSettings::default()), &ctx)
            .unwrap();

        let report = calc.calc(0, &ctx).unwrap();
        assert_eq!(calc.stock(BoxType::Vegetation, 1701).unwrap(), 0.0);
        assert_eq!(calc.stock(BoxType::Atmosphere, 1701).unwrap(), 1.0);
        assert!(matches!(
            report.diagnostics[0],
            CarbonDiagnostic::NegativeStock {
                period: 0,
                year: 1701,
                box_type: BoxType::Vegetation,
                ..
            }
        ));
        assert!(report
            .diagnostics
            .iter()
            .all(|d| !matches!(d, CarbonDiagnostic::ConservationViolation { .. })));
    }

    #[test]
    fn land_pools_never_fed_from_atmosphere_stock() {
        let modeltime = modeltime();
        let simulated = PeriodVector::from(vec![1.0, 1.0, 1.0]);
        let ctx = context(&modeltime, &simulated);
        let flows = |atmosphere_to_litter: FlowRate| {
            vec![
                FlowDefinition::new(
                    BoxType::Vegetation,
                    BoxType::Atmosphere,
                    FlowType::BoxFlow,
                    FlowRate::Fraction(0.5),
                ),
                FlowDefinition::new(
                    BoxType::Atmosphere,
                    BoxType::Npp,
                    FlowType::BoxFlow,
                    FlowRate::constant_per_area(2.0),
                ),
                FlowDefinition::new(
                    BoxType::Atmosphere,
                    BoxType::Litter,
                    FlowType::BoxFlow,
                    atmosphere_to_litter,
                ),
            ]
        };

        let mut calc = BoxCarbonCalc::from_parameters(BoxModelParameters {
            densities: BTreeMap::from([(BoxType::Vegetation, 1.0)]),
            flows: flows(FlowRate::Fraction(0.5)),
        });
        let err = calc
            .complete_init(Arc::new(CarbonSettings::default()), &ctx)
            .unwrap_err();
        assert!(matches!(err, CarbonError::InvalidParameter { .. }));

        let mut calc = BoxCarbonCalc::from_parameters(BoxModelParameters {
            densities: BTreeMap::from([(BoxType::Vegetation, 1.0)]),
            flows: flows(FlowRate::constant_per_area(0.5)),
        });
        calc.complete_init(Arc::new(CarbonSettings::default()), &ctx)
            .unwrap();
        for period in 0..3 {
            let report = calc.calc(period, &ctx).unwrap();
            assert!(!report.has_diagnostics());
        }
        for year in 1700..=2005 {
            for pool in [BoxType::Npp, BoxType::Vegetation, BoxType::Litter, BoxType::Soil] {
                assert!(calc.stock(pool, year).unwrap() >= 0.0, "{} in {}", pool, year);
            }
        }
        assert_relative_eq!(
            calc.stock(BoxType::Litter, 1705).unwrap(),
            2.5,
            max_relative = 1e-9
        );
    }

    #[test]
    fn gained_land_brings_soil_carbon() {
        let modeltime = modeltime();
        let simulated = PeriodVector::from(vec![1.0, 1.0, 2.0]);
        let mut calc = initialised(&simulated, &modeltime);
        let ctx = context(&modeltime, &simulated);

        calc.calc(0, &ctx).unwrap();
        calc.calc(1, &ctx).unwrap();
        let report = calc.calc(2, &ctx).unwrap();

        assert_relative_eq!(
            report.net_flow(BoxType::Soil, FlowType::LucFlowIn),
            10.0,
            max_relative = 1e-9
        );
        assert_relative_eq!(
            report.net_flow(BoxType::AnyBox, FlowType::LucFlow),
            10.0,
            max_relative = 1e-9
        );
        assert_eq!(report.net_flow(BoxType::AnyBox, FlowType::LucFlowOut), 0.0);
    }

    #[test]
    fn invalid_settings_fail_init() {
        let modeltime = Modeltime::new(vec![1600, 1700]).unwrap();
        let simulated = PeriodVector::from(vec![1.0]);
        let mut calc = BoxCarbonCalc::default();
        let err = calc
            .complete_init(
                Arc::new(CarbonSettings::default()),
                &context(&modeltime, &simulated),
            )
            .unwrap_err();
        assert!(matches!(err, CarbonError::InvalidParameter { .. }));
        assert!(!calc.is_initialised());
    }

    #[test]
    fn serialises_parameters_only() {
        let calc: Box<dyn CarbonCalc> = Box::new(BoxCarbonCalc::default());
        let json = serde_json::to_string(&calc).unwrap();
        assert!(json.starts_with(r#"{"type":"box""#));

        let parsed: Box<dyn CarbonCalc> = serde_json::from_str(&json).unwrap();
        assert!(matches!(
            parsed.stock(BoxType::Soil, 1700),
            Err(CarbonError::Uninitialized(_))
        ));
    }
}
