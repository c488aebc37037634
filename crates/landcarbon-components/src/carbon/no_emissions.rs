use super::ledger::{CarbonLedger, PoolStocks};
use super::{CarbonCalc, LeafContext, PeriodCursor};
use crate::parameters::validate_densities;
use crate::report::PeriodCarbonReport;
use landcarbon_core::carbon_types::{BoxType, FlowType};
use landcarbon_core::errors::{CarbonError, CarbonResult};
use landcarbon_core::settings::CarbonSettings;
use landcarbon_core::timeseries::{FloatValue, Year};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Carbon calculator for land whose carbon is not accounted.
///
/// Stocks follow `density * area` every year. Carbon appearing or disappearing with the
/// area is not attributed to any flow, so the calculator never reports emissions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NoEmissCarbonCalc {
    /// Carbon per unit of land area of each pool
    densities: BTreeMap<BoxType, FloatValue>,
    #[serde(skip)]
    state: Option<(CarbonLedger, PeriodCursor, Arc<CarbonSettings>)>,
}

impl NoEmissCarbonCalc {
    pub fn new(densities: BTreeMap<BoxType, FloatValue>) -> Self {
        Self {
            densities,
            state: None,
        }
    }

    fn stocks_for_area(&self, area: FloatValue) -> PoolStocks {
        let mut stocks: PoolStocks = Default::default();
        for (stock, pool) in stocks.iter_mut().zip(BoxType::POOLS) {
            *stock = self.densities.get(&pool).copied().unwrap_or(0.0) * area;
        }
        stocks
    }

    fn ledger(&self) -> CarbonResult<&CarbonLedger> {
        self.state
            .as_ref()
            .map(|(ledger, _, _)| ledger)
            .ok_or_else(|| CarbonError::Uninitialized("no-emissions carbon calculator".to_string()))
    }
}

#[typetag::serde(name = "no-emissions")]
impl CarbonCalc for NoEmissCarbonCalc {
    fn complete_init(
        &mut self,
        settings: Arc<CarbonSettings>,
        context: &LeafContext,
    ) -> CarbonResult<()> {
        self.state = None;
        settings.validate_against(context.modeltime)?;
        validate_densities(&self.densities)?;

        let start_year = settings.start_year();
        let mut ledger = CarbonLedger::new(start_year, settings.end_year())?;
        let stocks = self.stocks_for_area(context.land(start_year)?);
        ledger.record_year(start_year, &stocks, &Default::default())?;
        self.state = Some((ledger, PeriodCursor::new(start_year), settings));
        Ok(())
    }

    fn calc(&mut self, period: usize, context: &LeafContext) -> CarbonResult<PeriodCarbonReport> {
        let Some((mut ledger, mut cursor, settings)) = self.state.take() else {
            return Err(CarbonError::Uninitialized(context.name.to_string()));
        };

        let result = cursor
            .advance(context.name, period, context.modeltime, &settings)
            .and_then(|years| {
                for year in years {
                    let stocks = self.stocks_for_area(context.land(year)?);
                    ledger.record_year(year, &stocks, &Default::default())?;
                    cursor.complete_year(year);
                }
                let year = context.modeltime.period_to_year(period);
                let mut report =
                    PeriodCarbonReport::new(context.name, context.conceptual_root, period, year);
                for pool in BoxType::POOLS {
                    report.stocks.insert(pool, ledger.stock(pool, year)?);
                    report.flows.insert(
                        pool,
                        FlowType::RECORDED.into_iter().map(|f| (f, 0.0)).collect(),
                    );
                }
                Ok(report)
            });

        self.state = Some((ledger, cursor, settings));
        result
    }

    fn calculated_through(&self) -> Option<Year> {
        self.state.as_ref().map(|(_, cursor, _)| cursor.last_year())
    }

    fn stock(&self, box_type: BoxType, year: Year) -> CarbonResult<FloatValue> {
        self.ledger()?.stock(box_type, year)
    }

    fn net_flow(&self, box_type: BoxType, flow: FlowType, year: Year) -> CarbonResult<FloatValue> {
        self.ledger()?.net_flow(box_type, flow, year)
    }
}
