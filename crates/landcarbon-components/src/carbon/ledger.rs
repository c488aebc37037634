use landcarbon_core::carbon_types::{BoxType, FlowType};
use landcarbon_core::errors::{CarbonError, CarbonResult};
use landcarbon_core::timeseries::{FloatValue, Year, YearVector};

const NUM_POOLS: usize = BoxType::POOLS.len();
const NUM_FLOWS: usize = FlowType::RECORDED.len();

/// Stock of every pool at one point in time, indexed like [`BoxType::POOLS`]
pub type PoolStocks = [FloatValue; NUM_POOLS];

/// Net flow into every pool for every recorded flow type during one year
pub type PoolFlows = [[FloatValue; NUM_FLOWS]; NUM_POOLS];

/// Annual stocks and net flows of one leaf over the accounting years
#[derive(Debug, Clone)]
pub struct CarbonLedger {
    stocks: Vec<YearVector>,
    /// `flows[pool][flow]`
    flows: Vec<Vec<YearVector>>,
}

impl CarbonLedger {
    pub fn new(start_year: Year, end_year: Year) -> CarbonResult<Self> {
        let stocks = (0..NUM_POOLS)
            .map(|_| YearVector::new(start_year, end_year, 0.0))
            .collect::<CarbonResult<Vec<_>>>()?;
        let flows = (0..NUM_POOLS)
            .map(|_| {
                (0..NUM_FLOWS)
                    .map(|_| YearVector::new(start_year, end_year, 0.0))
                    .collect::<CarbonResult<Vec<_>>>()
            })
            .collect::<CarbonResult<Vec<_>>>()?;
        Ok(Self { stocks, flows })
    }

    pub fn start_year(&self) -> Year {
        self.stocks[0].start_year()
    }

    pub fn end_year(&self) -> Year {
        self.stocks[0].end_year()
    }

    fn check_year(&self, year: Year) -> CarbonResult<()> {
        if self.stocks[0].contains(year) {
            Ok(())
        } else {
            Err(CarbonError::YearOutOfRange {
                year,
                start: self.start_year(),
                end: self.end_year(),
            })
        }
    }

    /// Stocks of every pool at the end of `year`
    pub fn pool_stocks(&self, year: Year) -> CarbonResult<PoolStocks> {
        self.check_year(year)?;
        let mut stocks = [0.0; NUM_POOLS];
        for (stock, series) in stocks.iter_mut().zip(&self.stocks) {
            *stock = series.get(year).unwrap_or_default();
        }
        Ok(stocks)
    }

    /// Store the stocks at the end of `year` and the net flows that occurred during it
    pub fn record_year(
        &mut self,
        year: Year,
        stocks: &PoolStocks,
        flows: &PoolFlows,
    ) -> CarbonResult<()> {
        for (series, value) in self.stocks.iter_mut().zip(stocks) {
            series.set(year, *value)?;
        }
        for (pool_series, pool_flows) in self.flows.iter_mut().zip(flows) {
            for (series, value) in pool_series.iter_mut().zip(pool_flows) {
                series.set(year, *value)?;
            }
        }
        Ok(())
    }

    /// Stock of `box_type` at the end of `year`.
    ///
    /// [`BoxType::AnyBox`] sums every land pool.
    pub fn stock(&self, box_type: BoxType, year: Year) -> CarbonResult<FloatValue> {
        let stocks = self.pool_stocks(year)?;
        Ok(BoxType::POOLS
            .iter()
            .zip(stocks)
            .filter(|(pool, _)| box_type.matches(**pool))
            .map(|(_, stock)| stock)
            .sum())
    }

    /// Net flow of type `flow` into `box_type` during `year`.
    ///
    /// Wildcards on either side sum every matching pool and flow type.
    pub fn net_flow(&self, box_type: BoxType, flow: FlowType, year: Year) -> CarbonResult<FloatValue> {
        self.check_year(year)?;
        let mut total = 0.0;
        for (pool, pool_series) in BoxType::POOLS.iter().zip(&self.flows) {
            if !box_type.matches(*pool) {
                continue;
            }
            for (recorded, series) in FlowType::RECORDED.iter().zip(pool_series) {
                if flow.matches(*recorded) {
                    total += series.get(year).unwrap_or_default();
                }
            }
        }
        Ok(total)
    }
}
