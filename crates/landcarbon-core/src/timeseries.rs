//! Model time and the two time series representations used by the carbon accounting.
//!
//! The surrounding model advances in discrete periods which map onto irregularly spaced
//! calendar years ([`Modeltime`]). Quantities solved by the land allocation are stored per
//! period ([`PeriodVector`]), while carbon stocks and flows are tracked every calendar year
//! ([`YearVector`]).
//!
//! ```rust
//! use landcarbon_core::timeseries::{Modeltime, PeriodVector, YearVector};
//!
//! let modeltime = Modeltime::new(vec![2005, 2010, 2020]).unwrap();
//! assert_eq!(modeltime.period_to_year(2), 2020);
//! assert_eq!(modeltime.year_to_period(2015), Some(2));
//!
//! let land = PeriodVector::from(vec![5.0, 15.0, 45.0]);
//! assert_eq!(land[1], 15.0);
//!
//! let stock = YearVector::from_values(2000, vec![10.0, 20.0, 30.0]).unwrap();
//! assert_eq!(stock.end_year(), 2002);
//! assert_eq!(stock.get(2001), Some(20.0));
//! ```

use crate::errors::{CarbonError, CarbonResult};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::ops::Index;

pub type FloatValue = f64;
/// A calendar year
pub type Year = u32;

/// Mapping between model periods and calendar years.
///
/// Each period is identified by the calendar year at which it ends.
/// Period years are strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Year>", into = "Vec<Year>")]
pub struct Modeltime {
    years: Vec<Year>,
}

impl Modeltime {
    /// Create a new model time from the calendar year of each period.
    ///
    /// Fails if no years are given or if the years are not strictly increasing.
    pub fn new(years: Vec<Year>) -> CarbonResult<Self> {
        if years.is_empty() {
            return Err(CarbonError::InvalidModeltime(
                "at least one period is required".to_string(),
            ));
        }
        if let Some(w) = years.windows(2).find(|w| w[0] >= w[1]) {
            return Err(CarbonError::InvalidModeltime(format!(
                "period years must be strictly increasing, found {} followed by {}",
                w[0], w[1]
            )));
        }
        Ok(Self { years })
    }

    pub fn num_periods(&self) -> usize {
        self.years.len()
    }

    /// Calendar year of the first period
    pub fn start_year(&self) -> Year {
        self.years[0]
    }

    /// Calendar year of the last period
    pub fn end_year(&self) -> Year {
        self.years[self.years.len() - 1]
    }

    /// Calendar year of a period
    ///
    /// # Panics
    /// Panics if `period` is not a valid period index.
    pub fn period_to_year(&self, period: usize) -> Year {
        self.years[period]
    }

    /// Period containing `year`.
    ///
    /// A period covers the years after the previous period's year up to and including its
    /// own year. Years at or before the first period belong to the first period.
    /// Returns `None` for years after the last period.
    pub fn year_to_period(&self, year: Year) -> Option<usize> {
        self.years.iter().position(|y| *y >= year)
    }

    /// Number of years between a period and the previous period.
    ///
    /// The first period has no previous period so `None` is returned.
    pub fn timestep(&self, period: usize) -> Option<Year> {
        if period == 0 || period >= self.years.len() {
            return None;
        }
        Some(self.years[period] - self.years[period - 1])
    }

    pub fn years(&self) -> &[Year] {
        &self.years
    }
}

impl TryFrom<Vec<Year>> for Modeltime {
    type Error = CarbonError;

    fn try_from(value: Vec<Year>) -> Result<Self, Self::Error> {
        Modeltime::new(value)
    }
}

impl From<Modeltime> for Vec<Year> {
    fn from(value: Modeltime) -> Self {
        value.years
    }
}

/// A value per model period.
///
/// The series may cover fewer periods than the model time. Lookups beyond its length are
/// handled by the interpolation functions, which hold the last value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<FloatValue>", into = "Vec<FloatValue>")]
pub struct PeriodVector {
    values: Array1<FloatValue>,
}

impl PeriodVector {
    pub fn new(values: Array1<FloatValue>) -> Self {
        Self { values }
    }

    /// A series with the same value in every one of `len` periods
    pub fn filled(len: usize, value: FloatValue) -> Self {
        Self::new(Array1::from_elem(len, value))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, period: usize) -> Option<FloatValue> {
        self.values.get(period).copied()
    }

    /// Set the value of an existing period
    pub fn set(&mut self, period: usize, value: FloatValue) -> CarbonResult<()> {
        let len = self.values.len();
        match self.values.get_mut(period) {
            Some(v) => {
                *v = value;
                Ok(())
            }
            None => Err(CarbonError::invalid_parameter(
                "period",
                format!("period {} is beyond the {} stored periods", period, len),
            )),
        }
    }

    pub fn values(&self) -> ArrayView1<FloatValue> {
        self.values.view()
    }
}

impl Index<usize> for PeriodVector {
    type Output = FloatValue;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl From<Vec<FloatValue>> for PeriodVector {
    fn from(value: Vec<FloatValue>) -> Self {
        Self::new(Array1::from(value))
    }
}

impl From<PeriodVector> for Vec<FloatValue> {
    fn from(value: PeriodVector) -> Self {
        value.values.to_vec()
    }
}

/// A dense value per calendar year over `[start_year, end_year]`.
///
/// Index `i` of the underlying storage corresponds to year `start_year + i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YearVector {
    start_year: Year,
    values: Array1<FloatValue>,
}

impl YearVector {
    /// Create a series covering `start_year..=end_year` where every year holds `fill`
    pub fn new(start_year: Year, end_year: Year, fill: FloatValue) -> CarbonResult<Self> {
        if start_year > end_year {
            return Err(CarbonError::InvertedYearBounds {
                start: start_year,
                end: end_year,
            });
        }
        let len = (end_year - start_year + 1) as usize;
        Ok(Self {
            start_year,
            values: Array1::from_elem(len, fill),
        })
    }

    /// Create a series from annual values starting at `start_year`
    pub fn from_values(start_year: Year, values: Vec<FloatValue>) -> CarbonResult<Self> {
        if values.is_empty() {
            return Err(CarbonError::EmptySeries(format!(
                "annual series starting in {}",
                start_year
            )));
        }
        Ok(Self {
            start_year,
            values: Array1::from(values),
        })
    }

    pub fn start_year(&self) -> Year {
        self.start_year
    }

    pub fn end_year(&self) -> Year {
        self.start_year + self.values.len() as Year - 1
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, year: Year) -> bool {
        year >= self.start_year && year <= self.end_year()
    }

    /// Value stored for `year`, if the year is covered
    pub fn get(&self, year: Year) -> Option<FloatValue> {
        if !self.contains(year) {
            return None;
        }
        self.values.get((year - self.start_year) as usize).copied()
    }

    pub fn set(&mut self, year: Year, value: FloatValue) -> CarbonResult<()> {
        if !self.contains(year) {
            return Err(CarbonError::YearOutOfRange {
                year,
                start: self.start_year,
                end: self.end_year(),
            });
        }
        self.values[(year - self.start_year) as usize] = value;
        Ok(())
    }

    /// Iterate over `(year, value)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (Year, FloatValue)> + '_ {
        self.values
            .iter()
            .enumerate()
            .map(move |(i, v)| (self.start_year + i as Year, *v))
    }

    pub fn values(&self) -> ArrayView1<FloatValue> {
        self.values.view()
    }
}
