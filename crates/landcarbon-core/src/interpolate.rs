//! Evaluate period and annual series at arbitrary calendar years.
//!
//! Period series are sparse, so years between two periods are linearly interpolated.
//! Annual series are dense and only need the year translated into an index.
//! Both clamp outside of their range rather than extrapolating.

use crate::errors::{CarbonError, CarbonResult};
use crate::timeseries::{FloatValue, Modeltime, PeriodVector, Year, YearVector};
use num::Float;

/// Linearly interpolate between `(x0, y0)` and `(x1, y1)` at `x`.
///
/// If the two points share an x-coordinate `y0` is returned.
pub fn linear_interpolate<T: Float>(x: T, x0: T, x1: T, y0: T, y1: T) -> T {
    let dx = x1 - x0;
    if dx == T::zero() {
        return y0;
    }
    y0 + (y1 - y0) * ((x - x0) / dx)
}

/// Value of a period series at a calendar year.
///
/// Years at or before the first period return the first value and years at or after
/// the last period covered by `series` return its last value. Otherwise the value is
/// interpolated between the two periods bracketing `year`.
///
/// # Errors
///
/// [`CarbonError::EmptySeries`] if `series` has no values.
pub fn interp_period_series(
    series: &PeriodVector,
    modeltime: &Modeltime,
    year: Year,
) -> CarbonResult<FloatValue> {
    if series.is_empty() {
        return Err(CarbonError::EmptySeries("period series".to_string()));
    }
    let last = series.len().min(modeltime.num_periods()) - 1;

    if year <= modeltime.period_to_year(0) {
        return Ok(series[0]);
    }
    if year >= modeltime.period_to_year(last) {
        return Ok(series[last]);
    }

    // The first period clamps above, so the period at or after `year` is at least 1
    for period in 1..=last {
        let upper_year = modeltime.period_to_year(period);
        if upper_year >= year {
            let lower_year = modeltime.period_to_year(period - 1);
            return Ok(linear_interpolate(
                year as FloatValue,
                lower_year as FloatValue,
                upper_year as FloatValue,
                series[period - 1],
                series[period],
            ));
        }
    }
    Ok(series[last])
}

/// Value of an annual series at a calendar year within `[start_year, end_year]`.
///
/// `year` is clamped to the bounds and the stored value for the clamped year returned.
///
/// # Errors
///
/// - [`CarbonError::EmptySeries`] if `series` has no values
/// - [`CarbonError::InvertedYearBounds`] if `start_year > end_year`
/// - [`CarbonError::YearOutOfRange`] if the clamped year is not stored in `series`
pub fn interp_year_series(
    series: &YearVector,
    start_year: Year,
    end_year: Year,
    year: Year,
) -> CarbonResult<FloatValue> {
    if series.is_empty() {
        return Err(CarbonError::EmptySeries("annual series".to_string()));
    }
    if start_year > end_year {
        return Err(CarbonError::InvertedYearBounds {
            start: start_year,
            end: end_year,
        });
    }
    let clamped = year.clamp(start_year, end_year);
    series
        .get(clamped)
        .ok_or_else(|| CarbonError::YearOutOfRange {
            year: clamped,
            start: series.start_year(),
            end: series.end_year(),
        })
}

impl PeriodVector {
    /// See [`interp_period_series`]
    pub fn value_at_year(&self, modeltime: &Modeltime, year: Year) -> CarbonResult<FloatValue> {
        interp_period_series(self, modeltime, year)
    }
}

impl YearVector {
    /// Value at `year`, clamped to the years covered by the series.
    pub fn value_at_year(&self, year: Year) -> CarbonResult<FloatValue> {
        interp_year_series(self, self.start_year(), self.end_year(), year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use is_close::is_close;

    fn modeltime() -> Modeltime {
        Modeltime::new(vec![2005, 2010, 2020]).unwrap()
    }

    #[test]
    fn linear() {
        assert_eq!(linear_interpolate(0.5, 0.0, 1.0, 10.0, 20.0), 15.0);
        assert_eq!(linear_interpolate(0.5_f32, 0.0, 1.0, 10.0, 20.0), 15.0);
        assert_eq!(linear_interpolate(3.0, 1.0, 1.0, 7.0, 9.0), 7.0);
    }

    #[test]
    fn period_series_interpolates() {
        let series = PeriodVector::from(vec![5.0, 15.0, 45.0]);
        let mt = modeltime();

        assert!(is_close!(interp_period_series(&series, &mt, 2015).unwrap(), 30.0));
        assert!(is_close!(interp_period_series(&series, &mt, 2007).unwrap(), 9.0));
        assert_eq!(interp_period_series(&series, &mt, 2010).unwrap(), 15.0);
    }

    #[test]
    fn period_series_clamps() {
        let series = PeriodVector::from(vec![5.0, 15.0, 45.0]);
        let mt = modeltime();

        assert_eq!(interp_period_series(&series, &mt, 1700).unwrap(), 5.0);
        assert_eq!(interp_period_series(&series, &mt, 2005).unwrap(), 5.0);
        assert_eq!(interp_period_series(&series, &mt, 2020).unwrap(), 45.0);
        assert_eq!(interp_period_series(&series, &mt, 2100).unwrap(), 45.0);
    }

    #[test]
    fn short_period_series_holds_last_value() {
        let series = PeriodVector::from(vec![5.0, 15.0]);
        let mt = modeltime();

        assert_eq!(series.value_at_year(&mt, 2015).unwrap(), 15.0);
        assert!(is_close!(series.value_at_year(&mt, 2008).unwrap(), 11.0));

        let constant = PeriodVector::from(vec![2.0]);
        assert_eq!(constant.value_at_year(&mt, 2012).unwrap(), 2.0);
    }

    #[test]
    fn empty_period_series() {
        let series = PeriodVector::from(vec![]);
        let err = interp_period_series(&series, &modeltime(), 2010).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::OutOfRange);
    }

    #[test]
    fn year_series_exact_and_clamped() {
        let series = YearVector::from_values(2000, vec![10.0, 20.0, 30.0]).unwrap();

        assert_eq!(interp_year_series(&series, 2000, 2002, 2001).unwrap(), 20.0);
        assert_eq!(interp_year_series(&series, 2000, 2002, 1999).unwrap(), 10.0);
        assert_eq!(interp_year_series(&series, 2000, 2002, 2010).unwrap(), 30.0);
        assert_eq!(series.value_at_year(2000).unwrap(), 10.0);
    }

    #[test]
    fn year_series_every_stored_year_is_exact() {
        let values: Vec<FloatValue> = (0..50).map(|i| (i as FloatValue).sin()).collect();
        let series = YearVector::from_values(1950, values.clone()).unwrap();

        for (i, expected) in values.iter().enumerate() {
            let year = 1950 + i as Year;
            assert_eq!(
                interp_year_series(&series, 1950, 1999, year).unwrap(),
                *expected
            );
        }
    }

    #[test]
    fn year_series_errors() {
        let series = YearVector::from_values(2000, vec![10.0, 20.0, 30.0]).unwrap();

        let err = interp_year_series(&series, 2002, 2000, 2001).unwrap_err();
        assert!(matches!(err, CarbonError::InvertedYearBounds { .. }));

        // Bounds wider than the stored data
        let err = interp_year_series(&series, 1990, 2010, 1995).unwrap_err();
        assert!(matches!(err, CarbonError::YearOutOfRange { year: 1995, .. }));
    }
}
