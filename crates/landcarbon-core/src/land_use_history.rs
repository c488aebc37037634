//! Historical land use and the land area used for carbon accounting.
//!
//! Carbon accounting starts long before the first model period, so the land area of a
//! land category in early years comes from a historical record. [`get_land_use`]
//! decides between the record and the land allocation solved by the model.

use crate::errors::{CarbonError, CarbonResult};
use crate::interpolate::{interp_period_series, linear_interpolate};
use crate::timeseries::{FloatValue, Modeltime, PeriodVector, Year};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Historical land area of a land category, by calendar year.
///
/// Values between recorded years are linearly interpolated and values outside of the
/// record hold the nearest recorded value. The last recorded year is the historical
/// cutoff after which the simulated land allocation takes over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<(Year, FloatValue)>", into = "Vec<(Year, FloatValue)>")]
pub struct LandUseHistory {
    allocations: BTreeMap<Year, FloatValue>,
}

impl LandUseHistory {
    /// Create a history from `(year, area)` records.
    ///
    /// Later records for the same year replace earlier ones.
    pub fn new(records: impl IntoIterator<Item = (Year, FloatValue)>) -> CarbonResult<Self> {
        let allocations: BTreeMap<Year, FloatValue> = records.into_iter().collect();
        if allocations.is_empty() {
            return Err(CarbonError::EmptySeries("land use history".to_string()));
        }
        if let Some((year, value)) = allocations.iter().find(|(_, v)| !v.is_finite() || **v < 0.0)
        {
            return Err(CarbonError::invalid_parameter(
                "land use history",
                format!("area of {} in {} is not a finite, non-negative value", value, year),
            ));
        }
        Ok(Self { allocations })
    }

    /// First recorded year
    pub fn min_year(&self) -> Year {
        self.allocations.keys().next().copied().unwrap_or_default()
    }

    /// Last recorded year, the historical cutoff
    pub fn max_year(&self) -> Year {
        self.allocations.keys().next_back().copied().unwrap_or_default()
    }

    /// Historical land area in `year`
    pub fn allocation(&self, year: Year) -> FloatValue {
        let before = self.allocations.range(..=year).next_back();
        let after = self.allocations.range(year..).next();

        match (before, after) {
            (Some((y0, v0)), Some((y1, v1))) => linear_interpolate(
                year as FloatValue,
                *y0 as FloatValue,
                *y1 as FloatValue,
                *v0,
                *v1,
            ),
            (Some((_, v)), None) | (None, Some((_, v))) => *v,
            (None, None) => 0.0,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Year, FloatValue)> + '_ {
        self.allocations.iter().map(|(y, v)| (*y, *v))
    }
}

impl TryFrom<Vec<(Year, FloatValue)>> for LandUseHistory {
    type Error = CarbonError;

    fn try_from(value: Vec<(Year, FloatValue)>) -> Result<Self, Self::Error> {
        LandUseHistory::new(value)
    }
}

impl From<LandUseHistory> for Vec<(Year, FloatValue)> {
    fn from(value: LandUseHistory) -> Self {
        value.allocations.into_iter().collect()
    }
}

/// Land area to use for carbon accounting in `year`.
///
/// The historical record and the simulated land allocation are combined with a fixed
/// share policy:
///
/// - Without a history, or with `historical_share == 0`, the simulated allocation is
///   interpolated to `year`.
/// - At or before the historical cutoff the record is used as is.
/// - After the cutoff the area is
///   `share * history(cutoff) + (1 - share) * simulated(year)`
///   so a share of 1 continues the historical area and a share of 0 follows the simulation.
///
/// # Errors
///
/// - [`CarbonError::InvalidParameter`] if `historical_share` is not within `[0, 1]`
/// - [`CarbonError::EmptySeries`] if the simulated allocation is needed but empty
pub fn get_land_use(
    year: Year,
    history: Option<&LandUseHistory>,
    historical_share: FloatValue,
    simulated: &PeriodVector,
    modeltime: &Modeltime,
) -> CarbonResult<FloatValue> {
    if !(0.0..=1.0).contains(&historical_share) {
        return Err(CarbonError::invalid_parameter(
            "historical_share",
            format!("{} is not within [0, 1]", historical_share),
        ));
    }

    let history = match history {
        Some(history) if historical_share > 0.0 => history,
        _ => return interp_period_series(simulated, modeltime, year),
    };

    let cutoff = history.max_year();
    if year <= cutoff {
        return Ok(history.allocation(year));
    }

    let simulated_value = interp_period_series(simulated, modeltime, year)?;
    Ok(historical_share * history.allocation(cutoff)
        + (1.0 - historical_share) * simulated_value)
}
