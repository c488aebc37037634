//! Process-wide carbon accounting settings.

use crate::errors::{CarbonError, CarbonResult};
use crate::timeseries::{FloatValue, Modeltime, Year};
use serde::{Deserialize, Serialize};

/// Settings shared by every carbon calculator in a run.
///
/// These are built once before any period is calculated and are read-only afterwards;
/// calculators share them through an `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CarbonSettings {
    /// Time constant of soil carbon turnover
    /// unit: yr
    /// default: 40.0
    pub soil_time_scale: FloatValue,
    /// First year of annual carbon accounting.
    /// Stocks are initialised in this year from the land use at the time.
    /// default: 1700
    pub start_year: Year,
    /// Last year for which annual stocks and flows are stored
    /// default: 2100
    pub end_year: Year,
}

impl Default for CarbonSettings {
    fn default() -> Self {
        Self {
            soil_time_scale: 40.0,
            start_year: 1700,
            end_year: 2100,
        }
    }
}

impl CarbonSettings {
    pub fn soil_time_scale(&self) -> FloatValue {
        self.soil_time_scale
    }

    pub fn start_year(&self) -> Year {
        self.start_year
    }

    pub fn end_year(&self) -> Year {
        self.end_year
    }

    /// Check the settings are usable on their own
    pub fn validate(&self) -> CarbonResult<()> {
        if !(self.soil_time_scale.is_finite() && self.soil_time_scale > 0.0) {
            return Err(CarbonError::invalid_parameter(
                "soil_time_scale",
                format!("{} must be a positive number of years", self.soil_time_scale),
            ));
        }
        if self.start_year > self.end_year {
            return Err(CarbonError::InvertedYearBounds {
                start: self.start_year,
                end: self.end_year,
            });
        }
        Ok(())
    }

    /// Check that every model period can be accounted for.
    ///
    /// Annual accounting must start before the first period and extend to the last one.
    pub fn validate_against(&self, modeltime: &Modeltime) -> CarbonResult<()> {
        self.validate()?;
        if self.start_year >= modeltime.start_year() {
            return Err(CarbonError::invalid_parameter(
                "start_year",
                format!(
                    "{} must be before the first model period ({})",
                    self.start_year,
                    modeltime.start_year()
                ),
            ));
        }
        if self.end_year < modeltime.end_year() {
            return Err(CarbonError::YearOutOfRange {
                year: modeltime.end_year(),
                start: self.start_year,
                end: self.end_year,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = CarbonSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.soil_time_scale(), 40.0);
        assert_eq!(settings.start_year(), 1700);
        assert_eq!(settings.end_year(), 2100);
    }

    #[test]
    fn invalid_values() {
        let settings = CarbonSettings {
            soil_time_scale: 0.0,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CarbonError::InvalidParameter { .. })
        ));

        let settings = CarbonSettings {
            start_year: 2000,
            end_year: 1990,
            ..Default::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(CarbonError::InvertedYearBounds { .. })
        ));
    }

    #[test]
    fn must_cover_modeltime() {
        let modeltime = Modeltime::new(vec![1990, 2050, 2150]).unwrap();
        let err = CarbonSettings::default()
            .validate_against(&modeltime)
            .unwrap_err();
        assert!(matches!(err, CarbonError::YearOutOfRange { year: 2150, .. }));

        let modeltime = Modeltime::new(vec![1700, 2000]).unwrap();
        assert!(CarbonSettings::default().validate_against(&modeltime).is_err());

        let modeltime = Modeltime::new(vec![1975, 2100]).unwrap();
        CarbonSettings::default()
            .validate_against(&modeltime)
            .unwrap();
    }

    #[test]
    fn partial_toml() {
        let settings: CarbonSettings = toml::from_str("soil_time_scale = 25.0").unwrap();
        assert_eq!(settings.soil_time_scale, 25.0);
        assert_eq!(settings.start_year, 1700);
    }
}
