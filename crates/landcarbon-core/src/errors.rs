use crate::timeseries::{FloatValue, Year};
use thiserror::Error;

/// Broad classification of a [`CarbonError`].
///
/// Callers that only care about the class of failure (for example a series lookup that
/// fell outside its data versus a configuration error) match on this instead of the
/// individual variants.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    OutOfRange,
    UnknownBoxName,
    UnknownFlowName,
    NegativeStock,
    NullReference,
    InvalidModeltime,
    InvalidParameter,
    PeriodRegression,
    Uninitialized,
    Config,
}

/// Error type for carbon accounting operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CarbonError {
    #[error("Series '{0}' is empty")]
    EmptySeries(String),
    #[error("Start year {start} is after end year {end}")]
    InvertedYearBounds { start: Year, end: Year },
    #[error("Year {year} is outside of the stored range {start}..={end}")]
    YearOutOfRange { year: Year, start: Year, end: Year },
    #[error("Unknown box name '{0}'")]
    UnknownBoxName(String),
    #[error("Unknown flow name '{0}'")]
    UnknownFlowName(String),
    #[error(
        "Outflows of {requested} from the {box_name} pool of '{category}' exceed the available stock of {available} (period {period}, year {year})"
    )]
    NegativeStock {
        category: String,
        box_name: String,
        period: usize,
        year: Year,
        requested: FloatValue,
        available: FloatValue,
    },
    #[error("Missing reference: {0}")]
    NullReference(String),
    #[error("Invalid model time: {0}")]
    InvalidModeltime(String),
    #[error("Invalid value for parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },
    #[error("Cannot calculate period {requested} for '{category}' after period {current}")]
    PeriodRegression {
        category: String,
        requested: usize,
        current: usize,
    },
    #[error("Carbon calculator for '{0}' has not been initialised")]
    Uninitialized(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CarbonError {
    /// The class of failure this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CarbonError::EmptySeries(_)
            | CarbonError::InvertedYearBounds { .. }
            | CarbonError::YearOutOfRange { .. } => ErrorKind::OutOfRange,
            CarbonError::UnknownBoxName(_) => ErrorKind::UnknownBoxName,
            CarbonError::UnknownFlowName(_) => ErrorKind::UnknownFlowName,
            CarbonError::NegativeStock { .. } => ErrorKind::NegativeStock,
            CarbonError::NullReference(_) => ErrorKind::NullReference,
            CarbonError::InvalidModeltime(_) => ErrorKind::InvalidModeltime,
            CarbonError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            CarbonError::PeriodRegression { .. } => ErrorKind::PeriodRegression,
            CarbonError::Uninitialized(_) => ErrorKind::Uninitialized,
            CarbonError::Config(_) => ErrorKind::Config,
        }
    }

    pub fn invalid_parameter(name: &str, reason: impl Into<String>) -> Self {
        CarbonError::InvalidParameter {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience type for `Result<T, CarbonError>`.
pub type CarbonResult<T> = Result<T, CarbonError>;
