//! Classification of carbon pools ("boxes") and of the flows between them.
//!
//! Box and flow names arrive as strings from scenario configuration and are converted
//! once, at load time. The wildcard variants [`BoxType::AnyBox`] and [`FlowType::AnyFlow`]
//! are only used when querying or summing and can never be parsed from a name, so a
//! configuration can not accidentally assign carbon to them.
//!
//! ```rust
//! use landcarbon_core::carbon_types::{box_type_to_string, string_box_name_to_type, BoxType};
//!
//! assert_eq!(box_type_to_string(BoxType::Soil), "soil");
//! assert_eq!(string_box_name_to_type("soil").unwrap(), BoxType::Soil);
//! assert!(string_box_name_to_type("any-box").is_err());
//! ```

use crate::errors::{CarbonError, CarbonResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Type of a carbon pool
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum BoxType {
    /// Living plant biomass
    Vegetation,
    Soil,
    /// Dead organic matter on its way to the soil
    Litter,
    /// Net primary production of the current year, before it is allocated to the other pools
    Npp,
    /// Exchange with the atmosphere. Carbon leaving the land ends up here.
    Atmosphere,
    /// Matches any of the above. Never assigned to a pool.
    AnyBox,
}

impl BoxType {
    /// Every assignable pool type, in storage order
    pub const POOLS: [BoxType; 5] = [
        BoxType::Vegetation,
        BoxType::Soil,
        BoxType::Litter,
        BoxType::Npp,
        BoxType::Atmosphere,
    ];

    /// Position of the pool in [`BoxType::POOLS`], `None` for the wildcard
    pub fn index(self) -> Option<usize> {
        match self {
            BoxType::AnyBox => None,
            other => Some(other as usize),
        }
    }

    pub fn is_wildcard(self) -> bool {
        self == BoxType::AnyBox
    }

    /// Whether `other` is selected by `self` when used as a query
    pub fn matches(self, other: BoxType) -> bool {
        match self {
            // The atmosphere is the exchange ledger of the land pools, not a land pool
            BoxType::AnyBox => other != BoxType::Atmosphere,
            _ => self == other,
        }
    }
}

/// Type of a flow of carbon between two pools
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum FlowType {
    /// Growth, turnover and decay
    BoxFlow,
    /// Net flow due to land-use change
    LucFlow,
    /// Carbon leaving with area that is lost
    LucFlowOut,
    /// Carbon arriving with area that is gained
    LucFlowIn,
    /// Matches any of the above
    AnyFlow,
}

impl FlowType {
    /// Flow types that are recorded directly. [`FlowType::LucFlow`] is the sum of the
    /// two directional land-use change flows.
    pub const RECORDED: [FlowType; 3] =
        [FlowType::BoxFlow, FlowType::LucFlowOut, FlowType::LucFlowIn];

    /// Position of a recorded flow type in [`FlowType::RECORDED`]
    pub fn recorded_index(self) -> Option<usize> {
        match self {
            FlowType::BoxFlow => Some(0),
            FlowType::LucFlowOut => Some(1),
            FlowType::LucFlowIn => Some(2),
            FlowType::LucFlow | FlowType::AnyFlow => None,
        }
    }

    pub fn is_land_use_change(self) -> bool {
        matches!(
            self,
            FlowType::LucFlow | FlowType::LucFlowOut | FlowType::LucFlowIn
        )
    }

    /// Whether the recorded flow type `other` is selected by `self` when used as a query
    pub fn matches(self, other: FlowType) -> bool {
        match self {
            FlowType::AnyFlow => true,
            FlowType::LucFlow => matches!(other, FlowType::LucFlowOut | FlowType::LucFlowIn),
            _ => self == other,
        }
    }
}

/// Canonical label of a flow type
pub fn flow_type_to_string(flow: FlowType) -> &'static str {
    match flow {
        FlowType::BoxFlow => "box-flow",
        FlowType::LucFlow => "luc-flow",
        FlowType::LucFlowOut => "luc-flow-out",
        FlowType::LucFlowIn => "luc-flow-in",
        FlowType::AnyFlow => "any-flow",
    }
}

/// Canonical label of a box type
pub fn box_type_to_string(box_type: BoxType) -> &'static str {
    match box_type {
        BoxType::Vegetation => "vegetation",
        BoxType::Soil => "soil",
        BoxType::Litter => "litter",
        BoxType::Npp => "npp",
        BoxType::Atmosphere => "atmosphere",
        BoxType::AnyBox => "any-box",
    }
}

/// Box type for a canonical box label.
///
/// # Errors
///
/// [`CarbonError::UnknownBoxName`] for anything that is not the label of an assignable
/// pool, including the wildcard label.
pub fn string_box_name_to_type(name: &str) -> CarbonResult<BoxType> {
    BoxType::POOLS
        .iter()
        .copied()
        .find(|t| box_type_to_string(*t) == name)
        .ok_or_else(|| CarbonError::UnknownBoxName(name.to_string()))
}

/// Flow type for a canonical flow label.
///
/// # Errors
///
/// [`CarbonError::UnknownFlowName`] for anything that is not the label of a concrete
/// flow type, including the wildcard label.
pub fn string_flow_name_to_type(name: &str) -> CarbonResult<FlowType> {
    [
        FlowType::BoxFlow,
        FlowType::LucFlow,
        FlowType::LucFlowOut,
        FlowType::LucFlowIn,
    ]
    .into_iter()
    .find(|t| flow_type_to_string(*t) == name)
    .ok_or_else(|| CarbonError::UnknownFlowName(name.to_string()))
}

impl fmt::Display for BoxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", box_type_to_string(*self))
    }
}

impl fmt::Display for FlowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", flow_type_to_string(*self))
    }
}

impl FromStr for BoxType {
    type Err = CarbonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        string_box_name_to_type(s)
    }
}

impl FromStr for FlowType {
    type Err = CarbonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        string_flow_name_to_type(s)
    }
}

impl TryFrom<String> for BoxType {
    type Error = CarbonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        string_box_name_to_type(&value)
    }
}

impl From<BoxType> for String {
    fn from(value: BoxType) -> Self {
        box_type_to_string(value).to_string()
    }
}

impl TryFrom<String> for FlowType {
    type Error = CarbonError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        string_flow_name_to_type(&value)
    }
}

impl From<FlowType> for String {
    fn from(value: FlowType) -> Self {
        flow_type_to_string(value).to_string()
    }
}
