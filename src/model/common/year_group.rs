use std::fmt::{self, Display, Formatter};

use mongodb::bson::{to_bson, Bson};
use rocket::FromFormField;
use serde::{Deserialize, Serialize};

/// School year groups that may be eligible for an election.
#[derive(
    Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, FromFormField,
)]
pub enum YearGroup {
    #[serde(rename = "year_7")]
    #[field(value = "year_7")]
    Year7,
    #[serde(rename = "year_8")]
    #[field(value = "year_8")]
    Year8,
    #[serde(rename = "year_9")]
    #[field(value = "year_9")]
    Year9,
    #[serde(rename = "year_10")]
    #[field(value = "year_10")]
    Year10,
    #[serde(rename = "year_11")]
    #[field(value = "year_11")]
    Year11,
}

impl YearGroup {
    /// All year groups, in ascending order.
    pub const ALL: [YearGroup; 5] = [
        YearGroup::Year7,
        YearGroup::Year8,
        YearGroup::Year9,
        YearGroup::Year10,
        YearGroup::Year11,
    ];
}

impl Display for YearGroup {
    /// The human-readable form, as it appears in exports.
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Year7 => "Year 7",
            Self::Year8 => "Year 8",
            Self::Year9 => "Year 9",
            Self::Year10 => "Year 10",
            Self::Year11 => "Year 11",
        };
        write!(f, "{}", name)
    }
}

impl From<YearGroup> for Bson {
    fn from(group: YearGroup) -> Self {
        to_bson(&group).expect("Serialisation is infallible")
    }
}
