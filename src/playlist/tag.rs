use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

/// Time-of-day slot a playlist is scheduled under.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TimeTag {
    Morning,
    Afternoon,
    Evening,
    Night,
}

impl TimeTag {
    /// Maps an hour of day to its slot. `hour` is in the configured
    /// timezone, 0-23.
    pub fn for_hour(hour: u8) -> Self {
        match hour {
            6..=11 => TimeTag::Morning,
            12..=17 => TimeTag::Afternoon,
            18..=20 => TimeTag::Evening,
            _ => TimeTag::Night,
        }
    }

    /// Fixed fallback order used when the active tag's slot is empty.
    pub const FALLBACK_ORDER: [TimeTag; 4] =
        [TimeTag::Morning, TimeTag::Afternoon, TimeTag::Evening, TimeTag::Night];
}
