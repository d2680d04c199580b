use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::dynamic_now::{EnergyLevel, TimeBlock, TimeSensitive};

/// A task-shaped record as the HTTP surface receives it. Only `id` and the two
/// optional scheduling tags are interpreted; every other field rides along in
/// `extra` and is returned unchanged.
///
/// The tags deserialize leniently: a missing, malformed, or unknown value is
/// "unclassified" rather than an error, so a stray `energy_level: "extreme"`
/// never rejects the whole request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    #[serde(default, deserialize_with = "lenient_energy_level")]
    pub energy_level: Option<EnergyLevel>,
    #[serde(default, deserialize_with = "lenient_time_block")]
    pub time_block: Option<TimeBlock>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TimeSensitive for Task {
    fn energy_level(&self) -> Option<EnergyLevel> {
        self.energy_level
    }

    fn time_block(&self) -> Option<TimeBlock> {
        self.time_block
    }
}

fn lenient_energy_level<'de, D>(deserializer: D) -> Result<Option<EnergyLevel>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(EnergyLevel::from_tag))
}

fn lenient_time_block<'de, D>(deserializer: D) -> Result<Option<TimeBlock>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Value> = Option::deserialize(deserializer)?;
    Ok(raw
        .as_ref()
        .and_then(Value::as_str)
        .and_then(TimeBlock::from_tag))
}
