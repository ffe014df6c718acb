use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;

/// Field names of a [`Snapshot`]. Downstream metadata binds to these by exact
/// match, so they never change.
pub mod fields {
    pub const BATTERY_LEVEL: &str = "battery_level";
    pub const ACTIVITY: &str = "activity";
    pub const STATE: &str = "state";
    pub const NEXT_START_TIME: &str = "next_start_time";
    pub const ERROR_CODE: &str = "errorCode";
    pub const NUMBER_OF_MESSAGES: &str = "NumberOfMessages";
    pub const REMAINING_CHARGING_TIME: &str = "RemainingChargingTime";
    pub const STATISTICS: &str = "statistics";
    pub const OPERATOR_STATE: &str = "operatorstate";
    pub const LAST_MESSAGE: &str = "last_message";

    /// Every field of a complete snapshot, in poll order.
    pub const ALL: [&str; 10] = [
        BATTERY_LEVEL,
        ACTIVITY,
        STATE,
        NEXT_START_TIME,
        ERROR_CODE,
        NUMBER_OF_MESSAGES,
        REMAINING_CHARGING_TIME,
        STATISTICS,
        OPERATOR_STATE,
        LAST_MESSAGE,
    ];
}

/// The device state read in one successful poll cycle.
///
/// Built once per cycle and never modified after publication. Best-effort
/// fields may hold [`Value::Null`]; they are still present.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, Value>);

impl Snapshot {
    pub(crate) fn insert(&mut self, field: &str, value: impl Into<Value>) {
        self.0.insert(field.to_owned(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The subset of `keys` present in this snapshot, with their values.
    /// Keys missing from the snapshot are skipped, never reported as null.
    pub fn exposed<'a>(&'a self, keys: &'a [&'a str]) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        keys.iter().filter_map(move |&key| self.0.get(key).map(|value| (key, value)))
    }
}
