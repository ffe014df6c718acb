//! The contract between the poll coordinator and a connected mower.
//!
//! A [`MowerSession`] owns the link to one addressed peripheral. The three core
//! typed reads distinguish "the peripheral answered with nothing" from "the
//! request failed" through [`Reading`], so callers decide per field how much an
//! empty answer matters.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::TransportError;

/// Command names understood by the mower.
pub mod commands {
    pub const GET_BATTERY_LEVEL: &str = "GetBatteryLevel";
    pub const GET_ACTIVITY: &str = "GetActivity";
    pub const GET_STATE: &str = "GetState";
    pub const GET_NEXT_START_TIME: &str = "GetNextStartTime";
    pub const GET_ERROR: &str = "GetError";
    pub const GET_NUMBER_OF_MESSAGES: &str = "GetNumberOfMessages";
    pub const GET_REMAINING_CHARGING_TIME: &str = "GetRemainingChargingTime";
    pub const GET_ALL_STATISTICS: &str = "GetAllStatistics";
    pub const IS_OPERATOR_LOGGED_IN: &str = "IsOperatorLoggedIn";
    pub const GET_MESSAGE: &str = "GetMessage";
}

/// The outcome of a read that completed without a transport error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading<T> {
    Value(T),
    /// The peripheral answered, but with no value.
    Absent,
}

impl<T> Reading<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Reading::Value(value) => Some(value),
            Reading::Absent => None,
        }
    }
}

impl<T> From<Option<T>> for Reading<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Reading::Absent, Reading::Value)
    }
}

/// Result of opening a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseResult {
    Ok,
    /// The peripheral refused the session with the given result code.
    Rejected(u8),
}

/// A named request with optional named parameters, e.g.
/// `Command::new("GetMessage").param("messageId", 0)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub name: &'static str,
    pub params: Vec<(&'static str, Value)>,
}

impl Command {
    pub fn new(name: &'static str) -> Self {
        Self { name, params: Vec::new() }
    }

    pub fn param(mut self, name: &'static str, value: impl Into<Value>) -> Self {
        self.params.push((name, value.into()));
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)?;
        for (name, value) in &self.params {
            write!(f, " {name}={value}")?;
        }
        Ok(())
    }
}

/// What the mower is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MowerActivity {
    None,
    Charging,
    GoingOut,
    Mowing,
    GoingHome,
    Parked,
    StoppedInGarden,
}

impl MowerActivity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Charging => "CHARGING",
            Self::GoingOut => "GOING_OUT",
            Self::Mowing => "MOWING",
            Self::GoingHome => "GOING_HOME",
            Self::Parked => "PARKED",
            Self::StoppedInGarden => "STOPPED_IN_GARDEN",
        }
    }
}

impl FromStr for MowerActivity {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "NONE" => Self::None,
            "CHARGING" => Self::Charging,
            "GOING_OUT" => Self::GoingOut,
            "MOWING" => Self::Mowing,
            "GOING_HOME" => Self::GoingHome,
            "PARKED" => Self::Parked,
            "STOPPED_IN_GARDEN" => Self::StoppedInGarden,
            other => return Err(TransportError::Value(format!("unknown mower activity {other:?}"))),
        })
    }
}

/// The operating state of the mower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MowerState {
    Off,
    WaitForSafetypin,
    Stopped,
    FatalError,
    PendingStart,
    Paused,
    InOperation,
    Restricted,
    Error,
}

impl MowerState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::WaitForSafetypin => "WAIT_FOR_SAFETYPIN",
            Self::Stopped => "STOPPED",
            Self::FatalError => "FATAL_ERROR",
            Self::PendingStart => "PENDING_START",
            Self::Paused => "PAUSED",
            Self::InOperation => "IN_OPERATION",
            Self::Restricted => "RESTRICTED",
            Self::Error => "ERROR",
        }
    }
}

impl FromStr for MowerState {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "OFF" => Self::Off,
            "WAIT_FOR_SAFETYPIN" => Self::WaitForSafetypin,
            "STOPPED" => Self::Stopped,
            "FATAL_ERROR" => Self::FatalError,
            "PENDING_START" => Self::PendingStart,
            "PAUSED" => Self::Paused,
            "IN_OPERATION" => Self::InOperation,
            "RESTRICTED" => Self::Restricted,
            "ERROR" => Self::Error,
            other => return Err(TransportError::Value(format!("unknown mower state {other:?}"))),
        })
    }
}

impl From<MowerActivity> for Value {
    fn from(activity: MowerActivity) -> Self {
        Value::String(activity.as_str().to_owned())
    }
}

impl From<MowerState> for Value {
    fn from(state: MowerState) -> Self {
        Value::String(state.as_str().to_owned())
    }
}

/// A stateful connection to one mower.
///
/// Implementations are not safe for concurrent use; the coordinator serializes
/// every call behind a single lock.
#[async_trait]
pub trait MowerSession: Send {
    /// A resolved, directly connectable reference to the peripheral.
    type Handle: Send + 'static;

    /// Cached connection state. Performs no I/O.
    fn is_connected(&self) -> bool;

    /// Open a session to `handle`. An absent handle fails with
    /// [`TransportError::Unreachable`].
    async fn connect(&mut self, handle: Option<Self::Handle>) -> Result<ResponseResult, TransportError>;

    /// Release the session. Calling this while disconnected does nothing.
    async fn disconnect(&mut self);

    /// Battery charge in percent.
    async fn battery_level(&mut self) -> Result<Reading<u8>, TransportError>;

    async fn mower_activity(&mut self) -> Result<Reading<MowerActivity>, TransportError>;

    async fn mower_state(&mut self) -> Result<Reading<MowerState>, TransportError>;

    /// Next scheduled start as unix seconds.
    async fn mower_next_start_time(&mut self) -> Result<Reading<u64>, TransportError>;

    async fn command(&mut self, command: Command) -> Result<Value, TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_and_state_parse_their_wire_names() {
        assert_eq!("MOWING".parse::<MowerActivity>().unwrap(), MowerActivity::Mowing);
        assert_eq!(
            "STOPPED_IN_GARDEN".parse::<MowerActivity>().unwrap(),
            MowerActivity::StoppedInGarden
        );
        assert_eq!("IN_OPERATION".parse::<MowerState>().unwrap(), MowerState::InOperation);
        assert!(matches!(
            "mowing".parse::<MowerActivity>(),
            Err(TransportError::Value(_))
        ));
    }

    #[test]
    fn serde_names_match_wire_names() {
        for state in [MowerState::WaitForSafetypin, MowerState::FatalError, MowerState::Off] {
            assert_eq!(serde_json::to_value(state).unwrap(), Value::from(state));
        }
        assert_eq!(
            serde_json::to_value(MowerActivity::GoingHome).unwrap(),
            Value::from(MowerActivity::GoingHome)
        );
    }

    #[test]
    fn command_display_lists_params() {
        let cmd = Command::new(commands::GET_MESSAGE).param("messageId", 0);
        assert_eq!(cmd.to_string(), "GetMessage messageId=0");
    }
}
