// Scripted in-memory stand-ins for the mower, the resolver and the reclaimer.
//
// All three share one `Rig`, which holds the script and records every call in
// order, so tests can assert on what the coordinator did after handing it the
// fakes.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use automower_ble_poll::{
    commands, Command, DeviceIdentity, DeviceResolver, MowerActivity, MowerSession, MowerState,
    PollCoordinator, Reading, ResponseResult, StaleConnectionReclaimer, TransportError,
};
use serde_json::{json, Value};
use tokio::sync::Notify;

pub const ADDRESS: &str = "AA:BB:CC:DD:EE:FF";

pub const LENGTH_MISMATCH: &str = "Data length mismatch: expected 52 bytes, got 40";

/// What a scripted call answers.
#[derive(Debug, Clone)]
pub enum Step<T> {
    Value(T),
    Absent,
    Disconnect,
    Timeout,
    ProtocolError(&'static str),
    ValueError(&'static str),
}

impl<T: Clone> Step<T> {
    fn reading(&self) -> Result<Reading<T>, TransportError> {
        match self {
            Step::Value(value) => Ok(Reading::Value(value.clone())),
            Step::Absent => Ok(Reading::Absent),
            Step::Disconnect => Err(TransportError::Disconnected),
            Step::Timeout => Err(TransportError::Timeout("mower response")),
            Step::ProtocolError(msg) => Err(TransportError::Protocol((*msg).to_string())),
            Step::ValueError(msg) => Err(TransportError::Value((*msg).to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ConnectStep {
    Ok,
    Rejected,
    Disconnect,
}

pub struct Script {
    pub connected: bool,
    pub visible: bool,
    pub connect: ConnectStep,
    pub battery: Step<u8>,
    pub activity: Step<MowerActivity>,
    pub state: Step<MowerState>,
    pub next_start: Step<u64>,
    pub commands: HashMap<&'static str, Step<Value>>,
    /// A command that waits for the notify before answering.
    pub gate: Option<(&'static str, Arc<Notify>)>,
    pub calls: Vec<String>,
}

impl Script {
    fn healthy() -> Self {
        let commands = HashMap::from([
            (commands::GET_ERROR, Step::Value(json!(0))),
            (commands::GET_NUMBER_OF_MESSAGES, Step::Value(json!(2))),
            (commands::GET_REMAINING_CHARGING_TIME, Step::Value(json!(0))),
            (
                commands::GET_ALL_STATISTICS,
                Step::Value(json!({
                    "totalRunningTime": 3_600_000,
                    "totalCuttingTime": 3_200_000,
                    "numberOfCollisions": 1200,
                })),
            ),
            (commands::IS_OPERATOR_LOGGED_IN, Step::Value(json!(false))),
            (
                commands::GET_MESSAGE,
                Step::Value(json!({ "id": 0, "time": 1_700_000_000, "code": 0 })),
            ),
        ]);

        Self {
            connected: true,
            visible: true,
            connect: ConnectStep::Ok,
            battery: Step::Value(63),
            activity: Step::Value(MowerActivity::Mowing),
            state: Step::Value(MowerState::InOperation),
            next_start: Step::Value(1_700_003_600),
            commands,
            gate: None,
            calls: Vec::new(),
        }
    }
}

#[derive(Clone)]
pub struct Rig(Arc<Mutex<Script>>);

impl Rig {
    /// A connected mower that answers every query.
    pub fn healthy() -> Self {
        Self(Arc::new(Mutex::new(Script::healthy())))
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.0.lock().unwrap()
    }

    /// Hold `name` mid-read until the returned notify fires.
    pub fn gate(&self, name: &'static str) -> Arc<Notify> {
        let notify = Arc::new(Notify::new());
        self.script().gate = Some((name, notify.clone()));
        notify
    }

    pub fn set_command(&self, name: &'static str, step: Step<Value>) {
        self.script().commands.insert(name, step);
    }

    pub fn calls(&self) -> Vec<String> {
        self.script().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.script().calls.iter().filter(|c| c.as_str() == call).count()
    }

    pub fn clear_calls(&self) {
        self.script().calls.clear();
    }

    fn record(&self, call: &str) -> MutexGuard<'_, Script> {
        let mut script = self.script();
        script.calls.push(call.to_string());
        script
    }

    pub fn coordinator(&self) -> PollCoordinator<FakeMower, FakeResolver, FakeReclaimer> {
        PollCoordinator::new(
            DeviceIdentity {
                address: ADDRESS.to_string(),
                channel_id: 1_197_489_078,
                model: "305".to_string(),
            },
            FakeMower(self.clone()),
            FakeResolver(self.clone()),
            FakeReclaimer(self.clone()),
        )
    }
}

pub struct FakeMower(Rig);

#[async_trait]
impl MowerSession for FakeMower {
    type Handle = ();

    fn is_connected(&self) -> bool {
        self.0.script().connected
    }

    async fn connect(&mut self, handle: Option<()>) -> Result<ResponseResult, TransportError> {
        let mut script = self.0.record("connect");
        script.connected = false;
        if handle.is_none() {
            return Err(TransportError::Unreachable);
        }
        match script.connect {
            ConnectStep::Ok => {
                script.connected = true;
                Ok(ResponseResult::Ok)
            }
            ConnectStep::Rejected => Ok(ResponseResult::Rejected(5)),
            ConnectStep::Disconnect => Err(TransportError::Disconnected),
        }
    }

    async fn disconnect(&mut self) {
        let mut script = self.0.record("disconnect");
        script.connected = false;
    }

    async fn battery_level(&mut self) -> Result<Reading<u8>, TransportError> {
        self.0.record("battery_level").battery.reading()
    }

    async fn mower_activity(&mut self) -> Result<Reading<MowerActivity>, TransportError> {
        self.0.record("mower_activity").activity.reading()
    }

    async fn mower_state(&mut self) -> Result<Reading<MowerState>, TransportError> {
        self.0.record("mower_state").state.reading()
    }

    async fn mower_next_start_time(&mut self) -> Result<Reading<u64>, TransportError> {
        self.0.record("mower_next_start_time").next_start.reading()
    }

    async fn command(&mut self, command: Command) -> Result<Value, TransportError> {
        let gate = {
            let script = self.0.record(&command.to_string());
            script.gate.clone().filter(|(name, _)| *name == command.name)
        };
        if let Some((_, notify)) = gate {
            notify.notified().await;
        }
        let script = self.0.script();
        match script.commands.get(command.name) {
            Some(step) => step.reading().map(|r| r.into_option().unwrap_or(Value::Null)),
            None => Err(TransportError::Protocol(format!("unknown command {}", command.name))),
        }
    }
}

pub struct FakeResolver(Rig);

#[async_trait]
impl DeviceResolver for FakeResolver {
    type Handle = ();

    async fn resolve(&self, address: &str) -> Option<()> {
        assert_eq!(address, ADDRESS);
        self.0.record("resolve").visible.then_some(())
    }
}

pub struct FakeReclaimer(Rig);

#[async_trait]
impl StaleConnectionReclaimer for FakeReclaimer {
    async fn release_stale(&self, address: &str) {
        assert_eq!(address, ADDRESS);
        self.0.record("release_stale");
    }
}

/// Calls made by one complete, healthy read sequence.
pub const READ_SEQUENCE: [&str; 10] = [
    "battery_level",
    "mower_activity",
    "mower_state",
    "mower_next_start_time",
    "GetError",
    "GetNumberOfMessages",
    "GetRemainingChargingTime",
    "GetAllStatistics",
    "IsOperatorLoggedIn",
    "GetMessage messageId=0",
];

pub const RECONNECT: [&str; 3] = ["release_stale", "resolve", "connect"];
