//! The poll coordinator keeps a best-effort session to one mower and turns each
//! poll cycle into either a complete [`Snapshot`] or an [`UpdateFailed`].
//!
//! A cycle goes:
//!
//! 1. If the session is not connected, run the reconnect procedure (release
//!    stale host connections, resolve the address, connect). If that fails the
//!    cycle ends without reading anything.
//! 2. Read the fields in a fixed order. Battery level, activity and state are
//!    required: an empty answer means the link has gone stale even though no
//!    error surfaced. The next start time is best effort and may be empty.
//! 3. A link error anywhere in the sequence ends the cycle, after one
//!    best-effort reconnect so the next cycle starts from a fresh session.
//!
//! A failed cycle never touches the published snapshot.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info};

use crate::error::{ConnectError, TransportError, UpdateFailed};
use crate::resolver::{DeviceResolver, StaleConnectionReclaimer};
use crate::session::{commands, Command, MowerSession, Reading, ResponseResult};
use crate::snapshot::{fields, Snapshot};

/// Substring of the value error `GetAllStatistics` raises on some firmware
/// whose statistics response is shorter than announced.
const STATISTICS_LENGTH_MISMATCH: &str = "Data length mismatch";

/// Who the coordinator talks to. Supplied once by configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub address: String,
    pub channel_id: u32,
    pub model: String,
}

/// Why the read sequence stopped early.
#[derive(Debug)]
enum ReadError {
    Absent(&'static str),
    Transport(TransportError),
}

impl From<TransportError> for ReadError {
    fn from(err: TransportError) -> Self {
        Self::Transport(err)
    }
}

struct SessionSlot<S> {
    session: S,
    shut_down: bool,
}

pub struct PollCoordinator<S, R, C> {
    identity: DeviceIdentity,
    resolver: R,
    reclaimer: C,
    slot: Mutex<SessionSlot<S>>,
    published: watch::Sender<Option<Arc<Snapshot>>>,
}

impl<S, R, C> PollCoordinator<S, R, C>
where
    S: MowerSession,
    R: DeviceResolver<Handle = S::Handle>,
    C: StaleConnectionReclaimer,
{
    pub fn new(identity: DeviceIdentity, session: S, resolver: R, reclaimer: C) -> Self {
        let (published, _) = watch::channel(None);
        Self {
            identity,
            resolver,
            reclaimer,
            slot: Mutex::new(SessionSlot { session, shut_down: false }),
            published,
        }
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// The last successfully polled snapshot, if any cycle has succeeded yet.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.published.borrow().clone()
    }

    /// Subscribe to snapshot replacements.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.published.subscribe()
    }

    /// Run one poll cycle. Waits for any other cycle or a shutdown in flight.
    pub async fn run_cycle(&self) -> Result<Arc<Snapshot>, UpdateFailed> {
        let mut slot = self.slot.lock().await;
        if slot.shut_down {
            return Err(UpdateFailed::ShutDown);
        }

        debug!(address = %self.identity.address, "polling device");
        let snapshot = Arc::new(self.poll(&mut slot.session).await?);
        self.published.send_replace(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }

    /// Disconnect if connected and refuse every later cycle.
    ///
    /// Serialized behind any cycle in flight; that cycle is left to finish.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.lock().await;
        if slot.shut_down {
            return;
        }
        info!(address = %self.identity.address, "shutdown");
        if slot.session.is_connected() {
            slot.session.disconnect().await;
        }
        slot.shut_down = true;
    }

    async fn poll(&self, session: &mut S) -> Result<Snapshot, UpdateFailed> {
        if !session.is_connected() {
            self.reconnect(session).await.map_err(UpdateFailed::ConnectFailed)?;
        }

        match self.read_sequence(session).await {
            Ok(snapshot) => Ok(snapshot),
            Err(ReadError::Absent(field)) => {
                self.reconnect_best_effort(session).await;
                Err(UpdateFailed::NoData { field })
            }
            Err(ReadError::Transport(err)) if err.is_link_error() => {
                error!("Error getting data from device: {err}");
                self.reconnect_best_effort(session).await;
                Err(UpdateFailed::Device(err))
            }
            Err(ReadError::Transport(err)) => Err(UpdateFailed::Unexpected(err)),
        }
    }

    async fn read_sequence(&self, session: &mut S) -> Result<Snapshot, ReadError> {
        let mut snapshot = Snapshot::default();

        let battery = required(fields::BATTERY_LEVEL, session.battery_level().await?)?;
        record(&mut snapshot, fields::BATTERY_LEVEL, battery);

        let activity = required(fields::ACTIVITY, session.mower_activity().await?)?;
        record(&mut snapshot, fields::ACTIVITY, activity);

        let state = required(fields::STATE, session.mower_state().await?)?;
        record(&mut snapshot, fields::STATE, state);

        // Empty is a legitimate answer here, e.g. when no schedule is set.
        let next_start = session.mower_next_start_time().await?.into_option();
        record(&mut snapshot, fields::NEXT_START_TIME, next_start);

        for (field, name) in [
            (fields::ERROR_CODE, commands::GET_ERROR),
            (fields::NUMBER_OF_MESSAGES, commands::GET_NUMBER_OF_MESSAGES),
            (fields::REMAINING_CHARGING_TIME, commands::GET_REMAINING_CHARGING_TIME),
        ] {
            let value = session.command(Command::new(name)).await?;
            record(&mut snapshot, field, value);
        }

        let statistics = match session.command(Command::new(commands::GET_ALL_STATISTICS)).await {
            Ok(value) => value,
            Err(TransportError::Value(msg)) if msg.contains(STATISTICS_LENGTH_MISMATCH) => {
                debug!("Known fail on GetAllStatistics - skipping");
                Value::Null
            }
            Err(err) => return Err(err.into()),
        };
        record(&mut snapshot, fields::STATISTICS, statistics);

        let operator = session.command(Command::new(commands::IS_OPERATOR_LOGGED_IN)).await?;
        record(&mut snapshot, fields::OPERATOR_STATE, operator);

        let last_message = session
            .command(Command::new(commands::GET_MESSAGE).param("messageId", 0))
            .await?;
        record(&mut snapshot, fields::LAST_MESSAGE, last_message);

        Ok(snapshot)
    }

    async fn reconnect(&self, session: &mut S) -> Result<(), ConnectError> {
        let address = self.identity.address.as_str();
        debug!(address, "Trying to reconnect");
        self.reclaimer.release_stale(address).await;

        let handle = self.resolver.resolve(address).await;
        match session.connect(handle).await? {
            ResponseResult::Ok => {
                info!(address, model = %self.identity.model, "connected");
                Ok(())
            }
            rejected => Err(ConnectError::Rejected(rejected)),
        }
    }

    /// Reconnect after a failed read; the cycle fails regardless of the outcome.
    async fn reconnect_best_effort(&self, session: &mut S) {
        if let Err(err) = self.reconnect(session).await {
            debug!("reconnect after failed read did not succeed: {err}");
        }
    }
}

fn required<T>(field: &'static str, reading: Reading<T>) -> Result<T, ReadError> {
    match reading {
        Reading::Value(value) => Ok(value),
        Reading::Absent => Err(ReadError::Absent(field)),
    }
}

fn record(snapshot: &mut Snapshot, field: &'static str, value: impl Into<Value>) {
    let value = value.into();
    debug!("{field}: {value}");
    snapshot.insert(field, value);
}
