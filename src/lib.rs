//! Poll a Husqvarna Automower over Bluetooth Low Energy and publish a snapshot of its state.
//!
//! The mower is an unreliable, connection-oriented peripheral: links go stale without
//! reporting an error, and some firmware answers particular queries with malformed data.
//! A [`PollCoordinator`] keeps a best-effort session to it, reconnects when the link
//! looks stale and publishes a [`Snapshot`] only when a whole poll cycle succeeded.
//!
//! Currently the following data is polled:
//!
//! - Battery level (%)
//! - Activity and state
//! - Next scheduled start
//! - Error code, number of messages and the last message
//! - Remaining charging time
//! - Usage statistics
//! - Whether an operator is logged in
//!
//! The byte-level protocol is supplied by the caller as a [`MowerCodec`].
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::time::Duration;
//! # use automower_ble_poll::*;
//! # async fn run(codec: impl MowerCodec + 'static) -> anyhow::Result<()> {
//!     let settings = Settings::load("automower.toml")?;
//!     init_logging(&settings.log)?;
//!
//!     let resolver = BluestResolver::default_adapter(settings.poll.scan_timeout()).await?;
//!     let mower = BleMower::new(resolver.adapter().clone(), codec, settings.device.channel_id)
//!         .with_notification_timeout(settings.poll.notification_timeout());
//!     let coordinator = PollCoordinator::new(settings.identity(), mower, resolver.clone(), resolver);
//!
//!     let cancel = tokio_util::sync::CancellationToken::new();
//!     Scheduler::from_settings(&settings.poll)
//!         .run(&coordinator, &TracingSink::default(), cancel)
//!         .await;
//! #   Ok(())
//! # }
//! ```

mod ble;
mod codec;
mod config;
mod coordinator;
mod error;
mod logging;
mod resolver;
mod scheduler;
mod session;
mod sink;
mod snapshot;

pub use ble::BleMower;
pub use codec::{Frame, MowerCodec};
pub use config::{DeviceSettings, LogSettings, PollSettings, Settings};
pub use coordinator::{DeviceIdentity, PollCoordinator};
pub use error::{ConnectError, TransportError, UpdateFailed};
pub use logging::init_logging;
pub use resolver::{BluestResolver, DeviceResolver, StaleConnectionReclaimer};
pub use scheduler::{PollStatus, Scheduler};
pub use session::{commands, Command, MowerActivity, MowerSession, MowerState, Reading, ResponseResult};
pub use sink::{JsonLinesSink, SnapshotSink, TracingSink};
pub use snapshot::{fields, Snapshot};
