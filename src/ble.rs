//! A [`MowerSession`] over Bluetooth Low Energy.
//!
//! The mower exposes a single GATT service with one characteristic to write
//! requests to and one that delivers responses as notifications. On top of that
//! runs a proprietary request-response protocol, handled by a [`MowerCodec`].

use std::str::FromStr;

use async_trait::async_trait;
use bluest::Adapter;
use bluest::Characteristic;
use bluest::Device;
use bluest::Uuid;
use futures_util::Stream;
use futures_util::StreamExt;
use serde_json::Value;
use tokio::time::timeout;
use tokio::time::Duration;
use tracing::{debug, info, trace, warn};

use crate::codec::{Frame, MowerCodec};
use crate::error::TransportError;
use crate::session::{commands, Command, MowerActivity, MowerSession, MowerState, Reading, ResponseResult};

pub struct BleMower<C> {
    adapter: Adapter,
    codec: C,
    channel_id: u32,
    notification_timeout: Duration,
    link: Option<Link>,
}

/// The GATT handles of an open session.
struct Link {
    device: Device,
    write: Characteristic,
    notify: Characteristic,
}

impl<C: MowerCodec> BleMower<C> {
    const SERVICE_ID: Uuid = Uuid::from_u128(0x98bd0001_0b0e_421a_84e5_ddbf75dc6de4);
    const WRITE_CHARACTERISTIC_ID: Uuid = Uuid::from_u128(0x98bd0002_0b0e_421a_84e5_ddbf75dc6de4);
    const NOTIFY_CHARACTERISTIC_ID: Uuid = Uuid::from_u128(0x98bd0003_0b0e_421a_84e5_ddbf75dc6de4);
    // How long to wait without any notifications before considering the message completely received
    const DEFAULT_NOTIFICATION_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn new(adapter: Adapter, codec: C, channel_id: u32) -> Self {
        Self {
            adapter,
            codec,
            channel_id,
            notification_timeout: Self::DEFAULT_NOTIFICATION_TIMEOUT,
            link: None,
        }
    }

    pub fn with_notification_timeout(mut self, notification_timeout: Duration) -> Self {
        self.notification_timeout = notification_timeout;
        self
    }

    async fn open_link(&self, device: Device) -> Result<Link, TransportError> {
        let service = device
            .discover_services_with_uuid(Self::SERVICE_ID)
            .await?
            .first()
            .ok_or(TransportError::MissingCharacteristic("mower service"))?
            .clone();
        let write = service
            .discover_characteristics_with_uuid(Self::WRITE_CHARACTERISTIC_ID)
            .await?
            .first()
            .ok_or(TransportError::MissingCharacteristic("write characteristic"))?
            .clone();
        let notify = service
            .discover_characteristics_with_uuid(Self::NOTIFY_CHARACTERISTIC_ID)
            .await?
            .first()
            .ok_or(TransportError::MissingCharacteristic("notify characteristic"))?
            .clone();

        Ok(Link { device, write, notify })
    }

    async fn request_response(&self, link: &Link, rq: &[u8]) -> Result<Vec<u8>, TransportError> {
        let reader = link.notify.notify().await?;

        trace!(tx = %hex::encode(rq), "mower request");
        link.write.write(rq).await?;

        read_message(&self.codec, reader, self.notification_timeout).await
    }

    /// Discover the GATT handles and run the channel handshake.
    async fn open_session(&self, device: Device) -> Result<(ResponseResult, Link), TransportError> {
        let link = self.open_link(device).await?;
        let rq = self.codec.handshake(self.channel_id)?;
        let payload = self.request_response(&link, &rq).await?;
        let result = self.codec.parse_handshake(&payload)?;
        Ok((result, link))
    }

    /// Drop an adapter connection that did not become a session.
    async fn release(&self, device: &Device) {
        if let Err(err) = self.adapter.disconnect_device(device).await {
            warn!("failed to drop unused connection: {err}");
        }
    }

    async fn query(&self, command: Command) -> Result<Value, TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        let rq = self.codec.encode(self.channel_id, &command)?;
        let payload = self.request_response(link, &rq).await?;
        let value = self.codec.decode(&command, &payload)?;
        debug!(%command, %value, "mower response");
        Ok(value)
    }

    async fn query_str<T>(&self, name: &'static str) -> Result<Reading<T>, TransportError>
    where
        T: FromStr<Err = TransportError>,
    {
        match self.query(Command::new(name)).await? {
            Value::Null => Ok(Reading::Absent),
            Value::String(s) => s.parse().map(Reading::Value),
            other => Err(TransportError::Value(format!("{name} returned {other}"))),
        }
    }

    async fn query_u64(&self, name: &'static str) -> Result<Reading<u64>, TransportError> {
        match self.query(Command::new(name)).await? {
            Value::Null => Ok(Reading::Absent),
            Value::Number(n) => n
                .as_u64()
                .map(Reading::Value)
                .ok_or_else(|| TransportError::Value(format!("{name} returned {n}"))),
            other => Err(TransportError::Value(format!("{name} returned {other}"))),
        }
    }
}

#[async_trait]
impl<C: MowerCodec + 'static> MowerSession for BleMower<C> {
    type Handle = Device;

    fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    async fn connect(&mut self, handle: Option<Device>) -> Result<ResponseResult, TransportError> {
        self.link = None;
        let device = handle.ok_or(TransportError::Unreachable)?;

        if !device.is_connected().await {
            self.adapter.connect_device(&device).await?;
        }

        let opened = self.open_session(device.clone()).await;
        let (result, link) = release_on_error(opened, self.release(&device)).await?;

        if result == ResponseResult::Ok {
            info!(channel_id = self.channel_id, "mower session opened");
            self.link = Some(link);
        } else {
            warn!(?result, "mower refused the session");
            self.release(&device).await;
        }

        Ok(result)
    }

    async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            match self.adapter.disconnect_device(&link.device).await {
                Ok(()) => info!("mower session closed"),
                Err(err) => warn!("failed to disconnect from mower: {err}"),
            }
        }
    }

    async fn battery_level(&mut self) -> Result<Reading<u8>, TransportError> {
        match self.query_u64(commands::GET_BATTERY_LEVEL).await? {
            Reading::Value(level) => u8::try_from(level)
                .map(Reading::Value)
                .map_err(|_| TransportError::Value(format!("battery level {level} out of range"))),
            Reading::Absent => Ok(Reading::Absent),
        }
    }

    async fn mower_activity(&mut self) -> Result<Reading<MowerActivity>, TransportError> {
        self.query_str(commands::GET_ACTIVITY).await
    }

    async fn mower_state(&mut self) -> Result<Reading<MowerState>, TransportError> {
        self.query_str(commands::GET_STATE).await
    }

    async fn mower_next_start_time(&mut self) -> Result<Reading<u64>, TransportError> {
        self.query_u64(commands::GET_NEXT_START_TIME).await
    }

    async fn command(&mut self, command: Command) -> Result<Value, TransportError> {
        self.query(command).await
    }
}

/// Run `release` only when `result` is an error, then hand `result` back.
async fn release_on_error<T, E, F>(result: Result<T, E>, release: F) -> Result<T, E>
where
    F: std::future::Future<Output = ()>,
{
    if result.is_err() {
        release.await;
    }
    result
}

/// Attempt to read a whole message from the device.
///
/// Messages are delivered over multiple notification events, sometimes
/// duplicated and sometimes truncated, so the length announced in a header
/// cannot be trusted to say when a message is complete.
///
/// Instead, notifications are appended to the received message until none has
/// arrived for `quiet`. Then the message is considered complete and the codec
/// judges whether it is usable.
async fn read_message<C, T>(codec: &C, mut reader: T, quiet: Duration) -> Result<Vec<u8>, TransportError>
where
    C: MowerCodec + ?Sized,
    T: Stream<Item = Result<Vec<u8>, bluest::Error>> + Send + Unpin,
{
    let mut msg = Vec::<u8>::new();
    loop {
        match timeout(quiet, reader.next()).await {
            Err(_) if msg.is_empty() => return Err(TransportError::Timeout("mower response")),
            Err(_) => {
                return match codec.try_parse(&msg[..]) {
                    Frame::Complete(payload) => Ok(payload),
                    Frame::Incomplete => Err(TransportError::Protocol(format!(
                        "message incomplete: {}",
                        hex::encode(&msg[..])
                    ))),
                    Frame::Invalid(e) => Err(TransportError::Protocol(format!(
                        "message invalid: {e}: {}",
                        hex::encode(&msg[..])
                    ))),
                };
            }
            Ok(None) => {
                debug!("end of notification stream");
                return Err(TransportError::Disconnected);
            }
            Ok(Some(Ok(data))) => {
                trace!(rx = %hex::encode(&data), "mower notification");
                msg.extend_from_slice(&data);
            }
            Ok(Some(Err(err))) => {
                debug!("notification error: {err}");
                return Err(err.into());
            }
        }
    }
}
