//! Finding the mower on the host's Bluetooth stack.

use async_trait::async_trait;
use bluest::Adapter;
use bluest::Device;
use futures_util::Stream;
use futures_util::StreamExt;
use tokio::time::timeout;
use tokio::time::Duration;
use tracing::{debug, warn};

/// Maps a stable address to a handle that can be connected right now.
#[async_trait]
pub trait DeviceResolver: Send + Sync {
    type Handle: Send + 'static;

    /// `None` when the peripheral is not currently visible.
    async fn resolve(&self, address: &str) -> Option<Self::Handle>;
}

/// Releases connection state the host still holds for an address, so a fresh
/// connection attempt is not blocked by an old one.
#[async_trait]
pub trait StaleConnectionReclaimer: Send + Sync {
    /// Best-effort. Failures are logged and swallowed.
    async fn release_stale(&self, address: &str);
}

/// Resolves and reclaims through a `bluest` adapter.
#[derive(Clone)]
pub struct BluestResolver {
    adapter: Adapter,
    scan_timeout: Duration,
}

impl BluestResolver {
    pub fn new(adapter: Adapter, scan_timeout: Duration) -> Self {
        Self { adapter, scan_timeout }
    }

    /// Open the default adapter and wait for it to be powered on.
    pub async fn default_adapter(scan_timeout: Duration) -> anyhow::Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or(anyhow::anyhow!("Default adapter not found"))?;
        adapter.wait_available().await?;
        Ok(Self::new(adapter, scan_timeout))
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    async fn connected_matching(&self, address: &str) -> Vec<Device> {
        match self.adapter.connected_devices().await {
            Ok(devices) => devices
                .into_iter()
                .filter(|device| matches_address(device, address))
                .collect(),
            Err(err) => {
                warn!("failed to list connected devices: {err}");
                Vec::new()
            }
        }
    }

    async fn scan_for(&self, address: &str) -> Result<Option<Device>, bluest::Error> {
        let adapter_events = self.adapter.scan(&[]).await?;
        let found = first_within(adapter_events, self.scan_timeout, |advertising| {
            matches_address(&advertising.device, address)
        })
        .await;
        Ok(found.map(|advertising| advertising.device))
    }
}

/// The first event accepted by `accept` within `window`, counted from the
/// start of the scan rather than from the previous event.
async fn first_within<T, S, F>(mut events: S, window: Duration, mut accept: F) -> Option<T>
where
    S: Stream<Item = T> + Unpin,
    F: FnMut(&T) -> bool,
{
    let scan = async {
        while let Some(event) = events.next().await {
            if accept(&event) {
                return Some(event);
            }
        }
        None
    };
    timeout(window, scan).await.unwrap_or(None)
}

#[async_trait]
impl DeviceResolver for BluestResolver {
    type Handle = Device;

    async fn resolve(&self, address: &str) -> Option<Device> {
        if let Some(device) = self.connected_matching(address).await.into_iter().next() {
            return Some(device);
        }
        match self.scan_for(address).await {
            Ok(device) => {
                if device.is_none() {
                    debug!(address, "mower not visible");
                }
                device
            }
            Err(err) => {
                warn!(address, "scan failed: {err}");
                None
            }
        }
    }
}

#[async_trait]
impl StaleConnectionReclaimer for BluestResolver {
    async fn release_stale(&self, address: &str) {
        for device in self.connected_matching(address).await {
            debug!(address, "releasing stale connection");
            if let Err(err) = self.adapter.disconnect_device(&device).await {
                warn!(address, "failed to release stale connection: {err}");
            }
        }
    }
}

/// `DeviceId` only exposes its platform form through `Debug`; on Linux that
/// carries the MAC address.
fn matches_address(device: &Device, address: &str) -> bool {
    id_matches(&format!("{:?}", device.id()), address)
}

fn id_matches(id: &str, address: &str) -> bool {
    !address.is_empty() && id.to_ascii_uppercase().contains(&address.to_ascii_uppercase())
}

#[test]
fn test_id_matches_ignores_case() {
    assert!(id_matches("DeviceId(aa:bb:cc:dd:ee:ff)", "AA:BB:CC:DD:EE:FF"));
    assert!(!id_matches("DeviceId(AA:BB:CC:DD:EE:00)", "AA:BB:CC:DD:EE:FF"));
    assert!(!id_matches("DeviceId(AA:BB:CC:DD:EE:FF)", ""));
}

#[cfg(test)]
mod tests {
    use futures_util::stream;
    use tokio::time::{sleep, Instant};

    use super::*;

    const WINDOW: Duration = Duration::from_secs(10);

    /// Advertises `ids` in turn, one every second, forever.
    fn advertisements(ids: &'static [&'static str]) -> impl Stream<Item = &'static str> + Unpin {
        Box::pin(stream::iter(ids.iter().copied().cycle()).then(|id| async move {
            sleep(Duration::from_secs(1)).await;
            id
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_gives_up_while_other_devices_keep_advertising() {
        let start = Instant::now();
        let events = advertisements(&["DeviceId(11:22:33:44:55:66)"]);

        let found = first_within(events, WINDOW, |id| id_matches(id, "AA:BB:CC:DD:EE:FF")).await;

        assert_eq!(found, None);
        assert_eq!(start.elapsed(), WINDOW);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scan_returns_the_matching_device() {
        let events = advertisements(&["DeviceId(11:22:33:44:55:66)", "DeviceId(aa:bb:cc:dd:ee:ff)"]);

        let found = first_within(events, WINDOW, |id| id_matches(id, "AA:BB:CC:DD:EE:FF")).await;

        assert_eq!(found, Some("DeviceId(aa:bb:cc:dd:ee:ff)"));
    }
}
