use thiserror::Error;

use crate::session::ResponseResult;

/// A failure talking to the mower over the wireless link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No connectable handle was available for the peripheral.
    #[error("peripheral is not reachable")]
    Unreachable,

    /// A request was issued on a session that is not connected.
    #[error("session is not connected")]
    NotConnected,

    /// The notification stream ended while waiting for a response.
    #[error("peripheral disconnected")]
    Disconnected,

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("the peripheral does not expose the {0}")]
    MissingCharacteristic(&'static str),

    #[error("bluetooth error: {0}")]
    Bluetooth(#[from] bluest::Error),

    /// The response frame could not be assembled or was rejected by the codec.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A response was framed correctly but its content had the wrong shape.
    #[error("invalid value: {0}")]
    Value(String),
}

impl TransportError {
    /// Whether the error says something about the health of the link itself,
    /// as opposed to the content of a well-formed response. A frame that could
    /// not be assembled counts against the link.
    pub fn is_link_error(&self) -> bool {
        !matches!(self, Self::Value(_))
    }
}

/// Why the Reconnect Procedure did not produce a connected session.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("peripheral answered {0:?}")]
    Rejected(ResponseResult),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// A poll cycle that produced no update. The previously published snapshot
/// stays in place.
#[derive(Debug, Error)]
pub enum UpdateFailed {
    #[error("failed to connect: {0}")]
    ConnectFailed(#[source] ConnectError),

    /// A core field came back empty although no error was raised.
    #[error("error getting data from device: {field} was empty")]
    NoData { field: &'static str },

    #[error("error getting data from device: {0}")]
    Device(#[source] TransportError),

    #[error("unexpected response from device: {0}")]
    Unexpected(#[source] TransportError),

    #[error("coordinator has been shut down")]
    ShutDown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_value_errors_are_not_link_errors() {
        assert!(!TransportError::Value("Data length mismatch".into()).is_link_error());
        assert!(TransportError::Protocol("message incomplete: 0103".into()).is_link_error());
        assert!(TransportError::Disconnected.is_link_error());
        assert!(TransportError::Unreachable.is_link_error());
        assert!(TransportError::Timeout("handshake").is_link_error());
    }

    #[test]
    fn no_data_names_the_field() {
        let err = UpdateFailed::NoData { field: "battery_level" };
        assert_eq!(
            err.to_string(),
            "error getting data from device: battery_level was empty"
        );
    }
}
