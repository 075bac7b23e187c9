//! Core traits and data types shared by every device manager.
//!
//! # Architecture Overview
//!
//! - [`Device`]: base driver trait every instrument driver implements
//!   (connection flag and descriptive properties).
//! - [`DeviceKind`]: binds a driver trait to its snapshot types and knows how
//!   to read them. `Telescope` and `Focuser` are the two kinds.
//! - [`DriverHandle`]: the single live connection owned by a manager. All
//!   driver calls go through its mutex so command writes from caller threads
//!   never interleave with reads from the polling thread.
//! - [`DriverFactory`]: builds a driver for an endpoint; injected into the
//!   manager so the transport stays outside the core.
//!
//! # Thread Safety
//!
//! Drivers only need to be `Send`: the handle's mutex provides the exclusive
//! access. Snapshot types are immutable and shared as `Arc`s.

use anyhow::Result;
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::config::DeviceSettings;

// =============================================================================
// Endpoint
// =============================================================================

/// Transport protocol of a device server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Plain HTTP
    #[default]
    Http,
    /// HTTP over TLS
    Https,
}

impl Protocol {
    /// URL scheme for this protocol.
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

/// Network location of one device: server address, device number, protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEndpoint {
    /// Host and port, e.g. `192.168.1.40:11111`
    pub address: String,
    /// Device number on the server
    pub device_number: u32,
    /// Transport protocol
    pub protocol: Protocol,
}

impl DeviceEndpoint {
    /// Create an endpoint.
    pub fn new(address: impl Into<String>, device_number: u32, protocol: Protocol) -> Self {
        Self {
            address: address.into(),
            device_number,
            protocol,
        }
    }
}

impl fmt::Display for DeviceEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}://{}#{}",
            self.protocol.as_str(),
            self.address,
            self.device_number
        )
    }
}

/// Whether a manager currently owns a live driver handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    /// No driver handle exists.
    Disconnected,
    /// A driver handle exists and a polling session is running.
    Connected,
}

// =============================================================================
// Driver traits
// =============================================================================

/// Base interface for every device driver.
///
/// Every call may fail; no call carries an implicit timeout, so a hung
/// transport blocks the calling thread.
pub trait Device: Send {
    /// Current connection flag reported by the device.
    fn connected(&self) -> Result<bool>;

    /// Request connection or disconnection.
    fn set_connected(&self, connected: bool) -> Result<()>;

    /// Short device name.
    fn name(&self) -> Result<String>;

    /// Longer description of the device.
    fn description(&self) -> Result<String>;

    /// Driver description text.
    fn driver_info(&self) -> Result<String>;

    /// Driver version string.
    fn driver_version(&self) -> Result<String>;

    /// Revision of the device interface the driver implements.
    fn interface_version(&self) -> Result<i32>;

    /// Vendor-specific actions the driver supports.
    fn supported_actions(&self) -> Result<Vec<String>>;
}

/// A family of devices managed by [`crate::manager::DeviceManager`].
///
/// Binds the driver trait object to the three snapshot types and provides
/// the reads that build them.
pub trait DeviceKind: fmt::Debug + Clone + Copy + Send + Sync + 'static {
    /// Lower-case device name used in messages and thread names.
    const NAME: &'static str;

    /// Driver trait object for this kind.
    type Driver: Device + ?Sized;
    /// Capability flags and fixed ranges, read once per connection.
    type Capabilities: fmt::Debug + Clone + Default + Serialize + Send + Sync + 'static;
    /// Static configuration values, read once per connection.
    type Parameters: fmt::Debug + Clone + Serialize + Send + Sync + 'static;
    /// Time-varying status, read on every poll.
    type Status: fmt::Debug + Clone + Default + Serialize + Send + Sync + 'static;

    /// Parameters shown while no device is connected.
    fn disconnected_parameters(settings: &DeviceSettings) -> Self::Parameters;

    /// Read the capability snapshot.
    fn read_capabilities(driver: &Self::Driver) -> Result<Self::Capabilities>;

    /// Read the parameter snapshot.
    fn read_parameters(driver: &Self::Driver) -> Result<Self::Parameters>;

    /// Read a status snapshot. Fields the device does not support degrade to
    /// sentinels; an error here is fatal to the polling session.
    fn read_status(driver: &Self::Driver) -> Result<Self::Status>;

    /// True when the snapshot reports the device is moving or slewing.
    fn is_moving(status: &Self::Status) -> bool;
}

// =============================================================================
// Driver handle and factory
// =============================================================================

/// Builds a driver for an endpoint.
pub type DriverFactory<K> =
    Arc<dyn Fn(&DeviceEndpoint) -> Result<Box<<K as DeviceKind>::Driver>> + Send + Sync>;

/// The live connection to one device.
///
/// Cloning shares the same driver; the manager hands one clone to the
/// polling thread for the lifetime of a session.
pub struct DriverHandle<K: DeviceKind> {
    driver: Arc<Mutex<Box<K::Driver>>>,
}

impl<K: DeviceKind> DriverHandle<K> {
    /// Wrap a freshly built driver.
    pub fn new(driver: Box<K::Driver>) -> Self {
        Self {
            driver: Arc::new(Mutex::new(driver)),
        }
    }

    /// Exclusive access to the driver for the duration of the guard.
    pub fn lock(&self) -> MutexGuard<'_, Box<K::Driver>> {
        self.driver.lock()
    }
}

impl<K: DeviceKind> Clone for DriverHandle<K> {
    fn clone(&self) -> Self {
        Self {
            driver: Arc::clone(&self.driver),
        }
    }
}

impl<K: DeviceKind> fmt::Debug for DriverHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverHandle")
            .field("kind", &K::NAME)
            .field("shared", &Arc::strong_count(&self.driver))
            .finish()
    }
}

/// Read an optional property, substituting `fallback` when the device
/// raises an error for it.
pub(crate) fn read_or<T>(read: Result<T>, fallback: T) -> T {
    read.unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_endpoint_display() {
        let endpoint = DeviceEndpoint::new("192.168.1.40:11111", 1, Protocol::Https);
        assert_eq!(endpoint.to_string(), "https://192.168.1.40:11111#1");
    }

    #[test]
    fn test_read_or_falls_back_on_error() {
        assert_eq!(read_or(Ok(3), 0), 3);
        assert!(read_or::<f64>(Err(anyhow!("not implemented")), f64::NAN).is_nan());
    }
}
