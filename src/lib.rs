//! Core library for astro-control.
//!
//! Connection lifecycle, background status polling and command handling for
//! networked telescope mounts and focusers. A [`DeviceManager`] owns one
//! device: it connects through a [`DriverFactory`], publishes snapshots on an
//! [`EventBus`] and exposes the device-specific commands of
//! [`TelescopeManager`] and [`FocuserManager`].

pub mod config;
pub mod core;
pub mod error;
pub mod events;
pub mod focuser;
pub mod hardware;
pub mod manager;
pub mod polling;
pub mod telescope;

pub use crate::config::{AppConfig, DeviceSettings, PollingConfig};
pub use crate::core::{
    ConnectionState, Device, DeviceEndpoint, DeviceKind, DriverFactory, DriverHandle, Protocol,
};
pub use crate::error::{AppResult, ChainFormatter, DeviceError, ErrorFormatter, ErrorKind};
pub use crate::events::{DeviceEvent, EventBus, Subscription};
pub use crate::focuser::{Focuser, FocuserManager};
pub use crate::manager::{DeviceManager, ManagerOptions};
pub use crate::telescope::{Telescope, TelescopeManager};
