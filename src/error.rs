//! Error types for the device managers.
//!
//! `DeviceError` is the single error type returned by every manager
//! operation. Using `thiserror`, each variant carries enough context to
//! render a descriptive message to the operator, and the driver-level cause
//! is kept as the error `source` so the full chain can be formatted.
//!
//! ## Error Taxonomy
//!
//! Variants are grouped into an [`ErrorKind`]:
//!
//! - **Construction**: the driver object for an endpoint could not be built.
//! - **Connection**: the driver-level connect request failed or the device
//!   still reported itself disconnected afterwards.
//! - **Initialization**: the post-connect capability, parameter or status
//!   read failed, or the polling thread could not be started.
//! - **Operation**: a command was rejected because a precondition did not
//!   hold (wrong connection state, unsupported feature, out-of-range value).
//! - **Driver**: a validated command was forwarded but the driver call
//!   itself failed.
//! - **FatalPolling**: a status read failed on the polling thread after the
//!   connection was established. This one is never returned from a call; it
//!   is delivered through the event bus and always forces a disconnect.
//!
//! Nothing in the core retries on error; reconnecting is always an explicit
//! caller action.

use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the manager error type.
pub type AppResult<T> = std::result::Result<T, DeviceError>;

/// Post-connect initialization step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    /// Reading the capability flags and axis ranges.
    Capabilities,
    /// Reading the static configuration parameters.
    Parameters,
    /// Reading the first status snapshot.
    Status,
    /// Spawning the polling thread.
    Polling,
}

impl InitStage {
    /// Operator-facing description of the step, for the given device name.
    pub fn describe(&self, device: &str) -> String {
        match self {
            InitStage::Capabilities => format!("Unable to determine the {device}'s capabilities"),
            InitStage::Parameters => {
                format!("Unable to determine the {device}'s configuration parameters")
            }
            InitStage::Status => format!("Unable to get the {device}'s status"),
            InitStage::Polling => "Unable to start the device polling".to_string(),
        }
    }
}

/// Broad category of a [`DeviceError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Driver object creation failed.
    Construction,
    /// Driver-level connect failed.
    Connection,
    /// Post-connect reads or polling start failed.
    Initialization,
    /// A command precondition was violated.
    Operation,
    /// A forwarded driver call failed.
    Driver,
    /// A status read failed on the polling thread.
    FatalPolling,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Construction => "construction",
            ErrorKind::Connection => "connection",
            ErrorKind::Initialization => "initialization",
            ErrorKind::Operation => "operation",
            ErrorKind::Driver => "driver",
            ErrorKind::FatalPolling => "fatal polling",
        };
        f.write_str(name)
    }
}

/// Error returned by every manager operation.
#[derive(Error, Debug)]
pub enum DeviceError {
    /// The driver factory failed.
    #[error("Unable to create the {device} object")]
    Construction {
        /// Device kind name
        device: &'static str,
        /// Factory failure
        #[source]
        source: anyhow::Error,
    },

    /// The connect request failed or the device stayed disconnected.
    #[error("Unable to connect to the {device}")]
    Connection {
        /// Device kind name
        device: &'static str,
        /// Driver failure
        #[source]
        source: anyhow::Error,
    },

    /// A post-connect step failed and the connection was rolled back.
    #[error("{}", stage.describe(device))]
    Initialization {
        /// Device kind name
        device: &'static str,
        /// Step that failed
        stage: InitStage,
        /// Driver failure
        #[source]
        source: anyhow::Error,
    },

    /// `connect` was called while a driver handle exists.
    #[error("The {device} is already connected")]
    AlreadyConnected {
        /// Device kind name
        device: &'static str,
    },

    /// A command needs a connected device.
    #[error("No {device} is connected")]
    NotConnected {
        /// Device kind name
        device: &'static str,
    },

    /// The command is not valid in the current state.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// An argument is out of range.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The device lacks the capability the command needs.
    #[error("The {device} does not support {feature}")]
    NotSupported {
        /// Device kind name
        device: &'static str,
        /// Missing capability
        feature: &'static str,
    },

    /// The driver call behind a validated command failed.
    #[error("The {device} driver rejected the command")]
    Driver {
        /// Device kind name
        device: &'static str,
        /// Driver failure
        #[source]
        source: anyhow::Error,
    },

    /// A status read failed on the polling thread.
    #[error(
        "An error occurred while reading data from the {device}. \
         The error is fatal and the {device} must be disconnected"
    )]
    FatalPolling {
        /// Device kind name
        device: &'static str,
        /// Failed status read
        #[source]
        source: anyhow::Error,
    },
}

impl DeviceError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeviceError::Construction { .. } => ErrorKind::Construction,
            DeviceError::Connection { .. } => ErrorKind::Connection,
            DeviceError::Initialization { .. } => ErrorKind::Initialization,
            DeviceError::AlreadyConnected { .. }
            | DeviceError::NotConnected { .. }
            | DeviceError::InvalidOperation(_)
            | DeviceError::InvalidValue(_)
            | DeviceError::NotSupported { .. } => ErrorKind::Operation,
            DeviceError::Driver { .. } => ErrorKind::Driver,
            DeviceError::FatalPolling { .. } => ErrorKind::FatalPolling,
        }
    }

    /// True for errors returned by a rejected command precondition.
    pub fn is_operation_error(&self) -> bool {
        self.kind() == ErrorKind::Operation
    }
}

/// Renders errors, including their source chain, for display to an operator.
///
/// Injected into each manager so presentation stays out of the core.
pub trait ErrorFormatter: Send + Sync {
    /// Format `error` and its causes into a single message.
    fn format(&self, error: &(dyn std::error::Error + 'static)) -> String;
}

/// Default formatter: the top-level message followed by each cause.
#[derive(Debug, Clone, Default)]
pub struct ChainFormatter {
    /// Maximum number of causes to include (`None` for all).
    pub max_causes: Option<usize>,
}

impl ErrorFormatter for ChainFormatter {
    fn format(&self, error: &(dyn std::error::Error + 'static)) -> String {
        let mut message = error.to_string();
        let mut source = error.source();
        let mut depth = 0;
        while let Some(cause) = source {
            if self.max_causes.is_some_and(|max| depth >= max) {
                break;
            }
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
            depth += 1;
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_error_display() {
        let err = DeviceError::InvalidOperation("telescope is slewing".to_string());
        assert_eq!(err.to_string(), "Invalid operation: telescope is slewing");
    }

    #[test]
    fn test_initialization_message_names_the_step() {
        let err = DeviceError::Initialization {
            device: "telescope",
            stage: InitStage::Parameters,
            source: anyhow!("timeout"),
        };
        assert_eq!(
            err.to_string(),
            "Unable to determine the telescope's configuration parameters"
        );
        assert_eq!(err.kind(), ErrorKind::Initialization);
    }

    #[test]
    fn test_operation_errors_are_grouped() {
        assert!(DeviceError::NotConnected { device: "focuser" }.is_operation_error());
        assert!(DeviceError::InvalidValue("rate".into()).is_operation_error());
        assert!(!DeviceError::Driver {
            device: "focuser",
            source: anyhow!("io")
        }
        .is_operation_error());
    }

    #[test]
    fn test_chain_formatter_includes_causes() {
        let err = DeviceError::Connection {
            device: "focuser",
            source: anyhow!("connection refused").context("PUT connected"),
        };
        let text = ChainFormatter::default().format(&err);
        assert_eq!(
            text,
            "Unable to connect to the focuser: PUT connected: connection refused"
        );

        let short = ChainFormatter {
            max_causes: Some(1),
        }
        .format(&err);
        assert_eq!(short, "Unable to connect to the focuser: PUT connected");
    }
}
