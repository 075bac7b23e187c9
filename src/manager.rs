//! Generic device manager: connection lifecycle and snapshot ownership.
//!
//! `DeviceManager<K>` owns at most one [`DriverHandle`] and the
//! [`PollingSession`] that goes with it. Both are created together by
//! [`DeviceManager::connect`] and released together by
//! [`DeviceManager::disconnect`] or by fatal-error recovery.
//!
//! # Locking
//!
//! The connection mutex guards the handle and the session. Commands hold it
//! for their whole duration, then take the driver mutex for each driver call.
//! The polling thread only ever takes the driver mutex, so joining it while
//! holding the connection mutex cannot deadlock.
//!
//! # Fatal-error recovery
//!
//! When the poller fails it spawns a short-lived recovery thread carrying the
//! session id. The recovery thread takes the connection mutex and tears the
//! connection down only if that session is still the current one, so a user
//! `disconnect` racing recovery results in exactly one teardown.

use parking_lot::{Mutex, MutexGuard, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, DeviceSettings, PollingConfig};
use crate::core::{
    ConnectionState, Device, DeviceEndpoint, DeviceKind, DriverFactory, DriverHandle,
};
use crate::error::{AppResult, ChainFormatter, DeviceError, ErrorFormatter, InitStage};
use crate::events::{DeviceEvent, EventBus, Subscription};
use crate::polling::{PollContext, PollingSession, PostMotionQueue, StatusCell};

/// Collaborators and settings injected into a manager.
#[derive(Clone)]
pub struct ManagerOptions {
    /// Settings of the device this manager drives
    pub settings: DeviceSettings,
    /// Poll interval tiers
    pub polling: PollingConfig,
    /// Events buffered per subscriber
    pub event_capacity: usize,
    /// Renders error chains for logs and `last_connect_error`
    pub formatter: Arc<dyn ErrorFormatter>,
}

impl ManagerOptions {
    /// Options for `settings` with default polling and formatting.
    pub fn new(settings: DeviceSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    /// Options taken from the loaded application config.
    pub fn from_config(config: &AppConfig, settings: &DeviceSettings) -> Self {
        Self {
            settings: settings.clone(),
            polling: config.polling,
            event_capacity: config.events.channel_capacity,
            formatter: Arc::new(ChainFormatter::default()),
        }
    }

    /// Replace the poll intervals.
    pub fn with_polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Replace the error formatter.
    pub fn with_formatter(mut self, formatter: Arc<dyn ErrorFormatter>) -> Self {
        self.formatter = formatter;
        self
    }
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            settings: DeviceSettings::default(),
            polling: PollingConfig::default(),
            event_capacity: crate::config::EventConfig::default().channel_capacity,
            formatter: Arc::new(ChainFormatter::default()),
        }
    }
}

impl fmt::Debug for ManagerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagerOptions")
            .field("settings", &self.settings)
            .field("polling", &self.polling)
            .field("event_capacity", &self.event_capacity)
            .finish_non_exhaustive()
    }
}

/// Handle and session of the live connection. Both present or both absent.
struct Connection<K: DeviceKind> {
    handle: Option<DriverHandle<K>>,
    session: Option<PollingSession>,
    endpoint: Option<DeviceEndpoint>,
}

pub(crate) struct Shared<K: DeviceKind> {
    options: ManagerOptions,
    factory: DriverFactory<K>,
    bus: Arc<EventBus<K>>,
    connection: Mutex<Connection<K>>,
    capabilities: RwLock<Arc<K::Capabilities>>,
    parameters: RwLock<Arc<K::Parameters>>,
    status: StatusCell<K>,
    after_motion: Arc<PostMotionQueue<K>>,
    next_session: AtomicU64,
    last_connect_error: Mutex<Option<String>>,
}

/// Connection, polling and snapshot owner for one device of kind `K`.
///
/// Device-specific commands live in `impl DeviceManager<Telescope>` and
/// `impl DeviceManager<Focuser>`.
pub struct DeviceManager<K: DeviceKind> {
    shared: Arc<Shared<K>>,
}

/// Exclusive access to a connected device for the duration of a command.
///
/// Holding it keeps the connection mutex, so the device cannot be torn down
/// underneath the command.
pub(crate) struct ConnectedDevice<'a, K: DeviceKind> {
    connection: MutexGuard<'a, Connection<K>>,
    handle: DriverHandle<K>,
}

impl<K: DeviceKind> ConnectedDevice<'_, K> {
    /// Lock the driver for one or more calls.
    pub(crate) fn driver(&self) -> MutexGuard<'_, Box<K::Driver>> {
        self.handle.lock()
    }

    /// Wake the poller so the effect of the command is published promptly.
    pub(crate) fn refresh(&self) {
        if let Some(session) = &self.connection.session {
            session.wake();
        }
    }
}

impl<K: DeviceKind> DeviceManager<K> {
    /// Create a disconnected manager that builds drivers with `factory`.
    pub fn new(factory: DriverFactory<K>, options: ManagerOptions) -> Self {
        let parameters = K::disconnected_parameters(&options.settings);
        let shared = Shared {
            bus: Arc::new(EventBus::new(options.event_capacity)),
            factory,
            connection: Mutex::new(Connection {
                handle: None,
                session: None,
                endpoint: None,
            }),
            capabilities: RwLock::new(Arc::new(K::Capabilities::default())),
            parameters: RwLock::new(Arc::new(parameters)),
            status: Arc::new(RwLock::new(Arc::new(K::Status::default()))),
            after_motion: Arc::new(PostMotionQueue::new()),
            next_session: AtomicU64::new(0),
            last_connect_error: Mutex::new(None),
            options,
        };
        Self {
            shared: Arc::new(shared),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Connect to the device at `endpoint` and start polling.
    ///
    /// Rejected with [`DeviceError::AlreadyConnected`] while a connection
    /// exists. On any failure the manager is left disconnected and the
    /// formatted cause is kept for [`Self::last_connect_error`].
    pub fn connect(&self, endpoint: &DeviceEndpoint) -> AppResult<()> {
        Shared::connect(&self.shared, endpoint)
    }

    /// Connect to the endpoint named in the configured settings.
    pub fn connect_configured(&self) -> AppResult<()> {
        let endpoint = self.shared.options.settings.endpoint();
        self.connect(&endpoint)
    }

    /// Stop polling, release the driver and publish the default snapshots.
    ///
    /// Fails with [`DeviceError::InvalidOperation`] when nothing is connected.
    pub fn disconnect(&self) -> AppResult<()> {
        let mut connection = self.shared.connection.lock();
        if connection.handle.is_none() {
            return Err(DeviceError::InvalidOperation(format!(
                "disconnect was called when no {} is connected",
                K::NAME
            )));
        }
        self.shared.teardown(&mut connection);
        Ok(())
    }

    /// Wake the poller for an immediate status read. No-op when disconnected.
    pub fn immediate_status_update(&self) {
        if let Some(session) = &self.shared.connection.lock().session {
            debug!("{} immediate status update requested", K::NAME);
            session.wake();
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        if self.shared.connection.lock().handle.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    /// True while a driver handle exists.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// True while the polling thread of the current session is alive.
    pub fn is_polling(&self) -> bool {
        self.shared
            .connection
            .lock()
            .session
            .as_ref()
            .is_some_and(PollingSession::is_running)
    }

    /// Endpoint of the live connection.
    pub fn endpoint(&self) -> Option<DeviceEndpoint> {
        self.shared.connection.lock().endpoint.clone()
    }

    /// Latest capability snapshot.
    pub fn capabilities(&self) -> Arc<K::Capabilities> {
        self.shared.capabilities.read().clone()
    }

    /// Latest parameter snapshot.
    pub fn parameters(&self) -> Arc<K::Parameters> {
        self.shared.parameters.read().clone()
    }

    /// Latest status snapshot.
    pub fn status(&self) -> Arc<K::Status> {
        self.shared.status.read().clone()
    }

    /// Formatted cause of the most recent failed connect, cleared on success.
    pub fn last_connect_error(&self) -> Option<String> {
        self.shared.last_connect_error.lock().clone()
    }

    /// Subscribe to this manager's events.
    pub fn subscribe(&self) -> Subscription<K> {
        self.shared.bus.subscribe()
    }

    /// Options the manager was built with.
    pub fn options(&self) -> &ManagerOptions {
        &self.shared.options
    }

    // =========================================================================
    // Command support
    // =========================================================================

    /// The connected device, or `None` when disconnected.
    pub(crate) fn device(&self) -> Option<ConnectedDevice<'_, K>> {
        let connection = self.shared.connection.lock();
        let handle = connection.handle.clone()?;
        Some(ConnectedDevice { connection, handle })
    }

    /// The connected device, or [`DeviceError::NotConnected`].
    pub(crate) fn require_device(&self) -> AppResult<ConnectedDevice<'_, K>> {
        self.device()
            .ok_or(DeviceError::NotConnected { device: K::NAME })
    }

    pub(crate) fn publish(&self, event: DeviceEvent<K>) {
        self.shared.bus.publish(event);
    }

    pub(crate) fn after_motion(&self) -> &PostMotionQueue<K> {
        &self.shared.after_motion
    }
}

impl<K: DeviceKind> Drop for DeviceManager<K> {
    fn drop(&mut self) {
        let mut connection = self.shared.connection.lock();
        if connection.handle.is_some() {
            self.shared.teardown(&mut connection);
        }
    }
}

impl<K: DeviceKind> fmt::Debug for DeviceManager<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceManager")
            .field("kind", &K::NAME)
            .field("state", &self.state())
            .finish()
    }
}

/// Map a failed forwarded driver call.
pub(crate) fn forward<K: DeviceKind, T>(result: anyhow::Result<T>) -> AppResult<T> {
    result.map_err(|source| DeviceError::Driver {
        device: K::NAME,
        source,
    })
}

impl<K: DeviceKind> Shared<K> {
    fn connect(this: &Arc<Self>, endpoint: &DeviceEndpoint) -> AppResult<()> {
        let mut connection = this.connection.lock();
        if connection.handle.is_some() {
            return Err(DeviceError::AlreadyConnected { device: K::NAME });
        }

        info!("Connecting to {} at {}", K::NAME, endpoint);
        let result = Self::open(this, &mut connection, endpoint);
        match &result {
            Ok(()) => {
                *this.last_connect_error.lock() = None;
                info!("{} connected at {}", K::NAME, endpoint);
            }
            Err(e) => {
                let message = this.options.formatter.format(e);
                warn!("{}", message);
                *this.last_connect_error.lock() = Some(message);
            }
        }
        result
    }

    fn open(
        this: &Arc<Self>,
        connection: &mut Connection<K>,
        endpoint: &DeviceEndpoint,
    ) -> AppResult<()> {
        let driver = (this.factory)(endpoint).map_err(|source| DeviceError::Construction {
            device: K::NAME,
            source,
        })?;
        let handle = DriverHandle::<K>::new(driver);

        Self::establish(&handle)?;

        match Self::initialize(this, &handle) {
            Ok(session) => {
                connection.handle = Some(handle);
                connection.session = Some(session);
                connection.endpoint = Some(endpoint.clone());
                Ok(())
            }
            Err(e) => {
                if let Err(disconnect) = handle.lock().set_connected(false) {
                    warn!("{} rollback disconnect failed: {:#}", K::NAME, disconnect);
                }
                drop(handle);
                this.after_motion.clear();
                this.publish_defaults();
                this.bus.publish(DeviceEvent::Disconnected);
                Err(e)
            }
        }
    }

    /// Ask the driver to connect unless it already reports connected.
    fn establish(handle: &DriverHandle<K>) -> AppResult<()> {
        let connection_error = |source: anyhow::Error| DeviceError::Connection {
            device: K::NAME,
            source,
        };

        let driver = handle.lock();
        if driver.connected().map_err(connection_error)? {
            return Ok(());
        }
        driver.set_connected(true).map_err(connection_error)?;
        if driver.connected().map_err(connection_error)? {
            Ok(())
        } else {
            Err(connection_error(anyhow::anyhow!(
                "the device still reports disconnected after the connect request"
            )))
        }
    }

    /// Read and publish the connect-time snapshots, then start polling.
    fn initialize(this: &Arc<Self>, handle: &DriverHandle<K>) -> AppResult<PollingSession> {
        let stage_error = |stage: InitStage| {
            move |source: anyhow::Error| DeviceError::Initialization {
                device: K::NAME,
                stage,
                source,
            }
        };

        {
            let driver = handle.lock();

            let capabilities =
                Arc::new(K::read_capabilities(&**driver).map_err(stage_error(InitStage::Capabilities))?);
            *this.capabilities.write() = Arc::clone(&capabilities);
            this.bus.publish(DeviceEvent::CapabilitiesUpdate(capabilities));

            let parameters =
                Arc::new(K::read_parameters(&**driver).map_err(stage_error(InitStage::Parameters))?);
            *this.parameters.write() = Arc::clone(&parameters);
            this.bus.publish(DeviceEvent::ParametersUpdate(parameters));

            let status = Arc::new(K::read_status(&**driver).map_err(stage_error(InitStage::Status))?);
            *this.status.write() = Arc::clone(&status);
            this.bus.publish(DeviceEvent::StatusUpdate(status));
        }

        this.after_motion.clear();
        let id = this.next_session.fetch_add(1, Ordering::Relaxed) + 1;
        let context = PollContext {
            handle: handle.clone(),
            bus: Arc::clone(&this.bus),
            status: Arc::clone(&this.status),
            after_motion: Arc::clone(&this.after_motion),
            intervals: this.options.polling,
        };
        let recovery = Arc::downgrade(this);
        PollingSession::start(id, context, move |error| {
            Self::spawn_recovery(recovery, id, error);
        })
    }

    /// Runs on the failing polling thread; must not touch the connection.
    fn spawn_recovery(shared: Weak<Self>, session: u64, error: Arc<DeviceError>) {
        let spawned = thread::Builder::new()
            .name(format!("{}-recovery", K::NAME))
            .spawn(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.recover(session, &error);
                }
            });
        if let Err(e) = spawned {
            error!("Unable to start {} recovery: {}", K::NAME, e);
        }
    }

    /// Disconnect after a fatal polling error, unless the failing session
    /// has already been torn down.
    fn recover(&self, session: u64, error: &DeviceError) {
        let mut connection = self.connection.lock();
        let current = connection.session.as_ref().map(PollingSession::id);
        if current != Some(session) {
            debug!("{} session {} already torn down", K::NAME, session);
            return;
        }
        error!("{}", self.options.formatter.format(error));
        self.teardown(&mut connection);
    }

    fn teardown(&self, connection: &mut Connection<K>) {
        if let Some(mut session) = connection.session.take() {
            session.shutdown();
        }
        if let Some(handle) = connection.handle.take() {
            if let Err(e) = handle.lock().set_connected(false) {
                warn!("{} disconnect request failed: {:#}", K::NAME, e);
            }
        }
        let endpoint = connection.endpoint.take();
        self.after_motion.clear();
        self.publish_defaults();
        self.bus.publish(DeviceEvent::Disconnected);
        match endpoint {
            Some(endpoint) => info!("{} at {} disconnected", K::NAME, endpoint),
            None => info!("{} disconnected", K::NAME),
        }
    }

    fn publish_defaults(&self) {
        let capabilities = Arc::new(K::Capabilities::default());
        *self.capabilities.write() = Arc::clone(&capabilities);

        let parameters = Arc::new(K::disconnected_parameters(&self.options.settings));
        *self.parameters.write() = Arc::clone(&parameters);

        let status = Arc::new(K::Status::default());
        *self.status.write() = Arc::clone(&status);

        self.bus.publish(DeviceEvent::StatusUpdate(status));
        self.bus.publish(DeviceEvent::CapabilitiesUpdate(capabilities));
        self.bus.publish(DeviceEvent::ParametersUpdate(parameters));
    }
}
