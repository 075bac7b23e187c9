//! Background status polling.
//!
//! One [`PollingSession`] runs per connection on a dedicated OS thread. Each
//! iteration reads a status snapshot, stores and publishes it, then sleeps on
//! a [`WakeSignal`] for the fast or normal interval. Setting the signal from
//! any thread cuts the sleep short, which is how commands request an
//! immediate refresh and how shutdown reaches a sleeping poller.
//!
//! A failed status read is fatal: the loop publishes
//! [`DeviceEvent::PollingException`] once, hands the error to the manager's
//! recovery callback, and returns. The thread never takes the manager's
//! connection lock, so a caller blocked in `disconnect` can always join it.

use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

use crate::config::PollingConfig;
use crate::core::{DeviceKind, DriverHandle};
use crate::error::{AppResult, DeviceError, InitStage};
use crate::events::{DeviceEvent, EventBus};

/// Latest status snapshot, shared between the manager and its poller.
pub type StatusCell<K> = Arc<RwLock<Arc<<K as DeviceKind>::Status>>>;

// =============================================================================
// Wake signal
// =============================================================================

/// Auto-reset event: `set` wakes the waiter, which clears the flag.
#[derive(Debug, Default)]
pub struct WakeSignal {
    fired: Mutex<bool>,
    condvar: Condvar,
}

impl WakeSignal {
    /// Create an unset signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal. Callable from any thread.
    pub fn set(&self) {
        let mut fired = self.fired.lock();
        *fired = true;
        self.condvar.notify_all();
    }

    /// True if the signal is set and nobody has consumed it yet.
    pub fn is_set(&self) -> bool {
        *self.fired.lock()
    }

    /// Wait until the signal is set or `timeout` elapses.
    ///
    /// Returns `true` if the signal fired; the flag is cleared before
    /// returning so the next wait starts fresh.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut fired = self.fired.lock();
        while !*fired {
            if self.condvar.wait_until(&mut fired, deadline).timed_out() {
                break;
            }
        }
        std::mem::replace(&mut *fired, false)
    }
}

// =============================================================================
// Interval policy
// =============================================================================

impl PollingConfig {
    /// Sleep interval after a snapshot: fast while moving, normal otherwise.
    pub fn interval_for(&self, moving: bool) -> Duration {
        if moving {
            self.fast_interval
        } else {
            self.normal_interval
        }
    }
}

// =============================================================================
// Post-motion actions
// =============================================================================

/// Driver call deferred until a poll reports the device has stopped moving.
pub type PostMotionAction<K> =
    Box<dyn FnOnce(&<K as DeviceKind>::Driver) -> anyhow::Result<()> + Send>;

/// Actions to run once motion ends, such as restoring temperature
/// compensation after a focuser move.
///
/// The poller takes the pending actions under the same driver lock it reads
/// status with, so an action queued alongside a move is only considered by a
/// read that already sees that move. Every [`clear`](Self::clear) starts a
/// new generation; actions taken from an older generation are neither
/// restored nor run.
pub struct PostMotionQueue<K: DeviceKind> {
    pending: Mutex<Pending<K>>,
}

struct Pending<K: DeviceKind> {
    actions: Vec<PostMotionAction<K>>,
    generation: u64,
}

impl<K: DeviceKind> PostMotionQueue<K> {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(Pending {
                actions: Vec::new(),
                generation: 0,
            }),
        }
    }

    /// Queue an action for the next idle poll.
    pub fn push<F>(&self, action: F)
    where
        F: FnOnce(&K::Driver) -> anyhow::Result<()> + Send + 'static,
    {
        self.pending.lock().actions.push(Box::new(action));
    }

    /// Number of pending actions.
    pub fn len(&self) -> usize {
        self.pending.lock().actions.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.lock().actions.is_empty()
    }

    /// Drop every pending action, including any a poll has already taken.
    pub fn clear(&self) {
        let mut pending = self.pending.lock();
        pending.actions.clear();
        pending.generation = pending.generation.wrapping_add(1);
    }

    fn take(&self) -> (Vec<PostMotionAction<K>>, u64) {
        let mut pending = self.pending.lock();
        (std::mem::take(&mut pending.actions), pending.generation)
    }

    fn is_current(&self, generation: u64) -> bool {
        self.pending.lock().generation == generation
    }

    fn restore(&self, mut actions: Vec<PostMotionAction<K>>, generation: u64) {
        if actions.is_empty() {
            return;
        }
        let mut pending = self.pending.lock();
        if pending.generation != generation {
            debug!("{} dropped {} cleared post-motion actions", K::NAME, actions.len());
            return;
        }
        actions.append(&mut pending.actions);
        pending.actions = actions;
    }
}

impl<K: DeviceKind> Default for PostMotionQueue<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: DeviceKind> fmt::Debug for PostMotionQueue<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostMotionQueue")
            .field("pending", &self.len())
            .finish()
    }
}

// =============================================================================
// Polling session
// =============================================================================

/// Everything the polling thread needs. Holds no reference to the manager.
pub(crate) struct PollContext<K: DeviceKind> {
    pub handle: DriverHandle<K>,
    pub bus: Arc<EventBus<K>>,
    pub status: StatusCell<K>,
    pub after_motion: Arc<PostMotionQueue<K>>,
    pub intervals: PollingConfig,
}

/// The polling thread of one connection plus its stop flag and wake signal.
pub struct PollingSession {
    id: u64,
    stop: Arc<AtomicBool>,
    wake: Arc<WakeSignal>,
    thread: Option<JoinHandle<()>>,
}

impl PollingSession {
    /// Spawn the polling thread.
    ///
    /// `on_fatal` runs on the polling thread after a fatal read has been
    /// published, just before the thread returns. It must not block on the
    /// manager's connection lock.
    pub(crate) fn start<K, F>(id: u64, context: PollContext<K>, on_fatal: F) -> AppResult<Self>
    where
        K: DeviceKind,
        F: FnOnce(Arc<DeviceError>) + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let wake = Arc::new(WakeSignal::new());

        let thread = {
            let stop = Arc::clone(&stop);
            let wake = Arc::clone(&wake);
            thread::Builder::new()
                .name(format!("{}-poll", K::NAME))
                .spawn(move || poll_loop(id, context, &stop, &wake, on_fatal))
                .map_err(|e| DeviceError::Initialization {
                    device: K::NAME,
                    stage: InitStage::Polling,
                    source: anyhow::Error::new(e),
                })?
        };

        debug!("{} polling session {} started", K::NAME, id);
        Ok(Self {
            id,
            stop,
            wake,
            thread: Some(thread),
        })
    }

    /// Identifier distinguishing this session from earlier ones.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Cut the current sleep short and poll now.
    pub fn wake(&self) {
        self.wake.set();
    }

    /// True until the polling thread has returned.
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the loop and wait for the thread to exit.
    ///
    /// Idempotent. Called from the polling thread itself it skips the join.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.wake.set();

        let Some(thread) = self.thread.take() else {
            return;
        };
        if thread.thread().id() == thread::current().id() {
            return;
        }
        if thread.join().is_err() {
            error!("polling session {} panicked", self.id);
        }
    }
}

impl Drop for PollingSession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl fmt::Debug for PollingSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollingSession")
            .field("id", &self.id)
            .field("running", &self.is_running())
            .finish()
    }
}

fn poll_loop<K, F>(id: u64, context: PollContext<K>, stop: &AtomicBool, wake: &WakeSignal, on_fatal: F)
where
    K: DeviceKind,
    F: FnOnce(Arc<DeviceError>),
{
    loop {
        if stop.load(Ordering::Acquire) {
            debug!("{} polling session {} stopped", K::NAME, id);
            return;
        }

        let (read, ready, generation) = {
            let driver = context.handle.lock();
            let (ready, generation) = context.after_motion.take();
            (K::read_status(&**driver), ready, generation)
        };

        let status = match read {
            Ok(status) => Arc::new(status),
            Err(source) => {
                let error = Arc::new(DeviceError::FatalPolling {
                    device: K::NAME,
                    source,
                });
                error!("{} polling session {} failed: {:#}", K::NAME, id, error);
                context
                    .bus
                    .publish(DeviceEvent::PollingException(Arc::clone(&error)));
                on_fatal(error);
                return;
            }
        };

        let moving = K::is_moving(&status);
        *context.status.write() = Arc::clone(&status);
        context.bus.publish(DeviceEvent::StatusUpdate(status));

        if moving {
            context.after_motion.restore(ready, generation);
        } else if !ready.is_empty() {
            let driver = context.handle.lock();
            if context.after_motion.is_current(generation) {
                for action in ready {
                    if let Err(e) = action(&**driver) {
                        warn!("{} post-motion action failed: {:#}", K::NAME, e);
                    }
                }
            } else {
                debug!("{} post-motion actions cleared before they ran", K::NAME);
            }
        }

        let interval = context.intervals.interval_for(moving);
        if wake.wait_timeout(interval) {
            debug!("{} polling session {} woken early", K::NAME, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_follows_motion() {
        let config = PollingConfig::default();
        assert_eq!(config.interval_for(true), Duration::from_secs(1));
        assert_eq!(config.interval_for(false), Duration::from_secs(5));
    }

    #[test]
    fn test_cleared_actions_are_not_restored() {
        let queue = PostMotionQueue::<crate::focuser::Focuser>::new();
        queue.push(|_| Ok(()));

        let (taken, generation) = queue.take();
        assert_eq!(taken.len(), 1);
        assert!(queue.is_empty());

        queue.clear();
        assert!(!queue.is_current(generation));
        queue.restore(taken, generation);
        assert!(queue.is_empty());

        queue.push(|_| Ok(()));
        let (taken, generation) = queue.take();
        queue.restore(taken, generation);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_wait_times_out_when_not_set() {
        let signal = WakeSignal::new();
        let started = Instant::now();
        assert!(!signal.wait_timeout(Duration::from_millis(30)));
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_signal_is_auto_reset() {
        let signal = WakeSignal::new();
        signal.set();
        assert!(signal.is_set());
        assert!(signal.wait_timeout(Duration::from_secs(5)));
        assert!(!signal.is_set());
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_set_interrupts_wait_from_another_thread() {
        let signal = Arc::new(WakeSignal::new());
        let waiter = {
            let signal = Arc::clone(&signal);
            thread::spawn(move || {
                let started = Instant::now();
                let fired = signal.wait_timeout(Duration::from_secs(10));
                (fired, started.elapsed())
            })
        };

        thread::sleep(Duration::from_millis(50));
        signal.set();

        let (fired, elapsed) = waiter.join().unwrap();
        assert!(fired);
        assert!(elapsed < Duration::from_secs(5), "wait took {elapsed:?}");
    }
}
