//! Common test utilities for astro-control integration tests
//!
//! This module provides reusable test helpers for:
//! - Timing assertions with appropriate tolerances
//! - Environment-aware tolerance selection
//! - Waiting on and collecting manager events

#![allow(dead_code)] // Utilities may not all be used by every test binary

use astro_control::config::PollingConfig;
use astro_control::{DeviceEvent, DeviceKind, ManagerOptions, Subscription};
use std::time::{Duration, Instant};

/// Tolerance levels for real-time timing assertions.
#[derive(Debug, Clone, Copy)]
pub enum TimingTolerance {
    /// 5% tolerance - only for stable, controlled environments
    Tight,
    /// 20% tolerance - default for local development
    Normal,
    /// 50% tolerance - for CI environments with variable load
    Relaxed,
}

impl TimingTolerance {
    /// Get the tolerance factor as a fraction (0.0 to 1.0)
    pub fn factor(&self) -> f64 {
        match self {
            TimingTolerance::Tight => 0.05,
            TimingTolerance::Normal => 0.20,
            TimingTolerance::Relaxed => 0.50,
        }
    }
}

/// Assert that a duration is within tolerance of an expected value.
///
/// # Panics
/// Panics if the actual duration is outside the tolerance range.
pub fn assert_duration_near(
    actual: Duration,
    expected: Duration,
    tolerance: TimingTolerance,
    context: &str,
) {
    let factor = tolerance.factor();
    let min = expected.mul_f64(1.0 - factor);
    let max = expected.mul_f64(1.0 + factor);

    assert!(
        actual >= min && actual <= max,
        "{}: expected {:?} ±{:.0}%, got {:?} (acceptable range: {:?} to {:?})",
        context,
        expected,
        factor * 100.0,
        actual,
        min,
        max
    );
}

/// Get appropriate timing tolerance based on environment.
///
/// Returns:
/// - `Tight` if TIMING_STRICT env var is set
/// - `Relaxed` otherwise; poll threads share the machine with the test runner
pub fn env_timing_tolerance() -> TimingTolerance {
    if std::env::var("TIMING_STRICT").is_ok() {
        TimingTolerance::Tight
    } else {
        TimingTolerance::Relaxed
    }
}

/// Fast interval used by [`test_options`].
pub const FAST: Duration = Duration::from_millis(20);
/// Normal interval used by [`test_options`].
pub const NORMAL: Duration = Duration::from_millis(300);

/// Manager options with short poll intervals.
pub fn test_options() -> ManagerOptions {
    ManagerOptions::default().with_polling(PollingConfig {
        fast_interval: FAST,
        normal_interval: NORMAL,
        slow_interval: Duration::from_millis(600),
    })
}

/// Manager options whose idle poll effectively never fires on its own.
pub fn idle_options() -> ManagerOptions {
    ManagerOptions::default().with_polling(PollingConfig {
        fast_interval: Duration::from_secs(1),
        normal_interval: Duration::from_secs(30),
        slow_interval: Duration::from_secs(60),
    })
}

/// Wait up to `within` for an event matching `pred`, skipping the rest.
pub async fn next_matching<K, F>(
    events: &mut Subscription<K>,
    within: Duration,
    mut pred: F,
) -> Option<DeviceEvent<K>>
where
    K: DeviceKind,
    F: FnMut(&DeviceEvent<K>) -> bool,
{
    tokio::time::timeout(within, async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .ok()
    .flatten()
}

/// Wait up to `within` for the next status update and return when it arrived.
pub async fn next_status<K: DeviceKind>(
    events: &mut Subscription<K>,
    within: Duration,
) -> Option<Instant> {
    next_matching(events, within, |e| matches!(e, DeviceEvent::StatusUpdate(_)))
        .await
        .map(|_| Instant::now())
}

/// Collect every event published during the next `window`.
pub async fn collect_for<K: DeviceKind>(
    events: &mut Subscription<K>,
    window: Duration,
) -> Vec<DeviceEvent<K>> {
    let mut collected = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    while let Ok(Some(event)) = tokio::time::timeout_at(deadline, events.recv()).await {
        collected.push(event);
    }
    collected
}

/// Every event already queued.
pub fn drain<K: DeviceKind>(events: &mut Subscription<K>) -> Vec<DeviceEvent<K>> {
    std::iter::from_fn(|| events.try_recv()).collect()
}

/// Event names, for order assertions.
pub fn names<K: DeviceKind>(events: &[DeviceEvent<K>]) -> Vec<&'static str> {
    events.iter().map(DeviceEvent::name).collect()
}

/// Number of events called `name`.
pub fn count<K: DeviceKind>(events: &[DeviceEvent<K>], name: &str) -> usize {
    events.iter().filter(|e| e.name() == name).count()
}

/// Poll `condition` every 10 ms until it holds or `within` elapses.
pub async fn eventually<F: FnMut() -> bool>(within: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + within;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timing_tolerance_factors() {
        assert_eq!(TimingTolerance::Tight.factor(), 0.05);
        assert_eq!(TimingTolerance::Normal.factor(), 0.20);
        assert_eq!(TimingTolerance::Relaxed.factor(), 0.50);
    }

    #[test]
    #[should_panic(expected = "outside tolerance")]
    fn test_assert_duration_near_fails() {
        assert_duration_near(
            Duration::from_millis(130),
            Duration::from_millis(100),
            TimingTolerance::Normal,
            "outside tolerance",
        );
    }
}
