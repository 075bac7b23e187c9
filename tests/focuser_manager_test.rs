//! Focuser manager lifecycle, polling and command tests against the simulator.

mod common;

use astro_control::error::{ErrorKind, InitStage};
use astro_control::hardware::SimulatedFocuser;
use astro_control::{ConnectionState, DeviceError, DeviceEvent, FocuserManager};
use common::*;
use std::time::{Duration, Instant};

const SECOND: Duration = Duration::from_secs(1);

fn connected(sim: &SimulatedFocuser) -> FocuserManager {
    let manager = FocuserManager::new(sim.factory(), test_options());
    manager.connect_configured().unwrap();
    manager
}

// =============================================================================
// Connection lifecycle
// =============================================================================

#[tokio::test]
async fn test_connect_publishes_snapshots_in_order() {
    let sim = SimulatedFocuser::new();
    let manager = FocuserManager::new(sim.factory(), test_options());
    let mut events = manager.subscribe();

    manager.connect_configured().unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert!(manager.is_polling());
    assert!(sim.is_connected());

    let published = drain(&mut events);
    assert_eq!(
        names(&published)[..3],
        ["capabilities", "parameters", "status"]
    );
    assert!(manager.capabilities().absolute);
    assert_eq!(manager.parameters().max_step, 10_000);
    assert_eq!(manager.status().position, Some(5000));

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_connect_twice_is_rejected() {
    let sim = SimulatedFocuser::new();
    let manager = connected(&sim);

    let err = manager.connect_configured().unwrap_err();
    assert!(matches!(err, DeviceError::AlreadyConnected { .. }));
    assert_eq!(sim.builds(), 1);
    assert!(manager.is_connected());
    assert!(manager.is_polling());

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_disconnect_restores_defaults_and_stops_polling() {
    let sim = SimulatedFocuser::new();
    let manager = connected(&sim);
    let mut events = manager.subscribe();

    manager.disconnect().unwrap();

    let published = drain(&mut events);
    let tail = names(&published);
    assert_eq!(
        tail[tail.len() - 4..],
        ["status", "capabilities", "parameters", "disconnected"]
    );
    assert!(!manager.is_polling());
    assert!(!sim.is_connected());
    assert!(manager.endpoint().is_none());

    let status = manager.status();
    assert!(status.position.is_none());
    assert!(status.read_at.is_none());
    assert!(manager.parameters().step_size.is_nan());
    assert!(!manager.capabilities().absolute);

    // No poll thread left to publish anything.
    let quiet = collect_for(&mut events, NORMAL * 2).await;
    assert!(quiet.is_empty(), "unexpected events: {:?}", names(&quiet));

    let err = manager.disconnect().unwrap_err();
    assert!(matches!(err, DeviceError::InvalidOperation(_)));
}

#[tokio::test]
async fn test_reconnect_builds_a_new_driver() {
    let sim = SimulatedFocuser::new();
    let manager = connected(&sim);
    manager.disconnect().unwrap();

    manager.connect_configured().unwrap();
    assert_eq!(sim.builds(), 2);
    assert!(manager.is_polling());
    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_connect_failure_is_recorded() {
    let sim = SimulatedFocuser::new();
    sim.fail_connect(true);
    let manager = FocuserManager::new(sim.factory(), test_options());

    let err = manager.connect_configured().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(!manager.is_connected());
    assert_eq!(
        manager.last_connect_error().as_deref(),
        Some("Unable to connect to the focuser: simulated connection refused")
    );

    sim.fail_connect(false);
    manager.connect_configured().unwrap();
    assert!(manager.last_connect_error().is_none());
    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_device_that_stays_disconnected_fails_to_connect() {
    let sim = SimulatedFocuser::new();
    sim.connect_reports_false(true);
    let manager = FocuserManager::new(sim.factory(), test_options());

    let err = manager.connect_configured().unwrap_err();
    assert!(matches!(err, DeviceError::Connection { .. }));
    assert!(!manager.is_connected());
}

#[tokio::test]
async fn test_construction_failure() {
    let sim = SimulatedFocuser::new();
    sim.fail_construction(true);
    let manager = FocuserManager::new(sim.factory(), test_options());

    let err = manager.connect_configured().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Construction);
    assert_eq!(sim.builds(), 0);
    assert!(sim.connect_requests().is_empty());
}

#[tokio::test]
async fn test_initialization_failure_rolls_back() {
    let sim = SimulatedFocuser::new();
    sim.fail_parameters(true);
    let manager = FocuserManager::new(sim.factory(), test_options());
    let mut events = manager.subscribe();

    let err = manager.connect_configured().unwrap_err();
    assert!(matches!(
        err,
        DeviceError::Initialization {
            stage: InitStage::Parameters,
            ..
        }
    ));
    assert!(!manager.is_connected());
    assert!(!sim.is_connected());
    assert_eq!(sim.connect_requests(), vec![true, false]);
    assert!(manager
        .last_connect_error()
        .is_some_and(|m| m.starts_with("Unable to determine the focuser's configuration")));

    let published = drain(&mut events);
    assert_eq!(
        names(&published),
        ["capabilities", "status", "capabilities", "parameters", "disconnected"]
    );
    assert!(!manager.capabilities().absolute);
}

#[tokio::test]
async fn test_capability_read_failure_rolls_back() {
    let sim = SimulatedFocuser::new();
    sim.fail_capabilities(true);
    let manager = FocuserManager::new(sim.factory(), test_options());
    let mut events = manager.subscribe();

    let err = manager.connect_configured().unwrap_err();
    assert!(matches!(
        err,
        DeviceError::Initialization {
            stage: InitStage::Capabilities,
            ..
        }
    ));
    assert!(!manager.is_connected());
    assert!(!manager.is_polling());
    assert!(!sim.is_connected());
    assert_eq!(sim.connect_requests(), vec![true, false]);
    assert!(manager
        .last_connect_error()
        .is_some_and(|m| m.starts_with("Unable to determine the focuser's capabilities")));

    let published = drain(&mut events);
    assert_eq!(
        names(&published),
        ["status", "capabilities", "parameters", "disconnected"]
    );

    sim.fail_capabilities(false);
    manager.connect_configured().unwrap();
    assert!(manager.capabilities().absolute);
    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_first_status_read_failure_rolls_back() {
    let sim = SimulatedFocuser::new();
    sim.fail_status_reads(true);
    let manager = FocuserManager::new(sim.factory(), test_options());
    let mut events = manager.subscribe();

    let err = manager.connect_configured().unwrap_err();
    assert!(matches!(
        err,
        DeviceError::Initialization {
            stage: InitStage::Status,
            ..
        }
    ));
    assert!(!manager.is_connected());
    assert!(!manager.is_polling());
    assert!(!sim.is_connected());
    assert_eq!(sim.connect_requests(), vec![true, false]);
    assert!(manager
        .last_connect_error()
        .is_some_and(|m| m.starts_with("Unable to get the focuser's status")));

    let published = drain(&mut events);
    assert_eq!(
        names(&published),
        [
            "capabilities",
            "parameters",
            "status",
            "capabilities",
            "parameters",
            "disconnected"
        ]
    );
    assert!(!manager.capabilities().absolute);
    assert!(manager.status().read_at.is_none());
}

#[test]
fn test_dropping_the_manager_disconnects() {
    let sim = SimulatedFocuser::new();
    {
        let manager = connected(&sim);
        assert!(manager.is_polling());
    }
    assert!(!sim.is_connected());
    assert_eq!(sim.connect_requests(), vec![true, false]);
}

// =============================================================================
// Polling
// =============================================================================

#[tokio::test]
async fn test_idle_focuser_polls_at_normal_interval() {
    let sim = SimulatedFocuser::new();
    let manager = FocuserManager::new(sim.factory(), test_options());
    let mut events = manager.subscribe();
    manager.connect_configured().unwrap();

    // connect-time snapshot, then the first poll
    next_status(&mut events, SECOND).await.unwrap();
    let first = next_status(&mut events, SECOND).await.unwrap();
    let second = next_status(&mut events, SECOND).await.unwrap();

    assert_duration_near(
        second - first,
        NORMAL,
        env_timing_tolerance(),
        "idle poll interval",
    );
    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_moving_focuser_polls_at_fast_interval() {
    let sim = SimulatedFocuser::new().with_move_duration(10_000);
    let manager = connected(&sim);
    let mut events = manager.subscribe();

    manager.move_by(100).unwrap();

    next_status(&mut events, SECOND).await.unwrap();
    let started = Instant::now();
    for _ in 0..5 {
        next_status(&mut events, SECOND).await.unwrap();
    }
    let elapsed = started.elapsed();
    assert!(
        elapsed < NORMAL,
        "five polls while moving took {elapsed:?}"
    );
    assert!(manager.status().is_moving);

    manager.halt().unwrap();
    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_immediate_status_update_wakes_the_poller() {
    let sim = SimulatedFocuser::new();
    let manager = FocuserManager::new(sim.factory(), idle_options());
    let mut events = manager.subscribe();
    manager.connect_configured().unwrap();

    next_status(&mut events, SECOND).await.unwrap();
    next_status(&mut events, SECOND).await.unwrap();
    assert!(next_status(&mut events, Duration::from_millis(200))
        .await
        .is_none());

    let requested = Instant::now();
    manager.immediate_status_update();
    next_status(&mut events, SECOND).await.unwrap();
    assert!(requested.elapsed() < Duration::from_millis(500));

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_immediate_status_update_while_disconnected_is_a_no_op() {
    let sim = SimulatedFocuser::new();
    let manager = FocuserManager::new(sim.factory(), test_options());
    let mut events = manager.subscribe();

    manager.immediate_status_update();
    assert!(drain(&mut events).is_empty());
}

#[tokio::test]
async fn test_fatal_status_read_disconnects_once() {
    let sim = SimulatedFocuser::new();
    let manager = connected(&sim);
    let mut events = manager.subscribe();

    sim.fail_status_reads(true);
    manager.immediate_status_update();

    let published = collect_for(&mut events, SECOND).await;
    assert_eq!(count(&published, "polling_exception"), 1);
    assert_eq!(count(&published, "disconnected"), 1);

    let exception = published
        .iter()
        .position(|e| e.name() == "polling_exception")
        .unwrap();
    let disconnected = published
        .iter()
        .position(|e| e.name() == "disconnected")
        .unwrap();
    assert!(exception < disconnected);

    if let DeviceEvent::PollingException(error) = &published[exception] {
        assert_eq!(error.kind(), ErrorKind::FatalPolling);
    }

    assert!(!manager.is_connected());
    assert!(!manager.is_polling());
    assert!(!sim.is_connected());
    assert!(manager.status().position.is_none());
}

#[tokio::test]
async fn test_fatal_read_racing_a_user_disconnect() {
    for _ in 0..10 {
        let sim = SimulatedFocuser::new();
        let manager = connected(&sim);
        let mut events = manager.subscribe();

        sim.fail_status_reads(true);
        manager.immediate_status_update();
        match manager.disconnect() {
            Ok(()) | Err(DeviceError::InvalidOperation(_)) => {}
            Err(e) => panic!("unexpected disconnect error: {e}"),
        }

        let published = collect_for(&mut events, Duration::from_millis(300)).await;
        assert_eq!(count(&published, "disconnected"), 1);
        assert!(count(&published, "polling_exception") <= 1);
        assert!(!manager.is_connected());
    }
}

// =============================================================================
// Commands
// =============================================================================

#[tokio::test]
async fn test_commands_require_a_connection() {
    let sim = SimulatedFocuser::new();
    let manager = FocuserManager::new(sim.factory(), test_options());

    let err = manager.move_by(100).unwrap_err();
    assert!(matches!(err, DeviceError::NotConnected { .. }));
    assert!(err.is_operation_error());
    assert!(manager.halt().is_err());
    assert!(manager.set_temperature_compensation(true).is_err());
    assert!(sim.moves().is_empty());
}

#[tokio::test]
async fn test_move_is_clamped_to_max_increment() {
    let sim = SimulatedFocuser::new().with_limits(500, 10_000);
    let manager = connected(&sim);
    let mut events = manager.subscribe();

    manager.move_by(10_000).unwrap();

    let amount = drain(&mut events).into_iter().find_map(|e| match e {
        DeviceEvent::MoveAmountUpdate(amount) => Some(amount),
        _ => None,
    });
    assert_eq!(amount, Some(500));
    assert_eq!(sim.moves(), vec![5500]);

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_move_is_clamped_to_max_step() {
    let sim = SimulatedFocuser::new().with_position(9900);
    let manager = connected(&sim);

    manager.move_by(500).unwrap();
    assert_eq!(sim.moves(), vec![10_000]);
    assert!(eventually(SECOND, || manager.status().position == Some(10_000)).await);

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_rejected_move_publishes_no_amount() {
    let sim = SimulatedFocuser::new();
    let manager = connected(&sim);
    let mut events = manager.subscribe();

    sim.fail_moves(true);
    let err = manager.move_by(100).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Driver);
    assert!(sim.moves().is_empty());
    assert_eq!(count(&drain(&mut events), "move_amount"), 0);

    sim.fail_moves(false);
    manager.move_by(100).unwrap();
    assert_eq!(count(&drain(&mut events), "move_amount"), 1);

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_relative_focuser_moves_by_steps() {
    let sim = SimulatedFocuser::new().relative();
    let manager = connected(&sim);

    assert!(!manager.capabilities().absolute);
    assert!(manager.status().position.is_none());

    manager.move_by(-300).unwrap();
    assert_eq!(sim.moves(), vec![-300]);

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_older_interface_suspends_temp_comp_until_stopped() {
    let sim = SimulatedFocuser::new()
        .with_interface_version(2)
        .with_temp_comp(true)
        .with_move_duration(10_000);
    let manager = connected(&sim);
    let mut events = manager.subscribe();

    manager.move_by(200).unwrap();
    assert_eq!(sim.temp_comp_writes(), vec![false]);

    // Still moving: compensation stays off.
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(sim.temp_comp_writes(), vec![false]);

    manager.halt().unwrap();
    assert_eq!(sim.halts(), 1);
    assert!(names(&drain(&mut events)).contains(&"move_completed"));

    assert!(eventually(SECOND, || sim.temp_comp()).await);
    assert_eq!(sim.temp_comp_writes(), vec![false, true]);

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_turning_temp_comp_off_during_a_move_cancels_the_restore() {
    let sim = SimulatedFocuser::new()
        .with_interface_version(2)
        .with_temp_comp(true)
        .with_move_duration(10_000);
    let manager = connected(&sim);

    manager.move_by(200).unwrap();
    assert_eq!(sim.temp_comp_writes(), vec![false]);
    assert!(eventually(SECOND, || manager.status().is_moving).await);

    manager.set_temperature_compensation(false).unwrap();
    manager.halt().unwrap();
    assert!(eventually(SECOND, || !manager.status().is_moving).await);

    // Idle polls would have run a queued re-enable by now.
    tokio::time::sleep(NORMAL * 2).await;
    assert_eq!(sim.temp_comp_writes(), vec![false, false]);
    assert!(!sim.temp_comp());

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_current_interface_keeps_temp_comp_on() {
    let sim = SimulatedFocuser::new().with_temp_comp(true);
    let manager = connected(&sim);

    manager.move_by(50).unwrap();
    assert!(eventually(SECOND, || sim.position() == 5050).await);
    assert!(sim.temp_comp_writes().is_empty());

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_halt_while_idle_does_nothing() {
    let sim = SimulatedFocuser::new();
    let manager = connected(&sim);
    let mut events = manager.subscribe();

    manager.halt().unwrap();
    assert_eq!(sim.halts(), 0);
    assert!(!names(&drain(&mut events)).contains(&"move_completed"));

    manager.disconnect().unwrap();
}

#[tokio::test]
async fn test_temperature_compensation_toggle() {
    let sim = SimulatedFocuser::new();
    let manager = connected(&sim);

    manager.set_temperature_compensation(true).unwrap();
    assert!(sim.temp_comp());
    assert!(eventually(SECOND, || manager.status().temp_comp).await);
    manager.disconnect().unwrap();

    let sim = SimulatedFocuser::new().without_temperature();
    let manager = connected(&sim);
    let err = manager.set_temperature_compensation(true).unwrap_err();
    assert!(matches!(err, DeviceError::NotSupported { .. }));
    assert!(manager.status().temperature.is_nan());
    manager.disconnect().unwrap();
}
