mod common;

use std::sync::Arc;
use std::time::Duration;

use beacon_client::{CacheConfig, CallListener, Scope};
use beacon_shared::models::{CallSettings, CallState};
use beacon_shared::protocol::Update;
use beacon_shared::types::CallId;

use common::{call, Harness, Recorder};

fn active_call_events(events: Vec<String>) -> Vec<String> {
    events
        .into_iter()
        .filter(|event| event.starts_with("active_calls:"))
        .collect()
}

#[test]
fn test_call_counted_once_across_states() {
    let mut h = Harness::new();
    let observer = Recorder::new();
    let listener: Arc<dyn CallListener> = observer.clone();
    h.cache
        .subscriptions()
        .subscribe_to_call_updates(Scope::Global, &listener)
        .unwrap();

    for state in [
        CallState::Pending,
        CallState::Ringing,
        CallState::Establishing,
        CallState::Established,
    ] {
        h.cache.handle_update(Update::Call {
            call: call(5, state),
        });
        assert_eq!(h.cache.active_call_count(), 1);
    }
    h.cache.handle_update(Update::Call {
        call: call(
            5,
            CallState::Discarded {
                reason: "hangup".into(),
            },
        ),
    });
    assert_eq!(h.cache.active_call_count(), 0);
    h.pump();

    assert_eq!(observer.take().len(), 5);
    assert_eq!(
        active_call_events(h.bridge.take()),
        vec!["active_calls:1", "active_calls:0"]
    );

    // A late non-terminal update for a finished call is ignored.
    h.cache.handle_update(Update::Call {
        call: call(5, CallState::Ringing),
    });
    h.pump();
    assert!(observer.log().is_empty());
    assert_eq!(h.cache.active_call_count(), 0);
    assert!(h.cache.pending_call().is_none());
}

#[test]
fn test_stale_call_released_once() {
    let config = CacheConfig {
        start_paused: false,
        call_stale_after: Duration::from_secs(60),
        ..CacheConfig::default()
    };
    let mut h = Harness::with_config(config);
    h.cache.handle_update(Update::Call {
        call: call(5, CallState::Ringing),
    });

    h.clock.advance_millis(30_000);
    assert_eq!(h.cache.release_stale_calls(), 0);
    h.clock.advance_millis(31_000);
    assert_eq!(h.cache.release_stale_calls(), 1);
    assert_eq!(h.cache.active_call_count(), 0);
    assert_eq!(h.cache.release_stale_calls(), 0);

    h.cache.handle_update(Update::Call {
        call: call(
            5,
            CallState::Failed {
                error: "timeout".into(),
            },
        ),
    });
    h.pump();
    assert_eq!(
        active_call_events(h.bridge.take()),
        vec!["active_calls:1", "active_calls:0"]
    );
}

#[test]
fn test_long_established_call_survives_sweep() {
    let mut h = Harness::new();
    h.cache.handle_update(Update::Call {
        call: call(5, CallState::Established),
    });
    h.pump();
    h.bridge.take();

    h.clock.advance_millis(2 * 3_600_000 + 60_000);
    assert_eq!(h.cache.release_stale_calls(), 0);
    h.pump();
    assert!(h.bridge.take().is_empty());
    assert_eq!(h.cache.active_call_count(), 1);
    assert_eq!(h.cache.pending_call().unwrap().id, CallId(5));
}

#[test]
fn test_released_call_no_longer_pending() {
    let config = CacheConfig {
        start_paused: false,
        call_stale_after: Duration::from_secs(60),
        ..CacheConfig::default()
    };
    let h = Harness::with_config(config);
    h.cache.handle_update(Update::Call {
        call: call(5, CallState::Ringing),
    });
    h.clock.advance_millis(61_000);
    assert_eq!(h.cache.release_stale_calls(), 1);
    assert!(h.cache.pending_call().is_none());
}

#[test]
fn test_pending_call_is_most_recent() {
    let h = Harness::new();
    h.cache.handle_update(Update::Call {
        call: call(1, CallState::Ringing),
    });
    h.clock.advance_millis(1_000);
    h.cache.handle_update(Update::Call {
        call: call(2, CallState::Pending),
    });
    assert_eq!(h.cache.pending_call().unwrap().id, CallId(2));
    assert_eq!(h.cache.active_call_count(), 2);
    assert_eq!(h.cache.call(CallId(1)).unwrap().state, CallState::Ringing);
}

#[test]
fn test_local_call_signals() {
    let mut h = Harness::new();
    let observer = Recorder::new();
    let listener: Arc<dyn CallListener> = observer.clone();
    h.cache
        .subscriptions()
        .subscribe_to_call_updates(Scope::Keyed(CallId(5)), &listener)
        .unwrap();

    h.cache.on_call_state_changed(CallId(5), CallState::Establishing);
    h.cache.on_call_state_changed(CallId(5), CallState::Established);
    h.cache.on_call_signal_bars_changed(CallId(5), 3);
    h.cache
        .update_call_settings(
            CallId(5),
            CallSettings {
                speaker_on: true,
                ..CallSettings::default()
            },
        )
        .unwrap();
    h.pump();

    assert_eq!(
        observer.take(),
        vec![
            "call_state:5:Established",
            "bars:5:3",
            "call_settings:5"
        ]
    );
    assert_eq!(h.bridge.take(), vec!["call_settings:5"]);
    assert!(h.cache.call_settings(CallId(5)).unwrap().speaker_on);
    assert!(h
        .cache
        .update_call_settings(CallId(0), CallSettings::default())
        .is_err());
}

#[test]
fn test_clear_reports_no_active_calls() {
    let mut h = Harness::new();
    h.cache.handle_update(Update::Call {
        call: call(5, CallState::Ringing),
    });
    h.cache.clear();
    h.pump();
    assert_eq!(
        active_call_events(h.bridge.take()),
        vec!["active_calls:1", "active_calls:0"]
    );
    assert!(h.cache.call(CallId(5)).is_none());
}
