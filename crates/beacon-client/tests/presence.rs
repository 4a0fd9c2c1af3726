mod common;

use beacon_client::{CacheConfig, RefreshState, Scope, UserStatusListener};
use beacon_shared::models::{UserPatch, UserStatus};
use beacon_shared::protocol::{Request, Update};
use beacon_shared::types::UserId;
use std::sync::Arc;

use common::{ann, Harness, Recorder, START_MS};

fn offline(id: i64, was_online: i64) -> Update {
    Update::User {
        user: UserPatch::new(UserId(id))
            .first_name("U")
            .status(UserStatus::Offline { was_online }),
    }
}

#[test]
fn test_label_tick_fires_and_reschedules() {
    let mut h = Harness::new();
    let observer = Recorder::ticking();
    h.cache
        .subscriptions()
        .subscribe_to_user_updates(UserId(7), &observer)
        .unwrap();
    h.cache.handle_update(Update::User { user: ann() });
    h.pump();
    observer.take();

    assert_eq!(h.cache.run_due_timers(), 0);

    h.clock.set_millis(1_060_000);
    assert_eq!(h.cache.run_due_timers(), 1);
    assert_eq!(observer.take(), vec!["status:7:true"]);
    // One minute ago now; the label changes again at two minutes.
    assert_eq!(h.cache.next_deadline(), Some(1_120_000));
    assert_eq!(h.cache.presence().timer_count(), 1);
}

#[test]
fn test_plain_listener_does_not_see_ticks() {
    let mut h = Harness::new();
    let ticking = Recorder::ticking();
    let plain = Recorder::new();
    h.cache.subscriptions().add_global_users_listener(&ticking);
    h.cache.subscriptions().add_global_users_listener(&plain);

    h.cache.handle_update(Update::User { user: ann() });
    h.pump();
    ticking.take();
    plain.take();

    h.clock.set_millis(1_060_000);
    h.cache.run_due_timers();
    assert_eq!(ticking.take(), vec!["status:7:true"]);
    assert!(plain.log().is_empty());

    h.cache.handle_update(Update::UserStatus {
        user_id: UserId(7),
        status: UserStatus::Online { expires: 2000 },
    });
    h.pump();
    assert_eq!(ticking.take(), vec!["status:7:false"]);
    assert_eq!(plain.take(), vec!["status:7:false"]);
}

#[test]
fn test_scheduler_follows_tick_listeners() {
    let h = Harness::new();
    assert_eq!(h.cache.presence().refresh_state(), RefreshState::Idle);

    let observer = Recorder::ticking();
    let listener: Arc<dyn UserStatusListener> = observer.clone();
    h.cache
        .subscriptions()
        .add_user_status_listener(Scope::Keyed(UserId(7)), &listener)
        .unwrap();
    assert_eq!(h.cache.presence().refresh_state(), RefreshState::Active);

    h.cache.set_ui_paused(true);
    assert_eq!(h.cache.presence().refresh_state(), RefreshState::Paused);
    h.cache.set_ui_paused(false);

    h.cache
        .subscriptions()
        .remove_user_status_listener(Scope::Keyed(UserId(7)), &listener);
    assert_eq!(h.cache.presence().refresh_state(), RefreshState::Idle);
}

#[test]
fn test_paused_refreshes_coalesce_and_catch_up_once() {
    let mut h = Harness::with_config(CacheConfig::default());
    let observer = Recorder::ticking();
    h.cache.subscriptions().add_global_users_listener(&observer);
    assert_eq!(h.cache.presence().refresh_state(), RefreshState::Paused);

    for _ in 0..3 {
        for id in 1..=3 {
            h.cache.handle_update(offline(id, 1000));
        }
    }
    assert_eq!(h.cache.presence().pending_count(), 3);
    assert_eq!(h.cache.presence().timer_count(), 0);
    h.pump();
    observer.take();

    h.cache.set_ui_paused(false);
    assert_eq!(h.cache.presence().timer_count(), 3);
    assert_eq!(h.cache.next_deadline(), Some(START_MS));

    assert_eq!(h.cache.run_due_timers(), 3);
    assert_eq!(observer.take().len(), 3);
    assert_eq!(h.cache.run_due_timers(), 0);
    assert_eq!(h.cache.presence().timer_count(), 3);

    // Pausing again drops timers but keeps what is pending.
    h.cache.set_ui_paused(true);
    assert_eq!(h.cache.presence().timer_count(), 0);
    assert_eq!(h.cache.presence().pending_count(), 3);
    h.cache.set_ui_paused(false);
    assert_eq!(h.cache.run_due_timers(), 3);
}

#[test]
fn test_new_timestamp_replaces_pending_refresh() {
    let mut h = Harness::new();
    let observer = Recorder::ticking();
    h.cache.subscriptions().add_global_users_listener(&observer);
    h.cache.handle_update(Update::User { user: ann() });
    h.cache.handle_update(Update::UserStatus {
        user_id: UserId(7),
        status: UserStatus::Offline { was_online: 1025 },
    });
    h.pump();

    assert_eq!(h.cache.presence().timer_count(), 1);
    assert_eq!(h.cache.presence().pending_for(UserId(7)), Some(1025));
    assert_eq!(h.cache.next_deadline(), Some(1_085_000));
}

#[test]
fn test_absolute_date_needs_no_refresh() {
    let h = Harness::new();
    let observer = Recorder::ticking();
    h.cache.subscriptions().add_global_users_listener(&observer);
    h.clock.set_millis(10 * 86_400_000);
    h.cache.handle_update(Update::User { user: ann() });
    assert_eq!(h.cache.presence().pending_count(), 0);
    assert_eq!(h.cache.next_deadline(), None);
}

#[test]
fn test_user_cleanup_drops_timers_keeps_pending() {
    let h = Harness::new();
    let observer = Recorder::ticking();
    h.cache.subscriptions().add_global_users_listener(&observer);
    h.cache.handle_update(Update::User { user: ann() });

    h.cache.on_user_cleanup();
    assert_eq!(h.cache.presence().timer_count(), 0);
    assert_eq!(h.cache.presence().pending_count(), 1);
    assert_eq!(
        h.backend.requests(),
        vec![Request::GetActiveLiveLocationMessages]
    );
}

#[test]
fn test_clear_forgets_everything() {
    let h = Harness::new();
    let observer = Recorder::ticking();
    h.cache.subscriptions().add_global_users_listener(&observer);
    h.cache.handle_update(Update::User { user: ann() });
    h.cache.handle_update(Update::MyUserId {
        user_id: Some(UserId(7)),
    });

    h.cache.clear();
    assert!(!h.cache.store().has_user(UserId(7)));
    assert_eq!(h.cache.store().my_user_id(), None);
    assert_eq!(h.cache.presence().pending_count(), 0);
    assert_eq!(h.cache.next_deadline(), None);
}
