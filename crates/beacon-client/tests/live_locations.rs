mod common;

use beacon_shared::models::{LiveLocation, Location, MessageContent};
use beacon_shared::protocol::{Request, Response, Update};
use beacon_shared::types::{ChatId, MessageId};

use common::{live_message, Harness, START_MS};

fn new_share(h: &Harness, chat: i64, id: i64, expires_in: i32) {
    h.cache.handle_update(Update::NewMessage {
        message: live_message(chat, id, expires_in),
    });
}

fn content(expires_in: i32) -> LiveLocation {
    match live_message(0, 0, expires_in).content {
        MessageContent::Location(live) => live,
        _ => unreachable!(),
    }
}

#[test]
fn test_registration_follows_share_list() {
    let mut h = Harness::new();

    new_share(&h, 1, 10, 600);
    h.pump();
    assert_eq!(
        h.bridge.take(),
        vec!["register", "shares:1", "location_refs:1"]
    );

    new_share(&h, 2, 20, 600);
    h.pump();
    assert_eq!(h.bridge.take(), vec!["shares:2", "location_refs:1"]);

    // Seeing the same message again changes nothing.
    new_share(&h, 2, 20, 500);
    assert_eq!(h.pump(), 0);

    h.cache.handle_update(Update::DeleteMessages {
        chat_id: ChatId(1),
        message_ids: vec![MessageId(10), MessageId(11)],
    });
    h.pump();
    assert_eq!(h.bridge.take(), vec!["shares:1", "location_refs:-1"]);

    // A refreshing edit only moves the expiry.
    h.cache.handle_update(Update::MessageContent {
        chat_id: ChatId(2),
        message_id: MessageId(20),
        content: content(300),
    });
    assert_eq!(h.pump(), 0);
    assert_eq!(h.cache.next_deadline(), Some(START_MS + 300_000));

    h.cache.handle_update(Update::MessageContent {
        chat_id: ChatId(2),
        message_id: MessageId(20),
        content: content(0),
    });
    h.pump();
    assert_eq!(
        h.bridge.take(),
        vec!["unregister", "shares:0", "location_refs:-1"]
    );
    assert!(!h.cache.has_active_live_locations());
}

#[test]
fn test_reports_handled_late_follow_current_list() {
    let mut h = Harness::new();
    new_share(&h, 1, 10, 600);
    h.cache.handle_update(Update::DeleteMessages {
        chat_id: ChatId(1),
        message_ids: vec![MessageId(10)],
    });
    h.pump();

    assert_eq!(
        h.bridge.take(),
        vec!["shares:0", "location_refs:1", "shares:0", "location_refs:-1"]
    );
    assert!(!h.cache.has_active_live_locations());
}

#[test]
fn test_incoming_and_static_locations_ignored() {
    let mut h = Harness::new();
    let mut incoming = live_message(1, 10, 600);
    incoming.is_outgoing = false;
    let mut sending = live_message(1, 11, 600);
    sending.is_sending = true;
    for message in [incoming, sending, live_message(1, 12, 0)] {
        h.cache.handle_update(Update::NewMessage { message });
    }
    assert_eq!(h.pump(), 0);
    assert!(h.cache.live_locations().is_empty());
}

#[test]
fn test_share_expires_on_its_own() {
    let mut h = Harness::new();
    new_share(&h, 1, 10, 60);
    h.pump();
    h.bridge.take();
    assert_eq!(h.cache.next_deadline(), Some(START_MS + 60_000));

    h.clock.set_millis(START_MS + 59_999);
    h.cache.run_due_timers();
    assert!(h.cache.live_location(ChatId(1)).is_some());

    h.clock.set_millis(START_MS + 60_000);
    assert_eq!(h.cache.run_due_timers(), 0);
    h.pump();
    assert_eq!(
        h.bridge.take(),
        vec!["unregister", "shares:0", "location_refs:-1"]
    );
    assert_eq!(h.cache.next_deadline(), None);
}

#[test]
fn test_startup_loads_active_shares() {
    let mut h = Harness::new();
    h.cache.on_startup();
    assert_eq!(
        h.backend.requests(),
        vec![Request::GetActiveLiveLocationMessages]
    );

    let mut incoming = live_message(3, 30, 600);
    incoming.is_outgoing = false;
    h.backend.respond(Response::Messages {
        messages: vec![live_message(1, 10, 600), incoming],
    });
    h.pump();

    assert_eq!(
        h.bridge.take(),
        vec!["register", "shares:1", "location_refs:1"]
    );
    let share = h.cache.live_location(ChatId(1)).unwrap();
    assert_eq!(share.message_id, MessageId(10));
    assert_eq!(share.expires_at_ms, START_MS + 600_000);
}

#[test]
fn test_startup_failure_reported() {
    let mut h = Harness::new();
    h.cache.on_startup();
    h.backend.fail(500, "internal");
    h.pump();
    assert_eq!(h.bridge.take(), vec!["error:500"]);
    assert!(!h.cache.has_active_live_locations());
}

#[test]
fn test_broadcast_edits_every_share() {
    let mut h = Harness::new();
    new_share(&h, 1, 10, 600);
    new_share(&h, 2, 20, 600);
    h.pump();
    h.bridge.take();

    let here = Location {
        latitude: 48.1,
        longitude: 11.6,
    };
    h.cache.on_location_broadcast(here, 90);
    let requests = h.backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(
        requests[0],
        Request::EditMessageLiveLocation {
            chat_id: ChatId(1),
            message_id: MessageId(10),
            location: Some(here),
            heading: 90,
        }
    );

    let mut edited = live_message(1, 10, 590);
    if let MessageContent::Location(live) = &mut edited.content {
        live.location = here;
        live.heading = 90;
    }
    h.backend.respond(Response::Message { message: edited });
    h.backend.fail(400, "message not modified");
    h.pump();

    assert_eq!(h.bridge.take(), vec!["edited:1:10"]);
    let share = h.cache.live_location(ChatId(1)).unwrap();
    assert_eq!(share.location, here);
    assert_eq!(share.heading, 90);
    assert_ne!(h.cache.live_location(ChatId(2)).unwrap().location, here);
}

#[test]
fn test_stop_in_one_chat() {
    let h = Harness::new();
    new_share(&h, 1, 10, 600);
    new_share(&h, 2, 20, 600);

    h.cache.stop_live_locations(Some(ChatId(2)));
    assert_eq!(
        h.backend.requests(),
        vec![Request::EditMessageLiveLocation {
            chat_id: ChatId(2),
            message_id: MessageId(20),
            location: None,
            heading: 0,
        }]
    );

    h.cache.stop_live_locations(None);
    assert_eq!(h.backend.requests().len(), 3);
}

#[test]
fn test_failed_stop_keeps_share() {
    let mut h = Harness::new();
    new_share(&h, 1, 10, 600);
    h.pump();
    h.bridge.take();

    h.cache.stop_live_locations(Some(ChatId(1)));
    h.backend.fail(400, "message can't be edited");
    h.pump();

    assert!(h.bridge.take().is_empty());
    assert!(h.cache.live_location(ChatId(1)).is_some());
}

#[test]
fn test_clear_releases_location_source() {
    let mut h = Harness::new();
    new_share(&h, 1, 10, 600);
    h.pump();
    h.bridge.take();

    h.cache.clear();
    h.pump();
    assert_eq!(
        h.bridge.take(),
        vec!["unregister", "shares:0", "location_refs:-1"]
    );
}
