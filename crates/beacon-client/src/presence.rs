//! Self-scheduling refresh of relative "last seen" labels.
//!
//! For every user whose presence is `Offline { was_online }` the scheduler
//! keeps one pending entry and, while active, one timer due at the moment
//! the label would change. Timers live in a `BTreeMap` ordered by due time;
//! the foreground loop sleeps until [`PresenceScheduler::next_deadline`] and
//! then drains [`PresenceScheduler::take_due`].
//!
//! Two inputs decide whether timers run: whether any observer wants label
//! ticks, and whether the UI is paused. Timers are dropped when the
//! scheduler stops being active, but pending entries survive, and every one
//! of them fires once, immediately, when it becomes active again.
//!
//! Lock order: this lock may be taken while the store's users lock is held,
//! never the other way round.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use beacon_shared::models::UserStatus;
use beacon_shared::time::{next_label_change_ms, Clock};
use beacon_shared::types::UserId;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, info};

/// Combined activity of the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshState {
    /// No observer wants label ticks.
    Idle,
    /// Observers exist but the UI is not visible.
    Paused,
    Active,
}

impl RefreshState {
    fn from_inputs(ticks_needed: bool, ui_paused: bool) -> Self {
        match (ticks_needed, ui_paused) {
            (false, _) => Self::Idle,
            (true, true) => Self::Paused,
            (true, false) => Self::Active,
        }
    }
}

/// `(due_ms, sequence)`; the sequence keeps keys unique.
type TimerKey = (i64, u64);

struct Pending {
    was_online: i64,
    timer: Option<TimerKey>,
}

struct SchedulerState {
    ticks_needed: bool,
    ui_paused: bool,
    refresh: RefreshState,
    pending: HashMap<UserId, Pending>,
    timers: BTreeMap<TimerKey, UserId>,
    next_seq: u64,
}

impl SchedulerState {
    fn cancel(&mut self, user_id: UserId) {
        if let Some(pending) = self.pending.remove(&user_id) {
            if let Some(key) = pending.timer {
                self.timers.remove(&key);
            }
        }
    }

    fn arm(&mut self, user_id: UserId, due_ms: i64) {
        let key = (due_ms, self.next_seq);
        self.next_seq += 1;
        if let Some(pending) = self.pending.get_mut(&user_id) {
            if let Some(old) = pending.timer.replace(key) {
                self.timers.remove(&old);
            }
            self.timers.insert(key, user_id);
        }
    }

    fn disarm_all(&mut self) {
        self.timers.clear();
        for pending in self.pending.values_mut() {
            pending.timer = None;
        }
    }
}

pub struct PresenceScheduler {
    state: Mutex<SchedulerState>,
    clock: Arc<dyn Clock>,
    wake: Arc<Notify>,
    just_now_secs: i64,
}

impl PresenceScheduler {
    pub fn new(clock: Arc<dyn Clock>, wake: Arc<Notify>, just_now_secs: i64, start_paused: bool) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                ticks_needed: false,
                ui_paused: start_paused,
                refresh: RefreshState::Idle,
                pending: HashMap::new(),
                timers: BTreeMap::new(),
                next_seq: 0,
            }),
            clock,
            wake,
            just_now_secs,
        }
    }

    // ------------------------------------------------------------------
    // Activity
    // ------------------------------------------------------------------

    pub fn set_ticks_needed(&self, needed: bool) {
        let armed = {
            let mut state = self.state.lock();
            if state.ticks_needed == needed {
                return;
            }
            state.ticks_needed = needed;
            info!(needed, "presence ticks needed changed");
            self.recompute(&mut state)
        };
        if armed {
            self.wake.notify_one();
        }
    }

    pub fn set_ui_paused(&self, paused: bool) {
        let armed = {
            let mut state = self.state.lock();
            if state.ui_paused == paused {
                return;
            }
            state.ui_paused = paused;
            info!(paused, "presence ui pause changed");
            self.recompute(&mut state)
        };
        if armed {
            self.wake.notify_one();
        }
    }

    /// Returns true when catch-up timers were armed.
    fn recompute(&self, state: &mut SchedulerState) -> bool {
        let next = RefreshState::from_inputs(state.ticks_needed, state.ui_paused);
        if next == state.refresh {
            return false;
        }
        info!(
            from = ?state.refresh,
            to = ?next,
            pending = state.pending.len(),
            "presence refresh state changed"
        );
        let was_active = state.refresh == RefreshState::Active;
        state.refresh = next;

        if next == RefreshState::Active {
            let now = self.clock.now_millis();
            let ids: Vec<UserId> = state.pending.keys().copied().collect();
            for user_id in &ids {
                state.arm(*user_id, now);
            }
            !ids.is_empty()
        } else {
            if was_active {
                state.disarm_all();
            }
            false
        }
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.state.lock().refresh
    }

    pub fn is_active(&self) -> bool {
        self.refresh_state() == RefreshState::Active
    }

    // ------------------------------------------------------------------
    // Scheduling
    // ------------------------------------------------------------------

    /// Record the latest presence of `user_id`.
    ///
    /// An offline presence with a known timestamp gets one pending refresh.
    /// Repeating the same timestamp is a no-op unless `force` is set, in
    /// which case the refresh is due immediately. Any other presence cancels
    /// the pending refresh.
    pub fn observe(&self, user_id: UserId, status: &UserStatus, force: bool) {
        let armed = {
            let mut state = self.state.lock();
            let Some(was_online) = status.was_online() else {
                state.cancel(user_id);
                return;
            };
            if !force
                && state
                    .pending
                    .get(&user_id)
                    .is_some_and(|pending| pending.was_online == was_online)
            {
                return;
            }
            state.cancel(user_id);

            let now = self.clock.now();
            let Some(delay) = next_label_change_ms(was_online, &now, self.just_now_secs) else {
                return;
            };
            state.pending.insert(
                user_id,
                Pending {
                    was_online,
                    timer: None,
                },
            );
            if state.refresh != RefreshState::Active {
                return;
            }
            let now_ms = now.timestamp_millis();
            let due = if force { now_ms } else { now_ms + delay };
            state.arm(user_id, due);
            debug!(user_id = %user_id, due, "presence refresh scheduled");
            true
        };
        if armed {
            self.wake.notify_one();
        }
    }

    pub fn cancel(&self, user_id: UserId) {
        self.state.lock().cancel(user_id);
    }

    /// Drop every timer but keep pending entries.
    pub fn cancel_timers(&self) {
        self.state.lock().disarm_all();
    }

    /// Forget everything.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.pending.clear();
        state.timers.clear();
    }

    /// Earliest due time in milliseconds since the epoch.
    pub fn next_deadline(&self) -> Option<i64> {
        self.state
            .lock()
            .timers
            .keys()
            .next()
            .map(|(due, _)| *due)
    }

    /// Remove and return every refresh due at `now_ms` as
    /// `(user_id, was_online)`.
    pub fn take_due(&self, now_ms: i64) -> Vec<(UserId, i64)> {
        let mut state = self.state.lock();
        let mut due = Vec::new();
        while let Some(entry) = state.timers.first_entry() {
            if entry.key().0 > now_ms {
                break;
            }
            let user_id = entry.remove();
            if let Some(pending) = state.pending.remove(&user_id) {
                due.push((user_id, pending.was_online));
            }
        }
        due
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub fn timer_count(&self) -> usize {
        self.state.lock().timers.len()
    }

    /// The `was_online` a refresh is pending for.
    pub fn pending_for(&self, user_id: UserId) -> Option<i64> {
        self.state
            .lock()
            .pending
            .get(&user_id)
            .map(|pending| pending.was_online)
    }
}
