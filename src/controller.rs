use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Where the player currently is within one (learner, course) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PlayerState {
    Idle,
    Playing { lecture_id: Uuid },
    MarkedComplete { lecture_id: Uuid },
}

/// Ties an in-flight completion mark to the selection that started it.
/// Selecting another lecture bumps the session epoch, so a slow store
/// response for the old lecture can no longer touch the active binding.
#[derive(Debug, Clone, Copy)]
pub struct MarkToken {
    pub lecture_id: Uuid,
    epoch: u64,
}

/// One learner's playback session for one course.
///
/// Transitions: `Idle -> Playing(l)` on a guarded selection,
/// `Playing(l) -> MarkedComplete(l)` once the playback-start signal has
/// been persisted, and back to `Playing(l')` on the next selection.
/// Any attempt to play counts as consumed; completion is recorded at
/// play-start, not play-end.
#[derive(Debug)]
pub struct PlaybackSession {
    pub id: Uuid,
    pub learner_id: String,
    pub course_id: Uuid,
    state: PlayerState,
    epoch: u64,
    course_complete: bool,
    latch_fired: bool,
    opened_at: DateTime<Utc>,
}

#[derive(Serialize, Debug, Clone)]
pub struct SessionView {
    pub id: Uuid,
    pub course_id: Uuid,
    #[serde(flatten)]
    pub state: PlayerState,
    pub course_complete: bool,
    /// True from the moment the completion latch fires until the caller
    /// acknowledges it.
    pub completion_pending: bool,
    pub opened_at: DateTime<Utc>,
}

impl PlaybackSession {
    /// `already_complete` seeds the latch: a session opened on a finished
    /// course must not re-announce completion on the next redundant mark.
    pub fn new(learner_id: String, course_id: Uuid, already_complete: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            learner_id,
            course_id,
            state: PlayerState::Idle,
            epoch: 0,
            course_complete: already_complete,
            latch_fired: false,
            opened_at: Utc::now(),
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn view(&self) -> SessionView {
        SessionView {
            id: self.id,
            course_id: self.course_id,
            state: self.state,
            course_complete: self.course_complete,
            completion_pending: self.latch_fired,
            opened_at: self.opened_at,
        }
    }

    /// Bind the player to a lecture. The caller has already run the access
    /// guard; a denial never reaches this point. Cancels the previous
    /// binding immediately, nothing is queued.
    pub fn select(&mut self, lecture_id: Uuid) {
        self.epoch += 1;
        self.state = PlayerState::Playing { lecture_id };
    }

    /// Playback-start signal: capture a token for the store call. `None`
    /// when no lecture is bound.
    pub fn begin_mark(&self) -> Option<MarkToken> {
        match self.state {
            PlayerState::Playing { lecture_id } | PlayerState::MarkedComplete { lecture_id } => {
                Some(MarkToken {
                    lecture_id,
                    epoch: self.epoch,
                })
            }
            PlayerState::Idle => None,
        }
    }

    /// Fold a persisted mark back into the session. Returns true exactly
    /// when the completion latch fires on this call.
    ///
    /// A superseded mark (stale epoch) has still been persisted, so it
    /// still feeds the latch; it only stops affecting the active binding.
    pub fn apply_mark_success(&mut self, token: MarkToken, now_complete: bool) -> bool {
        if token.epoch == self.epoch {
            self.state = PlayerState::MarkedComplete {
                lecture_id: token.lecture_id,
            };
        }
        let fired = now_complete && !self.course_complete && !self.latch_fired;
        if fired {
            self.latch_fired = true;
        }
        self.course_complete = now_complete;
        fired
    }

    /// Store failure: the binding stays in `Playing`, the caller may
    /// retry by re-triggering playback.
    pub fn apply_mark_failure(&mut self, _token: MarkToken) {}

    /// Re-arm the one-shot latch (e.g. after the UI surfaced the
    /// certificate affordance, or because course content changed).
    pub fn acknowledge(&mut self) {
        self.latch_fired = false;
    }
}

/// Live sessions, keyed by session id. One logical actor per session:
/// transitions are short lock-scoped mutations, and store I/O for a mark
/// happens outside the lock via the begin/apply token pair, so a newer
/// selection is never blocked behind a slow mark.
pub type Sessions = Arc<Mutex<HashMap<Uuid, PlaybackSession>>>;

pub fn new_sessions() -> Sessions {
    Arc::new(Mutex::new(HashMap::new()))
}
