//! Playback session state machine and final report.

use std::process::ExitStatus;
use std::sync::Mutex;

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

/// Lifecycle of one playback.
///
/// `Idle -> Running -> Streaming -> Closed`. `Errored` can be entered from any
/// non-terminal state and only leads to `Closed`. `Closed` is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// Both subprocesses spawned, no audio delivered yet.
    Running,
    /// At least one chunk of audio is available to the client.
    Streaming,
    Errored,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Streaming)
                | (Idle | Running | Streaming, Errored)
                | (Running | Streaming | Errored, Closed)
        )
    }
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// The transcoder reached EOF and both processes exited cleanly.
    Completed,
    /// The client went away before EOF; both processes were killed.
    ClientDisconnected,
    /// A process failed to start, exited abnormally or produced nothing.
    Failed(String),
}

impl SessionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::ClientDisconnected => "client_disconnected",
            Self::Failed(_) => "failed",
        }
    }
}

/// Observed exit of one subprocess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessExit {
    pub code: Option<i32>,
    pub description: String,
}

impl ProcessExit {
    pub fn from_status(status: &ExitStatus) -> Self {
        Self {
            code: status.code(),
            description: process_utils::describe_exit(status),
        }
    }

    pub fn wait_failed(error: &std::io::Error) -> Self {
        Self {
            code: None,
            description: format!("wait failed: {error}"),
        }
    }

    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Published once, when the session enters `Closed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub session_id: Uuid,
    pub source_ref: String,
    pub outcome: SessionOutcome,
    pub extraction_exit: Option<ProcessExit>,
    pub transcode_exit: Option<ProcessExit>,
    pub bytes_sent: u64,
    /// Every state the session went through, starting with `Idle`.
    pub transitions: Vec<SessionState>,
}

struct Inner {
    history: Vec<SessionState>,
    failure: Option<String>,
}

/// Shared state machine of one session.
///
/// Illegal transitions are ignored, which is what makes `Closed` reachable
/// exactly once no matter how many paths race towards it.
pub struct SessionStateMachine {
    state: watch::Sender<SessionState>,
    inner: Mutex<Inner>,
}

impl SessionStateMachine {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            state,
            inner: Mutex::new(Inner {
                history: vec![SessionState::Idle],
                failure: None,
            }),
        }
    }

    pub fn current(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Apply `next` if legal from the current state. Returns whether it applied.
    pub fn transition(&self, next: SessionState) -> bool {
        let mut inner = self.lock();
        let applied = self.state.send_if_modified(|state| {
            if state.can_transition_to(next) {
                *state = next;
                true
            } else {
                false
            }
        });
        if applied {
            inner.history.push(next);
        }
        applied
    }

    /// Record the first failure reason and move to `Errored`.
    pub fn fail(&self, reason: impl Into<String>) {
        {
            let mut inner = self.lock();
            if inner.failure.is_none() {
                inner.failure = Some(reason.into());
            }
        }
        self.transition(SessionState::Errored);
    }

    pub fn failure(&self) -> Option<String> {
        self.lock().failure.clone()
    }

    pub fn history(&self) -> Vec<SessionState> {
        self.lock().history.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave `Inner` half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

/// Read side of a session: its id and the final report.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: Uuid,
    report: watch::Receiver<Option<SessionReport>>,
}

impl SessionHandle {
    pub(crate) fn new(id: Uuid, report: watch::Receiver<Option<SessionReport>>) -> Self {
        Self { id, report }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait until the session is closed and return its report.
    ///
    /// Returns `None` only if the supervisor vanished without reporting.
    pub async fn closed(&mut self) -> Option<SessionReport> {
        if let Ok(report) = self.report.wait_for(Option::is_some).await {
            return report.clone();
        }
        self.report.borrow().clone()
    }
}
