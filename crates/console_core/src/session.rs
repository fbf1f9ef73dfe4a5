use shared::domain::{SessionStatus, StrategyConfig};
use tokio::sync::{watch, RwLock};
use tracing::info;

/// Which of the two session controls an operator may use right now.
///
/// Exactly one of `start` and `stop` is enabled for any status, so the same
/// irreversible action cannot be submitted twice in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlAvailability {
    pub start: bool,
    pub stop: bool,
    pub close_all: bool,
    pub cancel_all: bool,
}

impl ControlAvailability {
    pub fn for_status(status: SessionStatus) -> Self {
        let running = status.is_running();
        Self {
            start: !running,
            stop: running,
            close_all: true,
            cancel_all: true,
        }
    }
}

/// Sole owner of the session status and of the configuration the operator
/// wants applied on the next start.
pub struct SessionStateMachine {
    status: watch::Sender<SessionStatus>,
    config: RwLock<StrategyConfig>,
}

impl SessionStateMachine {
    pub fn new(config: StrategyConfig) -> Self {
        let (status, _) = watch::channel(SessionStatus::Stopped);
        Self {
            status,
            config: RwLock::new(config),
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status.subscribe()
    }

    pub fn controls(&self) -> ControlAvailability {
        ControlAvailability::for_status(self.status())
    }

    /// Applied only after the backend confirmed a start.
    pub(crate) fn confirm_started(&self) {
        self.transition(SessionStatus::Running, "start confirmed by backend");
    }

    pub(crate) fn force_stopped(&self) {
        self.transition(SessionStatus::Stopped, "stop command issued");
    }

    /// Adopts the backend's own report when the console mounts.
    pub(crate) fn adopt_mount_status(&self, reported: SessionStatus) {
        self.transition(reported, "status read at mount");
    }

    fn transition(&self, next: SessionStatus, cause: &'static str) {
        let previous = self.status.send_replace(next);
        if previous != next {
            info!(from = %previous, to = %next, cause, "session: status changed");
        }
    }

    pub async fn config(&self) -> StrategyConfig {
        self.config.read().await.clone()
    }

    /// Applies an operator edit and returns the resulting config.
    pub async fn edit_config<F>(&self, edit: F) -> StrategyConfig
    where
        F: FnOnce(&mut StrategyConfig),
    {
        let mut guard = self.config.write().await;
        edit(&mut guard);
        guard.clone()
    }
}
