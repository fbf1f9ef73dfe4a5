use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use shared::{
    domain::{SessionStatus, StrategyConfig},
    error::{CommandError, CommandKind},
    protocol::RawReply,
};
use tracing::info;

use crate::{logbook::LogBook, session::SessionStateMachine, transport::BackendApi};

/// Prefix of operator log lines reporting a failure.
pub const FAILURE_PREFIX: &str = "!!";

#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutcome {
    Started,
    Stopped(StopReconciliation),
    Closed { size: Option<f64>, side: Option<String> },
    NoPosition,
    Cancelled,
}

/// What the backend said about its own status right after a stop.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReconciliation {
    Confirmed,
    BackendStillRunning,
    Unverified(String),
}

pub type CommandResult = Result<CommandOutcome, CommandError>;

/// Runs operator control actions against the backend, one round-trip each,
/// and turns every reply into a log line plus (for start/stop) a session
/// transition. Nothing is retried.
pub struct CommandDispatcher {
    api: Arc<dyn BackendApi>,
    session: Arc<SessionStateMachine>,
    log: Arc<LogBook>,
    in_flight: Mutex<Option<CommandKind>>,
}

struct InFlightGuard<'a> {
    slot: &'a Mutex<Option<CommandKind>>,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        *lock_slot(self.slot) = None;
    }
}

fn lock_slot(slot: &Mutex<Option<CommandKind>>) -> MutexGuard<'_, Option<CommandKind>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CommandDispatcher {
    pub fn new(
        api: Arc<dyn BackendApi>,
        session: Arc<SessionStateMachine>,
        log: Arc<LogBook>,
    ) -> Self {
        Self {
            api,
            session,
            log,
            in_flight: Mutex::new(None),
        }
    }

    pub fn in_flight(&self) -> Option<CommandKind> {
        *lock_slot(&self.in_flight)
    }

    fn try_acquire(&self, kind: CommandKind) -> Result<InFlightGuard<'_>, CommandError> {
        let mut slot = lock_slot(&self.in_flight);
        if let Some(current) = *slot {
            return Err(CommandError::InFlight(current));
        }
        let status = self.session.status();
        let controls = self.session.controls();
        let available = match kind {
            CommandKind::Start => controls.start,
            CommandKind::Stop => controls.stop,
            CommandKind::CloseAll => controls.close_all,
            CommandKind::CancelAll => controls.cancel_all,
        };
        if !available {
            return Err(CommandError::Gated {
                command: kind,
                status: status.to_string(),
            });
        }
        *slot = Some(kind);
        Ok(InFlightGuard {
            slot: &self.in_flight,
        })
    }

    /// Takes the in-flight slot for `kind`, or logs why it cannot.
    async fn admit(&self, kind: CommandKind) -> Result<InFlightGuard<'_>, CommandError> {
        match self.try_acquire(kind) {
            Ok(guard) => Ok(guard),
            Err(err) => {
                self.log.warning(format!("--> {} refused: {err}", kind.label())).await;
                Err(err)
            }
        }
    }

    pub async fn start(&self, config: StrategyConfig) -> CommandResult {
        let _guard = self.admit(CommandKind::Start).await?;
        if let Err(reason) = config.validate() {
            self.log
                .error(format!("{FAILURE_PREFIX} start refused: invalid config: {reason}"))
                .await;
            return Err(CommandError::InvalidConfig(reason));
        }

        self.log
            .info(format!("--> sending start command for {}", config.ticker))
            .await;
        match self.api.start(&config).await {
            Ok(reply) if reply.status_is("started") => {
                self.session.confirm_started();
                self.log.success("--> ✅ strategy started").await;
                Ok(CommandOutcome::Started)
            }
            Ok(reply) => {
                let text = reply.failure_text();
                self.log
                    .error(format!("{FAILURE_PREFIX} start failed: {text}"))
                    .await;
                Err(CommandError::Rejected(text))
            }
            Err(err) => {
                self.log
                    .error(format!("{FAILURE_PREFIX} start failed: {err}"))
                    .await;
                Err(CommandError::Transport(err.to_string()))
            }
        }
    }

    /// Stops the session. The local status becomes stopped whatever the
    /// backend answers; the backend's status is then read back and any
    /// disagreement is logged as critical rather than silently resolved.
    pub async fn stop(&self) -> CommandResult {
        let _guard = self.admit(CommandKind::Stop).await?;
        self.log.info("--> sending stop command").await;
        if let Err(err) = self.api.stop().await {
            self.log
                .warning(format!("stop request did not complete cleanly: {err}"))
                .await;
        }
        self.session.force_stopped();
        self.log.success("--> ⏹ strategy stopped").await;

        let reconciliation = match self.api.status().await {
            Ok(res) => match SessionStatus::from_backend(res.status.as_deref()) {
                SessionStatus::Running => {
                    self.log
                        .critical(format!(
                            "{FAILURE_PREFIX} backend still reports running after stop; the session may be live and unmonitored"
                        ))
                        .await;
                    StopReconciliation::BackendStillRunning
                }
                SessionStatus::Stopped => StopReconciliation::Confirmed,
            },
            Err(err) => {
                self.log
                    .warning(format!("could not verify stop with backend: {err}"))
                    .await;
                StopReconciliation::Unverified(err.to_string())
            }
        };
        info!(?reconciliation, "dispatcher: stop reconciled");
        Ok(CommandOutcome::Stopped(reconciliation))
    }

    /// Panic flatten. Never changes the session status.
    pub async fn close_all(&self) -> CommandResult {
        let _guard = self.admit(CommandKind::CloseAll).await?;
        self.log.warning("⚠️ PANIC CLOSE triggered").await;
        let reply = self.reply_or_log(CommandKind::CloseAll, self.api.close_all().await).await?;
        if reply.status_is("closed") {
            let size = reply.reply.size;
            let side = reply.reply.side.clone();
            self.log
                .success(format!(
                    "--> ✅ position closed: {} {}",
                    size.map_or_else(|| "?".to_string(), |s| s.to_string()),
                    side.as_deref().unwrap_or("?")
                ))
                .await;
            Ok(CommandOutcome::Closed { size, side })
        } else if reply.status_is("no_position") {
            self.log.info("--> ℹ nothing to close: position is flat").await;
            Ok(CommandOutcome::NoPosition)
        } else {
            let text = reply.failure_text();
            self.log
                .error(format!("{FAILURE_PREFIX} close all failed: {text}"))
                .await;
            Err(CommandError::Rejected(text))
        }
    }

    /// Cancels every open order. Never changes the session status.
    pub async fn cancel_all(&self) -> CommandResult {
        let _guard = self.admit(CommandKind::CancelAll).await?;
        self.log.warning("⚠️ CANCEL ALL triggered").await;
        let reply = self
            .reply_or_log(CommandKind::CancelAll, self.api.cancel_all().await)
            .await?;
        if reply.status_is("cancelled") {
            self.log.success("--> ✅ all open orders cancelled").await;
            Ok(CommandOutcome::Cancelled)
        } else {
            let text = reply.failure_text();
            self.log
                .error(format!("{FAILURE_PREFIX} cancel all failed: {text}"))
                .await;
            Err(CommandError::Rejected(text))
        }
    }

    async fn reply_or_log(
        &self,
        kind: CommandKind,
        result: Result<RawReply, crate::error::BackendError>,
    ) -> Result<RawReply, CommandError> {
        match result {
            Ok(reply) => Ok(reply),
            Err(err) => {
                self.log
                    .error(format!("{FAILURE_PREFIX} {} failed: {err}", kind.label()))
                    .await;
                Err(CommandError::Transport(err.to_string()))
            }
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
