//! Client-side synchronization layer of the trading operator console.
//!
//! The [`ConsoleController`] keeps a consistent local view of a remote
//! trading session. It is fed by two independent producers: a stats poller
//! that only runs while the session is running, and a websocket log stream.
//! Operator commands go through the [`CommandDispatcher`], which is the
//! only path that changes the session status.

pub mod controller;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod log_stream;
pub mod logbook;
pub mod planner;
pub mod session;
pub mod settings;
pub mod telemetry;
pub mod transport;

pub use controller::{ConsoleController, ConsoleView};
pub use dispatcher::{CommandDispatcher, CommandOutcome, CommandResult, StopReconciliation};
pub use error::BackendError;
pub use events::{ConsoleEvent, FeedEvent};
pub use log_stream::LogStreamListener;
pub use logbook::{LogBook, LogHistory};
pub use planner::{PlannerState, TimeToTarget, VolumeProjection};
pub use session::{ControlAvailability, SessionStateMachine};
pub use settings::ConsoleSettings;
pub use telemetry::TelemetryClient;
pub use transport::{BackendApi, HttpBackend};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
