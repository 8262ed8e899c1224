//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `ConnectionRegistry`: Live client connections
//! - `StreamSession`: Per-connection upstream subscription and I/O tasks
//! - `BroadcastRouter`: Two-way fan-out of ticks (client + evaluator)
//! - `AlertEvaluator`: Threshold checks and trigger-then-notify
//! - `NotificationBridge`: Detached dispatch to the user's channels
//! - `AlertPoller`: Periodic quotes for alerts when nobody is streaming
//! - `QuoteEngine`: Wires the above together

mod engine;
mod evaluator;
mod notifier;
mod poller;
mod registry;
mod router;
mod session;

pub use engine::{EnginePorts, EngineSettings, LookupError, QuoteEngine};
pub use evaluator::AlertEvaluator;
pub use notifier::NotificationBridge;
pub use poller::AlertPoller;
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, ConnectionToken};
pub use router::{BroadcastRouter, RouteOutcome, RouterConfig, RouterStats};
pub use session::{
    NO_SYMBOLS_MESSAGE, SessionConfig, SessionEnd, SessionHandle, StreamSession, Upstream,
};
