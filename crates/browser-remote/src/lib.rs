//! browser-remote: relays HTTP queries to a browser extension over native messaging.

pub mod bridge;
pub mod network;
pub mod registry;
pub mod service;
pub mod timer;
pub mod transport;

pub use bridge::protocol::{CorrelationId, MessageFromNative, MessageToNative};
pub use bridge::{Bridge, BridgeError, MessageHandler, NativeSender};
pub use network::PortScan;
pub use registry::{CorrelationRegistry, PendingResponse, RegistryError, WaitOutcome};
pub use service::{DEFAULT_TIMEOUT, RelayError, RelayOutcome, RelayQuery, RelayService};
pub use timer::{ManualTimer, RequestTimer, Timer, TokioTimer};
