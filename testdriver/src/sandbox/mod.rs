//! Sandbox Transport (C4, spec §4.4): a long-lived duplex websocket channel
//! to the remote desktop, with pending-promise request correlation and
//! two-dialect protocol adaptation.

mod dialect;
mod protocol;
mod transport;

pub use dialect::{adapt_inbound, adapt_outbound, Dialect};
pub use protocol::{InboundMessage, OutboundMessage, SandboxInstance};
pub use transport::{SandboxError, SandboxState, SandboxTransport};
