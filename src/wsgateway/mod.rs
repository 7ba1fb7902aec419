//! WebSocket relay gateway: upgrade admission and the bidirectional frame
//! relay to a registered backend.

pub mod relay;
pub mod upgrade;

pub use relay::{relay, RelayConfig, CLOSE_RATE_LIMITED, CLOSE_SESSION_INVALIDATED};
pub use upgrade::{derive_backend_ws_url, is_websocket_upgrade, WsAdmissionError};
