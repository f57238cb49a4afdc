//! Network layer.
//!
//! - [`Connection`]: the per-client session object (outbound queue, request
//!   metadata, auth slot)
//! - [`Gateway`]: WebSocket listener spawning one task per connection
//! - [`protocol`]: JSON wire format

mod connection;
mod gateway;
pub mod protocol;

pub use connection::{AuthState, Connection, ConnectionId};
pub use gateway::Gateway;
