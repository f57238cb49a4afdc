//! Integration test common infrastructure.
//!
//! Provides an in-process test server and a WebSocket test client that
//! speaks the JSON protocol.

pub mod client;
pub mod server;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;
