//! slauth - multi-strategy authentication and session service.
//!
//! Accounts log in by password, by exchanging a previously issued token, or
//! by proving control of an external platform identity with a short pairing
//! code. Every connected client receives a pushed snapshot of its session
//! whenever that session changes.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod network;
pub mod security;
