//! services/api/src/lib.rs
//!
//! The HTTP/WebSocket service around `chat_core`: Postgres, SMTP and disk
//! adapters, configuration, and the axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod maintenance;
pub mod web;
