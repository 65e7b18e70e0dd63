//! Network transport abstraction for Outbox.
//!
//! This module provides a trait-based interface over the network-call
//! primitive so that the interceptor, the probe and the sync engine can be
//! composed around any client: the real `reqwest` client in production, or
//! the scripted in-memory client in tests.
//!
//! # Design Principles
//! - A response with any status is `Ok`; `Err` means the server was not reached
//! - Requests are plain data so they can be persisted and replayed
//! - No global client: callers own and inject the transport

pub mod client;
pub mod http;
pub mod scripted;

pub use client::{status_reason, HttpClient, Request, Response};
pub use http::{ReqwestClient, ReqwestClientConfig};
pub use scripted::ScriptedClient;
