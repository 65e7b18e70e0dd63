//! Transparent offline interception for Outbox.
//!
//! `OfflineClient` is a decorator the application composes around its normal
//! network client. Mutating calls made while offline are queued durably and
//! answered with an explicit `Dispatch::Queued`; everything else passes
//! through untouched.

pub mod client;
pub mod form;
pub mod replay;

pub use client::{Dispatch, OfflineClient, QUEUED_HEADER};
pub use form::{FieldValue, Form};
pub use replay::replay_request;
