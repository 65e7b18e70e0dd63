//! Connectivity monitoring for Outbox.
//!
//! Platform link events are a fast but untrustworthy signal: they describe
//! the local interface, not whether the origin answers. The monitor reacts to
//! "link down" immediately and only believes "link up" once an active probe
//! reaches the origin.

pub mod monitor;
pub mod probe;

pub use monitor::{Connectivity, ConnectivityMonitor, LinkSignal};
pub use probe::{Probe, ProbeConfig, ProbeOutcome};
