//! Incident artifacts for a running service.
//!
//! Two subsystems share one rolling log:
//! - [`watch`] tails the most recently written log files and raises an alert
//!   line for every new line that looks like an error.
//! - [`artifacts`] turns core dumps into zipped bundles of stack trace plus
//!   correlated logs, folded into one timestamped archive per run.
//!
//! [`harness`] and [`procs`] are small triage helpers used from the CLI.

#![forbid(unsafe_code)]

pub mod artifacts;
pub mod config;
pub mod harness;
pub mod logging;
pub mod procs;
pub mod watch;
