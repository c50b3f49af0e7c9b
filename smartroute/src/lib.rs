//! Weighted MX transport routing for Postfix
//!
//! `smartroute` answers Postfix `tcp_table` lookups with the transport to use
//! for a recipient. The decision depends on the recipient's MX hostnames and an
//! ordered rule table, and the chosen server is picked from a group so that
//! each server receives its configured share of the traffic.
//!
//! This crate ties the pieces together: it reads the configuration, runs the
//! listener alongside periodic housekeeping, and reports per-server statistics
//! on shutdown.

pub mod config;
pub mod controller;
pub mod housekeeping;

pub use controller::{SHUTDOWN_BROADCAST, Service, SmartRouter};
