//! Test support utilities for end-to-end testing
//!
//! Starts a complete service on an ephemeral port with a static MX table and
//! talks to it over real TCP the way Postfix does.

pub mod harness;

pub use harness::TestHarness;
