//! Configuration types shared between the listener and the controller.

pub mod timeouts;

pub use timeouts::SessionTimeouts;
