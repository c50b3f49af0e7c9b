//! Timeout configuration for table client sessions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Per-connection timeouts.
///
/// ```ron
/// timeouts: (
///     inactivity_secs: 600,
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTimeouts {
    /// How long a client may stay silent before its connection is closed.
    ///
    /// `0` disables the timeout entirely.
    ///
    /// Default: 600 seconds
    #[serde(default = "defaults::inactivity_secs")]
    pub inactivity_secs: u64,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            inactivity_secs: defaults::inactivity_secs(),
        }
    }
}

impl SessionTimeouts {
    /// The inactivity timeout, or `None` when it has been disabled
    #[must_use]
    pub const fn inactivity(&self) -> Option<Duration> {
        if self.inactivity_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.inactivity_secs))
        }
    }
}

mod defaults {
    pub const fn inactivity_secs() -> u64 {
        600
    }
}
