//! Weighted round-robin selection
//!
//! Each pick recomputes every server's share of the registry's sends so far,
//! then walks the list circularly starting just after the previous pick and
//! takes the first server still below its target fraction. Over time the send
//! distribution converges on the configured shares whatever the arrival
//! pattern, with no state beyond the counts and the cursor.
//!
//! A request naming a server directly is pinned to it. Pinned picks count
//! towards the server's total but leave the cursor where it was.
//!
//! When every server already sits at its target (exact ties only), the scan
//! falls back to the first server after the cursor that has a nonzero share.
//! A zero-share server is therefore only reachable by pinning, unless every
//! share in the registry is zero, in which case the fallback is plain
//! round-robin.

use crate::registry::Registry;

/// The server picked for one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub registry: String,
    pub server: String,
    pub address: String,
    /// Chosen because the request named it, not by the weighted scan
    pub pinned: bool,
}

impl Registry {
    /// Pick the next server for `identifier`.
    ///
    /// Returns `None` only when the registry has no servers.
    pub fn select_next(&mut self, identifier: Option<&str>) -> Option<Selection> {
        if let Some(index) = identifier.and_then(|name| self.position(name)) {
            return Some(self.record(index, true));
        }

        let index = self.scan()?;
        self.cursor = Some(index);
        Some(self.record(index, false))
    }

    fn scan(&mut self) -> Option<usize> {
        let len = self.servers.len();
        if len == 0 {
            return None;
        }

        self.recompute_fractions();

        let start = self.cursor.map_or(0, |cursor| (cursor + 1) % len);
        let circle = (0..len).map(|step| (start + step) % len);

        let underserved = circle
            .clone()
            .find(|&i| self.servers[i].current_fraction < self.servers[i].target_fraction);

        Some(
            underserved
                .or_else(|| circle.clone().find(|&i| self.servers[i].share() > 0))
                .unwrap_or(start),
        )
    }

    fn record(&mut self, index: usize, pinned: bool) -> Selection {
        let server = &mut self.servers[index];
        server.sent += 1;
        let (name, address) = (server.name.clone(), server.address.clone());

        Selection {
            registry: self.name().to_string(),
            server: name,
            address,
            pinned,
        }
    }
}
