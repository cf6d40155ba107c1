//! Mapping a domain to the zone authoritative for it.

use serde::{Deserialize, Serialize};

/// A DNS zone as reported by a backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Zone {
    /// Zone name, fully qualified with a trailing dot (e.g. `example.com.`).
    pub name: String,
    /// Opaque backend identifier used to address the zone in API calls.
    pub id: String,
}

impl Zone {
    pub fn new(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: id.into(),
        }
    }

    /// Whether this zone is treated as covering `domain`.
    ///
    /// NB: this is a substring test on the zone name without its trailing dot, not a label
    /// suffix match. A zone `ple.com.` covers `example.com`.
    #[must_use]
    pub fn covers(&self, domain: &str) -> bool {
        let name = self.name.strip_suffix('.').unwrap_or(&self.name);
        domain.contains(name)
    }
}

/// The first zone of `zones`, in backend order, that [covers][Zone::covers] `domain`.
#[must_use]
pub fn find_zone<'a>(domain: &str, zones: &'a [Zone]) -> Option<&'a Zone> {
    zones.iter().find(|zone| zone.covers(domain))
}
