//! Client gate for raw script retrieval.
//!
//! The gate inspects a self-reported identity string (the `User-Agent` over
//! HTTP). Anyone can send any identity, so this is an allow-list for well
//! behaved clients, not access control.

/// Decides whether a client may fetch raw script content.
pub trait ClientGate: Send + Sync {
    fn allows(&self, client_identity: &str) -> bool;
}

impl<F> ClientGate for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn allows(&self, client_identity: &str) -> bool {
        self(client_identity)
    }
}

/// Markers the default gate looks for.
pub const DEFAULT_MARKERS: [&str; 2] = ["Roblox", "HttpGet"];

/// Allows identities containing any of the configured markers (case-sensitive).
#[derive(Debug, Clone)]
pub struct MarkerGate {
    markers: Vec<String>,
}

impl MarkerGate {
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            markers: markers.into_iter().map(Into::into).collect(),
        }
    }

    pub fn markers(&self) -> &[String] {
        &self.markers
    }
}

impl Default for MarkerGate {
    fn default() -> Self {
        Self::new(DEFAULT_MARKERS)
    }
}

impl ClientGate for MarkerGate {
    fn allows(&self, client_identity: &str) -> bool {
        self.markers
            .iter()
            .any(|marker| !marker.is_empty() && client_identity.contains(marker.as_str()))
    }
}
