use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// A hub that answered a discovery ping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredHub {
    pub ip: String,
    pub friendly_name: String,
    pub uuid: String,
    pub remote_id: String,
    pub account_id: String,
    /// Every `key:value` pair of the advertisement, verbatim.
    pub properties: HashMap<String, String>,
    #[serde(skip)]
    pub discovered_at: Option<Instant>,
}

impl DiscoveredHub {
    /// Parses a `key:value;key:value` advertisement.
    ///
    /// Values may themselves contain `:` (e.g. a host with a port), so only
    /// the first colon of each pair splits. Returns `None` if the payload
    /// carries neither an `ip` field nor a usable peer address.
    pub fn parse(advert: &str, peer: Option<IpAddr>) -> Option<Self> {
        let properties: HashMap<String, String> = advert
            .trim()
            .split(';')
            .filter_map(|pair| {
                let (key, value) = pair.split_once(':')?;
                let key = key.trim();
                if key.is_empty() {
                    return None;
                }
                Some((key.to_string(), value.trim().to_string()))
            })
            .collect();

        let field = |name: &str| properties.get(name).cloned().unwrap_or_default();

        let ip = match properties.get("ip").filter(|ip| !ip.is_empty()) {
            Some(ip) => ip.clone(),
            None => peer?.to_string(),
        };

        Some(Self {
            ip,
            friendly_name: field("friendlyName"),
            uuid: field("uuid"),
            remote_id: field("remoteId"),
            account_id: field("accountId"),
            discovered_at: Some(Instant::now()),
            properties,
        })
    }

    /// Stable identity used to suppress repeat advertisements.
    pub fn key(&self) -> &str {
        if self.uuid.is_empty() {
            &self.ip
        } else {
            &self.uuid
        }
    }

    /// Human-readable name, falling back to the address.
    pub fn display_name(&self) -> &str {
        if self.friendly_name.is_empty() {
            &self.ip
        } else {
            &self.friendly_name
        }
    }
}

/// A discovery event.
#[derive(Debug, Clone)]
pub struct DiscoveryEvent {
    pub event_type: EventType,
    pub hub: DiscoveredHub,
}

/// Type of discovery event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// First advertisement from a hub.
    Discovered,
    /// A known hub re-advertised with a different address.
    Updated,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::Discovered => write!(f, "discovered"),
            EventType::Updated => write!(f, "updated"),
        }
    }
}
