use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

// ---------------------------------------------------------------------------
// Activity identity
// ---------------------------------------------------------------------------

/// Identifier of a hub activity.
///
/// The hub reports ids as strings, but some firmware sends bare numbers;
/// both deserialize to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ActivityId(String);

impl ActivityId {
    /// Sentinel meaning "no activity running".
    pub const OFF_ID: &'static str = "-1";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The "power off" sentinel.
    pub fn off() -> Self {
        Self(Self::OFF_ID.into())
    }

    /// Normalizes an optional target: no target means everything off.
    pub fn or_off(target: Option<ActivityId>) -> Self {
        target.unwrap_or_else(Self::off)
    }

    pub fn is_off(&self) -> bool {
        self.0 == Self::OFF_ID
    }

    /// Only ids that parse to a positive integer back a user-facing record.
    pub fn is_registrable(&self) -> bool {
        self.0.trim().parse::<i64>().is_ok_and(|n| n > 0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActivityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.0)
    }
}

impl From<&str> for ActivityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ActivityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl<'de> Deserialize<'de> for ActivityId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Int(i64),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Self(s),
            Raw::Int(n) => Self(n.to_string()),
        })
    }
}

/// A hub-defined mode such as "Watch TV".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub label: String,
}

impl Activity {
    pub fn new(id: impl Into<ActivityId>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Credentials presented during the connection handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairRequest {
    pub email: String,
    pub password: String,
}

/// Starts an activity (or turns everything off with the sentinel id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunActivityRequest {
    pub activity_id: ActivityId,
    #[serde(rename = "async")]
    pub run_async: bool,
    pub timestamp: u64,
    pub args: RunActivityArgs,
}

impl RunActivityRequest {
    pub fn start(activity_id: ActivityId, timestamp: u64) -> Self {
        Self {
            activity_id,
            run_async: true,
            timestamp,
            args: RunActivityArgs {
                rule: "start".into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunActivityArgs {
    pub rule: String,
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Handshake reply.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PairResponse {
    #[serde(default)]
    pub identity: String,
}

/// Hub configuration; only the activity list is consumed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConfigResponse {
    #[serde(default)]
    pub activity: Vec<Activity>,
}

/// Currently running activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentActivityResponse {
    pub result: ActivityId,
}
