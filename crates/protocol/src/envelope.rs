use serde::{Deserialize, Deserializer, Serialize};

use crate::constants::{CODE_IN_PROGRESS, CODE_OK};

/// Outbound request envelope.
///
/// `params` uses `serde_json::value::RawValue` so payloads are serialized
/// once, when the request is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    pub cmd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Box<serde_json::value::RawValue>>,
}

impl Request {
    /// Creates a new request for `cmd` with optional parameters.
    pub fn new<T: Serialize>(
        id: impl Into<String>,
        cmd: impl Into<String>,
        params: Option<&T>,
    ) -> Result<Self, serde_json::Error> {
        let raw = match params {
            Some(p) => {
                let json = serde_json::to_string(p)?;
                Some(serde_json::value::RawValue::from_string(json)?)
            }
            None => None,
        };
        Ok(Self {
            id: id.into(),
            cmd: cmd.into(),
            params: raw,
        })
    }
}

/// Inbound response (or unsolicited notification) envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub cmd: String,
    #[serde(default = "default_code", deserialize_with = "code_from_any")]
    pub code: u16,
    #[serde(default)]
    pub msg: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Box<serde_json::value::RawValue>>,
}

impl Response {
    /// Returns true for a completed, successful exchange.
    pub fn is_ok(&self) -> bool {
        self.code == CODE_OK
    }

    /// Returns true for an intermediate notice that must not complete
    /// the pending request.
    pub fn is_progress(&self) -> bool {
        self.code == CODE_IN_PROGRESS
    }

    /// Deserializes the `data` field into the given type.
    pub fn parse_data<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<T>, serde_json::Error> {
        match &self.data {
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
            None => Ok(None),
        }
    }
}

fn default_code() -> u16 {
    CODE_OK
}

/// Some firmware revisions send the code as a string.
fn code_from_any<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Code {
        Num(u16),
        Text(String),
    }

    match Code::deserialize(deserializer)? {
        Code::Num(n) => Ok(n),
        Code::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::cmd;

    #[test]
    fn request_with_params() {
        let params = serde_json::json!({"activityId": "42"});
        let req = Request::new("r1", cmd::RUN_ACTIVITY, Some(&params)).unwrap();
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"cmd\":\"harmony.activityengine?runactivity\""));
        assert!(json.contains("\"activityId\":\"42\""));
    }

    #[test]
    fn request_omits_missing_params() {
        let req = Request::new::<()>("r2", cmd::GET_CURRENT_ACTIVITY, None).unwrap();
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("params"));
    }

    #[test]
    fn response_code_accepts_string() {
        let resp: Response =
            serde_json::from_str(r#"{"id":"a","code":"200","msg":"OK"}"#).unwrap();
        assert!(resp.is_ok());
    }

    #[test]
    fn response_progress_is_not_ok() {
        let resp: Response = serde_json::from_str(r#"{"id":"a","code":100}"#).unwrap();
        assert!(resp.is_progress());
        assert!(!resp.is_ok());
    }

    #[test]
    fn response_without_code_defaults_to_ok() {
        let resp: Response = serde_json::from_str(r#"{"id":"a","data":{"result":"7"}}"#).unwrap();
        assert!(resp.is_ok());
        let data: serde_json::Value = resp.parse_data().unwrap().unwrap();
        assert_eq!(data["result"], "7");
    }

    #[test]
    fn response_rejects_garbage_code() {
        let result = serde_json::from_str::<Response>(r#"{"id":"a","code":"nope"}"#);
        assert!(result.is_err());
    }
}
