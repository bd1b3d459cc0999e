//! Provider configuration with sealed secrets.

use std::fmt;

use serde_json::{Map, Value};

use crate::{HangarError, Result};

/// Config keys whose values are never shown back to callers.
pub const SECRET_FIELDS: &[&str] = &[
    "access_token",
    "refresh_token",
    "client_secret",
    "secret_key",
    "secret_id",
];

/// Placeholder used in place of a secret value.
pub const REDACTED: &str = "********";

/// The JSON config object of a storage provider.
///
/// The raw map is private. `Debug` and [`redacted`](Self::redacted) mask
/// every field listed in [`SECRET_FIELDS`]; only backend construction reads
/// the real values through [`get`](Self::get).
#[derive(Clone, PartialEq, Default)]
pub struct ProviderCredentials {
    fields: Map<String, Value>,
}

impl ProviderCredentials {
    /// Accepts a JSON object; anything else is a `Validation` error.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            Value::Null => Ok(Self::default()),
            _ => Err(HangarError::Validation(
                "provider config must be a JSON object".to_string(),
            )),
        }
    }

    /// Parse the stored JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| HangarError::Database(format!("corrupt provider config: {e}")))?;
        Self::from_value(value)
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.fields)
            .map_err(|e| HangarError::Validation(format!("provider config: {e}")))
    }

    /// Non-empty string value of a field.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// Required fields that are absent or empty.
    pub fn missing<'k>(&self, required: &[&'k str]) -> Vec<&'k str> {
        required
            .iter()
            .copied()
            .filter(|key| self.get(key).is_none())
            .collect()
    }

    /// Copy of the config with secret values replaced.
    pub fn redacted(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|(key, value)| {
                if SECRET_FIELDS.contains(&key.as_str()) {
                    (key.clone(), Value::String(REDACTED.to_string()))
                } else {
                    (key.clone(), value.clone())
                }
            })
            .collect()
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ProviderCredentials")
            .field(&Value::Object(self.redacted()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> ProviderCredentials {
        ProviderCredentials::from_value(json!({
            "client_id": "cid",
            "client_secret": "very-secret",
            "access_token": "tok-123",
            "region": "ap-guangzhou"
        }))
        .unwrap()
    }

    #[test]
    fn test_debug_hides_secrets() {
        let rendered = format!("{:?}", sample());
        assert!(!rendered.contains("very-secret"));
        assert!(!rendered.contains("tok-123"));
        assert!(rendered.contains("cid"));
        assert!(rendered.contains(REDACTED));
    }

    #[test]
    fn test_redacted_view() {
        let view = sample().redacted();
        assert_eq!(view["client_secret"], json!(REDACTED));
        assert_eq!(view["access_token"], json!(REDACTED));
        assert_eq!(view["client_id"], json!("cid"));
        assert_eq!(view["region"], json!("ap-guangzhou"));
    }

    #[test]
    fn test_get_and_missing() {
        let creds = ProviderCredentials::from_value(json!({
            "secret_id": "id",
            "secret_key": "",
            "region": 5
        }))
        .unwrap();
        assert_eq!(creds.get("secret_id"), Some("id"));
        assert_eq!(creds.get("secret_key"), None);
        assert_eq!(
            creds.missing(&["secret_id", "secret_key", "region"]),
            vec!["secret_key", "region"]
        );
    }

    #[test]
    fn test_json_roundtrip_and_shape() {
        let creds = sample();
        let text = creds.to_json().unwrap();
        assert_eq!(ProviderCredentials::from_json(&text).unwrap(), creds);

        assert!(ProviderCredentials::from_value(json!(["a"])).is_err());
        assert_eq!(
            ProviderCredentials::from_value(Value::Null).unwrap(),
            ProviderCredentials::default()
        );
    }
}
