use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::{ArborError, ArborResult};

/// Canonical 128-bit identifier. The hyphenated textual form is the same on
/// every backend, whatever the storage representation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Id(pub [u8; 16]);

impl Id {
    pub fn new() -> Self {
        Self(*Uuid::new_v4().as_bytes())
    }

    pub fn parse_str(value: &str) -> ArborResult<Self> {
        let uuid = Uuid::parse_str(value)
            .map_err(|err| ArborError::format(format!("invalid uuid '{value}': {err}")))?;
        Ok(Self(*uuid.as_bytes()))
    }

    pub fn to_uuid_string(self) -> String {
        Uuid::from_bytes(self.0).to_string()
    }

    pub fn as_uuid(self) -> Uuid {
        Uuid::from_bytes(self.0)
    }

    pub fn as_bytes(self) -> [u8; 16] {
        self.0
    }

    pub fn as_vec(self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uuid = Uuid::from_bytes(self.0);
        write!(f, "{uuid}")
    }
}

impl From<Uuid> for Id {
    fn from(value: Uuid) -> Self {
        Self(*value.as_bytes())
    }
}

impl Serialize for Id {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_uuid_string())
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Id::parse_str(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::Id;

    #[test]
    fn textual_form_round_trips() {
        let id = Id::new();
        let text = id.to_uuid_string();
        let parsed = Id::parse_str(&text).expect("parse");
        assert_eq!(parsed, id);
        assert_eq!(parsed.to_uuid_string(), text);
    }

    #[test]
    fn rejects_malformed_text() {
        let err = Id::parse_str("not-a-uuid").expect_err("must fail");
        assert!(matches!(err, crate::ArborError::Format { .. }));
    }

    #[test]
    fn serde_uses_hyphenated_text() {
        let id = Id::parse_str("9f36adcd-6e73-4e7f-9b5a-1c5cb4b7f0a2").expect("parse");
        let encoded = serde_json::to_string(&id).expect("encode");
        assert_eq!(encoded, "\"9f36adcd-6e73-4e7f-9b5a-1c5cb4b7f0a2\"");
        let decoded: Id = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, id);
    }
}
