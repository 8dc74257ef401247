use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as Json;

use crate::{ArborError, ArborResult};

/// A schema-typed document persisted as a single JSON column value.
pub trait Document: Serialize + DeserializeOwned {}

impl<T> Document for T where T: Serialize + DeserializeOwned {}

/// Serializes a typed document into a JSON-native structure, so that only
/// numbers, strings, booleans, nulls, and containers reach the storage
/// layer.
pub fn canonical_json<T: Document>(doc: &T) -> ArborResult<Json> {
    serde_json::to_value(doc).map_err(|err| ArborError::schema(err.to_string()))
}
