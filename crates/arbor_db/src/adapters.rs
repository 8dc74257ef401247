//! Cross-dialect value adapters. Each adapter is one implementation of the
//! [`ColumnAdapter`] capability interface: encode into the bind value the
//! backend expects, decode whatever the backend hands back into the
//! canonical domain type, and name the native column type per dialect.

use std::marker::PhantomData;

use chrono::{DateTime, NaiveDateTime, Utc};
use sea_orm::QueryResult;
use sea_orm::sea_query::{ColumnType, Value as SeaValue};
use serde_json::Value as Json;
use uuid::Uuid;

use crate::dialect::Dialect;
use arbor_core::{ArborError, ArborResult, Document, Id, Instant, InstantInput, canonical_json};

const SQLITE_INSTANT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Bidirectional encode/decode pair plus the native storage type, one per
/// adapted column kind. Callers depend on this interface, not on any
/// base-type hook contract.
pub trait ColumnAdapter {
    /// What callers hand to `encode`.
    type Input;
    /// What `decode` materializes rows into.
    type Value;

    fn native_type(&self, dialect: Dialect) -> ColumnType;

    fn encode(&self, dialect: Dialect, value: Option<Self::Input>) -> ArborResult<SeaValue>;

    fn decode(&self, dialect: Dialect, value: SeaValue) -> ArborResult<Option<Self::Value>>;
}

/// Identifier columns: native uuid on Postgres, 36-char hyphenated text on
/// sqlite. The textual form is byte-identical before encode and after
/// decode on both dialects.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdAdapter;

impl IdAdapter {
    /// Encodes caller-supplied text, attempting a canonical parse first so
    /// malformed identifiers fail here instead of inside the backend.
    pub fn encode_text(&self, dialect: Dialect, value: &str) -> ArborResult<SeaValue> {
        let id = Id::parse_str(value)?;
        self.encode(dialect, Some(id))
    }
}

impl ColumnAdapter for IdAdapter {
    type Input = Id;
    type Value = Id;

    fn native_type(&self, dialect: Dialect) -> ColumnType {
        match dialect {
            Dialect::Postgres => ColumnType::Uuid,
            Dialect::Sqlite => ColumnType::Char(Some(36)),
        }
    }

    fn encode(&self, dialect: Dialect, value: Option<Id>) -> ArborResult<SeaValue> {
        Ok(match (dialect, value) {
            (Dialect::Postgres, Some(id)) => id.as_uuid().into(),
            (Dialect::Postgres, None) => SeaValue::Uuid(None),
            (Dialect::Sqlite, Some(id)) => id.to_uuid_string().into(),
            (Dialect::Sqlite, None) => SeaValue::String(None),
        })
    }

    fn decode(&self, _dialect: Dialect, value: SeaValue) -> ArborResult<Option<Id>> {
        match value {
            SeaValue::Uuid(Some(uuid)) => Ok(Some(Id::from(uuid))),
            SeaValue::String(Some(text)) => Id::parse_str(&text).map(Some),
            SeaValue::Bytes(Some(bytes)) => bytes_to_id(&bytes).map(Some),
            SeaValue::Uuid(None) | SeaValue::String(None) | SeaValue::Bytes(None) => Ok(None),
            other => Err(ArborError::format(format!(
                "unsupported identifier representation: {other:?}"
            ))),
        }
    }
}

/// Timestamp columns. Postgres keeps native timezone awareness; sqlite
/// stores naive text normalized to UTC. Naive inputs are rejected at
/// encode, and decode always comes back with UTC attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct InstantAdapter;

impl ColumnAdapter for InstantAdapter {
    type Input = InstantInput;
    type Value = Instant;

    fn native_type(&self, dialect: Dialect) -> ColumnType {
        match dialect {
            Dialect::Postgres => ColumnType::TimestampWithTimeZone,
            Dialect::Sqlite => ColumnType::Timestamp,
        }
    }

    fn encode(&self, dialect: Dialect, value: Option<InstantInput>) -> ArborResult<SeaValue> {
        let Some(value) = value else {
            return Ok(match dialect {
                Dialect::Postgres => SeaValue::ChronoDateTimeWithTimeZone(None),
                Dialect::Sqlite => SeaValue::String(None),
            });
        };
        let instant = value.into_instant()?;
        Ok(match dialect {
            Dialect::Postgres => instant.to_utc().fixed_offset().into(),
            Dialect::Sqlite => instant
                .to_utc()
                .format(SQLITE_INSTANT_FORMAT)
                .to_string()
                .into(),
        })
    }

    fn decode(&self, _dialect: Dialect, value: SeaValue) -> ArborResult<Option<Instant>> {
        match value {
            SeaValue::ChronoDateTimeWithTimeZone(Some(value)) => {
                Ok(Some(Instant::from_utc(value.with_timezone(&Utc))))
            }
            SeaValue::ChronoDateTimeUtc(Some(value)) => Ok(Some(Instant::from_utc(value))),
            SeaValue::ChronoDateTime(Some(value)) => {
                Ok(Some(Instant::from_utc(value.and_utc())))
            }
            SeaValue::String(Some(text)) => parse_stored_instant(&text).map(Some),
            SeaValue::ChronoDateTimeWithTimeZone(None)
            | SeaValue::ChronoDateTimeUtc(None)
            | SeaValue::ChronoDateTime(None)
            | SeaValue::String(None) => Ok(None),
            other => Err(ArborError::format(format!(
                "unsupported timestamp representation: {other:?}"
            ))),
        }
    }
}

/// Schema-typed JSON document columns: jsonb on Postgres so containment and
/// key predicates push down, plain JSON text on sqlite. Encode validates
/// the raw document against the schema type `T` and canonicalizes it, so no
/// backend-incompatible value ever reaches the bind parameter.
#[derive(Clone, Copy, Debug)]
pub struct DocumentAdapter<T: Document> {
    marker: PhantomData<T>,
}

impl<T: Document> Default for DocumentAdapter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Document> DocumentAdapter<T> {
    pub fn new() -> Self {
        Self {
            marker: PhantomData,
        }
    }

    /// Encodes an already-typed document.
    pub fn encode_typed(&self, dialect: Dialect, value: &T) -> ArborResult<SeaValue> {
        let canonical = canonical_json(value)?;
        Ok(match dialect {
            Dialect::Postgres => canonical.into(),
            // sqlite stores JSON as whitespace-stripped text; the compact
            // serialization keeps stored values comparable.
            Dialect::Sqlite => canonical.to_string().into(),
        })
    }

    fn validate(&self, value: Json) -> ArborResult<T> {
        serde_json::from_value(value).map_err(|err| ArborError::schema(err.to_string()))
    }
}

impl<T: Document> ColumnAdapter for DocumentAdapter<T> {
    type Input = Json;
    type Value = T;

    fn native_type(&self, dialect: Dialect) -> ColumnType {
        match dialect {
            Dialect::Postgres => ColumnType::JsonBinary,
            Dialect::Sqlite => ColumnType::Json,
        }
    }

    fn encode(&self, dialect: Dialect, value: Option<Json>) -> ArborResult<SeaValue> {
        let Some(value) = value else {
            return Ok(match dialect {
                Dialect::Postgres => SeaValue::Json(None),
                Dialect::Sqlite => SeaValue::String(None),
            });
        };
        let typed = self.validate(value)?;
        self.encode_typed(dialect, &typed)
    }

    fn decode(&self, _dialect: Dialect, value: SeaValue) -> ArborResult<Option<T>> {
        match value {
            SeaValue::Json(Some(value)) => self.validate(*value).map(Some),
            SeaValue::String(Some(text)) => {
                let value: Json = serde_json::from_str(&text)
                    .map_err(|err| ArborError::format(format!("stored document: {err}")))?;
                self.validate(value).map(Some)
            }
            SeaValue::Json(None) | SeaValue::String(None) => Ok(None),
            other => Err(ArborError::format(format!(
                "unsupported document representation: {other:?}"
            ))),
        }
    }
}

fn bytes_to_id(bytes: &[u8]) -> ArborResult<Id> {
    let buf: [u8; 16] = bytes
        .try_into()
        .map_err(|_| ArborError::format("identifier blob must be 16 bytes"))?;
    Ok(Id::from_bytes(buf))
}

fn parse_stored_instant(text: &str) -> ArborResult<Instant> {
    if let Ok(value) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(Instant::from_utc(value.with_timezone(&Utc)));
    }
    if let Ok(value) = DateTime::parse_from_rfc3339(text) {
        return Ok(Instant::from_utc(value.with_timezone(&Utc)));
    }
    // stored naive values are UTC by construction
    if let Ok(value) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(Instant::from_utc(value.and_utc()));
    }
    Err(ArborError::format(format!(
        "unparseable stored timestamp '{text}'"
    )))
}

/// Row readers over raw query results. Each tries the representations the
/// supported backends are known to produce and materializes the canonical
/// type.
pub fn read_id(row: &QueryResult, column: &str) -> ArborResult<Id> {
    if let Ok(value) = row.try_get::<Uuid>("", column) {
        return Ok(Id::from(value));
    }
    if let Ok(value) = row.try_get::<String>("", column) {
        return Id::parse_str(&value);
    }
    if let Ok(value) = row.try_get::<Vec<u8>>("", column) {
        return bytes_to_id(&value);
    }
    Err(ArborError::format(format!(
        "column '{column}' holds no identifier"
    )))
}

pub fn read_opt_id(row: &QueryResult, column: &str) -> ArborResult<Option<Id>> {
    if let Ok(value) = row.try_get::<Option<Uuid>>("", column) {
        return Ok(value.map(Id::from));
    }
    if let Ok(value) = row.try_get::<Option<String>>("", column) {
        return value.map(|value| Id::parse_str(&value)).transpose();
    }
    if let Ok(value) = row.try_get::<Option<Vec<u8>>>("", column) {
        return value.map(|value| bytes_to_id(&value)).transpose();
    }
    Ok(None)
}

pub fn read_instant(row: &QueryResult, column: &str) -> ArborResult<Option<Instant>> {
    if let Ok(value) = row.try_get::<Option<DateTime<chrono::FixedOffset>>>("", column) {
        return Ok(value.map(|value| Instant::from_utc(value.with_timezone(&Utc))));
    }
    if let Ok(value) = row.try_get::<Option<NaiveDateTime>>("", column) {
        return Ok(value.map(|value| Instant::from_utc(value.and_utc())));
    }
    if let Ok(value) = row.try_get::<Option<String>>("", column) {
        return value.map(|value| parse_stored_instant(&value)).transpose();
    }
    Ok(None)
}

pub fn read_document<T: Document>(row: &QueryResult, column: &str) -> ArborResult<Option<T>> {
    let adapter = DocumentAdapter::<T>::new();
    if let Ok(value) = row.try_get::<Option<Json>>("", column) {
        let Some(value) = value else {
            return Ok(None);
        };
        return adapter.decode(Dialect::Postgres, value.into());
    }
    if let Ok(value) = row.try_get::<Option<String>>("", column) {
        let Some(value) = value else {
            return Ok(None);
        };
        return adapter.decode(Dialect::Sqlite, value.into());
    }
    Ok(None)
}
