pub mod adapters;
pub mod config;
pub mod dialect;
pub mod functions;
pub mod predicate;
pub mod registry;
pub mod schema;

pub use arbor_core::*;
pub use adapters::{ColumnAdapter, DocumentAdapter, IdAdapter, InstantAdapter};
pub use config::{ArborConfig, DatabaseConfig, PoolConfig};
pub use dialect::{Dialect, resolve_dialect};
pub use predicate::Predicate;
pub use registry::{ContextId, Engine, Registry, Session, SessionFactory};
pub use schema::{ColumnKind, ColumnSpec, SchemaMetadata, ServerDefault, TableSpec};
