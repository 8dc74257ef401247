//! Explicit entity schema descriptors and the bootstrap that applies them.
//! The declarative business schema lives outside this crate; callers hand
//! in a [`SchemaMetadata`] enumerating their tables and this module turns
//! it into dialect-appropriate DDL.

use sea_orm::sea_query::{
    Alias, ColumnDef, ColumnType, Expr, Index, IndexCreateStatement, SchemaStatementBuilder,
    Table, TableCreateStatement, TableDropStatement,
};
use sea_orm::{ConnectionTrait, Statement, TransactionTrait};

use crate::dialect::Dialect;
use crate::functions::{now_sql, uuid_default_expr};
use crate::registry::Engine;
use arbor_core::ArborResult;

/// Turns a camel-case entity name into its snake-case table name. Applied
/// explicitly at schema-build time; nothing derives table names behind the
/// caller's back.
pub fn camel_to_snake(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (position, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if position > 0 {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Server-side default expressions a column can carry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ServerDefault {
    RandomUuid,
    Now,
}

/// Column kinds the portability layer understands. The dialect decides the
/// native storage type.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ColumnKind {
    Uuid,
    Timestamp,
    Json,
    Text,
    BigInteger,
    Boolean,
}

impl ColumnKind {
    pub fn column_type(self, dialect: Dialect) -> ColumnType {
        match (self, dialect) {
            (ColumnKind::Uuid, Dialect::Postgres) => ColumnType::Uuid,
            (ColumnKind::Uuid, Dialect::Sqlite) => ColumnType::Char(Some(36)),
            (ColumnKind::Timestamp, Dialect::Postgres) => ColumnType::TimestampWithTimeZone,
            (ColumnKind::Timestamp, Dialect::Sqlite) => ColumnType::Timestamp,
            (ColumnKind::Json, Dialect::Postgres) => ColumnType::JsonBinary,
            (ColumnKind::Json, Dialect::Sqlite) => ColumnType::Json,
            (ColumnKind::Text, _) => ColumnType::Text,
            (ColumnKind::BigInteger, _) => ColumnType::BigInteger,
            (ColumnKind::Boolean, _) => ColumnType::Boolean,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub nullable: bool,
    pub primary_key: bool,
    pub indexed: bool,
    pub server_default: Option<ServerDefault>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            primary_key: false,
            indexed: false,
            server_default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    pub fn server_default(mut self, default: ServerDefault) -> Self {
        self.server_default = Some(default);
        self
    }
}

#[derive(Clone, Debug)]
pub struct TableSpec {
    pub name: String,
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    pub fn new(entity_name: &str) -> Self {
        Self {
            name: camel_to_snake(entity_name),
            columns: Vec::new(),
        }
    }

    /// The shared base columns every entity table carries: a
    /// server-defaulted identifier primary key plus created/updated
    /// timestamps, with `updated` indexed.
    pub fn with_base_columns(entity_name: &str) -> Self {
        Self::new(entity_name)
            .column(
                ColumnSpec::new("id", ColumnKind::Uuid)
                    .primary_key()
                    .server_default(ServerDefault::RandomUuid),
            )
            .column(
                ColumnSpec::new("created", ColumnKind::Timestamp)
                    .not_null()
                    .server_default(ServerDefault::Now),
            )
            .column(
                ColumnSpec::new("updated", ColumnKind::Timestamp)
                    .not_null()
                    .indexed()
                    .server_default(ServerDefault::Now),
            )
    }

    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.columns.push(column);
        self
    }

    pub fn create_statement(&self, dialect: Dialect) -> TableCreateStatement {
        let mut table = Table::create();
        table.table(Alias::new(&self.name)).if_not_exists();
        for column in &self.columns {
            let mut def = ColumnDef::new_with_type(
                Alias::new(&column.name),
                column.kind.column_type(dialect),
            );
            if !column.nullable {
                def.not_null();
            }
            if column.primary_key {
                def.primary_key();
            }
            match column.server_default {
                Some(ServerDefault::RandomUuid) => {
                    def.default(uuid_default_expr(dialect));
                }
                Some(ServerDefault::Now) => {
                    // sqlite only accepts non-literal defaults in parens
                    def.default(Expr::cust(format!("({})", now_sql(dialect))));
                }
                None => {}
            }
            table.col(def);
        }
        table.to_owned()
    }

    pub fn index_statements(&self) -> Vec<IndexCreateStatement> {
        self.columns
            .iter()
            .filter(|column| column.indexed)
            .map(|column| {
                Index::create()
                    .if_not_exists()
                    .name(format!("ix_{}_{}", self.name, column.name))
                    .table(Alias::new(&self.name))
                    .col(Alias::new(&column.name))
                    .to_owned()
            })
            .collect()
    }

    pub fn drop_statement(&self) -> TableDropStatement {
        Table::drop()
            .table(Alias::new(&self.name))
            .if_exists()
            .to_owned()
    }
}

/// Everything the bootstrap needs to know about the declared entity
/// tables. Supplied by the external schema layer, held by the registry.
#[derive(Clone, Debug, Default)]
pub struct SchemaMetadata {
    pub tables: Vec<TableSpec>,
}

impl SchemaMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, table: TableSpec) -> Self {
        self.tables.push(table);
        self
    }
}

fn schema_statement<S: SchemaStatementBuilder>(dialect: Dialect, stmt: &S) -> Statement {
    let sql = match dialect {
        Dialect::Sqlite => stmt.build(sea_orm::sea_query::SqliteQueryBuilder),
        Dialect::Postgres => stmt.build(sea_orm::sea_query::PostgresQueryBuilder),
    };
    Statement::from_string(dialect.backend(), sql)
}

/// Creates every declared table (and its indexes) in a single transaction.
/// The DDL is `IF NOT EXISTS`, so a lost race against another bootstrapper
/// resolves quietly instead of surfacing an "already exists" error.
pub async fn create_all(engine: &Engine, metadata: &SchemaMetadata) -> ArborResult<()> {
    let dialect = engine.dialect();
    let txn = engine.connection().begin().await?;
    for table in &metadata.tables {
        txn.execute_raw(schema_statement(dialect, &table.create_statement(dialect)))
            .await?;
        for index in table.index_statements() {
            txn.execute_raw(schema_statement(dialect, &index)).await?;
        }
    }
    txn.commit().await?;
    log::debug!(
        "created {} table(s) on {dialect:?} target",
        metadata.tables.len()
    );
    Ok(())
}

/// Drops every declared table in a single transaction. Exposed for test
/// teardown.
pub async fn drop_all(engine: &Engine, metadata: &SchemaMetadata) -> ArborResult<()> {
    let dialect = engine.dialect();
    let txn = engine.connection().begin().await?;
    for table in metadata.tables.iter().rev() {
        txn.execute_raw(schema_statement(dialect, &table.drop_statement()))
            .await?;
    }
    txn.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use sea_orm::sea_query::{PostgresQueryBuilder, SqliteQueryBuilder};

    use super::{ColumnKind, ColumnSpec, ServerDefault, TableSpec, camel_to_snake};
    use crate::dialect::Dialect;

    #[test]
    fn camel_case_names_become_snake_case() {
        assert_eq!(camel_to_snake("FlowRun"), "flow_run");
        assert_eq!(camel_to_snake("TaskRunState"), "task_run_state");
        assert_eq!(camel_to_snake("Deployment"), "deployment");
        assert_eq!(camel_to_snake("already_snake"), "already_snake");
    }

    #[test]
    fn base_columns_render_per_dialect() {
        let spec = TableSpec::with_base_columns("FlowRun");
        assert_eq!(spec.name, "flow_run");

        let pg = spec
            .create_statement(Dialect::Postgres)
            .build(PostgresQueryBuilder);
        assert!(pg.contains("IF NOT EXISTS"), "unexpected ddl: {pg}");
        assert!(pg.contains("uuid"), "unexpected ddl: {pg}");
        assert!(pg.contains("GEN_RANDOM_UUID"), "unexpected ddl: {pg}");
        assert!(pg.contains("CURRENT_TIMESTAMP"), "unexpected ddl: {pg}");

        let lite = spec
            .create_statement(Dialect::Sqlite)
            .build(SqliteQueryBuilder);
        assert!(lite.contains("char(36)"), "unexpected ddl: {lite}");
        assert!(lite.contains("randomblob"), "unexpected ddl: {lite}");
        assert!(lite.contains("strftime"), "unexpected ddl: {lite}");
    }

    #[test]
    fn json_columns_use_jsonb_only_on_postgres() {
        let spec = TableSpec::new("Artifact")
            .column(ColumnSpec::new("id", ColumnKind::Uuid).primary_key())
            .column(ColumnSpec::new("payload", ColumnKind::Json));
        let pg = spec
            .create_statement(Dialect::Postgres)
            .build(PostgresQueryBuilder);
        assert!(pg.contains("jsonb"), "unexpected ddl: {pg}");
        let lite = spec
            .create_statement(Dialect::Sqlite)
            .build(SqliteQueryBuilder);
        assert!(!lite.contains("jsonb"), "unexpected ddl: {lite}");
    }

    #[test]
    fn indexed_columns_get_named_indexes() {
        let spec = TableSpec::with_base_columns("FlowRun");
        let indexes = spec.index_statements();
        assert_eq!(indexes.len(), 1);
        let sql = indexes[0].build(SqliteQueryBuilder);
        assert!(sql.contains("ix_flow_run_updated"), "unexpected ddl: {sql}");
        assert!(sql.contains("IF NOT EXISTS"), "unexpected ddl: {sql}");
    }

    #[test]
    fn drop_statement_is_idempotent() {
        let spec = TableSpec::new("FlowRun");
        let sql = spec.drop_statement().build(SqliteQueryBuilder);
        assert!(sql.contains("IF EXISTS"), "unexpected ddl: {sql}");
    }

    #[test]
    fn plain_columns_carry_no_default() {
        let spec = TableSpec::new("Note")
            .column(ColumnSpec::new("body", ColumnKind::Text).not_null())
            .column(
                ColumnSpec::new("created", ColumnKind::Timestamp)
                    .server_default(ServerDefault::Now),
            );
        let sql = spec
            .create_statement(Dialect::Sqlite)
            .build(SqliteQueryBuilder);
        let body = sql.split(',').next().unwrap_or("");
        assert!(!body.contains("DEFAULT"), "unexpected ddl: {sql}");
        assert!(sql.contains("DEFAULT"), "unexpected ddl: {sql}");
    }
}
