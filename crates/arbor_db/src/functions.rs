//! Per-dialect SQL default expressions, plus their client-side equivalents
//! for callers that need a value before any database round-trip.

use sea_orm::sea_query::Expr;

use crate::dialect::Dialect;
use arbor_core::{Id, Instant};

/// Version-4-shaped UUID text assembled from `randomblob` pieces, so that a
/// plain sqlite build needs no extensions. Hex output is lowercased and the
/// version nibble and variant digit are spliced in literally.
const SQLITE_UUID_DEFAULT: &str = "(lower(hex(randomblob(4))) \
     || '-' || lower(hex(randomblob(2))) \
     || '-4' || substr(lower(hex(randomblob(2))),2) \
     || '-' || substr('89ab',abs(random()) % 4 + 1, 1) \
     || substr(lower(hex(randomblob(2))),2) \
     || '-' || lower(hex(randomblob(6))))";

/// `%f` carries millisecond precision; the literal `000` pads stored
/// defaults to the six fractional digits the adapters write.
const SQLITE_NOW: &str = "strftime('%Y-%m-%d %H:%M:%f000+00:00', 'now')";

/// Server-side identifier default.
pub fn uuid_default_sql(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => "(GEN_RANDOM_UUID())",
        Dialect::Sqlite => SQLITE_UUID_DEFAULT,
    }
}

/// Server-side "current time" default.
pub fn now_sql(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Postgres => "CURRENT_TIMESTAMP",
        Dialect::Sqlite => SQLITE_NOW,
    }
}

pub fn uuid_default_expr(dialect: Dialect) -> Expr {
    Expr::cust(uuid_default_sql(dialect))
}

pub fn now_expr(dialect: Dialect) -> Expr {
    Expr::cust(now_sql(dialect))
}

/// Client-side identifier default, usable before any round-trip.
pub fn client_uuid_default() -> Id {
    Id::new()
}

/// Client-side "current time" default.
pub fn client_now() -> Instant {
    Instant::now()
}

#[cfg(test)]
mod tests {
    use super::{now_sql, uuid_default_sql};
    use crate::dialect::Dialect;

    #[test]
    fn postgres_defaults_use_native_functions() {
        assert_eq!(uuid_default_sql(Dialect::Postgres), "(GEN_RANDOM_UUID())");
        assert_eq!(now_sql(Dialect::Postgres), "CURRENT_TIMESTAMP");
    }

    #[test]
    fn sqlite_uuid_default_is_version_four_shaped() {
        let sql = uuid_default_sql(Dialect::Sqlite);
        assert!(sql.contains("randomblob(4)"));
        assert!(sql.contains("'-4'"));
        assert!(sql.contains("substr('89ab'"));
        assert!(sql.contains("randomblob(6)"));
    }

    #[test]
    fn sqlite_now_pads_to_six_fractional_digits() {
        assert_eq!(
            now_sql(Dialect::Sqlite),
            "strftime('%Y-%m-%d %H:%M:%f000+00:00', 'now')"
        );
    }
}
