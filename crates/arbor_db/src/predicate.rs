//! Boolean JSON predicates compiled per dialect. Postgres pushes the checks
//! down to its native jsonb operators; sqlite gets an equivalent rendering
//! over `json_each`. `matches` is the pure reference evaluation of the
//! shared boolean semantics; the documented containment edge cases where
//! the native operators disagree are listed in DESIGN.md.

use sea_orm::sea_query::{Alias, Expr, ExprTrait, Func, Query};
use serde_json::Value as Json;

use crate::dialect::Dialect;
use arbor_core::{ArborError, ArborResult};

#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    /// Every value must be contained in the document.
    Contains { values: Vec<Json> },
    /// At least one key must be present.
    HasAnyKey { keys: Vec<String> },
    /// All keys must be present.
    HasAllKeys { keys: Vec<String> },
}

pub fn contains(values: Vec<Json>) -> Predicate {
    Predicate::Contains { values }
}

pub fn has_any_key(keys: Vec<Json>) -> ArborResult<Predicate> {
    Ok(Predicate::HasAnyKey {
        keys: string_keys(keys)?,
    })
}

pub fn has_all_keys(keys: Vec<Json>) -> ArborResult<Predicate> {
    Ok(Predicate::HasAllKeys {
        keys: string_keys(keys)?,
    })
}

// Key-sets are validated when the predicate is constructed, before any SQL
// is compiled.
fn string_keys(keys: Vec<Json>) -> ArborResult<Vec<String>> {
    keys.into_iter()
        .map(|key| match key {
            Json::String(key) => Ok(key),
            other => Err(ArborError::validation(format!(
                "key-set values must be strings, got {other}"
            ))),
        })
        .collect()
}

impl Predicate {
    /// Renders the predicate against `expr`, the JSON column expression,
    /// for the given dialect. Empty value/key-sets compile to a
    /// vacuously-true predicate, never to invalid SQL.
    pub fn compile(&self, dialect: Dialect, expr: Expr) -> Expr {
        match self {
            Predicate::Contains { values } => compile_contains(dialect, expr, values),
            Predicate::HasAnyKey { keys } => compile_has_any_key(dialect, expr, keys),
            Predicate::HasAllKeys { keys } => compile_has_all_keys(dialect, expr, keys),
        }
    }

    /// Pure evaluation of the predicate against an in-memory document. The
    /// compiled SQL for either dialect agrees with this result.
    pub fn matches(&self, doc: &Json) -> bool {
        match self {
            Predicate::Contains { values } => values.iter().all(|value| contains_value(doc, value)),
            Predicate::HasAnyKey { keys } => {
                keys.is_empty() || keys.iter().any(|key| has_key(doc, key))
            }
            Predicate::HasAllKeys { keys } => keys.iter().all(|key| has_key(doc, key)),
        }
    }
}

fn has_key(doc: &Json, key: &str) -> bool {
    match doc {
        Json::Object(map) => map.contains_key(key),
        Json::Array(items) => items.iter().any(|item| item.as_str() == Some(key)),
        _ => false,
    }
}

fn contains_value(doc: &Json, value: &Json) -> bool {
    match doc {
        Json::Array(items) => items.iter().any(|item| item == value),
        Json::Object(map) => match value {
            Json::Object(entries) => entries
                .iter()
                .all(|(key, entry)| map.get(key) == Some(entry)),
            other => map.values().any(|item| item == other),
        },
        // scalar documents contain exactly themselves
        scalar => scalar == value,
    }
}

fn vacuously_true() -> Expr {
    Expr::value(true)
}

fn and_all(exprs: Vec<Expr>) -> Expr {
    let mut exprs = exprs.into_iter();
    let Some(first) = exprs.next() else {
        return vacuously_true();
    };
    exprs.fold(first, |acc, expr| acc.and(expr))
}

fn or_all(exprs: Vec<Expr>) -> Expr {
    let mut exprs = exprs.into_iter();
    let Some(first) = exprs.next() else {
        return vacuously_true();
    };
    exprs.fold(first, |acc, expr| acc.or(expr))
}

fn compile_contains(dialect: Dialect, expr: Expr, values: &[Json]) -> Expr {
    if values.is_empty() {
        return vacuously_true();
    }
    let parts = values
        .iter()
        .map(|value| match dialect {
            Dialect::Postgres => pg_contains_one(&expr, value),
            Dialect::Sqlite => sqlite_contains_one(&expr, value),
        })
        .collect();
    and_all(parts)
}

// the empty key-set is vacuously true on both dialects; postgres' native
// ?| would say false, so the short-circuit happens before any SQL is built
fn compile_has_any_key(dialect: Dialect, expr: Expr, keys: &[String]) -> Expr {
    if keys.is_empty() {
        return vacuously_true();
    }
    match dialect {
        Dialect::Postgres => or_all(keys.iter().map(|key| pg_key_exists(&expr, key)).collect()),
        Dialect::Sqlite => sqlite_key_membership(&expr, keys),
    }
}

fn compile_has_all_keys(dialect: Dialect, expr: Expr, keys: &[String]) -> Expr {
    if keys.is_empty() {
        return vacuously_true();
    }
    match dialect {
        Dialect::Postgres => and_all(keys.iter().map(|key| pg_key_exists(&expr, key)).collect()),
        Dialect::Sqlite => and_all(
            keys.iter()
                .map(|key| sqlite_key_membership(&expr, std::slice::from_ref(key)))
                .collect(),
        ),
    }
}

// function form of the ? operator; document columns are jsonb
fn pg_key_exists(expr: &Expr, key: &str) -> Expr {
    Func::cust(Alias::new("jsonb_exists"))
        .arg(expr.clone())
        .arg(Expr::val(key))
        .into()
}

// function form of @>, with the probe bound as a jsonb parameter
fn pg_contains_one(expr: &Expr, value: &Json) -> Expr {
    Func::cust(Alias::new("jsonb_contains"))
        .arg(expr.clone())
        .arg(Expr::val(value.clone()))
        .into()
}

fn json_each_exists(expr: &Expr, condition: Expr) -> Expr {
    let select = Query::select()
        .expr(Expr::val(1))
        .from_function(
            Func::cust(Alias::new("json_each")).arg(expr.clone()),
            Alias::new("json_each"),
        )
        .and_where(condition)
        .to_owned();
    Expr::exists(select)
}

fn json_each_value() -> Expr {
    Expr::col((Alias::new("json_each"), Alias::new("value")))
}

fn json_each_key() -> Expr {
    Expr::col((Alias::new("json_each"), Alias::new("key")))
}

fn json_each_type() -> Expr {
    Expr::col((Alias::new("json_each"), Alias::new("type")))
}

fn json_type_is(expr: &Expr, type_name: &str) -> Expr {
    let call: Expr = Func::cust(Alias::new("json_type")).arg(expr.clone()).into();
    call.eq(type_name)
}

// postgres key-existence looks at object keys, or string elements when the
// document is an array; json_each.key holds integer indices for arrays, so
// the two shapes branch on json_type
fn sqlite_key_membership(expr: &Expr, keys: &[String]) -> Expr {
    let object_branch = json_type_is(expr, "object").and(json_each_exists(
        expr,
        json_each_key().is_in(keys.iter().cloned()),
    ));
    let array_branch = json_type_is(expr, "array").and(json_each_exists(
        expr,
        json_each_value().is_in(keys.iter().cloned()),
    ));
    object_branch.or(array_branch)
}

fn sqlite_contains_one(expr: &Expr, value: &Json) -> Expr {
    match value {
        Json::Object(entries) if !entries.is_empty() => {
            // either the document is an array holding the object verbatim,
            // or it is an object carrying every entry of the probe
            let verbatim = json_each_exists(
                expr,
                json_each_value().eq(compact_dump(value)),
            );
            let entry_checks = entries
                .iter()
                .map(|(key, entry)| {
                    json_each_exists(
                        expr,
                        json_each_key().eq(key.as_str()).and(json_each_matches(entry)),
                    )
                })
                .collect();
            verbatim.or(and_all(entry_checks))
        }
        Json::Object(_) | Json::Array(_) => {
            json_each_exists(expr, json_each_value().eq(compact_dump(value)))
        }
        scalar => json_each_exists(expr, json_each_matches(scalar)),
    }
}

// SQL equality against NULL is never true, so null probes check the
// json_each type column instead of the value column
fn json_each_matches(value: &Json) -> Expr {
    match value {
        Json::Null => json_each_type().eq("null"),
        other => json_each_value().eq(sqlite_comparable(other)),
    }
}

// sqlite stores JSON as whitespace-stripped text, so non-scalar equality
// must compare against the separator-normalized dump
fn compact_dump(value: &Json) -> String {
    value.to_string()
}

fn sqlite_comparable(value: &Json) -> sea_orm::sea_query::Value {
    match value {
        Json::Bool(value) => (*value).into(),
        Json::Number(value) => {
            if let Some(value) = value.as_i64() {
                value.into()
            } else {
                value.as_f64().unwrap_or_default().into()
            }
        }
        Json::String(value) => value.clone().into(),
        nested => compact_dump(nested).into(),
    }
}
