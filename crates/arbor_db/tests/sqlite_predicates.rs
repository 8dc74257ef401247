//! Runs the per-dialect predicate renderings against a live sqlite engine
//! and checks them against the pure reference evaluation.

use sea_orm::sea_query::{Alias, Expr, Func, Query};
use serde_json::{Value as Json, json};

use arbor_db::adapters::read_document;
use arbor_db::predicate::{contains, has_all_keys, has_any_key};
use arbor_db::{
    ArborResult, ColumnKind, ColumnSpec, ContextId, DocumentAdapter, Predicate, Registry,
    SchemaMetadata, Session, TableSpec,
};

fn metadata() -> SchemaMetadata {
    SchemaMetadata::new().table(
        TableSpec::with_base_columns("Artifact")
            .column(ColumnSpec::new("payload", ColumnKind::Json)),
    )
}

fn corpus() -> Vec<Json> {
    vec![
        json!({"a": 1, "b": [1, 2]}),
        json!({"color": "blue", "size": 5}),
        json!({"a": {"nested": true}}),
        json!([1, 2, 3]),
        json!(["alpha", "beta"]),
        json!({}),
        json!(5),
        json!([null, 1]),
        json!({"note": null, "ok": true}),
    ]
}

async fn seeded_session() -> ArborResult<Session> {
    let session = Registry::new(metadata())
        .session(ContextId::next(), "sqlite::memory:", None)
        .await?;
    let adapter = DocumentAdapter::<Json>::new();
    for doc in corpus() {
        let insert = Query::insert()
            .into_table(Alias::new("artifact"))
            .columns([Alias::new("payload")])
            .values_panic([adapter.encode_typed(session.dialect(), &doc)?.into()])
            .to_owned();
        session.execute(&insert).await?;
    }
    Ok(session)
}

async fn select_matching(session: &Session, predicate: &Predicate) -> ArborResult<Vec<Json>> {
    let select = Query::select()
        .column(Alias::new("payload"))
        .from(Alias::new("artifact"))
        .and_where(predicate.compile(session.dialect(), Expr::col(Alias::new("payload"))))
        .to_owned();
    let rows = session.query_all(&select).await?;
    let mut docs = Vec::with_capacity(rows.len());
    for row in &rows {
        docs.push(read_document::<Json>(row, "payload")?.expect("seeded payload"));
    }
    Ok(docs)
}

fn sorted(mut docs: Vec<Json>) -> Vec<String> {
    let mut keys: Vec<String> = docs.drain(..).map(|doc| doc.to_string()).collect();
    keys.sort();
    keys
}

async fn assert_agrees(session: &Session, predicate: Predicate) -> ArborResult<()> {
    let expected: Vec<Json> = corpus()
        .into_iter()
        .filter(|doc| predicate.matches(doc))
        .collect();
    let actual = select_matching(session, &predicate).await?;
    assert_eq!(
        sorted(actual),
        sorted(expected),
        "divergence for {predicate:?}"
    );
    Ok(())
}

#[tokio::test]
async fn contains_matches_reference_evaluation() -> ArborResult<()> {
    let session = seeded_session().await?;
    assert_agrees(&session, contains(vec![json!(1)])).await?;
    assert_agrees(&session, contains(vec![json!("blue")])).await?;
    assert_agrees(&session, contains(vec![json!({"a": 1})])).await?;
    assert_agrees(&session, contains(vec![json!({"color": "blue", "size": 5})])).await?;
    assert_agrees(&session, contains(vec![json!({"a": {"nested": true}})])).await?;
    assert_agrees(&session, contains(vec![json!(1), json!(2)])).await?;
    assert_agrees(&session, contains(vec![json!(9)])).await?;
    assert_agrees(&session, contains(vec![json!(5)])).await?;
    assert_agrees(&session, contains(vec![json!(null)])).await?;
    assert_agrees(&session, contains(vec![json!({"note": null})])).await?;
    Ok(())
}

#[tokio::test]
async fn key_predicates_match_reference_evaluation() -> ArborResult<()> {
    let session = seeded_session().await?;
    assert_agrees(&session, has_any_key(vec![json!("a"), json!("color")])?).await?;
    assert_agrees(&session, has_any_key(vec![json!("alpha")])?).await?;
    assert_agrees(&session, has_any_key(vec![json!("missing")])?).await?;
    assert_agrees(&session, has_all_keys(vec![json!("a"), json!("b")])?).await?;
    assert_agrees(&session, has_all_keys(vec![json!("a"), json!("missing")])?).await?;
    assert_agrees(&session, has_all_keys(vec![json!("color"), json!("size")])?).await?;
    Ok(())
}

#[tokio::test]
async fn empty_sets_match_every_row() -> ArborResult<()> {
    let session = seeded_session().await?;
    let all = corpus().len();
    assert_eq!(select_matching(&session, &contains(Vec::new())).await?.len(), all);
    assert_eq!(
        select_matching(&session, &has_any_key(Vec::new())?).await?.len(),
        all
    );
    assert_eq!(
        select_matching(&session, &has_all_keys(Vec::new())?).await?.len(),
        all
    );
    Ok(())
}

#[tokio::test]
async fn predicates_compose_with_ordinary_filters() -> ArborResult<()> {
    let session = seeded_session().await?;
    let select = Query::select()
        .expr(Func::count(Expr::col(Alias::new("payload"))))
        .from(Alias::new("artifact"))
        .and_where(
            has_any_key(vec![json!("a")])?
                .compile(session.dialect(), Expr::col(Alias::new("payload"))),
        )
        .to_owned();
    let row = session.query_one(&select).await?.expect("count row");
    let count = row.try_get_by_index::<i64>(0).expect("count");
    assert_eq!(count, 2);
    Ok(())
}
