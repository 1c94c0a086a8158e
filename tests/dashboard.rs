//! End-to-end flows over the public API with a scripted backend.

use std::sync::Arc;

use serde_json::json;

use txdash::catalog;
use txdash::chart::{aggregate, Aggregation, ChartConfig, ChartType, ChartView};
use txdash::export::{self, DatasetKind, ExportFormat, ExportRequest};
use txdash::fetch::{ChartFetcher, FetchRequest, Fetcher, Outcome};
use txdash::filters::{DateRange, SessionContext};
use txdash::pagination::{InfiniteTransactions, PageParams, TRANSACTION_HISTORY};
use txdash::record::record;
use txdash::render::{frame, render_text, ChartFrame};
use txdash::storage::StateStore;
use txdash::transport::mock::MockTransport;

const BASE: &str = "http://backend";

fn july(session: Option<&str>) -> SessionContext {
    SessionContext::new(
        session.map(str::to_string),
        DateRange::parse(Some("2025-07-01"), Some("2025-07-31")).unwrap(),
    )
}

#[tokio::test]
async fn catalog_source_through_aggregate_and_render() {
    let mock = Arc::new(MockTransport::new());
    mock.success(
        "/api/analysis/transactions/info",
        json!([
            {"name": "Jan", "income": 100, "expense": 40},
            {"name": "Feb", "income": 80, "expense": 90},
            {"name": "Jan", "income": 20, "expense": 10}
        ]),
    );
    let source = catalog::lookup("monthly").unwrap();
    let ctx = july(Some("s1"));
    let params = ctx.ready_params(None).map(|p| source.params(p));
    let chart = ChartFetcher::new(Fetcher::new(mock.clone(), BASE), source.boxed_transform());

    let outcome = chart.fetch(&FetchRequest::when_ready(source.endpoint, params, 0)).await;
    assert_eq!(outcome, Outcome::Applied);
    assert!(mock.calls()[0].url.ends_with("&intervalType=monthly"));

    let rows = aggregate(&chart.state().data.unwrap(), &source.default_config());
    assert_eq!(rows, vec![
        record(&[("month", json!("Jan")), ("income", json!(120))]),
        record(&[("month", json!("Feb")), ("income", json!(80))]),
    ]);

    let text = render_text(&frame(&rows, &source.default_config()));
    assert!(text.starts_with("income\n"));
    assert!(text.contains("Jan"));
}

#[tokio::test]
async fn unready_session_never_reaches_the_backend() {
    let mock = Arc::new(MockTransport::new());
    let fetcher = Fetcher::new(mock.clone(), BASE);
    let ctx = july(None);
    let request = FetchRequest::when_ready("/api/analysis/all-category-info", ctx.ready_params(None), 0);
    assert_eq!(fetcher.sync(&request).await, Outcome::Skipped);
    assert!(mock.calls().is_empty());
    assert!(!fetcher.state().is_loading);
}

#[test]
fn chart_view_recomputes_only_on_change() {
    let records = vec![
        record(&[("c", json!("a")), ("v", json!(1))]),
        record(&[("c", json!("b")), ("v", json!(2))]),
    ];
    let mut config = ChartConfig::new(ChartType::Pie, "c", "v", Aggregation::Sum);
    let mut view = ChartView::new();
    view.update(&records, &config);
    view.update(&records, &config);
    assert_eq!(view.recomputes(), 1);

    config.aggregation = Aggregation::Count;
    let rows = view.update(&records, &config).to_vec();
    assert_eq!(view.recomputes(), 2);
    assert_eq!(rows[1]["v"], json!(1));

    match frame(&rows, &config) {
        ChartFrame::Pie { slices } => assert!((slices[0].share - 0.5).abs() < 1e-9),
        other => panic!("expected pie, got {:?}", other),
    }
}

#[tokio::test]
async fn history_pages_through_to_the_end() {
    let mock = Arc::new(MockTransport::new());
    let tx = |amount: i64| json!({"timestamp": "2025-07-02T09:00:00", "amount": amount});
    mock.success(TRANSACTION_HISTORY, json!({"transactions": [tx(1), tx(2)], "nextSearchAfter": [2]}))
        .success(TRANSACTION_HISTORY, json!({"transactions": [tx(3)], "nextSearchAfter": null}));

    let pager = InfiniteTransactions::new(mock.clone(), BASE);
    pager
        .set_params(PageParams { context: july(Some("s1")), user_id: Some(4), refresh: 0 })
        .await;
    while pager.state().has_more {
        pager.load_more().await;
    }
    let amounts: Vec<f64> = pager.state().transactions.iter().map(|t| t.amount).collect();
    assert_eq!(amounts, vec![1.0, 2.0, 3.0]);
    assert_eq!(mock.call_count(TRANSACTION_HISTORY), 2);
}

#[tokio::test]
async fn session_and_export_log_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("state.sqlite");
    let db = db.to_string_lossy();

    {
        let mut store = StateStore::new(&db).unwrap();
        store.set_session_id("sess-42").unwrap();
    }

    let mut store = StateStore::new(&db).unwrap();
    let ctx = SessionContext::new(
        store.session_id().unwrap(),
        DateRange::parse(Some("2025-07-01"), Some("2025-07-31")).unwrap(),
    );
    assert_eq!(ctx.session_id.as_deref(), Some("sess-42"));

    let mock = MockTransport::new();
    mock.respond(export::EXPORT, txdash::transport::RawResponse::new(200, "[]"));
    let columns = vec!["user_id".to_string(), "balance_after".to_string()];
    let req = ExportRequest::build(&ctx, DatasetKind::Custom, ExportFormat::Json, &columns).unwrap();
    assert_eq!(req.columns, vec!["userId", "balanceAfter"]);

    let bytes = export::download(&mock, BASE, &req).await.unwrap();
    let out = dir.path().join("out");
    let path = export::save(&out, DatasetKind::Custom, ExportFormat::Json, &bytes, Some(&mut store)).unwrap();
    assert!(path.ends_with("transactions_custom.json"));

    drop(store);
    let store = StateStore::new(&db).unwrap();
    assert_eq!(store.exports().unwrap().len(), 1);
}
