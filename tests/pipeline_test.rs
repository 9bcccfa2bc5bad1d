mod common;

use askdata::classifier::QueryClassification;
use askdata::llm::ReplayCompletion;
use askdata::resolver::ResolutionOutcome;
use askdata::response::{AssistantResponse, SectionKind};
use askdata::store::DirectoryStore;
use askdata::{AssistantConfig, Pipeline};
use common::{fenced, fixture_store, with_payroll, FlakyStore};
use serde_json::json;
use std::sync::Arc;

fn config() -> AssistantConfig {
    AssistantConfig::default()
}

#[tokio::test]
async fn test_chart_query_end_to_end() {
    let replay = Arc::new(ReplayCompletion::new([fenced(
        "SELECT channel, SUM(revenue) AS total FROM df GROUP BY channel ORDER BY total DESC",
    )]));
    let pipeline = Pipeline::new(&config(), Arc::new(fixture_store()), replay.clone());

    let run = pipeline.run("plot revenue by channel").await;

    let AssistantResponse::Chart(answer) = &run.response else {
        panic!("expected a chart, got {:?}", run.response);
    };
    assert_eq!(answer.collection, "sales");
    assert!(!answer.degraded);
    assert_eq!(answer.rows.len(), 3);
    assert_eq!(answer.rows[0]["channel"], json!("web"));
    assert_eq!(answer.rows[0]["total"], json!(160.0));

    // Validation, classification and resolution were all deterministic
    assert_eq!(replay.call_count(), 1);
    assert!(replay.prompts()[0].contains("plot revenue by channel"));
    assert_eq!(run.diagnostics.classification, Some(QueryClassification::Chart));
    assert_eq!(run.diagnostics.attempts, vec![vec![askdata::execution_loop::SynthesisAttempt {
        code: "SELECT channel, SUM(revenue) AS total FROM df GROUP BY channel ORDER BY total DESC".to_string(),
        attempt_index: 0,
        error: None,
    }]]);
}

#[tokio::test]
async fn test_exhausted_retries_return_untouched_collection() {
    let mut config = config();
    config.synthesis.max_retries = 2;
    let replay = Arc::new(ReplayCompletion::new([
        fenced("SELECT revnue FROM df"),
        fenced("SELECT revnu FROM df"),
        fenced("SELECT rev FROM df"),
    ]));
    let pipeline = Pipeline::new(&config, Arc::new(fixture_store()), replay.clone());

    let run = pipeline.run("plot revenue by channel").await;

    let answer = run.response.answer().expect("degraded answer");
    assert!(answer.degraded);
    assert_eq!(answer.rows.len(), 4);
    assert_eq!(answer.columns, vec!["ad_spend", "channel", "day", "revenue"]);
    assert_eq!(answer.rows[1]["channel"], json!("store"));
    assert_eq!(answer.rows[1]["revenue"], json!(40.0));

    let attempts = &run.diagnostics.attempts[0];
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.error.is_some()));
    assert_eq!(replay.call_count(), 3);

    // Generated code and raw errors stay out of the envelope
    let envelope = serde_json::to_string(&run.response).unwrap();
    assert!(!envelope.contains("revnue"));
}

#[tokio::test]
async fn test_greeting_rejected_without_completion_call() {
    let replay = Arc::new(ReplayCompletion::new(Vec::<String>::new()));
    let pipeline = Pipeline::new(&config(), Arc::new(fixture_store()), replay.clone());

    let run = pipeline.run("hi").await;

    match &run.response {
        AssistantResponse::Error { message } => assert!(message.contains("greeting")),
        other => panic!("expected an error, got {:?}", other),
    }
    assert_eq!(replay.call_count(), 0);
    assert_eq!(run.diagnostics.classification, None);
}

#[tokio::test]
async fn test_unclassifiable_query_maps_to_error_envelope() {
    // Validator fast-accepts ("revenue"), vote is empty, completion says "error"
    let replay = Arc::new(ReplayCompletion::new(["error"]));
    let pipeline = Pipeline::new(&config(), Arc::new(fixture_store()), replay.clone());

    let run = pipeline.run("revenue of the moon").await;

    assert_eq!(
        run.response,
        AssistantResponse::error("could not understand request")
    );
    assert_eq!(replay.call_count(), 1);
}

#[tokio::test]
async fn test_restricted_collection_is_never_offered() {
    let mut config = config();
    config.restricted_collections = vec!["payroll".to_string()];
    let replay = Arc::new(ReplayCompletion::new([
        "collection: payroll\nreason: it has salaries\nmatching_fields: salary",
    ]));
    let pipeline = Pipeline::new(&config, Arc::new(with_payroll(fixture_store())), replay.clone());

    let run = pipeline.run("describe purple elephants").await;

    assert_eq!(run.response, AssistantResponse::error("no matching collection found"));
    assert!(!replay.prompts()[0].contains("payroll"));
    match &run.diagnostics.resolutions[0] {
        ResolutionOutcome::Failed {
            candidates_considered,
            ..
        } => {
            assert_eq!(candidates_considered, &vec!["marketing", "sales", "users"]);
        }
        other => panic!("expected failure, got {:?}", other),
    }
}

#[tokio::test]
async fn test_report_survives_partial_failure() {
    let mut config = config();
    config.restricted_collections = vec!["payroll".to_string()];
    let replay = Arc::new(ReplayCompletion::new([
        "chart: revenue by channel | sales\n\
         chart: Revenue by channel | sales\n\
         description: salaries by channel | payroll\n\
         description: who are the admins | users\n\
         chart: clicks | nowhere"
            .to_string(),
        fenced("SELECT channel, SUM(revenue) AS total FROM df GROUP BY channel ORDER BY total DESC"),
    ]));
    let store = FlakyStore::new(with_payroll(fixture_store()), "users");
    let pipeline = Pipeline::new(&config, Arc::new(store), replay.clone());

    let run = pipeline.run("give me a full report on the business").await;

    let AssistantResponse::Report { sections } = &run.response else {
        panic!("expected a report, got {:?}", run.response);
    };
    assert_eq!(sections.len(), 2);

    assert_eq!(sections[0].kind, SectionKind::Chart);
    assert_eq!(sections[0].collection, "sales");
    assert_eq!(sections[0].answer.as_ref().unwrap().rows.len(), 3);

    assert_eq!(sections[1].kind, SectionKind::Description);
    assert_eq!(sections[1].collection, "users");
    assert!(sections[1].answer.is_none());
    assert_eq!(sections[1].error.as_deref(), Some("the data store is unavailable"));

    assert!(!replay.prompts()[0].contains("payroll"));
    assert_eq!(replay.call_count(), 2);
    assert_eq!(run.diagnostics.resolutions.len(), 2);
}

#[tokio::test]
async fn test_unusable_decomposition_is_an_error() {
    let replay = Arc::new(ReplayCompletion::new(["Sure, here is a great report!"]));
    let pipeline = Pipeline::new(&config(), Arc::new(fixture_store()), replay.clone());

    let run = pipeline.run("full report please").await;

    assert_eq!(
        run.response,
        AssistantResponse::error("could not break the report into sub-queries")
    );
}

#[tokio::test]
async fn test_directory_store_csv_collection() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("orders.csv"),
        "region,amount\nnorth,10\nsouth,25\nnorth,5\n",
    )
    .unwrap();
    let replay = Arc::new(ReplayCompletion::new([fenced(
        "SELECT region, SUM(amount) AS amount_total FROM df GROUP BY region ORDER BY region",
    )]));
    let pipeline = Pipeline::new(&config(), Arc::new(DirectoryStore::new(dir.path())), replay);

    let run = pipeline.run("list total amount per region").await;

    let answer = run.response.answer().expect("answer");
    assert_eq!(answer.collection, "orders");
    assert_eq!(
        answer.rows,
        vec![
            json!({"region": "north", "amount_total": 15.0}),
            json!({"region": "south", "amount_total": 25.0}),
        ]
    );
}
