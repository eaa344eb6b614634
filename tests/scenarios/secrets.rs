//! Secret resolution and masking

use crate::helpers::*;
use shipline::action::ActionRegistry;
use shipline::core::{secret::StaticSecretStore, EventKind, PipelineRun, StageResult};
use shipline::persistence::{create_summary, InMemoryPersistence, PersistenceBackend};

const DEPLOY: &str = r#"
name: "secret-deploy"
secrets:
  - API_TOKEN
stages:
  - id: "deploy"
    steps:
      - name: "call"
        uses: "test/ok"
        env:
          TOKEN: "{{ secrets.API_TOKEN }}"
        with:
          message: "token is {{ secrets.API_TOKEN }}"
      - name: "after"
        uses: "test/ok"
"#;

fn push_to_main() -> PipelineRun {
    PipelineRun::new(EventKind::Push, "main", "4f2a9c1")
}

#[tokio::test]
async fn test_secret_reaches_action_but_not_output() {
    let action = RecordingAction::succeeding();
    let registry = ActionRegistry::new().register("test/ok", action.clone());
    let secrets = StaticSecretStore::new().with("API_TOKEN", "tok-9f8e7d");

    let mut pipeline = pipeline_from_yaml(DEPLOY);
    let result = run_pipeline(&mut pipeline, &push_to_main(), registry, secrets)
        .await
        .unwrap();

    let requests = action.requests();
    assert_eq!(requests[0].text("message"), Some("token is tok-9f8e7d"));
    assert_eq!(requests[0].env.get("TOKEN").map(String::as_str), Some("tok-9f8e7d"));

    assert_step_succeeded(&result, "deploy", "call", "call done with token is ***");
    assert!(!result.event_log().contains("tok-9f8e7d"));
    assert!(!format!("{:?}", result.pipeline).contains("tok-9f8e7d"));
}

#[tokio::test]
async fn test_missing_secret_fails_the_stage() {
    let action = RecordingAction::succeeding();
    let registry = ActionRegistry::new().register("test/ok", action.clone());

    let mut pipeline = pipeline_from_yaml(DEPLOY);
    let result = run_pipeline(&mut pipeline, &push_to_main(), registry, StaticSecretStore::new())
        .await
        .unwrap();

    assert_eq!(result.stage_result("deploy"), StageResult::Failed);
    assert_step_failed(&result, "deploy", "call", "API_TOKEN");
    assert_step_skipped(&result, "deploy", "after");
    assert_eq!(action.count(), 0);
}

#[tokio::test]
async fn test_saved_history_holds_no_secrets() {
    let action = RecordingAction::failing("rejected token tok-9f8e7d");
    let registry = ActionRegistry::new().register("test/ok", action);
    let secrets = StaticSecretStore::new().with("API_TOKEN", "tok-9f8e7d");

    let mut pipeline = pipeline_from_yaml(DEPLOY);
    let run = push_to_main();
    let result = run_pipeline(&mut pipeline, &run, registry, secrets).await.unwrap();

    assert_step_failed(&result, "deploy", "call", "rejected token ***");

    let store = InMemoryPersistence::new();
    let summary = create_summary(&result.pipeline, &run);
    store.save_run(&summary).await.unwrap();

    let loaded = store.load_run(summary.run_id).await.unwrap().unwrap();
    let json = serde_json::to_string(&loaded).unwrap();
    assert!(!json.contains("tok-9f8e7d"));
    assert_eq!(loaded.failed_stages, 1);
}
