//! Failure propagation: fail-fast steps and dependents of failed stages

use crate::helpers::*;
use shipline::action::ActionRegistry;
use shipline::core::{secret::StaticSecretStore, EventKind, ExecutionStatus, PipelineRun, StageResult};
use shipline::execution::{ExecutionError, ExecutionEvent};
use std::sync::Arc;

fn push_to_main() -> PipelineRun {
    PipelineRun::new(EventKind::Push, "main", "4f2a9c1")
}

#[tokio::test]
async fn test_failed_build_never_deploys() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/deploy")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let mut pipeline = pipeline_from_yaml(RELEASE_YAML);
    let runner = Arc::new(RecordingRunner::failing_on("buildx"));

    let result = run_pipeline(
        &mut pipeline,
        &push_to_main(),
        builtin_registry(runner.clone()),
        release_secrets(&format!("{}/deploy", server.url())),
    )
    .await
    .unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.stage_result("build"), StageResult::Failed);
    assert_eq!(result.stage_result("deploy"), StageResult::Skipped);
    assert_step_failed(&result, "build", "image", "simulated failure in buildx");

    assert!(runner.commands("pushrm").is_empty());
    assert!(result.events.iter().any(|e| matches!(
        e,
        ExecutionEvent::StageSkipped { stage_id, reason }
            if stage_id == "deploy" && reason.contains("needs `build` which failed")
    )));
    hook.assert_async().await;
}

#[tokio::test]
async fn test_failed_login_skips_rest_of_stage() {
    let mut pipeline = pipeline_from_yaml(RELEASE_YAML);
    let runner = Arc::new(RecordingRunner::failing_on("login"));

    let result = run_pipeline(
        &mut pipeline,
        &push_to_main(),
        builtin_registry(runner.clone()),
        release_secrets("http://127.0.0.1:9/unreachable"),
    )
    .await
    .unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_step_failed(&result, "build", "login", "exited with code 1");
    assert_step_skipped(&result, "build", "image");
    assert!(runner.commands("buildx").is_empty());
    assert_eq!(runner.calls().len(), 1);
}

#[tokio::test]
async fn test_independent_stages_continue_after_failure() {
    let yaml = r#"
name: "fan-out"
stages:
  - id: "lint"
    steps:
      - name: "check"
        uses: "test/fail"
  - id: "package"
    steps:
      - name: "bundle"
        uses: "test/ok"
        with:
          message: "bundled"
  - id: "release"
    needs: ["lint", "package"]
    steps:
      - name: "publish"
        uses: "test/ok"
"#;
    let ok = RecordingAction::succeeding();
    let fail = RecordingAction::failing("lint errors found");
    let registry = ActionRegistry::new()
        .register("test/ok", ok.clone())
        .register("test/fail", fail.clone());

    let mut pipeline = pipeline_from_yaml(yaml);
    let result = run_pipeline(&mut pipeline, &push_to_main(), registry, StaticSecretStore::new())
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.stage_result("lint"), StageResult::Failed);
    assert_eq!(result.stage_result("package"), StageResult::Succeeded);
    assert_eq!(result.stage_result("release"), StageResult::Skipped);

    assert_step_failed(&result, "lint", "check", "lint errors found");
    assert_step_succeeded(&result, "package", "bundle", "bundle done with bundled");
    assert_step_skipped(&result, "release", "publish");

    assert_eq!(fail.count(), 1);
    assert_eq!(ok.count(), 1);
}

#[tokio::test]
async fn test_unknown_capability_rejected_before_anything_runs() {
    let yaml = r#"
name: "typo"
stages:
  - id: "build"
    steps:
      - name: "first"
        uses: "test/ok"
      - name: "second"
        uses: "image/biuld"
"#;
    let ok = RecordingAction::succeeding();
    let registry = ActionRegistry::new().register("test/ok", ok.clone());

    let mut pipeline = pipeline_from_yaml(yaml);
    let err = run_pipeline(&mut pipeline, &push_to_main(), registry, StaticSecretStore::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::UnknownCapability { ref capability, .. } if capability == "image/biuld"
    ));
    assert_eq!(ok.count(), 0);
    assert_eq!(
        pipeline.stage("build").unwrap().state.result(),
        StageResult::Pending
    );
}
