//! Conditional gates on stages and steps

use crate::helpers::*;
use shipline::action::ActionRegistry;
use shipline::core::{secret::StaticSecretStore, EventKind, ExecutionStatus, PipelineRun, StageResult};
use shipline::execution::ExecutionEvent;

const RELEASE_TAGS: &str = r#"
name: "gated"
variables:
  channel: "stable"
stages:
  - id: "test"
    steps:
      - name: "unit"
        uses: "test/ok"
  - id: "nightly"
    if: "vars.channel == 'nightly'"
    steps:
      - name: "publish"
        uses: "test/ok"
  - id: "release"
    if: "startsWith(run.branch, 'release/') || run.branch == 'main'"
    steps:
      - name: "announce"
        uses: "test/ok"
        with:
          message: "{{ run.branch }}"
      - name: "hotfix-note"
        uses: "test/ok"
        if: "contains(run.branch, 'hotfix')"
  - id: "report"
    if: "stages.nightly.result == 'skipped' && !(stages.test.result != 'succeeded')"
    steps:
      - name: "summary"
        uses: "test/ok"
"#;

fn registry(action: &RecordingAction) -> ActionRegistry {
    ActionRegistry::new().register("test/ok", action.clone())
}

#[tokio::test]
async fn test_stage_gates_follow_run_and_variables() {
    let action = RecordingAction::succeeding();
    let mut pipeline = pipeline_from_yaml(RELEASE_TAGS);
    let run = PipelineRun::new(EventKind::Push, "release/2.1", "abc");

    let result = run_pipeline(&mut pipeline, &run, registry(&action), StaticSecretStore::new())
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.stage_result("test"), StageResult::Succeeded);
    assert_eq!(result.stage_result("nightly"), StageResult::Skipped);
    assert_eq!(result.stage_result("release"), StageResult::Succeeded);
    assert_eq!(result.stage_result("report"), StageResult::Succeeded);

    assert_step_succeeded(&result, "release", "announce", "announce done with release/2.1");
    assert_step_skipped(&result, "release", "hotfix-note");
    assert_eq!(result.started_stages(), vec!["test", "release", "report"]);
}

#[tokio::test]
async fn test_skipped_stage_reports_its_condition() {
    let action = RecordingAction::succeeding();
    let mut pipeline = pipeline_from_yaml(RELEASE_TAGS);
    let run = PipelineRun::new(EventKind::Push, "feature/x", "abc");

    let result = run_pipeline(&mut pipeline, &run, registry(&action), StaticSecretStore::new())
        .await
        .unwrap();

    assert_eq!(result.stage_result("release"), StageResult::Skipped);
    assert!(result.events.iter().any(|e| matches!(
        e,
        ExecutionEvent::StageSkipped { stage_id, reason }
            if stage_id == "release" && reason.contains("is false")
    )));
    // test, report
    assert_eq!(action.count(), 2);
}

#[tokio::test]
async fn test_variable_override_opens_gate() {
    let action = RecordingAction::succeeding();
    let mut pipeline = pipeline_from_yaml(RELEASE_TAGS);
    pipeline
        .variables
        .insert("channel".to_string(), "nightly".to_string());
    let run = PipelineRun::new(EventKind::Push, "hotfix/db", "abc");

    let result = run_pipeline(&mut pipeline, &run, registry(&action), StaticSecretStore::new())
        .await
        .unwrap();

    assert_eq!(result.stage_result("nightly"), StageResult::Succeeded);
    assert_eq!(result.stage_result("release"), StageResult::Skipped);
    assert_eq!(result.stage_result("report"), StageResult::Skipped);
}

#[tokio::test]
async fn test_readme_sync_only_on_main_push() {
    let yaml = r#"
name: "docs"
on:
  push: {}
  pull_request: {}
stages:
  - id: "docs"
    if: "run.ref == 'refs/heads/main' && run.event == 'push'"
    steps:
      - name: "readme"
        uses: "test/ok"
"#;
    let cases = [
        (EventKind::Push, "main", true),
        (EventKind::Push, "develop", false),
        (EventKind::PullRequest, "main", false),
    ];

    for (event, branch, syncs) in cases {
        let action = RecordingAction::succeeding();
        let mut pipeline = pipeline_from_yaml(yaml);
        let run = PipelineRun::new(event, branch, "abc");

        let result = run_pipeline(&mut pipeline, &run, registry(&action), StaticSecretStore::new())
            .await
            .unwrap();

        assert_eq!(result.status, ExecutionStatus::Completed);
        assert_eq!(
            action.count(),
            usize::from(syncs),
            "{} on {} should sync: {}",
            event,
            branch,
            syncs
        );
    }
}
