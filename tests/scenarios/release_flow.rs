//! End-to-end runs of the docker release pipeline

use crate::helpers::*;
use mockito::Matcher;
use shipline::core::{EventKind, ExecutionStatus, PipelineRun, StageResult};
use shipline::execution::plan;
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

fn readme_file() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "# acme/app").unwrap();
    file
}

fn release_pipeline(readme: &NamedTempFile) -> shipline::Pipeline {
    let mut pipeline = pipeline_from_yaml(RELEASE_YAML);
    pipeline.variables.insert(
        "readme".to_string(),
        readme.path().to_string_lossy().to_string(),
    );
    pipeline
}

#[tokio::test]
async fn test_push_to_main_builds_publishes_and_deploys() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/deploy")
        .match_body(Matcher::UrlEncoded("secret".into(), "shared-s3cr3t".into()))
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    let readme = readme_file();
    let mut pipeline = release_pipeline(&readme);
    let runner = Arc::new(RecordingRunner::new());
    let run = PipelineRun::new(EventKind::Push, "main", "4f2a9c1");

    let result = run_pipeline(
        &mut pipeline,
        &run,
        builtin_registry(runner.clone()),
        release_secrets(&format!("{}/deploy", server.url())),
    )
    .await
    .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.started_stages(), vec!["build", "deploy"]);

    // Login goes first and keeps the password off the command line
    let logins = runner.commands("login");
    assert_eq!(logins.len(), 1);
    assert!(logins[0].args.contains(&"release-bot".to_string()));
    assert_eq!(logins[0].stdin.as_deref(), Some("hunter2-registry"));
    assert!(!logins[0].command_line().contains("hunter2-registry"));

    let builds = runner.commands("buildx");
    assert_eq!(builds.len(), 1);
    let build = builds[0].command_line();
    assert!(build.contains("--push"), "push build should publish: {}", build);
    assert!(build.contains("--platform linux/amd64,linux/arm64"));
    assert!(build.contains("--tag acme/app:latest"));
    assert!(build.contains("org.opencontainers.image.revision=4f2a9c1"));
    assert!(build.contains("--cache-to type=registry,ref=acme/app:buildcache,mode=max"));

    let syncs = runner.commands("pushrm");
    assert_eq!(syncs.len(), 1);
    assert!(syncs[0].args.contains(&"acme/app".to_string()));

    assert_step_succeeded(&result, "deploy", "webhook", "Webhook returned 200");
    hook.assert_async().await;
}

#[tokio::test]
async fn test_pull_request_builds_without_publishing() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/deploy")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let readme = readme_file();
    let mut pipeline = release_pipeline(&readme);
    let runner = Arc::new(RecordingRunner::new());
    let run = PipelineRun::new(EventKind::PullRequest, "main", "4f2a9c1");

    let result = run_pipeline(
        &mut pipeline,
        &run,
        builtin_registry(runner.clone()),
        release_secrets(&format!("{}/deploy", server.url())),
    )
    .await
    .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.stage_result("build"), StageResult::Succeeded);
    assert_eq!(result.stage_result("deploy"), StageResult::Skipped);

    assert_step_skipped(&result, "build", "login");
    assert!(runner.commands("login").is_empty());

    let builds = runner.commands("buildx");
    assert_eq!(builds.len(), 1);
    assert!(!builds[0].args.contains(&"--push".to_string()));
    assert!(
        !builds[0].args.contains(&"--cache-to".to_string()),
        "pull request build must not export cache: {}",
        builds[0].command_line()
    );
    assert!(builds[0].args.contains(&"--cache-from".to_string()));
    assert_step_succeeded(&result, "build", "image", "Built acme/app:latest");

    assert!(runner.commands("pushrm").is_empty());
    assert_step_skipped(&result, "deploy", "readme");
    assert_step_skipped(&result, "deploy", "webhook");
    hook.assert_async().await;
}

#[tokio::test]
async fn test_pull_request_reporting_main_ref_still_never_deploys() {
    let readme = readme_file();
    let mut pipeline = release_pipeline(&readme);
    let runner = Arc::new(RecordingRunner::new());
    let run = PipelineRun::from_ref(EventKind::PullRequest, "refs/heads/main", "4f2a9c1");

    let result = run_pipeline(
        &mut pipeline,
        &run,
        builtin_registry(runner.clone()),
        release_secrets("http://127.0.0.1:9/unreachable"),
    )
    .await
    .unwrap();

    assert_eq!(result.stage_result("deploy"), StageResult::Skipped);
    assert!(runner.commands("pushrm").is_empty());
    assert!(runner
        .commands("buildx")
        .iter()
        .all(|spec| !spec.args.contains(&"--push".to_string())));
}

#[tokio::test]
async fn test_push_to_other_branch_is_not_triggered() {
    let readme = readme_file();
    let mut pipeline = release_pipeline(&readme);
    let runner = Arc::new(RecordingRunner::new());
    let run = PipelineRun::new(EventKind::Push, "feature/login", "4f2a9c1");

    let result = run_pipeline(
        &mut pipeline,
        &run,
        builtin_registry(runner.clone()),
        release_secrets("http://127.0.0.1:9/unreachable"),
    )
    .await
    .unwrap();

    assert_eq!(result.status, ExecutionStatus::Skipped);
    assert!(runner.calls().is_empty());
    assert!(result.started_stages().is_empty());
    assert_eq!(result.stage_result("build"), StageResult::Skipped);
    assert_eq!(result.stage_result("deploy"), StageResult::Skipped);
}

#[tokio::test]
async fn test_plan_matches_execution() {
    let readme = readme_file();

    for run in [
        PipelineRun::new(EventKind::Push, "main", "4f2a9c1"),
        PipelineRun::new(EventKind::PullRequest, "main", "4f2a9c1"),
        PipelineRun::new(EventKind::Push, "develop", "4f2a9c1"),
    ] {
        let mut pipeline = release_pipeline(&readme);
        let expected = plan(&pipeline, &run);

        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/deploy").with_status(204).create_async().await;

        let result = run_pipeline(
            &mut pipeline,
            &run,
            builtin_registry(Arc::new(RecordingRunner::new())),
            release_secrets(&format!("{}/deploy", server.url())),
        )
        .await
        .unwrap();

        for stage in &expected.stages {
            let actual = result.stage_result(&stage.id);
            assert_eq!(
                stage.runs,
                actual == StageResult::Succeeded,
                "plan for {} on {} disagrees on stage '{}': {:?}",
                run.event(),
                run.branch(),
                stage.id,
                actual
            );
            for step in &stage.steps {
                let skipped = matches!(
                    result.step_state(&stage.id, &step.name),
                    shipline::core::StepState::Skipped { .. }
                );
                assert_eq!(step.runs, !skipped, "step {}/{}", stage.id, step.name);
            }
        }
    }
}
