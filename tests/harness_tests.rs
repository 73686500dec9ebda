mod common;

use common::*;
use workflow_harness::prelude::*;
use workflow_harness::EntityKind;

#[tokio::test]
async fn test_without_overrides_cleanup_reports_the_real_greeting() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "outputs.yml", outputs_workflow());

    let results = harness_for(dir.path(), "outputs.yml")
        .plan()
        .await
        .unwrap()
        .execute()
        .await
        .unwrap();

    let main = results.job("main").unwrap();
    assert!(main.succeeded());
    assert_eq!(main.outputs().get("greeting"), Some(&"Hello".to_string()));
    assert_eq!(
        main.step("Run a one-line script").unwrap().logs(),
        "Hello, world!"
    );

    let cleanup = results.job("cleanup").unwrap();
    assert!(cleanup.failed());
    assert_eq!(
        cleanup.step("Clean up").unwrap().logs(),
        "The output from the main job was Hello"
    );
    assert!(results.execution_error().is_some());
}

#[tokio::test]
async fn test_forced_output_reaches_dependent_job() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "outputs.yml", outputs_workflow());

    let mut run = harness_for(dir.path(), "outputs.yml").plan().await.unwrap();
    run.job("main").unwrap().set_output("greeting", "Goodbye!");
    let results = run.execute().await.unwrap();

    let step = results.job("cleanup").unwrap().step("Clean up").unwrap();
    assert_eq!(step.logs(), "The output from the main job was Goodbye!");
    assert!(step.failed());
}

#[tokio::test]
async fn test_skipping_main_still_runs_cleanup() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "outputs.yml", outputs_workflow());

    let mut run = harness_for(dir.path(), "outputs.yml").plan().await.unwrap();
    run.job("main").unwrap().set_result(RunResult::Skipped);
    let results = run.execute().await.unwrap();

    let main = results.job("main").unwrap();
    assert!(main.skipped());
    assert!(main.record().steps.is_empty());
    assert!(results.job("cleanup").unwrap().failed());
}

#[tokio::test]
async fn test_forced_step_results_are_not_executed() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "outputs.yml", outputs_workflow());

    let mut run = harness_for(dir.path(), "outputs.yml").plan().await.unwrap();
    run.job("cleanup")
        .unwrap()
        .set_step_results(RunResult::Failure, |_| true)
        .set_step_results(RunResult::Success, |step| step.name() == "Clean up");
    let results = run.execute().await.unwrap();

    let cleanup = results.job("cleanup").unwrap();
    let step = cleanup.step("Clean up").unwrap();
    assert!(step.succeeded());
    assert_eq!(step.logs(), "");
    assert!(cleanup.succeeded());
}

#[tokio::test]
async fn test_step_overrides() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "outputs.yml", outputs_workflow());

    let mut run = harness_for(dir.path(), "outputs.yml").plan().await.unwrap();
    run.job("main")
        .unwrap()
        .step("greet")
        .unwrap()
        .skip()
        .set_output("greeting", "Hi")
        .set_outputs([("extra", "1")])
        .job()
        .step("Run a one-line script")
        .unwrap()
        .mark_skipped();
    let results = run.execute().await.unwrap();

    let main = results.job("main").unwrap();
    assert!(main.step("Run a one-line script").unwrap().skipped());
    let greet = main.step("greet").unwrap();
    assert!(greet.succeeded());
    assert_eq!(greet.outputs().get("greeting"), Some(&"Hi".to_string()));
    assert_eq!(greet.outputs().get("extra"), Some(&"1".to_string()));
    assert_eq!(main.outputs().get("greeting"), Some(&"Hi".to_string()));
    assert_eq!(main.logs(), "");
}

#[tokio::test]
async fn test_job_lookup_is_idempotent_and_typed() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "outputs.yml", outputs_workflow());

    let results = harness_for(dir.path(), "outputs.yml")
        .plan()
        .await
        .unwrap()
        .execute()
        .await
        .unwrap();

    assert_eq!(results.job("main").unwrap(), results.job("main").unwrap());
    let err = results.job("deploy").unwrap_err();
    assert!(matches!(
        err,
        HarnessError::NotFound {
            kind: EntityKind::Job,
            ..
        }
    ));
    assert_eq!(err.to_string(), "Job 'deploy' not found");

    let err = results.job("main").unwrap().step("Deploy").unwrap_err();
    assert_eq!(err.to_string(), "Step 'Deploy' not found");
}

#[tokio::test]
async fn test_unknown_job_cannot_be_overridden() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "outputs.yml", outputs_workflow());

    let mut run = harness_for(dir.path(), "outputs.yml").plan().await.unwrap();
    assert!(matches!(
        run.job("deploy"),
        Err(HarnessError::NotFound { .. })
    ));
}

#[tokio::test]
async fn test_selecting_a_job_plans_its_needs() {
    let dir = create_test_dir();
    write_workflow(dir.path(), "outputs.yml", outputs_workflow());

    let config = config_for(dir.path(), "outputs.yml")
        .job("main")
        .build()
        .unwrap();
    let run = Harness::local(config).plan().await.unwrap();
    assert_eq!(run.job_ids(), vec!["main"]);

    let config = config_for(dir.path(), "outputs.yml")
        .job("cleanup")
        .build()
        .unwrap();
    let run = Harness::local(config).plan().await.unwrap();
    assert_eq!(run.job_ids(), vec!["main", "cleanup"]);
}
