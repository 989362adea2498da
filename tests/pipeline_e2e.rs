/// End-to-end tests driving the library: build a workflow, execute it with
/// the local executor and the real `galaxy` binary as second-stage runner.
use galaxy::contract::{ShapeSpec, ValueType, WorkUnit};
use galaxy::demo::{build_square_sum, expected_total};
use galaxy::executor::LocalExecutor;
use galaxy::handler::shell::SHELL_HANDLER;
use galaxy::step::{ArtifactSource, Bindings, ConcurrencyPlan};
use galaxy::storage::{FilesystemStore, ObjectStore};
use galaxy::workflow::{WorkflowBuilder, WorkflowOptions};
use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;

fn store(temp: &TempDir) -> Arc<FilesystemStore> {
    Arc::new(FilesystemStore::with_default_retries(temp.path().join("store")))
}

fn executor(temp: &TempDir, store: Arc<dyn ObjectStore>) -> LocalExecutor {
    LocalExecutor::new(store, temp.path().join("work"), env!("CARGO_BIN_EXE_galaxy"))
}

#[test]
fn test_square_sum_pipeline() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let mut builder = WorkflowBuilder::new("square-sum", store.clone(), WorkflowOptions::new("e2e"));

    let steps = build_square_sum(&mut builder, 10).unwrap();
    let report = executor(&temp, store).run(builder.steps()).unwrap();

    assert_eq!(
        report.output_value(steps.fan_in.name(), "total"),
        Some(&json!(expected_total(10)))
    );
    assert_eq!(
        report.output_value(steps.show.name(), "stdout"),
        Some(&json!("285"))
    );

    let names: Vec<&str> = report.steps().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["fan-out", "square", "fan-in", "show"]);
}

fn chunk_unit() -> WorkUnit {
    WorkUnit::new("select", SHELL_HANDLER)
        .param(
            ShapeSpec::frozen("SelectArgs")
                .input_value("index", ValueType::Integer)
                .input_artifact("lines"),
        )
        .returns(ShapeSpec::mutable("SelectOutput").output_value("selected", ValueType::String))
        .with_config(json!({
            "script": "\"$GALAXY_RUNNER\" chunk -n 3 -i \"$index\" \"$lines\"",
            "capture": "selected"
        }))
}

#[test]
fn test_fan_out_selects_chunks() {
    let temp = TempDir::new().unwrap();
    let lines = temp.path().join("lines.txt");
    fs::write(&lines, "a\nb\nc\nd\ne\nf\ng\n").unwrap();

    let store = store(&temp);
    let mut builder = WorkflowBuilder::new("chunks", store.clone(), WorkflowOptions::new("e2e"));
    let template = builder.template(&chunk_unit()).unwrap();
    let handles = builder
        .make_step(
            &template,
            "select",
            Bindings::new().artifact("lines", ArtifactSource::local(&lines)),
            Some(ConcurrencyPlan::new(3, "index")),
        )
        .unwrap();
    assert_eq!(handles.len(), 3);

    let report = executor(&temp, store).run(builder.steps()).unwrap();

    let selected: Vec<String> = handles
        .iter()
        .map(|h| {
            report
                .output_value(h.name(), "selected")
                .and_then(|v| v.as_str())
                .unwrap()
                .to_string()
        })
        .collect();
    assert_eq!(selected, vec!["a\nb", "c\nd", "e\nf\ng"]);
}

#[test]
fn test_failing_step_stops_the_run() {
    let temp = TempDir::new().unwrap();
    let store = store(&temp);
    let mut builder = WorkflowBuilder::new("failing", store.clone(), WorkflowOptions::new("e2e"));

    let unit = WorkUnit::new("fail", SHELL_HANDLER)
        .param(ShapeSpec::frozen("FailArgs").input_value("code", ValueType::Integer))
        .with_config(json!({"script": "exit $code"}));
    builder
        .add_step(&unit, "fail", Bindings::new().value("code", 4))
        .unwrap();
    builder
        .add_step(&unit, "after", Bindings::new().value("code", 0))
        .unwrap();

    let err = executor(&temp, store).run(builder.steps()).unwrap_err();
    assert!(format!("{:#}", err).contains("Step 'fail' failed"));
    assert!(!temp.path().join("work/after").exists());
}
