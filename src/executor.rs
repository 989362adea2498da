/// Local executor
///
/// Runs registered step instances in registration order on this machine, the
/// way an external scheduler would run them on a cluster:
///
/// 1. Each step gets a clean working directory `<work_root>/<step>`.
/// 2. The second-stage script and the input artifacts are mounted under the
///    template's base dir (stored objects are unpacked, upstream artifacts are
///    copied from the producing step's directory).
/// 3. Input placeholders in the entry script are substituted with literal or
///    upstream values, and the entry script runs with `GALAXY_RUNNER` pointing
///    at the runner binary.
/// 4. Output values are read back from `output-parameters`; output artifacts
///    are uploaded to the store or exported to a local path.
use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::logging::{operations, status};
use crate::step::{ArtifactSink, ResolvedInput, StepInstance, ValueBinding};
use crate::storage::{archive, ObjectStore};
use crate::template::script::{input_placeholder, RUNNER_ENV};
use crate::template::Template;

const ENTRY_SCRIPT: &str = "entry.sh";

/// Result of running one step
#[derive(Debug, Clone)]
pub struct StepReport {
    pub name: String,
    pub workdir: PathBuf,
    pub outputs: BTreeMap<String, Value>,
    /// Output artifact locations inside the working directory
    pub artifacts: BTreeMap<String, PathBuf>,
    pub stdout: String,
    pub duration: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    steps: Vec<StepReport>,
}

impl RunReport {
    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn output_value(&self, step: &str, name: &str) -> Option<&Value> {
        self.step(step).and_then(|s| s.outputs.get(name))
    }
}

pub struct LocalExecutor {
    store: std::sync::Arc<dyn ObjectStore>,
    work_root: PathBuf,
    runner: PathBuf,
    keep_workdirs: bool,
}

impl LocalExecutor {
    pub fn new(
        store: std::sync::Arc<dyn ObjectStore>,
        work_root: impl Into<PathBuf>,
        runner: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            work_root: work_root.into(),
            runner: runner.into(),
            keep_workdirs: true,
        }
    }

    /// Whether step working directories survive the run
    pub fn keep_workdirs(mut self, keep: bool) -> Self {
        self.keep_workdirs = keep;
        self
    }

    pub fn run(&self, steps: &[StepInstance]) -> Result<RunReport> {
        fs::create_dir_all(&self.work_root).with_context(|| {
            format!(
                "Failed to create work root: {}",
                self.work_root.display()
            )
        })?;

        let mut report = RunReport::default();
        for step in steps {
            info!(operation = operations::EXECUTOR_RUN_STEP, step = step.name(), "running step");
            let step_report = self
                .run_step(step, &report)
                .with_context(|| format!("Step '{}' failed", step.name()))?;
            info!(
                operation = operations::EXECUTOR_RUN_STEP,
                step = step.name(),
                status = status::COMPLETED,
                duration_ms = step_report.duration.as_millis() as u64,
                "step completed"
            );
            report.steps.push(step_report);
        }

        if !self.keep_workdirs {
            for step in &report.steps {
                fs::remove_dir_all(&step.workdir).with_context(|| {
                    format!("Failed to remove workdir: {}", step.workdir.display())
                })?;
            }
        }

        Ok(report)
    }

    fn run_step(&self, step: &StepInstance, upstream: &RunReport) -> Result<StepReport> {
        let start = Instant::now();
        let template = step.template();

        if Path::new(template.base_dir()).is_absolute() {
            bail!(
                "The local executor requires a relative base dir, got '{}'",
                template.base_dir()
            );
        }

        let workdir = self.work_root.join(step.name());
        if workdir.exists() {
            fs::remove_dir_all(&workdir)
                .with_context(|| format!("Failed to clean workdir: {}", workdir.display()))?;
        }
        fs::create_dir_all(&workdir)
            .with_context(|| format!("Failed to create workdir: {}", workdir.display()))?;

        self.mount_stage_two(step, &workdir)?;
        self.mount_inputs(step, &workdir, upstream)?;

        let entry = render_entry_script(step, upstream)?;
        fs::write(workdir.join(ENTRY_SCRIPT), entry).context("Failed to write entry script")?;

        let bash = which::which("bash").unwrap_or_else(|_| PathBuf::from("bash"));
        let output = Command::new(&bash)
            .arg(ENTRY_SCRIPT)
            .current_dir(&workdir)
            .env(RUNNER_ENV, &self.runner)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to spawn {}", bash.display()))?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if !output.status.success() {
            bail!(
                "Entry script exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }
        debug!(step = step.name(), stdout = %stdout.trim_end(), "entry script finished");

        let outputs = read_output_values(template, &workdir)?;
        let artifacts = self.collect_outputs(step, &workdir)?;

        Ok(StepReport {
            name: step.name().to_string(),
            workdir,
            outputs,
            artifacts,
            stdout,
            duration: start.elapsed(),
        })
    }

    fn mount_stage_two(&self, step: &StepInstance, workdir: &Path) -> Result<()> {
        let script = self
            .store
            .get(step.stage_two())
            .with_context(|| format!("Failed to fetch second stage: {}", step.stage_two()))?;
        let path = workdir.join(step.template().stage_two_path());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, script)
            .with_context(|| format!("Failed to mount second stage: {}", path.display()))?;
        Ok(())
    }

    fn mount_inputs(&self, step: &StepInstance, workdir: &Path, upstream: &RunReport) -> Result<()> {
        for (name, resolved) in step.inputs() {
            let decl = step
                .template()
                .input_artifacts()
                .get(name)
                .with_context(|| format!("Undeclared input artifact '{}'", name))?;
            let dest = workdir.join(&decl.path);

            match resolved {
                ResolvedInput::Object(key_ref) => {
                    let data = self
                        .store
                        .get(key_ref)
                        .with_context(|| format!("Failed to fetch artifact: {}", key_ref))?;
                    archive::unpack_to(&data, &dest)
                        .with_context(|| format!("Failed to mount artifact '{}'", name))?;
                }
                ResolvedInput::Upstream { step: producer, output } => {
                    let src = upstream
                        .step(producer)
                        .and_then(|r| r.artifacts.get(output))
                        .with_context(|| {
                            format!("Step '{}' has not produced '{}'", producer, output)
                        })?;
                    copy_path(src, &dest)?;
                }
            }
            debug!(step = step.name(), artifact = %name, path = %dest.display(), "mounted input");
        }
        Ok(())
    }

    fn collect_outputs(&self, step: &StepInstance, workdir: &Path) -> Result<BTreeMap<String, PathBuf>> {
        let mut artifacts = BTreeMap::new();

        for (name, sink) in step.outputs() {
            let decl = step
                .template()
                .output_artifacts()
                .get(name)
                .with_context(|| format!("Undeclared output artifact '{}'", name))?;
            let src = workdir.join(&decl.path);
            if !src.exists() {
                bail!("Output artifact '{}' was not produced", name);
            }

            match sink {
                ArtifactSink::Store(key) => {
                    let blob = archive::pack_path(&src)
                        .with_context(|| format!("Failed to pack artifact '{}'", name))?;
                    let key_ref = self.store.put(key, &blob)?;
                    debug!(step = step.name(), artifact = %name, key = %key_ref, "uploaded output");
                }
                ArtifactSink::Export(path) => {
                    copy_path(&src, path)?;
                    debug!(step = step.name(), artifact = %name, path = %path.display(), "exported output");
                }
            }
            artifacts.insert(name.clone(), src);
        }

        Ok(artifacts)
    }
}

/// Substitute input placeholders in the entry script
fn render_entry_script(step: &StepInstance, upstream: &RunReport) -> Result<String> {
    let template = step.template();
    let mut script = template.entry_script().to_string();

    for (name, binding) in step.values() {
        let decl = template
            .input_values()
            .get(name)
            .with_context(|| format!("Undeclared input value '{}'", name))?;

        let value = match binding {
            ValueBinding::Literal(value) => value,
            ValueBinding::Upstream { step: producer, output } => upstream
                .output_value(producer, output)
                .with_context(|| format!("Step '{}' has not produced '{}'", producer, output))?,
        };
        script = script.replace(&input_placeholder(name), &decl.value_type.render(value));
    }

    if script.contains("{{inputs.parameters.") {
        bail!("Entry script has unbound input placeholders");
    }
    Ok(script)
}

fn read_output_values(template: &Template, workdir: &Path) -> Result<BTreeMap<String, Value>> {
    let mut outputs = BTreeMap::new();
    for (name, decl) in template.output_values() {
        let Some(rel) = &decl.path else { continue };
        let path = workdir.join(rel);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Output value '{}' was not written", name))?;
        let value = decl.value_type.parse(&text)?;
        outputs.insert(name.clone(), value);
    }
    Ok(outputs)
}

/// Copy a file or directory tree, replacing `dest`
fn copy_path(src: &Path, dest: &Path) -> Result<()> {
    if dest.is_dir() {
        fs::remove_dir_all(dest)?;
    } else if dest.exists() {
        fs::remove_file(dest)?;
    }
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }

    if src.is_file() {
        fs::copy(src, dest)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dest.display()))?;
        return Ok(());
    }

    for entry in walkdir::WalkDir::new(src).sort_by_file_name() {
        let entry = entry?;
        let target = dest.join(entry.path().strip_prefix(src)?);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("Failed to copy {}", entry.path().display())
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{ShapeSpec, ValueType, WorkUnit};
    use crate::storage::MemoryStore;
    use crate::step::Bindings;
    use crate::workflow::{WorkflowBuilder, WorkflowOptions};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    #[test]
    fn test_copy_path() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("a")).unwrap();
        fs::write(src.join("a/f.txt"), "x").unwrap();

        let dest = temp.path().join("dest/inner");
        copy_path(&src, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("a/f.txt")).unwrap(), "x");
    }

    #[test]
    fn test_render_entry_script_substitutes_literals() {
        let store = Arc::new(MemoryStore::new());
        let mut builder = WorkflowBuilder::new("t", store, WorkflowOptions::new("wf"));
        let unit = WorkUnit::new("echo", "galaxy.shell")
            .param(
                ShapeSpec::frozen("EchoArgs")
                    .input_value("greeting", ValueType::String)
                    .input_value("count", ValueType::Integer),
            )
            .with_config(json!({"script": "true"}));
        builder
            .add_step(
                &unit,
                "echo",
                Bindings::new().value("greeting", "hi there").value("count", 3),
            )
            .unwrap();

        let script = render_entry_script(&builder.steps()[0], &RunReport::default()).unwrap();
        assert!(script.contains("\nhi there\n"));
        assert!(script.contains("\n3\n"));
        assert!(!script.contains("{{inputs.parameters."));
    }

    #[test]
    fn test_absolute_base_dir_is_rejected() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::new());
        let mut builder = WorkflowBuilder::new(
            "t",
            store.clone(),
            WorkflowOptions::new("wf").with_base_dir("/opt/galaxy"),
        );
        let unit = WorkUnit::new("noop", "galaxy.shell")
            .param(ShapeSpec::frozen("NoArgs"))
            .with_config(json!({"script": "true"}));
        builder.add_step(&unit, "noop", Bindings::new()).unwrap();

        let executor = LocalExecutor::new(store, temp.path(), "galaxy");
        let err = executor.run(builder.steps()).unwrap_err();
        assert!(format!("{:#}", err).contains("relative base dir"));
    }
}
