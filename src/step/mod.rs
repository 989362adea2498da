//! Step instances
//!
//! A step instance is a template plus concrete bindings for every declared
//! name. Bindings are written by the caller as [`Bindings`], then resolved and
//! validated against the template by [`instantiate`].

pub mod instantiate;

pub use instantiate::instantiate;

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::dispatcher::ExecutorDescriptor;
use crate::template::Template;

/// Binding of an input value
#[derive(Debug, Clone, PartialEq)]
pub enum ValueBinding {
    Literal(Value),
    /// A declared output value of an already registered step
    Upstream { step: String, output: String },
}

/// Where an artifact comes from (inputs) or goes to (outputs)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSource {
    /// Local path: uploaded at instantiation for inputs, export destination for outputs
    Local(PathBuf),
    /// Full key ref of a stored object (`fs://...`, `mem://...`)
    Remote(String),
    /// Key relative to the workflow namespace
    Stored(String),
    /// A declared output artifact of an already registered step (inputs only)
    Upstream { step: String, output: String },
}

impl ArtifactSource {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        ArtifactSource::Local(path.into())
    }

    pub fn remote(key_ref: impl Into<String>) -> Self {
        ArtifactSource::Remote(key_ref.into())
    }

    pub fn stored(key: impl Into<String>) -> Self {
        ArtifactSource::Stored(key.into())
    }
}

/// Caller-supplied bindings for one step
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    pub(crate) values: BTreeMap<String, ValueBinding>,
    pub(crate) artifacts: BTreeMap<String, ArtifactSource>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind an input value to a literal
    pub fn value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values
            .insert(name.into(), ValueBinding::Literal(value.into()));
        self
    }

    /// Bind an input value to an upstream output, see [`StepHandle::output_value`]
    pub fn value_from(mut self, name: impl Into<String>, binding: ValueBinding) -> Self {
        self.values.insert(name.into(), binding);
        self
    }

    pub fn artifact(mut self, name: impl Into<String>, source: ArtifactSource) -> Self {
        self.artifacts.insert(name.into(), source);
        self
    }
}

/// Reference to a registered step instance, used to wire downstream bindings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepHandle {
    name: String,
}

impl StepHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn output_value(&self, output: &str) -> ValueBinding {
        ValueBinding::Upstream {
            step: self.name.clone(),
            output: output.to_string(),
        }
    }

    pub fn output_artifact(&self, output: &str) -> ArtifactSource {
        ArtifactSource::Upstream {
            step: self.name.clone(),
            output: output.to_string(),
        }
    }
}

/// Fan-out of one step into `count` instances
///
/// Each instance binds `index_field` (a declared integer input value the
/// caller leaves unbound) to its index `0..count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConcurrencyPlan {
    pub count: usize,
    pub index_field: String,
}

impl ConcurrencyPlan {
    pub fn new(count: usize, index_field: impl Into<String>) -> Self {
        Self {
            count,
            index_field: index_field.into(),
        }
    }
}

/// Resolved binding of an input artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedInput {
    /// Key ref of a stored object
    Object(String),
    Upstream { step: String, output: String },
}

/// Resolved destination of an output artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactSink {
    /// Store key the artifact is uploaded to after the step ran
    Store(String),
    /// Local path the artifact is exported to after the step ran
    Export(PathBuf),
}

/// A runnable step: template, stage-two object and resolved bindings
#[derive(Debug, Clone)]
pub struct StepInstance {
    pub(crate) name: String,
    pub(crate) template: Arc<Template>,
    pub(crate) stage_two: String,
    pub(crate) values: BTreeMap<String, ValueBinding>,
    pub(crate) inputs: BTreeMap<String, ResolvedInput>,
    pub(crate) outputs: BTreeMap<String, ArtifactSink>,
    pub(crate) chunk_index: Option<usize>,
    pub(crate) executor: Option<ExecutorDescriptor>,
}

impl StepInstance {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn template(&self) -> &Arc<Template> {
        &self.template
    }

    /// Key ref of the uploaded second-stage script
    pub fn stage_two(&self) -> &str {
        &self.stage_two
    }

    pub fn values(&self) -> &BTreeMap<String, ValueBinding> {
        &self.values
    }

    pub fn inputs(&self) -> &BTreeMap<String, ResolvedInput> {
        &self.inputs
    }

    pub fn outputs(&self) -> &BTreeMap<String, ArtifactSink> {
        &self.outputs
    }

    pub fn chunk_index(&self) -> Option<usize> {
        self.chunk_index
    }

    pub fn executor(&self) -> Option<&ExecutorDescriptor> {
        self.executor.as_ref()
    }

    pub fn handle(&self) -> StepHandle {
        StepHandle::new(&self.name)
    }

    /// Names of the steps this instance depends on
    pub fn upstream_steps(&self) -> Vec<&str> {
        let mut steps: Vec<&str> = self
            .values
            .values()
            .filter_map(|b| match b {
                ValueBinding::Upstream { step, .. } => Some(step.as_str()),
                ValueBinding::Literal(_) => None,
            })
            .chain(self.inputs.values().filter_map(|r| match r {
                ResolvedInput::Upstream { step, .. } => Some(step.as_str()),
                ResolvedInput::Object(_) => None,
            }))
            .collect();
        steps.sort_unstable();
        steps.dedup();
        steps
    }
}
