/// Workflow builder session
///
/// Owns the object store client, the content cache, the template memo and
/// the ordered step registry. Steps are registered in call order and may only
/// reference steps registered before them, which makes the registry a valid
/// execution order for the scheduler.
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::cache::ContentCache;
use crate::contract::WorkUnit;
use crate::dispatcher::ExecutorDescriptor;
use crate::error::{GalaxyError, Result};
use crate::logging::operations;
use crate::resume::ResumeState;
use crate::step::instantiate::InstantiateContext;
use crate::step::{instantiate, Bindings, ConcurrencyPlan, StepHandle, StepInstance};
use crate::storage::{join_key, ObjectStore};
use crate::template::{build_template, Template, DEFAULT_BASE_DIR};

/// Namespace suffix for uploaded second-stage scripts
pub const STAGE_TWO_NAMESPACE: &str = "build-in/stage-two";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowOptions {
    /// Store key prefix for everything this workflow uploads
    pub namespace: String,
    /// Base directory for mounted resources inside each step
    pub base_dir: String,
}

impl WorkflowOptions {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            base_dir: DEFAULT_BASE_DIR.to_string(),
        }
    }

    pub fn with_base_dir(mut self, base_dir: impl Into<String>) -> Self {
        self.base_dir = base_dir.into();
        self
    }
}

struct MemoizedTemplate {
    template: Arc<Template>,
    stage_two: String,
}

pub struct WorkflowBuilder {
    name: String,
    options: WorkflowOptions,
    cache: ContentCache,
    templates: HashMap<String, MemoizedTemplate>,
    steps: Vec<StepInstance>,
    resume: ResumeState,
    executor: Option<ExecutorDescriptor>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>, store: Arc<dyn ObjectStore>, options: WorkflowOptions) -> Self {
        Self {
            name: name.into(),
            options,
            cache: ContentCache::new(store),
            templates: HashMap::new(),
            steps: Vec::new(),
            resume: ResumeState::new(),
            executor: None,
        }
    }

    pub fn with_resume(mut self, resume: ResumeState) -> Self {
        self.resume = resume;
        self
    }

    /// Attach an executor descriptor to every step registered from now on
    pub fn with_executor(mut self, executor: ExecutorDescriptor) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &WorkflowOptions {
        &self.options
    }

    /// Build the template for a work unit and upload its second stage
    ///
    /// Templates are memoized per work unit name; the upload itself is
    /// deduplicated by content hash, so distinct units sharing a handler,
    /// config and shape upload one blob. Reusing a name for a unit with a
    /// different handler, config or shape is an error.
    pub fn template(&mut self, unit: &WorkUnit) -> Result<Arc<Template>> {
        let built = build_template(unit, &self.options.base_dir)?;
        if let Some(memo) = self.templates.get(unit.name()) {
            if memo.template.content_hash() != built.content_hash() {
                return Err(GalaxyError::Template(format!(
                    "work unit '{}' was already registered with a different handler, config or shape",
                    unit.name()
                )));
            }
            return Ok(Arc::clone(&memo.template));
        }

        let template = Arc::new(built);
        let namespace = join_key(&[&self.options.namespace, STAGE_TWO_NAMESPACE]);
        let stage_two = self.cache.get_or_upload(
            template.stage_two().as_bytes(),
            template.content_hash(),
            &namespace,
        )?;

        self.templates.insert(
            unit.name().to_string(),
            MemoizedTemplate {
                template: Arc::clone(&template),
                stage_two,
            },
        );
        Ok(template)
    }

    /// Bind a template and register the resulting step instances
    ///
    /// Returns one handle per registered instance. On error nothing is
    /// registered.
    pub fn make_step(
        &mut self,
        template: &Arc<Template>,
        name: &str,
        bindings: Bindings,
        plan: Option<ConcurrencyPlan>,
    ) -> Result<Vec<StepHandle>> {
        let stage_two = self.stage_two_ref(template)?;

        let ctx = InstantiateContext {
            registry: &self.steps,
            cache: &mut self.cache,
            namespace: &self.options.namespace,
            executor: self.executor.as_ref(),
        };
        let instances = instantiate(ctx, template, &stage_two, name, &bindings, plan.as_ref())?;

        let handles = instances.iter().map(StepInstance::handle).collect();
        info!(
            operation = operations::WORKFLOW_ADD_STEP,
            step = name,
            template = template.name(),
            instances = instances.len(),
            "registered step"
        );
        self.steps.extend(instances);
        Ok(handles)
    }

    /// Build (or reuse) the template of `unit` and register a single step
    pub fn add_step(&mut self, unit: &WorkUnit, name: &str, bindings: Bindings) -> Result<StepHandle> {
        let template = self.template(unit)?;
        let mut handles = self.make_step(&template, name, bindings, None)?;
        Ok(handles.remove(0))
    }

    /// Whether a stage still needs to be instantiated
    pub fn should_run(&self, stage: &str) -> bool {
        let run = self.resume.should_run(stage);
        if !run {
            info!(operation = operations::WORKFLOW_RESUME, stage = stage, "skipping completed stage");
        }
        run
    }

    pub fn resume(&self) -> &ResumeState {
        &self.resume
    }

    pub fn steps(&self) -> &[StepInstance] {
        &self.steps
    }

    pub fn into_steps(self) -> Vec<StepInstance> {
        self.steps
    }

    pub fn cache(&self) -> &ContentCache {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        self.cache.store()
    }

    /// Stage-two key ref of a template, uploading it for templates built elsewhere
    fn stage_two_ref(&mut self, template: &Template) -> Result<String> {
        if let Some(memo) = self
            .templates
            .values()
            .find(|m| m.template.content_hash() == template.content_hash())
        {
            return Ok(memo.stage_two.clone());
        }
        let namespace = join_key(&[&self.options.namespace, STAGE_TWO_NAMESPACE]);
        self.cache.get_or_upload(
            template.stage_two().as_bytes(),
            template.content_hash(),
            &namespace,
        )
    }
}
