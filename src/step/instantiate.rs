/// Binding resolution
///
/// Validates caller bindings against a template and resolves artifacts:
/// local inputs are packed and uploaded through the session cache, remote
/// inputs must already exist in the store, upstream references must point at
/// registered steps and their declared outputs. Nothing is returned unless
/// every binding of every instance resolved.
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::debug;

use super::{
    ArtifactSink, ArtifactSource, Bindings, ConcurrencyPlan, ResolvedInput, StepInstance,
    ValueBinding,
};
use crate::cache::ContentCache;
use crate::contract::ValueType;
use crate::dispatcher::ExecutorDescriptor;
use crate::error::{GalaxyError, Result};
use crate::logging::operations;
use crate::storage::{archive, is_valid_key, join_key, parse_key_ref};
use crate::template::Template;

/// Namespace suffix for uploaded local input artifacts
pub const ARTIFACTS_NAMESPACE: &str = "artifacts";

/// What instantiation needs from the owning workflow session
pub struct InstantiateContext<'a> {
    /// Already registered steps, in registration order
    pub registry: &'a [StepInstance],
    pub cache: &'a mut ContentCache,
    pub namespace: &'a str,
    pub executor: Option<&'a ExecutorDescriptor>,
}

/// Resolve `bindings` against `template` into one instance, or `plan.count`
/// instances when a concurrency plan is given
pub fn instantiate(
    mut ctx: InstantiateContext<'_>,
    template: &Arc<Template>,
    stage_two: &str,
    name: &str,
    bindings: &Bindings,
    plan: Option<&ConcurrencyPlan>,
) -> Result<Vec<StepInstance>> {
    validate_step_name(name)?;

    if let Some(plan) = plan {
        validate_plan(name, template, bindings, plan)?;
    }
    let index_field = plan.map(|p| p.index_field.as_str());

    let values = resolve_values(&ctx, name, template, bindings, index_field)?;

    let declared_artifacts: BTreeSet<&str> = template
        .input_artifacts()
        .keys()
        .chain(template.output_artifacts().keys())
        .map(String::as_str)
        .collect();
    check_names(
        name,
        "artifact",
        &declared_artifacts,
        bindings.artifacts.keys().map(String::as_str),
    )?;

    let mut inputs = BTreeMap::new();
    for artifact in template.input_artifacts().keys() {
        let source = &bindings.artifacts[artifact];
        let resolved = resolve_input(
            &mut *ctx.cache,
            ctx.registry,
            ctx.namespace,
            name,
            artifact,
            source,
        )?;
        inputs.insert(artifact.clone(), resolved);
    }

    let instance_names: Vec<(String, Option<usize>)> = match plan {
        Some(plan) => (0..plan.count)
            .map(|i| (format!("{}-{}", name, i), Some(i)))
            .collect(),
        None => vec![(name.to_string(), None)],
    };

    for (instance_name, _) in &instance_names {
        if ctx.registry.iter().any(|s| &s.name == instance_name) {
            return Err(GalaxyError::binding(
                instance_name,
                "a step with this name is already registered",
            ));
        }
    }

    let mut instances = Vec::with_capacity(instance_names.len());
    for (instance_name, index) in instance_names {
        let mut outputs = BTreeMap::new();
        for artifact in template.output_artifacts().keys() {
            let source = &bindings.artifacts[artifact];
            let sink = resolve_output(&*ctx.cache, ctx.namespace, name, artifact, source, index)?;
            outputs.insert(artifact.clone(), sink);
        }

        let mut instance_values = values.clone();
        if let (Some(field), Some(index)) = (index_field, index) {
            instance_values.insert(field.to_string(), ValueBinding::Literal(index.into()));
        }

        instances.push(StepInstance {
            name: instance_name,
            template: Arc::clone(template),
            stage_two: stage_two.to_string(),
            values: instance_values,
            inputs: inputs.clone(),
            outputs,
            chunk_index: index,
            executor: ctx.executor.cloned(),
        });
    }

    debug!(
        operation = operations::STEP_INSTANTIATE,
        step = name,
        template = template.name(),
        instances = instances.len(),
        "instantiated step"
    );

    Ok(instances)
}

/// Step names end up in directory names and output placeholders
fn validate_step_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(GalaxyError::binding(
            name,
            "step names may only contain ASCII letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

fn validate_plan(
    name: &str,
    template: &Template,
    bindings: &Bindings,
    plan: &ConcurrencyPlan,
) -> Result<()> {
    if plan.count == 0 {
        return Err(GalaxyError::binding(name, "concurrency count must be at least 1"));
    }
    match template.input_values().get(&plan.index_field) {
        Some(decl) if decl.value_type == ValueType::Integer => {}
        Some(_) => {
            return Err(GalaxyError::binding(
                name,
                format!("index field '{}' must be an integer", plan.index_field),
            ))
        }
        None => {
            return Err(GalaxyError::binding(
                name,
                format!("index field '{}' is not a declared input value", plan.index_field),
            ))
        }
    }
    if bindings.values.contains_key(&plan.index_field) {
        return Err(GalaxyError::binding(
            name,
            format!(
                "index field '{}' is bound by the concurrency plan",
                plan.index_field
            ),
        ));
    }
    Ok(())
}

/// Every declared name must be bound exactly once, nothing else may be bound
fn check_names<'a>(
    step: &str,
    kind: &str,
    declared: &BTreeSet<&str>,
    bound: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let bound: BTreeSet<&str> = bound.collect();

    let missing: Vec<&str> = declared.difference(&bound).copied().collect();
    if !missing.is_empty() {
        return Err(GalaxyError::binding(
            step,
            format!("missing {} binding(s): {}", kind, missing.join(", ")),
        ));
    }

    let extra: Vec<&str> = bound.difference(declared).copied().collect();
    if !extra.is_empty() {
        return Err(GalaxyError::binding(
            step,
            format!("undeclared {} binding(s): {}", kind, extra.join(", ")),
        ));
    }

    Ok(())
}

fn find_step<'a>(registry: &'a [StepInstance], step: &str, name: &str) -> Result<&'a StepInstance> {
    registry.iter().find(|s| s.name == step).ok_or_else(|| {
        let fanned_out = registry
            .iter()
            .any(|s| s.name.starts_with(&format!("{}-", step)) && s.chunk_index.is_some());
        let hint = if fanned_out {
            " (fanned-out steps are referenced by instance name, e.g. '<step>-0')"
        } else {
            ""
        };
        GalaxyError::binding(
            name,
            format!("upstream step '{}' is not registered{}", step, hint),
        )
    })
}

fn resolve_values(
    ctx: &InstantiateContext<'_>,
    name: &str,
    template: &Template,
    bindings: &Bindings,
    index_field: Option<&str>,
) -> Result<BTreeMap<String, ValueBinding>> {
    let declared: BTreeSet<&str> = template
        .input_values()
        .keys()
        .map(String::as_str)
        .filter(|n| Some(*n) != index_field)
        .collect();
    check_names(name, "value", &declared, bindings.values.keys().map(String::as_str))?;

    for (field, binding) in &bindings.values {
        let decl = &template.input_values()[field];
        match binding {
            ValueBinding::Literal(value) => {
                if !decl.value_type.accepts(value) {
                    return Err(GalaxyError::binding(
                        name,
                        format!(
                            "value {} for '{}' is not a valid {:?}",
                            value, field, decl.value_type
                        ),
                    ));
                }
            }
            ValueBinding::Upstream { step, output } => {
                let upstream = find_step(ctx.registry, step, name)?;
                let produced = upstream.template.output_values().get(output).ok_or_else(|| {
                    GalaxyError::binding(
                        name,
                        format!("step '{}' declares no output value '{}'", step, output),
                    )
                })?;
                if decl.value_type != ValueType::Json && produced.value_type != decl.value_type {
                    return Err(GalaxyError::binding(
                        name,
                        format!(
                            "'{}' expects {:?} but '{}.{}' produces {:?}",
                            field, decl.value_type, step, output, produced.value_type
                        ),
                    ));
                }
            }
        }
    }

    Ok(bindings.values.clone())
}

fn resolve_input(
    cache: &mut ContentCache,
    registry: &[StepInstance],
    namespace: &str,
    step: &str,
    artifact: &str,
    source: &ArtifactSource,
) -> Result<ResolvedInput> {
    match source {
        ArtifactSource::Local(path) => {
            let blob = archive::pack_path(path)
                .map_err(|e| GalaxyError::artifact(artifact, e.to_string()))?;
            let key_ref = cache
                .put_content(&blob, &join_key(&[namespace, ARTIFACTS_NAMESPACE]))
                .map_err(|e| GalaxyError::artifact(artifact, e.to_string()))?;
            Ok(ResolvedInput::Object(key_ref))
        }
        ArtifactSource::Remote(key_ref) => {
            ensure_exists(cache, artifact, key_ref)?;
            Ok(ResolvedInput::Object(key_ref.clone()))
        }
        ArtifactSource::Stored(key) => {
            let key_ref = crate::storage::key_ref(cache.store().scheme(), &join_key(&[namespace, key]));
            ensure_exists(cache, artifact, &key_ref)?;
            Ok(ResolvedInput::Object(key_ref))
        }
        ArtifactSource::Upstream { step: upstream, output } => {
            let producer = find_step(registry, upstream, step)?;
            if !producer.template.output_artifacts().contains_key(output) {
                return Err(GalaxyError::binding(
                    step,
                    format!(
                        "step '{}' declares no output artifact '{}'",
                        upstream, output
                    ),
                ));
            }
            Ok(ResolvedInput::Upstream {
                step: upstream.clone(),
                output: output.clone(),
            })
        }
    }
}

fn ensure_exists(cache: &ContentCache, artifact: &str, key_ref: &str) -> Result<()> {
    let exists = cache
        .store()
        .exists(key_ref)
        .map_err(|e| GalaxyError::artifact(artifact, e.to_string()))?;
    if !exists {
        return Err(GalaxyError::artifact(
            artifact,
            format!("'{}' does not exist in the store", key_ref),
        ));
    }
    Ok(())
}

fn resolve_output(
    cache: &ContentCache,
    namespace: &str,
    step: &str,
    artifact: &str,
    source: &ArtifactSource,
    index: Option<usize>,
) -> Result<ArtifactSink> {
    let suffix = index.map(|i| i.to_string());

    match source {
        ArtifactSource::Local(path) => Ok(ArtifactSink::Export(match &suffix {
            Some(suffix) => path.join(suffix),
            None => path.clone(),
        })),
        ArtifactSource::Remote(key_ref) => {
            let scheme = cache.store().scheme();
            let key = match parse_key_ref(key_ref) {
                Some((s, key)) if s == scheme && is_valid_key(key) => key,
                _ => {
                    return Err(GalaxyError::artifact(
                        artifact,
                        format!("'{}' is not a valid '{}://' destination", key_ref, scheme),
                    ))
                }
            };
            Ok(ArtifactSink::Store(join_key(&[key, suffix.as_deref().unwrap_or("")])))
        }
        ArtifactSource::Stored(key) => {
            let key = join_key(&[namespace, key, suffix.as_deref().unwrap_or("")]);
            if !is_valid_key(&key) {
                return Err(GalaxyError::artifact(
                    artifact,
                    format!("'{}' is not a valid store key", key),
                ));
            }
            Ok(ArtifactSink::Store(key))
        }
        ArtifactSource::Upstream { .. } => Err(GalaxyError::binding(
            step,
            format!(
                "output artifact '{}' cannot be bound to an upstream output",
                artifact
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentCache;
    use crate::contract::{ShapeSpec, WorkUnit};
    use crate::step::StepHandle;
    use crate::storage::{MemoryStore, ObjectStore};
    use crate::template::build_template;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    fn template() -> Arc<Template> {
        let unit = WorkUnit::new("work", "demo.work")
            .param(
                ShapeSpec::frozen("WorkArgs")
                    .input_value("x", ValueType::Integer)
                    .input_value("index", ValueType::Integer)
                    .input_artifact("data")
                    .output_artifact("result"),
            )
            .returns(ShapeSpec::mutable("WorkOutput").output_value("total", ValueType::Integer));
        Arc::new(build_template(&unit, "./galaxy").unwrap())
    }

    fn run(
        store: Arc<dyn ObjectStore>,
        registry: &[StepInstance],
        name: &str,
        bindings: Bindings,
        plan: Option<ConcurrencyPlan>,
    ) -> Result<Vec<StepInstance>> {
        let mut cache = ContentCache::new(store);
        let ctx = InstantiateContext {
            registry,
            cache: &mut cache,
            namespace: "ns",
            executor: None,
        };
        instantiate(ctx, &template(), "mem://stage-two", name, &bindings, plan.as_ref())
    }

    fn remote_bindings(store: &MemoryStore) -> Bindings {
        let data = store.put("ns/data", b"blob").unwrap();
        Bindings::new()
            .value("x", 1)
            .value("index", 0)
            .artifact("data", ArtifactSource::remote(data))
            .artifact("result", ArtifactSource::stored("result"))
    }

    #[test]
    fn test_instantiate_single_step() {
        let store = Arc::new(MemoryStore::new());
        let bindings = remote_bindings(&store);
        let steps = run(store, &[], "work", bindings, None).unwrap();

        assert_eq!(steps.len(), 1);
        let step = &steps[0];
        assert_eq!(step.name(), "work");
        assert_eq!(step.values()["x"], ValueBinding::Literal(json!(1)));
        assert_eq!(
            step.inputs()["data"],
            ResolvedInput::Object("mem://ns/data".to_string())
        );
        assert_eq!(
            step.outputs()["result"],
            ArtifactSink::Store("ns/result".to_string())
        );
        assert_eq!(step.chunk_index(), None);
    }

    #[test]
    fn test_missing_and_extra_bindings() {
        let store = Arc::new(MemoryStore::new());
        let bindings = remote_bindings(&store);

        let missing = Bindings {
            values: bindings
                .values
                .clone()
                .into_iter()
                .filter(|(k, _)| k != "x")
                .collect(),
            artifacts: bindings.artifacts.clone(),
        };
        let err = run(store.clone(), &[], "work", missing, None).unwrap_err();
        assert!(err.to_string().contains("missing value binding(s): x"));

        let extra = bindings.clone().value("y", 2);
        let err = run(store, &[], "work", extra, None).unwrap_err();
        assert!(err.to_string().contains("undeclared value binding(s): y"));
    }

    #[test]
    fn test_literal_type_mismatch() {
        let store = Arc::new(MemoryStore::new());
        let bindings = remote_bindings(&store).value("x", "one");
        assert!(matches!(
            run(store, &[], "work", bindings, None),
            Err(GalaxyError::Binding { .. })
        ));
    }

    #[test]
    fn test_local_artifact_is_uploaded_once() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("in.txt"), "3").unwrap();

        let store = Arc::new(MemoryStore::new());
        let bindings = remote_bindings(&store)
            .artifact("data", ArtifactSource::local(temp.path()));
        let puts_before = store.put_count();

        let steps = run(
            store.clone(),
            &[],
            "work",
            bindings.clone().value("index", 0),
            None,
        )
        .unwrap();
        assert_eq!(store.put_count(), puts_before + 1);
        match &steps[0].inputs()["data"] {
            ResolvedInput::Object(key_ref) => {
                assert!(key_ref.starts_with("mem://ns/artifacts/"));
                assert!(store.exists(key_ref).unwrap());
            }
            other => panic!("unexpected binding {:?}", other),
        }
    }

    #[test]
    fn test_upload_failure_is_artifact_resolution_error() {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(MemoryStore::failing());
        let bindings = Bindings::new()
            .value("x", 1)
            .value("index", 0)
            .artifact("data", ArtifactSource::local(temp.path()))
            .artifact("result", ArtifactSource::stored("result"));

        assert!(matches!(
            run(store, &[], "work", bindings, None),
            Err(GalaxyError::ArtifactResolution { .. })
        ));
    }

    #[test]
    fn test_missing_remote_input() {
        let store = Arc::new(MemoryStore::new());
        let bindings = remote_bindings(&store)
            .artifact("data", ArtifactSource::remote("mem://ns/missing"));
        assert!(matches!(
            run(store, &[], "work", bindings, None),
            Err(GalaxyError::ArtifactResolution { .. })
        ));
    }

    #[test]
    fn test_fan_out() {
        let store = Arc::new(MemoryStore::new());
        let data = store.put("ns/data", b"blob").unwrap();
        let bindings = Bindings::new()
            .value("x", 1)
            .artifact("data", ArtifactSource::remote(data))
            .artifact("result", ArtifactSource::stored("result"));

        let steps = run(
            store,
            &[],
            "work",
            bindings,
            Some(ConcurrencyPlan::new(3, "index")),
        )
        .unwrap();

        let names: Vec<&str> = steps.iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["work-0", "work-1", "work-2"]);
        for (i, step) in steps.iter().enumerate() {
            assert_eq!(step.values()["index"], ValueBinding::Literal(json!(i)));
            assert_eq!(step.chunk_index(), Some(i));
            assert_eq!(
                step.outputs()["result"],
                ArtifactSink::Store(format!("ns/result/{}", i))
            );
            assert!(Arc::ptr_eq(step.template(), steps[0].template()));
        }
    }

    #[test]
    fn test_fan_out_rejects_bound_index() {
        let store = Arc::new(MemoryStore::new());
        let bindings = remote_bindings(&store);
        let err = run(
            store,
            &[],
            "work",
            bindings,
            Some(ConcurrencyPlan::new(2, "index")),
        )
        .unwrap_err();
        assert!(err.to_string().contains("bound by the concurrency plan"));
    }

    #[test]
    fn test_upstream_references() {
        let store = Arc::new(MemoryStore::new());
        let bindings = remote_bindings(&store);
        let first = run(store.clone(), &[], "first", bindings.clone(), None).unwrap();
        let handle = first[0].handle();

        let chained = bindings
            .clone()
            .value_from("x", handle.output_value("total"))
            .artifact("data", handle.output_artifact("result"));
        let second = run(store.clone(), &first, "second", chained, None).unwrap();
        assert_eq!(second[0].upstream_steps(), vec!["first"]);

        let unknown_step = bindings
            .clone()
            .value_from("x", StepHandle::new("ghost").output_value("total"));
        assert!(matches!(
            run(store.clone(), &first, "third", unknown_step, None),
            Err(GalaxyError::Binding { .. })
        ));

        let unknown_output = bindings
            .clone()
            .artifact("data", handle.output_artifact("nothing"));
        assert!(run(store.clone(), &first, "third", unknown_output, None).is_err());

        let upstream_output = bindings.artifact("result", handle.output_artifact("result"));
        assert!(run(store.clone(), &first, "third", upstream_output, None).is_err());
    }

    #[test]
    fn test_duplicate_and_invalid_names() {
        let store = Arc::new(MemoryStore::new());
        let bindings = remote_bindings(&store);
        let first = run(store.clone(), &[], "work", bindings.clone(), None).unwrap();

        assert!(run(store.clone(), &first, "work", bindings.clone(), None).is_err());
        assert!(run(store, &[], "bad name", bindings, None).is_err());
    }
}
