//! Task handlers
//!
//! Work units name their computation by a handler key. The runner inside a
//! step (`galaxy invoke`) looks the key up in a [`HandlerRegistry`] of
//! statically compiled handlers, so nothing but the key and a JSON config
//! travels with the template.

pub mod runner;
pub mod shell;

pub use runner::invoke;

use anyhow::{anyhow, Context};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Arguments of one handler invocation, keyed by field name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepArgs {
    values: Map<String, Value>,
}

impl StepArgs {
    pub fn new(values: Map<String, Value>) -> Self {
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    fn require(&self, name: &str) -> anyhow::Result<&Value> {
        self.values
            .get(name)
            .ok_or_else(|| anyhow!("Missing argument '{}'", name))
    }

    pub fn str(&self, name: &str) -> anyhow::Result<&str> {
        self.require(name)?
            .as_str()
            .ok_or_else(|| anyhow!("Argument '{}' is not a string", name))
    }

    pub fn i64(&self, name: &str) -> anyhow::Result<i64> {
        self.require(name)?
            .as_i64()
            .ok_or_else(|| anyhow!("Argument '{}' is not an integer", name))
    }

    /// Artifact mount path
    pub fn path(&self, name: &str) -> anyhow::Result<PathBuf> {
        self.str(name).map(PathBuf::from)
    }

    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> anyhow::Result<T> {
        serde_json::from_value(self.require(name)?.clone())
            .with_context(|| format!("Failed to parse argument '{}'", name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// Output values produced by a handler
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutputs {
    values: BTreeMap<String, Value>,
}

impl StepOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }
}

/// A statically compiled computation
pub trait TaskHandler: Send + Sync {
    fn run(&self, config: &Value, args: &StepArgs) -> anyhow::Result<StepOutputs>;
}

impl<F> TaskHandler for F
where
    F: Fn(&Value, &StepArgs) -> anyhow::Result<StepOutputs> + Send + Sync,
{
    fn run(&self, config: &Value, args: &StepArgs) -> anyhow::Result<StepOutputs> {
        self(config, args)
    }
}

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: BTreeMap<String, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in shell handler and the demo handlers
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register_fn(shell::SHELL_HANDLER, shell::run_shell);
        crate::demo::register_handlers(&mut registry);
        registry
    }

    /// Register a handler, replacing any previous handler of the same name
    pub fn register(&mut self, name: impl Into<String>, handler: impl TaskHandler + 'static) {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Register a plain function or closure as a handler
    pub fn register_fn<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&Value, &StepArgs) -> anyhow::Result<StepOutputs> + Send + Sync + 'static,
    {
        self.register(name, handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_step_args_accessors() {
        let args = StepArgs::new(
            json!({"num": 5, "dir": "./galaxy/input-artifacts/dir", "tags": ["a", "b"]})
                .as_object()
                .unwrap()
                .clone(),
        );

        assert_eq!(args.i64("num").unwrap(), 5);
        assert_eq!(
            args.path("dir").unwrap(),
            PathBuf::from("./galaxy/input-artifacts/dir")
        );
        assert_eq!(args.parse::<Vec<String>>("tags").unwrap(), vec!["a", "b"]);
        assert!(args.str("num").is_err());
        assert!(args.i64("missing").unwrap_err().to_string().contains("Missing"));
    }

    #[test]
    fn test_registry() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("test.double", |_, args| {
            Ok(StepOutputs::new().set("out", args.i64("x")? * 2))
        });

        let handler = registry.get("test.double").unwrap();
        let args = StepArgs::new(json!({"x": 21}).as_object().unwrap().clone());
        let outputs = handler.run(&Value::Null, &args).unwrap();
        assert_eq!(outputs.get("out"), Some(&json!(42)));
        assert!(registry.get("test.missing").is_none());
    }

    #[test]
    fn test_builtins() {
        let registry = HandlerRegistry::with_builtins();
        let names: Vec<&str> = registry.names().collect();
        assert!(names.contains(&shell::SHELL_HANDLER));
        assert!(names.contains(&"demo.square"));
    }
}
