//! Step templates
//!
//! A template is the reusable, content-addressed form of a work unit: a bash
//! entry script that prepares the arguments, a second-stage script embedding
//! the encoded handler payload, and the declared bindings by name.

pub mod builder;
pub mod payload;
pub mod script;

pub use builder::build_template;
pub use payload::{decode_payload, encode_payload, HandlerPayload};

use std::collections::BTreeMap;

use crate::contract::ValueType;

/// Subdirectory of the base dir holding mounted input artifacts
pub const INPUT_ARTIFACTS_DIR: &str = "input-artifacts";
/// Subdirectory of the base dir holding produced output artifacts
pub const OUTPUT_ARTIFACTS_DIR: &str = "output-artifacts";
/// Subdirectory of the base dir receiving output parameter files
pub const OUTPUT_PARAMETERS_DIR: &str = "output-parameters";
/// Scratch subdirectory for the args file and the second-stage script
pub const TMP_DIR: &str = "tmp";
pub const ARGS_FILE: &str = "args.json";
pub const STAGE_TWO_FILE: &str = "stage-two.sh";

/// Default base directory for mounted resources inside a step
pub const DEFAULT_BASE_DIR: &str = "./galaxy";

/// A declared value binding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueDecl {
    pub name: String,
    pub value_type: ValueType,
    /// Where the runner writes the value (output values only)
    pub path: Option<String>,
}

/// A declared artifact binding with its fixed mount path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactDecl {
    pub name: String,
    pub path: String,
}

/// Immutable, content-addressed step template
#[derive(Debug, Clone)]
pub struct Template {
    pub(crate) name: String,
    pub(crate) unit: String,
    pub(crate) handler: String,
    pub(crate) base_dir: String,
    pub(crate) entry_script: String,
    pub(crate) stage_two: String,
    pub(crate) content_hash: String,
    pub(crate) input_values: BTreeMap<String, ValueDecl>,
    pub(crate) input_artifacts: BTreeMap<String, ArtifactDecl>,
    pub(crate) output_artifacts: BTreeMap<String, ArtifactDecl>,
    pub(crate) output_values: BTreeMap<String, ValueDecl>,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the work unit the template was built from
    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    pub fn entry_script(&self) -> &str {
        &self.entry_script
    }

    pub fn stage_two(&self) -> &str {
        &self.stage_two
    }

    /// SHA256 (hex) of the second-stage script
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub fn input_values(&self) -> &BTreeMap<String, ValueDecl> {
        &self.input_values
    }

    pub fn input_artifacts(&self) -> &BTreeMap<String, ArtifactDecl> {
        &self.input_artifacts
    }

    pub fn output_artifacts(&self) -> &BTreeMap<String, ArtifactDecl> {
        &self.output_artifacts
    }

    pub fn output_values(&self) -> &BTreeMap<String, ValueDecl> {
        &self.output_values
    }

    /// Mount path of the second-stage script
    pub fn stage_two_path(&self) -> String {
        script::join_remote(&self.base_dir, &[TMP_DIR, STAGE_TWO_FILE])
    }

    pub fn args_path(&self) -> String {
        script::join_remote(&self.base_dir, &[TMP_DIR, ARGS_FILE])
    }
}
