use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::dispatcher::{
    create_dispatcher, ExecutorConfig, ExecutorDescriptor, HpcConfig, ResourcePlan,
    SchedulerOptions,
};
use crate::resume::{stage_namespace, ResumeState, Stage};
use crate::storage::{default_store_dir, is_valid_key, DEFAULT_RETRIES};
use crate::template::DEFAULT_BASE_DIR;

/// Complete galaxy configuration (loaded from `galaxy.toml`)
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GalaxyConfig {
    #[serde(default)]
    pub workflow: WorkflowConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub executor: LocalExecutorConfig,

    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Stage name -> completed
    #[serde(default)]
    pub resume: ResumeState,
}

/// Workflow builder configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_workflow_name")]
    pub name: String,

    /// Store key prefix for everything the workflow uploads
    #[serde(default = "default_workflow_name")]
    pub namespace: String,

    /// Base directory for mounted resources inside each step
    #[serde(default = "default_base_dir")]
    pub base_dir: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            name: default_workflow_name(),
            namespace: default_workflow_name(),
            base_dir: default_base_dir(),
        }
    }
}

/// Object store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Root directory of the filesystem store
    #[serde(default = "default_store_root")]
    pub dir: String,

    /// Write attempts before an upload fails
    #[serde(default = "default_retries")]
    pub retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: default_store_root(),
            retries: DEFAULT_RETRIES,
        }
    }
}

/// Local executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalExecutorConfig {
    /// Runner binary invoked by second-stage scripts (defaults to this binary)
    #[serde(default)]
    pub runner: Option<String>,

    /// Root of the per-step working directories
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    #[serde(default = "default_true")]
    pub keep_workdirs: bool,
}

impl Default for LocalExecutorConfig {
    fn default() -> Self {
        Self {
            runner: None,
            work_dir: default_work_dir(),
            keep_workdirs: true,
        }
    }
}

/// Remote dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DispatcherConfig {
    #[serde(default)]
    pub resources: ResourcePlan,

    #[serde(default)]
    pub hpc: Option<HpcConfig>,
}

impl DispatcherConfig {
    /// Executor descriptor for step instances, if a cluster is configured
    pub fn descriptor(&self) -> Result<Option<ExecutorDescriptor>> {
        match &self.hpc {
            Some(hpc) => {
                let config = ExecutorConfig {
                    hpc: Some(hpc.clone()),
                };
                Ok(Some(create_dispatcher(&config, &self.resources)?))
            }
            None => Ok(None),
        }
    }
}

// Default value functions
fn default_workflow_name() -> String {
    "galaxy".to_string()
}

fn default_base_dir() -> String {
    DEFAULT_BASE_DIR.to_string()
}

fn default_store_root() -> String {
    default_store_dir().to_string_lossy().to_string()
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_work_dir() -> String {
    ".galaxy/work".to_string()
}

fn default_true() -> bool {
    true
}

impl GalaxyConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: GalaxyConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Generate example configuration as TOML string
    pub fn example() -> Result<String> {
        let mut config = GalaxyConfig {
            workflow: WorkflowConfig {
                name: "square-sum".to_string(),
                namespace: "square-sum".to_string(),
                base_dir: DEFAULT_BASE_DIR.to_string(),
            },
            store: StoreConfig {
                dir: ".galaxy/store".to_string(),
                retries: DEFAULT_RETRIES,
            },
            dispatcher: DispatcherConfig {
                resources: ResourcePlan {
                    queue: "cpu".to_string(),
                    ..Default::default()
                },
                hpc: Some(HpcConfig {
                    url: "john@hpc-login01".to_string(),
                    key_file: Some("~/.ssh/id_ed25519".to_string()),
                    slurm: Some(SchedulerOptions::default()),
                    lsf: None,
                    pbs: None,
                }),
            },
            ..Default::default()
        };
        config.resume.mark_done(stage_namespace(0, Stage::Label));

        toml::to_string_pretty(&config).context("Failed to serialize example config")
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.workflow.name.is_empty() {
            anyhow::bail!("workflow.name must be set");
        }

        if !is_valid_key(&self.workflow.namespace) {
            anyhow::bail!(
                "workflow.namespace must be a relative store key without '.' or '..' segments: {}",
                self.workflow.namespace
            );
        }

        if self.workflow.base_dir.trim().is_empty() {
            anyhow::bail!("workflow.base_dir must be set");
        }

        if self.store.dir.is_empty() {
            anyhow::bail!("store.dir must be set");
        }

        if self.store.retries == 0 {
            anyhow::bail!("store.retries must be at least 1");
        }

        let resources = &self.dispatcher.resources;
        if resources.node_per_task == 0 || resources.cpu_per_node == 0 {
            anyhow::bail!("dispatcher.resources node_per_task and cpu_per_node must be at least 1");
        }

        self.dispatcher
            .descriptor()
            .context("Invalid dispatcher.hpc section")?;

        Ok(())
    }

    pub fn store_dir(&self) -> PathBuf {
        PathBuf::from(&self.store.dir)
    }
}
