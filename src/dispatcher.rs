/// Dispatcher configuration
///
/// Describes where step instances run on an HPC cluster: SSH endpoint,
/// scheduler kind and the resources requested per task. The resulting
/// [`ExecutorDescriptor`] is attached to every step instance and handed to the
/// external scheduler as-is; this crate does not open SSH connections.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::template::DEFAULT_BASE_DIR;

const DEFAULT_SSH_PORT: u16 = 22;

/// Resources requested for each task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourcePlan {
    #[serde(default)]
    pub queue: String,

    #[serde(default)]
    pub container: Option<String>,

    #[serde(default = "default_remote_dir")]
    pub remote_dir: String,

    #[serde(default = "default_one")]
    pub node_per_task: u32,

    #[serde(default = "default_one")]
    pub cpu_per_node: u32,
}

impl Default for ResourcePlan {
    fn default() -> Self {
        Self {
            queue: String::new(),
            container: None,
            remote_dir: default_remote_dir(),
            node_per_task: 1,
            cpu_per_node: 1,
        }
    }
}

fn default_remote_dir() -> String {
    DEFAULT_BASE_DIR.to_string()
}

fn default_one() -> u32 {
    1
}

/// Scheduler-specific options, passed through untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerOptions {
    #[serde(default, flatten)]
    pub options: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HpcConfig {
    /// SSH URL of the login node, for example `john@hpc-login01:2222`
    pub url: String,

    #[serde(default)]
    pub key_file: Option<String>,

    #[serde(default)]
    pub slurm: Option<SchedulerOptions>,

    #[serde(default)]
    pub lsf: Option<SchedulerOptions>,

    #[serde(default)]
    pub pbs: Option<SchedulerOptions>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextType {
    Slurm,
    #[serde(rename = "LSF")]
    Lsf,
    #[serde(rename = "PBS")]
    Pbs,
}

impl HpcConfig {
    /// Scheduler kind; slurm wins over lsf, lsf over pbs
    pub fn context_type(&self) -> Result<ContextType> {
        if self.slurm.is_some() {
            return Ok(ContextType::Slurm);
        }
        if self.lsf.is_some() {
            return Ok(ContextType::Lsf);
        }
        if self.pbs.is_some() {
            return Ok(ContextType::Pbs);
        }
        bail!("At least one of slurm, lsf or pbs should be provided")
    }

    fn scheduler_options(&self) -> SchedulerOptions {
        self.slurm
            .as_ref()
            .or(self.lsf.as_ref())
            .or(self.pbs.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorConfig {
    #[serde(default)]
    pub hpc: Option<HpcConfig>,
}

/// Everything the external scheduler needs to place a step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorDescriptor {
    pub host: String,
    pub username: String,
    pub port: u16,
    pub context_type: ContextType,
    pub key_file: Option<String>,
    pub scheduler_options: SchedulerOptions,
    pub plan: ResourcePlan,
}

pub fn create_dispatcher(config: &ExecutorConfig, plan: &ResourcePlan) -> Result<ExecutorDescriptor> {
    match &config.hpc {
        Some(hpc) => create_hpc_dispatcher(hpc, plan),
        None => bail!("An [executor.hpc] section is required to create a dispatcher"),
    }
}

fn create_hpc_dispatcher(config: &HpcConfig, plan: &ResourcePlan) -> Result<ExecutorDescriptor> {
    let (username, host, port) = parse_ssh_url(&config.url)?;
    let context_type = config.context_type()?;

    Ok(ExecutorDescriptor {
        host,
        username,
        port,
        context_type,
        key_file: config.key_file.clone(),
        scheduler_options: config.scheduler_options(),
        plan: plan.clone(),
    })
}

/// Split `[ssh://]user@host[:port]`
fn parse_ssh_url(url: &str) -> Result<(String, String, u16)> {
    let rest = url.strip_prefix("ssh://").unwrap_or(url);

    let (username, host_port) = match rest.split_once('@') {
        Some((user, host_port)) if !user.is_empty() => (user, host_port),
        _ => bail!("Username is required in the URL: {}", url),
    };

    let (host, port) = match host_port.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid port in URL: {}", url))?;
            (host, port)
        }
        None => (host_port, DEFAULT_SSH_PORT),
    };

    if host.is_empty() {
        bail!("Host is required in the URL: {}", url);
    }

    Ok((username.to_string(), host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hpc(url: &str) -> HpcConfig {
        HpcConfig {
            url: url.to_string(),
            key_file: Some("~/.ssh/id_ed25519".to_string()),
            slurm: Some(SchedulerOptions::default()),
            lsf: None,
            pbs: None,
        }
    }

    #[test]
    fn test_create_hpc_dispatcher() {
        let config = ExecutorConfig {
            hpc: Some(hpc("john@hpc-login01")),
        };
        let plan = ResourcePlan {
            queue: "gpu".to_string(),
            ..Default::default()
        };

        let descriptor = create_dispatcher(&config, &plan).unwrap();
        assert_eq!(descriptor.host, "hpc-login01");
        assert_eq!(descriptor.username, "john");
        assert_eq!(descriptor.port, 22);
        assert_eq!(descriptor.context_type, ContextType::Slurm);
        assert_eq!(descriptor.plan.remote_dir, "./galaxy");
        assert_eq!(descriptor.plan.queue, "gpu");
    }

    #[test]
    fn test_port_and_scheme() {
        let config = ExecutorConfig {
            hpc: Some(hpc("ssh://alice@cluster:2222")),
        };
        let descriptor = create_dispatcher(&config, &ResourcePlan::default()).unwrap();
        assert_eq!(descriptor.port, 2222);
        assert_eq!(descriptor.host, "cluster");
    }

    #[test]
    fn test_username_required() {
        let config = ExecutorConfig {
            hpc: Some(hpc("hpc-login01")),
        };
        let err = create_dispatcher(&config, &ResourcePlan::default()).unwrap_err();
        assert!(err.to_string().contains("Username is required"));
    }

    #[test]
    fn test_scheduler_required() {
        let mut config = hpc("john@hpc");
        config.slurm = None;
        assert!(config.context_type().is_err());

        config.pbs = Some(SchedulerOptions::default());
        assert_eq!(config.context_type().unwrap(), ContextType::Pbs);
    }

    #[test]
    fn test_no_hpc_section() {
        assert!(create_dispatcher(&ExecutorConfig::default(), &ResourcePlan::default()).is_err());
    }

    #[test]
    fn test_deserialize_from_toml() {
        let config: ExecutorConfig = toml::from_str(
            r#"
            [hpc]
            url = "john@hpc-login01"

            [hpc.lsf]
            project = "mlp"
            "#,
        )
        .unwrap();
        let hpc = config.hpc.unwrap();
        assert_eq!(hpc.context_type().unwrap(), ContextType::Lsf);
        assert_eq!(hpc.lsf.unwrap().options["project"], "mlp");
    }
}
