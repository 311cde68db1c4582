//! Drives `swift-ring-builder` from a stored cluster topology.
//!
//! For every ring of a cluster a [`RingBuildPlan`] lists the builder
//! invocations: `create`, one `add` per device, then `rebalance`.
//! [`RingBuilder`] runs the plans. A ring whose builder file already
//! exists is left alone.

use crate::core::RingError;
use crate::facade::{ClusterTopology, RingTopology};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum BuildError {
    #[error(transparent)]
    Topology(#[from] RingError),

    #[error("Failed to start {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed:\n{output}")]
    CommandFailed { command: String, output: String },

    #[error("Ring name {ring:?} would put its builder file outside {}", dir.display())]
    UnsafeRingName { ring: String, dir: PathBuf },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuilderSettings {
    pub binary: PathBuf,
    /// Builder files go to `<work_dir>/<cluster id>/<ring name>.builder`
    pub work_dir: PathBuf,
    pub part_power: u32,
    pub replicas: u32,
    pub min_part_hours: u32,
}

impl Default for BuilderSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("/usr/bin/swift-ring-builder"),
            work_dir: PathBuf::from("/tmp/ringmanager"),
            part_power: 10,
            replicas: 3,
            min_part_hours: 1,
        }
    }
}

/// Builder invocations for one ring, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RingBuildPlan {
    pub ring_name: String,
    pub builder_file: PathBuf,
    pub commands: Vec<Vec<String>>,
}

impl RingBuildPlan {
    pub fn for_ring(cluster_id: &str, ring: &RingTopology, settings: &BuilderSettings) -> Self {
        let builder_file = settings
            .work_dir
            .join(cluster_id)
            .join(format!("{}.builder", ring.name));
        let file = builder_file.to_string_lossy().into_owned();

        let mut commands = vec![vec![
            file.clone(),
            "create".to_string(),
            settings.part_power.to_string(),
            settings.replicas.to_string(),
            settings.min_part_hours.to_string(),
        ]];
        for node in &ring.nodes {
            for device in &node.devices {
                // e.g. r1z1-127.0.0.1:6010/sdb1
                let target = format!(
                    "r{}z{}-{}:{}/{}",
                    node.region, node.zone, node.ip, node.port, device.name
                );
                commands.push(vec![
                    file.clone(),
                    "add".to_string(),
                    target,
                    device.weight.target.to_string(),
                ]);
            }
        }
        commands.push(vec![file, "rebalance".to_string()]);

        Self {
            ring_name: ring.name.clone(),
            builder_file,
            commands,
        }
    }
}

/// What happened to one ring in a cluster build
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "status")]
pub enum RingBuildOutcome {
    Built { ring: String, builder_file: PathBuf },
    Skipped { ring: String, builder_file: PathBuf },
}

pub struct RingBuilder {
    settings: BuilderSettings,
}

impl RingBuilder {
    pub fn new(settings: BuilderSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &BuilderSettings {
        &self.settings
    }

    pub fn plan(&self, topology: &ClusterTopology) -> Vec<RingBuildPlan> {
        topology
            .rings
            .iter()
            .map(|ring| RingBuildPlan::for_ring(&topology.id, ring, &self.settings))
            .collect()
    }

    /// Build every ring of the cluster that has no builder file yet
    pub async fn build_cluster(
        &self,
        topology: &ClusterTopology,
    ) -> Result<Vec<RingBuildOutcome>, BuildError> {
        let cluster_dir = self.settings.work_dir.join(&topology.id);
        tokio::fs::create_dir_all(&cluster_dir)
            .await
            .map_err(|source| BuildError::Io {
                path: cluster_dir.clone(),
                source,
            })?;

        let mut outcomes = Vec::with_capacity(topology.rings.len());
        for plan in self.plan(topology) {
            if plan.builder_file.parent() != Some(cluster_dir.as_path()) {
                return Err(BuildError::UnsafeRingName {
                    ring: plan.ring_name,
                    dir: cluster_dir,
                });
            }
            if path_exists(&plan.builder_file).await? {
                debug!(ring = %plan.ring_name, file = %plan.builder_file.display(), "builder exists, skipping");
                outcomes.push(RingBuildOutcome::Skipped {
                    ring: plan.ring_name,
                    builder_file: plan.builder_file,
                });
                continue;
            }

            for args in &plan.commands {
                self.run(args).await?;
            }
            info!(ring = %plan.ring_name, file = %plan.builder_file.display(), "ring built");
            outcomes.push(RingBuildOutcome::Built {
                ring: plan.ring_name,
                builder_file: plan.builder_file,
            });
        }
        Ok(outcomes)
    }

    async fn run(&self, args: &[String]) -> Result<(), BuildError> {
        let binary = self.settings.binary.display().to_string();
        let command = format!("{} {}", binary, args.join(" "));
        debug!(%command, "running");

        let output = Command::new(&self.settings.binary)
            .args(args)
            .output()
            .await
            .map_err(|source| BuildError::Spawn {
                binary: binary.clone(),
                source,
            })?;

        if output.status.success() {
            return Ok(());
        }
        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Err(BuildError::CommandFailed {
            command,
            output: combined,
        })
    }
}

async fn path_exists(path: &Path) -> Result<bool, BuildError> {
    tokio::fs::try_exists(path).await.map_err(|source| BuildError::Io {
        path: path.to_path_buf(),
        source,
    })
}
