//! Single-host daemon backend: the Docker Engine API over its unix socket

use crate::{
    workload_name, OrchestratorBackend, OrchestratorError, OrchestratorKind, RelayDeployment,
    DEFAULT_NAME_PREFIX,
};
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, LogsOptions,
    RemoveContainerOptions, RestartContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::models::{
    ContainerInspectResponse, HostConfig, PortBinding, RestartPolicy, RestartPolicyNameEnum,
};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use relaydeck_proto::{OrchestratorSnapshot, RelayStatus, WorkloadDetails};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// Seconds the daemon waits for a graceful stop before killing the relay
const STOP_GRACE_SECS: i64 = 10;

/// Docker backend configuration
#[derive(Debug, Clone)]
pub struct DockerConfig {
    /// Path of the daemon socket
    pub socket_path: PathBuf,
    /// Relay image
    pub image: String,
    /// Network the relay containers join (the control plane must share it
    /// to reach the stats endpoint by container name)
    pub network: Option<String>,
    pub name_prefix: String,
    /// Bound on every daemon call
    pub timeout: Duration,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket_path: PathBuf::from("/var/run/docker.sock"),
            image: "nikoceps/wpex-monitoring:latest".to_string(),
            network: Some("wpex_wpex-network".to_string()),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl DockerConfig {
    pub fn with_socket_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.socket_path = path.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_network(mut self, network: Option<String>) -> Self {
        self.network = network;
        self
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct DockerBackend {
    config: DockerConfig,
    /// Connected on first use so a daemon that starts later is picked up
    client: OnceCell<Docker>,
}

impl DockerBackend {
    pub fn new(config: DockerConfig) -> Self {
        Self {
            config,
            client: OnceCell::new(),
        }
    }

    fn container_name(&self, relay_name: &str) -> String {
        workload_name(&self.config.name_prefix, relay_name)
    }

    async fn client(&self) -> Result<&Docker, OrchestratorError> {
        self.client
            .get_or_try_init(|| async {
                let socket = self.config.socket_path.to_string_lossy();
                let timeout_secs = self.config.timeout.as_secs().max(1);
                Docker::connect_with_socket(&socket, timeout_secs, API_DEFAULT_VERSION).map_err(
                    |e| {
                        OrchestratorError::Unavailable(format!(
                            "Failed to connect to {}: {}",
                            socket, e
                        ))
                    },
                )
            })
            .await
    }

    /// Bound a daemon call by the configured timeout
    async fn call<T, F>(&self, container: &str, call: F) -> Result<T, OrchestratorError>
    where
        F: Future<Output = Result<T, DockerError>>,
    {
        let timeout = self.config.timeout;
        tokio::time::timeout(timeout, call)
            .await
            .map_err(|_| OrchestratorError::Timeout(timeout))?
            .map_err(|e| docker_error(container, e))
    }

    async fn inspect_container(
        &self,
        container: &str,
    ) -> Result<Option<ContainerInspectResponse>, OrchestratorError> {
        let docker = self.client().await?;
        match self
            .call(
                container,
                docker.inspect_container(container, None::<InspectContainerOptions>),
            )
            .await
        {
            Ok(response) => Ok(Some(response)),
            Err(OrchestratorError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Force-remove a container, tolerating one that does not exist
    async fn force_remove(&self, container: &str) -> Result<(), OrchestratorError> {
        let docker = self.client().await?;
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };
        match self
            .call(container, docker.remove_container(container, Some(options)))
            .await
        {
            Ok(()) => {
                debug!(container = %container, "Removed container");
                Ok(())
            }
            Err(OrchestratorError::NotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Container create configuration
    pub fn container_config(&self, deployment: &RelayDeployment) -> Config<String> {
        let port_key = format!("{}/udp", deployment.udp_port);

        let port_bindings = HashMap::from([(
            port_key.clone(),
            Some(vec![PortBinding {
                host_ip: None,
                host_port: Some(deployment.udp_port.to_string()),
            }]),
        )]);

        Config {
            image: Some(self.config.image.clone()),
            cmd: Some(deployment.command_args()),
            labels: Some(HashMap::from([(
                "relaydeck.relay".to_string(),
                deployment.relay_name.clone(),
            )])),
            exposed_ports: Some(HashMap::from([(port_key, HashMap::new())])),
            host_config: Some(HostConfig {
                port_bindings: Some(port_bindings),
                restart_policy: Some(RestartPolicy {
                    name: Some(RestartPolicyNameEnum::ALWAYS),
                    maximum_retry_count: None,
                }),
                network_mode: self.config.network.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

/// 404 is a missing container; other daemon answers keep their status code.
/// Anything that never reached the daemon is `Unavailable`.
fn docker_error(container: &str, error: DockerError) -> OrchestratorError {
    match error {
        DockerError::DockerResponseServerError {
            status_code: 404, ..
        } => OrchestratorError::NotFound(container.to_string()),
        DockerError::DockerResponseServerError {
            status_code,
            message,
        } => OrchestratorError::Api {
            status: status_code,
            message,
        },
        other => OrchestratorError::Unavailable(other.to_string()),
    }
}

/// 304 answers a start or stop that was already in effect
fn not_modified(result: Result<(), OrchestratorError>) -> Result<(), OrchestratorError> {
    match result {
        Err(OrchestratorError::Api { status: 304, .. }) => Ok(()),
        other => other,
    }
}

/// Wire name of a generated enum (`running`, `unless-stopped`, ...)
fn enum_name<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.is_empty())
}

/// The daemon reports the zero time for containers that never started
fn platform_time(value: Option<&String>) -> Option<String> {
    value
        .filter(|s| !s.is_empty() && !s.starts_with("0001-"))
        .cloned()
}

/// Reduce an inspect response to a snapshot.
///
/// The daemon's state string is passed through verbatim; only `running`
/// maps to a named variant that the scorer treats as healthy.
pub fn snapshot_from_inspect(response: &ContainerInspectResponse) -> OrchestratorSnapshot {
    let state = response.state.as_ref();

    let status = state
        .and_then(|s| s.status.as_ref())
        .and_then(enum_name)
        .map(RelayStatus::from)
        .unwrap_or(RelayStatus::Unknown);

    let restart_count = response
        .restart_count
        .map(|n| u32::try_from(n.max(0)).unwrap_or(u32::MAX))
        .unwrap_or(0);

    OrchestratorSnapshot {
        status,
        restart_count,
        started_at: platform_time(state.and_then(|s| s.started_at.as_ref())),
        image: response.config.as_ref().and_then(|c| c.image.clone()),
    }
}

pub fn details_from_inspect(container: &str, response: &ContainerInspectResponse) -> WorkloadDetails {
    let snapshot = snapshot_from_inspect(response);
    let state = response.state.as_ref();
    let host_config = response.host_config.as_ref();

    let mut ports: Vec<String> = host_config
        .and_then(|h| h.port_bindings.as_ref())
        .map(|bindings| {
            bindings
                .iter()
                .flat_map(|(container_port, hosts)| {
                    hosts.iter().flatten().map(move |binding| {
                        format!(
                            "{}:{}",
                            binding.host_port.as_deref().unwrap_or(""),
                            container_port
                        )
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    ports.sort();

    let mut details = WorkloadDetails::new(container, snapshot.status);
    details.restart_count = snapshot.restart_count;
    details.image = snapshot.image;
    details.started_at = snapshot.started_at;
    details.created_at = response.created.clone();
    details.finished_at = platform_time(state.and_then(|s| s.finished_at.as_ref()));
    details.restart_policy = host_config
        .and_then(|h| h.restart_policy.as_ref())
        .and_then(|p| p.name.as_ref())
        .and_then(enum_name);
    details.ports = ports;
    details.network = host_config.and_then(|h| h.network_mode.clone());
    details.health = state
        .and_then(|s| s.health.as_ref())
        .and_then(|h| h.status.as_ref())
        .and_then(enum_name);
    details
}

#[async_trait]
impl OrchestratorBackend for DockerBackend {
    fn kind(&self) -> OrchestratorKind {
        OrchestratorKind::Docker
    }

    async fn inspect(&self, relay_name: &str) -> Result<OrchestratorSnapshot, OrchestratorError> {
        let container = self.container_name(relay_name);
        Ok(self
            .inspect_container(&container)
            .await?
            .map(|response| snapshot_from_inspect(&response))
            .unwrap_or_else(OrchestratorSnapshot::not_created))
    }

    async fn deploy(&self, deployment: &RelayDeployment) -> Result<(), OrchestratorError> {
        let container = self.container_name(&deployment.relay_name);

        // Replace any previous incarnation
        self.force_remove(&container).await?;

        let docker = self.client().await?;
        let options = CreateContainerOptions {
            name: container.clone(),
            platform: None,
        };
        self.call(
            &container,
            docker.create_container(Some(options), self.container_config(deployment)),
        )
        .await?;

        self.start(&deployment.relay_name).await?;

        info!(
            container = %container,
            udp_port = deployment.udp_port,
            keys = deployment.allowed_keys.len(),
            "Relay container deployed"
        );
        Ok(())
    }

    async fn remove(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        self.force_remove(&self.container_name(relay_name)).await
    }

    async fn start(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        let container = self.container_name(relay_name);
        let docker = self.client().await?;
        not_modified(
            self.call(
                &container,
                docker.start_container(&container, None::<StartContainerOptions<String>>),
            )
            .await,
        )
    }

    async fn stop(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        let container = self.container_name(relay_name);
        let docker = self.client().await?;
        let options = StopContainerOptions { t: STOP_GRACE_SECS };
        not_modified(
            self.call(&container, docker.stop_container(&container, Some(options)))
                .await,
        )
    }

    async fn restart(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        let container = self.container_name(relay_name);
        let docker = self.client().await?;
        let options = RestartContainerOptions {
            t: STOP_GRACE_SECS as isize,
        };
        self.call(&container, docker.restart_container(&container, Some(options)))
            .await?;
        info!(container = %container, "Relay container restarted");
        Ok(())
    }

    async fn logs(&self, relay_name: &str, tail: usize) -> Result<Vec<String>, OrchestratorError> {
        let container = self.container_name(relay_name);
        let docker = self.client().await?;
        let options = LogsOptions::<String> {
            stdout: true,
            stderr: true,
            timestamps: true,
            tail: tail.to_string(),
            ..Default::default()
        };

        // Frames are demultiplexed by the client; collect until the stream ends
        let collect = async {
            let mut stream = std::pin::pin!(docker.logs(&container, Some(options)));
            let mut text = String::new();
            while let Some(chunk) = stream.next().await {
                text.push_str(&chunk?.to_string());
            }
            Ok::<_, DockerError>(text)
        };
        let text = self.call(&container, collect).await?;

        let lines: Vec<String> = text.lines().map(str::to_string).collect();
        let skip = lines.len().saturating_sub(tail);
        Ok(lines.into_iter().skip(skip).collect())
    }

    async fn details(&self, relay_name: &str) -> Result<WorkloadDetails, OrchestratorError> {
        let container = self.container_name(relay_name);
        let response = self
            .inspect_container(&container)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(container.clone()))?;
        Ok(details_from_inspect(&container, &response))
    }
}
