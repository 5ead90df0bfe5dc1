//! Cluster scheduler backend: a Deployment plus a Service per relay,
//! driven through the Kubernetes REST API

use crate::{
    api_error, workload_name, OrchestratorBackend, OrchestratorError, OrchestratorKind,
    RelayDeployment, DEFAULT_NAME_PREFIX,
};
use async_trait::async_trait;
use bytes::Bytes;
use relaydeck_proto::{OrchestratorSnapshot, RelayStatus, WorkloadDetails};
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const FIELD_MANAGER: &str = "relaydeck";

/// Pod template annotation whose change rolls the pods
const RESTARTED_AT_ANNOTATION: &str = "relaydeck.dev/restartedAt";

/// Kubernetes backend configuration
#[derive(Debug, Clone)]
pub struct KubernetesConfig {
    /// API server base URL
    pub api_url: String,
    pub namespace: String,
    /// Bearer token (service account token when running in-cluster)
    pub token: Option<String>,
    /// PEM bundle used to verify the API server
    pub ca_cert_path: Option<PathBuf>,
    /// Relay image
    pub image: String,
    /// Service type exposing the relay (`ClusterIP`, `NodePort`, `LoadBalancer`)
    pub service_type: String,
    pub name_prefix: String,
    /// Bound on every API call
    pub timeout: Duration,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            api_url: "https://kubernetes.default.svc".to_string(),
            namespace: "default".to_string(),
            token: None,
            ca_cert_path: None,
            image: "nikoceps/wpex-monitoring:latest".to_string(),
            service_type: "ClusterIP".to_string(),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl KubernetesConfig {
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_ca_cert_path(mut self, path: Option<PathBuf>) -> Self {
        self.ca_cert_path = path;
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
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

pub struct KubernetesBackend {
    config: KubernetesConfig,
    client: Client,
}

impl KubernetesBackend {
    pub fn new(config: KubernetesConfig) -> Result<Self, OrchestratorError> {
        let mut builder = Client::builder().timeout(config.timeout);

        if let Some(path) = &config.ca_cert_path {
            let pem = std::fs::read(path).map_err(|e| {
                OrchestratorError::Config(format!("Failed to read CA bundle {}: {}", path.display(), e))
            })?;
            let cert = reqwest::Certificate::from_pem(&pem)
                .map_err(|e| OrchestratorError::Config(format!("Invalid CA bundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }

        let client = builder
            .build()
            .map_err(|e| OrchestratorError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn name(&self, relay_name: &str) -> String {
        workload_name(&self.config.name_prefix, relay_name)
    }

    fn deployments_path(&self) -> String {
        format!("/apis/apps/v1/namespaces/{}/deployments", self.config.namespace)
    }

    fn services_path(&self) -> String {
        format!("/api/v1/namespaces/{}/services", self.config.namespace)
    }

    fn pods_path(&self) -> String {
        format!("/api/v1/namespaces/{}/pods", self.config.namespace)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.config.api_url.trim_end_matches('/'), path);
        let builder = self.client.request(method, url);
        match &self.config.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<(u16, Bytes), OrchestratorError> {
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                OrchestratorError::Timeout(self.config.timeout)
            } else {
                OrchestratorError::Unavailable(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| OrchestratorError::Unavailable(e.to_string()))?;
        Ok((status, body))
    }

    async fn get_json(&self, path: &str) -> Result<Option<Value>, OrchestratorError> {
        let (status, body) = self.send(self.request(Method::GET, path)).await?;
        match status {
            404 => Ok(None),
            200..=299 => serde_json::from_slice(&body)
                .map(Some)
                .map_err(|e| OrchestratorError::InvalidResponse(e.to_string())),
            s => Err(api_error(s, &body)),
        }
    }

    async fn list_pods(&self, name: &str) -> Result<Value, OrchestratorError> {
        let path = format!("{}?labelSelector=app%3D{}", self.pods_path(), name);
        Ok(self.get_json(&path).await?.unwrap_or_else(|| json!({"items": []})))
    }

    /// Server-side apply: creates the object or updates it in place
    async fn apply(&self, collection: &str, name: &str, manifest: &Value) -> Result<(), OrchestratorError> {
        let path = format!(
            "{}/{}?fieldManager={}&force=true",
            collection, name, FIELD_MANAGER
        );
        let builder = self
            .request(Method::PATCH, &path)
            .header(reqwest::header::CONTENT_TYPE, "application/apply-patch+yaml")
            .body(manifest.to_string());

        let (status, body) = self.send(builder).await?;
        if (200..300).contains(&status) {
            Ok(())
        } else {
            Err(api_error(status, &body))
        }
    }

    async fn delete(&self, collection: &str, name: &str) -> Result<(), OrchestratorError> {
        let path = format!("{}/{}?propagationPolicy=Background", collection, name);
        let (status, body) = self.send(self.request(Method::DELETE, &path)).await?;
        match status {
            200..=299 | 404 => Ok(()),
            s => Err(api_error(s, &body)),
        }
    }

    async fn merge_patch(&self, path: &str, name: &str, patch: Value) -> Result<(), OrchestratorError> {
        let builder = self
            .request(Method::PATCH, path)
            .header(reqwest::header::CONTENT_TYPE, "application/merge-patch+json")
            .body(patch.to_string());

        let (status, body) = self.send(builder).await?;
        match status {
            200..=299 => Ok(()),
            404 => Err(OrchestratorError::NotFound(name.to_string())),
            s => Err(api_error(s, &body)),
        }
    }

    async fn scale(&self, relay_name: &str, replicas: u32) -> Result<(), OrchestratorError> {
        let name = self.name(relay_name);
        let path = format!("{}/{}/scale", self.deployments_path(), name);
        self.merge_patch(&path, &name, json!({"spec": {"replicas": replicas}}))
            .await
    }

    pub fn deployment_manifest(&self, deployment: &RelayDeployment) -> Value {
        let name = self.name(&deployment.relay_name);
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": name,
                "namespace": self.config.namespace,
                "labels": {"app": name, "relaydeck.relay": deployment.relay_name}
            },
            "spec": {
                "replicas": 1,
                "selector": {"matchLabels": {"app": name}},
                "template": {
                    "metadata": {"labels": {"app": name}},
                    "spec": {
                        "containers": [{
                            "name": "relay",
                            "image": self.config.image,
                            "args": deployment.command_args(),
                            "ports": [
                                {"name": "wg", "containerPort": deployment.udp_port, "protocol": "UDP"},
                                {"name": "stats", "containerPort": deployment.stats_port, "protocol": "TCP"}
                            ],
                            "readinessProbe": {
                                "tcpSocket": {"port": deployment.stats_port},
                                "periodSeconds": 10
                            }
                        }]
                    }
                }
            }
        })
    }

    pub fn service_manifest(&self, deployment: &RelayDeployment) -> Value {
        let name = self.name(&deployment.relay_name);
        json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": name,
                "namespace": self.config.namespace,
                "labels": {"app": name, "relaydeck.relay": deployment.relay_name}
            },
            "spec": {
                "type": self.config.service_type,
                "selector": {"app": name},
                "ports": [
                    {"name": "wg", "port": deployment.udp_port, "targetPort": deployment.udp_port, "protocol": "UDP"},
                    {"name": "stats", "port": deployment.stats_port, "targetPort": deployment.stats_port, "protocol": "TCP"}
                ]
            }
        })
    }
}

/// Reduce a Deployment and its pods to a snapshot.
///
/// Zero desired replicas is `stopped`; at least one ready replica is
/// `running`; anything scheduled but not yet ready is `starting`. The
/// restart counter is the sum over every container of every pod.
pub fn derive_snapshot(deployment: &Value, pods: &Value) -> OrchestratorSnapshot {
    let desired = deployment
        .pointer("/spec/replicas")
        .and_then(Value::as_u64)
        .unwrap_or(1);
    let ready = deployment
        .pointer("/status/readyReplicas")
        .and_then(Value::as_u64)
        .unwrap_or(0);

    let status = if desired == 0 {
        RelayStatus::Stopped
    } else if ready > 0 {
        RelayStatus::Running
    } else {
        RelayStatus::Starting
    };

    let items = pods
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    let restarts: u64 = items
        .iter()
        .filter_map(|pod| pod.pointer("/status/containerStatuses").and_then(Value::as_array))
        .flatten()
        .filter_map(|c| c.get("restartCount").and_then(Value::as_u64))
        .sum();

    let started_at = select_pod(items)
        .and_then(|pod| pod.pointer("/status/startTime"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let image = deployment
        .pointer("/spec/template/spec/containers/0/image")
        .and_then(Value::as_str)
        .map(str::to_string);

    OrchestratorSnapshot {
        status,
        restart_count: u32::try_from(restarts).unwrap_or(u32::MAX),
        started_at,
        image,
    }
}

/// Deployment, pods and namespace reduced to operator detail
pub fn derive_details(name: &str, namespace: &str, deployment: &Value, pods: &Value) -> WorkloadDetails {
    let snapshot = derive_snapshot(deployment, pods);
    let items = pods
        .get("items")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let pod = select_pod(items);
    let text = |doc: Option<&Value>, pointer: &str| {
        doc.and_then(|d| d.pointer(pointer))
            .and_then(Value::as_str)
            .map(str::to_string)
    };

    let ports = deployment
        .pointer("/spec/template/spec/containers/0/ports")
        .and_then(Value::as_array)
        .map(|ports| {
            ports
                .iter()
                .filter_map(|p| {
                    let port = p.get("containerPort").and_then(Value::as_u64)?;
                    let protocol = p.get("protocol").and_then(Value::as_str).unwrap_or("TCP");
                    Some(format!("{}/{}", port, protocol.to_ascii_lowercase()))
                })
                .collect()
        })
        .unwrap_or_default();

    let health = pod
        .and_then(|p| p.pointer("/status/conditions"))
        .and_then(Value::as_array)
        .and_then(|conditions| {
            conditions
                .iter()
                .find(|c| c.get("type").and_then(Value::as_str) == Some("Ready"))
        })
        .and_then(|c| c.get("status").and_then(Value::as_str))
        .map(|ready| if ready == "True" { "healthy" } else { "unhealthy" }.to_string());

    let mut details = WorkloadDetails::new(name, snapshot.status);
    details.restart_count = snapshot.restart_count;
    details.image = snapshot.image;
    details.started_at = snapshot.started_at;
    details.created_at = text(Some(deployment), "/metadata/creationTimestamp");
    details.finished_at = text(pod, "/status/containerStatuses/0/lastState/terminated/finishedAt");
    details.restart_policy = text(Some(deployment), "/spec/template/spec/restartPolicy")
        .or_else(|| Some("Always".to_string()));
    details.ports = ports;
    details.network = Some(namespace.to_string());
    details.health = health;
    details
}

/// Prefer a running pod, else the first listed
fn select_pod(items: &[Value]) -> Option<&Value> {
    items
        .iter()
        .find(|pod| pod.pointer("/status/phase").and_then(Value::as_str) == Some("Running"))
        .or_else(|| items.first())
}

#[async_trait]
impl OrchestratorBackend for KubernetesBackend {
    fn kind(&self) -> OrchestratorKind {
        OrchestratorKind::Kubernetes
    }

    async fn inspect(&self, relay_name: &str) -> Result<OrchestratorSnapshot, OrchestratorError> {
        let name = self.name(relay_name);
        let path = format!("{}/{}", self.deployments_path(), name);

        let Some(deployment) = self.get_json(&path).await? else {
            return Ok(OrchestratorSnapshot::not_created());
        };
        let pods = self.list_pods(&name).await?;

        Ok(derive_snapshot(&deployment, &pods))
    }

    async fn deploy(&self, deployment: &RelayDeployment) -> Result<(), OrchestratorError> {
        let name = self.name(&deployment.relay_name);

        self.apply(&self.deployments_path(), &name, &self.deployment_manifest(deployment))
            .await?;
        self.apply(&self.services_path(), &name, &self.service_manifest(deployment))
            .await?;

        info!(
            deployment = %name,
            namespace = %self.config.namespace,
            keys = deployment.allowed_keys.len(),
            "Relay workload applied"
        );
        Ok(())
    }

    async fn remove(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        let name = self.name(relay_name);
        self.delete(&self.deployments_path(), &name).await?;
        self.delete(&self.services_path(), &name).await?;
        debug!(deployment = %name, "Relay workload removed");
        Ok(())
    }

    async fn start(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        self.scale(relay_name, 1).await
    }

    async fn stop(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        self.scale(relay_name, 0).await
    }

    /// Rolling restart: bump a pod template annotation
    async fn restart(&self, relay_name: &str) -> Result<(), OrchestratorError> {
        let name = self.name(relay_name);
        let path = format!("{}/{}", self.deployments_path(), name);
        let patch = json!({
            "spec": {"template": {"metadata": {"annotations": {
                RESTARTED_AT_ANNOTATION: chrono::Utc::now().to_rfc3339()
            }}}}
        });
        self.merge_patch(&path, &name, patch).await?;
        info!(deployment = %name, "Relay workload restarted");
        Ok(())
    }

    async fn details(&self, relay_name: &str) -> Result<WorkloadDetails, OrchestratorError> {
        let name = self.name(relay_name);
        let path = format!("{}/{}", self.deployments_path(), name);

        let deployment = self
            .get_json(&path)
            .await?
            .ok_or_else(|| OrchestratorError::NotFound(name.clone()))?;
        let pods = self.list_pods(&name).await?;

        Ok(derive_details(&name, &self.config.namespace, &deployment, &pods))
    }

    async fn logs(&self, relay_name: &str, tail: usize) -> Result<Vec<String>, OrchestratorError> {
        let name = self.name(relay_name);
        let pods = self.list_pods(&name).await?;
        let items = pods
            .get("items")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let pod_name = select_pod(items)
            .and_then(|pod| pod.pointer("/metadata/name"))
            .and_then(Value::as_str)
            .ok_or_else(|| OrchestratorError::NotFound(name.clone()))?;

        let path = format!(
            "{}/{}/log?tailLines={}&timestamps=true",
            self.pods_path(),
            pod_name,
            tail
        );
        let (status, body) = self.send(self.request(Method::GET, &path)).await?;
        match status {
            200..=299 => Ok(String::from_utf8_lossy(&body)
                .lines()
                .map(str::to_string)
                .collect()),
            404 => Err(OrchestratorError::NotFound(name)),
            s => Err(api_error(s, &body)),
        }
    }
}
