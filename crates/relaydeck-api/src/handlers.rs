use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use relaydeck_control::{
    CreateKey, CreateRelay, CreateTenant, KeyStoreError, MonitorError, ProvisionError,
    TenantStoreError, UpdateTenant,
};
use relaydeck_orchestrator::{OrchestratorError, DEFAULT_LOG_TAIL};
use relaydeck_proto::ScopeError;
use sea_orm::SqlErr;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::middleware::AuthUser;
use crate::models::*;
use crate::AppState;

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Upper bound on `?tail=`
const MAX_LOG_TAIL: usize = 500;

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: Some(code.to_string()),
        }),
    )
}

fn scope_error(e: ScopeError) -> ApiError {
    api_error(StatusCode::FORBIDDEN, e.to_string(), "FORBIDDEN")
}

fn monitor_error(e: MonitorError) -> ApiError {
    match e {
        MonitorError::Scope(e) => scope_error(e),
        MonitorError::RelayNotFound(_) => {
            api_error(StatusCode::NOT_FOUND, e.to_string(), "RELAY_NOT_FOUND")
        }
        MonitorError::TenantNotFound(_) => {
            api_error(StatusCode::NOT_FOUND, e.to_string(), "TENANT_NOT_FOUND")
        }
        MonitorError::Source(e) => {
            error!("Fleet query failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Database error: {}", e),
                "DATABASE_ERROR",
            )
        }
    }
}

fn provision_error(e: ProvisionError) -> ApiError {
    match e {
        ProvisionError::Scope(e) => scope_error(e),
        ProvisionError::RelayNotFound(_) => {
            api_error(StatusCode::NOT_FOUND, e.to_string(), "RELAY_NOT_FOUND")
        }
        ProvisionError::InvalidName(_) | ProvisionError::InvalidPort(_) => {
            api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_REQUEST")
        }
        ProvisionError::UnknownKey(_) => {
            api_error(StatusCode::BAD_REQUEST, e.to_string(), "KEY_NOT_FOUND")
        }
        ProvisionError::KeyMaterial { .. } => {
            error!("Relay write failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "KEY_MATERIAL_ERROR",
            )
        }
        ProvisionError::Database(ref db) => {
            if let Some(SqlErr::UniqueConstraintViolation(detail)) = db.sql_err() {
                return api_error(
                    StatusCode::CONFLICT,
                    format!("Relay name or port already in use: {}", detail),
                    "RELAY_CONFLICT",
                );
            }
            error!("Relay write failed: {}", db);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "DATABASE_ERROR",
            )
        }
        ProvisionError::Orchestrator(OrchestratorError::NotFound(ref name)) => api_error(
            StatusCode::NOT_FOUND,
            format!("Workload for relay '{}' not found", name),
            "WORKLOAD_NOT_FOUND",
        ),
        ProvisionError::Orchestrator(ref inner) => {
            warn!("Orchestrator call failed: {}", inner);
            api_error(StatusCode::BAD_GATEWAY, e.to_string(), "ORCHESTRATOR_ERROR")
        }
    }
}

fn key_store_error(e: KeyStoreError) -> ApiError {
    match e {
        KeyStoreError::Scope(e) => scope_error(e),
        KeyStoreError::NotFound(_) => {
            api_error(StatusCode::NOT_FOUND, e.to_string(), "KEY_NOT_FOUND")
        }
        KeyStoreError::Invalid(_) => {
            api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_REQUEST")
        }
        KeyStoreError::Seal(_) | KeyStoreError::Database(_) => {
            error!("Key store failed: {}", e);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "INTERNAL_ERROR",
            )
        }
    }
}

fn tenant_store_error(e: TenantStoreError) -> ApiError {
    match e {
        TenantStoreError::Scope(e) => scope_error(e),
        TenantStoreError::NotFound(_) => {
            api_error(StatusCode::NOT_FOUND, e.to_string(), "TENANT_NOT_FOUND")
        }
        TenantStoreError::Invalid(_) => {
            api_error(StatusCode::BAD_REQUEST, e.to_string(), "INVALID_REQUEST")
        }
        TenantStoreError::Database(ref db) => {
            if let Some(SqlErr::UniqueConstraintViolation(detail)) = db.sql_err() {
                return api_error(
                    StatusCode::CONFLICT,
                    format!("Tenant name or slug already in use: {}", detail),
                    "TENANT_CONFLICT",
                );
            }
            error!("Tenant write failed: {}", db);
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                e.to_string(),
                "DATABASE_ERROR",
            )
        }
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "system"
)]
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        orchestrator: state.provisioner.orchestrator_kind().to_string(),
        monitoring_enabled: state.poller.is_some(),
        timestamp: chrono::Utc::now(),
    })
}

/// Fleet KPIs for the caller's scope
#[utoipa::path(
    get,
    path = "/api/dashboard/kpi",
    responses(
        (status = 200, description = "Fleet summary", body = FleetSummary),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller scope rejected", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn dashboard_kpi(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<FleetSummary>, ApiError> {
    debug!(role = %user.scope.role, "Computing fleet KPIs");
    state
        .monitor
        .summary(&user.scope)
        .await
        .map(Json)
        .map_err(monitor_error)
}

/// Threshold alerts for the caller's scope
#[utoipa::path(
    get,
    path = "/api/dashboard/alerts",
    responses(
        (status = 200, description = "Current alerts", body = AlertReport),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller scope rejected", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn dashboard_alerts(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<AlertReport>, ApiError> {
    state
        .monitor
        .alerts(&user.scope)
        .await
        .map(Json)
        .map_err(monitor_error)
}

/// Key-to-relay topology graph for the caller's scope
#[utoipa::path(
    get,
    path = "/api/dashboard/topology",
    responses(
        (status = 200, description = "Topology graph", body = TopologyGraph),
        (status = 401, description = "Not authenticated", body = ErrorResponse),
        (status = 403, description = "Caller scope rejected", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "dashboard"
)]
pub async fn dashboard_topology(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TopologyGraph>, ApiError> {
    state
        .monitor
        .topology(&user.scope)
        .await
        .map(Json)
        .map_err(monitor_error)
}

/// List relays with their keys and live status
#[utoipa::path(
    get,
    path = "/api/relays",
    responses(
        (status = 200, description = "Relays in scope", body = RelayList),
        (status = 403, description = "Caller scope rejected", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn list_relays(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<RelayList>, ApiError> {
    let relays = state
        .provisioner
        .list(&user.scope)
        .await
        .map_err(provision_error)?;
    let total = relays.len();
    Ok(Json(RelayList { relays, total }))
}

/// Provision a relay and deploy its workload
#[utoipa::path(
    post,
    path = "/api/relays",
    request_body = CreateRelayRequest,
    responses(
        (status = 201, description = "Relay created", body = RelayWriteResponse),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Role may not create relays", body = ErrorResponse),
        (status = 409, description = "Name or port already in use", body = ErrorResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn create_relay(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateRelayRequest>,
) -> Result<(StatusCode, Json<RelayWriteResponse>), ApiError> {
    info!(subject = %user.subject, name = %req.name, "Creating relay");

    let outcome = state
        .provisioner
        .create(
            &user.scope,
            CreateRelay {
                name: req.name,
                udp_port: req.udp_port,
                key_ids: req.key_ids,
                tenant_id: req.tenant_id,
                region: req.region,
                description: req.description,
            },
        )
        .await
        .map_err(provision_error)?;

    Ok((
        StatusCode::CREATED,
        Json(RelayWriteResponse {
            id: outcome.relay_id,
            name: outcome.name,
            web_port: outcome.web_port,
            warning: outcome.warning,
        }),
    ))
}

/// Delete a relay and its workload
#[utoipa::path(
    delete,
    path = "/api/relays/{id}",
    params(
        ("id" = i32, Path, description = "Relay ID")
    ),
    responses(
        (status = 200, description = "Relay deleted", body = RelayActionResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Relay not found", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn delete_relay(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<RelayActionResponse>, ApiError> {
    let name = state
        .provisioner
        .delete(&user.scope, id)
        .await
        .map_err(provision_error)?;
    Ok(Json(RelayActionResponse {
        id,
        message: format!("Relay {} deleted", name),
    }))
}

/// Replace a relay's keys and redeploy it
#[utoipa::path(
    put,
    path = "/api/relays/{id}/keys",
    params(
        ("id" = i32, Path, description = "Relay ID")
    ),
    request_body = UpdateRelayKeysRequest,
    responses(
        (status = 200, description = "Keys replaced", body = RelayWriteResponse),
        (status = 400, description = "Unknown key", body = ErrorResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Relay not found", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn update_relay_keys(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(req): Json<UpdateRelayKeysRequest>,
) -> Result<Json<RelayWriteResponse>, ApiError> {
    let outcome = state
        .provisioner
        .replace_keys(&user.scope, id, &req.key_ids)
        .await
        .map_err(provision_error)?;
    Ok(Json(RelayWriteResponse {
        id: outcome.relay_id,
        name: outcome.name,
        web_port: outcome.web_port,
        warning: outcome.warning,
    }))
}

/// Start a stopped relay workload
#[utoipa::path(
    post,
    path = "/api/relays/{id}/start",
    params(
        ("id" = i32, Path, description = "Relay ID")
    ),
    responses(
        (status = 200, description = "Relay started", body = RelayActionResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Relay not found", body = ErrorResponse),
        (status = 502, description = "Orchestrator error", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn start_relay(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<RelayActionResponse>, ApiError> {
    state
        .provisioner
        .start(&user.scope, id)
        .await
        .map_err(provision_error)?;
    Ok(Json(RelayActionResponse {
        id,
        message: "Relay started".to_string(),
    }))
}

/// Stop a running relay workload
#[utoipa::path(
    post,
    path = "/api/relays/{id}/stop",
    params(
        ("id" = i32, Path, description = "Relay ID")
    ),
    responses(
        (status = 200, description = "Relay stopped", body = RelayActionResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Relay not found", body = ErrorResponse),
        (status = 502, description = "Orchestrator error", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn stop_relay(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<RelayActionResponse>, ApiError> {
    state
        .provisioner
        .stop(&user.scope, id)
        .await
        .map_err(provision_error)?;
    Ok(Json(RelayActionResponse {
        id,
        message: "Relay stopped".to_string(),
    }))
}

/// Restart a relay workload
#[utoipa::path(
    post,
    path = "/api/relays/{id}/restart",
    params(
        ("id" = i32, Path, description = "Relay ID")
    ),
    responses(
        (status = 200, description = "Relay restarted", body = RelayActionResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Relay not found", body = ErrorResponse),
        (status = 502, description = "Orchestrator error", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn restart_relay(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<RelayActionResponse>, ApiError> {
    info!(subject = %user.subject, relay_id = id, "Restarting relay");
    state
        .provisioner
        .restart(&user.scope, id)
        .await
        .map_err(provision_error)?;
    Ok(Json(RelayActionResponse {
        id,
        message: "Relay restarted".to_string(),
    }))
}

/// Platform detail of a relay workload
#[utoipa::path(
    get,
    path = "/api/relays/{id}/container",
    params(
        ("id" = i32, Path, description = "Relay ID")
    ),
    responses(
        (status = 200, description = "Workload detail", body = WorkloadDetails),
        (status = 403, description = "Relay belongs to another tenant", body = ErrorResponse),
        (status = 404, description = "Relay or workload not found", body = ErrorResponse),
        (status = 502, description = "Orchestrator error", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn relay_container(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<WorkloadDetails>, ApiError> {
    state
        .provisioner
        .details(&user.scope, id)
        .await
        .map(Json)
        .map_err(provision_error)
}

/// Health score breakdown of one relay
#[utoipa::path(
    get,
    path = "/api/relays/{id}/health",
    params(
        ("id" = i32, Path, description = "Relay ID")
    ),
    responses(
        (status = 200, description = "Relay health", body = RelayHealthReport),
        (status = 403, description = "Relay belongs to another tenant", body = ErrorResponse),
        (status = 404, description = "Relay not found", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn relay_health(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<RelayHealthReport>, ApiError> {
    state
        .monitor
        .relay_health(&user.scope, id)
        .await
        .map(Json)
        .map_err(monitor_error)
}

/// Raw statistics document served by the relay
#[utoipa::path(
    get,
    path = "/api/relays/{id}/stats",
    params(
        ("id" = i32, Path, description = "Relay ID")
    ),
    responses(
        (status = 200, description = "Stats document, or an error object when the relay did not answer", content_type = "application/json"),
        (status = 403, description = "Relay belongs to another tenant", body = ErrorResponse),
        (status = 404, description = "Relay not found", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn relay_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let (relay, doc) = state
        .monitor
        .relay_stats(&user.scope, id)
        .await
        .map_err(monitor_error)?;

    Ok(Json(doc.unwrap_or_else(|| {
        json!({"error": "stats unavailable", "relay": relay.name})
    })))
}

/// Trailing log lines of a relay workload
#[utoipa::path(
    get,
    path = "/api/relays/{id}/logs",
    params(
        ("id" = i32, Path, description = "Relay ID"),
        LogsQuery
    ),
    responses(
        (status = 200, description = "Log lines, oldest first", body = RelayLogs),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Relay not found", body = ErrorResponse),
        (status = 502, description = "Orchestrator error", body = ErrorResponse)
    ),
    tag = "relays"
)]
pub async fn relay_logs(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<RelayLogs>, ApiError> {
    let tail = query.tail.unwrap_or(DEFAULT_LOG_TAIL).min(MAX_LOG_TAIL);
    let lines = state
        .provisioner
        .logs(&user.scope, id, tail)
        .await
        .map_err(provision_error)?;
    Ok(Json(RelayLogs { relay_id: id, lines }))
}

/// Relay quota usage of a tenant
#[utoipa::path(
    get,
    path = "/api/tenants/{id}/usage",
    params(
        ("id" = i32, Path, description = "Tenant ID")
    ),
    responses(
        (status = 200, description = "Quota usage", body = TenantUsage),
        (status = 403, description = "Tenant not visible to caller", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse)
    ),
    tag = "tenants"
)]
pub async fn tenant_usage(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<TenantUsage>, ApiError> {
    state
        .monitor
        .tenant_usage(&user.scope, id)
        .await
        .map(Json)
        .map_err(monitor_error)
}

/// Access keys in the caller's scope. Key material is never returned.
#[utoipa::path(
    get,
    path = "/api/keys",
    responses(
        (status = 200, description = "Keys in scope", body = KeyList),
        (status = 403, description = "Caller scope rejected", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<KeyList>, ApiError> {
    let keys = state.keys.list(&user.scope).await.map_err(key_store_error)?;
    let total = keys.len();
    Ok(Json(KeyList { keys, total }))
}

#[utoipa::path(
    post,
    path = "/api/keys",
    request_body = CreateKeyRequest,
    responses(
        (status = 201, description = "Key stored", body = AccessKeyInfo),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Role may not create keys", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<AccessKeyInfo>), ApiError> {
    info!(subject = %user.subject, alias = %req.alias, "Creating access key");
    let key = state
        .keys
        .create(
            &user.scope,
            CreateKey {
                alias: req.alias,
                key_value: req.key_value,
                tenant_id: req.tenant_id,
            },
        )
        .await
        .map_err(key_store_error)?;
    Ok((StatusCode::CREATED, Json(key)))
}

/// Delete a key and its relay assignments
#[utoipa::path(
    delete,
    path = "/api/keys/{id}",
    params(
        ("id" = i32, Path, description = "Key ID")
    ),
    responses(
        (status = 200, description = "Key deleted", body = DeleteResponse),
        (status = 403, description = "Forbidden", body = ErrorResponse),
        (status = 404, description = "Key not found", body = ErrorResponse)
    ),
    tag = "keys"
)]
pub async fn delete_key(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let alias = state
        .keys
        .delete(&user.scope, id)
        .await
        .map_err(key_store_error)?;
    Ok(Json(DeleteResponse {
        id,
        message: format!("Key {} deleted", alias),
    }))
}

/// Tenants visible to the caller
#[utoipa::path(
    get,
    path = "/api/tenants",
    responses(
        (status = 200, description = "Tenants in scope", body = TenantList),
        (status = 403, description = "Caller scope rejected", body = ErrorResponse)
    ),
    tag = "tenants"
)]
pub async fn list_tenants(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<TenantList>, ApiError> {
    let tenants = state
        .tenants
        .list(&user.scope)
        .await
        .map_err(tenant_store_error)?;
    let total = tenants.len();
    Ok(Json(TenantList { tenants, total }))
}

/// Create a tenant (admin only). The API key is returned once.
#[utoipa::path(
    post,
    path = "/api/tenants",
    request_body = CreateTenantRequest,
    responses(
        (status = 201, description = "Tenant created", body = TenantCreated),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Only admins manage tenants", body = ErrorResponse),
        (status = 409, description = "Name or slug already in use", body = ErrorResponse)
    ),
    tag = "tenants"
)]
pub async fn create_tenant(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<TenantCreated>), ApiError> {
    info!(subject = %user.subject, name = %req.name, "Creating tenant");
    let created = state
        .tenants
        .create(
            &user.scope,
            CreateTenant {
                name: req.name,
                slug: req.slug,
                max_relays: req.max_relays,
                max_bandwidth_mbps: req.max_bandwidth_mbps,
                sla_target: req.sla_target,
                allowed_regions: req.allowed_regions,
                preferred_relay_ids: req.preferred_relay_ids,
            },
        )
        .await
        .map_err(tenant_store_error)?;
    Ok((StatusCode::CREATED, Json(created)))
}

#[utoipa::path(
    get,
    path = "/api/tenants/{id}",
    params(
        ("id" = i32, Path, description = "Tenant ID")
    ),
    responses(
        (status = 200, description = "Tenant", body = TenantRecord),
        (status = 403, description = "Tenant not visible to caller", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse)
    ),
    tag = "tenants"
)]
pub async fn get_tenant(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<TenantRecord>, ApiError> {
    state
        .tenants
        .get(&user.scope, id)
        .await
        .map(Json)
        .map_err(tenant_store_error)
}

#[utoipa::path(
    put,
    path = "/api/tenants/{id}",
    params(
        ("id" = i32, Path, description = "Tenant ID")
    ),
    request_body = UpdateTenantRequest,
    responses(
        (status = 200, description = "Updated tenant", body = TenantRecord),
        (status = 400, description = "Invalid request", body = ErrorResponse),
        (status = 403, description = "Only admins manage tenants", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse)
    ),
    tag = "tenants"
)]
pub async fn update_tenant(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
    Json(req): Json<UpdateTenantRequest>,
) -> Result<Json<TenantRecord>, ApiError> {
    state
        .tenants
        .update(
            &user.scope,
            id,
            UpdateTenant {
                name: req.name,
                max_relays: req.max_relays,
                max_bandwidth_mbps: req.max_bandwidth_mbps,
                sla_target: req.sla_target,
                allowed_regions: req.allowed_regions,
                preferred_relay_ids: req.preferred_relay_ids,
                is_active: req.is_active,
            },
        )
        .await
        .map(Json)
        .map_err(tenant_store_error)
}

/// Delete a tenant with its keys; its relays become global
#[utoipa::path(
    delete,
    path = "/api/tenants/{id}",
    params(
        ("id" = i32, Path, description = "Tenant ID")
    ),
    responses(
        (status = 200, description = "Tenant deleted", body = DeleteResponse),
        (status = 403, description = "Only admins manage tenants", body = ErrorResponse),
        (status = 404, description = "Tenant not found", body = ErrorResponse)
    ),
    tag = "tenants"
)]
pub async fn delete_tenant(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<i32>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let name = state
        .tenants
        .delete(&user.scope, id)
        .await
        .map_err(tenant_store_error)?;
    Ok(Json(DeleteResponse {
        id,
        message: format!("Tenant {} deleted", name),
    }))
}

fn monitoring_disabled() -> ApiError {
    api_error(
        StatusCode::NOT_FOUND,
        "Monitoring push is not configured",
        "MONITORING_DISABLED",
    )
}

/// Sync reports name relays of every tenant.
fn require_fleet_wide(user: &AuthUser, action: &str) -> Result<(), ApiError> {
    if user.scope.is_tenant_scoped() {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            format!("Role '{}' may not {}", user.scope.role, action),
            "FORBIDDEN",
        ));
    }
    Ok(())
}

/// Result of the last Zabbix sync
#[utoipa::path(
    get,
    path = "/api/monitoring/sync",
    responses(
        (status = 200, description = "Last sync report", body = SyncReport),
        (status = 403, description = "Tenant-scoped callers may not read the fleet sync report", body = ErrorResponse),
        (status = 404, description = "Monitoring disabled", body = ErrorResponse)
    ),
    tag = "monitoring"
)]
pub async fn sync_status(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SyncReport>, ApiError> {
    require_fleet_wide(&user, "read the fleet sync report")?;
    let poller = state.poller.as_ref().ok_or_else(monitoring_disabled)?;
    Ok(Json(poller.state()))
}

/// Run one Zabbix sync now
#[utoipa::path(
    post,
    path = "/api/monitoring/sync",
    responses(
        (status = 200, description = "Sync report", body = SyncReport),
        (status = 403, description = "Tenant-scoped callers may not trigger a fleet push", body = ErrorResponse),
        (status = 404, description = "Monitoring disabled", body = ErrorResponse)
    ),
    tag = "monitoring"
)]
pub async fn trigger_sync(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<SyncReport>, ApiError> {
    require_fleet_wide(&user, "trigger a fleet sync")?;
    let poller = state.poller.as_ref().ok_or_else(monitoring_disabled)?;

    info!(subject = %user.subject, "Manual Zabbix sync");
    Ok(Json(poller.run_once().await))
}
