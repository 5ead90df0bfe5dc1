pub mod handlers;
pub mod middleware;
pub mod models;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use relaydeck_control::{
    FleetMonitor, KeyStore, MonitoringPoller, RelayProvisioner, TenantStore,
};

/// Application state shared across handlers
pub struct AppState {
    pub monitor: FleetMonitor,
    pub provisioner: RelayProvisioner,
    pub keys: KeyStore,
    pub tenants: TenantStore,
    /// Present when a Zabbix server is configured
    pub poller: Option<Arc<MonitoringPoller>>,
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Relaydeck API",
        version = "0.1.0",
        description = "Health scoring and lifecycle management for a relay fleet"
    ),
    paths(
        handlers::health_check,
        handlers::dashboard_kpi,
        handlers::dashboard_alerts,
        handlers::dashboard_topology,
        handlers::list_relays,
        handlers::create_relay,
        handlers::delete_relay,
        handlers::update_relay_keys,
        handlers::start_relay,
        handlers::stop_relay,
        handlers::restart_relay,
        handlers::relay_container,
        handlers::relay_health,
        handlers::relay_stats,
        handlers::relay_logs,
        handlers::list_keys,
        handlers::create_key,
        handlers::delete_key,
        handlers::list_tenants,
        handlers::create_tenant,
        handlers::get_tenant,
        handlers::update_tenant,
        handlers::delete_tenant,
        handlers::tenant_usage,
        handlers::sync_status,
        handlers::trigger_sync,
    ),
    components(
        schemas(
            models::ErrorResponse,
            models::HealthResponse,
            models::RelayList,
            models::CreateRelayRequest,
            models::RelayWriteResponse,
            models::UpdateRelayKeysRequest,
            models::RelayActionResponse,
            models::LogsQuery,
            models::RelayLogs,
            models::KeyAlias,
            models::RelayListing,
            models::FleetSummary,
            models::RelaySummary,
            models::AlertReport,
            models::Alert,
            models::AlertKind,
            models::Severity,
            models::TopologyGraph,
            models::TopologyNode,
            models::TopologyEdge,
            models::NodeKind,
            models::NodeData,
            models::EdgeStatus,
            models::RelayHealthReport,
            models::HealthComponent,
            models::ComponentKind,
            models::OrchestratorSnapshot,
            models::WorkloadDetails,
            models::KeyList,
            models::CreateKeyRequest,
            models::AccessKeyInfo,
            models::DeleteResponse,
            models::TenantList,
            models::TenantRecord,
            models::TenantCreated,
            models::CreateTenantRequest,
            models::UpdateTenantRequest,
            models::TenantUsage,
            models::SyncReport,
            models::SyncStatus,
        )
    ),
    tags(
        (name = "dashboard", description = "Fleet KPIs, alerts and topology"),
        (name = "relays", description = "Relay lifecycle and per-relay health"),
        (name = "keys", description = "Access keys"),
        (name = "tenants", description = "Tenants and their capacity"),
        (name = "monitoring", description = "Zabbix metric push"),
        (name = "system", description = "System health and info endpoints")
    )
)]
struct ApiDoc;

/// API server configuration
pub struct ApiServerConfig {
    /// Address to bind the API server
    pub bind_addr: SocketAddr,
    /// Enable CORS (for the dashboard in development)
    pub enable_cors: bool,
    /// Allowed CORS origins (if None, only localhost origins are allowed)
    pub cors_origins: Option<Vec<String>>,
    /// HMAC secret bearer tokens are signed with
    pub jwt_secret: String,
    /// Required `iss` claim, if any
    pub jwt_issuer: Option<String>,
}

impl Default for ApiServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8000)),
            enable_cors: true,
            cors_origins: None,
            jwt_secret: String::new(),
            jwt_issuer: None,
        }
    }
}

/// API Server
pub struct ApiServer {
    config: ApiServerConfig,
    state: Arc<AppState>,
}

impl ApiServer {
    pub fn new(
        config: ApiServerConfig,
        monitor: FleetMonitor,
        provisioner: RelayProvisioner,
        keys: KeyStore,
        tenants: TenantStore,
        poller: Option<Arc<MonitoringPoller>>,
    ) -> Self {
        let state = Arc::new(AppState {
            monitor,
            provisioner,
            keys,
            tenants,
            poller,
        });

        Self { config, state }
    }

    /// Build the router with all routes
    pub fn build_router(&self) -> Router {
        let api_doc = ApiDoc::openapi();

        let secret = self.config.jwt_secret.as_bytes();
        let jwt_state = Arc::new(match &self.config.jwt_issuer {
            Some(issuer) => middleware::JwtState::with_issuer(secret, issuer.clone()),
            None => middleware::JwtState::new(secret),
        });

        // PUBLIC routes
        let public_router = Router::new()
            .route("/api/health", get(handlers::health_check))
            .with_state(self.state.clone());

        // PROTECTED routes (bearer token or session cookie)
        let protected_router = Router::new()
            .route("/api/dashboard/kpi", get(handlers::dashboard_kpi))
            .route("/api/dashboard/alerts", get(handlers::dashboard_alerts))
            .route("/api/dashboard/topology", get(handlers::dashboard_topology))
            .route(
                "/api/relays",
                get(handlers::list_relays).post(handlers::create_relay),
            )
            .route("/api/relays/{id}", axum::routing::delete(handlers::delete_relay))
            .route("/api/relays/{id}/keys", put(handlers::update_relay_keys))
            .route("/api/relays/{id}/start", post(handlers::start_relay))
            .route("/api/relays/{id}/stop", post(handlers::stop_relay))
            .route("/api/relays/{id}/restart", post(handlers::restart_relay))
            .route("/api/relays/{id}/container", get(handlers::relay_container))
            .route("/api/relays/{id}/health", get(handlers::relay_health))
            .route("/api/relays/{id}/stats", get(handlers::relay_stats))
            .route("/api/relays/{id}/logs", get(handlers::relay_logs))
            .route("/api/keys", get(handlers::list_keys).post(handlers::create_key))
            .route("/api/keys/{id}", axum::routing::delete(handlers::delete_key))
            .route(
                "/api/tenants",
                get(handlers::list_tenants).post(handlers::create_tenant),
            )
            .route(
                "/api/tenants/{id}",
                get(handlers::get_tenant)
                    .put(handlers::update_tenant)
                    .delete(handlers::delete_tenant),
            )
            .route("/api/tenants/{id}/usage", get(handlers::tenant_usage))
            .route(
                "/api/monitoring/sync",
                get(handlers::sync_status).post(handlers::trigger_sync),
            )
            .with_state(self.state.clone())
            .layer(axum_middleware::from_fn_with_state(
                jwt_state,
                middleware::require_auth,
            ));

        let router = Router::new()
            .merge(SwaggerUi::new("/swagger-ui").url("/api/openapi.json", api_doc))
            .merge(public_router)
            .merge(protected_router);

        let mut router = router.layer(TraceLayer::new_for_http());

        if self.config.enable_cors {
            router = router.layer(self.cors_layer());
        }

        router
    }

    fn cors_layer(&self) -> CorsLayer {
        let origin = match &self.config.cors_origins {
            Some(origins) => AllowOrigin::list(
                origins
                    .iter()
                    .filter_map(|o| HeaderValue::from_str(o).ok())
                    .collect::<Vec<_>>(),
            ),
            None => AllowOrigin::predicate(|origin: &HeaderValue, _| {
                let origin = origin.to_str().unwrap_or("");
                origin.starts_with("http://localhost:")
                    || origin.starts_with("http://127.0.0.1:")
                    || origin.starts_with("https://localhost:")
                    || origin.starts_with("https://127.0.0.1:")
            }),
        };

        // Cookie auth needs credentials, which rules out a wildcard origin
        CorsLayer::new()
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::COOKIE])
            .allow_credentials(true)
            .allow_origin(origin)
    }

    /// Start the API server
    pub async fn start(self) -> Result<(), anyhow::Error> {
        let router = self.build_router();

        info!("Starting API server on {}", self.config.bind_addr);
        info!(
            "OpenAPI spec: http://{}/api/openapi.json",
            self.config.bind_addr
        );
        info!("Swagger UI: http://{}/swagger-ui", self.config.bind_addr);

        let listener = tokio::net::TcpListener::bind(self.config.bind_addr).await?;

        axum::serve(listener, router)
            .await
            .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_generation() {
        let doc = ApiDoc::openapi();
        let json = doc.to_json().unwrap();
        assert!(json.contains("/api/dashboard/kpi"));
        assert!(json.contains("/api/relays/{id}/health"));
        assert!(json.contains("/api/relays/{id}/container"));
        assert!(json.contains("/api/keys/{id}"));
        assert!(json.contains("/api/tenants/{id}"));
    }
}
