//! Connection-accept surface.
//!
//! Exposes the authorizer over HTTP: `POST /connect` carries the caller's
//! credential and is answered with an admit/deny decision. Denial reasons are
//! logged server-side only; the wire response is always the generic
//! `unauthorized` so callers cannot probe for valid credentials.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::gateway::auth::{
    AuthorizationResult, Authorizer, ConnectCredential, DenyReason,
};
use crate::gateway::identity::{
    ClaimedIdentity, HttpIdentityLookup, IdentityLookup, NullIdentityLookup,
};
use crate::gateway::runtime::RuntimeConfig;
use crate::gateway::trust::{ForwardedHeaders, RequestMeta};
use crate::{Error, Result};

/// Claimed-identity header injected by the identity proxy.
pub const HEADER_IDENTITY_LOGIN: &str = "x-identity-login";
/// Claimed display-name header.
pub const HEADER_IDENTITY_NAME: &str = "x-identity-name";
/// Claimed avatar-reference header. Cosmetic only.
pub const HEADER_IDENTITY_AVATAR: &str = "x-identity-avatar";

/// Shared state for request handlers.
pub struct GatewayState {
    authorizer: Authorizer,
}

/// Gateway server wrapping the authorizer behind an HTTP listener.
pub struct GatewayServer {
    runtime: RuntimeConfig,
}

impl GatewayServer {
    /// Create a server from a resolved runtime configuration.
    pub fn new(runtime: RuntimeConfig) -> Self {
        Self { runtime }
    }

    /// Bind and serve until shutdown.
    pub async fn run(self) -> Result<()> {
        let lookup: Arc<dyn IdentityLookup> = match self.runtime.lookup_url.as_deref() {
            Some(url) => Arc::new(HttpIdentityLookup::new(url, self.runtime.lookup_timeout)?),
            None => Arc::new(NullIdentityLookup),
        };

        let authorizer = Authorizer::new(
            self.runtime.resolved_auth.clone(),
            self.runtime.trusted_proxies.clone(),
            self.runtime.serve_host_suffix.clone(),
            lookup,
            self.runtime.lookup_timeout,
        );

        let state = Arc::new(GatewayState { authorizer });
        let app = create_router(state);

        let addr = format!("{}:{}", self.runtime.bind_host, self.runtime.port);
        let listener = TcpListener::bind(&addr).await?;

        info!(
            version = env!("CARGO_PKG_VERSION"),
            bind = %addr,
            auth_mode = %self.runtime.resolved_auth.mode,
            identity_proxy = %self.runtime.identity_proxy_mode,
            control_ui = self.runtime.control_ui_enabled,
            "Gateway listening"
        );

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Gateway shutdown complete");
        Ok(())
    }
}

fn create_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/connect", post(connect))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

/// Authorize a control connection attempt.
async fn connect(
    State(state): State<Arc<GatewayState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    credential: Option<Json<ConnectCredential>>,
) -> Response {
    let meta = request_meta(peer, &headers);
    let credential = credential.map(|Json(c)| c);

    match state.authorizer.authorize(&meta, credential.as_ref()).await {
        AuthorizationResult::Granted { method, user } => {
            info!(%method, user = user.as_deref().unwrap_or("-"), peer = %peer, "Connection authorized");
            Json(json!({
                "ok": true,
                "method": method.to_string(),
                "user": user,
            }))
            .into_response()
        }
        AuthorizationResult::Denied { reason } => {
            // Precise reason stays in the server log.
            warn!(%reason, peer = %peer, "Connection denied");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({
                    "ok": false,
                    "error": DenyReason::Unauthorized.to_string(),
                })),
            )
                .into_response()
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Build connection metadata from the socket peer and request headers.
pub fn request_meta(peer: SocketAddr, headers: &HeaderMap) -> RequestMeta {
    RequestMeta {
        remote_addr: Some(peer.ip()),
        host: header_str(headers, header::HOST.as_str()).map(ToString::to_string),
        forwarded: ForwardedHeaders {
            forwarded_for: header_str(headers, "x-forwarded-for").map(ToString::to_string),
            real_ip: header_str(headers, "x-real-ip").map(ToString::to_string),
            forwarded_host: header_str(headers, "x-forwarded-host").map(ToString::to_string),
            forwarded_proto: header_str(headers, "x-forwarded-proto").map(ToString::to_string),
        },
        claimed: ClaimedIdentity::from_headers(
            header_str(headers, HEADER_IDENTITY_LOGIN),
            header_str(headers, HEADER_IDENTITY_NAME),
            header_str(headers, HEADER_IDENTITY_AVATAR),
        ),
    }
}

/// Shutdown signal handler
async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        warn!(error = %e, "Failed to install ctrl-c handler");
    }
    info!("Shutdown signal received");
}
