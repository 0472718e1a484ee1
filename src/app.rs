//! Application root: configuration, the authentication gate, resource
//! mounting, and assembly of the final axum router.

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use axum::extract::Request;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, MethodRouter};
use axum::Router;
use http::{header, Method};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;

use crate::auth::{AllowAnonymous, Authenticator, CurrentIdentity};
use crate::error::ApiError;
use crate::openapi;
use crate::operation::OperationSpec;
use crate::request_id;
use crate::resource::Resource;

/// Application-level configuration. All fields have working defaults, so
/// deserializing an empty document yields a usable config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Title reported in the OpenAPI `info` block.
    pub title: String,
    /// Version reported in the OpenAPI `info` block.
    pub version: String,
    pub bind_addr: String,
    /// Serve the generated document at `/openapi.json`.
    pub enable_docs: bool,
    pub cors_enabled: bool,
    /// Request body cap in bytes.
    pub max_body_size: usize,
    /// Optional per-request deadline, e.g. `"30s"`.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Option<Duration>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            title: "crudkit API".to_string(),
            version: "0.1.0".to_string(),
            bind_addr: "127.0.0.1:8087".to_string(),
            enable_docs: true,
            cors_enabled: false,
            max_body_size: 16 * 1024 * 1024,
            request_timeout: None,
        }
    }
}

/// The application root. Resources are registered by value, then the app is
/// consumed into an [`axum::Router`] (or served directly).
pub struct App {
    config: AppConfig,
    authenticator: Arc<dyn Authenticator>,
    middlewares: Vec<Box<dyn FnOnce(Router) -> Router + Send>>,
    registered_routes: HashSet<(Method, String)>,
    operation_specs: Vec<OperationSpec>,
    routers: Vec<(String, MethodRouter)>,
    components: BTreeMap<String, Value>,
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        let mut components = BTreeMap::new();
        components.insert("ErrorResponse".to_string(), error_response_schema());
        Self {
            config,
            authenticator: Arc::new(AllowAnonymous),
            middlewares: Vec::new(),
            registered_routes: HashSet::new(),
            operation_specs: Vec::new(),
            routers: Vec::new(),
            components,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Replace the default [`AllowAnonymous`] provider.
    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = authenticator;
        self
    }

    /// Attach a router-level middleware. Middlewares run in registration
    /// order: the first one attached sees the request first.
    pub fn middleware<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Router) -> Router + Send + 'static,
    {
        self.middlewares.push(Box::new(f));
        self
    }

    /// Mount a resource. Consumes the node, so a resource cannot be mounted
    /// twice. Duplicate `(method, path)` pairs across resources keep the
    /// first registration (second registration = programmer error).
    pub fn register(mut self, resource: Resource) -> Self {
        let mounted = resource.into_mount();
        tracing::debug!(
            domain = %mounted.domain,
            operations = mounted.operations.len(),
            "mounting resource"
        );

        for op in mounted.operations {
            let route_key = (op.method.clone(), op.path.clone());
            if !self.registered_routes.insert(route_key) {
                tracing::error!(
                    method = %op.method,
                    path = %op.path,
                    "Duplicate (method, path) detected; ignoring subsequent registration"
                );
                continue;
            }
            self.routers.push((op.path, op.router));
            self.operation_specs.push(op.spec);
        }

        for (key, schema) in mounted.components {
            match self.components.entry(key) {
                Entry::Vacant(slot) => {
                    slot.insert(schema);
                }
                Entry::Occupied(slot) => {
                    if *slot.get() == schema {
                        tracing::debug!(
                            key = %slot.key(),
                            "Schema already registered with identical content; reusing existing"
                        );
                    } else {
                        tracing::error!(
                            key = %slot.key(),
                            "Conflicting schema content under the same component key; keeping the first"
                        );
                    }
                }
            }
        }

        self
    }

    /// Build the OpenAPI document for everything registered so far.
    pub fn build_openapi(&self) -> anyhow::Result<Value> {
        tracing::info!(
            operations = self.operation_specs.len(),
            "Building OpenAPI document"
        );
        let doc = openapi::build_document(
            &self.config.title,
            &self.config.version,
            &self.operation_specs,
            &self.components,
        );
        serde_json::to_value(doc).context("failed to serialize OpenAPI document")
    }

    /// Consume the app into the final router.
    ///
    /// Layer order (outermost to innermost):
    /// PropagateRequestId -> SetRequestId -> Trace -> Timeout (optional) ->
    /// CORS (optional) -> BodyLimit -> user middlewares -> CatchPanic ->
    /// identity gate -> routes.
    pub fn into_router(mut self) -> anyhow::Result<Router> {
        let openapi_doc = if self.config.enable_docs {
            Some(Arc::new(self.build_openapi()?))
        } else {
            None
        };

        let mut router = Router::new();
        for (path, method_router) in self.routers.drain(..) {
            router = router.route(&path, method_router);
        }

        // The gate resolves credentials and always inserts the extension, so
        // generated handlers can extract it infallibly. Rejection happens
        // per-operation, based on visibility.
        let authenticator = self.authenticator.clone();
        router = router.layer(middleware::from_fn(
            move |mut req: Request, next: Next| {
                let authenticator = authenticator.clone();
                async move {
                    let identity = authenticator.resolve(req.headers()).await.map(Arc::new);
                    req.extensions_mut().insert(CurrentIdentity(identity));
                    next.run(req).await
                }
            },
        ));

        router = router.layer(CatchPanicLayer::custom(panic_to_response));

        // Applied in reverse so the first registered middleware lands
        // outermost and therefore runs first.
        for attach in self.middlewares.drain(..).rev() {
            router = attach(router);
        }

        router = router.route("/health", get(health_check));
        if let Some(doc) = openapi_doc {
            router = router.route(
                "/openapi.json",
                get(move || {
                    let doc = doc.clone();
                    async move {
                        let json = Json((*doc).clone());
                        ([(header::CACHE_CONTROL, "no-store")], json).into_response()
                    }
                }),
            );
        }

        router = router.layer(RequestBodyLimitLayer::new(self.config.max_body_size));
        if self.config.cors_enabled {
            router = router.layer(CorsLayer::permissive());
        }
        if let Some(timeout) = self.config.request_timeout {
            router = router.layer(TimeoutLayer::new(timeout));
        }
        router = router.layer(request_id::trace_layer());
        router = router.layer(SetRequestIdLayer::new(
            request_id::header(),
            request_id::MakeReqId,
        ));
        router = router.layer(PropagateRequestIdLayer::new(request_id::header()));

        Ok(router)
    }

    /// Bind and serve until the task is aborted.
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr: SocketAddr = self
            .config
            .bind_addr
            .parse()
            .with_context(|| format!("invalid bind address '{}'", self.config.bind_addr))?;
        let router = self.into_router()?;

        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("HTTP server bound on {addr}");
        axum::serve(listener, router).await.map_err(Into::into)
    }
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Schema of the `{error, message, details?}` failure envelope, registered
/// once and referenced by every generated error response.
fn error_response_schema() -> Value {
    json!({
        "type": "object",
        "required": ["error", "message"],
        "properties": {
            "error": {
                "type": "string",
                "enum": [
                    "NOT_FOUND",
                    "INVALID_INPUT",
                    "UNAUTHORIZED",
                    "FORBIDDEN",
                    "CONFLICT",
                    "INTERNAL_SERVER_ERROR",
                    "INVALID_DATA",
                ],
            },
            "message": { "type": "string" },
            "details": {},
        },
    })
}

fn panic_to_response(err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    // A panicked ApiError is a valid signaling channel and translates like a
    // returned one.
    if let Some(e) = err.downcast_ref::<ApiError>() {
        tracing::warn!(kind = ?e.kind(), "request handler panicked with a recognized error value");
        return e.clone().into_response();
    }

    let message = if let Some(s) = err.downcast_ref::<String>() {
        Some(s.clone())
    } else if let Some(s) = err.downcast_ref::<&str>() {
        Some((*s).to_string())
    } else {
        None
    };
    tracing::error!(message = message.as_deref().unwrap_or("<non-string payload>"), "request handler panicked");

    let error = ApiError::internal("internal server error");
    match message {
        Some(message) => error.with_details(json!({ "panic": message })).into_response(),
        None => error.into_response(),
    }
}
