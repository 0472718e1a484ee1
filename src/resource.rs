//! Resource nodes: one domain in a parent/child chain.
//!
//! A `Resource` derives its path templates, parameter names and documentation
//! metadata from the domain name and the parent chain at construction time,
//! then collects up to five CRUD operation registrations. Mounting a resource
//! onto an [`crate::App`] consumes it and turns every registration into an
//! axum route running the uniform validate -> invoke -> validate -> respond
//! pipeline.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::RawPathParams;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::MethodRouter;
use axum::Extension;
use futures::future::BoxFuture;
use http::{Method, StatusCode};
use serde_json::{json, Value};

use crate::auth::{CurrentIdentity, Identity};
use crate::error::{ApiError, ErrorKind};
use crate::naming;
use crate::operation::{OperationSpec, ParamSpec, RequestBodySpec, ResponseSpec};
use crate::schema::{Schema, SchemaError};

/// What application handlers return: a domain payload to be validated against
/// the resource's response schema, or a recognized [`ApiError`].
pub type HandlerResult = Result<Value, ApiError>;

/// Boxed application handler stored in a registration.
pub type CrudHandler = Arc<dyn Fn(OperationContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Everything a handler receives, threaded explicitly through the pipeline.
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub session: Option<Value>,
    pub user: Option<Value>,
    /// Matched path parameters, keyed by derived parameter name.
    pub params: HashMap<String, String>,
    /// Validated request body; present for `create`/`update` only.
    pub input: Option<Value>,
}

impl OperationContext {
    /// Convenience lookup for a path parameter.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// Per-operation visibility. Protected operations answer 401 before any body
/// or parameter work when no identity was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Protected,
}

/// Explicit operation configuration for the `*_with` registration variants.
#[derive(Debug, Clone, Copy)]
pub struct OperationConfig {
    pub visibility: Visibility,
}

impl Default for OperationConfig {
    fn default() -> Self {
        Self {
            visibility: Visibility::Protected,
        }
    }
}

impl OperationConfig {
    pub fn public() -> Self {
        Self {
            visibility: Visibility::Public,
        }
    }

    pub fn protected() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    List,
    Create,
    Read,
    Update,
    Delete,
}

impl OperationKind {
    fn method(self) -> Method {
        match self {
            OperationKind::List | OperationKind::Read => Method::GET,
            OperationKind::Create => Method::POST,
            OperationKind::Update => Method::PATCH,
            OperationKind::Delete => Method::DELETE,
        }
    }

    fn name(self) -> &'static str {
        match self {
            OperationKind::List => "list",
            OperationKind::Create => "create",
            OperationKind::Read => "read",
            OperationKind::Update => "update",
            OperationKind::Delete => "delete",
        }
    }

    /// Instance operations target a single resource and carry the node's own
    /// parameter in their path.
    fn is_instance(self) -> bool {
        matches!(
            self,
            OperationKind::Read | OperationKind::Update | OperationKind::Delete
        )
    }

    fn has_body(self) -> bool {
        matches!(self, OperationKind::Create | OperationKind::Update)
    }
}

/// Construction failures for resource nodes.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("domain name must not be empty")]
    EmptyDomainName,

    /// Two domains in one ancestor chain singularized to the same parameter
    /// name. Allowing this would make `OperationContext::params` ambiguous,
    /// so it is rejected at construction.
    #[error("derived parameter `{param}` already appears in the ancestor chain of `{domain}`")]
    DuplicateParam { domain: String, param: String },

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

struct Registration {
    visibility: Visibility,
    input: Option<Schema>,
    handler: CrudHandler,
}

#[derive(Default)]
struct Registrations {
    list: Option<Registration>,
    create: Option<Registration>,
    read: Option<Registration>,
    update: Option<Registration>,
    delete: Option<Registration>,
}

/// One domain in a parent/child chain, with its derived routing metadata and
/// registered operation handlers.
pub struct Resource {
    domain: String,
    display_name: String,
    singular_display_name: String,
    component: String,
    param_name: String,
    collection_path: String,
    instance_path: String,
    ancestor_params: Vec<String>,
    response_schema: Schema,
    list_response_schema: Schema,
    registrations: Registrations,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("domain", &self.domain)
            .field("collection_path", &self.collection_path)
            .field("instance_path", &self.instance_path)
            .finish()
    }
}

impl Resource {
    /// Create a root resource node mounted at `/{domain}`.
    pub fn new(domain: impl Into<String>, response_schema: Schema) -> Result<Self, ResourceError> {
        Self::build(domain.into(), response_schema, None)
    }

    /// Create a resource node nested under `parent`.
    ///
    /// The derived chain is copied from the parent at construction, so the
    /// new node does not keep the parent alive and the parent does not need
    /// to be mounted for the child's paths to resolve.
    pub fn nested(
        parent: &Resource,
        domain: impl Into<String>,
        response_schema: Schema,
    ) -> Result<Self, ResourceError> {
        Self::build(domain.into(), response_schema, Some(parent))
    }

    fn build(
        domain: String,
        response_schema: Schema,
        parent: Option<&Resource>,
    ) -> Result<Self, ResourceError> {
        if domain.is_empty() {
            return Err(ResourceError::EmptyDomainName);
        }

        let param_name = naming::domain_to_param(&domain);
        let (ancestor_params, collection_path) = match parent {
            Some(p) => {
                let mut ancestors = p.ancestor_params.clone();
                ancestors.push(p.param_name.clone());
                let path = format!("{}/{{{}}}/{}", p.collection_path, p.param_name, domain);
                (ancestors, path)
            }
            None => (Vec::new(), format!("/{domain}")),
        };
        if ancestor_params.contains(&param_name) {
            return Err(ResourceError::DuplicateParam {
                domain,
                param: param_name,
            });
        }
        let instance_path = format!("{collection_path}/{{{param_name}}}");

        let list_response_schema = Schema::array_of(&response_schema)?;
        Ok(Self {
            display_name: naming::display_name(&domain),
            singular_display_name: naming::singular_display_name(&domain),
            component: naming::component_name(&domain),
            domain,
            param_name,
            collection_path,
            instance_path,
            ancestor_params,
            response_schema,
            list_response_schema,
            registrations: Registrations::default(),
        })
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn singular_display_name(&self) -> &str {
        &self.singular_display_name
    }

    /// The derived path parameter name identifying one instance of this
    /// domain (`stores` -> `storeId`).
    pub fn param_name(&self) -> &str {
        &self.param_name
    }

    /// Path template for collection operations (`list`, `create`).
    pub fn collection_path(&self) -> &str {
        &self.collection_path
    }

    /// Path template for instance operations (`read`, `update`, `delete`).
    pub fn instance_path(&self) -> &str {
        &self.instance_path
    }

    /// Derived parameter names of the ancestor chain, root first.
    pub fn ancestor_params(&self) -> &[String] {
        &self.ancestor_params
    }

    // ---------------------------------------------------------------------
    // Operation registration. Each operation has a defaults variant and a
    // `_with` variant taking an explicit config; `create`/`update` require
    // the input schema positionally.
    // ---------------------------------------------------------------------

    /// Register `GET {collection}` with default config (protected).
    pub fn list<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.list_with(OperationConfig::default(), handler)
    }

    /// Register `GET {collection}` with an explicit config.
    pub fn list_with<F, Fut>(mut self, config: OperationConfig, handler: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(OperationKind::List, config, None, into_handler(handler));
        self
    }

    /// Register `POST {collection}` with default config. The input schema is
    /// mandatory for `create`.
    pub fn create<F, Fut>(self, input: Schema, handler: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.create_with(OperationConfig::default(), input, handler)
    }

    /// Register `POST {collection}` with an explicit config.
    pub fn create_with<F, Fut>(mut self, config: OperationConfig, input: Schema, handler: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(
            OperationKind::Create,
            config,
            Some(input),
            into_handler(handler),
        );
        self
    }

    /// Register `GET {instance}` with default config.
    pub fn read<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.read_with(OperationConfig::default(), handler)
    }

    /// Register `GET {instance}` with an explicit config.
    pub fn read_with<F, Fut>(mut self, config: OperationConfig, handler: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(OperationKind::Read, config, None, into_handler(handler));
        self
    }

    /// Register `PATCH {instance}` with default config. The input schema is
    /// mandatory for `update`.
    pub fn update<F, Fut>(self, input: Schema, handler: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.update_with(OperationConfig::default(), input, handler)
    }

    /// Register `PATCH {instance}` with an explicit config.
    pub fn update_with<F, Fut>(mut self, config: OperationConfig, input: Schema, handler: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(
            OperationKind::Update,
            config,
            Some(input),
            into_handler(handler),
        );
        self
    }

    /// Register `DELETE {instance}` with default config.
    pub fn delete<F, Fut>(self, handler: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.delete_with(OperationConfig::default(), handler)
    }

    /// Register `DELETE {instance}` with an explicit config.
    pub fn delete_with<F, Fut>(mut self, config: OperationConfig, handler: F) -> Self
    where
        F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        self.register(OperationKind::Delete, config, None, into_handler(handler));
        self
    }

    fn register(
        &mut self,
        kind: OperationKind,
        config: OperationConfig,
        input: Option<Schema>,
        handler: CrudHandler,
    ) {
        let registration = Registration {
            visibility: config.visibility,
            input,
            handler,
        };
        let slot = match kind {
            OperationKind::List => &mut self.registrations.list,
            OperationKind::Create => &mut self.registrations.create,
            OperationKind::Read => &mut self.registrations.read,
            OperationKind::Update => &mut self.registrations.update,
            OperationKind::Delete => &mut self.registrations.delete,
        };
        if slot.is_some() {
            tracing::warn!(
                domain = %self.domain,
                operation = kind.name(),
                "operation registered twice; the last registration wins"
            );
        }
        *slot = Some(registration);
        tracing::debug!(
            domain = %self.domain,
            operation = kind.name(),
            "registered CRUD operation"
        );
    }

    // ---------------------------------------------------------------------
    // Mounting
    // ---------------------------------------------------------------------

    /// Consume the node into routable operations plus its OpenAPI components.
    pub(crate) fn into_mount(mut self) -> MountedResource {
        let mut components = vec![(self.component.clone(), self.response_schema.as_value().clone())];
        let mut operations = Vec::new();

        for kind in [
            OperationKind::List,
            OperationKind::Create,
            OperationKind::Read,
            OperationKind::Update,
            OperationKind::Delete,
        ] {
            let slot = match kind {
                OperationKind::List => self.registrations.list.take(),
                OperationKind::Create => self.registrations.create.take(),
                OperationKind::Read => self.registrations.read.take(),
                OperationKind::Update => self.registrations.update.take(),
                OperationKind::Delete => self.registrations.delete.take(),
            };
            let Some(registration) = slot else { continue };

            if let Some(input) = &registration.input {
                let key = match kind {
                    OperationKind::Create => format!("Create{}Req", self.component),
                    _ => format!("Update{}Req", self.component),
                };
                components.push((key, input.as_value().clone()));
            }

            let spec = self.build_spec(kind, &registration);
            let response = match kind {
                OperationKind::List => Some(self.list_response_schema.clone()),
                OperationKind::Delete => None,
                _ => Some(self.response_schema.clone()),
            };
            let compiled = Arc::new(CompiledOperation {
                kind,
                domain: self.domain.clone(),
                visibility: registration.visibility,
                input: registration.input,
                response,
                handler: registration.handler,
            });
            operations.push(MountedOperation {
                method: kind.method(),
                path: spec.path.clone(),
                router: make_method_router(compiled),
                spec,
            });
        }

        MountedResource {
            domain: self.domain,
            operations,
            components,
        }
    }

    fn build_spec(&self, kind: OperationKind, registration: &Registration) -> OperationSpec {
        let path = if kind.is_instance() {
            self.instance_path.clone()
        } else {
            self.collection_path.clone()
        };

        let mut params: Vec<ParamSpec> = self
            .ancestor_params
            .iter()
            .map(|name| ParamSpec {
                name: name.clone(),
                description: format!("{name} path parameter"),
            })
            .collect();
        if kind.is_instance() {
            params.push(ParamSpec {
                name: self.param_name.clone(),
                description: format!("{} identifier", self.display_name),
            });
        }

        let singular = &self.singular_display_name;
        let summary = match kind {
            OperationKind::List => format!("Get all {}", self.domain),
            OperationKind::Create => format!("Create a new {singular}"),
            OperationKind::Read => format!("Get a {singular} by ID"),
            OperationKind::Update => format!("Update a {singular}"),
            OperationKind::Delete => format!("Delete a {singular}"),
        };

        let item_ref = json!({ "$ref": format!("#/components/schemas/{}", self.component) });
        let request_body = registration.input.as_ref().map(|_| {
            let (key, action) = match kind {
                OperationKind::Create => (format!("Create{}Req", self.component), "creation"),
                _ => (format!("Update{}Req", self.component), "update"),
            };
            RequestBodySpec {
                description: format!("{} {action} data", self.component),
                schema: json!({ "$ref": format!("#/components/schemas/{key}") }),
                required: true,
            }
        });

        let mut responses = vec![match kind {
            OperationKind::List => ResponseSpec {
                status: 200,
                description: format!("List of {}", self.domain),
                schema: Some(data_envelope(json!({ "type": "array", "items": item_ref }))),
            },
            OperationKind::Create => ResponseSpec {
                status: 201,
                description: format!("Created {singular}"),
                schema: Some(data_envelope(item_ref)),
            },
            OperationKind::Read => ResponseSpec {
                status: 200,
                description: format!("The requested {singular}"),
                schema: Some(data_envelope(item_ref)),
            },
            OperationKind::Update => ResponseSpec {
                status: 200,
                description: format!("Updated {singular}"),
                schema: Some(data_envelope(item_ref)),
            },
            OperationKind::Delete => ResponseSpec {
                status: 204,
                description: format!("{} deleted successfully", self.component),
                schema: None,
            },
        }];

        if kind != OperationKind::Delete {
            responses.push(error_response(400, "Bad Request"));
        }
        if registration.visibility == Visibility::Protected {
            responses.push(error_response(401, "Unauthorized"));
        }
        if kind.is_instance() {
            responses.push(error_response(404, "Not Found"));
        }
        if kind.has_body() {
            responses.push(error_response(409, "Conflict"));
        }
        responses.push(error_response(500, "Internal Server Error"));

        OperationSpec {
            method: kind.method(),
            path,
            operation_id: format!("{}.{}", self.domain, kind.name()),
            summary,
            tags: vec![self.display_name.clone()],
            params,
            request_body,
            responses,
        }
    }
}

fn into_handler<F, Fut>(handler: F) -> CrudHandler
where
    F: Fn(OperationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx| Box::pin(handler(ctx)))
}

fn data_envelope(inner: Value) -> Value {
    json!({
        "type": "object",
        "required": ["data"],
        "properties": { "data": inner }
    })
}

fn error_response(status: u16, description: &str) -> ResponseSpec {
    ResponseSpec {
        status,
        description: description.to_string(),
        schema: Some(json!({ "$ref": "#/components/schemas/ErrorResponse" })),
    }
}

pub(crate) struct MountedOperation {
    pub method: Method,
    pub path: String,
    pub spec: OperationSpec,
    pub router: MethodRouter,
}

pub(crate) struct MountedResource {
    pub domain: String,
    pub operations: Vec<MountedOperation>,
    pub components: Vec<(String, Value)>,
}

// -------------------------------------------------------------------------
// Request pipeline
// -------------------------------------------------------------------------

struct CompiledOperation {
    kind: OperationKind,
    domain: String,
    visibility: Visibility,
    input: Option<Schema>,
    /// `list` validates the array wrapper, `delete` validates nothing.
    response: Option<Schema>,
    handler: CrudHandler,
}

impl CompiledOperation {
    /// The uniform per-request pipeline, identical in shape for all five
    /// operations. Every failure is terminal; exactly one response is
    /// produced and nothing is retried.
    async fn execute(
        &self,
        identity: Option<Arc<Identity>>,
        params: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Response {
        // Visibility gate runs before any body work.
        if self.visibility == Visibility::Protected && identity.is_none() {
            return ApiError::unauthorized("authentication required").into_response();
        }

        let input = match &self.input {
            Some(schema) => {
                let raw = body.unwrap_or_default();
                let value: Value = match serde_json::from_slice(&raw) {
                    Ok(v) => v,
                    Err(e) => {
                        return ApiError::invalid_input(format!(
                            "request body is not valid JSON: {e}"
                        ))
                        .into_response()
                    }
                };
                if let Err(issues) = schema.validate(&value) {
                    return ApiError::invalid_input("request body failed validation")
                        .with_details(Schema::issues_to_details(&issues))
                        .into_response();
                }
                Some(value)
            }
            None => None,
        };

        let (session, user) = match identity {
            Some(identity) => (Some(identity.session.clone()), Some(identity.user.clone())),
            None => (None, None),
        };
        let ctx = OperationContext {
            session,
            user,
            params,
            input,
        };

        let value = match (self.handler)(ctx).await {
            Ok(value) => value,
            // Returned error values bypass response-schema validation.
            Err(e) => return e.into_response(),
        };

        if self.kind == OperationKind::Delete {
            return StatusCode::NO_CONTENT.into_response();
        }

        if let Some(schema) = &self.response {
            if let Err(issues) = schema.validate(&value) {
                tracing::error!(
                    domain = %self.domain,
                    operation = self.kind.name(),
                    issues = issues.len(),
                    "handler returned data that fails its declared response schema"
                );
                return ApiError::new(
                    ErrorKind::InvalidData,
                    "handler returned data inconsistent with the declared response schema",
                )
                .with_details(Schema::issues_to_details(&issues))
                .into_response();
            }
        }

        let status = if self.kind == OperationKind::Create {
            StatusCode::CREATED
        } else {
            StatusCode::OK
        };
        (status, Json(json!({ "data": value }))).into_response()
    }
}

fn collect_params(raw: &RawPathParams) -> HashMap<String, String> {
    raw.iter()
        .map(|(name, value)| (name.to_owned(), value.to_owned()))
        .collect()
}

fn make_method_router(op: Arc<CompiledOperation>) -> MethodRouter {
    let method = op.kind.method();
    if op.kind.has_body() {
        let handler = move |Extension(identity): Extension<CurrentIdentity>,
                            raw: RawPathParams,
                            body: Bytes| {
            let op = op.clone();
            async move { op.execute(identity.0, collect_params(&raw), Some(body)).await }
        };
        match method {
            Method::POST => axum::routing::post(handler),
            Method::PATCH => axum::routing::patch(handler),
            _ => axum::routing::any(|| async { StatusCode::METHOD_NOT_ALLOWED }),
        }
    } else {
        let handler =
            move |Extension(identity): Extension<CurrentIdentity>, raw: RawPathParams| {
                let op = op.clone();
                async move { op.execute(identity.0, collect_params(&raw), None).await }
            };
        match method {
            Method::GET => axum::routing::get(handler),
            Method::DELETE => axum::routing::delete(handler),
            _ => axum::routing::any(|| async { StatusCode::METHOD_NOT_ALLOWED }),
        }
    }
}
