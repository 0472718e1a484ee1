//! Declarative CRUD routing on top of axum.
//!
//! Declare a resource with a domain name and a JSON response schema, attach
//! handlers for the CRUD operations it supports, and mount it on an [`App`].
//! Paths, path parameters, validation, the response envelope, the error
//! envelope, and the OpenAPI document are all derived from the declaration:
//!
//! ```no_run
//! use crudkit::{ApiError, App, AppConfig, Resource, Schema};
//! use serde_json::json;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let store = Schema::new(json!({
//!     "type": "object",
//!     "properties": {
//!         "id": { "type": "string" },
//!         "name": { "type": "string" }
//!     },
//!     "required": ["id", "name"]
//! }))?;
//!
//! let stores = Resource::new("stores", store)?
//!     .list(|_ctx| async { Ok::<_, ApiError>(json!([])) });
//!
//! App::new(AppConfig::default()).register(stores).serve().await
//! # }
//! ```
//!
//! Every successful response is wrapped as `{"data": ...}` (deletes answer
//! 204 with no body); every failure is `{error, message, details?}` with the
//! status derived from the [`ErrorKind`].

mod app;
mod auth;
mod error;
mod naming;
mod openapi;
mod operation;
mod request_id;
mod resource;
mod schema;

pub use app::{App, AppConfig};
pub use auth::{AllowAnonymous, Authenticator, CurrentIdentity, Identity};
pub use error::{ApiError, ErrorKind};
pub use openapi::{OpenApiComponents, OpenApiDoc, OpenApiInfo};
pub use operation::{OperationSpec, ParamSpec, RequestBodySpec, ResponseSpec};
pub use resource::{
    CrudHandler, HandlerResult, OperationConfig, OperationContext, Resource, ResourceError,
    Visibility,
};
pub use schema::{Schema, SchemaError, ValidationIssue};
