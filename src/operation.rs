//! Route metadata descriptors emitted per registered operation.
//!
//! These feed the OpenAPI generator; the transport wiring itself lives in
//! [`crate::resource`].

use http::Method;
use serde_json::Value;

/// Path parameter metadata. crudkit only generates path parameters, and all
/// of them are required strings.
#[derive(Clone, Debug)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
}

/// JSON request body metadata for `create`/`update` operations.
#[derive(Clone, Debug)]
pub struct RequestBodySpec {
    pub description: String,
    /// Schema for the body, usually a `$ref` into components.
    pub schema: Value,
    pub required: bool,
}

/// One declared response of an operation.
#[derive(Clone, Debug)]
pub struct ResponseSpec {
    pub status: u16,
    pub description: String,
    /// Response body schema; `None` for bodyless responses (204).
    pub schema: Option<Value>,
}

/// Full metadata for one generated route.
#[derive(Clone, Debug)]
pub struct OperationSpec {
    pub method: Method,
    pub path: String,
    pub operation_id: String,
    pub summary: String,
    pub tags: Vec<String>,
    pub params: Vec<ParamSpec>,
    pub request_body: Option<RequestBodySpec>,
    pub responses: Vec<ResponseSpec>,
}
