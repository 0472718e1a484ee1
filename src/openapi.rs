//! OpenAPI 3.0 document assembly from collected operation specs.
//!
//! The document is built once at router-assembly time and served as static
//! JSON; nothing here runs per request.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::operation::OperationSpec;

#[derive(Serialize, Debug)]
pub struct OpenApiDoc {
    pub openapi: &'static str,
    pub info: OpenApiInfo,
    pub paths: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub components: Option<OpenApiComponents>,
}

#[derive(Serialize, Debug)]
pub struct OpenApiInfo {
    pub title: String,
    pub version: String,
}

#[derive(Serialize, Debug, Default)]
pub struct OpenApiComponents {
    pub schemas: BTreeMap<String, Value>,
}

/// Assemble the document. Operations sharing a path merge into one path item
/// keyed by lowercase HTTP method; paths and methods are emitted in sorted
/// order so the output is deterministic.
pub(crate) fn build_document(
    title: &str,
    version: &str,
    specs: &[OperationSpec],
    schemas: &BTreeMap<String, Value>,
) -> OpenApiDoc {
    let mut paths: BTreeMap<String, BTreeMap<String, Value>> = BTreeMap::new();

    for spec in specs {
        let mut operation = Map::new();
        operation.insert(
            "operationId".to_string(),
            Value::String(spec.operation_id.clone()),
        );
        operation.insert("summary".to_string(), Value::String(spec.summary.clone()));

        if !spec.tags.is_empty() {
            operation.insert(
                "tags".to_string(),
                Value::Array(spec.tags.iter().cloned().map(Value::String).collect()),
            );
        }

        // All generated parameters are required path strings.
        if !spec.params.is_empty() {
            let parameters: Vec<Value> = spec
                .params
                .iter()
                .map(|p| {
                    json!({
                        "name": p.name.clone(),
                        "in": "path",
                        "required": true,
                        "description": p.description.clone(),
                        "schema": { "type": "string" },
                    })
                })
                .collect();
            operation.insert("parameters".to_string(), Value::Array(parameters));
        }

        if let Some(body) = &spec.request_body {
            operation.insert(
                "requestBody".to_string(),
                json!({
                    "description": body.description.clone(),
                    "required": body.required,
                    "content": {
                        "application/json": { "schema": body.schema.clone() }
                    },
                }),
            );
        }

        let mut responses = Map::new();
        for response in &spec.responses {
            let mut obj = Map::new();
            obj.insert(
                "description".to_string(),
                Value::String(response.description.clone()),
            );
            // Bodyless responses (204) carry no content object.
            if let Some(schema) = &response.schema {
                obj.insert(
                    "content".to_string(),
                    json!({ "application/json": { "schema": schema.clone() } }),
                );
            }
            responses.insert(response.status.to_string(), Value::Object(obj));
        }
        operation.insert("responses".to_string(), Value::Object(responses));

        paths
            .entry(spec.path.clone())
            .or_default()
            .insert(spec.method.as_str().to_lowercase(), Value::Object(operation));
    }

    let paths_value: Map<String, Value> = paths
        .into_iter()
        .map(|(path, ops)| (path, Value::Object(ops.into_iter().collect())))
        .collect();

    OpenApiDoc {
        openapi: "3.0.3",
        info: OpenApiInfo {
            title: title.to_string(),
            version: version.to_string(),
        },
        paths: Value::Object(paths_value),
        components: Some(OpenApiComponents {
            schemas: schemas.clone(),
        }),
    }
}
