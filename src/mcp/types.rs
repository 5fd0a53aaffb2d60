//! Serializable response types for the MCP ingestion tools.
//!
//! Unsigned fields are described as plain non-negative integers; schemars'
//! own `uint` formats are not understood by every MCP client.

use schemars::{JsonSchema, Schema, SchemaGenerator, json_schema};
use serde::{Deserialize, Serialize};

use crate::shape::Shape;

/// Inferred shape of a local or remote JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ShapeResponse {
    /// Where the data came from: a local path or `user@host:path`
    pub source: String,
    pub shape: Shape,
    /// Byte budget applied while sampling
    #[schemars(schema_with = "non_negative")]
    pub max_bytes: usize,
    /// Depth bound applied while inferring
    #[schemars(schema_with = "non_negative")]
    pub max_depth: usize,
}

fn non_negative(_generator: &mut SchemaGenerator) -> Schema {
    json_schema!({
        "type": "integer",
        "minimum": 0
    })
}
