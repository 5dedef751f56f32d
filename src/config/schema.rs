use serde_json::{json, Value};
use std::sync::LazyLock;

pub static POC_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "name": { "type": "string" },
            "author": { "type": "string" },
            "category": { "type": "string" },
            "cve_id": { "type": "string" },
            "level": { "type": "string" },
            "source": { "type": "string" },
            "s1": { "type": "string" },
            "expression": { "type": ["string", "null"] },
            "rules": {
                "type": "object",
                "minProperties": 1,
                "additionalProperties": { "$ref": "#/$defs/rule" }
            }
        },
        "required": ["rules"],
        "$defs": {
            "rule": {
                "type": "object",
                "properties": {
                    "method": { "type": "string" },
                    "path": { "type": "string" },
                    "timeout": { "type": "integer" },
                    "retry_count": { "type": "integer" },
                    "headers": {
                        "type": "object",
                        "additionalProperties": { "type": "string" }
                    },
                    "body": {
                        "oneOf": [
                            { "type": "string" },
                            { "type": "array", "items": { "type": "string" } },
                            { "type": "null" }
                        ]
                    },
                    "extract_cookie": { "type": ["string", "null"] },
                    "use_cookie": { "type": ["string", "null"] },
                    "cookie_expression": { "type": ["string", "null"] },
                    "expression": { "type": ["string", "null"] }
                },
                "additionalProperties": false
            }
        }
    })
});
