use std::path::Path;

use tracing::warn;

use super::schema::POC_SCHEMA;
use super::types::PocConfig;
use crate::errors::ProbeError;
use crate::expression::AggregateExpression;

const MAX_CONFIG_BYTES: u64 = 1_048_576;
const KNOWN_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

pub async fn parse_config(path: &Path) -> Result<PocConfig, ProbeError> {
    if !path.exists() {
        return Err(ProbeError::Config(format!("POC file not found: {}", path.display())));
    }

    let metadata = tokio::fs::metadata(path).await?;
    if metadata.len() > MAX_CONFIG_BYTES {
        return Err(ProbeError::Config(format!("POC file exceeds 1MB limit: {}", path.display())));
    }

    let content = tokio::fs::read_to_string(path).await?;
    parse_config_str(&content)
}

/// Parse and check a POC document held in memory.
pub fn parse_config_str(content: &str) -> Result<PocConfig, ProbeError> {
    let yaml: serde_yaml::Value = serde_yaml::from_str(content)?;

    // JSON Schema validation
    validate_schema(&yaml)?;

    let config: PocConfig = serde_yaml::from_value(yaml)?;

    validate_semantics(&config)?;

    Ok(config)
}

/// Structural check against [`POC_SCHEMA`]. Violations are logged, not fatal;
/// the typed parse that follows decides what is acceptable.
fn validate_schema(yaml: &serde_yaml::Value) -> Result<(), ProbeError> {
    let json_str = serde_json::to_string(yaml)
        .map_err(|e| ProbeError::Config(format!("POC conversion error: {}", e)))?;
    let json_value: serde_json::Value = serde_json::from_str(&json_str)
        .map_err(|e| ProbeError::Config(format!("POC conversion error: {}", e)))?;

    let compiled = jsonschema::JSONSchema::compile(&POC_SCHEMA)
        .map_err(|e| ProbeError::Config(format!("Schema compilation error: {}", e)))?;

    let result = compiled.validate(&json_value);
    if let Err(errors) = result {
        for msg in errors.map(|e| format!("{} at {}", e, e.instance_path)) {
            warn!(validation_error = %msg, "POC schema warning");
        }
    }

    Ok(())
}

fn validate_semantics(config: &PocConfig) -> Result<(), ProbeError> {
    if config.rules.is_empty() {
        return Err(ProbeError::Config("POC declares no rules".into()));
    }

    for (name, rule) in config.rules.iter() {
        if !KNOWN_METHODS.contains(&rule.method.to_ascii_uppercase().as_str()) {
            warn!(rule = %name, method = %rule.method, "Unusual HTTP method");
        }
        if rule.path.is_empty() {
            warn!(rule = %name, "Rule has an empty path, the base URL is requested as-is");
        }
    }

    let declared = config.expression.as_deref();
    if AggregateExpression::is_declared(declared) {
        let expr = AggregateExpression::parse(declared.unwrap_or_default())?;
        for referenced in expr.referenced_rules() {
            if !config.rules.contains(referenced) {
                warn!(rule = %referenced, "Expression references an undeclared rule, it will evaluate to false");
            }
        }
    }

    Ok(())
}
