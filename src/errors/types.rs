use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stage of the per-rule pipeline a fatal error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Request,
    Extraction,
    CookieValidation,
    ResponseValidation,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Extraction => "extraction",
            Self::CookieValidation => "cookie-validation",
            Self::ResponseValidation => "response-validation",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("Request failed after {attempts} attempt(s): {message}")]
    Request { attempts: u32, message: String },

    #[error("Cookie extraction failed: {0}")]
    Extraction(String),

    #[error("Response is empty, nothing to extract from")]
    EmptyResponse,

    #[error("Unsupported cookie extraction expression: {0}")]
    UnsupportedExtraction(String),

    #[error("Invalid extraction pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Cookie expression could not be evaluated: {0}")]
    ValidationParse(#[source] Box<ProbeError>),

    #[error("Malformed expression '{expr}': {reason}")]
    ExpressionParse { expr: String, reason: String },

    #[error("Unsupported expression: {0}")]
    UnsupportedExpression(String),

    #[error("Type mismatch: '{operand}' is not an integer in '{expr}'")]
    TypeMismatch { operand: String, expr: String },

    #[error("Rule '{rule}' failed during {stage}: {source}")]
    Rule {
        rule: String,
        stage: Stage,
        #[source]
        source: Box<ProbeError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl ProbeError {
    pub(crate) fn parse(expr: &str, reason: impl Into<String>) -> Self {
        Self::ExpressionParse {
            expr: expr.to_string(),
            reason: reason.into(),
        }
    }

    /// Attribute this error to a rule and pipeline stage.
    pub fn in_rule(self, rule: &str, stage: Stage) -> Self {
        Self::Rule {
            rule: rule.to_string(),
            stage,
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping rule attribution and validation wrappers.
    pub fn root(&self) -> &ProbeError {
        match self {
            Self::Rule { source, .. } | Self::ValidationParse(source) => source.root(),
            other => other,
        }
    }

    /// Rule name and stage, when the error was raised inside a rule.
    pub fn attribution(&self) -> Option<(&str, Stage)> {
        match self {
            Self::Rule { rule, stage, .. } => Some((rule.as_str(), *stage)),
            _ => None,
        }
    }
}
