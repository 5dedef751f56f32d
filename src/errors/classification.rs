use super::types::ProbeError;

#[derive(Debug, Clone)]
pub struct ErrorClassification {
    pub error_type: &'static str,
    /// Whether the error aborts the whole run rather than being recorded per rule.
    pub fatal: bool,
}

impl ProbeError {
    /// Classify this error by type name and by whether it ends a run.
    ///
    /// Anything rooted in malformed configuration or expressions is fatal.
    /// Anything rooted in response content is a per-rule outcome.
    pub fn classify(&self) -> ErrorClassification {
        match self {
            // Transport exhaustion
            ProbeError::Request { .. } => ErrorClassification {
                error_type: "RequestError",
                fatal: true,
            },

            // Response-content outcomes
            ProbeError::Extraction(_) => ErrorClassification {
                error_type: "ExtractionError",
                fatal: false,
            },
            ProbeError::EmptyResponse => ErrorClassification {
                error_type: "EmptyResponseError",
                fatal: false,
            },

            // Extraction failures are swallowed by the orchestrator even when
            // the expression is unsupported; the error type still says why.
            ProbeError::UnsupportedExtraction(_) => ErrorClassification {
                error_type: "UnsupportedExtractionError",
                fatal: false,
            },
            ProbeError::InvalidPattern { .. } => ErrorClassification {
                error_type: "InvalidPatternError",
                fatal: false,
            },

            // Malformed expressions
            ProbeError::ValidationParse(_) => ErrorClassification {
                error_type: "ValidationParseError",
                fatal: true,
            },
            ProbeError::ExpressionParse { .. } => ErrorClassification {
                error_type: "ExpressionParseError",
                fatal: true,
            },
            ProbeError::UnsupportedExpression(_) => ErrorClassification {
                error_type: "UnsupportedExpressionError",
                fatal: true,
            },
            ProbeError::TypeMismatch { .. } => ErrorClassification {
                error_type: "TypeMismatchError",
                fatal: true,
            },

            ProbeError::Rule { source, .. } => source.classify(),

            ProbeError::Config(_) => ErrorClassification {
                error_type: "ConfigError",
                fatal: true,
            },
            ProbeError::Io(_) => ErrorClassification {
                error_type: "IoError",
                fatal: true,
            },
            ProbeError::Json(_) => ErrorClassification {
                error_type: "JsonError",
                fatal: true,
            },
            ProbeError::Yaml(_) => ErrorClassification {
                error_type: "YamlError",
                fatal: true,
            },
        }
    }
}
