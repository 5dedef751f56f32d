use serde::{Deserialize, Serialize};

use crate::config::{PocConfig, PocMetadata};
use crate::errors::{ProbeError, Stage};
use crate::pipeline::RunReport;

/// Why a run produced no verdict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScanFailure {
    pub error_type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage: Option<Stage>,
}

impl From<&ProbeError> for ScanFailure {
    fn from(error: &ProbeError) -> Self {
        let (rule, stage) = match error.attribution() {
            Some((rule, stage)) => (Some(rule.to_string()), Some(stage)),
            None => (None, None),
        };
        Self {
            error_type: error.classify().error_type.to_string(),
            message: error.to_string(),
            rule,
            stage,
        }
    }
}

/// One POC run against one target, as written to scan output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRecord {
    pub poc: String,
    pub poc_file: String,
    #[serde(default)]
    pub metadata: PocMetadata,
    pub target: String,
    /// `None` when the run aborted.
    pub verdict: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<RunReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ScanFailure>,
}

impl ScanRecord {
    pub fn completed(poc_file: &str, config: &PocConfig, report: RunReport) -> Self {
        Self {
            poc: config.display_name().to_string(),
            poc_file: poc_file.to_string(),
            metadata: config.metadata(),
            target: report.target.clone(),
            verdict: Some(report.verdict),
            report: Some(report),
            error: None,
        }
    }

    pub fn aborted(poc_file: &str, config: &PocConfig, target: &str, error: &ProbeError) -> Self {
        Self {
            poc: config.display_name().to_string(),
            poc_file: poc_file.to_string(),
            metadata: config.metadata(),
            target: target.to_string(),
            verdict: None,
            report: None,
            error: Some(ScanFailure::from(error)),
        }
    }

    pub fn is_vulnerable(&self) -> bool {
        self.verdict == Some(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_carries_attribution() {
        let err = ProbeError::UnsupportedExpression("response.status".into()).in_rule("r1", Stage::ResponseValidation);
        let failure = ScanFailure::from(&err);
        assert_eq!(failure.error_type, "UnsupportedExpressionError");
        assert_eq!(failure.rule.as_deref(), Some("r1"));
        assert_eq!(failure.stage, Some(Stage::ResponseValidation));
    }

    #[test]
    fn test_aborted_record_serialization() {
        let config = PocConfig { name: Some("demo".into()), level: Some("high".into()), ..Default::default() };
        let err = ProbeError::Config("bad".into());
        let record = ScanRecord::aborted("pocs/demo.yaml", &config, "http://t", &err);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["poc"], "demo");
        assert_eq!(json["metadata"]["level"], "high");
        assert!(json["verdict"].is_null());
        assert!(json.get("report").is_none());
        assert_eq!(json["error"]["error_type"], "ConfigError");
        assert!(!record.is_vulnerable());
    }
}
