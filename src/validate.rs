//! Pre-redaction report validation.

use crate::redact;
use crate::types::ErrorReport;

/// Result of validating a report.
///
/// `reject` is terminal; `warnings` are informational and surfaced to the
/// health monitor without blocking the report.
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub reject: Option<String>,
    pub warnings: Vec<String>,
    /// Serialized size computed during the size check, reused downstream.
    pub serialized_size: usize,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.reject.is_none()
    }
}

/// Validate a formatted report.
///
/// Checks, in order: required fields present, serialized size within the
/// cap. Sensitive-pattern hits are warning-only.
pub fn validate_report(report: &ErrorReport, max_payload_size: usize) -> ValidationReport {
    let serialized_size = report.serialized_size();

    let reject = required_field_gap(report).map(str::to_string).or_else(|| {
        if serialized_size > max_payload_size {
            Some(format!(
                "payload size {} exceeds limit {}",
                serialized_size, max_payload_size
            ))
        } else {
            None
        }
    });

    let warnings = redact::detect_report(report)
        .into_iter()
        .map(|kind| format!("sensitive pattern detected: {}", kind))
        .collect();

    ValidationReport {
        reject,
        warnings,
        serialized_size,
    }
}

fn required_field_gap(report: &ErrorReport) -> Option<&'static str> {
    if report.message.trim().is_empty() {
        return Some("message is empty");
    }
    if report.exception_class.trim().is_empty() {
        return Some("exception class is empty");
    }
    if report.project.trim().is_empty() {
        return Some("project is empty");
    }
    if report.environment.trim().is_empty() {
        return Some("environment is empty");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn report(message: &str) -> ErrorReport {
        ErrorReport {
            message: message.to_string(),
            exception_class: "TestError".to_string(),
            stack_trace: String::new(),
            file: "unknown".to_string(),
            line: 0,
            project: "demo".to_string(),
            environment: "test".to_string(),
            timestamp: Utc::now(),
            session_id: Uuid::new_v4(),
            user: None,
            context: HashMap::new(),
            breadcrumbs: Vec::new(),
            runtime: None,
            request: None,
            commit_hash: None,
            version: None,
            custom_data: None,
        }
    }

    #[test]
    fn well_formed_report_is_valid() {
        let v = validate_report(&report("boom"), 1024 * 1024);
        assert!(v.is_valid());
        assert!(v.warnings.is_empty());
        assert!(v.serialized_size > 0);
    }

    #[test]
    fn empty_message_rejects() {
        let v = validate_report(&report("   "), 1024 * 1024);
        assert!(!v.is_valid());
    }

    #[test]
    fn size_boundary_is_inclusive() {
        let r = report("boom");
        let size = r.serialized_size();

        let at_limit = validate_report(&r, size);
        assert!(at_limit.is_valid());

        let over_limit = validate_report(&r, size - 1);
        assert!(!over_limit.is_valid());
    }

    #[test]
    fn sensitive_patterns_warn_without_rejecting() {
        let v = validate_report(&report("mail a@b.co"), 1024 * 1024);
        assert!(v.is_valid());
        assert_eq!(v.warnings, vec!["sensitive pattern detected: email"]);
    }
}
