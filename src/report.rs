//! Report Aggregation
//!
//! Structured findings, per-invocation results, and the aggregator that merges
//! findings from a whole call subtree into one ordered, de-duplicated report.

use crate::error::DispatchError;
use crate::types::{CallId, Tier};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Outcome of one invocation (or of a workflow as a whole).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum InvocationStatus {
    Success,
    /// Command finished but one or more best-effort steps failed
    SuccessWithWarnings,
    Timeout,
    PermissionViolation,
    CycleDetected,
    Disabled,
    NotFound,
    Error,
}

impl InvocationStatus {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            InvocationStatus::Success | InvocationStatus::SuccessWithWarnings
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InvocationStatus::Success => "success",
            InvocationStatus::SuccessWithWarnings => "success-with-warnings",
            InvocationStatus::Timeout => "timeout",
            InvocationStatus::PermissionViolation => "permission-violation",
            InvocationStatus::CycleDetected => "cycle-detected",
            InvocationStatus::Disabled => "disabled",
            InvocationStatus::NotFound => "not-found",
            InvocationStatus::Error => "error",
        }
    }
}

impl Default for InvocationStatus {
    fn default() -> Self {
        InvocationStatus::Success
    }
}

impl fmt::Display for InvocationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Finding severity. Orders as `Info < Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Info
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// Source location a finding refers to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Unit of structured output merged by the aggregator.
///
/// `status` flags findings that describe a failed invocation (for example a
/// best-effort step that timed out); findings reported by a component itself
/// carry `success`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    #[serde(default)]
    pub source_component: String,
    #[serde(default)]
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(default)]
    pub status: InvocationStatus,
}

impl Finding {
    pub fn new(source: impl Into<String>, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            source_component: source.into(),
            severity,
            message: message.into(),
            location: None,
            status: InvocationStatus::Success,
        }
    }

    /// Finding describing a failed invocation.
    pub fn failure(
        source: impl Into<String>,
        status: InvocationStatus,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            status,
            ..Self::new(source, severity, message)
        }
    }

    pub fn with_location(mut self, path: impl Into<PathBuf>, line: Option<u32>) -> Self {
        self.location = Some(Location {
            path: path.into(),
            line,
        });
        self
    }
}

/// Result of one invocation, including the results of the nested calls it issued.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvocationResult {
    pub call_id: CallId,
    pub component: String,
    pub tier: Tier,
    pub status: InvocationStatus,
    pub findings: Vec<Finding>,
    /// Final answer text reported by the component, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Why the invocation did not succeed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub elapsed: Duration,
    /// Nested invocations in the order they were issued
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<InvocationResult>,
}

impl InvocationResult {
    pub fn new(call_id: CallId, component: impl Into<String>, tier: Tier) -> Self {
        Self {
            call_id,
            component: component.into(),
            tier,
            status: InvocationStatus::Success,
            findings: Vec::new(),
            output: None,
            reason: None,
            elapsed: Duration::ZERO,
            children: Vec::new(),
        }
    }

    /// Result for a call refused before any execution took place.
    pub fn rejected(
        call_id: CallId,
        component: impl Into<String>,
        tier: Tier,
        error: &DispatchError,
    ) -> Self {
        Self {
            status: error.status(),
            reason: Some(error.to_string()),
            ..Self::new(call_id, component, tier)
        }
    }

    pub fn failed(
        call_id: CallId,
        component: impl Into<String>,
        tier: Tier,
        status: InvocationStatus,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            status,
            reason: Some(reason.into()),
            ..Self::new(call_id, component, tier)
        }
    }

    /// Count of invocations in this subtree (including this one)
    pub fn invocation_count(&self) -> usize {
        1 + self
            .children
            .iter()
            .map(InvocationResult::invocation_count)
            .sum::<usize>()
    }
}

/// Merges findings across a call subtree.
///
/// Findings are visited in invocation order (a parent before the calls it
/// issued, siblings in issue order), de-duplicated on
/// `(source_component, message)` keeping the first occurrence, then stably
/// ordered by severity descending. Completion order never matters.
#[derive(Debug, Default)]
pub struct ReportAggregator {
    seen: HashSet<(String, String)>,
    findings: Vec<Finding>,
}

impl ReportAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a result and every nested result below it.
    pub fn add_result(&mut self, result: &InvocationResult) {
        self.add_findings(result.findings.iter().cloned());
        for child in &result.children {
            self.add_result(child);
        }
    }

    pub fn add_finding(&mut self, finding: Finding) {
        let key = (finding.source_component.clone(), finding.message.clone());
        if self.seen.insert(key) {
            self.findings.push(finding);
        }
    }

    pub fn add_findings(&mut self, findings: impl IntoIterator<Item = Finding>) {
        for finding in findings {
            self.add_finding(finding);
        }
    }

    pub fn len(&self) -> usize {
        self.findings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn finish(mut self) -> Vec<Finding> {
        // sort_by is stable: equal severities keep invocation order
        self.findings.sort_by(|a, b| b.severity.cmp(&a.severity));
        self.findings
    }
}

/// Aggregate findings across a list of sibling results, in the given order.
pub fn aggregate(results: &[InvocationResult]) -> Vec<Finding> {
    let mut aggregator = ReportAggregator::new();
    for result in results {
        aggregator.add_result(result);
    }
    aggregator.finish()
}
