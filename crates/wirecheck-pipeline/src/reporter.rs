//! Verdict payloads and the reporters that publish them

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use wirecheck_core::config::ReporterSettings;
use wirecheck_core::{FunctionId, ReachabilityStatus, RepoId, Tier};

use crate::error::ReportError;
use crate::pipeline::ChangeEvent;

/// Outcome of a completed analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Conclusion {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReportStatus {
    Completed { conclusion: Conclusion },
    /// The analysis did not finish; never a blocking verdict.
    Inconclusive { reason: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    pub reachable: usize,
    pub likely_reachable: usize,
    pub unreachable: usize,
    pub allowed: usize,
}

impl TierCounts {
    /// Count one verdict; `None` is an allowed orphan.
    pub fn record(&mut self, tier: Option<Tier>) {
        match tier {
            Some(Tier::Reachable) => self.reachable += 1,
            Some(Tier::LikelyReachable) => self.likely_reachable += 1,
            Some(Tier::Unreachable) => self.unreachable += 1,
            None => self.allowed += 1,
        }
    }
}

/// Verdict for one new or newly exported function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionVerdict {
    pub function: FunctionId,
    pub qualified_name: String,
    pub file: PathBuf,
    pub line: u32,
    /// `None` when an allowed-orphan rule matched.
    pub tier: Option<Tier>,
    pub status: ReachabilityStatus,
    /// Production files that mention the function by name.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<PathBuf>,
    /// Test files that mention it; they do not count as corroboration.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub non_qualifying_references: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_by: Option<String>,
}

impl FunctionVerdict {
    pub fn is_blocking(&self) -> bool {
        self.tier.is_some_and(Tier::is_blocking)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerdictReport {
    pub repo: RepoId,
    pub revision: String,
    pub head_ref: String,
    #[serde(default)]
    pub base_ref: Option<String>,
    #[serde(flatten)]
    pub status: ReportStatus,
    pub entry_points: usize,
    pub new_exports: usize,
    pub counts: TierCounts,
    pub functions: Vec<FunctionVerdict>,
}

impl VerdictReport {
    /// A completed verdict; it fails when any function lands in the blocking tier.
    pub fn completed(event: &ChangeEvent, entry_points: usize, functions: Vec<FunctionVerdict>) -> Self {
        let mut counts = TierCounts::default();
        for verdict in &functions {
            counts.record(verdict.tier);
        }
        let conclusion = if counts.unreachable > 0 {
            Conclusion::Fail
        } else {
            Conclusion::Pass
        };
        VerdictReport {
            repo: event.repo.clone(),
            revision: event.revision.clone(),
            head_ref: event.head_ref.clone(),
            base_ref: event.base_ref.clone(),
            status: ReportStatus::Completed { conclusion },
            entry_points,
            new_exports: functions.len(),
            counts,
            functions,
        }
    }

    pub fn inconclusive(event: &ChangeEvent, reason: impl Into<String>) -> Self {
        VerdictReport {
            repo: event.repo.clone(),
            revision: event.revision.clone(),
            head_ref: event.head_ref.clone(),
            base_ref: event.base_ref.clone(),
            status: ReportStatus::Inconclusive { reason: reason.into() },
            entry_points: 0,
            new_exports: 0,
            counts: TierCounts::default(),
            functions: Vec::new(),
        }
    }

    pub fn is_blocking(&self) -> bool {
        self.status
            == ReportStatus::Completed {
                conclusion: Conclusion::Fail,
            }
    }

    pub fn is_inconclusive(&self) -> bool {
        matches!(self.status, ReportStatus::Inconclusive { .. })
    }
}

/// The external check/reporting collaborator.
#[async_trait]
pub trait VerdictReporter: Send + Sync {
    async fn publish(&self, report: &VerdictReport) -> Result<(), ReportError>;
}

/// Writes verdicts to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogReporter;

#[async_trait]
impl VerdictReporter for LogReporter {
    async fn publish(&self, report: &VerdictReport) -> Result<(), ReportError> {
        match &report.status {
            ReportStatus::Completed { conclusion } => {
                info!(
                    "{} at {}: {:?} ({} new exports: {} reachable, {} likely reachable, {} unreachable, {} allowed)",
                    report.repo,
                    report.revision,
                    conclusion,
                    report.new_exports,
                    report.counts.reachable,
                    report.counts.likely_reachable,
                    report.counts.unreachable,
                    report.counts.allowed
                );
                for verdict in report.functions.iter().filter(|v| v.is_blocking()) {
                    warn!(
                        "Unwired export {}:{} (line {})",
                        verdict.file.display(),
                        verdict.qualified_name,
                        verdict.line
                    );
                }
            }
            ReportStatus::Inconclusive { reason } => {
                warn!("{} at {}: inconclusive ({})", report.repo, report.revision, reason);
            }
        }
        Ok(())
    }
}

/// POSTs verdicts as JSON to a reporting endpoint.
#[derive(Debug, Clone)]
pub struct HttpReporter {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl HttpReporter {
    pub fn new(url: impl Into<String>, token: Option<String>) -> Self {
        HttpReporter {
            client: reqwest::Client::new(),
            url: url.into(),
            token,
        }
    }
}

#[async_trait]
impl VerdictReporter for HttpReporter {
    async fn publish(&self, report: &VerdictReport) -> Result<(), ReportError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(report);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        info!("Published verdict for {} at {} to {}", report.repo, report.revision, self.url);
        Ok(())
    }
}

/// The HTTP reporter when a URL is configured, the log otherwise.
pub fn reporter_from_settings(settings: &ReporterSettings) -> Arc<dyn VerdictReporter> {
    match &settings.url {
        Some(url) => Arc::new(HttpReporter::new(url.clone(), settings.token.clone())),
        None => Arc::new(LogReporter),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ChangeAction;

    fn event() -> ChangeEvent {
        ChangeEvent {
            repo: RepoId::new("acme/widgets"),
            revision: "abc123".to_string(),
            head_ref: "feature/pricing".to_string(),
            base_ref: Some("main".to_string()),
            action: ChangeAction::Opened,
            pull_request: Some(7),
        }
    }

    fn verdict(name: &str, tier: Option<Tier>) -> FunctionVerdict {
        FunctionVerdict {
            function: FunctionId(1),
            qualified_name: name.to_string(),
            file: PathBuf::from("src/pricing.ts"),
            line: 1,
            tier,
            status: ReachabilityStatus::Unreachable,
            references: Vec::new(),
            non_qualifying_references: Vec::new(),
            allowed_by: None,
        }
    }

    #[test]
    fn test_counts_and_conclusion() {
        let report = VerdictReport::completed(
            &event(),
            3,
            vec![
                verdict("a", Some(Tier::Reachable)),
                verdict("b", Some(Tier::LikelyReachable)),
                verdict("c", None),
            ],
        );
        assert_eq!(report.status, ReportStatus::Completed { conclusion: Conclusion::Pass });
        assert_eq!(report.new_exports, 3);
        assert_eq!(report.counts.allowed, 1);
        assert!(!report.is_blocking());

        let failing = VerdictReport::completed(&event(), 3, vec![verdict("d", Some(Tier::Unreachable))]);
        assert!(failing.is_blocking());
    }

    #[test]
    fn test_inconclusive_never_blocks() {
        let report = VerdictReport::inconclusive(&event(), "clone failed");
        assert!(report.is_inconclusive());
        assert!(!report.is_blocking());

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "inconclusive");
        assert_eq!(json["reason"], "clone failed");
    }

    #[test]
    fn test_payload_shape() {
        let mut allowed = verdict("legacyShim", None);
        allowed.allowed_by = Some("src/legacy/shim.ts:*".to_string());
        let report = VerdictReport::completed(&event(), 1, vec![allowed]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "completed");
        assert_eq!(json["conclusion"], "pass");
        assert_eq!(json["counts"]["allowed"], 1);
        assert_eq!(json["functions"][0]["allowed_by"], "src/legacy/shim.ts:*");
        assert_eq!(json["functions"][0]["function"], "0000000000000001");
        assert!(json["functions"][0].get("references").is_none());

        let back: VerdictReport = serde_json::from_value(json).unwrap();
        assert_eq!(back, report);
    }
}
