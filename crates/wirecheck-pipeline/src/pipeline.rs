//! Ephemeral change analysis for one pull-request revision
//!
//! A run checks the candidate out, parses it into a transient graph, diffs its
//! exports against the persisted main-branch snapshot and classifies every new
//! export. It only ever holds a read-only handle to the store. Everything it
//! allocates lives inside `run` and is dropped when the run ends, however it ends.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use wirecheck_core::config::Settings;
use wirecheck_core::{
    Disposition, FunctionId, GraphReader, ParseRepository, ParsedRepository, Policy, ReachabilityEngine,
    ReferenceCorroborator, RepoGraph, RepoId, SourceSet, classify,
};

use crate::cancel::CancellationToken;
use crate::error::PipelineError;
use crate::reporter::{FunctionVerdict, VerdictReport, VerdictReporter};
use crate::retry::RetryPolicy;
use crate::source::{Checkout, RevisionSource};

/// What happened to the revision stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    #[serde(alias = "reopened")]
    Opened,
    #[serde(alias = "synchronize")]
    Updated,
    Closed,
    /// A push to the default branch.
    Pushed,
}

/// A logical unit of scheduling: the default branch, one pull request, or a
/// proposed branch without a pull request number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
    DefaultBranch,
    PullRequest(u64),
    Branch(String),
}

impl Stream {
    /// Whether a newer event may abort a run that already started.
    pub fn is_proposal(&self) -> bool {
        !matches!(self, Stream::DefaultBranch)
    }
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::DefaultBranch => write!(f, "default branch"),
            Stream::PullRequest(number) => write!(f, "#{number}"),
            Stream::Branch(name) => write!(f, "branch {name}"),
        }
    }
}

/// A change notification from the hosting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub repo: RepoId,
    pub revision: String,
    pub head_ref: String,
    #[serde(default)]
    pub base_ref: Option<String>,
    pub action: ChangeAction,
    #[serde(default)]
    pub pull_request: Option<u64>,
}

impl ChangeEvent {
    pub fn push(repo: RepoId, revision: impl Into<String>, head_ref: impl Into<String>) -> Self {
        ChangeEvent {
            repo,
            revision: revision.into(),
            head_ref: head_ref.into(),
            base_ref: None,
            action: ChangeAction::Pushed,
            pull_request: None,
        }
    }

    /// Only pushes remap the default branch. Everything else is a proposal.
    pub fn stream(&self) -> Stream {
        match (self.action, self.pull_request) {
            (ChangeAction::Pushed, _) => Stream::DefaultBranch,
            (_, Some(number)) => Stream::PullRequest(number),
            (_, None) => Stream::Branch(self.head_ref.clone()),
        }
    }

    /// The pushed ref without its `refs/heads/` prefix.
    pub fn branch_name(&self) -> &str {
        self.head_ref.strip_prefix("refs/heads/").unwrap_or(&self.head_ref)
    }
}

/// Lifecycle of one analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    Queued,
    Cloned,
    Parsed,
    Diffed,
    Classified,
    Published,
    Discarded,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Queued => "queued",
            Stage::Cloned => "cloned",
            Stage::Parsed => "parsed",
            Stage::Diffed => "diffed",
            Stage::Classified => "classified",
            Stage::Published => "published",
            Stage::Discarded => "discarded",
        };
        f.write_str(name)
    }
}

/// Stage bookkeeping; reaching `Discarded` is tied to drop so no path skips it.
struct RunTracker<'a> {
    event: &'a ChangeEvent,
    stage: Stage,
}

impl<'a> RunTracker<'a> {
    fn new(event: &'a ChangeEvent) -> Self {
        debug!("{} {} at {}: {}", event.repo, event.stream(), event.revision, Stage::Queued);
        RunTracker {
            event,
            stage: Stage::Queued,
        }
    }

    fn advance(&mut self, stage: Stage) {
        debug!(
            "{} {} at {}: {} -> {}",
            self.event.repo,
            self.event.stream(),
            self.event.revision,
            self.stage,
            stage
        );
        self.stage = stage;
    }
}

impl Drop for RunTracker<'_> {
    fn drop(&mut self) {
        debug!(
            "{} {} at {}: {} -> {}, transient state released",
            self.event.repo,
            self.event.stream(),
            self.event.revision,
            self.stage,
            Stage::Discarded
        );
    }
}

/// Parse a checked-out tree off the async runtime.
pub(crate) async fn parse_checkout(
    parser: &Arc<dyn ParseRepository>,
    checkout: &Checkout,
) -> Result<ParsedRepository, PipelineError> {
    let parser = Arc::clone(parser);
    let root = checkout.path().to_path_buf();
    tokio::task::spawn_blocking(move || parser.parse(&root))
        .await
        .map_err(|e| PipelineError::Task(e.to_string()))?
        .map_err(PipelineError::Parse)
}

/// The change-analysis pipeline.
pub struct AnalysisPipeline {
    store: Arc<dyn GraphReader>,
    source: Arc<dyn RevisionSource>,
    parser: Arc<dyn ParseRepository>,
    reporter: Arc<dyn VerdictReporter>,
    engine: ReachabilityEngine,
    corroborator: ReferenceCorroborator,
    retry: RetryPolicy,
    timeout: Duration,
    policy_file: String,
}

impl AnalysisPipeline {
    pub fn new(
        store: Arc<dyn GraphReader>,
        source: Arc<dyn RevisionSource>,
        parser: Arc<dyn ParseRepository>,
        reporter: Arc<dyn VerdictReporter>,
        settings: &Settings,
    ) -> Self {
        AnalysisPipeline {
            store,
            source,
            parser,
            reporter,
            engine: ReachabilityEngine::new(settings.analysis.max_hops),
            corroborator: ReferenceCorroborator::new(settings.analysis.min_identifier_length),
            retry: RetryPolicy::from_settings(&settings.pipeline),
            timeout: settings.pipeline.timeout(),
            policy_file: settings.pipeline.policy_file.clone(),
        }
    }

    /// Analyze one revision and publish the verdict.
    ///
    /// Failures and timeouts publish an inconclusive verdict. A cancelled run
    /// publishes nothing and returns `Err(Cancelled)`.
    pub async fn run(&self, event: &ChangeEvent, token: &CancellationToken) -> Result<VerdictReport, PipelineError> {
        let mut tracker = RunTracker::new(event);

        let outcome = tokio::time::timeout(self.timeout, self.analyze(event, token, &mut tracker)).await;
        let report = match outcome {
            Ok(Ok(report)) => report,
            Ok(Err(PipelineError::Cancelled)) => {
                debug!("{} {} at {}: cancelled", event.repo, event.stream(), event.revision);
                return Err(PipelineError::Cancelled);
            }
            Ok(Err(e)) => {
                warn!("Analysis of {} at {} failed: {}", event.repo, event.revision, e);
                VerdictReport::inconclusive(event, e.to_string())
            }
            Err(_) => {
                let e = PipelineError::Timeout(self.timeout);
                warn!("Analysis of {} at {} {}", event.repo, event.revision, e);
                VerdictReport::inconclusive(event, e.to_string())
            }
        };
        token.check()?;

        let (reporter, payload) = (&self.reporter, &report);
        let published = self
            .retry
            .run("publish verdict", move || reporter.publish(payload))
            .await;
        match published {
            Ok(()) => tracker.advance(Stage::Published),
            Err(e) => error!("Could not publish verdict for {} at {}: {}", event.repo, event.revision, e),
        }
        Ok(report)
    }

    async fn analyze(
        &self,
        event: &ChangeEvent,
        token: &CancellationToken,
        tracker: &mut RunTracker<'_>,
    ) -> Result<VerdictReport, PipelineError> {
        let repo = &event.repo;
        let revision = event.revision.as_str();

        token.check()?;
        let source = &self.source;
        let checkout = self
            .retry
            .run("checkout", move || source.checkout(repo, revision))
            .await?;
        tracker.advance(Stage::Cloned);

        token.check()?;
        let parsed = parse_checkout(&self.parser, &checkout).await?;
        let policy_text = checkout.read_policy(&self.policy_file).await;
        drop(checkout);
        let policy = policy_text.as_deref().map(Policy::parse_lenient).unwrap_or_default();
        let ParsedRepository { model, sources } = parsed;
        let mut candidate = RepoGraph::build_with_policy(model, &policy)?;
        tracker.advance(Stage::Parsed);

        token.check()?;
        let store = &self.store;
        let baseline = self.retry.run("load baseline", move || store.snapshot(repo)).await?;
        let new_exports: Vec<FunctionId> = {
            let mut fresh: Vec<_> = candidate
                .production_exports()
                .filter(|f| match &baseline {
                    Some(snapshot) => !snapshot
                        .graph
                        .function_by_key(&f.key())
                        .is_some_and(|previous| previous.is_exported),
                    None => true,
                })
                .collect();
            fresh.sort_by(|a, b| (&a.file, &a.qualified_name).cmp(&(&b.file, &b.qualified_name)));
            fresh.into_iter().map(|f| f.id).collect()
        };
        match &baseline {
            Some(snapshot) => {
                let adopted = candidate.adopt_entry_points(&snapshot.graph);
                debug!(
                    "{} new exports against {} at {}, {} entry points adopted",
                    new_exports.len(),
                    repo,
                    snapshot.revision,
                    adopted
                );
            }
            None => debug!("{} has no persisted graph, every export is new", repo),
        }
        drop(baseline);
        tracker.advance(Stage::Diffed);

        token.check()?;
        let statuses = self.engine.classify(&candidate, &new_exports);
        let mut texts = SourceSet::new();
        for (path, text) in sources {
            let is_test = candidate.is_test_file(&path);
            texts.insert(path, text, is_test);
        }

        let mut verdicts = Vec::with_capacity(new_exports.len());
        for id in &new_exports {
            let (Some(function), Some(status)) = (candidate.function(*id), statuses.get(id).copied()) else {
                continue;
            };
            let corroboration = self
                .corroborator
                .corroborate(&function.qualified_name, &function.file, &texts);
            let disposition = classify(function, status, &corroboration, &policy);
            verdicts.push(FunctionVerdict {
                function: function.id,
                qualified_name: function.qualified_name.clone(),
                file: function.file.clone(),
                line: function.line_start,
                tier: disposition.tier(),
                status,
                references: corroboration.production_refs,
                non_qualifying_references: corroboration.test_refs,
                allowed_by: match disposition {
                    Disposition::Allowed { rule } => Some(rule),
                    Disposition::Classified { .. } => None,
                },
            });
        }
        tracker.advance(Stage::Classified);

        let report = VerdictReport::completed(event, candidate.entry_points().len(), verdicts);
        info!(
            "{} {} at {}: {} new exports, {} blocking",
            repo,
            event.stream(),
            revision,
            report.new_exports,
            report.counts.unreachable
        );
        Ok(report)
    }
}
