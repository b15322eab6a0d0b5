//! Wirecheck Pipeline: re-maps, ephemeral change analysis and debounced scheduling

pub mod cancel;
pub mod error;
pub mod pipeline;
pub mod remap;
pub mod reporter;
pub mod retry;
pub mod scheduler;
pub mod source;
pub mod watcher;


pub use cancel::CancellationToken;
pub use error::{PipelineError, ReportError, SourceError, Transient};
pub use pipeline::{AnalysisPipeline, ChangeAction, ChangeEvent, Stage, Stream};
pub use remap::Remapper;
pub use reporter::{
    Conclusion, FunctionVerdict, HttpReporter, LogReporter, ReportStatus, TierCounts, VerdictReport, VerdictReporter,
    reporter_from_settings,
};
pub use retry::RetryPolicy;
pub use scheduler::{ChangeHandler, Dispatcher, UnitKey, UpdateScheduler};
pub use source::{Checkout, GitSource, LocalSource, RevisionSource};
pub use watcher::{FileWatcher, WORKING_TREE, WatchEvent, watch_repository};
