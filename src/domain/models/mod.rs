pub mod apply;
pub mod confidence;
pub mod config;
pub mod content;
pub mod issue;
pub mod proposal;
pub mod resolution;
pub mod state;
pub mod summary;

pub use apply::{ApplyOutcome, ApplyReport, ApplyState, BackupEntry, SkippedFile};
pub use confidence::ConfidenceMetrics;
pub use config::{
    BacklogConfig, BuildConfig, Config, ConvergenceConfig, GeneratorsConfig, LocalModelConfig,
    LoggingConfig, RemoteAdvisorConfig, SelfCheckMode, SignalConfig, SymbolPattern,
    TemplateConfig, TemplateTarget, VcsConfig, VerifierConfig,
};
pub use content::{content_hash, normalize_text, sha256_hex, ContentLedger};
pub use issue::{canonical_name, issue_id, short_id, Issue, IssueKind, SourceLocation};
pub use proposal::{Candidate, CandidateOrigin, Proposal};
pub use resolution::{IssueMemory, StoredResolution};
pub use state::{AttemptCache, AttemptRecord, ProcessedSet, RunState};
pub use summary::{IssueReport, IssueResult, RunSummary};
