pub mod apply_orchestrator;
pub mod cancel;
pub mod confidence_scorer;
pub mod content_store;
pub mod context_builder;
pub mod convergence_filter;
pub mod feature_detector;
pub mod generator_chain;
pub mod improvement_loop;
pub mod repair_loop;
pub mod signal_extractor;
pub mod signature_matcher;
pub mod verifier;

pub use apply_orchestrator::{ApplyError, ApplyOrchestrator, ApplyPolicy};
pub use cancel::CancelFlag;
pub use confidence_scorer::{score, EvidenceCollector};
pub use content_store::{ContentStore, WriteOptions, WriteOutcome, WriteReason};
pub use context_builder::ContextBuilder;
pub use convergence_filter::{ConvergenceFilter, ConvergencePolicy, ConvergenceReport};
pub use feature_detector::{Evidence, FeatureDetector, PresentFeature};
pub use generator_chain::GeneratorChain;
pub use improvement_loop::{ImprovementLoop, LoopOutcome, LoopPhase, LoopReport, LoopStep};
pub use repair_loop::{RepairComponents, RepairLoop, Source};
pub use signal_extractor::{BacklogExtractor, BuildLogExtractor};
pub use signature_matcher::{MatchReport, SignatureMatcher};
pub use verifier::{VerificationOutcome, Verifier};
