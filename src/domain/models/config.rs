use serde::{Deserialize, Serialize};

/// Main configuration structure for mender
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Directory holding state, backups and review artifacts
    #[serde(default = "default_state_dir")]
    pub state_dir: String,

    /// Report what would happen without touching disk, state or history
    #[serde(default)]
    pub dry_run: bool,

    /// Commit candidates that pass every gate without human review
    #[serde(default)]
    pub auto_apply: bool,

    /// Allow candidates to create files that do not exist yet
    #[serde(default)]
    pub allow_create: bool,

    /// Minimum score for autonomous application (0.0-1.0)
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Times a stored resolution may be reapplied before escalation
    #[serde(default = "default_max_reuse")]
    pub max_reuse: u32,

    /// Stop after this many issues per run
    #[serde(default)]
    pub max_items: Option<usize>,

    /// Build/repair/feature rounds in `mender loop` before giving up
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Files containing this marker are never rewritten
    #[serde(default = "default_protect_marker")]
    pub protect_marker: String,

    #[serde(default)]
    pub convergence: ConvergenceConfig,

    #[serde(default)]
    pub verifier: VerifierConfig,

    /// Build/test command used for self-checks, post-apply tests and `fix --build`
    #[serde(default)]
    pub build: BuildConfig,

    #[serde(default)]
    pub generators: GeneratorsConfig,

    #[serde(default)]
    pub signals: SignalConfig,

    #[serde(default)]
    pub backlog: BacklogConfig,

    #[serde(default)]
    pub vcs: VcsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_state_dir() -> String {
    ".mender".to_string()
}

const fn default_confidence_threshold() -> f64 {
    0.85
}

const fn default_max_reuse() -> u32 {
    20
}

const fn default_max_iterations() -> u32 {
    50
}

fn default_protect_marker() -> String {
    "// DO NOT MODIFY BY AI".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
            dry_run: false,
            auto_apply: false,
            allow_create: false,
            confidence_threshold: default_confidence_threshold(),
            max_reuse: default_max_reuse(),
            max_items: None,
            max_iterations: default_max_iterations(),
            protect_marker: default_protect_marker(),
            convergence: ConvergenceConfig::default(),
            verifier: VerifierConfig::default(),
            build: BuildConfig::default(),
            generators: GeneratorsConfig::default(),
            signals: SignalConfig::default(),
            backlog: BacklogConfig::default(),
            vcs: VcsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Multi-pass convergence parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ConvergenceConfig {
    /// Generation passes per issue
    #[serde(default = "default_passes")]
    pub passes: u32,

    /// A content wins when its count exceeds `passes * majority_ratio`
    #[serde(default = "default_majority_ratio")]
    pub majority_ratio: f64,

    /// Accept content the last two passes agree on when no majority exists
    #[serde(default = "default_true")]
    pub last_two_fallback: bool,
}

const fn default_passes() -> u32 {
    5
}

const fn default_majority_ratio() -> f64 {
    0.5
}

const fn default_true() -> bool {
    true
}

impl Default for ConvergenceConfig {
    fn default() -> Self {
        Self {
            passes: default_passes(),
            majority_ratio: default_majority_ratio(),
            last_two_fallback: true,
        }
    }
}

/// How the verifier decides whether a rewrite fixes the failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfCheckMode {
    /// Ask a model to critique the rewrite
    Model,
    /// Stage the rewrite and run the build command
    Build,
}

/// Verify-and-refine loop parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VerifierConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_self_check")]
    pub self_check: SelfCheckMode,

    /// Model backend used for analysis and rewrites (defaults to the first configured one)
    #[serde(default)]
    pub refiner: Option<String>,
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_self_check() -> SelfCheckMode {
    SelfCheckMode::Build
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            self_check: default_self_check(),
            refiner: None,
        }
    }
}

/// External build/test command
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BuildConfig {
    #[serde(default = "default_build_program")]
    pub program: String,

    #[serde(default = "default_build_args")]
    pub args: Vec<String>,

    /// Per-invocation timeout; a timeout counts as failure
    #[serde(default = "default_build_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_build_program() -> String {
    "cargo".to_string()
}

fn default_build_args() -> Vec<String> {
    vec!["test".to_string()]
}

const fn default_build_timeout_secs() -> u64 {
    1800
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            program: default_build_program(),
            args: default_build_args(),
            timeout_secs: default_build_timeout_secs(),
        }
    }
}

/// Generator backends, tried in `order`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct GeneratorsConfig {
    /// Backend names: template, local_model, remote_advisor
    #[serde(default = "default_generator_order")]
    pub order: Vec<String>,

    #[serde(default)]
    pub templates: Vec<TemplateConfig>,

    /// Confidence reported by template proposals
    #[serde(default = "default_template_confidence")]
    pub template_confidence: f64,

    #[serde(default)]
    pub local_model: Option<LocalModelConfig>,

    #[serde(default)]
    pub remote_advisor: Option<RemoteAdvisorConfig>,
}

fn default_generator_order() -> Vec<String> {
    vec![
        "template".to_string(),
        "local_model".to_string(),
        "remote_advisor".to_string(),
    ]
}

const fn default_template_confidence() -> f64 {
    0.5
}

impl Default for GeneratorsConfig {
    fn default() -> Self {
        Self {
            order: default_generator_order(),
            templates: Vec::new(),
            template_confidence: default_template_confidence(),
            local_model: None,
            remote_advisor: None,
        }
    }
}

/// Which subjects a template applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateTarget {
    /// Diagnostics naming a missing symbol
    MissingSymbol,
    /// Backlog features
    Feature,
}

/// A deterministic file template; `{name}` is replaced by the subject name
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct TemplateConfig {
    pub applies_to: TemplateTarget,
    pub path: String,
    pub body: String,
}

/// Model CLI invoked as a subprocess; prompt on stdin, reply on stdout
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LocalModelConfig {
    pub program: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_model_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_model_timeout_secs() -> u64 {
    600
}

/// HTTP advisor endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RemoteAdvisorConfig {
    pub endpoint: String,

    #[serde(default)]
    pub model: Option<String>,

    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_advisor_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_api_key_env() -> String {
    "MENDER_ADVISOR_API_KEY".to_string()
}

const fn default_advisor_timeout_secs() -> u64 {
    120
}

const fn default_requests_per_minute() -> u32 {
    30
}

const fn default_max_tokens() -> u32 {
    8192
}

/// Pattern turning a missing-symbol diagnostic into a signature
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SymbolPattern {
    /// Regex whose first capture group is the symbol name
    pub pattern: String,
    /// Signature template; `{name}` is replaced by the symbol
    pub signature: String,
}

/// Issue extraction and signature matching rules
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct SignalConfig {
    /// Regex with `path` and `line` named groups
    #[serde(default = "default_diagnostic_pattern")]
    pub diagnostic_pattern: String,

    #[serde(default = "default_symbol_patterns")]
    pub symbol_patterns: Vec<SymbolPattern>,

    /// Token overlap at or above which two signatures match
    #[serde(default = "default_overlap_threshold")]
    pub overlap_threshold: f64,

    #[serde(default = "default_max_signature_len")]
    pub max_signature_len: usize,

    /// Maximum characters of log excerpt passed to generators
    #[serde(default = "default_excerpt_chars")]
    pub excerpt_chars: usize,

    /// Lines of source shown around each failing line
    #[serde(default = "default_context_radius")]
    pub context_radius: usize,
}

fn default_diagnostic_pattern() -> String {
    r"(?P<path>[\w./\-]+\.\w+):(?P<line>\d+):(?:\d+:)?\s*(?:fatal error|error|warning|note)\b.*"
        .to_string()
}

fn default_symbol_patterns() -> Vec<SymbolPattern> {
    vec![
        SymbolPattern {
            pattern: r"cannot find '([A-Za-z_][A-Za-z0-9_]*)' in scope".to_string(),
            signature: "cannot find {name} in scope".to_string(),
        },
        SymbolPattern {
            pattern: r"use of unresolved identifier '([A-Za-z_][A-Za-z0-9_]*)'".to_string(),
            signature: "cannot find {name} in scope".to_string(),
        },
    ]
}

const fn default_overlap_threshold() -> f64 {
    0.5
}

const fn default_max_signature_len() -> usize {
    400
}

const fn default_excerpt_chars() -> usize {
    8000
}

const fn default_context_radius() -> usize {
    8
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            diagnostic_pattern: default_diagnostic_pattern(),
            symbol_patterns: default_symbol_patterns(),
            overlap_threshold: default_overlap_threshold(),
            max_signature_len: default_max_signature_len(),
            excerpt_chars: default_excerpt_chars(),
            context_radius: default_context_radius(),
        }
    }
}

/// Backlog document locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct BacklogConfig {
    #[serde(default = "default_backlog_path")]
    pub path: String,

    /// Used when `path` does not exist
    #[serde(default = "default_backlog_fallback")]
    pub fallback: String,

    /// Skip items the repository already appears to implement
    #[serde(default = "default_true")]
    pub skip_present: bool,

    /// Title words that must appear together in one file to count as present
    #[serde(default = "default_min_token_matches")]
    pub min_token_matches: usize,
}

fn default_backlog_path() -> String {
    "need_work.md".to_string()
}

fn default_backlog_fallback() -> String {
    "plan.md".to_string()
}

const fn default_min_token_matches() -> usize {
    3
}

impl Default for BacklogConfig {
    fn default() -> Self {
        Self {
            path: default_backlog_path(),
            fallback: default_backlog_fallback(),
            skip_present: true,
            min_token_matches: default_min_token_matches(),
        }
    }
}

/// Version control settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct VcsConfig {
    #[serde(default = "default_git_program")]
    pub git_program: String,

    /// Prefix for candidate branches
    #[serde(default = "default_branch_prefix")]
    pub branch_prefix: String,

    /// Open a review request after committing
    #[serde(default)]
    pub open_review: bool,

    #[serde(default = "default_review_program")]
    pub review_program: String,
}

fn default_git_program() -> String {
    "git".to_string()
}

fn default_branch_prefix() -> String {
    "mender/".to_string()
}

fn default_review_program() -> String {
    "gh".to_string()
}

impl Default for VcsConfig {
    fn default() -> Self {
        Self {
            git_program: default_git_program(),
            branch_prefix: default_branch_prefix(),
            open_review: false,
            review_program: default_review_program(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rotated JSON log files
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation: daily, hourly, never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
