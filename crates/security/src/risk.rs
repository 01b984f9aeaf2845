//! Risk Gate: classifies every tool call before it runs.
//!
//! Each call yields tagged findings; the assessment level is the highest
//! finding level (`auto < confirm < deny`). Path-bearing tools are checked
//! against the workspace root and the forbidden prefixes, and shell
//! commands go through a pluggable [`CommandClassifier`].

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use yips_core::tool::{ToolCall, ToolRequest};

use crate::path::{canonical_root, is_within, matching_forbidden_prefix, resolve_in_workspace};

/// Prefixes no tool should touch without an explicit decision.
pub const DEFAULT_FORBIDDEN_PATHS: &[&str] =
    &["/etc", "/proc", "/sys", "/dev", "~/.ssh", "~/.gnupg", "~/.aws"];

/// How much scrutiny a call needs.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Runs without asking
    #[default]
    Auto,
    /// Needs an approver's consent
    Confirm,
    /// Never runs
    Deny,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Confirm => "confirm",
            Self::Deny => "deny",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tagged observation about a call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskFinding {
    pub level: RiskLevel,
    pub tag: String,
}

impl RiskFinding {
    pub fn new(level: RiskLevel, tag: impl Into<String>) -> Self {
        Self {
            level,
            tag: tag.into(),
        }
    }

    pub fn confirm(tag: impl Into<String>) -> Self {
        Self::new(RiskLevel::Confirm, tag)
    }

    pub fn deny(tag: impl Into<String>) -> Self {
        Self::new(RiskLevel::Deny, tag)
    }
}

/// The verdict for one call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub level: RiskLevel,
    pub reasons: Vec<String>,
}

impl RiskAssessment {
    /// Fold findings into an assessment: highest level wins, tags are kept
    /// in order without duplicates.
    pub fn from_findings(findings: impl IntoIterator<Item = RiskFinding>) -> Self {
        let mut assessment = Self::default();
        for finding in findings {
            assessment.level = assessment.level.max(finding.level);
            if !assessment.reasons.contains(&finding.tag) {
                assessment.reasons.push(finding.tag);
            }
        }
        assessment
    }

    pub fn is_auto(&self) -> bool {
        self.level == RiskLevel::Auto
    }

    pub fn needs_confirmation(&self) -> bool {
        self.level == RiskLevel::Confirm
    }

    pub fn is_denied(&self) -> bool {
        self.level == RiskLevel::Deny
    }

    /// Comma-separated reason tags, for metadata and prompts.
    pub fn reasons_joined(&self) -> String {
        self.reasons.join(",")
    }
}

/// Classifies shell command text.
pub trait CommandClassifier: Send + Sync {
    /// Findings for `command`. An empty list means nothing notable.
    fn classify(&self, command: &str) -> Vec<RiskFinding>;
}

struct CommandRule {
    tag: &'static str,
    level: RiskLevel,
    pattern: Regex,
}

/// Pattern-based classifier for common destructive shell idioms.
pub struct DefaultCommandClassifier {
    rules: Vec<CommandRule>,
}

impl DefaultCommandClassifier {
    pub fn new() -> Self {
        use RiskLevel::{Confirm, Deny};

        let table: &[(&'static str, RiskLevel, &str)] = &[
            // confirm
            ("destructive-delete", Confirm, r"\brm\s+(?:\S+\s+)*-(?:-recursive|-force|[a-zA-Z]*[rRf])"),
            ("privilege-escalation", Confirm, r"\b(?:sudo|doas)\b"),
            ("git-force-push", Confirm, r"\bgit\s+push\b.*\s(?:--force(?:-with-lease)?|-f)\b"),
            ("git-reset-hard", Confirm, r"\bgit\s+reset\b.*\s--hard\b"),
            ("recursive-permission-change", Confirm, r"\bch(?:mod|own|grp)\s+(?:\S+\s+)*-[a-zA-Z]*R"),
            ("raw-disk-copy", Confirm, r"(?:^|[\s;&|(])dd\s"),
            ("filesystem-format", Confirm, r"\bmkfs\b"),
            (
                "system-path-redirect",
                Confirm,
                r">\s*/(?:etc|usr|bin|sbin|boot|lib|lib64|opt|var|sys|proc)(?:/|\s|$)",
            ),
            (
                "remote-script-execution",
                Confirm,
                r"\b(?:curl|wget)\b.*\|\s*(?:sudo\s+)?(?:sh|bash|zsh|dash|ksh|fish|python3?|perl)\b",
            ),
            // deny
            (
                "delete-root-or-home",
                Deny,
                r"\brm\s+(?:-\S+\s+)+(?:--\s+)?(?:/|/\*|~|~/|~/\*|\$HOME|\$HOME/|\$HOME/\*)(?:\s|;|&|\||$)",
            ),
            ("fork-bomb", Deny, r":\s*\(\s*\)\s*\{\s*:\s*\|\s*:\s*&\s*\}\s*;\s*:"),
            ("format-device", Deny, r"\bmkfs(?:\.\w+)?\b.*\s/dev/"),
            (
                "raw-device-write",
                Deny,
                r"\bdd\b.*\bof=/dev/(?:sd|hd|vd|xvd|nvme|disk|mmcblk|rdisk)",
            ),
            (
                "device-redirect",
                Deny,
                r">\s*/dev/(?:sd|hd|vd|xvd|nvme|disk|mmcblk|rdisk)",
            ),
        ];

        let rules = table
            .iter()
            .filter_map(|&(tag, level, pattern)| match Regex::new(pattern) {
                Ok(pattern) => Some(CommandRule {
                    tag,
                    level,
                    pattern,
                }),
                Err(e) => {
                    tracing::error!(tag, error = %e, "Invalid command rule pattern");
                    None
                }
            })
            .collect();

        Self { rules }
    }
}

impl Default for DefaultCommandClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandClassifier for DefaultCommandClassifier {
    fn classify(&self, command: &str) -> Vec<RiskFinding> {
        self.rules
            .iter()
            .filter(|rule| rule.pattern.is_match(command))
            .map(|rule| RiskFinding::new(rule.level, rule.tag))
            .collect()
    }
}

/// Assesses tool calls against one workspace.
#[derive(Clone)]
pub struct RiskGate {
    root: PathBuf,
    forbidden_paths: Vec<String>,
    classifier: Arc<dyn CommandClassifier>,
}

impl fmt::Debug for RiskGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RiskGate")
            .field("root", &self.root)
            .field("forbidden_paths", &self.forbidden_paths)
            .finish()
    }
}

impl RiskGate {
    /// Gate rooted at `workspace_root` with the default forbidden prefixes
    /// and the default command classifier.
    pub fn new(workspace_root: impl AsRef<Path>) -> Self {
        Self {
            root: canonical_root(workspace_root.as_ref()),
            forbidden_paths: DEFAULT_FORBIDDEN_PATHS.iter().map(|p| p.to_string()).collect(),
            classifier: Arc::new(DefaultCommandClassifier::new()),
        }
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn CommandClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_forbidden_paths(mut self, forbidden_paths: Vec<String>) -> Self {
        self.forbidden_paths = forbidden_paths;
        self
    }

    pub fn workspace_root(&self) -> &Path {
        &self.root
    }

    /// Assess one call. Never touches the filesystem beyond resolving paths.
    pub fn assess(&self, call: &ToolCall) -> RiskAssessment {
        let mut findings = Vec::new();

        match &call.request {
            ToolRequest::ApplyFileChange(_) => {}
            ToolRequest::RunCommand(args) => {
                let cwd = args.cwd.as_deref().unwrap_or(".");
                let resolved = resolve_in_workspace(&self.root, cwd);
                if !is_within(&resolved, &self.root) {
                    findings.push(RiskFinding::confirm("cwd-outside-workspace"));
                }
                if args.command.trim().is_empty() {
                    findings.push(RiskFinding::deny("empty-command"));
                } else {
                    findings.extend(self.classifier.classify(&args.command));
                }
            }
            request => {
                if let Some(raw) = request.target_path() {
                    findings.extend(self.assess_path(raw, request.name().is_mutating()));
                }
            }
        }

        let assessment = RiskAssessment::from_findings(findings);
        debug!(
            tool = %call.name(),
            call_id = %call.id,
            level = %assessment.level,
            reasons = %assessment.reasons_joined(),
            "Risk assessed"
        );
        assessment
    }

    fn assess_path(&self, raw: &str, mutating: bool) -> Vec<RiskFinding> {
        let resolved = resolve_in_workspace(&self.root, raw);
        let mut findings = Vec::new();

        if !is_within(&resolved, &self.root) {
            findings.push(RiskFinding::confirm("outside-workspace"));
        }
        if matching_forbidden_prefix(&resolved, &self.forbidden_paths).is_some() {
            let level = if mutating {
                RiskLevel::Deny
            } else {
                RiskLevel::Confirm
            };
            findings.push(RiskFinding::new(level, "forbidden-path"));
        }
        findings
    }
}
