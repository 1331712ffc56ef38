use regex::Regex;

use super::version::VersionBump;
use crate::error::{ReleaseError, Result};

/// One commit from history, as seen by the version analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitInfo {
    /// Full commit hash
    pub hash: String,
    /// First line of the message
    pub summary: String,
    /// Everything after the summary (may be empty)
    pub body: String,
}

impl CommitInfo {
    pub fn new(hash: impl Into<String>, summary: impl Into<String>, body: impl Into<String>) -> Self {
        CommitInfo {
            hash: hash.into(),
            summary: summary.into(),
            body: body.into(),
        }
    }

    /// Build from a raw commit message, splitting subject and body.
    pub fn from_message(hash: impl Into<String>, message: &str) -> Self {
        let mut parts = message.splitn(2, '\n');
        let summary = parts.next().unwrap_or_default().trim_end().to_string();
        let body = parts.next().unwrap_or_default().trim().to_string();
        CommitInfo {
            hash: hash.into(),
            summary,
            body,
        }
    }

    /// Subject and body joined the way git stores them.
    pub fn message(&self) -> String {
        if self.body.is_empty() {
            self.summary.clone()
        } else {
            format!("{}\n\n{}", self.summary, self.body)
        }
    }

    pub fn short_hash(&self) -> &str {
        if self.hash.len() > 7 {
            &self.hash[..7]
        } else {
            &self.hash
        }
    }
}

/// Compiled commit-message markers deciding the bump class
#[derive(Debug, Clone)]
pub struct CommitMarkers {
    breaking: Regex,
    feature: Regex,
}

impl CommitMarkers {
    /// Compile the configured patterns. Both are matched case-insensitively
    /// against subject and body; `^` anchors at the start of any line.
    pub fn new(breaking: &str, feature: &str) -> Result<Self> {
        Ok(CommitMarkers {
            breaking: compile("breaking", breaking)?,
            feature: compile("feature", feature)?,
        })
    }

    /// Bump class a single commit asks for.
    pub fn classify(&self, commit: &CommitInfo) -> VersionBump {
        let message = commit.message();
        if self.breaking.is_match(&message) {
            VersionBump::Major
        } else if self.feature.is_match(&message) {
            VersionBump::Minor
        } else {
            VersionBump::Patch
        }
    }
}

fn compile(kind: &str, pattern: &str) -> Result<Regex> {
    Regex::new(&format!("(?im){}", pattern)).map_err(|e| {
        ReleaseError::config(format!("Invalid {} marker pattern '{}': {}", kind, pattern, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CommitsConfig;

    fn markers() -> CommitMarkers {
        let config = CommitsConfig::default();
        CommitMarkers::new(&config.breaking_pattern, &config.feature_pattern).unwrap()
    }

    #[test]
    fn test_from_message_splits_subject_and_body() {
        let commit = CommitInfo::from_message("abc", "feat: x\n\nlonger text\nmore");
        assert_eq!(commit.summary, "feat: x");
        assert_eq!(commit.body, "longer text\nmore");
        assert_eq!(commit.message(), "feat: x\n\nlonger text\nmore");
    }

    #[test]
    fn test_from_message_without_body() {
        let commit = CommitInfo::from_message("abc", "fix: typo\n");
        assert_eq!(commit.summary, "fix: typo");
        assert!(commit.body.is_empty());
    }

    #[test]
    fn test_short_hash() {
        let commit = CommitInfo::new("0123456789abcdef", "x", "");
        assert_eq!(commit.short_hash(), "0123456");
    }

    #[test]
    fn test_breaking_marker_in_body() {
        let commit = CommitInfo::new("a", "fix: rename field", "BREAKING CHANGE: field renamed");
        assert_eq!(markers().classify(&commit), VersionBump::Major);
    }

    #[test]
    fn test_breaking_marker_is_case_insensitive() {
        let commit = CommitInfo::new("a", "refactor: this is a breaking change", "");
        assert_eq!(markers().classify(&commit), VersionBump::Major);
    }

    #[test]
    fn test_breaking_bang_syntax() {
        let commit = CommitInfo::new("a", "feat(api)!: drop v1 endpoints", "");
        assert_eq!(markers().classify(&commit), VersionBump::Major);
    }

    #[test]
    fn test_feature_marker_case_insensitive() {
        assert_eq!(
            markers().classify(&CommitInfo::new("a", "Feat(ui): dark mode", "")),
            VersionBump::Minor
        );
        assert_eq!(
            markers().classify(&CommitInfo::new("a", "FEATURE: export", "")),
            VersionBump::Minor
        );
    }

    #[test]
    fn test_feature_marker_anchored_at_line_start() {
        let mid_line = CommitInfo::new("a", "fix: make feat flag optional", "");
        assert_eq!(markers().classify(&mid_line), VersionBump::Patch);

        let in_body = CommitInfo::new("a", "Merge branch 'topic'", "feat: add exporter");
        assert_eq!(markers().classify(&in_body), VersionBump::Minor);
    }

    #[test]
    fn test_unmarked_commit_is_patch() {
        let commit = CommitInfo::new("a", "Update README", "");
        assert_eq!(markers().classify(&commit), VersionBump::Patch);
    }

    #[test]
    fn test_invalid_pattern_is_config_error() {
        let err = CommitMarkers::new("(unclosed", "^feat").unwrap_err();
        assert!(err.to_string().contains("breaking marker"));
    }
}
