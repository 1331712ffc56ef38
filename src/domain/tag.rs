use super::version::Version;

/// Tag naming rule: a literal prefix followed by the release version
/// (e.g. prefix `"v"` gives `v1.4.0`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagPattern {
    pub prefix: String,
}

impl TagPattern {
    /// Create a new tag pattern
    pub fn new(prefix: impl Into<String>) -> Self {
        TagPattern {
            prefix: prefix.into(),
        }
    }

    /// Format a version according to pattern
    /// Example: prefix="v", version=1.4.0 -> "v1.4.0"
    pub fn format(&self, version: &Version) -> String {
        format!("{}{}", self.prefix, version)
    }

    /// Extract the release version from a tag that matches this pattern.
    ///
    /// Returns `None` for tags with another prefix or a non-release suffix.
    pub fn parse(&self, tag: &str) -> Option<Version> {
        let rest = tag.strip_prefix(self.prefix.as_str())?;
        if !rest.starts_with(|c: char| c.is_ascii_digit()) {
            return None;
        }
        Version::parse(rest).ok()
    }

    /// Glob usable with `git tag --list` / `tag_names`.
    pub fn glob(&self) -> String {
        format!("{}*", self.prefix)
    }
}

impl Default for TagPattern {
    fn default() -> Self {
        TagPattern::new("v")
    }
}
