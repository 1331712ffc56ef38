/// The push event that started a run, identified by its git ref
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub git_ref: String,
}

impl Trigger {
    /// Create a trigger from a full ref (`refs/heads/main`) or a bare branch name
    pub fn new(git_ref: impl Into<String>) -> Self {
        Trigger {
            git_ref: git_ref.into(),
        }
    }

    /// Branch name the push targeted, `None` for tag or other refs
    pub fn branch(&self) -> Option<&str> {
        if let Some(branch) = self.git_ref.strip_prefix("refs/heads/") {
            return Some(branch);
        }
        if self.git_ref.starts_with("refs/") {
            return None;
        }
        Some(self.git_ref.as_str())
    }

    /// Whether this push should start a release
    pub fn is_trunk_push(&self, trunk: &str) -> bool {
        self.branch() == Some(trunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_ref_to_trunk() {
        let trigger = Trigger::new("refs/heads/main");
        assert_eq!(trigger.branch(), Some("main"));
        assert!(trigger.is_trunk_push("main"));
    }

    #[test]
    fn test_bare_branch_name() {
        let trigger = Trigger::new("master");
        assert!(trigger.is_trunk_push("master"));
        assert!(!trigger.is_trunk_push("main"));
    }

    #[test]
    fn test_feature_branch_is_not_trunk() {
        let trigger = Trigger::new("refs/heads/feature/login");
        assert_eq!(trigger.branch(), Some("feature/login"));
        assert!(!trigger.is_trunk_push("main"));
    }

    #[test]
    fn test_tag_push_is_not_trunk() {
        let trigger = Trigger::new("refs/tags/v1.0.0");
        assert_eq!(trigger.branch(), None);
        assert!(!trigger.is_trunk_push("main"));
    }
}
