use std::collections::HashMap;
use std::sync::Mutex;

use git2::Oid;

use super::{PushCredentials, Repository};
use crate::domain::CommitInfo;
use crate::error::{ReleaseError, Result};

/// Linear in-memory history for testing without actual git operations
pub struct MockRepository {
    /// Oldest first; the last entry is HEAD
    history: Vec<(Oid, CommitInfo)>,
    tags: HashMap<String, Oid>,
    shallow: Mutex<bool>,
    branch: Option<String>,
    reject_push: bool,
    created: Mutex<Vec<(String, Oid, String)>>,
    pushed: Mutex<Vec<(String, String)>>,
}

impl MockRepository {
    /// Create a new empty mock repository on branch `main`
    pub fn new() -> Self {
        MockRepository {
            history: Vec::new(),
            tags: HashMap::new(),
            shallow: Mutex::new(false),
            branch: Some("main".to_string()),
            reject_push: false,
            created: Mutex::new(Vec::new()),
            pushed: Mutex::new(Vec::new()),
        }
    }

    /// Append a commit on top of HEAD and return its id
    pub fn commit(&mut self, message: &str) -> Oid {
        let mut bytes = [0u8; 20];
        bytes[..8].copy_from_slice(&(self.history.len() as u64 + 1).to_be_bytes());
        let oid = Oid::from_bytes(&bytes).unwrap_or_else(|_| Oid::zero());
        self.history
            .push((oid, CommitInfo::from_message(oid.to_string(), message)));
        oid
    }

    /// Add a tag pointing to an OID
    pub fn add_tag(&mut self, name: impl Into<String>, oid: Oid) {
        self.tags.insert(name.into(), oid);
    }

    pub fn set_branch(&mut self, branch: Option<&str>) {
        self.branch = branch.map(|b| b.to_string());
    }

    pub fn set_shallow(&mut self, shallow: bool) {
        self.shallow = Mutex::new(shallow);
    }

    /// Make every push fail as if the remote rejected it
    pub fn reject_pushes(&mut self) {
        self.reject_push = true;
    }

    /// Tags created through the trait: (name, target, message)
    pub fn created_tags(&self) -> Vec<(String, Oid, String)> {
        self.created.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Tags pushed through the trait: (remote, name)
    pub fn pushed_tags(&self) -> Vec<(String, String)> {
        self.pushed.lock().map(|p| p.clone()).unwrap_or_default()
    }

    fn position(&self, oid: Oid) -> Result<usize> {
        self.history
            .iter()
            .position(|(id, _)| *id == oid)
            .ok_or_else(|| ReleaseError::version(format!("Unknown commit {}", oid)))
    }
}

impl Default for MockRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl Repository for MockRepository {
    fn head_commit(&self) -> Result<Oid> {
        self.history
            .last()
            .map(|(oid, _)| *oid)
            .ok_or_else(|| ReleaseError::version("Repository has no commits"))
    }

    fn current_branch(&self) -> Result<Option<String>> {
        Ok(self.branch.clone())
    }

    fn is_shallow(&self) -> Result<bool> {
        Ok(self.shallow.lock().map(|s| *s).unwrap_or(false))
    }

    fn unshallow(&self, _remote: &str) -> Result<()> {
        if let Ok(mut shallow) = self.shallow.lock() {
            *shallow = false;
        }
        Ok(())
    }

    fn tags_by_commit(&self, glob: &str) -> Result<HashMap<Oid, Vec<String>>> {
        let prefix = glob.trim_end_matches('*');
        let mut by_commit: HashMap<Oid, Vec<String>> = HashMap::new();
        for (name, oid) in &self.tags {
            if name.starts_with(prefix) {
                by_commit.entry(*oid).or_default().push(name.clone());
            }
        }
        Ok(by_commit)
    }

    fn walk_from(&self, head: Oid) -> Result<Vec<Oid>> {
        let end = self.position(head)?;
        Ok(self.history[..=end].iter().rev().map(|(oid, _)| *oid).collect())
    }

    fn commits_between(&self, base: Option<Oid>, head: Oid) -> Result<Vec<CommitInfo>> {
        let end = self.position(head)?;
        let start = match base {
            Some(base) => self.position(base)? + 1,
            None => 0,
        };
        if start > end {
            return Ok(Vec::new());
        }
        Ok(self.history[start..=end]
            .iter()
            .map(|(_, info)| info.clone())
            .collect())
    }

    fn create_annotated_tag(&self, name: &str, target: Oid, message: &str) -> Result<()> {
        let mut created = self
            .created
            .lock()
            .map_err(|_| ReleaseError::tag("mock tag store poisoned"))?;
        if self.tags.contains_key(name) || created.iter().any(|(n, _, _)| n == name) {
            return Err(ReleaseError::tag(format!("Tag '{}' already exists", name)));
        }
        created.push((name.to_string(), target, message.to_string()));
        Ok(())
    }

    fn push_tag(
        &self,
        remote: &str,
        name: &str,
        _credentials: Option<&PushCredentials>,
    ) -> Result<()> {
        if self.reject_push {
            return Err(ReleaseError::remote(format!(
                "Failed to push tag '{}': remote rejected",
                name
            )));
        }
        self.pushed
            .lock()
            .map_err(|_| ReleaseError::remote("mock push store poisoned"))?
            .push((remote.to_string(), name.to_string()));
        Ok(())
    }
}
