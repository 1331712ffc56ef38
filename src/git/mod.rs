//! Git operations abstraction layer
//!
//! The [Repository] trait covers what the release pipeline needs from git:
//! resolving the commit being built, walking history for the last release
//! tag, and creating and pushing the new annotated tag.
//!
//! - [repository::Git2Repository]: a real implementation using the `git2` crate
//! - [mock::MockRepository]: an in-memory implementation for tests
//!
//! ```rust
//! # use release_gate::git::Repository;
//! # fn example<R: Repository>(repo: &R) -> release_gate::Result<()> {
//! let head = repo.head_commit()?;
//! let commits = repo.commits_between(None, head)?;
//! # Ok(())
//! # }
//! ```

pub mod mock;
pub mod repository;

pub use mock::MockRepository;
pub use repository::Git2Repository;

use std::collections::HashMap;

use git2::Oid;

use crate::domain::{CommitInfo, Secret};
use crate::error::Result;

/// Credentials used for pushing over HTTPS
#[derive(Debug, Clone)]
pub struct PushCredentials {
    pub username: String,
    pub token: Secret,
}

/// Common git operation trait for abstraction
///
/// All methods return [crate::error::Result<T>]; implementations map
/// `git2::Error` into [crate::error::ReleaseError].
pub trait Repository {
    /// Commit the working tree's HEAD points at
    fn head_commit(&self) -> Result<Oid>;

    /// Checked-out branch name, `None` on a detached HEAD
    fn current_branch(&self) -> Result<Option<String>>;

    /// Whether history is truncated (a shallow clone)
    fn is_shallow(&self) -> Result<bool>;

    /// Fetch the complete history and all tags from `remote`
    fn unshallow(&self, remote: &str) -> Result<()>;

    /// Tags matching `glob`, grouped by the commit they point at
    ///
    /// Annotated tags are peeled to their target commit.
    fn tags_by_commit(&self, glob: &str) -> Result<HashMap<Oid, Vec<String>>>;

    /// Commit ids reachable from `head`, newest first
    fn walk_from(&self, head: Oid) -> Result<Vec<Oid>>;

    /// Commits reachable from `head` but not from `base`, oldest first
    ///
    /// With `base = None` every commit reachable from `head` is returned.
    fn commits_between(&self, base: Option<Oid>, head: Oid) -> Result<Vec<CommitInfo>>;

    /// Create an annotated tag at `target`; fails if the tag already exists
    fn create_annotated_tag(&self, name: &str, target: Oid, message: &str) -> Result<()>;

    /// Push `refs/tags/<name>` to `remote`
    fn push_tag(&self, remote: &str, name: &str, credentials: Option<&PushCredentials>)
        -> Result<()>;
}
