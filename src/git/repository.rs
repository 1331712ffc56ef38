use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use git2::{Oid, Repository as Git2Repo, Signature, Sort};

use super::PushCredentials;
use crate::domain::CommitInfo;
use crate::error::{ReleaseError, Result};

/// Wrapper around git2::Repository with our trait interface
pub struct Git2Repository {
    repo: Git2Repo,
}

impl Git2Repository {
    /// Open or discover a git repository
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let repo = Git2Repo::discover(path)?;
        Ok(Git2Repository { repo })
    }

    /// Create from existing git2::Repository
    pub fn from_git2(repo: Git2Repo) -> Self {
        Git2Repository { repo }
    }

    fn workdir(&self) -> PathBuf {
        self.repo
            .workdir()
            .unwrap_or_else(|| self.repo.path())
            .to_path_buf()
    }

    fn signature(&self) -> Result<Signature<'static>> {
        match self.repo.signature() {
            Ok(sig) => Ok(sig.to_owned()),
            Err(_) => Ok(Signature::now("release-gate", "release-gate@localhost")?),
        }
    }

    fn tag_exists(&self, name: &str) -> bool {
        self.repo
            .find_reference(&format!("refs/tags/{}", name))
            .is_ok()
    }
}

impl super::Repository for Git2Repository {
    fn head_commit(&self) -> Result<Oid> {
        let commit = self.repo.head()?.peel_to_commit()?;
        Ok(commit.id())
    }

    fn current_branch(&self) -> Result<Option<String>> {
        if self.repo.head_detached()? {
            return Ok(None);
        }
        let head = self.repo.head()?;
        Ok(head.shorthand().map(|s| s.to_string()))
    }

    fn is_shallow(&self) -> Result<bool> {
        Ok(self.repo.is_shallow())
    }

    fn unshallow(&self, remote: &str) -> Result<()> {
        // libgit2 cannot deepen an existing shallow clone, so defer to the git CLI.
        let output = Command::new("git")
            .arg("-C")
            .arg(self.workdir())
            .args(["fetch", "--unshallow", "--tags", remote])
            .output()
            .map_err(|e| ReleaseError::remote(format!("Cannot run git fetch: {}", e)))?;

        if !output.status.success() {
            return Err(ReleaseError::remote(format!(
                "git fetch --unshallow from '{}' failed: {}",
                remote,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    fn tags_by_commit(&self, glob: &str) -> Result<HashMap<Oid, Vec<String>>> {
        let names = self.repo.tag_names(Some(glob))?;
        let mut by_commit: HashMap<Oid, Vec<String>> = HashMap::new();

        for name in names.iter().flatten() {
            let reference = match self.repo.find_reference(&format!("refs/tags/{}", name)) {
                Ok(r) => r,
                Err(_) => continue,
            };
            // Tags pointing at trees or blobs are not release markers.
            if let Ok(commit) = reference.peel_to_commit() {
                by_commit
                    .entry(commit.id())
                    .or_default()
                    .push(name.to_string());
            }
        }

        Ok(by_commit)
    }

    fn walk_from(&self, head: Oid) -> Result<Vec<Oid>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
        revwalk.push(head)?;

        let mut oids = Vec::new();
        for oid in revwalk {
            oids.push(oid?);
        }
        Ok(oids)
    }

    fn commits_between(&self, base: Option<Oid>, head: Oid) -> Result<Vec<CommitInfo>> {
        let mut revwalk = self.repo.revwalk()?;
        revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)?;
        revwalk.push(head)?;
        if let Some(base) = base {
            revwalk.hide(base)?;
        }

        let mut commits = Vec::new();
        for oid in revwalk {
            let oid = oid?;
            let commit = self.repo.find_commit(oid)?;
            let message = String::from_utf8_lossy(commit.message_bytes());
            commits.push(CommitInfo::from_message(oid.to_string(), &message));
        }
        Ok(commits)
    }

    fn create_annotated_tag(&self, name: &str, target: Oid, message: &str) -> Result<()> {
        if self.tag_exists(name) {
            return Err(ReleaseError::tag(format!("Tag '{}' already exists", name)));
        }

        let object = self
            .repo
            .find_object(target, None)
            .map_err(|e| ReleaseError::tag(format!("Cannot find commit {}: {}", target, e)))?;
        let tagger = self.signature()?;

        self.repo
            .tag(name, &object, &tagger, message, false)
            .map_err(|e| ReleaseError::tag(format!("Cannot create tag '{}': {}", name, e)))?;
        Ok(())
    }

    fn push_tag(
        &self,
        remote_name: &str,
        name: &str,
        credentials: Option<&PushCredentials>,
    ) -> Result<()> {
        let mut remote = self
            .repo
            .find_remote(remote_name)
            .map_err(|_| ReleaseError::remote(format!("No remote named '{}' found", remote_name)))?;

        let mut callbacks = git2::RemoteCallbacks::new();
        callbacks.credentials(move |_url, username_from_url, allowed_types| {
            if allowed_types.contains(git2::CredentialType::USER_PASS_PLAINTEXT) {
                if let Some(creds) = credentials {
                    return git2::Cred::userpass_plaintext(&creds.username, creds.token.expose());
                }
            }

            if allowed_types.contains(git2::CredentialType::SSH_KEY) {
                let user = username_from_url.unwrap_or("git");
                if let Ok(cred) = git2::Cred::ssh_key_from_agent(user) {
                    return Ok(cred);
                }
                if let Some(home) = dirs::home_dir() {
                    for key in ["id_ed25519", "id_rsa", "id_ecdsa"] {
                        let path = home.join(".ssh").join(key);
                        if path.exists() {
                            return git2::Cred::ssh_key(user, None, &path, None);
                        }
                    }
                }
            }

            git2::Cred::default()
        });

        // A rejected ref update does not fail `push` by itself.
        callbacks.push_update_reference(|refname, status| match status {
            Some(status) => Err(git2::Error::from_str(&format!(
                "remote rejected {}: {}",
                refname, status
            ))),
            None => Ok(()),
        });

        let mut push_options = git2::PushOptions::new();
        push_options.remote_callbacks(callbacks);

        let refspec = format!("refs/tags/{}:refs/tags/{}", name, name);
        remote
            .push(&[refspec.as_str()], Some(&mut push_options))
            .map_err(|e| match e.class() {
                git2::ErrorClass::Net => {
                    ReleaseError::remote(format!("Network error during push: {}", e))
                }
                git2::ErrorClass::Reference => {
                    ReleaseError::remote(format!("Reference error during push: {}", e))
                }
                _ => ReleaseError::remote(format!("Failed to push tag '{}': {}", name, e)),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::Repository;
    use tempfile::TempDir;

    fn commit(repo: &Git2Repo, message: &str) -> Oid {
        let sig = Signature::now("Test User", "test@example.com").unwrap();
        let tree_id = repo.index().unwrap().write_tree().unwrap();
        let tree = repo.find_tree(tree_id).unwrap();
        let parents: Vec<git2::Commit> = match repo.head() {
            Ok(head) => vec![head.peel_to_commit().unwrap()],
            Err(_) => vec![],
        };
        let parent_refs: Vec<&git2::Commit> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs)
            .unwrap()
    }

    #[test]
    fn test_annotated_tag_is_peeled_to_commit() {
        let dir = TempDir::new().unwrap();
        let raw = Git2Repo::init(dir.path()).unwrap();
        let first = commit(&raw, "initial");
        let repo = Git2Repository::from_git2(raw);

        repo.create_annotated_tag("v1.0.0", first, "Release v1.0.0")
            .unwrap();

        let tags = repo.tags_by_commit("v*").unwrap();
        assert_eq!(tags.get(&first), Some(&vec!["v1.0.0".to_string()]));
    }

    #[test]
    fn test_create_existing_tag_fails() {
        let dir = TempDir::new().unwrap();
        let raw = Git2Repo::init(dir.path()).unwrap();
        let first = commit(&raw, "initial");
        let repo = Git2Repository::from_git2(raw);

        repo.create_annotated_tag("v1.0.0", first, "one").unwrap();
        let err = repo
            .create_annotated_tag("v1.0.0", first, "two")
            .unwrap_err();
        assert!(err.to_string().contains("already exists"));
    }

    #[test]
    fn test_commits_between_is_oldest_first_and_excludes_base() {
        let dir = TempDir::new().unwrap();
        let raw = Git2Repo::init(dir.path()).unwrap();
        let base = commit(&raw, "initial");
        commit(&raw, "fix: one");
        let head = commit(&raw, "feat: two\n\nbody text");
        let repo = Git2Repository::from_git2(raw);

        let commits = repo.commits_between(Some(base), head).unwrap();
        let summaries: Vec<&str> = commits.iter().map(|c| c.summary.as_str()).collect();
        assert_eq!(summaries, vec!["fix: one", "feat: two"]);
        assert_eq!(commits[1].body, "body text");
    }

    #[test]
    fn test_push_to_missing_remote_fails() {
        let dir = TempDir::new().unwrap();
        let raw = Git2Repo::init(dir.path()).unwrap();
        commit(&raw, "initial");
        let repo = Git2Repository::from_git2(raw);

        let err = repo.push_tag("origin", "v1.0.0", None).unwrap_err();
        assert!(err.to_string().contains("No remote named 'origin'"));
    }
}
