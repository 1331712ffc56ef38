use git2::Oid;
use serde::Serialize;

use crate::boundary::BoundaryWarning;
use crate::config::TagConfig;
use crate::domain::{CommitInfo, CommitMarkers, TagPattern, Version, VersionBump};
use crate::error::Result;
use crate::git::Repository;

/// The last release found in history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTag {
    pub name: String,
    pub version: Version,
    pub commit: Oid,
}

/// Outcome of the version computation, handed to the publish stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextVersion {
    pub previous_tag: Option<String>,
    pub previous: Option<String>,
    pub next: String,
    pub tag: String,
    pub bump: Option<String>,
    pub commit_count: usize,
    #[serde(skip)]
    pub warnings: Vec<BoundaryWarning>,
}

/// Decides the next release version from commit history
pub struct VersionAnalyzer {
    markers: CommitMarkers,
    pattern: TagPattern,
    initial: Version,
}

impl VersionAnalyzer {
    /// Create a new version analyzer
    pub fn new(markers: CommitMarkers, tag: &TagConfig) -> Result<Self> {
        Ok(VersionAnalyzer {
            markers,
            pattern: tag.pattern(),
            initial: tag.initial()?,
        })
    }

    pub fn pattern(&self) -> &TagPattern {
        &self.pattern
    }

    /// One bump decision for the whole range: the highest-precedence marker
    /// found in any commit, `Patch` when nothing matches.
    pub fn aggregate_bump(&self, commits: &[CommitInfo]) -> VersionBump {
        commits
            .iter()
            .map(|commit| self.markers.classify(commit))
            .max()
            .unwrap_or(VersionBump::Patch)
    }

    /// Find the most recent release tag reachable from `head`.
    ///
    /// History is walked newest first; when one commit carries several
    /// matching tags the highest version wins. Tags sharing the prefix but
    /// not parsing as a release version are reported as warnings.
    pub fn latest_release<R: Repository>(
        &self,
        repo: &R,
        head: Oid,
        warnings: &mut Vec<BoundaryWarning>,
    ) -> Result<Option<ReleaseTag>> {
        let tags = repo.tags_by_commit(&self.pattern.glob())?;
        if tags.is_empty() {
            return Ok(None);
        }

        for oid in repo.walk_from(head)? {
            let Some(names) = tags.get(&oid) else {
                continue;
            };

            let mut best: Option<ReleaseTag> = None;
            for name in names {
                match self.pattern.parse(name) {
                    Some(version) => {
                        if best.as_ref().map_or(true, |b| version > b.version) {
                            best = Some(ReleaseTag {
                                name: name.clone(),
                                version,
                                commit: oid,
                            });
                        }
                    }
                    None => warnings.push(BoundaryWarning::UnparsableTag {
                        tag: name.clone(),
                        reason: format!(
                            "expected '{}' followed by MAJOR.MINOR.PATCH",
                            self.pattern.prefix
                        ),
                    }),
                }
            }

            if best.is_some() {
                return Ok(best);
            }
        }

        Ok(None)
    }

    /// Compute the version the commit `head` would be released as.
    pub fn next_version<R: Repository>(&self, repo: &R, head: Oid) -> Result<NextVersion> {
        let mut warnings = Vec::new();
        let latest = self.latest_release(repo, head, &mut warnings)?;
        let commits = repo.commits_between(latest.as_ref().map(|t| t.commit), head)?;

        let next = match &latest {
            Some(release) => {
                let bump = self.aggregate_bump(&commits);
                tracing::debug!(
                    previous = %release.version,
                    %bump,
                    commits = commits.len(),
                    "aggregated commit markers"
                );
                if commits.is_empty() {
                    warnings.push(BoundaryWarning::NoNewCommits {
                        latest_tag: release.name.clone(),
                        current_commit_hash: head.to_string(),
                    });
                }
                let version = release.version.bump(bump)?;
                NextVersion {
                    previous_tag: Some(release.name.clone()),
                    previous: Some(release.version.to_string()),
                    next: version.to_string(),
                    tag: self.pattern.format(&version),
                    bump: Some(bump.to_string()),
                    commit_count: commits.len(),
                    warnings,
                }
            }
            None => NextVersion {
                previous_tag: None,
                previous: None,
                next: self.initial.to_string(),
                tag: self.pattern.format(&self.initial),
                bump: None,
                commit_count: commits.len(),
                warnings,
            },
        };

        Ok(next)
    }
}
