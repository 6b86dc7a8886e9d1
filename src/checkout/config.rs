//! Checkout behavior configuration.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::CheckoutError;

/// Sub-policy for [`Mode::Full`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    /// Purge untracked files from an existing repository, then pull.
    Clean,
    /// Remove the working directory first, then clone from scratch.
    Clobber,
    /// Like `Clean`, but the purge also removes ignored files.
    Fresh,
}

/// Top-level checkout strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Re-derive the working directory contents on every build.
    Full(Method),
    /// Reuse an existing repository when one is present; clone only when
    /// absent.
    Incremental,
}

/// How the VCS backend encodes which branch a working copy is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchType {
    /// Branch is a revision-graph attribute; the working copy can switch
    /// branches with an in-repo update.
    InRepo,
    /// Branch selects a distinct remote directory; the working copy cannot
    /// switch branches without a fresh clone.
    Dirname,
}

impl BranchType {
    pub(crate) fn name(self) -> &'static str {
        match self {
            BranchType::InRepo => "in_repo",
            BranchType::Dirname => "dirname",
        }
    }
}

/// Configuration for one builder's checkout step.
///
/// Exactly one of `repo_url` and `base_url` must be set: `InRepo` backends
/// address the repository directly, `Dirname` backends compose the URL from
/// `base_url` plus the branch being built.
#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub mode: Mode,
    pub branch_type: BranchType,
    pub repo_url: Option<String>,
    pub base_url: Option<String>,
    /// Branch to build when the specifier leaves it unset.
    pub default_branch: Option<String>,
    /// Destroy and re-clone the working directory when the branch changed,
    /// instead of switching in place.
    pub clobber_on_branch_change: bool,
    /// Extra environment for every remote command.
    pub env: BTreeMap<String, String>,
    /// Per-command timeout; a timed-out command fails the step.
    pub timeout: Option<Duration>,
}

impl CheckoutConfig {
    pub fn new(mode: Mode, branch_type: BranchType) -> Self {
        Self {
            mode,
            branch_type,
            repo_url: None,
            base_url: None,
            default_branch: None,
            clobber_on_branch_change: true,
            env: BTreeMap::new(),
            timeout: None,
        }
    }

    /// Address the repository directly (in-repo branches).
    pub fn with_repo_url(mut self, url: impl Into<String>) -> Self {
        self.repo_url = Some(url.into());
        self
    }

    /// Compose the repository URL from a base plus the branch (dirname
    /// branches).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_default_branch(mut self, branch: impl Into<String>) -> Self {
        self.default_branch = Some(branch.into());
        self
    }

    pub fn with_clobber_on_branch_change(mut self, clobber: bool) -> Self {
        self.clobber_on_branch_change = clobber;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn validate(&self) -> Result<(), CheckoutError> {
        match (&self.repo_url, &self.base_url) {
            (Some(_), Some(_)) | (None, None) => return Err(CheckoutError::ConflictingUrls),
            _ => {}
        }
        match self.branch_type {
            BranchType::InRepo if self.repo_url.is_none() => {
                return Err(CheckoutError::UrlForBranchType {
                    branch_type: self.branch_type.name(),
                    required: "repo_url",
                });
            }
            BranchType::Dirname if self.base_url.is_none() => {
                return Err(CheckoutError::UrlForBranchType {
                    branch_type: self.branch_type.name(),
                    required: "base_url",
                });
            }
            _ => {}
        }
        Ok(())
    }

    /// Remote URL for the given branch.
    ///
    /// For dirname backends the branch names a directory under the base URL;
    /// for in-repo backends the URL is fixed.
    pub(crate) fn url_for(&self, branch: Option<&str>) -> String {
        match (&self.repo_url, &self.base_url) {
            (Some(url), _) => url.clone(),
            (None, Some(base)) => format!("{base}{}", branch.unwrap_or("")),
            // validate() rules this shape out before any command is issued
            (None, None) => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_urls_rejected() {
        let config = CheckoutConfig::new(Mode::Incremental, BranchType::InRepo)
            .with_repo_url("http://hg.mozilla.org")
            .with_base_url("http://hg.mozilla.org");
        assert!(matches!(
            config.validate(),
            Err(CheckoutError::ConflictingUrls)
        ));
    }

    #[test]
    fn test_neither_url_rejected() {
        let config = CheckoutConfig::new(Mode::Full(Method::Clean), BranchType::InRepo);
        assert!(matches!(
            config.validate(),
            Err(CheckoutError::ConflictingUrls)
        ));
    }

    #[test]
    fn test_branch_type_url_mismatch_rejected() {
        let config = CheckoutConfig::new(Mode::Incremental, BranchType::Dirname)
            .with_repo_url("http://hg.mozilla.org");
        assert!(matches!(
            config.validate(),
            Err(CheckoutError::UrlForBranchType { .. })
        ));

        let config = CheckoutConfig::new(Mode::Incremental, BranchType::InRepo)
            .with_base_url("http://hg.mozilla.org/");
        assert!(matches!(
            config.validate(),
            Err(CheckoutError::UrlForBranchType { .. })
        ));
    }

    #[test]
    fn test_dirname_url_composition() {
        let config = CheckoutConfig::new(Mode::Incremental, BranchType::Dirname)
            .with_base_url("http://hg.mozilla.org/");
        assert_eq!(
            config.url_for(Some("stable")),
            "http://hg.mozilla.org/stable"
        );
        assert_eq!(config.url_for(None), "http://hg.mozilla.org/");
    }
}
