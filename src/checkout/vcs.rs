//! VCS command dialects.
//!
//! The state machine works in logical phases; a dialect maps each phase to
//! the concrete argv for one VCS. Mercurial is the reference dialect. Any
//! VCS with the same command shape (version probe, existence probe, fetch,
//! update-to-revision) can implement this trait without touching the state
//! machine.

/// Command vocabulary of one VCS backend.
pub trait VcsCommands: Send + Sync {
    /// Path, relative to the working directory, that proves a repository
    /// exists there.
    fn existence_marker(&self) -> &'static str;

    /// Branch name builds use when neither the specifier nor the
    /// configuration names one.
    fn default_branch_name(&self) -> &'static str;

    /// Probe that the tool is installed on the worker at all.
    fn version_probe(&self) -> Vec<String>;

    /// Clone `url` into the working directory. With `no_update` the clone
    /// leaves the working copy empty so a separate update can pick the
    /// revision.
    fn clone_repo(&self, url: &str, no_update: bool) -> Vec<String>;

    /// Fetch from `url`; with `update` the working copy is advanced too.
    fn pull(&self, url: &str, update: bool) -> Vec<String>;

    /// Delete untracked files; with `include_ignored` also ignored ones.
    fn purge(&self, include_ignored: bool) -> Vec<String>;

    /// Bring the working copy to `revision`, or to the branch tip when
    /// `None`.
    fn update(&self, revision: Option<&str>) -> Vec<String>;

    /// Print the branch the working copy is currently on.
    fn identify_branch(&self) -> Vec<String>;

    /// Print the revision the working copy now holds.
    fn identify_revision(&self) -> Vec<String>;

    fn parse_branch(&self, stdout: &str) -> Option<String>;

    fn parse_revision(&self, stdout: &str) -> Option<String>;
}

/// The reference dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct Mercurial;

impl Mercurial {
    fn hg(args: &[&str]) -> Vec<String> {
        let mut argv = vec!["hg".to_string(), "--verbose".to_string()];
        argv.extend(args.iter().map(|arg| arg.to_string()));
        argv
    }
}

impl VcsCommands for Mercurial {
    fn existence_marker(&self) -> &'static str {
        ".hg"
    }

    fn default_branch_name(&self) -> &'static str {
        "default"
    }

    fn version_probe(&self) -> Vec<String> {
        Self::hg(&["--version"])
    }

    fn clone_repo(&self, url: &str, no_update: bool) -> Vec<String> {
        if no_update {
            Self::hg(&["clone", "--noupdate", url, "."])
        } else {
            Self::hg(&["clone", url, "."])
        }
    }

    fn pull(&self, url: &str, update: bool) -> Vec<String> {
        if update {
            Self::hg(&["pull", url, "--update"])
        } else {
            Self::hg(&["pull", url])
        }
    }

    fn purge(&self, include_ignored: bool) -> Vec<String> {
        // The purge extension ships with hg but is disabled by default.
        if include_ignored {
            Self::hg(&["--config", "extensions.purge=", "purge", "--all"])
        } else {
            Self::hg(&["--config", "extensions.purge=", "purge"])
        }
    }

    fn update(&self, revision: Option<&str>) -> Vec<String> {
        match revision {
            Some(revision) => Self::hg(&["update", "--clean", "--rev", revision]),
            None => Self::hg(&["update", "--clean"]),
        }
    }

    fn identify_branch(&self) -> Vec<String> {
        Self::hg(&["identify", "--branch"])
    }

    fn identify_revision(&self) -> Vec<String> {
        Self::hg(&["identify", "--id", "--debug"])
    }

    fn parse_branch(&self, stdout: &str) -> Option<String> {
        stdout
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(String::from)
    }

    fn parse_revision(&self, stdout: &str) -> Option<String> {
        // `identify` output may be preceded by extension chatter; the node
        // hash is the last non-empty line.
        stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .next_back()
            .map(String::from)
    }
}
