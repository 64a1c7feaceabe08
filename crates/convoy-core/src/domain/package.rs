//! Per-package release metadata.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use convoy_engine::Status;

/// Repository identity in `owner/name` form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Repo {
    pub owner: String,
    pub name: String,
}

impl FromStr for Repo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(format!("invalid repository {s:?}, expected owner/name")),
        }
    }
}

impl TryFrom<String> for Repo {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Repo> for String {
    fn from(repo: Repo) -> Self {
        repo.to_string()
    }
}

impl fmt::Display for Repo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// What kind of artifact a package releases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageKind {
    #[default]
    Library,
    Docker,
    ClientImage,
}

/// Classification of the resolved target ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseChannel {
    Stable,
    Prerelease,
    /// The resolved ref is already published; no release is needed.
    Skip,
}

impl ReleaseChannel {
    /// Pure classification from the resolved ref and the last published
    /// ref. Never suspends; safe inside a single tick.
    pub fn classify(target_ref: &str, published_ref: Option<&str>) -> Self {
        if published_ref == Some(target_ref) {
            return ReleaseChannel::Skip;
        }
        let lowered = target_ref.to_ascii_lowercase();
        if ["-rc", "-beta", "-alpha", "-pre"]
            .iter()
            .any(|marker| lowered.contains(marker))
        {
            ReleaseChannel::Prerelease
        } else {
            ReleaseChannel::Stable
        }
    }
}

/// Per-package record read and written by several goal fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageMeta {
    pub name: String,
    pub repo: Repo,
    pub kind: PackageKind,

    /// Ref the release targets, once resolved.
    #[serde(default)]
    pub target_ref: Option<String>,

    /// Last ref this package was released from, if any.
    #[serde(default)]
    pub published_ref: Option<String>,

    #[serde(default)]
    pub channel: Option<ReleaseChannel>,

    /// Latched outcome of this package's whole branch; sibling packages
    /// read it to observe progress without structural coupling.
    #[serde(default)]
    pub branch_outcome: Option<Status>,
}

impl PackageMeta {
    pub fn new(name: impl Into<String>, repo: Repo, kind: PackageKind) -> Self {
        Self {
            name: name.into(),
            repo,
            kind,
            target_ref: None,
            published_ref: None,
            channel: None,
            branch_outcome: None,
        }
    }

    /// Whether this package still needs releasing. Unknown (unclassified)
    /// counts as yes so the branch runs and finds out.
    pub fn needs_release(&self) -> bool {
        !matches!(self.channel, Some(ReleaseChannel::Skip))
    }
}
