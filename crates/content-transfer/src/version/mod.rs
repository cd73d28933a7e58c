//! Version compatibility checking between source and destination projects.
//!
//! Both providers report the version of the project they wrap. Before any
//! data moves, the engine checks the two versions against the configured
//! [`VersionMatching`] strategy and refuses the transfer when they cannot be
//! reconciled.

use std::fmt;

use semver::Version;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TransferError};

/// How strictly source and destination versions must match.
///
/// Each strategy names the largest release-level difference it tolerates:
/// `Patch` allows patch-level drift, `Minor` additionally allows minor-level
/// drift, and `Major` accepts any pair of parseable versions. Every stricter
/// strategy's accepted set is a superset of the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VersionMatching {
    /// Skip the version check entirely.
    #[default]
    Ignore,
    /// Allow patch, prepatch, prerelease and build differences.
    Patch,
    /// Allow minor and preminor differences, plus everything `Patch` allows.
    Minor,
    /// Allow major and premajor differences, plus everything `Minor` allows.
    Major,
}

impl fmt::Display for VersionMatching {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VersionMatching::Ignore => "ignore",
            VersionMatching::Patch => "patch",
            VersionMatching::Minor => "minor",
            VersionMatching::Major => "major",
        };
        f.write_str(name)
    }
}

/// Release-level category of the difference between two versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VersionDiff {
    Major,
    Premajor,
    Minor,
    Preminor,
    Patch,
    Prepatch,
    Prerelease,
    Build,
}

/// Assert that two project versions are compatible under a matching strategy.
///
/// Passes silently when either version is missing, when the strategy is
/// [`VersionMatching::Ignore`], or when the two strings are identical.
/// Unparseable versions fail with an error naming both versions and the
/// strategy.
pub fn assert_versions_compatible(
    source: Option<&str>,
    destination: Option<&str>,
    strategy: VersionMatching,
) -> Result<()> {
    let (source, destination) = match (source, destination) {
        (Some(s), Some(d)) => (s, d),
        // Nothing to assert against.
        _ => return Ok(()),
    };

    if strategy == VersionMatching::Ignore || source == destination {
        return Ok(());
    }

    let mismatch = || TransferError::VersionMismatch {
        source_version: source.to_string(),
        destination_version: destination.to_string(),
        strategy,
    };

    let parsed_source = Version::parse(source).map_err(|_| mismatch())?;
    let parsed_destination = Version::parse(destination).map_err(|_| mismatch())?;

    match version_diff(&parsed_source, &parsed_destination) {
        // Equal once parsed (e.g. leading zero quirks), nothing to reject.
        None => Ok(()),
        Some(diff) if accepted(strategy, diff) => Ok(()),
        Some(_) => Err(mismatch()),
    }
}

/// Categorize the difference between two versions, highest component first.
///
/// Returns `None` when the versions are identical.
fn version_diff(source: &Version, destination: &Version) -> Option<VersionDiff> {
    let has_prerelease = !source.pre.is_empty() || !destination.pre.is_empty();

    if source.major != destination.major {
        return Some(if has_prerelease {
            VersionDiff::Premajor
        } else {
            VersionDiff::Major
        });
    }
    if source.minor != destination.minor {
        return Some(if has_prerelease {
            VersionDiff::Preminor
        } else {
            VersionDiff::Minor
        });
    }
    if source.patch != destination.patch {
        return Some(if has_prerelease {
            VersionDiff::Prepatch
        } else {
            VersionDiff::Patch
        });
    }
    if source.pre != destination.pre {
        return Some(VersionDiff::Prerelease);
    }
    if source.build != destination.build {
        return Some(VersionDiff::Build);
    }
    None
}

fn accepted(strategy: VersionMatching, diff: VersionDiff) -> bool {
    use VersionDiff::*;

    match strategy {
        VersionMatching::Ignore => true,
        VersionMatching::Patch => matches!(diff, Patch | Prepatch | Prerelease | Build),
        VersionMatching::Minor => {
            matches!(diff, Minor | Preminor | Patch | Prepatch | Prerelease | Build)
        }
        VersionMatching::Major => true,
    }
}
