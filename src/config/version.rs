//! Protocol version compatibility.
//!
//! The host reports [`PROTOCOL_VERSION`]; a client may carry a requirement
//! like `"^1.0"` and refuse to talk to an incompatible host.

use semver::{Version, VersionReq};
use thiserror::Error;

/// Wire protocol version spoken by this crate.
pub const PROTOCOL_VERSION: &str = "1.2.0";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VersionError {
    #[error("invalid version '{value}': {reason}")]
    InvalidVersion { value: String, reason: String },

    #[error("invalid version requirement '{value}': {reason}")]
    InvalidRequirement { value: String, reason: String },
}

pub fn parse_requirement(requirement: &str) -> Result<VersionReq, VersionError> {
    VersionReq::parse(requirement.trim()).map_err(|e| VersionError::InvalidRequirement {
        value: requirement.to_string(),
        reason: e.to_string(),
    })
}

/// Check if a version matches a requirement string
///
/// # Examples
///
/// ```
/// use hostbridge::config::version::matches_requirement;
///
/// assert!(matches_requirement("1.2.0", Some("^1.0")).unwrap());
/// assert!(!matches_requirement("2.0.0", Some("^1.0")).unwrap());
///
/// // None requirement accepts every version
/// assert!(matches_requirement("1.0.0", None).unwrap());
/// ```
pub fn matches_requirement(
    version: &str,
    requirement: Option<&str>,
) -> Result<bool, VersionError> {
    let Some(req_str) = requirement else {
        return Ok(true);
    };

    let req_str = req_str.trim();
    if req_str.is_empty() {
        return Ok(true);
    }

    let version = Version::parse(version).map_err(|e| VersionError::InvalidVersion {
        value: version.to_string(),
        reason: e.to_string(),
    })?;

    Ok(parse_requirement(req_str)?.matches(&version))
}
