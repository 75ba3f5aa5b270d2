//! Version constraint resolution
//!
//! Versions are parsed leniently (`1` → `1.0.0`, `1.2` → `1.2.0`, a leading
//! `v` is ignored). A constraint is one of:
//!
//! - empty or `*`: always satisfied
//! - a bare version (`1.1.0`): exactly that version in exact mode, otherwise
//!   that version or newer
//! - comparator expressions (`>=1.0.0 & <2.0.0`, `>=1.0.0, <2.0.0`), with
//!   `|`/`||` separating alternatives
//!
//! Anything that fails to parse is reported as
//! [`PluginHostError::MalformedVersionExpression`], never as a plain `false`.

use std::cmp::Ordering;

use semver::{Version, VersionReq};

use crate::error::PluginHostError;

/// Evaluates version constraints with a fixed exact-version mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VersionResolver {
    exact: bool,
}

impl VersionResolver {
    /// Create a resolver; `exact` makes bare-version constraints exact matches
    pub fn new(exact: bool) -> Self {
        Self { exact }
    }

    /// Whether bare versions are treated as exact matches
    pub fn is_exact(&self) -> bool {
        self.exact
    }

    /// Check whether `version` satisfies `constraint`
    pub fn satisfies(&self, version: &str, constraint: &str) -> Result<bool, PluginHostError> {
        let constraint = constraint.trim();
        if is_unconstrained(constraint) {
            return Ok(true);
        }

        let version = parse_version(version)?;
        let alternatives = constraint
            .split('|')
            .map(str::trim)
            .filter(|alt| !alt.is_empty())
            .map(|alt| self.requirement(alt, constraint))
            .collect::<Result<Vec<_>, _>>()?;

        if alternatives.is_empty() {
            return Err(PluginHostError::malformed(constraint, "no alternatives"));
        }

        Ok(alternatives.iter().any(|req| req.matches(&version)))
    }

    fn requirement(&self, alternative: &str, whole: &str) -> Result<VersionReq, PluginHostError> {
        if looks_like_bare_version(alternative) {
            let version = parse_version(alternative)?;
            let op = if self.exact { "=" } else { ">=" };
            return VersionReq::parse(&format!("{op}{version}"))
                .map_err(|e| PluginHostError::malformed(whole, e));
        }

        let comparators: Vec<&str> = alternative
            .split([',', '&'])
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();
        if comparators.is_empty() {
            return Err(PluginHostError::malformed(whole, "empty comparator list"));
        }

        VersionReq::parse(&comparators.join(", ")).map_err(|e| PluginHostError::malformed(whole, e))
    }
}

/// Empty and `*` constraints never restrict anything
pub fn is_unconstrained(constraint: &str) -> bool {
    let constraint = constraint.trim();
    constraint.is_empty() || constraint == "*"
}

/// Check `version` against `constraint` with the given exact mode
pub fn satisfies(version: &str, constraint: &str, exact: bool) -> Result<bool, PluginHostError> {
    VersionResolver::new(exact).satisfies(version, constraint)
}

/// Parse a version string, padding missing minor/patch components
pub fn parse_version(raw: &str) -> Result<Version, PluginHostError> {
    let trimmed = raw.trim();
    let body = trimmed.strip_prefix('v').unwrap_or(trimmed);
    if body.is_empty() {
        return Err(PluginHostError::malformed(raw, "empty version"));
    }

    let split_at = body.find(['-', '+']).unwrap_or(body.len());
    let (core, suffix) = body.split_at(split_at);
    let padded = match core.matches('.').count() {
        0 => format!("{core}.0.0{suffix}"),
        1 => format!("{core}.0{suffix}"),
        _ => body.to_string(),
    };

    Version::parse(&padded).map_err(|e| PluginHostError::malformed(raw, e))
}

/// Compare two version strings
pub fn compare_versions(a: &str, b: &str) -> Result<Ordering, PluginHostError> {
    Ok(parse_version(a)?.cmp(&parse_version(b)?))
}

/// Whether `candidate` is strictly newer than `installed`
pub fn is_newer(candidate: &str, installed: &str) -> Result<bool, PluginHostError> {
    Ok(compare_versions(candidate, installed)? == Ordering::Greater)
}

fn looks_like_bare_version(s: &str) -> bool {
    let body = s.strip_prefix('v').unwrap_or(s);
    body.chars().next().is_some_and(|c| c.is_ascii_digit())
        && !body.contains([',', '&', ' ', '<', '>', '=', '~', '^', '*'])
}
