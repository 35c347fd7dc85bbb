//! External dependency matching
//!
//! Specifiers that match the [`ExternalSet`] are never loaded; the generated
//! artifact asks the host for them at load time. Matching looks only at the
//! specifier as written and never touches the filesystem.

use std::{fmt, str::FromStr};

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use regex::RegexSet;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

use crate::error::{BundleError, BundleResult};

/// How external patterns are compared with specifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalStrategy {
    /// Pattern equals the specifier
    #[default]
    Exact,
    /// Pattern equals the specifier or is a `/`-separated prefix of it
    Prefix,
    /// Shell glob; `*` does not cross `/`, `**` does
    Glob,
    /// Regular expression, anchored by the pattern author if needed
    Regex,
}

impl FromStr for ExternalStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "prefix" => Ok(Self::Prefix),
            "glob" => Ok(Self::Glob),
            "regex" => Ok(Self::Regex),
            other => Err(format!(
                "unknown external strategy '{other}' (expected exact, prefix, glob or regex)"
            )),
        }
    }
}

impl fmt::Display for ExternalStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Exact => "exact",
            Self::Prefix => "prefix",
            Self::Glob => "glob",
            Self::Regex => "regex",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
enum Matcher {
    Exact(FxHashSet<String>),
    Prefix(Vec<String>),
    Glob(GlobSet),
    Regex(RegexSet),
}

/// Compiled set of external patterns for one output
#[derive(Debug, Clone)]
pub struct ExternalSet {
    strategy: ExternalStrategy,
    patterns: Vec<String>,
    matcher: Matcher,
}

impl ExternalSet {
    pub fn new(strategy: ExternalStrategy, patterns: Vec<String>) -> BundleResult<Self> {
        let matcher = match strategy {
            ExternalStrategy::Exact => Matcher::Exact(patterns.iter().cloned().collect()),
            ExternalStrategy::Prefix => Matcher::Prefix(
                patterns
                    .iter()
                    .map(|p| p.trim_end_matches('/').to_owned())
                    .collect(),
            ),
            ExternalStrategy::Glob => {
                let mut builder = GlobSetBuilder::new();
                for pattern in &patterns {
                    let glob = GlobBuilder::new(pattern)
                        .literal_separator(true)
                        .build()
                        .map_err(|e| {
                            BundleError::Config(format!("invalid external glob '{pattern}': {e}"))
                        })?;
                    builder.add(glob);
                }
                Matcher::Glob(builder.build().map_err(|e| {
                    BundleError::Config(format!("invalid external globs: {e}"))
                })?)
            }
            ExternalStrategy::Regex => Matcher::Regex(
                RegexSet::new(&patterns)
                    .map_err(|e| BundleError::Config(format!("invalid external regex: {e}")))?,
            ),
        };

        Ok(Self {
            strategy,
            patterns,
            matcher,
        })
    }

    /// An empty set that matches nothing
    pub fn none() -> Self {
        Self {
            strategy: ExternalStrategy::Exact,
            patterns: Vec::new(),
            matcher: Matcher::Exact(FxHashSet::default()),
        }
    }

    pub fn matches(&self, specifier: &str) -> bool {
        match &self.matcher {
            Matcher::Exact(set) => set.contains(specifier),
            Matcher::Prefix(prefixes) => prefixes.iter().any(|prefix| {
                specifier
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
            }),
            Matcher::Glob(set) => set.is_match(specifier),
            Matcher::Regex(set) => set.is_match(specifier),
        }
    }

    pub fn strategy(&self) -> ExternalStrategy {
        self.strategy
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(strategy: ExternalStrategy, patterns: &[&str]) -> ExternalSet {
        ExternalSet::new(
            strategy,
            patterns.iter().map(|p| (*p).to_owned()).collect(),
        )
        .expect("patterns should compile")
    }

    #[test]
    fn test_exact() {
        let externals = set(ExternalStrategy::Exact, &["fontkit"]);
        assert!(externals.matches("fontkit"));
        assert!(!externals.matches("fontkit/data"));
        assert!(!externals.matches("./fontkit"));
    }

    #[test]
    fn test_prefix_respects_path_boundary() {
        let externals = set(ExternalStrategy::Prefix, &["lodash", "@scope/pkg/"]);
        assert!(externals.matches("lodash"));
        assert!(externals.matches("lodash/fp/map"));
        assert!(!externals.matches("lodash-es"));
        assert!(externals.matches("@scope/pkg"));
        assert!(externals.matches("@scope/pkg/inner"));
    }

    #[test]
    fn test_glob() {
        let externals = set(ExternalStrategy::Glob, &["@babel/*", "core-js/**"]);
        assert!(externals.matches("@babel/runtime"));
        assert!(!externals.matches("@babel/runtime/helpers"));
        assert!(externals.matches("core-js/modules/es.array"));
        assert!(!externals.matches("react"));
    }

    #[test]
    fn test_regex() {
        let externals = set(ExternalStrategy::Regex, &["^node:"]);
        assert!(externals.matches("node:fs"));
        assert!(!externals.matches("fs"));
    }

    #[test]
    fn test_invalid_patterns_are_config_errors() {
        let err = ExternalSet::new(ExternalStrategy::Regex, vec!["(".to_owned()])
            .expect_err("regex should not compile");
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);

        assert!(ExternalSet::new(ExternalStrategy::Glob, vec!["a[".to_owned()]).is_err());
    }

    #[test]
    fn test_none_matches_nothing() {
        let externals = ExternalSet::none();
        assert!(externals.is_empty());
        assert!(!externals.matches(""));
    }
}
