// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Folder display names.
//!
//! Every folder in the workspace is labeled by its final path segment,
//! optionally renamed, then annotated with an environment qualifier and a
//! branch when either is known. The label takes exactly one of four forms:
//!
//! - `name`
//! - `name <qualifier>`
//! - `name <branch>`
//! - `name <qualifier:branch>`

use crate::{config::NamingSettings, path::NormalizedPath};

use regex::{Captures, Regex};
use std::sync::LazyLock;

static GROUP_REFERENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+)").expect("group reference pattern is valid"));

/// Derive display names from paths.
#[derive(Debug, Clone, Default)]
pub struct NameDeriver {
    rules: Vec<(Regex, String)>,
    qualifiers: Vec<String>,
}

impl NameDeriver {
    /// Construct new name deriver from naming settings.
    ///
    /// Rules and qualifiers keep the order they were configured in.
    ///
    /// # Errors
    ///
    /// - Return [`NamingError::InvalidPattern`] if a rename pattern does not
    ///   compile.
    pub fn new(settings: &NamingSettings) -> Result<Self> {
        let rules = settings
            .rename
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|regex| (regex, rule.replacement.clone()))
                    .map_err(|source| NamingError::InvalidPattern {
                        source,
                        pattern: rule.pattern.clone(),
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            rules,
            qualifiers: settings.qualifiers.clone(),
        })
    }

    /// Derive display name of folder with optional branch annotation.
    pub fn derive(&self, path: &NormalizedPath, branch: Option<&str>) -> String {
        let mut nodes = path.segments().collect::<Vec<_>>();
        let base = nodes.pop().unwrap_or_default();
        let name = self.rename(base);

        let qualifier = self
            .qualifiers
            .iter()
            .find(|qualifier| nodes.contains(&qualifier.as_str()));

        let branch = branch.and_then(|branch| strip_name(branch, &name));

        match (qualifier, branch) {
            (Some(qualifier), Some(branch)) => format!("{name} <{qualifier}:{branch}>"),
            (Some(qualifier), None) => format!("{name} <{qualifier}>"),
            (None, Some(branch)) => format!("{name} <{branch}>"),
            (None, None) => name,
        }
    }

    fn rename(&self, base: &str) -> String {
        for (regex, replacement) in &self.rules {
            if let Some(captures) = regex.captures(base) {
                return expand(replacement, &captures);
            }
        }

        base.to_string()
    }
}

// INVARIANT: Only numbered groups are substituted, unknown groups vanish.
fn expand(replacement: &str, captures: &Captures<'_>) -> String {
    GROUP_REFERENCE
        .replace_all(replacement, |reference: &Captures<'_>| {
            reference[1]
                .parse::<usize>()
                .ok()
                .and_then(|index| captures.get(index))
                .map(|group| group.as_str().to_string())
                .unwrap_or_default()
        })
        .into_owned()
}

fn strip_name<'a>(branch: &'a str, name: &str) -> Option<&'a str> {
    if branch.is_empty() || branch == name {
        return None;
    }

    match branch.strip_suffix(name).and_then(|rest| rest.strip_suffix('/')) {
        Some(rest) if rest.is_empty() => None,
        Some(rest) => Some(rest),
        None => Some(branch),
    }
}

/// Naming error types.
#[derive(Debug, thiserror::Error)]
pub enum NamingError {
    /// Rename rule pattern is not a valid regular expression.
    #[error("invalid rename pattern {pattern:?}")]
    InvalidPattern {
        #[source]
        source: regex::Error,
        pattern: String,
    },
}

/// Friendly result alias :3
type Result<T, E = NamingError> = std::result::Result<T, E>;
