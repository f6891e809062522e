// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Folder paths reach curator from many places: glob matches, manifest
//! entries, command line arguments, and placeholder directories. They all go
//! through [`NormalizedPath`] before being compared so that two spellings of
//! the same directory end up as the same string.
//!
//! # Normal Form
//!
//! A normalized path uses `/` as its only separator. If it starts with a
//! single-letter drive designator, e.g., `C:`, then that letter is lowered.
//! Nothing else is touched, so normalization never performs I/O and never
//! fails.
//!
//! # Placeholders
//!
//! Closed folders are swapped out for __placeholder__ directories that live
//! under a fixed root named `closed-projects` inside the temporary directory.
//! The original path is encoded as the placeholder's path relative to that
//! root, with drive letters rewritten as `<letter>-drive` so the encoding is
//! a valid relative path on every platform.

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::{Component, Path, PathBuf},
};

/// Directory name marking the placeholder root.
pub const PLACEHOLDER_MARKER: &str = "closed-projects";

/// Normalize path spelling.
///
/// Unifies separators to `/`, and lowers a leading drive letter.
pub fn normalize(path: impl AsRef<str>) -> String {
    let mut unified = path.as_ref().replace('\\', "/");
    if has_drive(&unified) {
        unified[..1].make_ascii_lowercase();
    }

    unified
}

fn has_drive(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Path in normal form.
///
/// # Invariant
///
/// - Two paths denoting the same directory hold identical strings.
#[derive(Default, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NormalizedPath(String);

impl NormalizedPath {
    /// Construct new normalized path from string.
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(normalize(path))
    }

    /// Construct new normalized path from filesystem path.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::new(path.as_ref().to_string_lossy())
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn as_path(&self) -> &Path {
        Path::new(self.0.as_str())
    }

    /// Iterate over non-empty path segments.
    pub fn segments(&self) -> impl DoubleEndedIterator<Item = &str> {
        self.0.split('/').filter(|segment| !segment.is_empty())
    }

    /// Final path segment.
    pub fn file_name(&self) -> &str {
        self.segments().next_back().unwrap_or_default()
    }

    /// Check if path points into the placeholder root.
    pub fn is_placeholder(&self) -> bool {
        self.segments().any(|segment| segment == PLACEHOLDER_MARKER)
    }
}

impl Display for NormalizedPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

impl AsRef<Path> for NormalizedPath {
    fn as_ref(&self) -> &Path {
        self.as_path()
    }
}

impl From<&str> for NormalizedPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Default placeholder root.
///
/// Uses `$TMPDIR/closed-projects`. Does not check if the path returned
/// actually exists.
pub fn default_placeholder_root() -> PathBuf {
    std::env::temp_dir().join(PLACEHOLDER_MARKER)
}

/// Determine placeholder directory for a closed folder.
///
/// Same input path always yields the same placeholder path. Does not create
/// anything.
pub fn placeholder_for(root: impl AsRef<Path>, path: &NormalizedPath) -> PathBuf {
    let path = path.as_str();
    let encoded = if has_drive(path) {
        format!("{}-drive{}", &path[..1], &path[2..])
    } else {
        path.to_string()
    };

    root.as_ref().join(encoded.trim_start_matches('/'))
}

/// Recover the original folder path that a placeholder stands in for.
///
/// Returns `None` if the placeholder does not live under the given root.
pub fn original_of(root: &NormalizedPath, placeholder: &NormalizedPath) -> Option<NormalizedPath> {
    let rest = placeholder
        .as_str()
        .strip_prefix(root.as_str().trim_end_matches('/'))?
        .strip_prefix('/')?;
    if rest.is_empty() {
        return None;
    }

    let decoded = match rest.split_once('/') {
        Some((head, tail)) if is_drive_node(head) => format!("{}:/{tail}", &head[..1]),
        None if is_drive_node(rest) => format!("{}:/", &rest[..1]),
        _ => format!("/{rest}"),
    };

    Some(NormalizedPath::new(decoded))
}

fn is_drive_node(node: &str) -> bool {
    node.len() == 7 && node.as_bytes()[0].is_ascii_alphabetic() && &node[1..] == "-drive"
}

/// Express path relative to base.
///
/// Result is always `/` separated, and climbs out of base with `..` when
/// needed. Paths on a different drive than base are returned as-is.
pub fn relative_to(base: &NormalizedPath, path: &NormalizedPath) -> String {
    let base_nodes = base.segments().collect::<Vec<_>>();
    let path_nodes = path.segments().collect::<Vec<_>>();
    let shared = base_nodes
        .iter()
        .zip(path_nodes.iter())
        .take_while(|(lhs, rhs)| lhs == rhs)
        .count();

    if shared == 0 && (has_drive(base.as_str()) || has_drive(path.as_str())) {
        return path.as_str().to_string();
    }

    let mut nodes = vec![".."; base_nodes.len() - shared];
    nodes.extend_from_slice(&path_nodes[shared..]);
    nodes.join("/")
}

/// Lexically resolve `.` and `..` components.
///
/// Does not touch the filesystem, so symbolic links are not followed.
pub fn clean(path: impl AsRef<Path>) -> PathBuf {
    let mut cleaned = PathBuf::new();
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match cleaned.components().next_back() {
                Some(Component::Normal(_)) => {
                    cleaned.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => cleaned.push(".."),
            },
            other => cleaned.push(other.as_os_str()),
        }
    }

    cleaned
}

/// Make path absolute relative to the current directory, then clean it.
///
/// # Errors
///
/// - Return [`PathError::Absolute`] if current directory cannot be determined.
pub fn absolute(path: impl AsRef<Path>) -> Result<PathBuf> {
    std::path::absolute(path.as_ref())
        .map(clean)
        .map_err(|source| PathError::Absolute {
            source,
            path: path.as_ref().to_path_buf(),
        })
}

/// Path resolution error types.
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// Absolute form of path cannot be determined.
    #[error("cannot determine absolute path of {:?}", path.display())]
    Absolute {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = PathError> = std::result::Result<T, E>;
