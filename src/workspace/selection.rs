// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Open and close folders by editing exclude patterns.
//!
//! Closing a folder appends its base relative path to the exclude list.
//! Opening a placeholder removes the exclude entry of the folder it stands in
//! for. Neither touches the live folder list. The configuration change that
//! follows drives the next reconciliation pass.
//!
//! Entries are written as escaped glob patterns so that folder names with
//! glob meta characters match only themselves. Opening only removes entries
//! written this way. A folder closed by a wildcard pattern written by hand
//! stays closed.

use crate::{
    host::{Result, WorkspaceHost},
    path::{self, NormalizedPath},
};

use glob::Pattern;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

/// Close selected folders.
///
/// Placeholders and folders that are already excluded are skipped. Returns
/// `true` if the exclude list changed.
///
/// # Errors
///
/// - Return [`HostError`](crate::host::HostError) if settings cannot be read
///   or written.
#[instrument(skip(host, selection), level = "debug")]
pub fn close_folders<H>(host: &mut H, selection: &[NormalizedPath]) -> Result<bool>
where
    H: WorkspaceHost + ?Sized,
{
    let base = NormalizedPath::from_path(host.base_dir());
    let mut black = host.settings()?.projects.list.black;
    let mut updated = false;

    for selected in selection {
        if selected.is_placeholder() {
            debug!("skip {selected}, already closed");
            continue;
        }

        let relative = path::relative_to(&base, selected);
        if relative.is_empty() {
            warn!("refuse to close base directory {selected}");
            continue;
        }

        let pattern = Pattern::escape(&relative);
        if black.contains(&pattern) {
            continue;
        }

        info!("close {relative}");
        black.push(pattern);
        updated = true;
    }

    if updated {
        host.update_excluded(black)?;
    }

    Ok(updated)
}

/// Open selected placeholders.
///
/// Selected folders that are not placeholders under `placeholder_root` are
/// skipped. Returns `true` if the exclude list changed.
///
/// # Errors
///
/// - Return [`HostError`](crate::host::HostError) if settings cannot be read
///   or written.
#[instrument(skip(host, placeholder_root, selection), level = "debug")]
pub fn open_folders<H>(
    host: &mut H,
    placeholder_root: &Path,
    selection: &[NormalizedPath],
) -> Result<bool>
where
    H: WorkspaceHost + ?Sized,
{
    let base = NormalizedPath::from_path(host.base_dir());
    let root = NormalizedPath::from_path(placeholder_root);
    let mut black = host.settings()?.projects.list.black;
    let before = black.len();

    for selected in selection {
        let Some(original) = path::original_of(&root, selected) else {
            debug!("skip {selected}, not a placeholder");
            continue;
        };

        let pattern = Pattern::escape(&path::relative_to(&base, &original));
        info!("open {original}");
        black.retain(|entry| entry != &pattern);
    }

    let updated = black.len() != before;
    if updated {
        host.update_excluded(black)?;
    }

    Ok(updated)
}
