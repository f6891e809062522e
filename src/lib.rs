// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Keep a multi-root workspace in sync with the directory tree.
//!
//! Curator computes which folders _should_ be open in a workspace from a set
//! of include and exclude glob patterns, then makes the host's live folder
//! list match. Closed folders are swapped for empty placeholder directories
//! so they keep their place in the workspace without loading their contents.
//! Folder display names are derived from their paths, renamed through regular
//! expressions, and annotated with an environment qualifier and the version
//! control branch they are checked out on.
//!
//! # Layout
//!
//! - [`config`]: workspace manifest layout.
//! - [`host`]: host abstraction and the manifest backed host.
//! - [`path`]: path normalization and placeholder encoding.
//! - [`vcs`]: branch lookup through version control.
//! - [`workspace`]: target model, naming, and reconciliation.

pub mod config;
pub mod host;
pub mod path;
pub mod vcs;
pub mod workspace;
