// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Workspace reconciliation.
//!
//! Keep the host's open folder list in sync with the target model. The
//! [`Reconciler`] reacts to host events, recomputes the model, and pushes the
//! difference back to the host as a single batched replacement.
//!
//! # Self-Caused Notifications
//!
//! Hosts echo every folder update back as a folder change notification. The
//! reconciler cannot tell that echo apart from a user edit by content alone,
//! so it arms a suppression flag right before submitting an update. The next
//! folder change notification is then consumed without touching the unmanaged
//! folder listing. The flag is disarmed when the host rejects the update, or
//! when no notification shows up within a grace period.
//!
//! # Concurrency
//!
//! Every handler takes the reconciler by exclusive reference, so at most one
//! pass runs at a time. Hosts that deliver events concurrently must queue
//! them in front of the reconciler.

pub mod model;
pub mod naming;
pub mod selection;

use crate::{
    config::FolderEntry,
    host::{ConfigScope, HostError, HostEvent, WorkspaceHost},
    path::{self, NormalizedPath},
    vcs::BranchLocator,
    workspace::model::{Model, ModelBuilder, ModelError},
};

use std::{
    collections::BTreeSet,
    mem::replace,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};
use tracing::{debug, error, info, instrument, warn};

/// Time an armed suppression flag waits for its notification.
pub const SUPPRESSION_GRACE: Duration = Duration::from_secs(5);

/// Workspace folder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Folder {
    pub path: NormalizedPath,
    pub name: String,
}

impl Folder {
    pub fn new(path: impl Into<NormalizedPath>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.path.is_placeholder()
    }

    pub fn to_entry(&self) -> FolderEntry {
        FolderEntry {
            path: self.path.to_string(),
            name: Some(self.name.clone()),
        }
    }
}

/// Folders added to and removed from the live list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FolderChange {
    pub added: Vec<Folder>,
    pub removed: Vec<Folder>,
}

/// Result of a reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Live list already matched the model.
    Unchanged,

    /// Live list was replaced.
    Applied { added: usize, removed: usize },

    /// Host rejected the update and was asked to reload.
    ReloadRequested,
}

/// Folder list replacement computed from the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Full replacement list, sorted by display name.
    pub folders: Vec<Folder>,
    pub added: usize,
    pub removed: usize,
}

/// Compute replacement of `current` that matches `target`.
///
/// Folders in both lists are kept, folders only in `target` are added, and
/// everything else is dropped. Folders compare by path _and_ name, so a
/// renamed folder counts as removed and re-added. Repeated entries in
/// `current` are kept once, and the extra copies count as removed. The result
/// is stably sorted by display name.
///
/// Returns `None` when nothing would be added or removed.
pub fn plan(target: &BTreeSet<Folder>, current: &[Folder]) -> Option<Plan> {
    let mut seen = BTreeSet::new();
    let mut folders = current
        .iter()
        .filter(|folder| target.contains(*folder) && seen.insert(*folder))
        .cloned()
        .collect::<Vec<_>>();
    let removed = current.len() - folders.len();

    let adding = target
        .iter()
        .filter(|folder| !current.contains(folder))
        .cloned()
        .collect::<Vec<_>>();
    let added = adding.len();

    if added == 0 && removed == 0 {
        return None;
    }

    folders.extend(adding);
    folders.sort_by(|lhs, rhs| lhs.name.cmp(&rhs.name));

    Some(Plan {
        folders,
        added,
        removed,
    })
}

/// Suppression flag for self-caused folder change notifications.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Suppression {
    /// Every folder change notification is treated as a user edit.
    #[default]
    Idle,

    /// Next notification observed before `deadline` is self-caused.
    Suppressing { deadline: Instant },
}

/// Mutable reconciliation state.
#[derive(Debug, Clone)]
pub struct ReconcilerState {
    managed: BTreeSet<NormalizedPath>,
    suppression: Suppression,
    grace: Duration,
}

impl ReconcilerState {
    pub fn new(grace: Duration) -> Self {
        Self {
            managed: BTreeSet::new(),
            suppression: Suppression::Idle,
            grace,
        }
    }

    /// Folders matched by include patterns during the last pass.
    pub fn managed(&self) -> &BTreeSet<NormalizedPath> {
        &self.managed
    }

    pub fn suppression(&self) -> Suppression {
        self.suppression
    }

    /// Arm suppression right before submitting a folder update.
    pub fn begin_batch(&mut self, now: Instant) {
        self.suppression = Suppression::Suppressing {
            deadline: now + self.grace,
        };
    }

    /// Disarm suppression because the host rejected the update.
    pub fn cancel_batch(&mut self) {
        self.suppression = Suppression::Idle;
    }

    /// Observe folder change notification.
    ///
    /// Returns `true` if the notification is self-caused and must be ignored.
    /// Either way suppression is disarmed afterwards.
    pub fn observe_folder_change(&mut self, now: Instant) -> bool {
        match replace(&mut self.suppression, Suppression::Idle) {
            Suppression::Suppressing { deadline } if now <= deadline => true,
            Suppression::Suppressing { .. } => {
                warn!("expected folder change notification never arrived");
                false
            }
            Suppression::Idle => false,
        }
    }
}

impl Default for ReconcilerState {
    fn default() -> Self {
        Self::new(SUPPRESSION_GRACE)
    }
}

/// Reconcile host folders against the target model.
#[derive(Debug)]
pub struct Reconciler<H, L>
where
    H: WorkspaceHost,
    L: BranchLocator,
{
    host: H,
    locator: L,
    placeholder_root: PathBuf,
    state: ReconcilerState,
    reload_pending: bool,
}

impl<H, L> Reconciler<H, L>
where
    H: WorkspaceHost,
    L: BranchLocator,
{
    /// Construct new reconciler.
    ///
    /// Placeholders are created under the system temporary directory unless
    /// [`Reconciler::with_placeholder_root`] says otherwise.
    pub fn new(host: H, locator: L) -> Self {
        Self {
            host,
            locator,
            placeholder_root: path::default_placeholder_root(),
            state: ReconcilerState::default(),
            reload_pending: false,
        }
    }

    pub fn with_placeholder_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.placeholder_root = root.into();
        self
    }

    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.state = ReconcilerState::new(grace);
        self
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn state(&self) -> &ReconcilerState {
        &self.state
    }

    pub fn placeholder_root(&self) -> &Path {
        self.placeholder_root.as_path()
    }

    /// Host was asked to reload, and no activation has run since.
    pub fn reload_pending(&self) -> bool {
        self.reload_pending
    }

    /// Run initial reconciliation pass.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::UpdateRejected`] if host rejects the
    ///   initial update.
    /// - Return [`WorkspaceError::Model`] if target model cannot be built.
    pub async fn activate(&mut self) -> Result<Outcome> {
        info!("activate workspace reconciliation");
        self.reload_pending = false;
        self.reconcile(true).await
    }

    /// Run one reconciliation pass.
    ///
    /// A rejected update during the `initial` pass is reported to the user
    /// and returned as an error. Later rejections ask the host to reload
    /// instead, and the pass returns [`Outcome::ReloadRequested`].
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::UpdateRejected`] if host rejects the
    ///   initial update.
    /// - Return [`WorkspaceError::Model`] if target model cannot be built.
    /// - Return [`WorkspaceError::Host`] if host cannot be read or reloaded.
    #[instrument(skip(self), level = "debug")]
    pub async fn reconcile(&mut self, initial: bool) -> Result<Outcome> {
        let settings = self.host.settings()?;
        let builder = ModelBuilder::new(self.host.base_dir(), &self.placeholder_root);
        let Model { folders, managed } = builder.build(&settings, &self.locator).await?;
        self.state.managed = managed;

        let current = self.host.folders();
        let Some(plan) = plan(&folders, &current) else {
            debug!("workspace already matches model");
            return Ok(Outcome::Unchanged);
        };

        info!(
            "update workspace folders: {} added, {} removed",
            plan.added, plan.removed
        );
        self.state.begin_batch(Instant::now());
        let error = match self.host.replace_folders(&plan.folders) {
            Ok(()) => {
                return Ok(Outcome::Applied {
                    added: plan.added,
                    removed: plan.removed,
                });
            }
            Err(error) => error,
        };
        self.state.cancel_batch();

        if initial {
            error!("workspace rejected folder update: {error}");
            error!("current folder count: {}", current.len());
            error!("target folders: {:#?}", plan.folders);
            self.host
                .report_error("workspace folders could not be updated, check the log for details");
            return Err(WorkspaceError::UpdateRejected { source: error });
        }

        warn!("workspace rejected folder update, requesting reload: {error}");
        self.host.request_reload()?;
        self.reload_pending = true;

        Ok(Outcome::ReloadRequested)
    }

    /// Route host event to its handler.
    ///
    /// A pass that ends in a reload request leaves [`Self::reload_pending`]
    /// set. The caller decides when to activate again.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError`] if the handler fails.
    pub async fn handle(&mut self, event: HostEvent) -> Result<Outcome> {
        match event {
            HostEvent::FoldersChanged(change) => {
                self.on_folders_changed(change)?;
                Ok(Outcome::Unchanged)
            }
            HostEvent::ConfigurationChanged(scope) => self.on_configuration_changed(scope).await,
            HostEvent::FocusGained => self.on_focus_gained().await,
        }
    }

    /// Route host event to its handler, then activate again right away if
    /// the host had to reload.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError`] if the handler or the activation fails.
    pub async fn dispatch(&mut self, event: HostEvent) -> Result<Outcome> {
        let outcome = self.handle(event).await?;
        if self.reload_pending {
            self.activate().await?;
        }

        Ok(outcome)
    }

    /// Record folders the user opened or closed by hand.
    ///
    /// Added folders that are neither managed nor placeholders join the
    /// unmanaged listing. Removed folders that are not managed leave it.
    /// Self-caused notifications are ignored.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError::Host`] if settings cannot be read or
    ///   written.
    pub fn on_folders_changed(&mut self, change: FolderChange) -> Result<()> {
        if self.state.observe_folder_change(Instant::now()) {
            debug!("ignore self-caused folder change");
            return Ok(());
        }

        let base_dir = self.host.base_dir().to_path_buf();
        let base = NormalizedPath::from_path(&base_dir);
        let managed = &self.state.managed;
        let added = change
            .added
            .iter()
            .filter(|folder| !folder.is_placeholder() && !managed.contains(&folder.path))
            .collect::<Vec<_>>();
        let removed = change
            .removed
            .iter()
            .filter(|folder| !managed.contains(&folder.path))
            .map(|folder| &folder.path)
            .collect::<BTreeSet<_>>();

        // INVARIANT: Entries compare by the folder they resolve to, not by spelling.
        let before = self.host.settings()?.projects.unmanaged.list;
        let mut unmanaged = before.clone();
        for folder in added {
            let listed = unmanaged
                .iter()
                .any(|entry| resolve_entry(&base_dir, entry) == folder.path);
            if !listed {
                unmanaged.push(path::relative_to(&base, &folder.path));
            }
        }
        unmanaged.retain(|entry| !removed.contains(&resolve_entry(&base_dir, entry)));

        if unmanaged != before {
            info!("record {} unmanaged folders", unmanaged.len());
            self.host.update_unmanaged(unmanaged)?;
        }

        Ok(())
    }

    /// Reconcile after persisted settings changed.
    ///
    /// Only changes to settings that feed the model trigger a pass.
    /// Afterwards, unmanaged entries that include patterns now cover are
    /// dropped from the unmanaged listing.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError`] if the pass fails.
    pub async fn on_configuration_changed(&mut self, scope: ConfigScope) -> Result<Outcome> {
        if !scope.model {
            debug!("configuration change does not affect the model");
            return Ok(Outcome::Unchanged);
        }

        let outcome = self.reconcile(false).await?;
        if outcome != Outcome::ReloadRequested {
            self.prune_unmanaged()?;
        }

        Ok(outcome)
    }

    /// Reconcile after host regained focus.
    ///
    /// # Errors
    ///
    /// - Return [`WorkspaceError`] if the pass fails.
    pub async fn on_focus_gained(&mut self) -> Result<Outcome> {
        self.reconcile(false).await
    }

    fn prune_unmanaged(&mut self) -> Result<()> {
        let base = self.host.base_dir().to_path_buf();
        let before = self.host.settings()?.projects.unmanaged.list;
        let mut unmanaged = before.clone();
        unmanaged.retain(|entry| !self.state.managed.contains(&resolve_entry(&base, entry)));

        if unmanaged != before {
            info!("{} unmanaged folders are now managed", before.len() - unmanaged.len());
            self.host.update_unmanaged(unmanaged)?;
        }

        Ok(())
    }
}

fn resolve_entry(base: &Path, entry: &str) -> NormalizedPath {
    NormalizedPath::from_path(path::clean(base.join(entry)))
}

/// Workspace reconciliation error types.
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Target model cannot be built.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Host cannot be read or written.
    #[error(transparent)]
    Host(#[from] HostError),

    /// Host rejected initial folder update.
    #[error("workspace rejected initial folder update")]
    UpdateRejected {
        #[source]
        source: HostError,
    },
}

/// Friendly result alias :3
pub type Result<T, E = WorkspaceError> = std::result::Result<T, E>;
