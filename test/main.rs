// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT


use curator::{
    config::Manifest,
    host::ManifestHost,
    path::{self, NormalizedPath},
    vcs::LocatorChain,
    workspace::Reconciler,
};

use anyhow::Result;
use git2::{IndexEntry, IndexTime, Repository, RepositoryInitOptions};
use std::{
    fs::{create_dir_all, read_to_string, write},
    path::{Path, PathBuf},
};

pub(crate) type Session = Reconciler<ManifestHost, LocatorChain>;

/// Directory tree with a workspace manifest at its root.
pub(crate) struct WorkspaceFixture {
    base: PathBuf,
    placeholder_root: PathBuf,
}

impl WorkspaceFixture {
    pub(crate) fn new(folders: &[&str], manifest: impl AsRef<str>) -> Result<Self> {
        let cwd = std::env::current_dir()?;
        let base = cwd.join("base");
        create_dir_all(&base)?;
        for folder in folders {
            create_dir_all(base.join(folder))?;
        }

        let fixture = Self {
            base,
            placeholder_root: cwd.join("tmp").join("closed-projects"),
        };
        fixture.write_manifest(manifest)?;

        Ok(fixture)
    }

    pub(crate) fn manifest_path(&self) -> PathBuf {
        self.base.join("workspace.toml")
    }

    pub(crate) fn write_manifest(&self, manifest: impl AsRef<str>) -> Result<()> {
        write(self.manifest_path(), manifest.as_ref())?;
        Ok(())
    }

    pub(crate) fn manifest(&self) -> Result<Manifest> {
        Ok(read_to_string(self.manifest_path())?.parse()?)
    }

    pub(crate) fn session(&self) -> Result<Session> {
        let host = ManifestHost::open(self.manifest_path())?;
        let locator = LocatorChain::from_settings(&host.manifest().settings.vcs);
        Ok(Reconciler::new(host, locator).with_placeholder_root(&self.placeholder_root))
    }

    pub(crate) fn path(&self, folder: &str) -> NormalizedPath {
        NormalizedPath::from_path(path::clean(self.base.join(folder)))
    }

    pub(crate) fn placeholder(&self, folder: &str) -> NormalizedPath {
        NormalizedPath::from_path(path::placeholder_for(&self.placeholder_root, &self.path(folder)))
    }

    pub(crate) fn placeholder_root(&self) -> &Path {
        self.placeholder_root.as_path()
    }

    /// Names and paths of folders listed in the manifest, in listed order.
    pub(crate) fn listed(&self) -> Result<Vec<(String, String)>> {
        Ok(self
            .manifest()?
            .folders
            .into_iter()
            .map(|entry| (entry.name.unwrap_or_default(), entry.path))
            .collect())
    }
}

/// Git repository inside a workspace fixture.
pub(crate) struct RepoFixture {
    repo: Repository,
}

impl RepoFixture {
    pub(crate) fn new(path: impl AsRef<Path>, branch: &str) -> Result<Self> {
        let mut opts = RepositoryInitOptions::new();
        opts.initial_head(branch);
        let repo = Repository::init_opts(path.as_ref(), &opts)?;

        // INVARIANT: Always provide valid name and email.
        //   - Git will complain if this is not set in CI/CD environments.
        let mut config = repo.config()?;
        config.set_str("user.name", "John Doe")?;
        config.set_str("user.email", "john@doe.com")?;

        Ok(Self { repo })
    }

    pub(crate) fn stage_and_commit(
        &self,
        filename: impl AsRef<Path>,
        contents: impl AsRef<str>,
    ) -> Result<()> {
        let entry = IndexEntry {
            ctime: IndexTime::new(0, 0),
            mtime: IndexTime::new(0, 0),
            dev: 0,
            ino: 0,
            mode: 0o100644,
            uid: 0,
            gid: 0,
            file_size: contents.as_ref().len() as u32,
            id: self.repo.blob(contents.as_ref().as_bytes())?,
            flags: 0,
            flags_extended: 0,
            path: filename.as_ref().to_string_lossy().as_bytes().to_vec(),
        };

        // INVARIANT: Always use new tree produced by index after staging new entry.
        let mut index = self.repo.index()?;
        index.add_frombuffer(&entry, contents.as_ref().as_bytes())?;
        let tree = self.repo.find_tree(index.write_tree()?)?;

        let signature = self.repo.signature()?;
        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            format!("chore: add {:?}", filename.as_ref()).as_ref(),
            &tree,
            &[],
        )?;

        Ok(())
    }
}
