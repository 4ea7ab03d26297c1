use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use nix::errno::Errno;
use nix::unistd::{access, AccessFlags};
use uuid::Uuid;

use super::{PathResolver, VirtualRoot};
use crate::Result;

/// Per-connection state: the jail and the current working directory
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    root: VirtualRoot,
    resolver: PathResolver,
    cwd: PathBuf,
    connected_at: DateTime<Utc>,
}

impl Session {
    pub fn new(root: VirtualRoot, resolver: PathResolver) -> Self {
        let cwd = root.path().to_path_buf();
        Self {
            id: Uuid::new_v4(),
            root,
            resolver,
            cwd,
            connected_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn root(&self) -> &VirtualRoot {
        &self.root
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn connected_at(&self) -> DateTime<Utc> {
        self.connected_at
    }

    /// Resolve a client path to its jailed real path
    pub fn resolve(&self, input: &str) -> Result<PathBuf> {
        self.resolver.resolve(input, &self.cwd, &self.root)
    }

    /// Client-visible form of a real path
    pub fn display_path(&self, real: &Path) -> String {
        self.root.display_path(real)
    }

    pub fn display_cwd(&self) -> String {
        self.root.display_path(&self.cwd)
    }

    /// Move the working directory; it is left untouched on any failure.
    pub fn change_dir(&mut self, input: &str) -> Result<()> {
        let target = self.resolve(input)?;

        let metadata = std::fs::metadata(&target)?;
        if !metadata.is_dir() {
            return Err(Errno::ENOTDIR.into());
        }
        access(&target, AccessFlags::X_OK)?;

        self.cwd = target;
        Ok(())
    }
}
