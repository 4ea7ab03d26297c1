//! Path confinement
//!
//! Every client-supplied path is interpreted relative to a [`VirtualRoot`]
//! and normalized by the [`PathResolver`] before it reaches the filesystem.
//! Confinement is lexical: `..` can never climb above the root, because the
//! resolver works on path segments instead of asking the OS.

mod resolver;
mod session;

use std::fs::DirBuilder;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use tracing::info;

pub use resolver::PathResolver;
pub use session::Session;

use crate::{Error, Result};

/// The real directory presented to clients as `/`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualRoot {
    path: PathBuf,
}

impl VirtualRoot {
    /// Open the jail directory, creating it (mode 0755) when absent
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_absolute() {
            return Err(Error::Config(format!(
                "jail root must be an absolute path: {}",
                path.display()
            )));
        }

        if !path.exists() {
            DirBuilder::new().recursive(true).mode(0o755).create(path)?;
            info!("Created jail root: {}", path.display());
        }

        let path = path.canonicalize()?;
        if !path.is_dir() {
            return Err(Error::Config(format!(
                "jail root is not a directory: {}",
                path.display()
            )));
        }

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.path)
    }

    /// Client-visible form of a real path: `/` for the root itself,
    /// `/a/b` below it. Paths outside the jail are returned unchanged.
    pub fn display_path(&self, real: &Path) -> String {
        match real.strip_prefix(&self.path) {
            Ok(rel) if rel.as_os_str().is_empty() => "/".to_string(),
            Ok(rel) => format!("/{}", rel.to_string_lossy()),
            Err(_) => real.to_string_lossy().into_owned(),
        }
    }
}
