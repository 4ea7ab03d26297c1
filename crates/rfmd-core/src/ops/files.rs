//! Filesystem operations inside the jail
//!
//! Every client path goes through [`Session::resolve`] first, so nothing here
//! ever sees a path outside the virtual root.

use std::fs::{self, DirBuilder, OpenOptions};
use std::io;
use std::os::unix::fs::{
    symlink, DirBuilderExt, DirEntryExt, MetadataExt, OpenOptionsExt, PermissionsExt,
};
use std::path::Path;

use tracing::{debug, info};

use super::mode::ModeChange;
use crate::ipc::{DirEntry, FileKind};
use crate::jail::Session;
use crate::{Error, Result};

const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o644;

pub fn make_dir(session: &Session, path: &str) -> Result<()> {
    let real = session.resolve(path)?;
    DirBuilder::new().mode(DIR_MODE).create(&real)?;
    info!("directory created: {}", session.display_path(&real));
    Ok(())
}

/// Create an empty file; fails when the name is already taken
pub fn touch(session: &Session, path: &str) -> Result<()> {
    let real = session.resolve(path)?;
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(FILE_MODE)
        .open(&real)?;
    info!("file created: {}", session.display_path(&real));
    Ok(())
}

pub fn remove_dir(session: &Session, path: &str) -> Result<()> {
    let real = session.resolve(path)?;
    fs::remove_dir(&real)?;
    info!("directory removed: {}", session.display_path(&real));
    Ok(())
}

pub fn remove_file(session: &Session, path: &str) -> Result<()> {
    let real = session.resolve(path)?;
    fs::remove_file(&real)?;
    info!("file removed: {}", session.display_path(&real));
    Ok(())
}

pub fn rename(session: &Session, from: &str, to: &str) -> Result<()> {
    let from = session.resolve(from)?;
    let to = session.resolve(to)?;
    fs::rename(&from, &to)?;
    info!(
        "file moved: {} -> {}",
        session.display_path(&from),
        session.display_path(&to)
    );
    Ok(())
}

/// Create `link` pointing at `target`. Symbolic links store the jailed real
/// path of the target.
pub fn link(session: &Session, target: &str, link: &str, symbolic: bool) -> Result<()> {
    let target = session.resolve(target)?;
    let link = session.resolve(link)?;
    if symbolic {
        symlink(&target, &link)?;
        info!("symbolic link created: {}", session.display_path(&link));
    } else {
        fs::hard_link(&target, &link)?;
        info!("hard link created: {}", session.display_path(&link));
    }
    Ok(())
}

pub fn change_mode(session: &Session, mode: &str, path: &str) -> Result<()> {
    let change = ModeChange::parse(mode)?;
    let real = session.resolve(path)?;

    let current = fs::metadata(&real)?.mode();
    let new_mode = change.apply(current);
    fs::set_permissions(&real, fs::Permissions::from_mode(new_mode))?;
    info!(
        "mode changed: {} {:o} -> {:o}",
        session.display_path(&real),
        current & 0o7777,
        new_mode & 0o7777
    );
    Ok(())
}

/// Copy a file, or a directory tree when `recursive` is set.
///
/// The copy is not atomic: the first failure stops it and whatever was
/// already written stays in place.
pub fn copy(session: &Session, from: &str, to: &str, recursive: bool) -> Result<()> {
    let src = session.resolve(from)?;
    let dst = session.resolve(to)?;

    if src == dst {
        return Err(Error::Other(format!(
            "{} and {} are the same file",
            from, to
        )));
    }
    if recursive && dst.starts_with(&src) && src.is_dir() {
        return Err(Error::Other(format!(
            "cannot copy {} into itself",
            session.display_path(&src)
        )));
    }

    copy_path(session, &src, &dst, recursive)?;
    info!(
        "copied: {} -> {}",
        session.display_path(&src),
        session.display_path(&dst)
    );
    Ok(())
}

fn copy_path(session: &Session, src: &Path, dst: &Path, recursive: bool) -> Result<()> {
    let metadata = fs::metadata(src)?;

    if !metadata.is_dir() {
        let mut reader = fs::File::open(src)?;
        let mut writer = fs::File::create(dst)?;
        let bytes = io::copy(&mut reader, &mut writer)?;
        debug!("copied {} bytes to {}", bytes, session.display_path(dst));
        return Ok(());
    }

    if !recursive {
        return Err(Error::IsDirectory(session.display_path(src)));
    }

    match DirBuilder::new().mode(metadata.mode() & 0o7777).create(dst) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dst.is_dir() => {}
        Err(e) => return Err(e.into()),
    }

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        copy_path(session, &src.join(&name), &dst.join(&name), true)?;
    }
    Ok(())
}

/// Read a whole file; returns its client-visible path and contents
pub fn read_file(session: &Session, path: &str) -> Result<(String, Vec<u8>)> {
    let real = session.resolve(path)?;
    let content = fs::read(&real)?;
    Ok((session.display_path(&real), content))
}

/// Immediate entries of the working directory, in iteration order
pub fn list_dir(session: &Session) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(session.cwd())? {
        let entry = entry?;
        let path = entry.path();

        // The entry may vanish between readdir and lstat.
        let metadata = match fs::symlink_metadata(&path) {
            Ok(m) => m,
            Err(e) => {
                debug!("skipping {}: {}", path.display(), e);
                continue;
            }
        };

        let kind = FileKind::from(metadata.file_type());
        let link_target = if kind == FileKind::Link {
            fs::read_link(&path)
                .ok()
                .map(|target| session.display_path(&target))
        } else {
            None
        };

        entries.push(DirEntry {
            inode: entry.ino(),
            kind,
            mode: metadata.mode() & 0o777,
            uid: metadata.uid(),
            gid: metadata.gid(),
            atime: metadata.atime(),
            mtime: metadata.mtime(),
            ctime: metadata.ctime(),
            nlink: metadata.nlink(),
            size: metadata.size(),
            name: entry.file_name().to_string_lossy().into_owned(),
            link_target,
        });
    }

    Ok(entries)
}
