use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

use super::VirtualRoot;
use crate::config::LimitsConfig;
use crate::{Error, Result};

/// Normalizes client paths into absolute real paths under a [`VirtualRoot`]
#[derive(Debug, Clone, Copy)]
pub struct PathResolver {
    max_len: usize,
    max_depth: usize,
}

impl Default for PathResolver {
    fn default() -> Self {
        Self::from_limits(&LimitsConfig::default())
    }
}

impl PathResolver {
    pub fn new(max_len: usize, max_depth: usize) -> Self {
        Self { max_len, max_depth }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.max_path_len, limits.max_path_depth)
    }

    /// Resolve `input` against `cwd` inside `root`.
    ///
    /// Absolute inputs start from the root, relative ones from `cwd`.
    /// `.` and empty segments are dropped and `..` pops one segment, doing
    /// nothing at the root. The target is not required to exist.
    pub fn resolve(&self, input: &str, cwd: &Path, root: &VirtualRoot) -> Result<PathBuf> {
        let mut stack: Vec<&OsStr> = Vec::new();

        if input.starts_with('/') {
            self.check_len(input.len())?;
        } else {
            // A cwd outside the jail cannot happen through Session; fall back to the root.
            let rel = cwd.strip_prefix(root.path()).unwrap_or(Path::new(""));
            self.check_len(rel.as_os_str().len() + 1 + input.len())?;
            for component in rel.components() {
                if let Component::Normal(segment) = component {
                    self.push(&mut stack, segment)?;
                }
            }
        }

        for segment in input.split('/') {
            match segment {
                "" | "." => {}
                ".." => {
                    stack.pop();
                }
                name => self.push(&mut stack, OsStr::new(name))?,
            }
        }

        let mut resolved = root.path().to_path_buf();
        for segment in stack {
            resolved.push(segment);
        }
        Ok(resolved)
    }

    fn check_len(&self, len: usize) -> Result<()> {
        if len > self.max_len {
            return Err(Error::PathTooLong {
                len,
                max: self.max_len,
            });
        }
        Ok(())
    }

    fn push<'a>(&self, stack: &mut Vec<&'a OsStr>, segment: &'a OsStr) -> Result<()> {
        if stack.len() >= self.max_depth {
            return Err(Error::PathTooDeep {
                max: self.max_depth,
            });
        }
        stack.push(segment);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jail() -> (tempfile::TempDir, VirtualRoot) {
        let dir = tempfile::tempdir().unwrap();
        let root = VirtualRoot::create(dir.path()).unwrap();
        (dir, root)
    }

    #[test]
    fn test_absolute_and_relative() {
        let (_dir, root) = jail();
        let resolver = PathResolver::default();
        let cwd = root.path().join("home");

        assert_eq!(
            resolver.resolve("/etc/passwd", &cwd, &root).unwrap(),
            root.path().join("etc").join("passwd")
        );
        assert_eq!(
            resolver.resolve("notes.txt", &cwd, &root).unwrap(),
            root.path().join("home").join("notes.txt")
        );
        assert_eq!(
            resolver.resolve("./a//b/./c", &cwd, &root).unwrap(),
            root.path().join("home").join("a").join("b").join("c")
        );
    }

    #[test]
    fn test_dotdot_at_root_is_idempotent() {
        let (_dir, root) = jail();
        let resolver = PathResolver::default();

        for input in ["..", "../..", "/../../..", "../../../../etc"] {
            let once = resolver.resolve(input, root.path(), &root).unwrap();
            assert!(once.starts_with(root.path()), "{} escaped", input);
        }
        assert_eq!(resolver.resolve("..", root.path(), &root).unwrap(), root.path());
        assert_eq!(
            resolver.resolve("../../../../etc", root.path(), &root).unwrap(),
            root.path().join("etc")
        );
    }

    #[test]
    fn test_dotdot_pops_one_segment() {
        let (_dir, root) = jail();
        let resolver = PathResolver::default();
        let cwd = root.path().join("a").join("b");

        assert_eq!(resolver.resolve("..", &cwd, &root).unwrap(), root.path().join("a"));
        assert_eq!(resolver.resolve("../../..", &cwd, &root).unwrap(), root.path());
        assert_eq!(
            resolver.resolve("../c/../d", &cwd, &root).unwrap(),
            root.path().join("a").join("d")
        );
    }

    #[test]
    fn test_never_escapes_for_mixed_segments() {
        let (_dir, root) = jail();
        let resolver = PathResolver::default();
        let cwd = root.path().join("x");
        let parts = ["..", ".", "a", "", "..", "b", "..", ".."];

        // Every combination of three segments from the alphabet above.
        for first in parts {
            for second in parts {
                for third in parts {
                    let input = format!("{}/{}/{}", first, second, third);
                    let resolved = resolver.resolve(&input, &cwd, &root).unwrap();
                    assert!(root.contains(&resolved), "{} escaped to {:?}", input, resolved);

                    let absolute = format!("/{}", input);
                    let resolved = resolver.resolve(&absolute, &cwd, &root).unwrap();
                    assert!(root.contains(&resolved), "{} escaped to {:?}", absolute, resolved);
                }
            }
        }
    }

    #[test]
    fn test_length_limit() {
        let (_dir, root) = jail();
        let resolver = PathResolver::new(16, 256);

        assert!(resolver.resolve("/short", root.path(), &root).is_ok());
        let err = resolver
            .resolve("/this/path/is/too/long", root.path(), &root)
            .unwrap_err();
        assert!(matches!(err, Error::PathTooLong { max: 16, .. }));

        // The cwd counts toward the effective length of relative inputs.
        let cwd = root.path().join("0123456789");
        assert!(resolver.resolve("abcdefgh", &cwd, &root).is_err());
    }

    #[test]
    fn test_depth_limit() {
        let (_dir, root) = jail();
        let resolver = PathResolver::new(4096, 3);

        assert!(resolver.resolve("/a/b/c", root.path(), &root).is_ok());
        assert!(resolver.resolve("/a/b/c/../d", root.path(), &root).is_ok());
        let err = resolver.resolve("/a/b/c/d", root.path(), &root).unwrap_err();
        assert!(matches!(err, Error::PathTooDeep { max: 3 }));
    }
}
