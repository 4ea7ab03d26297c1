//! Process table access, signaling and program execution
//!
//! These operate on the host, not the jail: `ps` and `kill` see every
//! process the daemon's user can see. Only `exec` resolves its program
//! through the jail.

use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Command;

use nix::sys::signal::{kill, Signal};
use nix::unistd::{access, AccessFlags, Pid};
use tracing::{debug, info, warn};

use crate::ipc::ProcessEntry;
use crate::jail::Session;
use crate::{Error, Result};

/// Source of the running-process list
pub trait ProcessTable: Send + Sync {
    fn processes(&self) -> Result<Vec<ProcessEntry>>;
}

/// Linux `/proc` reader
#[derive(Debug, Clone)]
pub struct ProcFs {
    mount: PathBuf,
}

impl Default for ProcFs {
    fn default() -> Self {
        Self::new("/proc")
    }
}

impl ProcFs {
    pub fn new(mount: impl Into<PathBuf>) -> Self {
        Self {
            mount: mount.into(),
        }
    }

    fn read_entry(&self, pid: i32) -> Option<ProcessEntry> {
        let stat = fs::read_to_string(self.mount.join(pid.to_string()).join("stat")).ok()?;
        parse_stat(pid, &stat)
    }
}

impl ProcessTable for ProcFs {
    fn processes(&self) -> Result<Vec<ProcessEntry>> {
        let mut processes = Vec::new();

        for entry in fs::read_dir(&self.mount)? {
            let entry = entry?;
            let pid = match entry.file_name().to_str().and_then(|n| n.parse::<i32>().ok()) {
                Some(pid) => pid,
                None => continue,
            };
            if !entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                continue;
            }

            match self.read_entry(pid) {
                Some(process) => processes.push(process),
                // Exited between readdir and read.
                None => debug!("process {} vanished during scan", pid),
            }
        }

        Ok(processes)
    }
}

/// Parse `<pid> (<comm>) <state> <ppid> ...`; comm may hold spaces and parens.
fn parse_stat(pid: i32, stat: &str) -> Option<ProcessEntry> {
    let open = stat.find('(')?;
    let close = stat.rfind(')')?;
    if close < open {
        return None;
    }
    let command = stat[open + 1..close].to_string();
    let mut fields = stat[close + 1..].split_whitespace();
    let _state = fields.next()?;
    let ppid = fields.next()?.parse().ok()?;
    Some(ProcessEntry { pid, ppid, command })
}

/// Parse a pid argument; zero and negative values would address process groups.
pub fn parse_pid(arg: &str) -> Result<i32> {
    match arg.parse::<i32>() {
        Ok(pid) if pid > 0 => Ok(pid),
        _ => Err(Error::syntax(format!("invalid pid: {}", arg))),
    }
}

/// Send SIGTERM to `pid`
pub fn terminate(pid: i32) -> Result<()> {
    kill(Pid::from_raw(pid), Signal::SIGTERM)?;
    info!("Signal sent to process {}", pid);
    Ok(())
}

/// Run a program from inside the jail and wait for it.
///
/// The exit status is only logged; a program that fails still counts as a
/// completed command.
pub fn execute(session: &Session, program: &str, args: &[&str]) -> Result<()> {
    let real = session.resolve(program)?;
    if access(&real, AccessFlags::X_OK).is_err() || !real.is_file() {
        return Err(Error::NotExecutable(session.display_path(&real)));
    }

    info!("Executing process: {}", session.display_path(&real));
    let status = Command::new(&real).args(args).status()?;

    if let Some(code) = status.code() {
        info!("Process exited with status: {}", code);
    } else if let Some(signal) = status.signal() {
        warn!("Process terminated by signal: {}", signal);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jail::{PathResolver, VirtualRoot};
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_parse_stat() {
        let entry = parse_stat(42, "42 (bash) S 1 42 42 0 -1").unwrap();
        assert_eq!(entry, ProcessEntry { pid: 42, ppid: 1, command: "bash".into() });

        let entry = parse_stat(7, "7 (Web Content (x)) R 3 7 7").unwrap();
        assert_eq!(entry.command, "Web Content (x)");
        assert_eq!(entry.ppid, 3);

        assert!(parse_stat(1, "garbage").is_none());
    }

    #[test]
    fn test_procfs_skips_non_pids_and_vanished() {
        let dir = tempfile::tempdir().unwrap();
        let proc_dir = dir.path();
        fs::create_dir(proc_dir.join("1")).unwrap();
        fs::write(proc_dir.join("1").join("stat"), "1 (init) S 0 1 1").unwrap();
        fs::create_dir(proc_dir.join("200")).unwrap();
        fs::write(proc_dir.join("200").join("stat"), "200 (sshd) S 1 200 200").unwrap();
        // No stat file: the process exited mid-scan.
        fs::create_dir(proc_dir.join("300")).unwrap();
        fs::create_dir(proc_dir.join("self")).unwrap();
        fs::write(proc_dir.join("uptime"), "1.0 1.0").unwrap();

        let mut processes = ProcFs::new(proc_dir).processes().unwrap();
        processes.sort_by_key(|p| p.pid);
        assert_eq!(
            processes,
            vec![
                ProcessEntry { pid: 1, ppid: 0, command: "init".into() },
                ProcessEntry { pid: 200, ppid: 1, command: "sshd".into() },
            ]
        );
    }

    #[test]
    fn test_live_procfs_contains_self() {
        if !std::path::Path::new("/proc/self/stat").exists() {
            return;
        }
        let me = std::process::id() as i32;
        let processes = ProcFs::default().processes().unwrap();
        assert!(processes.iter().any(|p| p.pid == me));
    }

    #[test]
    fn test_parse_pid() {
        assert_eq!(parse_pid("123").unwrap(), 123);
        for bad in ["0", "-1", "abc", ""] {
            assert!(parse_pid(bad).unwrap_err().is_syntax());
        }
    }

    #[test]
    fn test_terminate_child() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();
        terminate(child.id() as i32).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(Signal::SIGTERM as i32));
    }

    #[test]
    fn test_execute_requires_exec_bit() {
        let dir = tempfile::tempdir().unwrap();
        let root = VirtualRoot::create(dir.path()).unwrap();
        let session = Session::new(root, PathResolver::default());

        let script = session.root().path().join("run.sh");
        fs::write(&script, "#!/bin/sh\nexit 3\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o644)).unwrap();

        if !nix::unistd::geteuid().is_root() {
            assert!(matches!(
                execute(&session, "run.sh", &[]),
                Err(Error::NotExecutable(_))
            ));
        }

        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        // A non-zero exit is logged, not reported as a failure.
        execute(&session, "/run.sh", &["ignored"]).unwrap();
        assert!(execute(&session, "missing", &[]).is_err());
    }
}
