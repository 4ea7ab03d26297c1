//! Wire protocol for daemon-client communication
//!
//! Requests are single text lines (`<command> [args...]\n`). Responses are
//! frames told apart by their leading content; with the envelope enabled each
//! frame body is preceded by a `OK <len>\n` or `ERR <len>\n` status line.

use std::fs;
use std::os::unix::fs::FileTypeExt;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const FILE_CONTENT_PREFIX: &str = "FILE_CONTENT_START:";
pub const PROCESS_LIST_HEADER: &str = "PROCESS_LIST_START\n";
pub const ERROR_SENTINEL: &str = "error";

pub const STATUS_OK: &str = "OK";
pub const STATUS_ERR: &str = "ERR";

// Command names
pub mod commands {
    pub const HELP: &str = "help";
    pub const MKDIR: &str = "mkdir";
    pub const TOUCH: &str = "touch";
    pub const RMDIR: &str = "rmdir";
    pub const CD: &str = "cd";
    pub const MV: &str = "mv";
    pub const LS: &str = "ls";
    pub const LN: &str = "ln";
    pub const RM: &str = "rm";
    pub const CHMOD: &str = "chmod";
    pub const CAT: &str = "cat";
    pub const CP: &str = "cp";
    pub const PS: &str = "ps";
    pub const KILL: &str = "kill";
    pub const EXEC: &str = "exec";
    pub const QUIT: &str = "quit";

    /// Whether the daemon answers `line` with a frame.
    ///
    /// `cd` always echoes; `ls`, `ps` and `cat` only answer when their
    /// arguments are well formed.
    pub fn expects_frame(line: &str) -> bool {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            [CD, ..] => true,
            [LS] | [PS] => true,
            [CAT, _] => true,
            _ => false,
        }
    }
}

/// File type as reported in directory listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Block,
    Char,
    Dir,
    Fifo,
    Link,
    Regular,
    Socket,
    Unknown,
}

impl FileKind {
    pub fn type_char(self) -> char {
        match self {
            FileKind::Block => 'b',
            FileKind::Char => 'c',
            FileKind::Dir => 'd',
            FileKind::Link => 'l',
            FileKind::Regular => '-',
            FileKind::Fifo | FileKind::Socket | FileKind::Unknown => ' ',
        }
    }

    pub fn type_name(self) -> &'static str {
        match self {
            FileKind::Block => "BLK",
            FileKind::Char => "CHR",
            FileKind::Dir => "DIR",
            FileKind::Fifo => "FIFO",
            FileKind::Link => "LNK",
            FileKind::Regular => "REG",
            FileKind::Socket => "SOCK",
            FileKind::Unknown => "UNKN",
        }
    }

    pub fn from_type_name(name: &str) -> Self {
        match name {
            "BLK" => FileKind::Block,
            "CHR" => FileKind::Char,
            "DIR" => FileKind::Dir,
            "FIFO" => FileKind::Fifo,
            "LNK" => FileKind::Link,
            "REG" => FileKind::Regular,
            "SOCK" => FileKind::Socket,
            _ => FileKind::Unknown,
        }
    }
}

impl From<fs::FileType> for FileKind {
    fn from(ft: fs::FileType) -> Self {
        if ft.is_symlink() {
            FileKind::Link
        } else if ft.is_dir() {
            FileKind::Dir
        } else if ft.is_file() {
            FileKind::Regular
        } else if ft.is_block_device() {
            FileKind::Block
        } else if ft.is_char_device() {
            FileKind::Char
        } else if ft.is_fifo() {
            FileKind::Fifo
        } else if ft.is_socket() {
            FileKind::Socket
        } else {
            FileKind::Unknown
        }
    }
}

/// Render the nine rwx characters for the low permission bits of `mode`
pub fn permission_string(mode: u32) -> String {
    const FLAGS: [(u32, char); 9] = [
        (0o400, 'r'),
        (0o200, 'w'),
        (0o100, 'x'),
        (0o040, 'r'),
        (0o020, 'w'),
        (0o010, 'x'),
        (0o004, 'r'),
        (0o002, 'w'),
        (0o001, 'x'),
    ];
    FLAGS
        .iter()
        .map(|&(bit, c)| if mode & bit != 0 { c } else { '-' })
        .collect()
}

/// Inverse of [`permission_string`]
pub fn parse_permission_string(perm: &str) -> Result<u32> {
    if perm.len() != 9 {
        return Err(Error::Other(format!("bad permission string: {:?}", perm)));
    }
    let mut mode = 0;
    for (i, c) in perm.chars().enumerate() {
        let bit = 1 << (8 - i);
        match (c, i % 3) {
            ('-', _) => {}
            ('r', 0) | ('w', 1) | ('x', 2) => mode |= bit,
            _ => return Err(Error::Other(format!("bad permission string: {:?}", perm))),
        }
    }
    Ok(mode)
}

/// One record of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirEntry {
    pub inode: u64,
    pub kind: FileKind,
    /// Permission bits (0o777 mask)
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub nlink: u64,
    pub size: u64,
    pub name: String,
    /// Client-visible symlink target
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
}

impl DirEntry {
    pub fn permissions(&self) -> String {
        permission_string(self.mode)
    }

    /// Listing line, newline included
    pub fn to_line(&self) -> String {
        let link = match &self.link_target {
            Some(target) => format!(" -> {}", target),
            None => String::new(),
        };
        format!(
            "{} {}{} {:>4} {} {} {} {} {} {} {} {}{}\n",
            self.inode,
            self.kind.type_char(),
            self.permissions(),
            self.kind.type_name(),
            self.uid,
            self.gid,
            self.atime,
            self.mtime,
            self.ctime,
            self.nlink,
            self.size,
            self.name,
            link
        )
    }

    /// Parse one listing line (without its newline)
    pub fn parse_line(line: &str) -> Result<Self> {
        let bad = || Error::Other(format!("malformed listing line: {:?}", line));

        let mut rest = line;
        let inode = next_field(&mut rest).ok_or_else(bad)?;

        // The type char may be a space, so the mode column is taken by width.
        rest = rest.strip_prefix(' ').ok_or_else(bad)?;
        let type_and_perm = rest.get(..10).ok_or_else(bad)?;
        rest = &rest[10..];
        let mode = parse_permission_string(type_and_perm.get(1..).ok_or_else(bad)?)?;

        let mut numbers = [0i64; 7];
        let kind = FileKind::from_type_name(next_field(&mut rest).ok_or_else(bad)?);
        for slot in numbers.iter_mut() {
            *slot = next_field(&mut rest)
                .and_then(|f| f.parse().ok())
                .ok_or_else(bad)?;
        }
        let [uid, gid, atime, mtime, ctime, nlink, size] = numbers;

        let name_part = rest.strip_prefix(' ').ok_or_else(bad)?;
        let (name, link_target) = match (kind, name_part.split_once(" -> ")) {
            (FileKind::Link, Some((name, target))) => (name, Some(target.to_string())),
            _ => (name_part, None),
        };

        Ok(Self {
            inode: inode.parse().map_err(|_| bad())?,
            kind,
            mode,
            uid: uid as u32,
            gid: gid as u32,
            atime,
            mtime,
            ctime,
            nlink: nlink as u64,
            size: size as u64,
            name: name.to_string(),
            link_target,
        })
    }
}

/// One row of the process table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: i32,
    pub ppid: i32,
    pub command: String,
}

impl ProcessEntry {
    pub fn to_line(&self) -> String {
        format!("{:>5} {:>5} {}\n", self.pid, self.ppid, self.command)
    }

    pub fn parse_line(line: &str) -> Result<Self> {
        let bad = || Error::Other(format!("malformed process line: {:?}", line));
        let mut rest = line;
        let pid = next_field(&mut rest).and_then(|f| f.parse().ok()).ok_or_else(bad)?;
        let ppid = next_field(&mut rest).and_then(|f| f.parse().ok()).ok_or_else(bad)?;
        Ok(Self {
            pid,
            ppid,
            command: rest.trim_start_matches(' ').to_string(),
        })
    }
}

// Split off the next space-delimited field, skipping leading padding.
fn next_field<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let trimmed = rest.trim_start_matches(' ');
    if trimmed.is_empty() {
        return None;
    }
    let end = trimmed.find(' ').unwrap_or(trimmed.len());
    let (field, tail) = trimmed.split_at(end);
    *rest = tail;
    Some(field)
}

/// Status carried by the envelope header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Ok,
    Err,
}

impl FrameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            FrameStatus::Ok => STATUS_OK,
            FrameStatus::Err => STATUS_ERR,
        }
    }

    /// Parse an envelope header line into status and body length
    pub fn parse_header(line: &str) -> Result<(Self, usize)> {
        let bad = || Error::Other(format!("malformed frame header: {:?}", line.trim_end()));
        let (status, len) = line.trim_end().split_once(' ').ok_or_else(bad)?;
        let status = match status {
            STATUS_OK => FrameStatus::Ok,
            STATUS_ERR => FrameStatus::Err,
            _ => return Err(bad()),
        };
        let len = len.parse().map_err(|_| bad())?;
        Ok((status, len))
    }
}

/// One response unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Jail-relative current directory
    Cwd(String),
    FileContent { path: String, content: Vec<u8> },
    ProcessList(Vec<ProcessEntry>),
    Listing(Vec<DirEntry>),
    Error,
}

impl Frame {
    pub fn status(&self) -> FrameStatus {
        match self {
            Frame::Error => FrameStatus::Err,
            _ => FrameStatus::Ok,
        }
    }

    /// Classify a frame body by its leading content
    pub fn decode(status: FrameStatus, body: &[u8]) -> Result<Self> {
        if status == FrameStatus::Err {
            return Ok(Frame::Error);
        }

        if let Some(rest) = body.strip_prefix(FILE_CONTENT_PREFIX.as_bytes()) {
            let newline = rest
                .iter()
                .position(|&b| b == b'\n')
                .ok_or_else(|| Error::Other("file content frame without header line".into()))?;
            return Ok(Frame::FileContent {
                path: String::from_utf8_lossy(&rest[..newline]).into_owned(),
                content: rest[newline + 1..].to_vec(),
            });
        }

        let text = String::from_utf8_lossy(body);
        if let Some(rest) = text.strip_prefix(PROCESS_LIST_HEADER) {
            let processes = rest
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(ProcessEntry::parse_line)
                .collect::<Result<Vec<_>>>()?;
            return Ok(Frame::ProcessList(processes));
        }
        if text.starts_with('/') {
            return Ok(Frame::Cwd(text.into_owned()));
        }
        if text == ERROR_SENTINEL {
            return Ok(Frame::Error);
        }

        let entries = text
            .lines()
            .filter(|l| !l.is_empty())
            .map(DirEntry::parse_line)
            .collect::<Result<Vec<_>>>()?;
        Ok(Frame::Listing(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entry() -> DirEntry {
        DirEntry {
            inode: 131,
            kind: FileKind::Regular,
            mode: 0o644,
            uid: 1000,
            gid: 100,
            atime: 1700000000,
            mtime: 1700000001,
            ctime: 1700000002,
            nlink: 1,
            size: 0,
            name: "a.txt".to_string(),
            link_target: None,
        }
    }

    #[test]
    fn test_permission_string() {
        assert_eq!(permission_string(0o755), "rwxr-xr-x");
        assert_eq!(permission_string(0o100644), "rw-r--r--");
        assert_eq!(permission_string(0), "---------");
        for mode in [0o000, 0o123, 0o777, 0o4755] {
            assert_eq!(permission_string(mode).len(), 9);
        }
        assert_eq!(parse_permission_string("rw-r-x--x").unwrap(), 0o651);
        assert!(parse_permission_string("wr-------").is_err());
    }

    #[test]
    fn test_listing_line_format() {
        let line = sample_entry().to_line();
        assert_eq!(
            line,
            "131 -rw-r--r--  REG 1000 100 1700000000 1700000001 1700000002 1 0 a.txt\n"
        );
    }

    #[test]
    fn test_listing_line_parse() {
        let mut link = sample_entry();
        link.kind = FileKind::Link;
        link.mode = 0o777;
        link.name = "my link".to_string();
        link.link_target = Some("/docs/a.txt".to_string());
        let parsed = DirEntry::parse_line(link.to_line().trim_end_matches('\n')).unwrap();
        assert_eq!(parsed, link);

        let mut fifo = sample_entry();
        fifo.kind = FileKind::Fifo;
        let parsed = DirEntry::parse_line(fifo.to_line().trim_end_matches('\n')).unwrap();
        assert_eq!(parsed.kind, FileKind::Fifo);
        assert_eq!(parsed.mode, 0o644);
    }

    #[test]
    fn test_process_line() {
        let entry = ProcessEntry {
            pid: 42,
            ppid: 1,
            command: "Web Content".to_string(),
        };
        assert_eq!(entry.to_line(), "   42     1 Web Content\n");
        assert_eq!(ProcessEntry::parse_line("   42     1 Web Content").unwrap(), entry);
    }

    #[test]
    fn test_decode_shapes() {
        assert_eq!(
            Frame::decode(FrameStatus::Ok, b"/sub/dir").unwrap(),
            Frame::Cwd("/sub/dir".to_string())
        );
        assert_eq!(
            Frame::decode(FrameStatus::Ok, b"FILE_CONTENT_START:/a.txt\nerror in line 1").unwrap(),
            Frame::FileContent {
                path: "/a.txt".to_string(),
                content: b"error in line 1".to_vec(),
            }
        );
        assert_eq!(Frame::decode(FrameStatus::Err, b"error").unwrap(), Frame::Error);
        assert_eq!(
            Frame::decode(FrameStatus::Ok, b"").unwrap(),
            Frame::Listing(Vec::new())
        );
        match Frame::decode(FrameStatus::Ok, b"PROCESS_LIST_START\n    1     0 init\n").unwrap() {
            Frame::ProcessList(list) => assert_eq!(list[0].command, "init"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_parse_header() {
        assert_eq!(FrameStatus::parse_header("OK 12\n").unwrap(), (FrameStatus::Ok, 12));
        assert_eq!(FrameStatus::parse_header("ERR 5").unwrap(), (FrameStatus::Err, 5));
        assert!(FrameStatus::parse_header("MAYBE 5").is_err());
        assert!(FrameStatus::parse_header("OK five").is_err());
    }

    #[test]
    fn test_expects_frame() {
        assert!(commands::expects_frame("cd"));
        assert!(commands::expects_frame("cd a b"));
        assert!(commands::expects_frame("  ls "));
        assert!(commands::expects_frame("cat a.txt"));
        assert!(commands::expects_frame("ps"));
        assert!(!commands::expects_frame("ls -l"));
        assert!(!commands::expects_frame("cat"));
        assert!(!commands::expects_frame("mkdir a"));
        assert!(!commands::expects_frame("exec /bin/true"));
        assert!(!commands::expects_frame(""));
    }
}
