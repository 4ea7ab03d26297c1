use tracing::info;

use crate::ipc::commands;
use crate::ipc::Frame;
use crate::jail::Session;
use crate::ops::{files, process, ProcessTable};
use crate::{Error, Result};

/// Result of running one command: the return code source plus the frame, if
/// any, to send back. `cd` and `cat` carry a frame even when they fail.
#[derive(Debug)]
pub struct Outcome {
    pub result: Result<()>,
    pub frame: Option<Frame>,
}

impl Outcome {
    pub fn done() -> Self {
        Self {
            result: Ok(()),
            frame: None,
        }
    }

    pub fn reply(frame: Frame) -> Self {
        Self {
            result: Ok(()),
            frame: Some(frame),
        }
    }

    pub fn failed(error: Error) -> Self {
        Self {
            result: Err(error),
            frame: None,
        }
    }
}

impl From<Result<()>> for Outcome {
    fn from(result: Result<()>) -> Self {
        Self {
            result,
            frame: None,
        }
    }
}

/// The fixed command vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Help,
    Mkdir,
    Touch,
    Rmdir,
    Cd,
    Mv,
    Ls,
    Ln,
    Rm,
    Chmod,
    Cat,
    Cp,
    Ps,
    Kill,
    Quit,
    Exec,
}

impl CommandKind {
    /// Every command, in `help` order
    pub const ALL: [CommandKind; 16] = [
        CommandKind::Help,
        CommandKind::Mkdir,
        CommandKind::Touch,
        CommandKind::Rmdir,
        CommandKind::Cd,
        CommandKind::Mv,
        CommandKind::Ls,
        CommandKind::Ln,
        CommandKind::Rm,
        CommandKind::Chmod,
        CommandKind::Cat,
        CommandKind::Cp,
        CommandKind::Ps,
        CommandKind::Kill,
        CommandKind::Quit,
        CommandKind::Exec,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CommandKind::Help => commands::HELP,
            CommandKind::Mkdir => commands::MKDIR,
            CommandKind::Touch => commands::TOUCH,
            CommandKind::Rmdir => commands::RMDIR,
            CommandKind::Cd => commands::CD,
            CommandKind::Mv => commands::MV,
            CommandKind::Ls => commands::LS,
            CommandKind::Ln => commands::LN,
            CommandKind::Rm => commands::RM,
            CommandKind::Chmod => commands::CHMOD,
            CommandKind::Cat => commands::CAT,
            CommandKind::Cp => commands::CP,
            CommandKind::Ps => commands::PS,
            CommandKind::Kill => commands::KILL,
            CommandKind::Quit => commands::QUIT,
            CommandKind::Exec => commands::EXEC,
        }
    }

    pub fn summary(self) -> &'static str {
        match self {
            CommandKind::Help => "show usage, ex) help <command>",
            CommandKind::Mkdir => "create directory",
            CommandKind::Touch => "create file",
            CommandKind::Rmdir => "remove directory",
            CommandKind::Cd => "change current directory",
            CommandKind::Mv => "rename directory & file",
            CommandKind::Ls => "show directory contents",
            CommandKind::Ln => "create link",
            CommandKind::Rm => "remove file",
            CommandKind::Chmod => "change file mode",
            CommandKind::Cat => "show file contents",
            CommandKind::Cp => "copy file",
            CommandKind::Ps => "show process status",
            CommandKind::Kill => "terminate process",
            CommandKind::Quit => "close the session",
            CommandKind::Exec => "run a program from the jail",
        }
    }

    pub fn usage(self) -> Option<&'static str> {
        match self {
            CommandKind::Help => Some("help <command>"),
            CommandKind::Mkdir => Some("mkdir <directory>"),
            CommandKind::Touch => Some("touch <file>"),
            CommandKind::Rmdir => Some("rmdir <directory>"),
            CommandKind::Cd => Some("cd <directory>"),
            CommandKind::Mv => Some("mv <old_name> <new_name>"),
            CommandKind::Ln => Some("ln [-s] <target> <link_name>"),
            CommandKind::Rm => Some("rm <file>"),
            CommandKind::Chmod => Some("chmod <mode> <file>"),
            CommandKind::Cat => Some("cat <file>"),
            CommandKind::Cp => Some("cp [-r] <source> <destination>"),
            CommandKind::Kill => Some("kill <pid>"),
            CommandKind::Exec => Some("exec <file> [args...]"),
            CommandKind::Ls | CommandKind::Ps | CommandKind::Quit => None,
        }
    }

    pub fn execute(
        self,
        args: &[&str],
        session: &mut Session,
        processes: &dyn ProcessTable,
    ) -> Outcome {
        match self {
            CommandKind::Help => help(args).into(),
            CommandKind::Mkdir => one_arg(self, args)
                .and_then(|path| files::make_dir(session, path))
                .into(),
            CommandKind::Touch => one_arg(self, args)
                .and_then(|path| files::touch(session, path))
                .into(),
            CommandKind::Rmdir => one_arg(self, args)
                .and_then(|path| files::remove_dir(session, path))
                .into(),
            CommandKind::Rm => one_arg(self, args)
                .and_then(|path| files::remove_file(session, path))
                .into(),
            CommandKind::Cd => {
                let result = one_arg(self, args).and_then(|path| session.change_dir(path));
                // The echo reports wherever the session ended up.
                Outcome {
                    result,
                    frame: Some(Frame::Cwd(session.display_cwd())),
                }
            }
            CommandKind::Mv => match args {
                [from, to] => files::rename(session, from, to).into(),
                _ => Outcome::failed(usage_error(self)),
            },
            CommandKind::Ls => {
                if !args.is_empty() {
                    return Outcome::failed(usage_error(self));
                }
                match files::list_dir(session) {
                    Ok(entries) => Outcome::reply(Frame::Listing(entries)),
                    Err(e) => Outcome::failed(e),
                }
            }
            CommandKind::Ln => match args {
                ["-s", target, link] => files::link(session, target, link, true).into(),
                [target, link] if *target != "-s" => {
                    files::link(session, target, link, false).into()
                }
                _ => Outcome::failed(usage_error(self)),
            },
            CommandKind::Chmod => match args {
                [mode, path] => files::change_mode(session, mode, path).into(),
                _ => Outcome::failed(usage_error(self)),
            },
            CommandKind::Cat => match one_arg(self, args) {
                Ok(path) => match files::read_file(session, path) {
                    Ok((path, content)) => Outcome::reply(Frame::FileContent { path, content }),
                    Err(e) => Outcome {
                        result: Err(e),
                        frame: Some(Frame::Error),
                    },
                },
                Err(e) => Outcome::failed(e),
            },
            CommandKind::Cp => match args {
                ["-r", from, to] => files::copy(session, from, to, true).into(),
                [from, to] if *from != "-r" => files::copy(session, from, to, false).into(),
                _ => Outcome::failed(usage_error(self)),
            },
            CommandKind::Ps => {
                if !args.is_empty() {
                    return Outcome::failed(usage_error(self));
                }
                match processes.processes() {
                    Ok(list) => Outcome::reply(Frame::ProcessList(list)),
                    Err(e) => Outcome::failed(e),
                }
            }
            CommandKind::Kill => one_arg(self, args)
                .and_then(process::parse_pid)
                .and_then(process::terminate)
                .into(),
            CommandKind::Exec => match args {
                [program, rest @ ..] => process::execute(session, program, rest).into(),
                [] => Outcome::failed(usage_error(self)),
            },
            CommandKind::Quit => Outcome::done(),
        }
    }
}

fn usage_error(kind: CommandKind) -> Error {
    Error::syntax(format!("bad arguments for {}", kind.name()))
}

fn one_arg<'a>(kind: CommandKind, args: &[&'a str]) -> Result<&'a str> {
    match args {
        [arg] => Ok(arg),
        _ => Err(usage_error(kind)),
    }
}

fn help(args: &[&str]) -> Result<()> {
    match args {
        [] => {
            for kind in CommandKind::ALL {
                info!("{:>8}: {}", kind.name(), kind.summary());
            }
            Ok(())
        }
        [name] => {
            match CommandKind::ALL.iter().find(|k| k.name() == *name) {
                None => info!("{} command not found", name),
                Some(kind) => match kind.usage() {
                    Some(usage) => info!("usage : {}", usage),
                    None => {
                        info!("no usage");
                        return Err(usage_error(CommandKind::Help));
                    }
                },
            }
            Ok(())
        }
        _ => Err(usage_error(CommandKind::Help)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::ProcessEntry;
    use crate::jail::{PathResolver, VirtualRoot};

    struct FakeTable;

    impl ProcessTable for FakeTable {
        fn processes(&self) -> Result<Vec<ProcessEntry>> {
            Ok(vec![ProcessEntry { pid: 1, ppid: 0, command: "init".into() }])
        }
    }

    fn session() -> (tempfile::TempDir, Session) {
        let dir = tempfile::tempdir().unwrap();
        let root = VirtualRoot::create(dir.path()).unwrap();
        (dir, Session::new(root, PathResolver::default()))
    }

    fn run(kind: CommandKind, args: &[&str], session: &mut Session) -> Outcome {
        kind.execute(args, session, &FakeTable)
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<_> = CommandKind::ALL.iter().map(|k| k.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), CommandKind::ALL.len());
    }

    #[test]
    fn test_argument_counts() {
        let (_dir, mut session) = session();
        for (kind, args) in [
            (CommandKind::Mkdir, vec![]),
            (CommandKind::Mkdir, vec!["a", "b"]),
            (CommandKind::Mv, vec!["a"]),
            (CommandKind::Ls, vec!["x"]),
            (CommandKind::Ln, vec!["-s", "a"]),
            (CommandKind::Ln, vec!["a", "b", "c"]),
            (CommandKind::Cp, vec!["-r", "a"]),
            (CommandKind::Chmod, vec!["644"]),
            (CommandKind::Kill, vec!["abc"]),
            (CommandKind::Exec, vec![]),
            (CommandKind::Help, vec!["a", "b"]),
        ] {
            let outcome = run(kind, &args, &mut session);
            let err = outcome.result.unwrap_err();
            assert!(err.is_syntax(), "{:?} {:?} gave {}", kind, args, err);
        }
    }

    #[test]
    fn test_help() {
        let (_dir, mut session) = session();
        assert!(run(CommandKind::Help, &[], &mut session).result.is_ok());
        assert!(run(CommandKind::Help, &["mkdir"], &mut session).result.is_ok());
        assert!(run(CommandKind::Help, &["nonsense"], &mut session).result.is_ok());
        let err = run(CommandKind::Help, &["ls"], &mut session).result.unwrap_err();
        assert!(err.is_syntax());
    }

    #[test]
    fn test_cd_always_echoes() {
        let (_dir, mut session) = session();
        fs_mkdir(&session, "sub");

        let outcome = run(CommandKind::Cd, &["sub"], &mut session);
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.frame, Some(Frame::Cwd("/sub".into())));

        let outcome = run(CommandKind::Cd, &["missing"], &mut session);
        assert!(outcome.result.is_err());
        assert_eq!(outcome.frame, Some(Frame::Cwd("/sub".into())));

        let outcome = run(CommandKind::Cd, &[], &mut session);
        assert!(outcome.result.unwrap_err().is_syntax());
        assert_eq!(outcome.frame, Some(Frame::Cwd("/sub".into())));
    }

    #[test]
    fn test_cat_error_sentinel() {
        let (_dir, mut session) = session();
        let outcome = run(CommandKind::Cat, &["missing"], &mut session);
        assert!(outcome.result.is_err());
        assert_eq!(outcome.frame, Some(Frame::Error));

        // Syntax errors send nothing.
        let outcome = run(CommandKind::Cat, &[], &mut session);
        assert!(outcome.frame.is_none());
    }

    #[test]
    fn test_ps_uses_table() {
        let (_dir, mut session) = session();
        let outcome = run(CommandKind::Ps, &[], &mut session);
        match outcome.frame {
            Some(Frame::ProcessList(list)) => assert_eq!(list[0].command, "init"),
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[test]
    fn test_mutations_send_nothing() {
        let (_dir, mut session) = session();
        let outcome = run(CommandKind::Touch, &["a"], &mut session);
        assert!(outcome.result.is_ok());
        assert!(outcome.frame.is_none());
        let outcome = run(CommandKind::Chmod, &["u-w", "a"], &mut session);
        assert!(outcome.result.is_ok());
        assert!(outcome.frame.is_none());
    }

    fn fs_mkdir(session: &Session, name: &str) {
        std::fs::create_dir(session.root().path().join(name)).unwrap();
    }
}
