//! Command line tokenizing and dispatch
//!
//! One request line is split on whitespace, looked up in the command table
//! and run against the session. The outcome is logged on the daemon side
//! with the same vocabulary an operator at the console expects:
//! `return success`, `usage : ...`, `return fail(n)` and
//! `command not found`.

mod command;

use std::collections::HashMap;

use tracing::{debug, error, info, warn};

use crate::config::ProtocolConfig;
use crate::ipc::Frame;
use crate::jail::Session;
use crate::ops::{ProcFs, ProcessTable};
use crate::{Error, Result};

pub use command::{CommandKind, Outcome};

/// What the connection loop should do after a line
#[derive(Debug, PartialEq)]
pub enum Flow {
    /// Keep reading; send the frame if there is one
    Continue(Option<Frame>),
    /// Close the connection
    Quit,
}

pub struct Dispatcher {
    commands: HashMap<&'static str, CommandKind>,
    processes: Box<dyn ProcessTable>,
    max_args: usize,
}

impl Dispatcher {
    pub fn new(max_args: usize, processes: Box<dyn ProcessTable>) -> Self {
        let commands = CommandKind::ALL
            .iter()
            .map(|kind| (kind.name(), *kind))
            .collect();

        Self {
            commands,
            processes,
            max_args,
        }
    }

    pub fn from_config(config: &ProtocolConfig) -> Self {
        Self::new(config.max_args, Box::new(ProcFs::default()))
    }

    pub fn lookup(&self, name: &str) -> Option<CommandKind> {
        self.commands.get(name).copied()
    }

    /// Run one request line.
    ///
    /// Blank lines and unknown commands produce no frame and leave the
    /// session untouched.
    pub fn dispatch(&self, line: &str, session: &mut Session) -> Flow {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some((&name, args)) = tokens.split_first() else {
            return Flow::Continue(None);
        };

        let Some(kind) = self.lookup(name) else {
            info!("{}: command not found", name);
            return Flow::Continue(None);
        };

        debug!("dispatch {} with {} argument(s)", name, args.len());

        let outcome = if tokens.len() > self.max_args {
            let err = Error::syntax(format!(
                "{} arguments exceed the limit of {}",
                tokens.len(),
                self.max_args
            ));
            too_many_args(kind, err, session)
        } else {
            kind.execute(args, session, self.processes.as_ref())
        };

        report(kind, &outcome.result);

        if kind == CommandKind::Quit {
            return Flow::Quit;
        }
        Flow::Continue(outcome.frame)
    }
}

// cd keeps its echo even when the line is rejected outright.
fn too_many_args(kind: CommandKind, err: Error, session: &Session) -> Outcome {
    let frame = match kind {
        CommandKind::Cd => Some(Frame::Cwd(session.display_cwd())),
        _ => None,
    };
    Outcome {
        result: Err(err),
        frame,
    }
}

fn report(kind: CommandKind, result: &Result<()>) {
    let name = kind.name();
    match result {
        Ok(()) => info!("{}: return success", name),
        Err(e) if e.is_syntax() => {
            debug!("{}: {}", name, e);
            match kind.usage() {
                Some(usage) => info!("usage : {}", usage),
                None => warn!("{}: return fail({})", name, e.code()),
            }
        }
        Err(e) => error!("{}: {} return fail({})", name, e, e.code()),
    }
}
