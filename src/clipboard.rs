use std::io::{self, Write};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};

use thiserror::Error;
use tracing::{debug, warn};

pub(crate) const COPY_FAILED: &str = "Failed to copy text.";

#[derive(Debug, Error)]
pub(crate) enum ClipboardError {
    #[error("{program} is not available")]
    Unavailable { program: String },
    #[error("{program} exited with {status}")]
    Rejected { program: String, status: ExitStatus },
    #[error(transparent)]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CopyPath {
    Primary,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CopyOutcome {
    Copied(CopyPath),
    Failed { message: String },
}

pub(crate) trait ClipboardWriter {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError>;
}

/// An external program that takes clipboard contents on stdin.
#[derive(Debug, Clone)]
pub(crate) struct CopyCommand {
    program: String,
    args: Vec<String>,
}

impl CopyCommand {
    pub(crate) fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args).stdout(Stdio::null()).stderr(Stdio::null());
        command
    }

    fn check(&self, status: ExitStatus) -> Result<(), ClipboardError> {
        if status.success() {
            Ok(())
        } else {
            Err(ClipboardError::Rejected {
                program: self.program.clone(),
                status,
            })
        }
    }

    fn spawn_error(&self, err: io::Error) -> ClipboardError {
        if err.kind() == io::ErrorKind::NotFound {
            ClipboardError::Unavailable {
                program: self.program.clone(),
            }
        } else {
            err.into()
        }
    }
}

/// Pipes text straight into the platform clipboard program.
pub(crate) struct SystemClipboard {
    command: CopyCommand,
}

impl SystemClipboard {
    pub(crate) fn new(command: CopyCommand) -> Self {
        Self { command }
    }

    pub(crate) fn platform() -> Self {
        let command = if cfg!(target_os = "macos") {
            CopyCommand::new("pbcopy", Vec::<String>::new())
        } else if cfg!(windows) {
            CopyCommand::new("clip", Vec::<String>::new())
        } else {
            CopyCommand::new("wl-copy", Vec::<String>::new())
        };
        Self::new(command)
    }
}

impl ClipboardWriter for SystemClipboard {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut child = self
            .command
            .command()
            .stdin(Stdio::piped())
            .spawn()
            .map_err(|err| self.command.spawn_error(err))?;
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(text.as_bytes()),
            None => Ok(()),
        };
        // Reap the child even when it stopped reading early.
        let status = child.wait()?;
        self.command.check(status)?;
        Ok(written?)
    }
}

/// Stages text in a hidden temporary file and hands that file to a
/// selection-copy program. The file is gone when `write_text` returns.
pub(crate) struct StagedClipboard {
    command: CopyCommand,
    staging_dir: PathBuf,
}

impl StagedClipboard {
    pub(crate) fn new(command: CopyCommand, staging_dir: PathBuf) -> Self {
        Self {
            command,
            staging_dir,
        }
    }

    pub(crate) fn platform() -> Self {
        let command = if cfg!(target_os = "macos") {
            CopyCommand::new("pbcopy", Vec::<String>::new())
        } else if cfg!(windows) {
            CopyCommand::new("clip", Vec::<String>::new())
        } else {
            CopyCommand::new("xclip", ["-selection", "clipboard"])
        };
        Self::new(command, std::env::temp_dir())
    }
}

impl ClipboardWriter for StagedClipboard {
    fn write_text(&self, text: &str) -> Result<(), ClipboardError> {
        let mut staged = tempfile::Builder::new()
            .prefix(".promptsmith-copy-")
            .tempfile_in(&self.staging_dir)?;
        staged.write_all(text.as_bytes())?;
        staged.flush()?;

        let status = self
            .command
            .command()
            .stdin(staged.reopen()?)
            .status()
            .map_err(|err| self.command.spawn_error(err))?;
        staged.close()?;
        self.command.check(status)
    }
}

/// Copies `text` with `primary`, falling back to `fallback`. Never fails outright.
pub(crate) fn copy_text(
    text: &str,
    primary: &dyn ClipboardWriter,
    fallback: &dyn ClipboardWriter,
) -> CopyOutcome {
    match primary.write_text(text) {
        Ok(()) => return CopyOutcome::Copied(CopyPath::Primary),
        Err(err) => debug!(%err, "primary clipboard failed, trying fallback"),
    }
    match fallback.write_text(text) {
        Ok(()) => CopyOutcome::Copied(CopyPath::Fallback),
        Err(err) => {
            warn!(%err, "fallback clipboard failed");
            CopyOutcome::Failed {
                message: COPY_FAILED.to_owned(),
            }
        }
    }
}
