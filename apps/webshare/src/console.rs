//! Operator console.
//!
//! Reads one command per line from stdin:
//!
//! - `upload <path>` enqueues a file, or every file under a directory.
//! - `archive <path>` enqueues a directory as a single tar download.
//! - `queue` lists what is waiting.
//! - `help`, `exit`.

use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};

use webshare_delivery::TransferQueue;
use webshare_file_ops::{FileOpsError, expand_path};

const HELP: &str = "\
Commands:
  upload <path>   queue a file, or every file under a directory
  archive <path>  queue a directory as a single .tar download
  queue           list pending downloads
  help            show this message
  exit            stop sharing and quit";

const PROMPT: &str =
    "Enter command (e.g. 'upload /file/path', 'upload /dir/path'); each download takes the next queued file";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Upload(PathBuf),
    Archive(PathBuf),
    Queue,
    Help,
    Exit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("please provide the path for `{0}`")]
    MissingPath(&'static str),

    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),
}

/// Parses one input line. Blank lines yield `None`.
///
/// Everything after the command word is the path, so paths may contain
/// spaces.
pub fn parse_command(line: &str) -> Result<Option<Command>, ParseError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let command = match word {
        "upload" if rest.is_empty() => return Err(ParseError::MissingPath("upload")),
        "archive" if rest.is_empty() => return Err(ParseError::MissingPath("archive")),
        "upload" => Command::Upload(PathBuf::from(rest)),
        "archive" => Command::Archive(PathBuf::from(rest)),
        "queue" => Command::Queue,
        "help" => Command::Help,
        "exit" | "quit" => Command::Exit,
        _ => return Err(ParseError::Unknown(line.to_string())),
    };
    Ok(Some(command))
}

/// Applies console commands to the shared transfer queue.
pub struct Console {
    queue: Arc<TransferQueue>,
}

impl Console {
    pub fn new(queue: Arc<TransferQueue>) -> Self {
        Self { queue }
    }

    /// Reads stdin until `exit` or end of input.
    pub async fn run(&self) -> anyhow::Result<()> {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        let mut out = io::stdout();
        writeln!(out, "{PROMPT}")?;

        while let Some(line) = lines.next_line().await? {
            let flow = match parse_command(&line) {
                Ok(Some(command)) => self.execute(command, &mut out).await?,
                Ok(None) => ControlFlow::Continue(()),
                Err(e) => {
                    writeln!(out, "{e}")?;
                    ControlFlow::Continue(())
                }
            };
            if flow.is_break() {
                return Ok(());
            }
            writeln!(out, "{PROMPT}")?;
        }

        tracing::info!("stdin closed");
        Ok(())
    }

    /// Runs one command, writing operator feedback to `out`.
    pub async fn execute<W: Write>(
        &self,
        command: Command,
        out: &mut W,
    ) -> io::Result<ControlFlow<()>> {
        match command {
            Command::Upload(path) => self.upload(path, out).await?,
            Command::Archive(path) => self.archive(path, out).await?,
            Command::Queue => {
                let pending = self.queue.snapshot();
                if pending.is_empty() {
                    writeln!(out, "Queue is empty.")?;
                }
                for (i, path) in pending.iter().enumerate() {
                    writeln!(out, "{:>4}. {}", i + 1, path.display())?;
                }
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Exit => {
                writeln!(out, "Exiting...")?;
                return Ok(ControlFlow::Break(()));
            }
        }
        Ok(ControlFlow::Continue(()))
    }

    async fn upload<W: Write>(&self, path: PathBuf, out: &mut W) -> io::Result<()> {
        let walk_root = path.clone();
        let expansion = tokio::task::spawn_blocking(move || expand_path(&walk_root))
            .await
            .map_err(io::Error::other)?;

        let expansion = match expansion {
            Ok(expansion) => expansion,
            Err(FileOpsError::NotFound(_)) => {
                return writeln!(out, "File {} not found.", path.display());
            }
            Err(e) => return writeln!(out, "Error accessing {}: {e}", path.display()),
        };

        let count = expansion.files.len();
        let pending = self.queue.enqueue_all(expansion.files);
        tracing::info!(path = %path.display(), count, pending, "enqueued for download");

        if count == 1 && expansion.skipped.is_empty() {
            writeln!(out, "File {} added to download queue.", path.display())?;
        } else {
            writeln!(
                out,
                "{count} file(s) from {} added to download queue.",
                path.display()
            )?;
        }
        if !expansion.skipped.is_empty() {
            writeln!(out, "{} entries skipped:", expansion.skipped.len())?;
            for skipped in &expansion.skipped {
                writeln!(out, "  {}: {}", skipped.path.display(), skipped.reason)?;
            }
        }
        Ok(())
    }

    async fn archive<W: Write>(&self, path: PathBuf, out: &mut W) -> io::Result<()> {
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {
                let pending = self.queue.enqueue(&path);
                tracing::info!(path = %path.display(), pending, "directory enqueued as archive");
                writeln!(out, "Directory {} added to download queue.", path.display())
            }
            Ok(_) => writeln!(
                out,
                "{} is not a directory; use `upload` for single files.",
                path.display()
            ),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                writeln!(out, "Directory {} not found.", path.display())
            }
            Err(e) => writeln!(out, "Error accessing {}: {e}", path.display()),
        }
    }
}
