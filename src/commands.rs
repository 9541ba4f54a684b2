// CLI command definitions and the dispatcher that runs them.

use std::io::{Read, Write};

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use syno_cli::batch::{self, Manifest, UnlockRequest};
use syno_cli::config::Config;
use syno_cli::session::{Credentials, SessionManager};
use syno_cli::shares;
use syno_cli::transport::Transport;
use syno_cli::{ui, Error, Result};

/// Manage encrypted shares on a Synology NAS
#[derive(Parser)]
#[command(name = "syno-cli")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub config: Config,

    /// Detailed logging on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List shares
    List,

    /// Lock an encrypted volume
    Lock {
        /// Name of the share to be locked
        share: String,
    },

    /// Unlock an encrypted volume
    Unlock(UnlockArgs),

    /// Logout from session
    Logout,
}

/// Arguments for the unlock command
#[derive(Args, Debug, Clone, PartialEq, Eq)]
#[command(group(ArgGroup::new("target").required(true).args(["share", "batch"])))]
pub struct UnlockArgs {
    /// Name of the share to be unlocked
    pub share: Option<String>,

    /// Read a JSON list of {"Name", "Password"} objects from stdin and
    /// unlock them in order
    #[arg(long)]
    pub batch: bool,
}

/// A command with all of its local input already read and checked.
#[derive(Debug)]
pub enum Action {
    List,
    Lock(String),
    Unlock { requests: Vec<UnlockRequest>, batch: bool },
    Logout,
}

impl Action {
    /// Read the manifest or share password a command needs. Runs before
    /// login so bad input never opens a session.
    pub fn prepare<R, P>(command: Command, stdin: R, read_password: P) -> Result<Self>
    where
        R: Read,
        P: FnOnce() -> Result<String>,
    {
        Ok(match command {
            Command::List => Self::List,
            Command::Lock { share } => {
                if share.is_empty() {
                    return Err(Error::validation("share name"));
                }
                Self::Lock(share)
            }
            Command::Unlock(UnlockArgs { batch: true, .. }) => Self::Unlock {
                requests: Manifest::from_reader(stdin)?.entries,
                batch: true,
            },
            Command::Unlock(UnlockArgs { share, .. }) => {
                let share = share
                    .filter(|s| !s.is_empty())
                    .ok_or_else(|| Error::validation("share name"))?;
                let password = read_password()?;
                Self::Unlock {
                    requests: vec![UnlockRequest::new(share, password)],
                    batch: false,
                }
            }
            Command::Logout => Self::Logout,
        })
    }

    /// Log in, perform the action, log out.
    pub fn execute<T, W>(
        self,
        manager: &mut SessionManager<T>,
        credentials: &Credentials,
        out: &mut W,
    ) -> Result<()>
    where
        T: Transport,
        W: Write,
    {
        manager.with_session(credentials, |session| match self {
            Self::List => {
                let shares = shares::list_shares(session)?;
                ui::render_shares(out, &shares)?;
                Ok(())
            }
            Self::Lock(share) => shares::lock_share(session, &share),
            Self::Unlock {
                requests,
                batch: show_progress,
            } => {
                if !show_progress {
                    return batch::unlock_all(session, &requests).map_err(Error::from);
                }
                let progress = ui::batch_progress(requests.len());
                let result = batch::unlock_all_with_progress(session, &requests, |_, request| {
                    progress.set_message(request.name.clone());
                    progress.inc(1);
                });
                progress.finish_and_clear();
                result.map_err(Error::from)
            }
            Self::Logout => Ok(()),
        })
    }
}

/// Top-level flow: validate config, read input, then run inside a session.
pub fn run(cli: Cli) -> anyhow::Result<()> {
    cli.config.validate()?;

    let action = Action::prepare(cli.command, std::io::stdin().lock(), || {
        ui::read_password("Enter share password")
    })
    .context("failed to read command input")?;
    let credentials = cli
        .config
        .credentials(|| ui::prompt_secret("NAS password"))
        .context("failed to read account password")?;

    let transport = cli
        .config
        .transport()
        .context("failed to set up the NAS connection")?;
    let mut manager = SessionManager::new(transport);
    action.execute(&mut manager, &credentials, &mut std::io::stdout().lock())?;
    Ok(())
}
