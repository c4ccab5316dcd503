// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use stackshim::{
    alias::Aliases,
    external::{dispatch, Dispatch},
    path::{config_file, default_aliases_file, store_file},
    Backend, Config, Error, ErrorKind, Git, Git2Client, InquireChooser, LogMode, RestackScope,
    Shim, TreeStore,
};

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::{
    env::{args_os, current_dir},
    ffi::OsString,
    io::{stdin, stdout, IsTerminal, Write},
    path::PathBuf,
    process::exit,
};
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "stackshim [options] <command>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    fn run<G: Git, W: Write>(self, shim: &mut Shim<'_, G, W>) -> stackshim::Result<()> {
        match self.command {
            Command::Init => Ok(()),
            Command::Create(opts) => shim.create(&opts.name),
            Command::Track(opts) => shim.track(opts.parent.as_deref()),
            Command::Untrack(opts) => shim.untrack(opts.branch.as_deref()),
            Command::Delete(opts) => shim.delete(&opts.branch),
            Command::Rename(opts) => shim.rename(&opts.name),
            Command::Parent => shim.parent(),
            Command::Children => shim.children(),
            Command::Trunk => shim.trunk(),
            Command::Log(opts) => shim.log(opts.style.into(), opts.stack),
            Command::Down(opts) => shim.down(opts.steps),
            Command::Up(opts) => shim.up(opts.steps),
            Command::Top => shim.top(),
            Command::Bottom => shim.bottom(),
            Command::Checkout(opts) => shim.checkout(&opts.branch),
            Command::Move(opts) => shim.move_onto(&opts.onto),
            Command::Restack(opts) => shim.restack(opts.scope()),
            Command::Continue => shim.continue_rebase(),
            Command::Abort => shim.abort(),
            Command::Submit(opts) => shim.submit(opts.stack),
            Command::Sync(opts) => shim.sync(!opts.no_restack),
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Set up stackshim for current repository.
    Init,

    /// Create new branch on top of current branch.
    #[command(override_usage = "stackshim create <name>")]
    Create(CreateOptions),

    /// Track current branch on top of a parent.
    #[command(override_usage = "stackshim track [options]")]
    Track(TrackOptions),

    /// Stop tracking a branch without deleting it.
    #[command(override_usage = "stackshim untrack [<branch>]")]
    Untrack(UntrackOptions),

    /// Delete tracked branch.
    #[command(override_usage = "stackshim delete <branch>")]
    Delete(DeleteOptions),

    /// Rename current branch.
    #[command(override_usage = "stackshim rename <name>")]
    Rename(RenameOptions),

    /// Show parent of current branch.
    Parent,

    /// Show children of current branch.
    Children,

    /// Show trunk branch.
    Trunk,

    /// Show stacks.
    #[command(override_usage = "stackshim log [short|long] [options]")]
    Log(LogOptions),

    /// Switch toward trunk.
    #[command(override_usage = "stackshim down [<steps>]")]
    Down(StepOptions),

    /// Switch away from trunk.
    #[command(override_usage = "stackshim up [<steps>]")]
    Up(StepOptions),

    /// Switch to tip of current stack.
    Top,

    /// Switch to bottom of current stack.
    Bottom,

    /// Switch to tracked branch.
    #[command(override_usage = "stackshim checkout <branch>")]
    Checkout(CheckoutOptions),

    /// Move current branch onto another parent.
    #[command(override_usage = "stackshim move --onto <branch>")]
    Move(MoveOptions),

    /// Rebase branches that fell behind their parent.
    #[command(override_usage = "stackshim restack [options]")]
    Restack(RestackOptions),

    /// Continue rebase that stopped on conflicts.
    Continue,

    /// Abort rebase that stopped on conflicts.
    Abort,

    /// Push current branch, or its stack, to origin.
    #[command(override_usage = "stackshim submit [options]")]
    Submit(SubmitOptions),

    /// Update trunk, drop merged branches, and restack.
    #[command(override_usage = "stackshim sync [options]")]
    Sync(SyncOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CreateOptions {
    /// Name of new branch.
    #[arg(required = true, value_name = "name")]
    pub name: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct TrackOptions {
    /// Parent to stack current branch on, trunk by default.
    #[arg(short, long, value_name = "branch")]
    pub parent: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct UntrackOptions {
    /// Branch to stop tracking, current branch by default.
    #[arg(value_name = "branch")]
    pub branch: Option<String>,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct DeleteOptions {
    /// Branch to delete.
    #[arg(required = true, value_name = "branch")]
    pub branch: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RenameOptions {
    /// New name of current branch.
    #[arg(required = true, value_name = "name")]
    pub name: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct LogOptions {
    /// Amount of detail per branch.
    #[arg(value_enum, default_value_t = LogStyle::Short)]
    pub style: LogStyle,

    /// Only show stack of current branch.
    #[arg(short, long)]
    pub stack: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum LogStyle {
    Short,
    Long,
}

impl From<LogStyle> for LogMode {
    fn from(style: LogStyle) -> Self {
        match style {
            LogStyle::Short => LogMode::Short,
            LogStyle::Long => LogMode::Long,
        }
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct StepOptions {
    /// Number of branches to step over.
    #[arg(default_value_t = 1, value_name = "steps")]
    pub steps: usize,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CheckoutOptions {
    /// Branch to switch to.
    #[arg(required = true, value_name = "branch")]
    pub branch: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct MoveOptions {
    /// New parent of current branch.
    #[arg(long, required = true, value_name = "branch")]
    pub onto: String,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct RestackOptions {
    /// Only restack current branch.
    #[arg(long, group = "scope")]
    pub only: bool,

    /// Restack current branch and its descendants.
    #[arg(long, group = "scope")]
    pub upstack: bool,

    /// Restack current branch and its ancestors.
    #[arg(long, group = "scope")]
    pub downstack: bool,
}

impl RestackOptions {
    fn scope(&self) -> RestackScope {
        if self.only {
            RestackScope::Only
        } else if self.upstack {
            RestackScope::Upstack
        } else if self.downstack {
            RestackScope::Downstack
        } else {
            RestackScope::Stack
        }
    }
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SubmitOptions {
    /// Push every branch of current stack.
    #[arg(short, long)]
    pub stack: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct SyncOptions {
    /// Skip restacking after sync.
    #[arg(long)]
    pub no_restack: bool,
}

fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap();
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run() {
        let kind = error
            .downcast_ref::<Error>()
            .map(Error::kind)
            .unwrap_or(ErrorKind::Internal);
        match kind {
            ErrorKind::Usage | ErrorKind::CorruptStore => error!("{error}"),
            ErrorKind::Internal => {
                error!("{error:?}");
                error!("this should not happen, please report this as a bug");
            }
        }
        exit(kind.exit_code());
    }

    exit(0)
}

fn run() -> Result<()> {
    let git = Git2Client::discover(current_dir().map_err(Error::from)?).map_err(Error::from)?;
    let config_path = config_file(git.common_dir());
    let config = Config::load(&config_path).map_err(Error::from)?;

    let aliases = match config.as_ref().and_then(|config| config.aliases.as_ref()) {
        Some(path) => PathBuf::from(path),
        None => default_aliases_file().map_err(Error::from)?,
    };
    let args = Aliases::load(aliases).expand(args_os());
    let init = args.get(1).is_some_and(|arg| arg == "init");

    let config = match config {
        Some(config) if !init => config,
        _ => {
            let interactive = stdin().is_terminal();
            let config = Config::setup(&git, interactive).map_err(Error::from)?;
            config.save(&config_path).map_err(Error::from)?;
            config
        }
    };

    match config.backend {
        Backend::External { .. } if init => Ok(()),
        Backend::External { fast_path } => run_external(&git, fast_path, args),
        Backend::Shim { trunk } => run_shim(&git, &trunk, args),
    }
}

fn run_shim(git: &Git2Client, trunk: &str, args: Vec<OsString>) -> Result<()> {
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) if !error.use_stderr() => error.exit(),
        Err(error) => {
            error.print().map_err(Error::from)?;
            exit(ErrorKind::Usage.exit_code());
        }
    };

    let store = TreeStore::new(store_file(git.common_dir()));
    store.transact(trunk, |tree| {
        let mut shim = Shim::new(git, tree, stdout().lock());
        if let Some(chooser) = InquireChooser::detect() {
            shim = shim.with_chooser(Box::new(chooser));
        }
        cli.run(&mut shim)
    })?;

    Ok(())
}

fn run_external(git: &Git2Client, fast_path: bool, args: Vec<OsString>) -> Result<()> {
    match dispatch(git, fast_path, &args)? {
        Dispatch::Answered(answer) => {
            println!("{answer}");
            Ok(())
        }
        Dispatch::HandOver(program) => {
            debug!("hand over to {:?}", program.display());
            exec(program, &args[1..])
        }
    }
}

#[cfg(unix)]
fn exec(program: PathBuf, args: &[OsString]) -> Result<()> {
    use std::os::unix::process::CommandExt;

    let error = std::process::Command::new(program).args(args).exec();
    Err(Error::from(error).into())
}

#[cfg(not(unix))]
fn exec(program: PathBuf, args: &[OsString]) -> Result<()> {
    let status = std::process::Command::new(program)
        .args(args)
        .status()
        .map_err(Error::from)?;
    tracing::info!("external tool exited with {status}");
    exit(status.code().unwrap_or(1))
}
