use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::anyhow;
use clap::{ArgAction, Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
pub struct KeyVal {
    pub key: String,
    pub value: String,
}

impl std::str::FromStr for KeyVal {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (k, v) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("expected KEY=VALUE, got: {s}"))?;
        Ok(Self {
            key: k.trim().to_string(),
            value: v.trim().to_string(),
        })
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "funnel",
    version,
    about = "Funnel: a lead pipeline board",
    disable_help_subcommand = true
)]
pub struct GlobalCli {
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    pub quiet: u8,

    #[arg(
        long = "rc",
        value_parser = clap::builder::ValueParser::new(|s: &str| s.parse::<KeyVal>()),
        action = ArgAction::Append
    )]
    pub rc_overrides: Vec<KeyVal>,

    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    #[arg(long = "data")]
    pub data: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Show the board: ordered columns with their ranked cards
    Board,

    /// List leads, optionally filtered
    Leads {
        #[arg(long)]
        query: Option<String>,

        /// Only leads whose quote has been sent
        #[arg(long)]
        quote_sent: bool,
    },

    /// Show one lead with its full history
    Show { lead: String },

    /// Create a lead
    Add {
        name: String,

        #[arg(long)]
        column: Option<String>,

        #[arg(long)]
        phone: Option<String>,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        project: Option<String>,

        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        location: Option<String>,

        #[arg(long)]
        note: Option<String>,
    },

    /// Move a lead to another column
    Move { lead: String, column: String },

    /// Rename a lead
    Rename { lead: String, name: String },

    /// Append a note to a lead
    Note { lead: String, text: Vec<String> },

    /// Toggle a contact channel (instagram, whatsapp, mail)
    Channel { lead: String, channel: String },

    /// Add or remove a service on a lead
    Service {
        #[command(subcommand)]
        action: ServiceCmd,
    },

    /// Delete a lead
    Remove { lead: String },

    /// Manage board columns
    Column {
        #[command(subcommand)]
        action: ColumnCmd,
    },

    /// List tasks, optionally for one day
    Tasks {
        #[arg(long)]
        day: Option<String>,
    },

    /// Manage follow-up tasks
    Task {
        #[command(subcommand)]
        action: TaskCmd,
    },

    /// Suggested follow-up tasks
    Suggest {
        #[command(subcommand)]
        action: Option<SuggestCmd>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ServiceCmd {
    Add {
        lead: String,
        name: String,

        #[arg(long)]
        price: Option<f64>,
    },
    Rm {
        lead: String,
        name: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ColumnCmd {
    /// List columns in board order
    List,
    Add {
        id: String,
        title: String,

        #[arg(long, default_value = "border-slate-400")]
        color: String,
    },
    Edit {
        id: String,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        color: Option<String>,
    },
    Rm {
        id: String,
    },
    /// Move a column to a new position (0-based)
    Move {
        id: String,
        index: usize,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum TaskCmd {
    Add {
        lead: String,
        date: String,
        action: Vec<String>,

        #[arg(long, default_value = "whatsapp")]
        channel: String,

        #[arg(long)]
        note: Option<String>,
    },
    Done {
        task: String,
    },
    Reschedule {
        task: String,
        date: String,
    },
    Rm {
        task: String,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum SuggestCmd {
    /// Accept a suggestion by its list position, creating the task
    Accept {
        index: usize,

        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        action: Option<String>,
    },
    /// Dismiss a suggestion by its list position
    Dismiss { index: usize },
}

pub fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

/// Maps the configured default command name onto a subcommand for bare
/// `funnel` invocations.
pub fn default_command(name: &str) -> Command {
    match name {
        "leads" => Command::Leads {
            query: None,
            quote_sent: false,
        },
        "tasks" => Command::Tasks { day: None },
        "suggest" => Command::Suggest { action: None },
        _ => Command::Board,
    }
}
