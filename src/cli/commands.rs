//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - daemon/tick: run the scheduler and monitor
//! - user: register and inspect vehicle owners
//! - submit/modify/start/stop/cancel: request lifecycle
//! - status/queue/bills: queries
//! - pile: pile administration

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use chargeq::domain::{ChargeMode, PileStatus, PileType};

/// chargeq - charging-pile request scheduler
#[derive(Parser, Debug)]
#[command(name = "chargeq")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Fast,
    Slow,
}

impl From<ModeArg> for ChargeMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Fast => ChargeMode::Fast,
            ModeArg::Slow => ChargeMode::Slow,
        }
    }
}

impl From<ModeArg> for PileType {
    fn from(mode: ModeArg) -> Self {
        ChargeMode::from(mode).pile_type()
    }
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PileStatusArg {
    Available,
    Unavailable,
}

impl From<PileStatusArg> for PileStatus {
    fn from(status: PileStatusArg) -> Self {
        match status {
            PileStatusArg::Available => PileStatus::Available,
            PileStatusArg::Unavailable => PileStatus::Unavailable,
        }
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler and monitor until Ctrl-C
    Daemon,

    /// Run one monitor pass and one scheduling tick
    Tick,

    /// Vehicle owners
    User {
        #[command(subcommand)]
        command: UserCommands,
    },

    /// Submit a charging request
    Submit {
        user: String,

        #[arg(short, long, value_enum)]
        mode: ModeArg,

        /// Energy in kWh
        #[arg(short, long)]
        amount: f64,
    },

    /// Change the mode or amount of a waiting request
    Modify {
        user: String,

        #[arg(short, long, value_enum)]
        mode: ModeArg,

        /// Energy in kWh
        #[arg(short, long)]
        amount: f64,
    },

    /// Start charging at the head of the pile queue
    Start { user: String },

    /// Stop charging and issue the bill
    Stop { user: String },

    /// Cancel a waiting request
    Cancel { user: String },

    /// Show the user's charging status
    Status { user: String },

    /// Show where the user stands in line
    Queue { user: String },

    /// List the user's bills
    Bills { user: String },

    /// Pile administration
    Pile {
        #[command(subcommand)]
        command: PileCommands,
    },

    /// Print the effective station configuration
    Config,
}

#[derive(Subcommand, Debug, Clone)]
pub enum UserCommands {
    /// Register a vehicle owner
    Add {
        id: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Battery capacity in kWh
        #[arg(short, long)]
        battery: f64,
    },

    /// Show a user's battery and active request
    Show { id: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum PileCommands {
    /// Add a pile
    Add {
        #[arg(short = 't', long = "type", value_enum)]
        pile_type: ModeArg,

        /// Power in kW; defaults to the configured power for the type
        #[arg(short, long)]
        power: Option<f64>,
    },

    /// List piles with queue length and waiting time
    List,

    /// Switch a pile on or off
    Toggle { id: String },

    /// Set a pile's status
    Set {
        id: String,

        #[arg(value_enum)]
        status: PileStatusArg,
    },

    /// Show the vehicles queued at a pile
    Queue { id: String },

    /// Remove an idle pile
    Remove { id: String },
}
