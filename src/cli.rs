//! Command-line interface definition for Parlance
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for sending turns, resuming truncated replies,
//! and inspecting stored sessions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Parlance - streaming conversation engine
///
/// Hold a multi-turn conversation with a generative model where every
/// message and code block has a stable id and cut-off replies can be
/// resumed in place.
#[derive(Parser, Debug, Clone)]
#[command(name = "parlance")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/config.yaml")]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Override the store directory from config
    #[arg(long)]
    pub store_path: Option<String>,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

/// Available commands for Parlance
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Send a user message and stream the reply
    Send {
        /// The user message text
        prompt: String,

        /// Existing session to append to; a new session is created if omitted
        #[arg(short, long)]
        session: Option<String>,

        /// Attach a file (repeatable); text files are shown to the model,
        /// binary files contribute metadata only
        #[arg(short, long)]
        file: Vec<PathBuf>,
    },

    /// Resume the latest assistant reply of a session where it was cut off
    Resume {
        /// Session whose latest assistant reply should be extended
        session: String,

        /// Read the previously received partial text from a file instead of
        /// using the stored message content
        #[arg(long)]
        prior_file: Option<PathBuf>,
    },

    /// List stored sessions, newest first
    Sessions {
        /// Emit JSON instead of a human-readable listing
        #[arg(long)]
        json: bool,
    },

    /// Delete a session and every message and artifact under it
    Purge {
        /// The session to delete
        session: String,
    },

    /// Recompute session metadata from source and report orphan artifacts
    Reconcile {
        /// The session to reconcile
        session: String,
    },
}
