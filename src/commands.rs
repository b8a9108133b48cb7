//! Command-line interface for `crag`, parsed with `clap`.
//!
//! ```no_run
//! use clap::Parser;
//! use climate_rag::commands::{Cli, Commands};
//!
//! let cli = Cli::parse();
//! if let Commands::Search { query, top_k } = cli.command {
//!     println!("searching {query} for {top_k} hits");
//! }
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    /// Config file to use instead of `<config_dir>/config.yaml`.
    #[arg(long, global = true, env = "CRAG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Write the default config and prompt template.
    Init,

    /// Chunk files or directories and add them to the vector store.
    #[clap(name = "add")]
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Show the closest chunks for a query.
    #[clap(name = "search", alias = "s")]
    Search {
        query: String,

        #[arg(short = 'k', long = "top-k", default_value_t = 3)]
        top_k: usize,
    },

    /// Ask one question.
    #[clap(name = "ask", alias = "a")]
    Ask {
        question: String,

        #[arg(name = "session", short = 's', default_value = "default")]
        session: String,
    },

    /// Chat until `exit`.
    #[clap(name = "interactive", alias = "i")]
    Interactive {
        #[arg(name = "session", short = 's', default_value = "default")]
        session: String,
    },
}
