//! CLI definitions for domsnap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use domsnap_engine::ActionKind;

/// domsnap CLI.
#[derive(Parser)]
#[command(name = "domsnap")]
#[command(about = "Index interactive elements and snapshot the DOM of a Chromium page")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path (default: ~/.domsnap/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// DevTools endpoint, overriding `browser.endpoint`
    #[arg(short, long, env = "DOMSNAP_ENDPOINT", global = true)]
    pub endpoint: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Capture one snapshot and print it
    Capture {
        /// Navigate here before capturing
        #[arg(long)]
        url: Option<String>,

        /// Viewport expansion in pixels (-1 for the whole page)
        #[arg(long, allow_hyphen_values = true)]
        expansion: Option<i32>,

        /// Draw the highlight overlay in the page
        #[arg(long)]
        overlay: bool,

        /// Only outline this index
        #[arg(long)]
        focus: Option<u32>,

        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Capture, then act on an indexed element
    Act {
        /// Highlight index of the element
        #[arg(long)]
        index: u32,

        /// Action to perform
        #[arg(long, value_enum)]
        kind: KindArg,

        /// Text to fill or option to select
        #[arg(long)]
        value: Option<String>,
    },

    /// Re-capture on every significant change until interrupted
    Watch {
        /// Draw the highlight overlay in the page
        #[arg(long)]
        overlay: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum KindArg {
    Click,
    Fill,
    Select,
}

impl From<KindArg> for ActionKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Click => ActionKind::Click,
            KindArg::Fill => ActionKind::Fill,
            KindArg::Select => ActionKind::Select,
        }
    }
}
