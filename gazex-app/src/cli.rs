use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser, Clone)]
#[command(name = "gazex")]
#[command(about = "Gaze-contingent infant looking experiment with recorder markers")]
pub struct Cli {
    /// TOML configuration file.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Participant id; selects `<id>_order_*.txt`.
    #[arg(long)]
    pub participant: Option<u32>,

    /// Use the simulated gaze source whatever the config says.
    #[arg(long)]
    pub simulate: bool,

    /// Run without the recorder link; markers are only logged.
    #[arg(long)]
    pub offline: bool,

    /// Debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}
