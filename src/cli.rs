use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::bridge::{BridgeConfig, DEFAULT_ENGINE};

#[derive(Parser, Debug)]
#[command(name = "zipbridge")]
#[command(version)]
#[command(about = "An unzip utility that decodes Deflate64 entries through funzip", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipbridge data1.zip -x joe            extract all files except joe from data1.zip\n  \
  zipbridge -p foo.zip | more           send contents of foo.zip via pipe into more\n  \
  zipbridge --engine /opt/funzip a.zip  decode Deflate64 entries with a specific funzip")]
pub struct Cli {
    /// ZIP file path
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// List files (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List verbosely
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n')]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Decoding engine used for bridged methods
    #[arg(long, value_name = "PATH", default_value = DEFAULT_ENGINE)]
    pub engine: PathBuf,

    /// Also decode Deflate entries through the engine
    #[arg(long, conflicts_with = "no_bridge")]
    pub bridge_deflate: bool,

    /// Never use the engine; Deflate64 entries fail to extract
    #[arg(long)]
    pub no_bridge: bool,

    /// Kill the engine if an entry takes longer than this many seconds
    #[arg(long, value_name = "SECS")]
    pub engine_timeout: Option<u64>,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || self.pipe
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Bridge settings selected by the command line
    pub fn bridge_config(&self) -> BridgeConfig {
        let config = if self.no_bridge {
            BridgeConfig::disabled()
        } else if self.bridge_deflate {
            BridgeConfig::force_all()
        } else {
            BridgeConfig::default()
        };
        let config = config.with_engine_path(self.engine.clone());
        match self.engine_timeout {
            Some(secs) => config.with_timeout(Duration::from_secs(secs)),
            None => config,
        }
    }
}
