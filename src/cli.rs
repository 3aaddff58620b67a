use clap::Parser;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Number of encoder threads (between 1 and 10), used to throttle cpu usage
    #[arg(short, long, default_value_t = 2)]
    pub threads: i32,

    /// Temporary directory for the converted file, in case there is no
    /// disk space left on the original file's drive
    #[arg(long)]
    pub tmpdir: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}
