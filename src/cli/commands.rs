use clap::{Parser, Subcommand, Args};

#[derive(Parser)]
#[command(name = "vulnprobe", version, about = "Run YAML proof-of-concept probes against web targets")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase log verbosity (repeat for more); also traces every request
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run POC files against one or more targets
    Scan(ScanArgs),
    /// Validate a POC file
    Validate(ValidateArgs),
}

#[derive(Args, Clone)]
pub struct ScanArgs {
    /// Target base URL (repeatable)
    #[arg(short, long, required = true)]
    pub target: Vec<String>,

    /// POC file (repeatable)
    #[arg(short, long)]
    pub poc: Vec<String>,

    /// Directory of POC files (*.yaml, *.yml)
    #[arg(long)]
    pub poc_dir: Option<String>,

    /// Maximum runs in flight at once
    #[arg(short, long, default_value = "4")]
    pub concurrency: usize,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    /// Write results to a file instead of stdout
    #[arg(short, long)]
    pub output: Option<String>,
}

#[derive(Args, Clone)]
pub struct ValidateArgs {
    /// POC file to validate
    pub poc: String,
}
