use clap::Parser;
use tracing_subscriber::EnvFilter;

use vulnprobe::cli;
use vulnprobe::config;
use vulnprobe::errors::ProbeError;
use vulnprobe::expression::AggregateExpression;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // Initialize logging
    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!cli.no_color)
        .with_writer(std::io::stderr)
        .init();

    if cli.no_color {
        console::set_colors_enabled(false);
    }

    let verbose = cli.verbose > 0;
    let result = match cli.command {
        cli::Commands::Scan(args) => cli::scan::handle_scan(args, verbose).await,
        cli::Commands::Validate(args) => handle_validate(args).await,
    };

    match result {
        Ok(()) => {}
        Err(e) => {
            eprintln!("Error: {}", e);
            let exit_code = match e.root() {
                ProbeError::Config(_) | ProbeError::Yaml(_) | ProbeError::Json(_) => 2,
                ProbeError::Io(_) => 3,
                ProbeError::ExpressionParse { .. }
                | ProbeError::UnsupportedExpression(_)
                | ProbeError::TypeMismatch { .. } => 4,
                _ => 1,
            };
            std::process::exit(exit_code);
        }
    }
}

async fn handle_validate(args: cli::commands::ValidateArgs) -> Result<(), ProbeError> {
    let path = std::path::PathBuf::from(&args.poc);
    let config = config::parse_config(&path).await?;

    let aggregate = match config.expression.as_deref() {
        Some(expr) if AggregateExpression::is_declared(Some(expr)) => expr.trim().to_string(),
        _ => "all rules".to_string(),
    };
    println!(
        "POC is valid: {} ({}, {} rules, verdict: {})",
        args.poc,
        config.display_name(),
        config.rules.len(),
        aggregate
    );
    Ok(())
}
