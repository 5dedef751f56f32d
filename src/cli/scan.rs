use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::cli::commands::ScanArgs;
use crate::config::{parse_config, PocConfig};
use crate::errors::ProbeError;
use crate::pipeline::Engine;
use crate::reporting::{format_scan_summary, ScanRecord};

pub async fn handle_scan(args: ScanArgs, verbose: bool) -> Result<(), ProbeError> {
    let files = collect_poc_files(&args.poc, args.poc_dir.as_deref())?;
    if files.is_empty() {
        return Err(ProbeError::Config("No POC files given (use --poc or --poc-dir)".into()));
    }

    let mut pocs = Vec::with_capacity(files.len());
    for path in &files {
        let config = parse_config(path).await?;
        pocs.push((path.display().to_string(), config));
    }

    info!(pocs = pocs.len(), targets = args.target.len(), concurrency = args.concurrency, "Scan started");

    let jobs: Vec<(&str, &str, &PocConfig)> = args
        .target
        .iter()
        .flat_map(|target| pocs.iter().map(move |(file, config)| (target.as_str(), file.as_str(), config)))
        .collect();

    let mut records: Vec<ScanRecord> = stream::iter(jobs)
        .map(|(target, file, config)| scan_one(target, file, config, verbose))
        .buffer_unordered(args.concurrency.max(1))
        .collect()
        .await;
    records.sort_by(|a, b| (&a.target, &a.poc_file).cmp(&(&b.target, &b.poc_file)));

    let output = if args.json {
        serde_json::to_string_pretty(&records)?
    } else {
        format_scan_summary(&records)
    };

    match &args.output {
        Some(path) => {
            tokio::fs::write(path, &output).await?;
            info!(path = %path, records = records.len(), "Wrote scan results");
        }
        None => print!("{}", output),
    }

    Ok(())
}

async fn scan_one(target: &str, file: &str, config: &PocConfig, verbose: bool) -> ScanRecord {
    let engine = match Engine::from_config(config, target) {
        Ok(engine) => engine.verbose(verbose),
        Err(e) => return ScanRecord::aborted(file, config, target, &e),
    };

    match engine.run().await {
        Ok(report) => {
            if report.verdict {
                warn!(poc = %config.display_name(), target_url = %target, "Target appears vulnerable");
            }
            ScanRecord::completed(file, config, report)
        }
        Err(e) => {
            let class = e.classify();
            warn!(poc = %config.display_name(), target_url = %target, error_type = class.error_type, error = %e, "Run aborted");
            ScanRecord::aborted(file, config, target, &e)
        }
    }
}

/// Explicit files first, then `*.yaml` and `*.yml` under `poc_dir` in
/// sorted order. Duplicates are dropped.
pub fn collect_poc_files(explicit: &[String], poc_dir: Option<&str>) -> Result<Vec<PathBuf>, ProbeError> {
    let mut files: Vec<PathBuf> = explicit.iter().map(PathBuf::from).collect();

    if let Some(dir) = poc_dir {
        if !Path::new(dir).is_dir() {
            return Err(ProbeError::Config(format!("POC directory not found: {}", dir)));
        }
        let mut found = Vec::new();
        for ext in ["yaml", "yml"] {
            let pattern = Path::new(dir).join(format!("*.{}", ext));
            let entries = glob::glob(&pattern.to_string_lossy())
                .map_err(|e| ProbeError::Config(format!("Invalid POC directory pattern: {}", e)))?;
            found.extend(entries.filter_map(Result::ok));
        }
        found.sort();
        files.extend(found);
    }

    let mut unique = Vec::with_capacity(files.len());
    for file in files {
        if !unique.contains(&file) {
            unique.push(file);
        }
    }
    Ok(unique)
}
