use anyhow::{Context, Result, anyhow};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::Path;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{Command, get_args};
use surge_rs::config::{self, BatchConfig};
use surge_rs::io::registry::JobRegistry;
use surge_rs::io::track_file;
use surge_rs::job::storm_time_offset;
use surge_rs::planner::{self, BatchPlanner};
use surge_rs::scheduler::{CommandScheduler, DryRunScheduler, Scheduler};
use surge_rs::surge;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("surge_rs=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = get_args();
    match args.command {
        Command::Plan { total, quota } => {
            let chunks = planner::plan(total, quota)?;
            println!("{} storms in {} chunks of at most {}", total, chunks.len(), quota);
            for chunk in &chunks {
                println!("  [{}, {})", chunk.first_storm, chunk.last_storm);
            }
        }
        Command::Generate { config } => {
            let batch = config::load_from_file(&config)
                .with_context(|| format!("Failed to load configuration: {:?}", config))?;
            generate(&batch)?;
        }
        Command::Submit {
            config,
            restart,
            dry_run,
            first,
            last,
        } => {
            let mut batch = config::load_from_file(&config)
                .with_context(|| format!("Failed to load configuration: {:?}", config))?;
            if restart {
                batch.params.restart = true;
            }
            submit(&batch, dry_run, first, last)?;
        }
        Command::MaxSurge {
            output_dir,
            base_path,
            job_name,
            prefix,
            gauges,
        } => {
            let surges = surge::extract(&output_dir, gauges)
                .with_context(|| format!("Failed to read gauges in {:?}", output_dir))?;
            let path = surge::max_surge_path(&base_path, &job_name, &prefix);
            surge::write_max_surge(&path, &surges)?;
            println!("Max surge for {} gauges saved to {}", surges.len(), path.display());
        }
    }
    Ok(())
}

fn generate(batch: &BatchConfig) -> Result<()> {
    let source = batch
        .source
        .as_ref()
        .ok_or_else(|| anyhow!("configuration has no [ensemble] section"))?;
    let mut ensemble = source.open().context("Failed to open ensemble")?;
    let tracks_dir = &batch.params.tracks_dir;
    fs::create_dir_all(tracks_dir)
        .with_context(|| format!("Failed to create tracks directory: {:?}", tracks_dir))?;

    let pb = ProgressBar::new(ensemble.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} storms ({eta})")?
            .progress_chars("#>-"),
    );

    println!("Generating {} storms into {}", ensemble.len(), tracks_dir.display());
    for chunk in planner::plan(ensemble.len(), batch.quota)? {
        for track in ensemble.tracks_for(&chunk)? {
            let offset = match &batch.params.region {
                Some(region) => storm_time_offset(&track, &**region),
                None => track.timestamps.first().copied(),
            }
            .ok_or_else(|| anyhow!("track {} has no samples", track.id))?;
            let path = tracks_dir.join(format!("{}.storm", track.id));
            track_file::write_geoclaw(&path, &track, offset)?;
            pb.inc(1);
        }
    }
    pb.finish();

    println!("\nEnsemble generation complete.");
    Ok(())
}

fn submit(
    batch: &BatchConfig,
    dry_run: bool,
    first: Option<usize>,
    last: Option<usize>,
) -> Result<()> {
    let source = batch
        .source
        .as_ref()
        .ok_or_else(|| anyhow!("configuration has no [ensemble] section"))?;
    let mut ensemble = source.open().context("Failed to open ensemble")?;

    let first = first.unwrap_or(0);
    let last = last.unwrap_or(ensemble.len()).min(ensemble.len());
    if first > last {
        return Err(anyhow!("empty storm range [{}, {})", first, last));
    }

    let registry = batch
        .registry
        .as_deref()
        .map(open_registry)
        .transpose()?;

    let mut scheduler: Box<dyn Scheduler> = if dry_run {
        Box::new(DryRunScheduler::default())
    } else {
        Box::new(CommandScheduler::new(&batch.submit_command)?)
    };

    println!("\nBatch Configuration:");
    println!("  Base path: {}", batch.controller.base_path.display());
    println!("  Storms: {} to {}", first, last);
    println!("  Quota: {}", batch.quota);
    println!("  Restart: {}", batch.params.restart);
    println!("  Dry run: {}", dry_run);

    let planner = BatchPlanner {
        quota: batch.quota,
        params: &batch.params,
        options: &batch.controller,
        registry: registry.as_ref(),
    };
    let report = planner.run(&mut ensemble, first..last, scheduler.as_mut())?;

    for failure in &report.failures {
        eprintln!("  {} failed: {}", failure.prefix, failure.error);
    }
    println!(
        "\nSubmitted {} jobs, {} failed. Output under {}",
        report.submitted.len(),
        report.failures.len(),
        batch.controller.base_path.display()
    );
    Ok(())
}

fn open_registry(path: &Path) -> Result<JobRegistry> {
    JobRegistry::open(path).with_context(|| format!("Failed to open job registry: {:?}", path))
}
