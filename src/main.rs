//! Entry point for the aqgrid application.
//! Handles CLI parsing, configuration and logging, then runs the aggregation
//! pipeline or one of the data directory commands.

use anyhow::{Context, Result};
use aqgrid::cli::Args;
use aqgrid::config::RunConfig;
use aqgrid::grouping::GroupingMode;
use aqgrid::parallel::get_parallel_info;
use aqgrid::pipeline::RegionalAggregator;
use aqgrid::raster::{CachedProvider, TimeSelection};
use aqgrid::report::{print_table, write_report};
use clap::Parser;
use log::LevelFilter;

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = RunConfig::from_env().context("invalid environment configuration")?;
    if let Some(dir) = &args.data_dir {
        config.data_dir.clone_from(dir);
    }
    if args.variable.is_some() {
        config.variable.clone_from(&args.variable);
    }
    if args.threads.is_some() {
        config.threads = args.threads;
    }
    get_parallel_info().log_info();

    let provider = config.provider();

    if args.list_cache {
        let files = provider.list_cached_files()?;
        println!("\n Cached files in {}", config.data_dir.display());
        println!("==============================");
        if files.is_empty() {
            println!("   (none)");
        }
        for file in files {
            println!("   {} ({} bytes)", file.name, file.size_bytes);
        }
        return Ok(());
    }

    if args.clear_cache {
        let removed = provider.clear_cache()?;
        println!("✅ Removed {removed} file(s) from {}", config.data_dir.display());
        return Ok(());
    }

    let (Some(regions), Some(year)) = (&args.regions, args.year) else {
        anyhow::bail!("--regions and --year are required");
    };
    let selection = TimeSelection::new(year, args.month)?;
    let mode = GroupingMode::from_options(&args.group_by, args.combine);

    let aggregator = RegionalAggregator::with_parallel(
        CachedProvider::new(provider, config.cache_capacity),
        config.parallel(),
    );
    let report = aggregator
        .aggregate(regions, selection, &mode)
        .with_context(|| format!("aggregation over {} failed", regions.display()))?
        .with_id_field(args.id_field.clone());

    if let Some(output) = &args.output {
        write_report(&report, output)
            .with_context(|| format!("failed to write {}", output.display()))?;
        println!("✅ Saved result to {}", output.display());
        for failed in &report.failed {
            println!("⚠ Region #{} {} failed: {}", failed.index, failed.key, failed.error);
        }
    } else {
        print_table(&report);
    }

    Ok(())
}
