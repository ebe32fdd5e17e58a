use anyhow::Result;
use clap::{Parser, Subcommand};
use epc_batch::{BatchConfig, BatchPipeline};
use epc_clean::{CleanConfig, CleanPipeline};

#[derive(Debug, Parser)]
#[command(name = "epc-cli")]
#[command(about = "Enterprise prompt catalog pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Filter and enrich the raw prompt catalog
    Clean,
    /// Slice the curated catalog into upload batch files
    Batch,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Clean) {
        Commands::Clean => {
            let pipeline = CleanPipeline::new(CleanConfig::default())?;
            let summary = pipeline.run()?;
            println!(
                "clean complete: rows={} unique={} accepted={} devs={} tagged={} output={}",
                summary.total_rows,
                summary.unique_titles,
                summary.accepted,
                summary.dev_count,
                summary.tagged_count,
                summary.output_csv.display()
            );
            for (scenario, count) in &summary.scenario_counts {
                println!("  {scenario}: {count}");
            }
            println!("stats: {}", summary.stats_json.display());
        }
        Commands::Batch => {
            let summary = BatchPipeline::new(BatchConfig::default()).run()?;
            let total = summary.batches.len();
            for (index, batch) in summary.batches.iter().enumerate() {
                println!(
                    "batch {}/{} ready: {} pages -> {}",
                    index + 1,
                    total,
                    batch.pages,
                    batch.path.display()
                );
            }
            println!(
                "batch complete: records={} batches={} dir={}",
                summary.records,
                total,
                summary.output_dir.display()
            );
        }
    }

    Ok(())
}
