use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use district_choropleth::aggregate::{
    aggregate, benefit_range, rank_districts, state_totals, AggregateError,
};
use district_choropleth::config::AppConfig;
use district_choropleth::data::load_inputs;
use district_choropleth::join::{millions, round_to, HoverLabels};
use district_choropleth::render::{build_payload, DisplayOptions};
use district_choropleth::server;
use district_choropleth::types::GeometrySource;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the choropleth payload for one geometry source as JSON
    Render {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        /// Geometry to join against (defaults to the configured source)
        #[arg(short, long, value_enum)]
        source: Option<GeometrySource>,
        /// Compact layout
        #[arg(long)]
        mobile: bool,
        #[arg(short, long, value_name = "FILE", default_value = "choropleth.json")]
        output: PathBuf,
    },
    /// Print summary statistics, rankings and state totals
    Summary {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
        #[arg(long, default_value_t = 10)]
        top: usize,
    },
    /// Serve the map payload over HTTP
    Serve {
        #[arg(short, long, value_name = "FILE", default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Render {
            config,
            source,
            mobile,
            output,
        } => {
            let app_config = AppConfig::load_from_file(config)?;
            let inputs = load_inputs(&app_config.input).await?;
            let source = source.unwrap_or(app_config.display.default_source);

            let options = DisplayOptions {
                compact: *mobile || app_config.display.mobile,
                labels: hover_labels(&app_config),
            };
            let pass = build_payload(inputs.geometry(source), &inputs.table, &options);

            let json = serde_json::to_string(&pass.payload)?;
            std::fs::write(output, json)
                .with_context(|| format!("Failed to write payload: {:?}", output))?;

            println!(
                "Wrote {} geometry payload to {:?}: {} features, {} matched, {} without data, {} unkeyed",
                source,
                output,
                pass.report.features,
                pass.report.matched,
                pass.report.unmatched.len(),
                pass.report.unkeyed
            );
        }
        Commands::Summary { config, top } => {
            let app_config = AppConfig::load_from_file(config)?;
            let inputs = load_inputs(&app_config.input).await?;
            let table = &inputs.table;

            match aggregate(table) {
                Ok(stats) => {
                    println!("=== Summary Statistics ===");
                    for card in stats.cards(&hover_labels(&app_config)) {
                        println!("{}: {}", card.label, card.value);
                    }
                    println!(
                        "Average per District: ${:.1} million",
                        round_to(millions(stats.avg_benefits), 1)
                    );
                }
                Err(AggregateError::NoData) => {
                    println!("No district data to summarize.");
                    return Ok(());
                }
            }
            if !table.rejected.is_empty() {
                println!("Rejected rows: {}", table.rejected.len());
            }

            if let Some((low, high)) = benefit_range(table) {
                println!(
                    "Range: ${:.1}M - ${:.1}M",
                    round_to(millions(low.total_benefits), 1),
                    round_to(millions(high.total_benefits), 1)
                );
            }
            let rankings = rank_districts(table, *top);
            println!("\nTop {} Districts by {}:", top, app_config.display.benefit_label);
            for d in &rankings.top {
                println!("  {}  ${:.1}M", d.key, round_to(millions(d.total_benefits), 1));
            }
            println!("\nBottom {} Districts by {}:", top, app_config.display.benefit_label);
            for d in &rankings.bottom {
                println!("  {}  ${:.1}M", d.key, round_to(millions(d.total_benefits), 1));
            }

            println!("\nTop {} States:", top);
            for s in state_totals(table).iter().take(*top) {
                println!("  {:<16} ${:.1}B", s.state_name, round_to(s.total_benefits / 1e9, 1));
            }
        }
        Commands::Serve { config } => {
            let app_config = AppConfig::load_from_file(config)?;
            server::start_server(app_config).await?;
        }
    }

    Ok(())
}

fn hover_labels(config: &AppConfig) -> HoverLabels {
    HoverLabels {
        benefits: config.display.benefit_label.clone(),
        recipients: config.display.recipient_label.clone(),
    }
}
