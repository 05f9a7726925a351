//! Edge CDN simulator - Main entry point.

use anyhow::Context;
use cdn_edge::cli::{Cli, Commands};
use cdn_edge::config::CdnConfig;
use cdn_edge::geo::GeoLocation;
use cdn_edge::origin::OriginRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    match cli.command {
        Commands::Simulate {
            output,
            seed,
            cache_size,
            time_scale,
            dev,
        } => {
            let mut config = match &cli.config {
                Some(path) => CdnConfig::from_file(path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None if dev => CdnConfig::development(),
                None => CdnConfig::reference(),
            };

            if let Some(seed) = seed {
                config.simulation.seed = seed;
            }
            if let Some(capacity) = cache_size {
                config.cache.capacity = capacity;
            }
            if let Some(scale) = time_scale {
                config.simulation.time_scale = scale;
            }
            if let Some(level) = cli.log_level {
                config.observability.log_level = level;
            }
            config.observability.json_logs |= cli.json_logs;
            config.validate()?;

            cdn_edge::observability::init(&config.observability)?;

            let report = cdn_edge::run(config).await?;

            if let Some(path) = output {
                report
                    .write_json_lines(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
                println!("Wrote {} records to {}", report.records.len(), path.display());
            }
            println!("{}", report.summary_table());
        }

        Commands::Discover { lat, lon } => {
            let config = match &cli.config {
                Some(path) => CdnConfig::from_file(path)?,
                None => CdnConfig::reference(),
            };

            let location = GeoLocation::new(lat, lon);
            if !location.is_valid() {
                anyhow::bail!("coordinates out of range: {}", location);
            }

            let origin = OriginRegistry::new(&config.origin, config.simulation.seed, 0.0);
            for edge in &config.edges {
                origin.register_edge(edge.clone());
            }

            let edge = origin.discover_edge(&location)?;
            println!(
                "{} -> {} at {} ({:.0} km)",
                location,
                edge,
                edge.location,
                location.distance_km(&edge.location)
            );
        }

        Commands::Version => {
            println!("cdn-sim v{}", env!("CARGO_PKG_VERSION"));
            println!("Edge CDN core: adaptive replacement caching and load-aware edge selection");
        }
    }

    Ok(())
}
