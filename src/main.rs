//! Command-line front-end: search places, resolve AOIs, fetch and import
//! geometries, or run the HTTP API.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use structopt::StructOpt;

use prettymap::config::MapConfig;
use prettymap::models::{AoiShape, LocationParser, RenderConfig};
use prettymap::pipeline::MapRequest;
use prettymap::service::MapService;
use prettymap::{export, logging, web};

#[derive(StructOpt)]
#[structopt(name = "prettymap", about = "OpenStreetMap geometry for map posters")]
struct Opt {
    /// Configuration file, instead of the default location
    #[structopt(long, parse(from_os_str))]
    config: Option<PathBuf>,
    #[structopt(subcommand)]
    command: Command,
}

#[derive(StructOpt)]
enum Command {
    /// List places matching a query, best match first
    Search {
        query: String,
        /// Maximum number of results (1-20)
        #[structopt(long, default_value = "5")]
        limit: usize,
    },
    /// Resolve a location to an area of interest and print its bounds
    Aoi {
        /// Address or "lat,lon"
        #[structopt(long)]
        location: String,
        /// Radius in metres (100-2000)
        #[structopt(long)]
        radius: Option<u32>,
        /// Square instead of circular area
        #[structopt(long)]
        rectangular: bool,
    },
    /// Fetch the map geometries around a location as GeoJSON
    Fetch {
        #[structopt(long)]
        location: String,
        #[structopt(long)]
        radius: Option<u32>,
        #[structopt(long)]
        rectangular: bool,
        /// Output file; stdout when omitted
        #[structopt(long, parse(from_os_str))]
        output: Option<PathBuf>,
    },
    /// Load a KML, GeoJSON or zipped Shapefile boundary and summarise it
    Import {
        #[structopt(parse(from_os_str))]
        path: PathBuf,
        /// Write the boundary back out as GeoJSON
        #[structopt(long, parse(from_os_str))]
        output: Option<PathBuf>,
    },
    /// Serve the JSON API
    Serve {
        #[structopt(long)]
        port: Option<u16>,
    },
}

fn shape(rectangular: bool, config: &MapConfig) -> AoiShape {
    AoiShape::from_rectangular(rectangular || config.defaults.rectangular)
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::from_args();
    let mut config =
        MapConfig::load_from_path(opt.config).context("Failed to load configuration")?;
    logging::init(&config.logging)?;

    let service = Arc::new(MapService::from_config(&config)?);

    match opt.command {
        Command::Search { query, limit } => {
            let results = service.search(&query, limit).await;
            if results.is_empty() {
                println!("No places found for '{query}'");
            }
            for result in results {
                println!(
                    "{}  [{}]  ({:.5}, {:.5})  importance {:.3}",
                    result.label,
                    result.type_label(),
                    result.latitude,
                    result.longitude,
                    result.importance
                );
            }
        }
        Command::Aoi {
            location,
            radius,
            rectangular,
        } => {
            let query = LocationParser::parse(&location);
            let radius_m = radius.unwrap_or(config.defaults.radius_m);
            let aoi = service
                .resolve_aoi(&query, radius_m, shape(rectangular, &config))
                .await?;

            let summary = serde_json::json!({
                "center": aoi.center(),
                "radius_m": aoi.radius_m(),
                "shape": aoi.shape(),
                "bounds": aoi.bounds(),
                "projected_bounds": aoi.projected_bounds(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Fetch {
            location,
            radius,
            rectangular,
            output,
        } => {
            let render_config = RenderConfig {
                shape: shape(rectangular, &config),
                ..RenderConfig::default()
            };
            let request = MapRequest::for_location(
                LocationParser::parse(&location),
                radius.unwrap_or(config.defaults.radius_m),
                render_config,
            );
            let map = service.prepare(&request).await?;
            let geojson = export::export_geojson(&map.geometries)?;

            match output {
                Some(path) => {
                    std::fs::write(&path, geojson)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    eprintln!("Wrote {} features to {}", map.geometries.len(), path.display());
                }
                None => println!("{}", String::from_utf8_lossy(&geojson)),
            }
        }
        Command::Import { path, output } => {
            let bytes = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let file_name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let boundary = service.import_boundary(&file_name, &bytes)?;
            let geometries = boundary.geometries();

            println!("{}: {} features", file_name, geometries.len());
            for (class, count) in geometries.class_counts() {
                println!("  {:<10} {}", class.as_str(), count);
            }
            println!("Bounds: {:?}", boundary.bounds().as_tuple());

            if let Some(out) = output {
                std::fs::write(&out, export::export_geojson(geometries)?)
                    .with_context(|| format!("Failed to write {}", out.display()))?;
            }
        }
        Command::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            web::run(service, &config.server)
                .await
                .context("Web server failed")?;
        }
    }

    Ok(())
}
