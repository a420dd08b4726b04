//! Command-line entry point: segment a road network around incident records.
//!
//! Settings are layered: defaults, then an optional JSON config file, then
//! environment variables, then command-line flags.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::{error, info, LevelFilter};

use road_segmenter::{create_segments_tarball, get_segments, Crs, Result, SegmentConfig};

/// Split roads near incidents into intersection and plain segments.
#[derive(Parser, Debug)]
#[command(name = "segment-roads")]
#[command(about = "Split a road network into intersection and plain segments")]
struct Cli {
    /// Road network GeoJSON (LineString / MultiLineString features).
    #[arg(long)]
    roads: PathBuf,

    /// Incident CSV with x/y columns.
    #[arg(long)]
    records: PathBuf,

    /// EPSG code of the road network.
    #[arg(long)]
    srid: u32,

    /// Directory the segment file is written to.
    #[arg(long, default_value = "segments")]
    output_dir: PathBuf,

    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also pack the output directory into road_segments.tar.gz here.
    #[arg(long)]
    tarball: Option<PathBuf>,

    /// Radius of the buffer around each intersection.
    #[arg(long)]
    intersection_buffer_units: Option<f64>,

    /// Maximum length of a plain segment.
    #[arg(long)]
    max_line_units: Option<f64>,

    /// Radius of the buffer around each incident.
    #[arg(long)]
    match_tolerance: Option<f64>,

    /// Maximum tile width/height.
    #[arg(long)]
    tile_max_units: Option<f64>,

    /// CRS of the incident coordinates, e.g. epsg:4326.
    #[arg(long)]
    record_projection: Option<Crs>,

    /// Incident column holding x.
    #[arg(long)]
    record_col_x: Option<String>,

    /// Incident column holding y.
    #[arg(long)]
    record_col_y: Option<String>,

    /// Output file base name.
    #[arg(long)]
    output_name: Option<String>,

    /// Number of intersection workers (default: all cores).
    #[arg(long)]
    workers: Option<usize>,
}

impl Cli {
    fn load_config(&self) -> Result<SegmentConfig> {
        let base = match &self.config {
            Some(path) => SegmentConfig::from_json_file(path)?,
            None => SegmentConfig::default(),
        };
        let mut config = base.with_env_overrides(|key| std::env::var(key).ok())?;

        if let Some(v) = self.intersection_buffer_units {
            config.intersection_buffer_units = v;
        }
        if let Some(v) = self.max_line_units {
            config.max_line_units = v;
        }
        if let Some(v) = self.match_tolerance {
            config.match_tolerance = v;
        }
        if let Some(v) = self.tile_max_units {
            config.tile_max_units = v;
        }
        if let Some(v) = self.record_projection {
            config.record_projection = v;
        }
        if let Some(v) = &self.record_col_x {
            config.record_col_x = v.clone();
        }
        if let Some(v) = &self.record_col_y {
            config.record_col_y = v.clone();
        }
        if let Some(v) = &self.output_name {
            config.output_name = v.clone();
        }
        if self.workers.is_some() {
            config.worker_threads = self.workers;
        }

        config.validate()?;
        Ok(config)
    }

    fn run(&self) -> Result<()> {
        let config = self.load_config()?;
        let (output_path, stats) =
            get_segments(&self.roads, &self.records, self.srid, &self.output_dir, &config)?;
        info!("Segments written to {}", output_path.display());
        info!("Run statistics: {}", serde_json::to_string(&stats)?);

        if let Some(tar_dir) = &self.tarball {
            let tar_path = create_segments_tarball(&self.output_dir, tar_dir)?;
            info!("Archive written to {}", tar_path.display());
        }
        Ok(())
    }
}

fn init_logging() {
    let mut builder = pretty_env_logger::formatted_builder();
    match std::env::var("RUST_LOG") {
        Ok(filters) => {
            builder.parse_filters(&filters);
        }
        Err(_) => {
            builder.filter_level(LevelFilter::Info);
        }
    }
    builder.init();
}

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match cli.run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
