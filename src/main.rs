//! scn-reader - command line tools for Leica SCN slides.
//!
//! Three subcommands cover the common workflows: `info` dumps metadata,
//! `region` paints a pixel region to JPEG, `macro` extracts the macro
//! overview image.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scn_reader::{
    config::{DEFAULT_CACHE_BLOCKS, DEFAULT_MAX_HANDLES},
    io::DEFAULT_BLOCK_SIZE,
    tile::{encode_jpeg, DEFAULT_JPEG_QUALITY, DEFAULT_TILE_CACHE_CAPACITY},
    ReaderOptions, RegionSurface, ScnReader, SlideReader,
};

/// Command line tools for Leica SCN whole slide images.
#[derive(Parser, Debug)]
#[command(name = "scn-reader")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(flatten)]
    resources: ResourceArgs,
}

/// Resource sizing, shared by all subcommands.
#[derive(Args, Debug)]
struct ResourceArgs {
    /// Maximum concurrently open TIFF handles.
    #[arg(long, global = true, default_value_t = DEFAULT_MAX_HANDLES, env = "SCN_MAX_HANDLES")]
    max_handles: usize,

    /// Block size in bytes for the per-handle block cache.
    #[arg(long, global = true, default_value_t = DEFAULT_BLOCK_SIZE, env = "SCN_BLOCK_SIZE")]
    block_size: usize,

    /// Number of blocks cached per handle.
    #[arg(long, global = true, default_value_t = DEFAULT_CACHE_BLOCKS, env = "SCN_CACHE_BLOCKS")]
    cache_blocks: usize,

    /// Decoded-tile cache capacity in bytes.
    #[arg(long, global = true, default_value_t = DEFAULT_TILE_CACHE_CAPACITY, env = "SCN_CACHE_TILES")]
    cache_tiles: usize,
}

impl ResourceArgs {
    fn to_options(&self) -> ReaderOptions {
        ReaderOptions {
            max_handles: self.max_handles,
            block_size: self.block_size,
            cache_blocks: self.cache_blocks,
            cache_tiles: self.cache_tiles,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print slide metadata: properties, levels, associated images.
    Info {
        /// The slide file.
        file: PathBuf,

        /// Emit JSON instead of a table.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Paint a pixel region and write it as JPEG.
    Region {
        /// The slide file.
        file: PathBuf,

        /// X of the region's top-left corner, in level-0 pixels.
        #[arg(short, long)]
        x: i64,

        /// Y of the region's top-left corner, in level-0 pixels.
        #[arg(short, long)]
        y: i64,

        /// Pyramid level to read from.
        #[arg(short, long, default_value_t = 0)]
        level: usize,

        /// Region width in pixels of the target level.
        #[arg(short = 'W', long)]
        width: u32,

        /// Region height in pixels of the target level.
        #[arg(short = 'H', long)]
        height: u32,

        /// Output file.
        #[arg(short, long)]
        output: PathBuf,

        /// JPEG quality (1-100).
        #[arg(short, long, default_value_t = DEFAULT_JPEG_QUALITY)]
        quality: u8,
    },

    /// Extract the macro overview image as JPEG.
    Macro {
        /// The slide file.
        file: PathBuf,

        /// Output file.
        #[arg(short, long)]
        output: PathBuf,

        /// JPEG quality (1-100).
        #[arg(short, long, default_value_t = DEFAULT_JPEG_QUALITY)]
        quality: u8,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = cli.resources.to_options();
    let result = match cli.command {
        Command::Info { file, json } => run_info(file, json, options).await,
        Command::Region {
            file,
            x,
            y,
            level,
            width,
            height,
            output,
            quality,
        } => run_region(file, x, y, level, width, height, output, quality, options).await,
        Command::Macro {
            file,
            output,
            quality,
        } => run_macro(file, output, quality, options).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "scn_reader=debug"
    } else {
        "scn_reader=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Info command
// =============================================================================

#[derive(Serialize)]
struct SlideSummary {
    slide: String,
    levels: Vec<scn_reader::LevelInfo>,
    associated_images: Vec<scn_reader::AssociatedImageInfo>,
    properties: Vec<(String, String)>,
}

async fn run_info(file: PathBuf, json: bool, options: ReaderOptions) -> Result<(), String> {
    let reader = ScnReader::open_with_options(&file, options)
        .await
        .map_err(|e| e.to_string())?;

    let summary = SlideSummary {
        slide: reader.slide_id().to_string(),
        levels: (0..reader.level_count())
            .filter_map(|k| reader.level_info(k))
            .collect(),
        associated_images: reader.associated_images(),
        properties: reader
            .properties()
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
    };

    if json {
        let rendered = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        println!("{}", rendered);
        return Ok(());
    }

    println!("Slide: {}", summary.slide);
    println!();
    println!("Levels:");
    for (k, level) in summary.levels.iter().enumerate() {
        println!(
            "  {}: {}x{}  downsample {:.4}  areas {}",
            k, level.width, level.height, level.downsample, level.areas
        );
    }

    if !summary.associated_images.is_empty() {
        println!();
        println!("Associated images:");
        for image in &summary.associated_images {
            println!("  {}: {}x{}", image.name, image.width, image.height);
        }
    }

    println!();
    println!("Properties:");
    for (name, value) in &summary.properties {
        println!("  {} = {}", name, value);
    }

    Ok(())
}

// =============================================================================
// Region and macro commands
// =============================================================================

#[allow(clippy::too_many_arguments)]
async fn run_region(
    file: PathBuf,
    x: i64,
    y: i64,
    level: usize,
    width: u32,
    height: u32,
    output: PathBuf,
    quality: u8,
    options: ReaderOptions,
) -> Result<(), String> {
    let reader = ScnReader::open_with_options(&file, options)
        .await
        .map_err(|e| e.to_string())?;

    let mut surface = RegionSurface::new(width, height);
    reader
        .paint_region(&mut surface, x, y, level, width, height)
        .await
        .map_err(|e| e.to_string())?;

    write_jpeg(&surface, &output, quality).await?;
    println!("Wrote {}x{} region to {}", width, height, output.display());
    Ok(())
}

async fn run_macro(
    file: PathBuf,
    output: PathBuf,
    quality: u8,
    options: ReaderOptions,
) -> Result<(), String> {
    let reader = ScnReader::open_with_options(&file, options)
        .await
        .map_err(|e| e.to_string())?;

    let surface = reader
        .read_associated_image("macro")
        .await
        .map_err(|e| e.to_string())?;

    write_jpeg(&surface, &output, quality).await?;
    println!(
        "Wrote {}x{} macro image to {}",
        surface.width(),
        surface.height(),
        output.display()
    );
    Ok(())
}

async fn write_jpeg(surface: &RegionSurface, output: &PathBuf, quality: u8) -> Result<(), String> {
    let jpeg = encode_jpeg(surface, quality).map_err(|e| e.to_string())?;
    tokio::fs::write(output, jpeg)
        .await
        .map_err(|e| format!("Couldn't write {}: {}", output.display(), e))
}
