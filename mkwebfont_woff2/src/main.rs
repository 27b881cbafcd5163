mod join_set;

use crate::join_set::JoinSet;
use anyhow::*;
use clap::{Parser, Subcommand};
use mkwebfont_woff2::{config::EncodeSettings, Tag, Woff2Header, Woff2Params};
use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, info_span};

/// Converts fonts to and from WOFF2.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// The subcommand to invoke.
    #[command(subcommand)]
    command: Commands,

    /// Whether to enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encodes TrueType and OpenType fonts or font collections as WOFF2.
    Encode(EncodeArgs),

    /// Decodes WOFF2 files back into TrueType or OpenType fonts.
    Decode(FileArgs),

    /// Prints the header and extended metadata of WOFF2 files.
    Info(InfoArgs),
}

#[derive(clap::Args, Debug)]
struct FileArgs {
    /// The files to convert.
    files: Vec<PathBuf>,

    /// The directory to write converted files to. Defaults to the directory of each input.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct EncodeArgs {
    #[command(flatten)]
    files: FileArgs,

    /// A TOML file containing encoder settings.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// The brotli quality level, from 0 to 11. Overrides the configuration.
    #[arg(short, long)]
    quality: Option<u32>,

    /// Disables the glyf, loca and hmtx transforms.
    #[arg(long)]
    no_transforms: bool,

    /// A file of extended metadata to embed in the output.
    #[arg(short, long)]
    metadata: Option<PathBuf>,
}

#[derive(clap::Args, Debug)]
struct InfoArgs {
    /// The WOFF2 files to inspect.
    files: Vec<PathBuf>,
}

fn load_params(args: &EncodeArgs) -> Result<Woff2Params> {
    let config = match &args.config {
        Some(path) => Some(
            std::fs::read_to_string(path)
                .with_context(|| format!("Could not read configuration: {}", path.display()))?,
        ),
        None => None,
    };
    let mut settings = EncodeSettings::load(config.as_deref())?;
    if let Some(quality) = args.quality {
        settings.brotli_quality = quality;
    }
    if args.no_transforms {
        settings.allow_transforms = false;
    }
    if let Some(metadata) = &args.metadata {
        settings.metadata_file = Some(metadata.clone());
    }
    settings.to_params()
}

fn output_path(input: &Path, output_dir: Option<&Path>, extension: &str) -> Result<PathBuf> {
    let Some(stem) = input.file_stem() else {
        bail!("Invalid file name: {}", input.display());
    };
    let mut path = match output_dir {
        Some(dir) => dir.to_path_buf(),
        None => input.parent().map(Path::to_path_buf).unwrap_or_default(),
    };
    path.push(stem);
    path.set_extension(extension);
    Ok(path)
}

fn read_input(input: &Path) -> Result<Vec<u8>> {
    std::fs::read(input).with_context(|| format!("Could not read file: {}", input.display()))
}

fn encode_file(input: &Path, output_dir: Option<&Path>, params: &Woff2Params) -> Result<()> {
    let font = read_input(input)?;
    let woff2 = mkwebfont_woff2::compress(&font, params)
        .with_context(|| format!("Could not encode font: {}", input.display()))?;

    let target = output_path(input, output_dir, "woff2")?;
    std::fs::write(&target, &woff2)?;
    info!("Wrote {} ({} -> {} bytes)", target.display(), font.len(), woff2.len());
    Ok(())
}

fn decode_file(input: &Path, output_dir: Option<&Path>) -> Result<()> {
    let woff2 = read_input(input)?;
    let font = mkwebfont_woff2::decompress(&woff2)
        .with_context(|| format!("Could not decode WOFF2 file: {}", input.display()))?;

    let extension = match font.get(..4) {
        Some(b"OTTO") => "otf",
        Some(b"ttcf") => "ttc",
        _ => "ttf",
    };
    let target = output_path(input, output_dir, extension)?;
    std::fs::write(&target, &font)?;
    info!("Wrote {} ({} -> {} bytes)", target.display(), woff2.len(), font.len());
    Ok(())
}

fn print_info(input: &Path) -> Result<()> {
    let woff2 = read_input(input)?;
    let header = Woff2Header::read(&woff2)?;
    let final_size = mkwebfont_woff2::compute_woff2_final_size(&woff2)?;

    println!("{}:", input.display());
    println!("  flavor: {}", Tag::from_u32(header.flavor));
    println!("  tables: {}", header.num_tables);
    println!("  compressed size: {} bytes", header.total_compressed_size);
    println!("  decoded size: {final_size} bytes");
    if let Some(metadata) = mkwebfont_woff2::read_extended_metadata(&woff2)? {
        println!("  metadata:\n{}", String::from_utf8_lossy(&metadata));
    }
    Ok(())
}

async fn process_files(
    files: &[PathBuf],
    func: impl Fn(&Path) -> Result<()> + Clone + Send + 'static,
) -> Result<()> {
    let mut joins = JoinSet::new();
    for file in files {
        let span = info_span!("convert", file = %file.display());
        let _enter = span.enter();

        let file = file.clone();
        let func = func.clone();
        joins.spawn_blocking(move || func(&file));
    }
    joins.join().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(if args.verbose { "mkwebfont_woff2=debug,info" } else { "info" })
        .with_writer(io::stderr)
        .init();

    match args.command {
        Commands::Encode(args) => {
            let params = Arc::new(load_params(&args)?);
            let output = args.files.output.clone();
            process_files(&args.files.files, move |x| encode_file(x, output.as_deref(), &params))
                .await
        }
        Commands::Decode(args) => {
            let output = args.output.clone();
            process_files(&args.files, move |x| decode_file(x, output.as_deref())).await
        }
        Commands::Info(args) => {
            for file in &args.files {
                print_info(file)?;
            }
            Ok(())
        }
    }
}
