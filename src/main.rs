use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use dsasim::core::db::{ScanDb, ScanRecord};
use dsasim::core::store::ArtifactStore;
use dsasim::{OutputFormat, ScanService, ServiceConfig, SubtractionParams, SubtractionPipeline};

#[derive(Parser)]
#[command(name = "dsasim")]
#[command(about = "Digital subtraction and vessel edge maps from mask/contrast image pairs")]
struct Cli {
    /// Enable verbose (debug level) logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// JSON file with pipeline parameters (missing fields keep defaults)
    #[arg(long, value_name = "FILE", global = true)]
    params: Option<PathBuf>,

    /// Encode outputs as PNG instead of JPEG
    #[arg(long, global = true)]
    png: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the pipeline on two files and write the outputs to a directory
    Process {
        #[arg(value_name = "MASK")]
        mask: PathBuf,

        #[arg(value_name = "CONTRAST")]
        contrast: PathBuf,

        /// Directory for subtracted_result and vessels_edges
        #[arg(long, value_name = "DIR")]
        out_dir: PathBuf,

        /// Save every intermediate image to this directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },
    /// Process an upload for an owner and record the scan
    Upload {
        #[command(flatten)]
        store: StoreArgs,

        #[arg(long, value_name = "FILE")]
        mask: PathBuf,

        #[arg(long, value_name = "FILE")]
        contrast: PathBuf,
    },
    /// Rerun the pipeline on the owner's retained mask and contrast
    Reprocess {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Show the owner's latest scan if all of its files are present
    Latest {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// List all scans of the owner, newest first
    History {
        #[command(flatten)]
        store: StoreArgs,
    },
    /// Delete processed results, keeping mask and contrast images
    Clear {
        #[command(flatten)]
        store: StoreArgs,
    },
}

#[derive(Args)]
struct StoreArgs {
    /// Owner the scans belong to
    #[arg(long)]
    owner: i64,

    /// Directory holding the scan database and artifacts
    #[arg(long, value_name = "DIR", default_value = "dsa-data")]
    data_dir: PathBuf,

    /// Maximum concurrent pipeline runs
    #[arg(long)]
    workers: Option<usize>,

    /// Per-run timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

fn load_params(cli: &Cli) -> anyhow::Result<SubtractionParams> {
    let mut params = match &cli.params {
        Some(path) => SubtractionParams::from_json_file(path)?,
        None => SubtractionParams::default(),
    };
    if cli.png {
        params.output = OutputFormat::Png;
    }
    Ok(params)
}

async fn open_service(args: &StoreArgs, pipeline: SubtractionPipeline) -> anyhow::Result<ScanService> {
    let db = ScanDb::open(args.data_dir.join("scans.db")).await?;
    let store = ArtifactStore::new(args.data_dir.join("results"), pipeline.params().output)?;
    let mut config = ServiceConfig {
        timeout: Duration::from_secs(args.timeout_secs),
        ..ServiceConfig::default()
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    Ok(ScanService::new(pipeline, db, store, config))
}

fn print_scan(scan: &ScanRecord, store: &ArtifactStore) {
    println!("Scan {} ({})", scan.id, scan.created_at);
    println!("  mask:       {}", store.path_of(&scan.mask_ref).display());
    println!("  contrast:   {}", store.path_of(&scan.contrast_ref).display());
    match (&scan.result_ref, &scan.edge_ref) {
        (Some(result), Some(edges)) => {
            println!("  subtracted: {}", store.path_of(result).display());
            println!("  edges:      {}", store.path_of(edges).display());
        }
        _ => println!("  results cleared"),
    }
}

fn read_input(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    dsasim::init_tracing(if cli.verbose { "debug" } else { "info" });

    let params = load_params(&cli)?;
    let pipeline = SubtractionPipeline::new(params)?;

    match &cli.command {
        Command::Process {
            mask,
            contrast,
            out_dir,
            debug_out,
        } => {
            let pipeline = match debug_out {
                Some(dir) => pipeline.with_debug(dir)?,
                None => pipeline,
            };
            let result = pipeline.run(&read_input(mask)?, &read_input(contrast)?)?;

            std::fs::create_dir_all(out_dir)
                .with_context(|| format!("Failed to create {:?}", out_dir))?;
            let ext = pipeline.params().output.extension();
            let result_path = out_dir.join(format!("subtracted_result.{}", ext));
            let edge_path = out_dir.join(format!("vessels_edges.{}", ext));
            std::fs::write(&result_path, &result.subtracted)
                .with_context(|| format!("Failed to write {:?}", result_path))?;
            std::fs::write(&edge_path, &result.edges)
                .with_context(|| format!("Failed to write {:?}", edge_path))?;

            println!("Subtracted image: {}", result_path.display());
            println!("Edge map:         {}", edge_path.display());
        }
        Command::Upload {
            store,
            mask,
            contrast,
        } => {
            let service = open_service(store, pipeline).await?;
            let scan = service
                .upload(store.owner, read_input(mask)?, read_input(contrast)?)
                .await?;
            println!("DSA simulation completed!");
            print_scan(&scan, service.store());
        }
        Command::Reprocess { store } => {
            let service = open_service(store, pipeline).await?;
            let scan = service.reprocess(store.owner).await?;
            print_scan(&scan, service.store());
        }
        Command::Latest { store } => {
            let service = open_service(store, pipeline).await?;
            match service.latest_complete(store.owner).await? {
                Some(scan) => print_scan(&scan, service.store()),
                None => println!("No complete scan for owner {}", store.owner),
            }
        }
        Command::History { store } => {
            let service = open_service(store, pipeline).await?;
            let scans = service.history(store.owner).await?;
            println!("{} scan(s) for owner {}", scans.len(), store.owner);
            for scan in &scans {
                print_scan(scan, service.store());
            }
        }
        Command::Clear { store } => {
            let service = open_service(store, pipeline).await?;
            let cleared = service.clear_results(store.owner).await?;
            println!(
                "Processed DSA results cleared ({} scan(s))! Original mask and contrast images are kept.",
                cleared
            );
        }
    }

    Ok(())
}
