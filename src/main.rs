use clap::{Parser, Subcommand};
use listing_gallery::gallery::{Gallery, GalleryError};
use listing_gallery::imaging::{HEIF_DECODING, RustBackend};
use listing_gallery::ingest::{self, FileOutcome, IngestEvent};
use listing_gallery::preview::PreviewTracker;
use listing_gallery::reconcile::{self, ListingRef};
use listing_gallery::storage::{FsStorage, StorageBackend};
use listing_gallery::types::{SourceFile, Tier};
use listing_gallery::{config, formats, output, render};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::thread::JoinHandle;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use walkdir::WalkDir;

/// Seller tier flag shared by commands that process images.
#[derive(clap::Args, Clone)]
struct TierArgs {
    /// Featured listing: more photos, larger byte budget
    #[arg(long)]
    featured: bool,
}

#[derive(Parser)]
#[command(name = "listing-gallery")]
#[command(about = "Photo ingestion and gallery publishing for classified listings")]
#[command(long_about = "\
Photo ingestion and gallery publishing for classified listings

Selected photos are checked, converted from HEIC (builds with the `heif`
feature; otherwise HEIC files are kept as-is), compressed to the tier's
byte budget and kept in selection order. The first photo is the main photo.
Publishing uploads new photos, saves the order, and deletes removed photos
in one step: if any upload fails, nothing is saved.

Storage layout:

  storage/
  ├── objects/<owner>/<listing>/<sha256>.webp   # Content-addressed photos
  └── listings/<listing>/gallery.json           # Ordered gallery rows

Positions are 1-based as shown by 'show'. Position 1 is the main photo.

Run 'listing-gallery gen-config' to generate a documented media.toml.")]
#[command(version)]
struct Cli {
    /// Config file (defaults to ./media.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage root directory (overrides `storage.root`)
    #[arg(long, global = true)]
    storage: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run photos through ingestion without touching any gallery
    Check {
        #[command(flatten)]
        tier: TierArgs,
        /// Files or directories of photos
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Add, remove or reorder photos and publish the listing gallery
    Publish {
        /// Seller account the photos are stored under
        #[arg(long, default_value = "local")]
        owner: String,
        #[arg(long)]
        listing: String,
        #[command(flatten)]
        tier: TierArgs,
        /// Remove the photo at this position (repeatable)
        #[arg(long = "remove", value_name = "POS")]
        remove: Vec<usize>,
        /// Make the photo at this position the main photo
        #[arg(long = "main", value_name = "POS")]
        main: Option<usize>,
        /// Photos to add, in order (directories are walked by file name)
        files: Vec<PathBuf>,
    },
    /// Show the published gallery of a listing
    Show {
        #[arg(long)]
        listing: String,
    },
    /// Render an HTML preview of a published gallery
    Preview {
        #[arg(long)]
        listing: String,
        #[arg(long, default_value = "preview.html")]
        out: PathBuf,
    },
    /// Print a stock media.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    if let Command::GenConfig = cli.command {
        print!("{}", config::stock_config_toml());
        return Ok(());
    }

    let media_config = config::load_config(cli.config.as_deref())?;
    let storage = FsStorage::new(
        cli.storage
            .clone()
            .unwrap_or_else(|| PathBuf::from(&media_config.storage.root)),
        media_config.storage.public_base_url.clone(),
    );
    debug!(root = %storage.root().display(), "storage opened");

    match cli.command {
        Command::Check { tier, files } => {
            init_thread_pool(&media_config.processing);
            let settings = media_config.ingest_settings(Tier::from_featured(tier.featured));
            let files = collect_files(&files)?;
            println!("==> Checking {} file(s)", files.len());
            output::print_heif_notice(count_heif(&files), HEIF_DECODING);

            let (tx, printer) = spawn_event_printer();
            let outcomes = ingest::process_files(&RustBackend::new(), files, &settings, Some(&tx));
            drop(tx);
            printer.join().map_err(|_| "event printer panicked")?;

            let ready = outcomes
                .iter()
                .filter(|o| matches!(o, FileOutcome::Ready(_)))
                .count();
            println!("==> {} ready, {} skipped", ready, outcomes.len() - ready);
        }
        Command::Publish {
            owner,
            listing,
            tier,
            remove,
            main,
            files,
        } => {
            let target = ListingRef::new(owner, listing)?;
            let tier = Tier::from_featured(tier.featured);
            init_thread_pool(&media_config.processing);

            let rows = storage.load_gallery_order(target.listing_id())?;
            let mut gallery = Gallery::hydrate(
                media_config.max_images(tier),
                PreviewTracker::in_memory(),
                rows,
            );
            info!(listing = %target.listing_id(), photos = gallery.len(), %tier, "gallery loaded");

            remove_positions(&mut gallery, &remove)?;

            let files = collect_files(&files)?;
            if !files.is_empty() {
                println!("==> Adding {} file(s)", files.len());
                output::print_heif_notice(count_heif(&files), HEIF_DECODING);
                let settings = media_config.ingest_settings(tier);
                let (tx, printer) = spawn_event_printer();
                let reports = gallery.ingest(&RustBackend::new(), &settings, files, Some(&tx));
                drop(tx);
                printer.join().map_err(|_| "event printer panicked")?;
                for report in reports? {
                    output::print_ingest_report(&report);
                }
            }

            if let Some(pos) = main {
                gallery.set_main(to_index(pos, gallery.len())?)?;
            }

            println!("==> Publishing {}", target.listing_id());
            match reconcile::reconcile(&mut gallery, &storage, &target) {
                Ok(persisted) => output::print_publish_output(&persisted),
                Err(e) => {
                    output::print_reconcile_error(&e);
                    gallery.close();
                    std::process::exit(1);
                }
            }
            output::print_gallery(target.listing_id(), &gallery);
            gallery.close();
        }
        Command::Show { listing } => {
            let rows = storage.load_gallery_order(&listing)?;
            output::print_rows(&listing, &rows);
        }
        Command::Preview { listing, out } => {
            let rows = storage.load_gallery_order(&listing)?;
            render::write_gallery_page(&out, &listing, &rows)?;
            println!("==> Preview written to {}", out.display());
        }
        // Printed before config is loaded.
        Command::GenConfig => {}
    }

    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default: warnings only).
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn spawn_event_printer() -> (Sender<IngestEvent>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            output::print_ingest_event(&event);
        }
    });
    (tx, printer)
}

/// Expand directories (sorted by file name) and read every file.
fn collect_files(paths: &[PathBuf]) -> std::io::Result<Vec<SourceFile>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path).sort_by_file_name() {
                let entry = entry?;
                if entry.file_type().is_file() && !is_hidden(entry.path()) {
                    files.push(SourceFile::from_path(entry.path())?);
                }
            }
        } else {
            files.push(SourceFile::from_path(path)?);
        }
    }
    Ok(files)
}

fn count_heif(files: &[SourceFile]) -> usize {
    files.iter().filter(|f| formats::is_heif_mime(&f.mime)).count()
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn to_index(pos: usize, len: usize) -> Result<usize, GalleryError> {
    if pos == 0 || pos > len {
        return Err(GalleryError::IndexOutOfRange {
            index: pos.saturating_sub(1),
            len,
        });
    }
    Ok(pos - 1)
}

/// Remove 1-based positions, all resolved against the gallery as loaded.
fn remove_positions(gallery: &mut Gallery, positions: &[usize]) -> Result<(), GalleryError> {
    let mut ids = Vec::with_capacity(positions.len());
    for &pos in positions {
        let index = to_index(pos, gallery.len())?;
        ids.push(gallery.entries()[index].id.clone());
    }
    for id in ids {
        gallery.remove(&id);
    }
    Ok(())
}
