use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rollcall_core::overlay::{self, FontVec};
use rollcall_core::{FaceService, Frame, OnnxAnalyzer, Recognition};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Face registration and recognition for attendance")]
struct Cli {
    /// Config file (defaults to ./rollcall.toml when present)
    #[arg(short, long, global = true, env = "ROLLCALL_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register the single face in an image under a name
    Register {
        /// Person's name; becomes the stored image's filename
        #[arg(short, long)]
        name: String,
        /// Image containing exactly one face
        image: PathBuf,
    },
    /// Recognize every face in one or more images
    Recognize {
        /// Images to process, in order
        #[arg(required = true)]
        images: Vec<PathBuf>,
        /// Write annotated copies into this directory
        #[arg(long)]
        annotate: Option<PathBuf>,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered names in registration order
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show configuration and store status
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Register { name, image } => {
            let service = open_service(&config)?;
            let frame = Frame::open(&image).with_context(|| format!("loading {}", image.display()))?;
            let registered = register(&service, &name, &frame)?;
            println!("Face registered successfully: {registered}");
        }
        Commands::Recognize {
            images,
            annotate,
            json,
        } => {
            let service = open_service(&config)?;
            let font = match &annotate {
                Some(dir) => {
                    std::fs::create_dir_all(dir)
                        .with_context(|| format!("creating {}", dir.display()))?;
                    label_font(&config)
                }
                None => None,
            };
            let annotate = annotate.as_deref().map(|dir| Annotate { dir, font: font.as_ref() });
            recognize_all(&service, &images, annotate, json)?;
        }
        Commands::List { json } => {
            let service = open_service(&config)?;
            let names = service.names();
            if json {
                println!("{}", serde_json::to_string_pretty(&names)?);
            } else if names.is_empty() {
                println!("No faces registered");
            } else {
                for name in names {
                    println!("{name}");
                }
            }
        }
        Commands::Status => {
            let registered = open_service(&config).map(|s| s.len());
            let status = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "store_dir": config.store_dir,
                "scrfd_model": config.scrfd_model_path(),
                "arcface_model": config.arcface_model_path(),
                "models_present": Path::new(&config.scrfd_model_path()).exists()
                    && Path::new(&config.arcface_model_path()).exists(),
                "tolerance": config.tolerance,
                "label_font": config.label_font,
                "registered": registered.as_ref().ok(),
                "error": registered.as_ref().err().map(|e| format!("{e:#}")),
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

fn open_service(config: &Config) -> Result<FaceService> {
    let analyzer = OnnxAnalyzer::load(&config.scrfd_model_path(), &config.arcface_model_path())
        .context("loading face models")?;
    let service = FaceService::open(&config.store_dir, Box::new(analyzer), config.tolerance)
        .with_context(|| format!("opening face store {}", config.store_dir.display()))?;
    tracing::info!(
        store = %config.store_dir.display(),
        faces = service.len(),
        tolerance = config.tolerance,
        "face service ready"
    );
    Ok(service)
}

/// Register `frame` under `name`, returning the stored name.
fn register(service: &FaceService, name: &str, frame: &Frame) -> Result<String> {
    match service.register(name, frame) {
        Ok(record) => Ok(record.name),
        Err(e) => {
            tracing::debug!(stage = ?e.stage(), "registration failed");
            anyhow::bail!(e)
        }
    }
}

/// Where and how to write annotated copies.
struct Annotate<'a> {
    dir: &'a Path,
    font: Option<&'a FontVec>,
}

/// Label font from the config. Annotation falls back to bare boxes when it
/// is unset or unusable.
fn label_font(config: &Config) -> Option<FontVec> {
    let Some(path) = &config.label_font else {
        tracing::info!("no label font configured, annotating without names");
        return None;
    };
    match overlay::load_font(path) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = %e, "annotating without names");
            None
        }
    }
}

/// Process each image in turn. An image that cannot be loaded is reported
/// and skipped; the rest are still processed.
fn recognize_all(service: &FaceService, images: &[PathBuf], annotate: Option<Annotate<'_>>, json: bool) -> Result<()> {
    let mut report = Vec::new();

    for path in images {
        let frame = match Frame::open(path) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping image");
                eprintln!("{}: Error: {e}", path.display());
                continue;
            }
        };

        let recognitions = service.recognize(&frame);

        if let Some(annotate) = &annotate {
            let out = annotated_path(annotate.dir, path);
            let mut img = frame.to_image();
            overlay::draw_recognitions(&mut img, &recognitions, annotate.font);
            img.save(&out).with_context(|| format!("writing {}", out.display()))?;
        }

        if json {
            report.push(serde_json::json!({
                "image": path,
                "faces": recognitions,
            }));
        } else {
            print_recognitions(path, &recognitions);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    Ok(())
}

fn print_recognitions(path: &Path, recognitions: &[Recognition]) {
    if recognitions.is_empty() {
        println!("{}: no faces", path.display());
    }
    for rec in recognitions {
        let b = &rec.bbox;
        println!(
            "{}: {} (distance {:.3}) at {:.0},{:.0} {:.0}x{:.0}",
            path.display(),
            rec.result.name,
            rec.result.distance,
            b.x,
            b.y,
            b.width,
            b.height
        );
    }
}

/// `<dir>/<stem>.annotated.png`
fn annotated_path(dir: &Path, image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "frame".to_string());
    dir.join(format!("{stem}.annotated.png"))
}
