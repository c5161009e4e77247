mod config;
mod store;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use config::Config;
use rollcall_core::{
    decode, BoundingBox, FaceLocator, FixedLocator, MatchPolicy, Pipeline, PixelGrid,
    RecognitionOutcome, SubjectId, DESCRIPTOR_LEN,
};
use std::path::{Path, PathBuf};
use store::DescriptorStore;

#[derive(Parser)]
#[command(name = "rollcall", version, about = "Face enrollment and attendance matching")]
struct Cli {
    /// TOML config file layered over ROLLCALL_* environment variables
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Descriptor database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Face box as x,y,w,h; skips the face model (repeatable)
    #[arg(long = "box", value_name = "X,Y,W,H", value_parser = parse_box, global = true)]
    boxes: Vec<BoundingBox>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll a subject from an image containing exactly one face
    Enroll {
        subject: String,
        /// Image file (PNG/JPEG, or a base64 data URI in a text file)
        image: PathBuf,
        /// Display label stored alongside the descriptor
        #[arg(short, long, default_value = "")]
        label: String,
        /// Minimum face side in pixels
        #[arg(long)]
        min_face_size: Option<u32>,
    },
    /// Report enrolled subjects found in an image
    Recognize {
        image: PathBuf,
        /// Similarity a match must exceed
        #[arg(short, long)]
        tolerance: Option<f32>,
        /// Candidate selection: best or first
        #[arg(long)]
        policy: Option<MatchPolicy>,
    },
    /// Print the similarity between the faces in two images
    Compare { a: PathBuf, b: PathBuf },
    /// List enrolled subjects
    List,
    /// Remove an enrolled subject
    Remove { subject: String },
    /// Show configuration and store status
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env();
    if let Some(path) = &cli.config {
        config.merge_file(path)?;
    }
    if let Some(db) = &cli.db {
        config.db_path = db.clone();
    }

    match cli.command {
        Commands::Enroll {
            subject,
            image,
            label,
            min_face_size,
        } => {
            if let Some(min) = min_face_size {
                config.min_face_size = min;
            }
            let pipeline = build_pipeline(&config, &cli.boxes)?;
            let grid = load_image(&image)?;
            let descriptor = pipeline
                .enroll_grid(&grid)
                .with_context(|| format!("enrolling from {}", image.display()))?;

            let store = DescriptorStore::open(&config.db_path)?;
            let subject = SubjectId::new(subject);
            store.upsert(&subject, &label, &descriptor)?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({ "subject": subject, "dims": descriptor.len() })
                );
            } else {
                println!("Enrolled {subject} ({} values)", descriptor.len());
            }
        }
        Commands::Recognize {
            image,
            tolerance,
            policy,
        } => {
            if let Some(t) = tolerance {
                config.tolerance = t;
            }
            if let Some(p) = policy {
                config.match_policy = p;
            }
            let pipeline = build_pipeline(&config, &cli.boxes)?;
            let grid = load_image(&image)?;
            let store = DescriptorStore::open(&config.db_path)?;
            let known = store.known_set()?;

            let outcome = pipeline.recognize_grid(&grid, &known, config.tolerance);
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_outcome(&outcome);
            }
        }
        Commands::Compare { a, b } => {
            let pipeline = build_pipeline(&config, &cli.boxes)?;
            let first = pipeline
                .enroll_grid(&load_image(&a)?)
                .with_context(|| format!("extracting face from {}", a.display()))?;
            let second = pipeline
                .enroll_grid(&load_image(&b)?)
                .with_context(|| format!("extracting face from {}", b.display()))?;
            let similarity = first.similarity(&second);
            let matched = similarity > config.tolerance;

            if cli.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "similarity": similarity,
                        "tolerance": config.tolerance,
                        "match": matched,
                    })
                );
            } else {
                println!(
                    "similarity {similarity:.4} (tolerance {:.2}): {}",
                    config.tolerance,
                    if matched { "match" } else { "no match" }
                );
            }
        }
        Commands::List => {
            let store = DescriptorStore::open(&config.db_path)?;
            let subjects = store.list()?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&subjects)?);
            } else if subjects.is_empty() {
                println!("No subjects enrolled");
            } else {
                for s in &subjects {
                    println!("{:<24} {:<24} {}", s.subject, s.label, s.enrolled_at);
                }
            }
        }
        Commands::Remove { subject } => {
            let store = DescriptorStore::open(&config.db_path)?;
            let subject = SubjectId::new(subject);
            if !store.remove(&subject)? {
                bail!("subject {subject} is not enrolled");
            }
            println!("Removed {subject}");
        }
        Commands::Status => {
            let store = DescriptorStore::open(&config.db_path)?;
            let status = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "descriptor_len": DESCRIPTOR_LEN,
                "db_path": config.db_path,
                "model_path": config.model_path,
                "model_present": config.model_path.exists(),
                "pipeline": config.pipeline_config(),
                "enrolled": store.count()?,
            });
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
    }

    Ok(())
}

fn build_pipeline(
    config: &Config,
    boxes: &[BoundingBox],
) -> Result<Pipeline<Box<dyn FaceLocator>>> {
    let locator = load_locator(config, boxes)?;
    Ok(Pipeline::with_config(locator, config.pipeline_config()))
}

fn load_locator(config: &Config, boxes: &[BoundingBox]) -> Result<Box<dyn FaceLocator>> {
    if !boxes.is_empty() {
        tracing::debug!(count = boxes.len(), "using fixed face boxes");
        return Ok(Box::new(FixedLocator::new(boxes.to_vec())));
    }

    #[cfg(feature = "rustface")]
    {
        let locator = rollcall_core::SeetaLocator::load(&config.model_path)
            .context("loading face model (pass --box to skip detection)")?;
        return Ok(Box::new(locator));
    }

    #[cfg(not(feature = "rustface"))]
    {
        let _ = config;
        bail!("built without face detection; pass --box x,y,w,h");
    }
}

/// Read an image file. Text files holding a base64 data URI are accepted too.
fn load_image(path: &Path) -> Result<PixelGrid> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let grid = if looks_like_payload(&bytes) {
        let text = std::str::from_utf8(&bytes).context("image payload is not UTF-8")?;
        decode::decode_payload(text)?
    } else {
        decode::decode_image(&bytes)?
    };
    tracing::debug!(
        path = %path.display(),
        width = grid.width(),
        height = grid.height(),
        "loaded image"
    );
    Ok(grid)
}

fn looks_like_payload(bytes: &[u8]) -> bool {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    bytes[start..].starts_with(b"data:")
}

fn parse_box(s: &str) -> Result<BoundingBox, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(format!("expected x,y,w,h, got '{s}'"));
    };
    let num = |v: &str| v.parse::<u32>().map_err(|e| format!("'{v}': {e}"));
    let bbox = BoundingBox::new(num(x)?, num(y)?, num(w)?, num(h)?);
    if bbox.width == 0 || bbox.height == 0 {
        return Err("box width and height must be non-zero".to_string());
    }
    Ok(bbox)
}

fn print_outcome(outcome: &RecognitionOutcome) {
    match outcome {
        RecognitionOutcome::NoFace => println!("No face detected"),
        RecognitionOutcome::ExtractionFailed => println!("Faces found but none could be processed"),
        RecognitionOutcome::Matches(found) if found.is_empty() => {
            println!("No enrolled subject matched")
        }
        RecognitionOutcome::Matches(found) => {
            for m in found {
                println!("face {}: {} ({:.4})", m.face_index, m.subject, m.similarity);
            }
        }
    }
}
