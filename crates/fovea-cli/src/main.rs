use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fovea_core::{negotiate, ModelBlob, OrtEngine};
use fovea_hw::{Camera, FrameSource};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "fovea", about = "Fovea pipeline diagnostics CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available capture devices
    Devices,
    /// Open a camera, acquire one frame, report the delivered geometry
    Probe {
        /// V4L2 device index
        #[arg(short, long, default_value_t = 0)]
        index: u32,
        /// Save the captured frame as a PNG
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Load a model and print its negotiated tensor layout
    ModelInfo {
        /// Path to the model blob
        path: PathBuf,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("no capture devices found");
            }
            for dev in devices {
                println!("{}  {} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
        Commands::Probe { index, save } => {
            let mut camera = Camera::open(index, 640, 640)?;
            println!(
                "negotiated: {}x{} {:?}",
                camera.width, camera.height, camera.fourcc
            );

            // A few attempts: drivers may deliver empty buffers while the
            // sensor settles.
            let mut frame = None;
            for _ in 0..10 {
                if let Some(f) = camera.acquire()? {
                    frame = Some(f);
                    break;
                }
            }
            let frame = frame.context("no frame delivered after 10 attempts")?;
            println!(
                "frame: {}x{} stride {} ({:?}, seq {})",
                frame.width, frame.height, frame.stride, frame.format, frame.sequence
            );

            if let Some(path) = save {
                // Reorder BGR to RGB for the PNG encoder.
                let mut rgb = frame.data.clone();
                for px in rgb.chunks_exact_mut(3) {
                    px.swap(0, 2);
                }
                image::save_buffer(
                    &path,
                    &rgb,
                    frame.width,
                    frame.height,
                    image::ExtendedColorType::Rgb8,
                )?;
                println!("saved {}", path.display());
            }
        }
        Commands::ModelInfo { path, json } => {
            let blob = ModelBlob::load(&path)?;
            println!("model: {} ({} bytes)", path.display(), blob.len());
            let engine = OrtEngine::new(blob)?;
            let layout = negotiate(&engine)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&layout)?);
            } else {
                for attr in &layout.inputs {
                    println!(
                        "input  {}: {:?} {:?} {:?}",
                        attr.index, attr.elem, attr.dims, attr.layout
                    );
                }
                for attr in &layout.outputs {
                    println!(
                        "output {}: {:?} {:?} {:?}",
                        attr.index, attr.elem, attr.dims, attr.layout
                    );
                }
                let g = layout.geometry;
                println!(
                    "geometry: {}x{}x{} ({} bytes per frame)",
                    g.width,
                    g.height,
                    g.channels,
                    g.required_len()
                );
            }
        }
    }

    Ok(())
}
