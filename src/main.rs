use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dicom_viewer::{Compositor, LayerStack, Plane, SortBy, ViewerConfig, VolumeLoader};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Load a DICOM series, extract its surface and write the three slice views.
#[derive(Parser)]
#[command(name = "dicom-viewer", version)]
struct Cli {
    /// Directory containing the .dcm files of one series
    input: PathBuf,

    /// Output directory for the slice images
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Side of the square the slice images are fitted into
    #[arg(short, long, default_value_t = 512)]
    resolution: u32,

    /// Isovalue for the surface mesh
    #[arg(short, long)]
    isovalue: Option<i32>,

    /// Sort slices by instance number instead of patient position
    #[arg(long)]
    by_instance: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let sort_by = if cli.by_instance {
        SortBy::InstanceNumber
    } else {
        SortBy::ImagePositionPatient
    };
    let volume = VolumeLoader::load_from_directory(&cli.input, sort_by)
        .with_context(|| format!("Failed to load DICOM series from {}", cli.input.display()))?;

    let mut stack = LayerStack::new(ViewerConfig {
        slice_resolution: cli.resolution,
        ..ViewerConfig::default()
    });
    let id = stack.add(volume, "Image 1");
    if let Some(isovalue) = cli.isovalue {
        stack.set_isovalue(id, isovalue)?;
    }

    let layer = stack.get(id)?;
    info!(
        cells = layer.mesh().cell_count(),
        vertices = layer.mesh().vertex_count(),
        strips = layer.mesh().strips.len(),
        isovalue = layer.isovalue(),
        "Surface ready"
    );

    for (plane, name) in [
        (Plane::Sagittal, "sagittal"),
        (Plane::Coronal, "coronal"),
        (Plane::Transverse, "transverse"),
    ] {
        let position = stack.slice_position(plane);
        let image =
            Compositor::compose_plane(&stack, plane, position, stack.config().slice_resolution);
        let path = cli.output.join(format!("{name}.png"));
        image
            .save(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), position, "Wrote slice");
    }

    Ok(())
}
