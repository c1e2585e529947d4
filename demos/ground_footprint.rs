//! Ground Footprint
//!
//! Builds the DLT model of a camera from its INS orientation and position,
//! prints the M-vector, and maps the image outline (and optionally a pixel
//! grid) onto a horizontal ground plane.
//!
//! Usage:
//! ```bash
//! cargo run --example ground_footprint -- \
//!   --ip-path samples/ip_simple.yaml \
//!   --pitch 0.6 --yaw 1.2 --fov 0.9 --roll 0.0 \
//!   --camera 450200.0,5012300.0,120.0 \
//!   --ground-z 0.0 --grid 200 --output output/ground_grid.csv
//! ```

use clap::Parser;
use dlt_tools::camera::{
    camera_position_from_slice, ImageParams, MVector, MountOffset, Orientation,
};
use dlt_tools::geometry::{self, KnownAxis};
use log::info;
use std::path::PathBuf;

/// Map an oblique camera image onto the ground plane
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(allow_negative_numbers = true)]
struct Cli {
    /// Path to the image parameter YAML file
    #[arg(short = 'p', long)]
    ip_path: PathBuf,

    /// Platform pitch in radians
    #[arg(long)]
    pitch: f64,

    /// Platform yaw in radians
    #[arg(long)]
    yaw: f64,

    /// Horizontal field of view in radians
    #[arg(long)]
    fov: f64,

    /// Platform roll in radians
    #[arg(long)]
    roll: f64,

    /// Camera position x,y,z in world coordinates
    #[arg(long, value_delimiter = ',')]
    camera: Vec<f64>,

    /// Camera mount pitch offset in radians
    #[arg(long)]
    offset_pitch: Option<f64>,

    /// Camera mount roll offset in radians
    #[arg(long)]
    offset_roll: Option<f64>,

    /// Camera mount yaw offset in radians
    #[arg(long)]
    offset_yaw: Option<f64>,

    /// Height of the ground plane
    #[arg(short = 'z', long, default_value = "0.0")]
    ground_z: f64,

    /// Approximate number of grid pixels to map onto the ground
    #[arg(short = 'n', long)]
    grid: Option<usize>,

    /// CSV file receiving the mapped grid (or the footprint when no grid is requested)
    #[arg(short = 'o', long)]
    output: Option<PathBuf>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let cli = Cli::parse();

    let ip_path = cli.ip_path.to_str().ok_or("Invalid ip path string")?;
    let ip = ImageParams::load_from_yaml(ip_path)?;
    info!("Loaded image parameters from {ip_path}: {ip:?}");

    let orientation = Orientation {
        pitch: cli.pitch,
        yaw: cli.yaw,
        fov: cli.fov,
        roll: cli.roll,
    };
    let camera = camera_position_from_slice(&cli.camera)?;
    let offset = MountOffset::from_parts(cli.offset_pitch, cli.offset_roll, cli.offset_yaw)?;

    let m = MVector::from_orientation(&orientation, &camera, &ip, offset)?;
    println!("M-vector:");
    for (label, value) in ["A", "B", "C", "D", "E", "F", "G", "H", "J", "K", "L"]
        .iter()
        .zip(m.coefficients())
    {
        println!("  {label}: {value:.9e}");
    }

    let footprint = geometry::ground_footprint(&m, &ip, cli.ground_z)?;
    println!("\nGround footprint at z = {}:", cli.ground_z);
    for (i, corner) in footprint.column_iter().enumerate() {
        println!("  corner {i}: ({:.3}, {:.3}, {:.3})", corner[0], corner[1], corner[2]);
    }

    let mapped = match cli.grid {
        Some(n) => {
            let pixels = geometry::sample_points(&ip.resolution()?, n);
            info!("Mapping {} grid pixels onto the ground", pixels.ncols());
            geometry::map_to_plane(&m, &ip, &pixels, cli.ground_z, KnownAxis::Z, true)?
        }
        None => footprint,
    };

    if let Some(output) = cli.output {
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        geometry::export_world_points(&output, &mapped)?;
        println!("\nWrote {} points to {}", mapped.ncols(), output.display());
    }

    Ok(())
}
