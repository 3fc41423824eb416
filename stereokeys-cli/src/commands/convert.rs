//! Convert command - triangulate one pair of fingertip pixels.
//!
//! Useful when calibrating camera placement: point at a known spot, read the
//! contact pixels off a dumped frame, and compare the result with a ruler.

use stereokeys::config::ConfigFile;
use stereokeys::geometry::{PixelPoint, SpaceConverter};

use crate::error::CliError;

/// Arguments for the convert command.
pub struct ConvertArgs {
    pub top: (f64, f64),
    pub front: (f64, f64),
    /// Project the result back into both cameras.
    pub check: bool,
}

/// Run the convert command with the camera geometry from `config`.
pub fn run(args: ConvertArgs, config: &ConfigFile) -> Result<(), CliError> {
    let geometry = config.camera_geometry();
    let converter = SpaceConverter::new(&geometry)?;

    let top = PixelPoint::new(args.top.0, args.top.1);
    let front = PixelPoint::new(args.front.0, args.front.1);

    println!("Top pixel:   ({:.1}, {:.1})", top.x, top.y);
    println!("Front pixel: ({:.1}, {:.1})", front.x, front.y);
    println!(
        "Image size:  {}x{}",
        geometry.image_size.0, geometry.image_size.1
    );
    println!();

    let Some(position) = converter.convert(top, front) else {
        return Err(CliError::Config(
            "The camera rays are parallel for these pixels; no position can be computed.".to_string(),
        ));
    };

    println!(
        "Position: x = {:.2} mm, y = {:.2} mm, z = {:.2} mm",
        position.x, position.y, position.z
    );

    if args.check {
        match converter.project(position) {
            Some((top_back, front_back)) => {
                println!();
                println!("Reprojection");
                println!("────────────");
                println!(
                    "  Top:   ({:.2}, {:.2}), error {:.3} px",
                    top_back.x,
                    top_back.y,
                    distance(top, top_back)
                );
                println!(
                    "  Front: ({:.2}, {:.2}), error {:.3} px vertical",
                    front_back.x,
                    front_back.y,
                    (front.y - front_back.y).abs()
                );
            }
            None => println!("Reprojection: point lies in a camera plane"),
        }
    }

    Ok(())
}

fn distance(a: PixelPoint, b: PixelPoint) -> f64 {
    (a.x - b.x).hypot(a.y - b.y)
}
