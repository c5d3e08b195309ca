//! Minimal ascii PLY point cloud writer for diagnostic dumps.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::core::PointCloud;
use crate::error::Result;

/// Write a point cloud as ascii PLY.
pub fn write_ply(path: &Path, cloud: &PointCloud) -> Result<()> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    writeln!(w, "ply")?;
    writeln!(w, "format ascii 1.0")?;
    writeln!(w, "element vertex {}", cloud.len())?;
    writeln!(w, "property float x")?;
    writeln!(w, "property float y")?;
    writeln!(w, "property float z")?;
    writeln!(w, "end_header")?;
    for p in cloud.points() {
        writeln!(w, "{} {} {}", p.x, p.y, p.z)?;
    }
    w.flush()?;
    Ok(())
}
