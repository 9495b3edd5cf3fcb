use anyhow::{Context, Result};
use clap::Parser;
use std::fmt::Write as _;
use std::path::Path;

use draco_decode::prelude::*;

#[derive(Parser)]
#[command(name = "draco-decode")]
#[command(about = "Decodes a Draco bitstream into an OBJ mesh or a PLY point cloud")]
struct Cli {
    /// Input .drc file path
    #[arg(short, long)]
    input: String,

    /// Output file path (.obj for meshes, .ply for point clouds)
    #[arg(short, long)]
    output: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let data = std::fs::read(&cli.input)
        .with_context(|| format!("Failed to read input file: {}", cli.input))?;

    let geometry_type = get_encoded_geometry_type(&data)
        .map_err(|e| anyhow::anyhow!("Failed to parse header: {}", e))?;

    let output = match geometry_type {
        GeometryType::Mesh => {
            let mesh =
                decode_mesh(&data).map_err(|e| anyhow::anyhow!("Failed to decode mesh: {}", e))?;
            check_extension(&cli.output, "obj")?;
            write_obj(&mesh)
        }
        GeometryType::PointCloud => {
            let cloud = decode_point_cloud(&data)
                .map_err(|e| anyhow::anyhow!("Failed to decode point cloud: {}", e))?;
            check_extension(&cli.output, "ply")?;
            write_ply(&cloud)
        }
    };

    std::fs::write(&cli.output, output)
        .with_context(|| format!("Failed to write output file: {}", cli.output))?;

    Ok(())
}

fn check_extension(path: &str, expected: &str) -> Result<()> {
    let ext = Path::new(path)
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("");
    if ext != expected {
        anyhow::bail!("Output file must be a .{} file for this geometry", expected);
    }
    Ok(())
}

fn write_obj(mesh: &Mesh) -> String {
    let mut out = String::new();
    let position = mesh.named_attribute(AttributeType::Position);
    let tex_coord = mesh.named_attribute(AttributeType::TexCoord);
    let normal = mesh.named_attribute(AttributeType::Normal);

    if let Some(att) = position {
        for p in 0..mesh.num_points() {
            let v = att.mapped_index(p);
            let _ = writeln!(
                out,
                "v {} {} {}",
                att.component_as_f64(v, 0),
                att.component_as_f64(v, 1),
                att.component_as_f64(v, 2)
            );
        }
    }
    if let Some(att) = tex_coord {
        for p in 0..mesh.num_points() {
            let v = att.mapped_index(p);
            let _ = writeln!(
                out,
                "vt {} {}",
                att.component_as_f64(v, 0),
                att.component_as_f64(v, 1)
            );
        }
    }
    if let Some(att) = normal {
        for p in 0..mesh.num_points() {
            let v = att.mapped_index(p);
            let _ = writeln!(
                out,
                "vn {} {} {}",
                att.component_as_f64(v, 0),
                att.component_as_f64(v, 1),
                att.component_as_f64(v, 2)
            );
        }
    }

    for face in mesh.faces() {
        let (a, b, c) = (face[0] + 1, face[1] + 1, face[2] + 1);
        let line = match (tex_coord.is_some(), normal.is_some()) {
            (true, true) => format!("f {a}/{a}/{a} {b}/{b}/{b} {c}/{c}/{c}"),
            (true, false) => format!("f {a}/{a} {b}/{b} {c}/{c}"),
            (false, true) => format!("f {a}//{a} {b}//{b} {c}//{c}"),
            (false, false) => format!("f {a} {b} {c}"),
        };
        let _ = writeln!(out, "{}", line);
    }
    out
}

fn write_ply(cloud: &PointCloud) -> String {
    let position = cloud.named_attribute(AttributeType::Position);
    let color = cloud.named_attribute(AttributeType::Color);

    let mut out = String::new();
    let _ = writeln!(out, "ply");
    let _ = writeln!(out, "format ascii 1.0");
    let _ = writeln!(out, "element vertex {}", cloud.num_points());
    let _ = writeln!(out, "property float x");
    let _ = writeln!(out, "property float y");
    let _ = writeln!(out, "property float z");
    if color.is_some() {
        let _ = writeln!(out, "property uchar red");
        let _ = writeln!(out, "property uchar green");
        let _ = writeln!(out, "property uchar blue");
    }
    let _ = writeln!(out, "end_header");

    for p in 0..cloud.num_points() {
        let mut line = String::new();
        match position {
            Some(att) => {
                let v = att.mapped_index(p);
                let _ = write!(
                    line,
                    "{} {} {}",
                    att.component_as_f64(v, 0),
                    att.component_as_f64(v, 1),
                    att.component_as_f64(v, 2)
                );
            }
            None => line.push_str("0 0 0"),
        }
        if let Some(att) = color {
            let v = att.mapped_index(p);
            let _ = write!(
                line,
                " {} {} {}",
                att.component_as_f64(v, 0) as u8,
                att.component_as_f64(v, 1) as u8,
                att.component_as_f64(v, 2) as u8
            );
        }
        let _ = writeln!(out, "{}", line);
    }
    out
}
