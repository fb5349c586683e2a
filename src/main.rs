use std::path::PathBuf;

use terrain_mesh::config::{GenerationRequest, MeshParams};
use terrain_mesh::{render, river_segments};
use tracing_subscriber::EnvFilter;

const PREVIEW_SIZE: usize = 1024;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    let seed: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(42);
    let point_count: usize = args
        .get(2)
        .and_then(|s| s.parse().ok())
        .unwrap_or(MeshParams::default().point_count);
    let out_dir: PathBuf = args
        .get(3)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("artifacts"));

    std::fs::create_dir_all(&out_dir).expect("failed to create output directory");

    let mut req = GenerationRequest::default();
    req.mesh.seed = seed;
    req.mesh.point_count = point_count;
    req.elevation.seed = seed;

    eprintln!(
        "Generating terrain with seed={}, points={}, peaks={}",
        seed, point_count, req.mesh.peak_count
    );

    let (snapshot, timings) = match terrain_mesh::generate(&req) {
        Ok(out) => out,
        Err(err) => {
            eprintln!("generation failed: {err}");
            std::process::exit(1);
        }
    };

    eprintln!("\nTimings:");
    for t in &timings {
        eprintln!("  {:20} {:8.1} ms", t.name, t.ms);
    }

    let mesh = &snapshot.mesh;
    let segments = river_segments(mesh, &req.rivers).expect("rivers were assigned");
    eprintln!(
        "\n{} regions, {} triangles, {} river segments",
        mesh.num_regions(),
        mesh.num_triangles(),
        segments.len()
    );

    let save = |name: &str, rgba: &[u8]| {
        let path = out_dir.join(name);
        let size = PREVIEW_SIZE as u32;
        image::save_buffer(&path, rgba, size, size, image::ColorType::Rgba8)
            .expect("failed to save image");
        eprintln!("Saved {}", path.display());
    };

    save("elevation.png", &render::render_elevation(mesh, PREVIEW_SIZE, PREVIEW_SIZE));
    save("rivers.png", &render::render_rivers(mesh, &segments, PREVIEW_SIZE, PREVIEW_SIZE));
    save("mesh.png", &render::render_mesh(mesh, PREVIEW_SIZE, PREVIEW_SIZE));

    eprintln!("\nDone.");
}
