pub mod cancel;
pub mod config;
pub mod delaunay;
pub mod elevation;
pub mod error;
pub mod hydrology;
pub mod mesh;
pub mod noise;
pub mod pipeline;
pub mod render;
pub mod rng;
pub mod sampler;

use serde::Serialize;

pub use cancel::CancelToken;
pub use config::{
    ConstraintLayer, Constraints, ElevationParams, GenerationRequest, MeshParams, Overlay,
    RiverParams,
};
pub use error::{DegenerateInput, EngineError, MeshStage, Result};
pub use hydrology::{RiverSegment, river_segments};
pub use mesh::{Mesh, NONE};
pub use pipeline::{GenerationPipeline, Snapshot, Stage, StageObserver, generate};

#[derive(Clone, Debug, Serialize)]
pub struct Timing {
    pub name: &'static str,
    pub ms: f64,
}

/// Sample points, build the dual mesh and pick peak triangles.
pub fn generate_mesh(params: &MeshParams) -> Result<(Mesh, Vec<u32>)> {
    let mesh = Mesh::build(params.point_count, params.seed)?;
    let peaks = sampler::choose_peaks(&mesh, params.peak_count, params.seed);
    Ok((mesh, peaks))
}

/// Assign elevation and return `(elevation_t, elevation_r)`.
pub fn assign_elevation<'a>(
    mesh: &'a mut Mesh,
    peaks: &[u32],
    params: &ElevationParams,
    constraints: &Constraints,
) -> Result<(&'a [f32], &'a [f32])> {
    elevation::assign_elevation(mesh, peaks, params, constraints)?;
    Ok((mesh.elevation_t(), mesh.elevation_r()))
}

/// Route rainfall and return per-triangle flow.
pub fn assign_rivers<'a>(mesh: &'a mut Mesh, params: &RiverParams) -> Result<&'a [f32]> {
    hydrology::assign_rivers(mesh, params)?;
    Ok(mesh.flow_t())
}
