use rayon::prelude::*;
use serde::Serialize;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::RiverParams;
use crate::error::{EngineError, MeshStage, Result};
use crate::mesh::{Mesh, NONE};

const CHECKPOINT_EVERY: usize = 4096;

/// Steepest-descent neighbour per triangle.
///
/// Boundary triangles and anything below sea level drain out of the system.
/// Everything else picks the lowest strictly-lower neighbour (ties to the
/// lower id); a triangle with no lower neighbour is a local sink.
fn compute_downhill(mesh: &Mesh) -> Vec<u32> {
    let elev = mesh.elevation_t();
    let sea = mesh.sea_level();
    (0..mesh.num_triangles() as u32)
        .into_par_iter()
        .map(|t| {
            let e = elev[t as usize];
            if mesh.is_boundary()[t as usize] || e < sea {
                return NONE;
            }
            let mut best = NONE;
            let mut best_e = e;
            for n in mesh.adjacent(t) {
                let ne = elev[n as usize];
                if ne < best_e || (ne == best_e && best != NONE && n < best) {
                    best = n;
                    best_e = ne;
                }
            }
            best
        })
        .collect()
}

/// Triangle ids sorted by elevation, highest first. Ties by ascending id.
fn argsort_descending(elev: &[f32]) -> Vec<u32> {
    let mut indices: Vec<u32> = (0..elev.len() as u32).collect();
    indices.par_sort_unstable_by(|&a, &b| {
        elev[b as usize]
            .total_cmp(&elev[a as usize])
            .then_with(|| a.cmp(&b))
    });
    indices
}

/// Flow accumulation: traverse highest-to-lowest, each triangle adds its
/// rainfall plus upstream flow to its downhill neighbour.
fn flow_accumulation(
    downhill: &[u32],
    rain: Vec<f32>,
    sorted: &[u32],
    cancel: &CancelToken,
) -> Result<Vec<f32>> {
    let mut flow = rain;
    for (i, &t) in sorted.iter().enumerate() {
        if i % CHECKPOINT_EVERY == 0 {
            cancel.checkpoint()?;
        }
        let d = downhill[t as usize];
        if d != NONE {
            flow[d as usize] += flow[t as usize];
        }
    }
    Ok(flow)
}

/// Route rainfall downhill and store per-triangle flow on the mesh.
pub fn assign_rivers(mesh: &mut Mesh, params: &RiverParams) -> Result<()> {
    assign_rivers_with(mesh, params, &CancelToken::never())
}

pub fn assign_rivers_with(
    mesh: &mut Mesh,
    params: &RiverParams,
    cancel: &CancelToken,
) -> Result<()> {
    EngineError::require("rivers", MeshStage::Elevated, mesh.stage())?;

    let downhill = compute_downhill(mesh);
    let sea = mesh.sea_level();
    let rainfall = params.rainfall.max(0.0);
    let rain: Vec<f32> = mesh
        .elevation_t()
        .par_iter()
        .map(|&e| if e >= sea { rainfall } else { 0.0 })
        .collect();
    cancel.checkpoint()?;

    let sorted = argsort_descending(mesh.elevation_t());
    let flow = flow_accumulation(&downhill, rain, &sorted, cancel)?;

    let sinks = downhill.iter().filter(|&&d| d == NONE).count();
    debug!(triangles = flow.len(), sinks, rainfall, "flow accumulated");
    mesh.write_flow(flow, downhill);
    Ok(())
}

/// A visible stretch of river, from a triangle centre to its downhill neighbour's.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RiverSegment {
    pub from: u32,
    pub to: u32,
    pub a: [f32; 2],
    pub b: [f32; 2],
    pub flow: f32,
    pub width: f32,
}

/// Segments whose weaker end still carries more than `min_flow`.
pub fn river_segments(mesh: &Mesh, params: &RiverParams) -> Result<Vec<RiverSegment>> {
    EngineError::require("river segments", MeshStage::Rivered, mesh.stage())?;
    let flow = mesh.flow_t();
    let segments = mesh
        .downhill_t()
        .iter()
        .enumerate()
        .filter(|&(_, &d)| d != NONE)
        .filter_map(|(t, &d)| {
            let f = flow[t].min(flow[d as usize]);
            (f > params.min_flow).then(|| RiverSegment {
                from: t as u32,
                to: d,
                a: mesh.center(t as u32),
                b: mesh.center(d),
                flow: f,
                width: params.river_width * f.sqrt(),
            })
        })
        .collect();
    Ok(segments)
}
