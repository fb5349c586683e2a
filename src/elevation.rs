use std::collections::BinaryHeap;

use rayon::prelude::*;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::config::{ConstraintLayer, Constraints, ElevationParams};
use crate::error::{EngineError, MeshStage, Result};
use crate::mesh::Mesh;
use crate::noise::fbm;
use crate::rng::{hash_unit, seed_u32};

const SALT_JAGGED: u64 = 0x7A66_ED00_CAFE_0001;
const SALT_COAST: u64 = 0xC0A5_7FAD_1E51_1A1D;
const SALT_HILLS: u64 = 0x4111_5000_BEEF_0003;

/// Spread of the per-triangle step-cost multiplier at jaggedness 1.
const JAGGED_SPREAD: f32 = 0.9;
/// Step costs never drop below this fraction of the geometric length.
const MIN_STEP_FACTOR: f32 = 0.1;
/// How fast land rises from the domain edge, in normalised coast distance.
const COAST_RAMP: f32 = 3.0;
const COAST_NOISE: f32 = 0.3;

const CHECKPOINT_EVERY: usize = 4096;

/// Heap entry for multi-source Dijkstra. Lowest cost pops first, ties by id.
#[derive(PartialEq)]
struct Entry {
    cost: f32,
    t: u32,
}

impl Eq for Entry {}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .cost
            .total_cmp(&self.cost)
            .then_with(|| other.t.cmp(&self.t))
    }
}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

#[inline]
fn length(a: [f32; 2], b: [f32; 2]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    (dx * dx + dy * dy).sqrt()
}

/// Graph distance from the nearest source over triangle adjacency.
/// `step(from, to)` must be positive. Unreached triangles stay at infinity.
fn relax_distances<F>(
    mesh: &Mesh,
    sources: impl IntoIterator<Item = u32>,
    step: F,
    cancel: &CancelToken,
) -> Result<Vec<f32>>
where
    F: Fn(u32, u32) -> f32,
{
    let mut dist = vec![f32::INFINITY; mesh.num_triangles()];
    let mut heap = BinaryHeap::new();
    for t in sources {
        if dist[t as usize] != 0.0 {
            dist[t as usize] = 0.0;
            heap.push(Entry { cost: 0.0, t });
        }
    }

    let mut pops = 0usize;
    while let Some(Entry { cost, t }) = heap.pop() {
        pops += 1;
        if pops % CHECKPOINT_EVERY == 0 {
            cancel.checkpoint()?;
        }
        // Stale entry: a cheaper path already settled this triangle.
        if cost > dist[t as usize] {
            continue;
        }
        for n in mesh.adjacent(t) {
            let next = cost + step(t, n);
            if next < dist[n as usize] {
                dist[n as usize] = next;
                heap.push(Entry { cost: next, t: n });
            }
        }
    }
    Ok(dist)
}

/// Divide finite distances by their maximum; infinity maps to 1.
fn normalise(dist: &mut [f32]) {
    let max = dist
        .iter()
        .copied()
        .filter(|d| d.is_finite())
        .fold(0.0f32, f32::max);
    let scale = if max > 0.0 { 1.0 / max } else { 0.0 };
    for d in dist.iter_mut() {
        *d = if d.is_finite() { *d * scale } else { 1.0 };
    }
}

/// Mean of the triangle values around each region.
fn region_means(mesh: &Mesh, elevation_t: &[f32]) -> Vec<f32> {
    (0..mesh.num_regions() as u32)
        .into_par_iter()
        .map(|r| {
            let tris = mesh.region_triangles(r);
            if tris.is_empty() {
                return 0.0;
            }
            tris.iter().map(|&t| elevation_t[t as usize]).sum::<f32>() / tris.len() as f32
        })
        .collect()
}

fn validate(mesh: &Mesh, peaks: &[u32], constraints: &Constraints) -> Result<()> {
    EngineError::require("elevation", MeshStage::Built, mesh.stage())?;
    let triangles = mesh.num_triangles();
    if let Some(&peak) = peaks.iter().find(|&&p| p as usize >= triangles) {
        return Err(EngineError::InvalidPeak { peak, triangles });
    }
    if let Some(overlay) = &constraints.overlay {
        let expected = match overlay.layer {
            ConstraintLayer::Regions => mesh.num_regions(),
            ConstraintLayer::Triangles => triangles,
        };
        if overlay.values.len() != expected {
            return Err(EngineError::ConstraintsSize {
                layer: overlay.layer,
                expected,
                actual: overlay.values.len(),
            });
        }
    }
    Ok(())
}

/// Assign per-triangle and per-region elevation.
///
/// Peaks are high sources and boundary triangles low sources of a
/// distance transform over triangle adjacency; noise shapes hills and the
/// shoreline. Constraint overlay entries then win verbatim.
pub fn assign_elevation(
    mesh: &mut Mesh,
    peaks: &[u32],
    params: &ElevationParams,
    constraints: &Constraints,
) -> Result<()> {
    assign_elevation_with(mesh, peaks, params, constraints, &CancelToken::never())
}

/// As [`assign_elevation`], abandoning work once `cancel` fires.
/// The mesh is only written after every step has succeeded.
pub fn assign_elevation_with(
    mesh: &mut Mesh,
    peaks: &[u32],
    params: &ElevationParams,
    constraints: &Constraints,
    cancel: &CancelToken,
) -> Result<()> {
    validate(mesh, peaks, constraints)?;

    let jagged_seed = seed_u32(params.seed, SALT_JAGGED);
    let coast_seed = seed_u32(params.seed, SALT_COAST);
    let hill_seed = seed_u32(params.seed, SALT_HILLS);
    let jaggedness = params.mountain_jaggedness.max(0.0);

    let m: &Mesh = mesh;
    let mut peak_dist = relax_distances(
        m,
        peaks.iter().copied(),
        |from, to| {
            let wobble = JAGGED_SPREAD * jaggedness * (hash_unit(to, jagged_seed) - 0.5);
            length(m.center(from), m.center(to)) * (1.0 + wobble).max(MIN_STEP_FACTOR)
        },
        cancel,
    )?;
    let mut coast_dist = relax_distances(
        m,
        (0..m.num_triangles() as u32).filter(|&t| m.is_boundary()[t as usize]),
        |from, to| length(m.center(from), m.center(to)),
        cancel,
    )?;
    cancel.checkpoint()?;
    normalise(&mut peak_dist);
    normalise(&mut coast_dist);

    let sharpness = 1.0 + 4.0 * params.mountain_sharpness.max(0.0);
    let floor = -params.ocean_depth;
    let mut elevation_t: Vec<f32> = (0..m.num_triangles())
        .into_par_iter()
        .map(|i| {
            if m.is_boundary()[i] {
                return floor;
            }
            let p = m.center(i as u32);
            let mountain = (1.0 - peak_dist[i]).max(0.0).powf(sharpness);
            let hills = params.hill_height * (0.5 + 0.5 * fbm(p, hill_seed, 4, 8.0));
            let shore = params.noisy_coastlines * COAST_NOISE * fbm(p, coast_seed, 4, 4.0);
            let coast = (coast_dist[i] * COAST_RAMP + shore).clamp(0.0, 1.0);
            floor + (hills + mountain - floor) * coast
        })
        .collect();
    cancel.checkpoint()?;

    let elevation_r = match &constraints.overlay {
        None => region_means(m, &elevation_t),
        Some(overlay) => match overlay.layer {
            ConstraintLayer::Triangles => {
                for (e, v) in elevation_t.iter_mut().zip(&overlay.values) {
                    if let Some(v) = *v {
                        *e = v;
                    }
                }
                region_means(m, &elevation_t)
            }
            ConstraintLayer::Regions => {
                let mut elevation_r = region_means(m, &elevation_t);
                for (e, v) in elevation_r.iter_mut().zip(&overlay.values) {
                    if let Some(v) = *v {
                        *e = v;
                    }
                }
                // Fully painted triangles follow their regions so routing sees the overlay.
                for (t, e) in elevation_t.iter_mut().enumerate() {
                    let painted = m.triangle(t as u32).map(|r| overlay.values[r as usize]);
                    if let [Some(a), Some(b), Some(c)] = painted {
                        *e = (a + b + c) / 3.0;
                    }
                }
                elevation_r
            }
        },
    };
    cancel.checkpoint()?;

    debug!(
        triangles = elevation_t.len(),
        peaks = peaks.len(),
        sea_level = constraints.sea_level,
        "elevation assigned"
    );
    mesh.write_elevation(elevation_t, elevation_r, constraints.sea_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::choose_peaks;

    fn setup() -> (Mesh, Vec<u32>) {
        let mesh = Mesh::build(700, 21).unwrap();
        let peaks = choose_peaks(&mesh, 5, 21);
        (mesh, peaks)
    }

    fn seeded(seed: u64) -> ElevationParams {
        ElevationParams {
            seed,
            ..Default::default()
        }
    }

    #[test]
    fn lengths_match_mesh() {
        let (mut mesh, peaks) = setup();
        assign_elevation(&mut mesh, &peaks, &ElevationParams::default(), &Constraints::default())
            .unwrap();
        assert_eq!(mesh.stage(), MeshStage::Elevated);
        assert_eq!(mesh.elevation_t().len(), mesh.triangles().len() / 3);
        assert_eq!(mesh.elevation_r().len(), mesh.points().len());
        assert!(mesh.elevation_t().iter().all(|e| e.is_finite()));
    }

    #[test]
    fn identical_inputs_are_bit_identical() {
        let (mut a, peaks) = setup();
        let mut b = a.clone();
        let params = seeded(99);
        assign_elevation(&mut a, &peaks, &params, &Constraints::default()).unwrap();
        assign_elevation(&mut b, &peaks, &params, &Constraints::default()).unwrap();
        let bits = |v: &[f32]| v.iter().map(|x| x.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(a.elevation_t()), bits(b.elevation_t()));
        assert_eq!(bits(a.elevation_r()), bits(b.elevation_r()));
    }

    #[test]
    fn seed_changes_terrain() {
        let (mut a, peaks) = setup();
        let mut b = a.clone();
        assign_elevation(&mut a, &peaks, &seeded(1), &Constraints::default()).unwrap();
        assign_elevation(&mut b, &peaks, &seeded(2), &Constraints::default()).unwrap();
        assert_ne!(a.elevation_t(), b.elevation_t());
    }

    #[test]
    fn boundary_sits_at_ocean_floor() {
        let (mut mesh, peaks) = setup();
        let params = ElevationParams {
            ocean_depth: 0.7,
            ..Default::default()
        };
        assign_elevation(&mut mesh, &peaks, &params, &Constraints::default()).unwrap();
        for (t, &b) in mesh.is_boundary().iter().enumerate() {
            if b {
                assert_eq!(mesh.elevation_t()[t], -0.7);
            }
        }
    }

    #[test]
    fn central_peak_is_the_summit() {
        let (mut mesh, _) = setup();
        let peak = (0..mesh.num_triangles() as u32)
            .min_by(|&a, &b| {
                length(mesh.center(a), [0.5, 0.5]).total_cmp(&length(mesh.center(b), [0.5, 0.5]))
            })
            .unwrap();
        let params = ElevationParams {
            hill_height: 0.0,
            noisy_coastlines: 0.0,
            ..Default::default()
        };
        assign_elevation(&mut mesh, &[peak], &params, &Constraints::default()).unwrap();
        let max = mesh.elevation_t().iter().copied().fold(f32::MIN, f32::max);
        assert_eq!(mesh.elevation_t()[peak as usize], max);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn triangle_overlay_wins() {
        let (mut mesh, peaks) = setup();
        let n = mesh.num_triangles();
        let mut values = vec![None; n];
        values[0] = Some(3.5);
        values[n / 2] = Some(-2.25);
        values[peaks[0] as usize] = Some(0.0);
        let constraints = Constraints::triangles(values.clone(), 0.1);
        assign_elevation(&mut mesh, &peaks, &ElevationParams::default(), &constraints).unwrap();
        for (t, v) in values.iter().enumerate() {
            if let Some(v) = v {
                assert_eq!(mesh.elevation_t()[t], *v);
            }
        }
        assert_eq!(mesh.sea_level(), 0.1);
    }

    #[test]
    fn region_overlay_wins() {
        let (mut mesh, peaks) = setup();
        let n = mesh.num_regions();
        let values: Vec<Option<f32>> = (0..n)
            .map(|r| (r % 3 == 0).then_some(r as f32 * 0.01))
            .collect();
        let constraints = Constraints::regions(values.clone(), 0.0);
        assign_elevation(&mut mesh, &peaks, &ElevationParams::default(), &constraints).unwrap();
        for (r, v) in values.iter().enumerate() {
            if let Some(v) = v {
                assert_eq!(mesh.elevation_r()[r], *v);
            }
        }
    }

    #[test]
    fn region_elevation_is_mean_of_triangles() {
        let (mut mesh, peaks) = setup();
        assign_elevation(&mut mesh, &peaks, &ElevationParams::default(), &Constraints::default())
            .unwrap();
        let r = 300;
        let tris = mesh.region_triangles(r);
        let sum: f32 = tris.iter().map(|&t| mesh.elevation_t()[t as usize]).sum();
        let mean = sum / tris.len() as f32;
        assert!((mesh.elevation_r()[r as usize] - mean).abs() < 1e-6);
    }

    #[test]
    fn wrong_overlay_size_leaves_mesh_untouched() {
        let (mut mesh, peaks) = setup();
        assign_elevation(&mut mesh, &peaks, &ElevationParams::default(), &Constraints::default())
            .unwrap();
        let before = mesh.clone();
        let constraints = Constraints::regions(vec![Some(1.0); 3], 0.0);
        let err = assign_elevation(&mut mesh, &peaks, &seeded(7), &constraints).unwrap_err();
        assert_eq!(
            err,
            EngineError::ConstraintsSize {
                layer: ConstraintLayer::Regions,
                expected: mesh.num_regions(),
                actual: 3,
            }
        );
        assert_eq!(mesh.elevation_t(), before.elevation_t());
        assert_eq!(mesh.elevation_r(), before.elevation_r());
        assert_eq!(mesh.stage(), before.stage());
    }

    #[test]
    fn unbuilt_mesh_is_a_state_error() {
        let mut mesh = Mesh::default();
        let params = ElevationParams::default();
        let err = assign_elevation(&mut mesh, &[], &params, &Constraints::default()).unwrap_err();
        assert!(matches!(err, EngineError::State { requires: MeshStage::Built, .. }));
    }

    #[test]
    fn out_of_range_peak_is_rejected() {
        let (mut mesh, _) = setup();
        let bad = mesh.num_triangles() as u32;
        let params = ElevationParams::default();
        let err =
            assign_elevation(&mut mesh, &[bad], &params, &Constraints::default()).unwrap_err();
        assert_eq!(
            err,
            EngineError::InvalidPeak {
                peak: bad,
                triangles: bad as usize
            }
        );
    }

    #[test]
    fn cancellation_writes_nothing() {
        let (mut mesh, peaks) = setup();
        let token = CancelToken::new();
        token.cancel();
        let err = assign_elevation_with(
            &mut mesh,
            &peaks,
            &ElevationParams::default(),
            &Constraints::default(),
            &token,
        )
        .unwrap_err();
        assert_eq!(err, EngineError::Cancelled);
        assert_eq!(mesh.stage(), MeshStage::Built);
    }

    #[test]
    fn adjacent_triangles_stay_close_under_jaggedness() {
        let (mut mesh, peaks) = setup();
        let params = ElevationParams {
            mountain_jaggedness: 2.0,
            noisy_coastlines: 0.0,
            hill_height: 0.0,
            ..Default::default()
        };
        assign_elevation(&mut mesh, &peaks, &params, &Constraints::default()).unwrap();
        let e = mesh.elevation_t();
        let mut worst = 0.0f32;
        for t in 0..mesh.num_triangles() as u32 {
            for n in mesh.adjacent(t) {
                worst = worst.max((e[t as usize] - e[n as usize]).abs());
            }
        }
        // Range is roughly [-1, 1]; a single edge never jumps across most of it.
        assert!(worst < 1.0, "largest step {worst}");
    }
}
