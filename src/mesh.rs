//! Dual mesh: a Delaunay triangulation plus its Voronoi dual, stored as flat
//! arena-indexed arrays.
//!
//! - **Region**: one per input point (Voronoi cell). Region id == point id.
//! - **Triangle**: Delaunay triangle; its centre is the dual Voronoi vertex.
//!
//! Topology is fixed once the mesh is built. Later stages only write the
//! scalar arrays they own (`elevation_*`, `flow_t`, `downhill_t`).

use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use crate::cancel::CancelToken;
use crate::delaunay::triangulate;
use crate::error::{DegenerateInput, MeshStage, Result};
use crate::sampler::sample_points;

/// Sentinel for "no triangle".
pub const NONE: u32 = u32::MAX;

#[derive(Clone, Debug, Default, Serialize)]
pub struct Mesh {
    points: Vec<[f32; 2]>,
    triangles: Vec<u32>,
    regions: Vec<u32>,
    is_boundary: Vec<bool>,
    elevation_t: Vec<f32>,
    elevation_r: Vec<f32>,
    flow_t: Vec<f32>,
    sea_level: f32,
    stage: MeshStage,

    #[serde(skip)]
    downhill_t: Vec<u32>,
    /// Triangle across edge `(v[i], v[(i+1)%3])`, 3 per triangle, `NONE` on the hull.
    #[serde(skip)]
    adjacent_t: Vec<u32>,
    #[serde(skip)]
    centers_t: Vec<[f32; 2]>,
    /// CSR incidence region → triangles.
    #[serde(skip)]
    region_offsets: Vec<u32>,
    #[serde(skip)]
    region_tris: Vec<u32>,
    #[serde(skip)]
    hull_r: Vec<bool>,
}

impl Mesh {
    /// Sample `point_count` points from `seed` and build the dual mesh.
    pub fn build(point_count: usize, seed: u64) -> Result<Self> {
        Self::build_with(point_count, seed, &CancelToken::never())
    }

    pub fn build_with(point_count: usize, seed: u64, cancel: &CancelToken) -> Result<Self> {
        if point_count < 3 {
            return Err(DegenerateInput::TooFewPoints(point_count).into());
        }
        let points = sample_points(point_count, seed);
        cancel.checkpoint()?;
        Self::from_points_with(points, cancel)
    }

    /// Triangulate caller-supplied points.
    pub fn from_points(points: Vec<[f32; 2]>) -> Result<Self> {
        Self::from_points_with(points, &CancelToken::never())
    }

    pub fn from_points_with(points: Vec<[f32; 2]>, cancel: &CancelToken) -> Result<Self> {
        let triangles = triangulate(&points, cancel)?;
        cancel.checkpoint()?;
        let mesh = Self::from_triangulation(points, triangles);
        debug_assert!(mesh.validate().is_ok(), "{:?}", mesh.validate());
        debug!(
            points = mesh.num_regions(),
            triangles = mesh.num_triangles(),
            hull = mesh.hull_r.iter().filter(|&&h| h).count(),
            "dual mesh built"
        );
        Ok(mesh)
    }

    fn from_triangulation(points: Vec<[f32; 2]>, triangles: Vec<u32>) -> Self {
        let num_r = points.len();
        let num_t = triangles.len() / 3;

        // Pair each directed edge with its reverse to find neighbours.
        let mut edge_owner: HashMap<(u32, u32), u32> = HashMap::with_capacity(triangles.len());
        for e in 0..triangles.len() {
            edge_owner.insert(edge_endpoints(&triangles, e), e as u32);
        }
        let mut adjacent_t = vec![NONE; triangles.len()];
        let mut hull_r = vec![false; num_r];
        for e in 0..triangles.len() {
            let (a, b) = edge_endpoints(&triangles, e);
            match edge_owner.get(&(b, a)) {
                Some(&opp) => adjacent_t[e] = opp / 3,
                None => {
                    hull_r[a as usize] = true;
                    hull_r[b as usize] = true;
                }
            }
        }

        let is_boundary: Vec<bool> = triangles
            .chunks_exact(3)
            .map(|t| t.iter().any(|&v| hull_r[v as usize]))
            .collect();

        let centers_t: Vec<[f32; 2]> = triangles
            .chunks_exact(3)
            .map(|t| {
                let [a, b, c] = [t[0], t[1], t[2]].map(|v| points[v as usize]);
                [(a[0] + b[0] + c[0]) / 3.0, (a[1] + b[1] + c[1]) / 3.0]
            })
            .collect();

        let mut region_offsets = vec![0u32; num_r + 1];
        for &v in &triangles {
            region_offsets[v as usize + 1] += 1;
        }
        for r in 0..num_r {
            region_offsets[r + 1] += region_offsets[r];
        }
        let mut fill = region_offsets.clone();
        let mut region_tris = vec![0u32; triangles.len()];
        for (e, &v) in triangles.iter().enumerate() {
            let slot = &mut fill[v as usize];
            region_tris[*slot as usize] = (e / 3) as u32;
            *slot += 1;
        }

        Self {
            regions: (0..num_r as u32).collect(),
            is_boundary,
            elevation_t: vec![0.0; num_t],
            elevation_r: vec![0.0; num_r],
            flow_t: vec![0.0; num_t],
            sea_level: 0.0,
            stage: MeshStage::Built,
            downhill_t: vec![NONE; num_t],
            adjacent_t,
            centers_t,
            region_offsets,
            region_tris,
            hull_r,
            points,
            triangles,
        }
    }

    /// Check the structural invariants. Returns the first violation found.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let num_r = self.points.len();
        let num_t = self.num_triangles();
        if self.triangles.len() % 3 != 0 {
            return Err(format!(
                "triangle list length {} is not a multiple of 3",
                self.triangles.len()
            ));
        }
        if let Some(v) = self.triangles.iter().find(|&&v| v as usize >= num_r) {
            return Err(format!("triangle vertex {v} out of range for {num_r} points"));
        }
        if self.elevation_t.len() != num_t
            || self.flow_t.len() != num_t
            || self.is_boundary.len() != num_t
        {
            return Err("per-triangle array length mismatch".into());
        }
        if self.elevation_r.len() != num_r || self.regions.len() != num_r {
            return Err("per-region array length mismatch".into());
        }
        for (e, &n) in self.adjacent_t.iter().enumerate() {
            if n == NONE {
                continue;
            }
            if n as usize >= num_t {
                return Err(format!("edge {e} points at missing triangle {n}"));
            }
            let t = (e / 3) as u32;
            if !self.adjacent(n).any(|back| back == t) {
                return Err(format!("triangles {t} and {n} disagree on adjacency"));
            }
        }
        Ok(())
    }

    // === Accessors ===

    pub fn points(&self) -> &[[f32; 2]] {
        &self.points
    }

    pub fn triangles(&self) -> &[u32] {
        &self.triangles
    }

    pub fn regions(&self) -> &[u32] {
        &self.regions
    }

    pub fn is_boundary(&self) -> &[bool] {
        &self.is_boundary
    }

    pub fn elevation_t(&self) -> &[f32] {
        &self.elevation_t
    }

    pub fn elevation_r(&self) -> &[f32] {
        &self.elevation_r
    }

    pub fn flow_t(&self) -> &[f32] {
        &self.flow_t
    }

    /// Downhill neighbour per triangle, `NONE` for sinks.
    pub fn downhill_t(&self) -> &[u32] {
        &self.downhill_t
    }

    pub fn sea_level(&self) -> f32 {
        self.sea_level
    }

    pub fn stage(&self) -> MeshStage {
        self.stage
    }

    pub fn num_triangles(&self) -> usize {
        self.triangles.len() / 3
    }

    pub fn num_regions(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn triangle(&self, t: u32) -> [u32; 3] {
        let i = 3 * t as usize;
        [self.triangles[i], self.triangles[i + 1], self.triangles[i + 2]]
    }

    /// Triangles sharing an edge with `t`.
    #[inline]
    pub fn adjacent(&self, t: u32) -> impl Iterator<Item = u32> + '_ {
        let i = 3 * t as usize;
        self.adjacent_t[i..i + 3].iter().copied().filter(|&n| n != NONE)
    }

    /// Centroid of triangle `t`.
    #[inline]
    pub fn center(&self, t: u32) -> [f32; 2] {
        self.centers_t[t as usize]
    }

    /// Triangles incident to region `r`, i.e. the corners of its Voronoi cell.
    pub fn region_triangles(&self, r: u32) -> &[u32] {
        let lo = self.region_offsets[r as usize] as usize;
        let hi = self.region_offsets[r as usize + 1] as usize;
        &self.region_tris[lo..hi]
    }

    /// True when the region's Voronoi cell is unbounded (its point is on the hull).
    pub fn is_hull_region(&self, r: u32) -> bool {
        self.hull_r[r as usize]
    }

    pub fn is_land_region(&self, r: u32) -> bool {
        self.elevation_r[r as usize] >= self.sea_level
    }

    // === Stage writers ===

    pub(crate) fn write_elevation(
        &mut self,
        elevation_t: Vec<f32>,
        elevation_r: Vec<f32>,
        sea_level: f32,
    ) {
        debug_assert_eq!(elevation_t.len(), self.num_triangles());
        debug_assert_eq!(elevation_r.len(), self.num_regions());
        self.elevation_t = elevation_t;
        self.elevation_r = elevation_r;
        self.sea_level = sea_level;
        self.stage = MeshStage::Elevated;
    }

    pub(crate) fn write_flow(&mut self, flow_t: Vec<f32>, downhill_t: Vec<u32>) {
        debug_assert_eq!(flow_t.len(), self.num_triangles());
        self.flow_t = flow_t;
        self.downhill_t = downhill_t;
        self.stage = MeshStage::Rivered;
    }
}

#[inline]
fn edge_endpoints(triangles: &[u32], e: usize) -> (u32, u32) {
    let next = if e % 3 == 2 { e - 2 } else { e + 1 };
    (triangles[e], triangles[next])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    #[test]
    fn built_mesh_satisfies_invariants() {
        let mesh = Mesh::build(600, 17).unwrap();
        assert_eq!(mesh.stage(), MeshStage::Built);
        assert!(mesh.validate().is_ok());
        assert_eq!(mesh.triangles().len() % 3, 0);
        assert!(mesh.triangles().iter().all(|&v| (v as usize) < mesh.points().len()));
        assert_eq!(mesh.elevation_t().len(), mesh.triangles().len() / 3);
        assert_eq!(mesh.elevation_r().len(), mesh.points().len());
        assert_eq!(mesh.regions(), (0..600).collect::<Vec<u32>>().as_slice());
    }

    #[test]
    fn build_is_deterministic() {
        let a = Mesh::build(300, 5).unwrap();
        let b = Mesh::build(300, 5).unwrap();
        assert_eq!(a.points(), b.points());
        assert_eq!(a.triangles(), b.triangles());
    }

    #[test]
    fn every_region_has_triangles() {
        let mesh = Mesh::build(400, 2).unwrap();
        for r in 0..mesh.num_regions() as u32 {
            let tris = mesh.region_triangles(r);
            assert!(!tris.is_empty());
            assert!(tris.iter().all(|&t| mesh.triangle(t).contains(&r)));
        }
    }

    #[test]
    fn boundary_flags_follow_hull_vertices() {
        let mesh = Mesh::build(400, 8).unwrap();
        for t in 0..mesh.num_triangles() as u32 {
            let touches_hull = mesh.triangle(t).iter().any(|&r| mesh.is_hull_region(r));
            assert_eq!(mesh.is_boundary()[t as usize], touches_hull);
        }
        // A triangle with a missing neighbour sits on the hull.
        for t in 0..mesh.num_triangles() as u32 {
            if mesh.adjacent(t).count() < 3 {
                assert!(mesh.is_boundary()[t as usize]);
            }
        }
        // Corners of the unit square are on the hull; interior points are not.
        assert!(mesh.is_hull_region(0));
        assert!(!mesh.is_hull_region(mesh.num_regions() as u32 - 1));
    }

    #[test]
    fn convex_ring_is_all_boundary() {
        let points: Vec<[f32; 2]> = (0..12)
            .map(|i| {
                let a = i as f32 / 12.0 * std::f32::consts::TAU;
                [0.5 + 0.4 * a.cos(), 0.5 + 0.4 * a.sin()]
            })
            .collect();
        let mesh = Mesh::from_points(points).unwrap();
        assert_eq!(mesh.num_triangles(), 10);
        assert!(mesh.is_boundary().iter().all(|&b| b));
    }

    #[test]
    fn two_points_are_degenerate() {
        assert_eq!(
            Mesh::build(2, 1).unwrap_err(),
            EngineError::DegenerateInput(DegenerateInput::TooFewPoints(2))
        );
    }

    #[test]
    fn default_mesh_is_unbuilt() {
        let mesh = Mesh::default();
        assert_eq!(mesh.stage(), MeshStage::Unbuilt);
        assert_eq!(mesh.num_triangles(), 0);
    }
}
