//! Static PNG previews of a mesh. Diagnostic only; pixel rows are filled in
//! parallel from per-row triangle buckets.

use rayon::prelude::*;

use crate::hydrology::RiverSegment;
use crate::mesh::Mesh;

const WATER_DEEP: [u8; 4] = [18, 36, 70, 255];
const WATER_MID: [u8; 4] = [32, 55, 92, 255];
const WATER_SHALLOW: [u8; 4] = [38, 78, 120, 255];
const COAST_SHALLOW: [u8; 4] = [52, 100, 145, 255];
const LAND_LOW: [u8; 4] = [70, 130, 62, 255];
const LAND_MID: [u8; 4] = [140, 180, 100, 255];
const LAND_HIGH: [u8; 4] = [190, 170, 120, 255];
const MOUNTAIN_LOW: [u8; 4] = [140, 120, 100, 255];
const MOUNTAIN_HIGH: [u8; 4] = [220, 220, 215, 255];
const BEACH_SAND: [u8; 4] = [210, 200, 160, 255];

const RIVER_BLUE: [u8; 4] = [15, 40, 140, 255];

const MESH_INTERIOR: [u8; 4] = [235, 232, 220, 255];
const MESH_BOUNDARY: [u8; 4] = [200, 90, 70, 255];
const MESH_EDGE: [u8; 4] = [60, 60, 70, 255];

#[inline]
fn lerp_color(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    [
        (a[0] as f32 + (b[0] as f32 - a[0] as f32) * t).round() as u8,
        (a[1] as f32 + (b[1] as f32 - a[1] as f32) * t).round() as u8,
        (a[2] as f32 + (b[2] as f32 - a[2] as f32) * t).round() as u8,
        255,
    ]
}

/// Colour for an elevation, relative to sea level and the mesh's extremes.
fn elevation_color(e: f32, sea: f32, min_e: f32, max_e: f32) -> [u8; 4] {
    if e < sea {
        let depth = (sea - e) / (sea - min_e).max(1e-6);
        if depth < 0.15 {
            lerp_color(COAST_SHALLOW, WATER_SHALLOW, depth / 0.15)
        } else if depth < 0.5 {
            lerp_color(WATER_SHALLOW, WATER_MID, (depth - 0.15) / 0.35)
        } else {
            lerp_color(WATER_MID, WATER_DEEP, (depth - 0.5) / 0.5)
        }
    } else {
        let h = (e - sea) / (max_e - sea).max(1e-6);
        if h < 0.02 {
            BEACH_SAND
        } else if h < 0.3 {
            lerp_color(LAND_LOW, LAND_MID, (h - 0.02) / 0.28)
        } else if h < 0.6 {
            lerp_color(LAND_MID, LAND_HIGH, (h - 0.3) / 0.3)
        } else {
            lerp_color(MOUNTAIN_LOW, MOUNTAIN_HIGH, (h - 0.6) / 0.4)
        }
    }
}

#[inline]
fn to_pixel(p: [f32; 2], w: usize, h: usize) -> [f32; 2] {
    [p[0] * w as f32, p[1] * h as f32]
}

#[inline]
fn edge_fn(a: [f32; 2], b: [f32; 2], p: [f32; 2]) -> f32 {
    (b[0] - a[0]) * (p[1] - a[1]) - (b[1] - a[1]) * (p[0] - a[0])
}

/// Fill every triangle with `color(t)` into a `w`×`h` RGBA buffer.
fn rasterize<F>(mesh: &Mesh, w: usize, h: usize, color: F) -> Vec<u8>
where
    F: Fn(u32) -> [u8; 4] + Sync,
{
    let mut rgba = vec![0u8; w * h * 4];
    if w == 0 || h == 0 {
        return rgba;
    }

    let mut rows: Vec<Vec<u32>> = vec![Vec::new(); h];
    for t in 0..mesh.num_triangles() as u32 {
        let [a, b, c] = mesh.triangle(t).map(|v| to_pixel(mesh.points()[v as usize], w, h));
        let lo = a[1].min(b[1]).min(c[1]).floor().max(0.0) as usize;
        let hi = (a[1].max(b[1]).max(c[1]).ceil() as usize).min(h - 1);
        for row in rows.iter_mut().take(hi + 1).skip(lo) {
            row.push(t);
        }
    }

    rgba.par_chunks_mut(w * 4).enumerate().for_each(|(y, row)| {
        let py = y as f32 + 0.5;
        for &t in &rows[y] {
            let [a, b, c] = mesh.triangle(t).map(|v| to_pixel(mesh.points()[v as usize], w, h));
            let x0 = a[0].min(b[0]).min(c[0]).floor().max(0.0) as usize;
            let x1 = (a[0].max(b[0]).max(c[0]).ceil() as usize).min(w - 1);
            let fill = color(t);
            for x in x0..=x1 {
                let p = [x as f32 + 0.5, py];
                // Triangles are CCW, so inside means all edge functions are non-negative.
                let inside = edge_fn(a, b, p) >= 0.0
                    && edge_fn(b, c, p) >= 0.0
                    && edge_fn(c, a, p) >= 0.0;
                if inside {
                    row[x * 4..x * 4 + 4].copy_from_slice(&fill);
                }
            }
        }
    });
    rgba
}

/// Stamp a disc-brush line from `a` to `b` (pixel coordinates).
fn stamp_line(
    rgba: &mut [u8],
    w: usize,
    h: usize,
    a: [f32; 2],
    b: [f32; 2],
    radius: f32,
    color: [u8; 4],
) {
    let len = ((b[0] - a[0]).powi(2) + (b[1] - a[1]).powi(2)).sqrt();
    let steps = (len / radius.max(0.5)).ceil().max(1.0) as usize;
    let r = radius.ceil() as i64;
    for i in 0..=steps {
        let f = i as f32 / steps as f32;
        let cx = a[0] + (b[0] - a[0]) * f;
        let cy = a[1] + (b[1] - a[1]) * f;
        for dy in -r..=r {
            for dx in -r..=r {
                let x = cx as i64 + dx;
                let y = cy as i64 + dy;
                if x < 0 || y < 0 || x >= w as i64 || y >= h as i64 {
                    continue;
                }
                if ((dx * dx + dy * dy) as f32) > radius * radius + 0.25 {
                    continue;
                }
                let i = (y as usize * w + x as usize) * 4;
                rgba[i..i + 4].copy_from_slice(&color);
            }
        }
    }
}

/// Per-triangle elevation with the land/water palette.
pub fn render_elevation(mesh: &Mesh, w: usize, h: usize) -> Vec<u8> {
    let elev = mesh.elevation_t();
    if elev.is_empty() {
        return render_mesh(mesh, w, h);
    }
    let min_e = elev.iter().copied().fold(f32::INFINITY, f32::min);
    let max_e = elev.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let sea = mesh.sea_level();
    rasterize(mesh, w, h, |t| elevation_color(elev[t as usize], sea, min_e, max_e))
}

/// Elevation base with river segments stroked on top. `width` is in pixels.
pub fn render_rivers(mesh: &Mesh, segments: &[RiverSegment], w: usize, h: usize) -> Vec<u8> {
    let mut rgba = render_elevation(mesh, w, h);
    for s in segments {
        let a = to_pixel(s.a, w, h);
        let b = to_pixel(s.b, w, h);
        stamp_line(&mut rgba, w, h, a, b, (0.5 * s.width).max(0.5), RIVER_BLUE);
    }
    rgba
}

/// Topology preview: boundary triangles highlighted, every edge outlined.
pub fn render_mesh(mesh: &Mesh, w: usize, h: usize) -> Vec<u8> {
    let boundary = mesh.is_boundary();
    let mut rgba = rasterize(mesh, w, h, |t| {
        if boundary[t as usize] { MESH_BOUNDARY } else { MESH_INTERIOR }
    });
    for t in 0..mesh.num_triangles() as u32 {
        let [a, b, c] = mesh.triangle(t).map(|v| to_pixel(mesh.points()[v as usize], w, h));
        for (p, q) in [(a, b), (b, c), (c, a)] {
            stamp_line(&mut rgba, w, h, p, q, 0.5, MESH_EDGE);
        }
    }
    rgba
}
