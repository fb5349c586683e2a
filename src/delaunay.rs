//! Incremental Bowyer–Watson Delaunay triangulation.
//!
//! Points are inserted in x order. A triangle whose circumcircle lies entirely
//! left of the sweep can never be invalidated again, so it is retired from the
//! working set; on evenly spread input the working set stays a thin strip.
//! Geometry is evaluated in f64.

use crate::cancel::CancelToken;
use crate::error::{DegenerateInput, Result};

/// Relative tolerance for the in-circle test. Cocircular points count as outside,
/// which keeps the cavity strictly star-shaped around the inserted point.
const INCIRCLE_EPS: f64 = 1e-10;

/// Relative tolerance for collinearity of the whole input.
const COLLINEAR_EPS: f64 = 1e-9;

/// Distance of the enclosing super triangle, in multiples of the input extent.
const SUPER_SCALE: f64 = 100.0;

const CHECKPOINT_EVERY: usize = 1024;

#[derive(Clone, Copy)]
struct Tri {
    v: [usize; 3],
    cx: f64,
    cy: f64,
    r2: f64,
}

impl Tri {
    fn new(v: [usize; 3], pts: &[[f64; 2]]) -> Self {
        let (cx, cy, r2) = circumcircle(pts[v[0]], pts[v[1]], pts[v[2]]);
        Self { v, cx, cy, r2 }
    }
}

#[inline]
fn orient(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> f64 {
    (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])
}

/// Circumcentre and squared radius. Collinear triples get an infinite circle,
/// which is never retired and never contains a point.
fn circumcircle(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> (f64, f64, f64) {
    let d = 2.0 * (a[0] * (b[1] - c[1]) + b[0] * (c[1] - a[1]) + c[0] * (a[1] - b[1]));
    if d == 0.0 {
        return (f64::INFINITY, f64::INFINITY, f64::INFINITY);
    }
    let a2 = a[0] * a[0] + a[1] * a[1];
    let b2 = b[0] * b[0] + b[1] * b[1];
    let c2 = c[0] * c[0] + c[1] * c[1];
    let ux = (a2 * (b[1] - c[1]) + b2 * (c[1] - a[1]) + c2 * (a[1] - b[1])) / d;
    let uy = (a2 * (c[0] - b[0]) + b2 * (a[0] - c[0]) + c2 * (b[0] - a[0])) / d;
    let dx = a[0] - ux;
    let dy = a[1] - uy;
    (ux, uy, dx * dx + dy * dy)
}

/// Reject inputs that cannot form a closed region.
fn check_input(pts: &[[f64; 2]], order: &[usize]) -> std::result::Result<(), DegenerateInput> {
    let n = pts.len();
    if n < 3 {
        return Err(DegenerateInput::TooFewPoints(n));
    }

    // Duplicates are adjacent once sorted.
    for pair in order.windows(2) {
        if pts[pair[0]] == pts[pair[1]] {
            let (first, index) = (pair[0].min(pair[1]), pair[0].max(pair[1]));
            return Err(DegenerateInput::DuplicatePoint { index, first });
        }
    }

    let p0 = pts[order[0]];
    let p1 = pts[order[n - 1]];
    let base = ((p1[0] - p0[0]).powi(2) + (p1[1] - p0[1]).powi(2)).sqrt();
    let all_collinear = order.iter().all(|&i| {
        let p = pts[i];
        let len = ((p[0] - p0[0]).powi(2) + (p[1] - p0[1]).powi(2)).sqrt();
        orient(p0, p1, p).abs() <= COLLINEAR_EPS * base * len.max(base)
    });
    if all_collinear {
        return Err(DegenerateInput::Collinear(n));
    }
    Ok(())
}

/// Triangulate `points`, returning counter-clockwise index triples.
///
/// Fails with `DegenerateInput` for fewer than 3 points, collinear input,
/// duplicated or non-finite points.
pub fn triangulate(points: &[[f32; 2]], cancel: &CancelToken) -> Result<Vec<u32>> {
    if let Some(i) = points.iter().position(|p| !p[0].is_finite() || !p[1].is_finite()) {
        return Err(DegenerateInput::NonFinite(i).into());
    }

    let n = points.len();
    let mut pts: Vec<[f64; 2]> = points.iter().map(|p| [p[0] as f64, p[1] as f64]).collect();

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_unstable_by(|&a, &b| {
        pts[a][0]
            .total_cmp(&pts[b][0])
            .then(pts[a][1].total_cmp(&pts[b][1]))
    });
    check_input(&pts, &order)?;

    // Super triangle vertices live at indices n, n+1, n+2.
    let (mut min_x, mut min_y) = (f64::MAX, f64::MAX);
    let (mut max_x, mut max_y) = (f64::MIN, f64::MIN);
    for p in &pts {
        min_x = min_x.min(p[0]);
        min_y = min_y.min(p[1]);
        max_x = max_x.max(p[0]);
        max_y = max_y.max(p[1]);
    }
    let extent = (max_x - min_x).max(max_y - min_y).max(f64::EPSILON);
    let mid_x = 0.5 * (min_x + max_x);
    let mid_y = 0.5 * (min_y + max_y);
    let s = SUPER_SCALE * extent;
    pts.push([mid_x - s, mid_y - s]);
    pts.push([mid_x + s, mid_y - s]);
    pts.push([mid_x, mid_y + s]);

    let mut open = vec![Tri::new([n, n + 1, n + 2], &pts)];
    let mut closed: Vec<Tri> = Vec::with_capacity(2 * n);
    let mut edges: Vec<(usize, usize)> = Vec::new();

    for (k, &pi) in order.iter().enumerate() {
        if k % CHECKPOINT_EVERY == 0 {
            cancel.checkpoint()?;
        }
        let p = pts[pi];
        edges.clear();

        let mut i = 0;
        while i < open.len() {
            let tri = open[i];
            let dx = p[0] - tri.cx;
            let dy = p[1] - tri.cy;
            if dx > 0.0 && dx * dx > tri.r2 {
                closed.push(open.swap_remove(i));
                continue;
            }
            if dx * dx + dy * dy < tri.r2 * (1.0 - INCIRCLE_EPS) {
                let [a, b, c] = tri.v;
                edges.extend([(a, b), (b, c), (c, a)]);
                open.swap_remove(i);
                continue;
            }
            i += 1;
        }

        // Edges shared by two removed triangles are interior to the cavity.
        for e in edges.iter_mut() {
            if e.0 > e.1 {
                *e = (e.1, e.0);
            }
        }
        edges.sort_unstable();
        let mut j = 0;
        while j < edges.len() {
            if j + 1 < edges.len() && edges[j] == edges[j + 1] {
                j += 2;
                continue;
            }
            let (a, b) = edges[j];
            let v = if orient(pts[a], pts[b], p) > 0.0 {
                [a, b, pi]
            } else {
                [b, a, pi]
            };
            open.push(Tri::new(v, &pts));
            j += 1;
        }
    }
    closed.append(&mut open);

    let mut triangles = Vec::with_capacity(closed.len() * 3);
    for tri in closed {
        if tri.v.iter().any(|&v| v >= n) {
            continue;
        }
        let [a, b, c] = tri.v;
        let area = orient(pts[a], pts[b], pts[c]);
        if area == 0.0 {
            continue;
        }
        let v = if area > 0.0 { [a, b, c] } else { [a, c, b] };
        triangles.extend(v.iter().map(|&i| i as u32));
    }
    Ok(triangles)
}
