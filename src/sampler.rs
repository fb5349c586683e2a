use crate::mesh::Mesh;
use crate::rng::Rng;

const SALT_JITTER: u64 = 0x5A3B_1E00_CAFE_0001;
const SALT_PEAKS: u64 = 0x9EA6_5000_BEEF_0002;

/// Fraction of a grid cell a point may wander from the cell centre.
const JITTER: f32 = 0.8;

/// Boundary points per side of the unit square for a total of `count` points.
fn boundary_per_side(count: usize) -> usize {
    ((count as f32).sqrt() * 0.75).floor().max(1.0) as usize
}

/// Evenly spaced points walking the unit square's perimeter, starting at the origin.
fn boundary_ring(n: usize) -> Vec<[f32; 2]> {
    (0..n)
        .map(|i| {
            let t = i as f32 * 4.0 / n as f32;
            let side = (t.floor() as usize).min(3);
            let f = t - side as f32;
            match side {
                0 => [f, 0.0],
                1 => [1.0, f],
                2 => [1.0 - f, 1.0],
                _ => [0.0, 1.0 - f],
            }
        })
        .collect()
}

/// Sample `count` points over the unit square: a ring of padding points on the
/// border (so the hull is the square itself) followed by a jittered grid inside.
///
/// Interior points sit in distinct cells of a grid with positive extent, strictly
/// inside the ring, so no two points coincide.
pub fn sample_points(count: usize, seed: u64) -> Vec<[f32; 2]> {
    let per_side = boundary_per_side(count);
    let ring = (4 * per_side).min(count);
    let mut points = boundary_ring(ring);

    let interior = count - ring;
    if interior == 0 {
        return points;
    }

    // Keep interior points half a boundary spacing away from the border, but
    // never squeeze the interior grid below half the domain.
    let margin = (0.5 / per_side as f32).min(0.25);
    let span = 1.0 - 2.0 * margin;
    let cols = (interior as f32).sqrt().ceil() as usize;
    let rows = interior.div_ceil(cols);
    let cell_w = span / cols as f32;
    let cell_h = span / rows as f32;

    let mut rng = Rng::new(seed ^ SALT_JITTER);
    let mut cells: Vec<usize> = (0..rows * cols).collect();
    rng.shuffle(&mut cells);
    cells.truncate(interior);
    cells.sort_unstable();

    points.extend(cells.into_iter().map(|cell| {
        let cx = (cell % cols) as f32;
        let cy = (cell / cols) as f32;
        let jx = 0.5 + JITTER * (rng.next_f32() - 0.5);
        let jy = 0.5 + JITTER * (rng.next_f32() - 0.5);
        [margin + (cx + jx) * cell_w, margin + (cy + jy) * cell_h]
    }));
    points
}

/// Pick up to `count` distinct interior triangles as mountain seeds.
/// Attempts to place them with minimum separation, relaxing it when stuck.
pub fn choose_peaks(mesh: &Mesh, count: usize, seed: u64) -> Vec<u32> {
    let candidates: Vec<u32> = (0..mesh.num_triangles() as u32)
        .filter(|&t| !mesh.is_boundary()[t as usize])
        .collect();
    let count = count.min(candidates.len());
    if count == 0 {
        return Vec::new();
    }

    let mut rng = Rng::new(seed ^ SALT_PEAKS);
    let mut min_dist = (1.0 / count as f32).sqrt() * 0.5;
    let mut peaks: Vec<u32> = Vec::with_capacity(count);
    let mut attempts = 0usize;
    let relax_interval = count * 50;

    while peaks.len() < count && attempts < count * 2000 {
        let t = candidates[rng.range_usize(candidates.len())];
        let c = mesh.center(t);
        let ok = peaks.iter().all(|&p| {
            let q = mesh.center(p);
            let dx = q[0] - c[0];
            let dy = q[1] - c[1];
            (dx * dx + dy * dy).sqrt() >= min_dist
        });
        if ok && !peaks.contains(&t) {
            peaks.push(t);
        }
        attempts += 1;
        if attempts % relax_interval == 0 {
            min_dist *= 0.85;
        }
    }

    // Fallback: fill the remainder from unused candidates.
    if peaks.len() < count {
        let mut rest: Vec<u32> = candidates.into_iter().filter(|t| !peaks.contains(t)).collect();
        rng.shuffle(&mut rest);
        peaks.extend(rest.into_iter().take(count - peaks.len()));
    }
    peaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_count_and_domain() {
        for count in (3..=16).chain([100, 1000]) {
            let pts = sample_points(count, 1);
            assert_eq!(pts.len(), count);
            assert!(
                pts.iter()
                    .all(|p| (0.0..=1.0).contains(&p[0]) && (0.0..=1.0).contains(&p[1]))
            );
            let mut sorted = pts.clone();
            sorted.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
            sorted.dedup();
            assert_eq!(sorted.len(), count, "{count} points contain duplicates");
        }
    }

    #[test]
    fn small_counts_build_meshes() {
        for count in 3..60 {
            for seed in 0..3 {
                let mesh = Mesh::build(count, seed);
                assert!(mesh.is_ok(), "{count} points, seed {seed}: {:?}", mesh.err());
            }
        }
    }

    #[test]
    fn ring_covers_all_four_sides() {
        let ring = boundary_ring(8);
        assert_eq!(ring[0], [0.0, 0.0]);
        assert_eq!(ring[2], [1.0, 0.0]);
        assert_eq!(ring[4], [1.0, 1.0]);
        assert_eq!(ring[6], [0.0, 1.0]);
    }

    #[test]
    fn sampling_is_deterministic() {
        assert_eq!(sample_points(500, 9), sample_points(500, 9));
        assert_ne!(sample_points(500, 9), sample_points(500, 10));
    }

    #[test]
    fn peaks_are_distinct_interior_triangles() {
        let mesh = Mesh::build(800, 3).unwrap();
        let peaks = choose_peaks(&mesh, 10, 3);
        assert_eq!(peaks.len(), 10);
        for (i, &p) in peaks.iter().enumerate() {
            assert!(!mesh.is_boundary()[p as usize]);
            assert!(!peaks[i + 1..].contains(&p));
        }
        assert_eq!(peaks, choose_peaks(&mesh, 10, 3));
    }

    #[test]
    fn no_interior_means_no_peaks() {
        let mesh = Mesh::build(4, 0).unwrap();
        assert!(choose_peaks(&mesh, 5, 0).is_empty());
    }
}
