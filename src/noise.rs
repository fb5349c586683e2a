use crate::rng::hash2;

#[inline]
fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Dot product with one of 8 unit gradients picked by the lattice hash.
#[inline]
fn grad(hash: u32, dx: f32, dy: f32) -> f32 {
    const D: f32 = std::f32::consts::FRAC_1_SQRT_2;
    match hash & 7 {
        0 => dx,
        1 => -dx,
        2 => dy,
        3 => -dy,
        4 => D * (dx + dy),
        5 => D * (dx - dy),
        6 => D * (-dx + dy),
        _ => D * (-dx - dy),
    }
}

/// 2D gradient noise, roughly in [-1, 1].
pub fn gradient_noise(x: f32, y: f32, seed: u32) -> f32 {
    let ix = x.floor() as i32;
    let iy = y.floor() as i32;
    let fx = x - ix as f32;
    let fy = y - iy as f32;

    let v00 = grad(hash2(ix, iy, seed), fx, fy);
    let v10 = grad(hash2(ix + 1, iy, seed), fx - 1.0, fy);
    let v01 = grad(hash2(ix, iy + 1, seed), fx, fy - 1.0);
    let v11 = grad(hash2(ix + 1, iy + 1, seed), fx - 1.0, fy - 1.0);

    let sx = fade(fx);
    let a = lerp(v00, v10, sx);
    let b = lerp(v01, v11, sx);
    (lerp(a, b, fade(fy)) * std::f32::consts::SQRT_2).clamp(-1.0, 1.0)
}

/// Fractal sum over a unit-domain point. Octaves are rotated ~30° apart
/// so lattice artifacts don't line up.
pub fn fbm(p: [f32; 2], seed: u32, octaves: u32, freq0: f32) -> f32 {
    const COS30: f32 = 0.866025;
    const SIN30: f32 = 0.5;
    let [mut px, mut py] = p;
    let mut sum = 0.0;
    let mut amp = 1.0;
    let mut norm = 0.0;
    let mut freq = freq0;
    for i in 0..octaves {
        sum += gradient_noise(px * freq, py * freq, seed.wrapping_add(i)) * amp;
        norm += amp;
        amp *= 0.5;
        freq *= 2.0;
        (px, py) = (px * COS30 - py * SIN30, px * SIN30 + py * COS30);
    }
    if norm > 0.0 { sum / norm } else { 0.0 }
}
