//! Hashing and sample placement shared by the noise methods.
//!
//! Mirrors the helpers of `shaders/prelude.wgsl`, keep both in sync.
use bytemuck::{Pod, Zeroable};

use crate::error::{Error, Result};
use crate::image::ImageDim;

/// The parameter record of value, gradient and simplex noise.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct NoiseParams {
    /// Seed of every random choice.
    pub global_seed: u32,
    /// The size of a lattice cell, in texels.
    pub scale: f32,
    /// One of the `STATS_*` modes.
    pub stats_mode: i32,
    /// The evaluation point of `STATS_LOOK_AT`, relative to the extent.
    pub stats_look_at: [f32; 2],
}

/// Every texel evaluates the noise at its position.
pub const STATS_NORMAL: i32 = 0;
/// Every texel is an independent realization, evaluated at the image centre.
pub const STATS_PROCESS: i32 = 1;
/// Every texel is an independent realization, evaluated at `stats_look_at`.
pub const STATS_LOOK_AT: i32 = 2;

impl Default for NoiseParams {
    fn default() -> Self {
        NoiseParams {
            global_seed: 0,
            scale: 32.0,
            stats_mode: STATS_NORMAL,
            stats_look_at: [0.5, 0.5],
        }
    }
}

crate::method::pod_params!(NoiseParams);

/// `NoiseParams` as laid out in a uniform block.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
pub(crate) struct NoiseUniforms {
    seed: u32,
    scale: f32,
    stats_mode: i32,
    look_at_x: f32,
    look_at_y: f32,
    _pad: [u32; 3],
}

impl NoiseParams {
    pub(crate) fn check(&self) -> Result<()> {
        if !(self.scale > 0.0) {
            return Err(Error::unsupported(format!(
                "the lattice scale must be positive, got {}",
                self.scale
            )));
        }

        match self.stats_mode {
            STATS_NORMAL | STATS_PROCESS | STATS_LOOK_AT => Ok(()),
            other => Err(Error::unsupported(format!("unknown stats mode {}", other))),
        }
    }

    pub(crate) fn uniforms(&self) -> NoiseUniforms {
        NoiseUniforms {
            seed: self.global_seed,
            scale: self.scale,
            stats_mode: self.stats_mode,
            look_at_x: self.stats_look_at[0],
            look_at_y: self.stats_look_at[1],
            _pad: [0; 3],
        }
    }

    /// Where, and with which seed, to evaluate one channel of a texel.
    pub(crate) fn sample(&self, dim: ImageDim, texel: [usize; 3], channel: usize) -> Sample {
        let base = self
            .global_seed
            .wrapping_add((channel as u32).wrapping_mul(0x9e37_79b9));
        let centre = texel.map(|v| v as f32 + 0.5);
        let extent = [dim.width as f32, dim.height as f32, dim.depth as f32];
        let realization = || hash(base ^ hash(texel_index(dim, texel)));

        let (position, seed) = match self.stats_mode {
            STATS_PROCESS => (extent.map(|v| 0.5 * v), realization()),
            STATS_LOOK_AT => (
                [
                    self.stats_look_at[0] * extent[0],
                    self.stats_look_at[1] * extent[1],
                    centre[2],
                ],
                realization(),
            ),
            _ => (centre, base),
        };

        Sample {
            position: position.map(|v| v / self.scale),
            seed,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct Sample {
    pub position: [f32; 3],
    pub seed: u32,
}

pub(crate) fn hash(mut x: u32) -> u32 {
    x = ((x >> 16) ^ x).wrapping_mul(0x45d9f3b);
    x = ((x >> 16) ^ x).wrapping_mul(0x45d9f3b);
    (x >> 16) ^ x
}

/// Map a hash to `[0, 1)` through the mantissa of a float in `[1, 2)`.
pub(crate) fn to_unit(x: u32) -> f32 {
    f32::from_bits(0x7f << 23 | x >> 9) - 1.0
}

pub(crate) fn lattice_hash(cell: [i32; 3], seed: u32) -> u32 {
    let [x, y, z] = cell.map(|v| v as u32);
    hash(seed ^ hash(x ^ hash(y ^ hash(z))))
}

pub(crate) fn texel_index(dim: ImageDim, [x, y, z]: [usize; 3]) -> u32 {
    ((z * dim.height + y) * dim.width + x) as u32
}

/// The centre of a texel relative to the extent.
pub(crate) fn texel_uv(dim: ImageDim, [x, y, z]: [usize; 3]) -> [f32; 3] {
    [
        (x as f32 + 0.5) / dim.width as f32,
        (y as f32 + 0.5) / dim.height as f32,
        (z as f32 + 0.5) / dim.depth as f32,
    ]
}

/// The quintic fade curve of improved Perlin noise.
pub(crate) fn fade(t: f32) -> f32 {
    t * t * t * (t * (t * 6.0 - 15.0) + 10.0)
}

pub(crate) fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Dot product of the offset with one of the twelve cube edge gradients.
pub(crate) fn grad(hash: u32, [x, y, z]: [f32; 3]) -> f32 {
    let h = hash & 15;
    let u = if h < 8 { x } else { y };
    let v = match h {
        0..=3 => y,
        12 | 14 => x,
        _ => z,
    };

    (if h & 1 == 0 { u } else { -u }) + (if h & 2 == 0 { v } else { -v })
}

/// Map a signed noise value in `[-1, 1]` to `[0, 1]`.
pub(crate) fn to_positive(v: f32) -> f32 {
    (v * 0.5 + 0.5).clamp(0.0, 1.0)
}

#[test]
fn hash_of_zero_is_zero() {
    // White noise with the default seed depends on it.
    assert_eq!(hash(0), 0);
    assert_ne!(hash(1), 1);
}

#[test]
fn unit_range() {
    for x in [0, 1, 0x1ff, 0x200, u32::MAX / 2, u32::MAX] {
        let v = to_unit(x);
        assert!((0.0..1.0).contains(&v), "{} maps to {}", x, v);
    }
}

#[test]
fn process_mode_varies_seed_not_position() {
    let dim = ImageDim::new(4, 4, 1, 1);
    let params = NoiseParams {
        stats_mode: STATS_PROCESS,
        ..NoiseParams::default()
    };

    let a = params.sample(dim, [0, 0, 0], 0);
    let b = params.sample(dim, [3, 1, 0], 0);
    assert_eq!(a.position, b.position);
    assert_ne!(a.seed, b.seed);

    let normal = NoiseParams::default();
    let a = normal.sample(dim, [0, 0, 0], 0);
    let b = normal.sample(dim, [3, 1, 0], 0);
    assert_ne!(a.position, b.position);
    assert_eq!(a.seed, b.seed);
}
