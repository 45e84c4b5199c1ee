use crate::error::Result;
use crate::gpu::GpuContext;
use crate::image::Image;
use crate::method::TextureMethod;
use crate::methods::common::{grad, lattice_hash, to_positive, NoiseParams};

/// Three dimensional simplex noise, remapped from `[-1, 1]` to `[0, 1]`.
#[derive(Debug, Default)]
pub struct SimplexNoise;

pub type SimplexNoiseParams = NoiseParams;

const F3: f32 = 1.0 / 3.0;
const G3: f32 = 1.0 / 6.0;

impl TextureMethod for SimplexNoise {
    type Params = SimplexNoiseParams;
    const NAME: &'static str = "simplex_noise";

    fn check_target(&self, _: &Image, params: &SimplexNoiseParams) -> Result<()> {
        params.check()
    }

    fn compute_cpu(&mut self, target: &mut Image, params: &SimplexNoiseParams) -> Result<()> {
        let dim = target.dim();
        super::fill_host(target, |texel, channel| {
            let sample = params.sample(dim, texel, channel);
            to_positive(simplex_noise(sample.position, sample.seed))
        })
    }

    fn compute_gpu(
        &mut self,
        gpu: &mut GpuContext,
        target: &mut Image,
        params: &SimplexNoiseParams,
    ) -> Result<()> {
        super::render_gpu(
            gpu,
            target,
            Self::NAME,
            include_str!("../shaders/simplex_noise.wgsl"),
            &params.uniforms(),
            None,
        )
    }
}

pub(crate) fn simplex_noise(p: [f32; 3], seed: u32) -> f32 {
    // Skew into the simplex grid and find the containing cell.
    let s = (p[0] + p[1] + p[2]) * F3;
    let cell = p.map(|v| (v + s).floor());
    let t = (cell[0] + cell[1] + cell[2]) * G3;
    let x0 = [p[0] - cell[0] + t, p[1] - cell[1] + t, p[2] - cell[2] + t];

    // The simplex is determined by the order of the offset coordinates.
    let ge = |a: f32, b: f32| i32::from(a >= b);
    let (gx_y, gy_z, gx_z) = (ge(x0[0], x0[1]), ge(x0[1], x0[2]), ge(x0[0], x0[2]));
    let first = [gx_y & gx_z, (1 - gx_y) & gy_z, (1 - gx_z) & (1 - gy_z)];
    let second = [
        gx_y | gx_z,
        (1 - gx_y) | gy_z,
        (1 - gx_z) | (1 - gy_z),
    ];

    let base = cell.map(|v| v as i32);
    let corners = [[0; 3], first, second, [1; 3]];

    corners
        .iter()
        .enumerate()
        .map(|(n, offset)| {
            let d = [
                x0[0] - offset[0] as f32 + n as f32 * G3,
                x0[1] - offset[1] as f32 + n as f32 * G3,
                x0[2] - offset[2] as f32 + n as f32 * G3,
            ];
            let falloff = 0.6 - d[0] * d[0] - d[1] * d[1] - d[2] * d[2];
            if falloff <= 0.0 {
                return 0.0;
            }

            let cell = [base[0] + offset[0], base[1] + offset[1], base[2] + offset[2]];
            let falloff = falloff * falloff;
            falloff * falloff * grad(lattice_hash(cell, seed), d)
        })
        .sum::<f32>()
        * 32.0
}

#[test]
fn stays_in_range() {
    for i in 0..1024 {
        let p = [i as f32 * 0.0731, (i % 37) as f32 * 0.29, (i % 11) as f32 * 0.41];
        let v = simplex_noise(p, 9);
        assert!((-1.05..=1.05).contains(&v), "{:?} gives {}", p, v);
    }
}

#[test]
fn depends_on_seed() {
    let p = [1.3, 2.7, 0.4];
    assert_ne!(simplex_noise(p, 1), simplex_noise(p, 2));
}
