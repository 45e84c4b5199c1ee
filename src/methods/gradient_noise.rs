use crate::error::Result;
use crate::gpu::GpuContext;
use crate::image::Image;
use crate::method::TextureMethod;
use crate::methods::common::{fade, grad, lattice_hash, lerp, to_positive, NoiseParams};

/// Improved Perlin noise, remapped from `[-1, 1]` to `[0, 1]`.
#[derive(Debug, Default)]
pub struct GradientNoise;

pub type GradientNoiseParams = NoiseParams;

impl TextureMethod for GradientNoise {
    type Params = GradientNoiseParams;
    const NAME: &'static str = "gradient_noise";

    fn check_target(&self, _: &Image, params: &GradientNoiseParams) -> Result<()> {
        params.check()
    }

    fn compute_cpu(&mut self, target: &mut Image, params: &GradientNoiseParams) -> Result<()> {
        let dim = target.dim();
        super::fill_host(target, |texel, channel| {
            let sample = params.sample(dim, texel, channel);
            to_positive(gradient_noise(sample.position, sample.seed))
        })
    }

    fn compute_gpu(
        &mut self,
        gpu: &mut GpuContext,
        target: &mut Image,
        params: &GradientNoiseParams,
    ) -> Result<()> {
        super::render_gpu(
            gpu,
            target,
            Self::NAME,
            include_str!("../shaders/gradient_noise.wgsl"),
            &params.uniforms(),
            None,
        )
    }
}

/// Signed noise, zero on every lattice point.
pub(crate) fn gradient_noise(p: [f32; 3], seed: u32) -> f32 {
    let cell = p.map(f32::floor);
    let [ix, iy, iz] = cell.map(|v| v as i32);
    let f = [p[0] - cell[0], p[1] - cell[1], p[2] - cell[2]];
    let [ux, uy, uz] = f.map(fade);

    let corner = |dx: i32, dy: i32, dz: i32| {
        let hash = lattice_hash([ix + dx, iy + dy, iz + dz], seed);
        grad(hash, [f[0] - dx as f32, f[1] - dy as f32, f[2] - dz as f32])
    };
    let plane = |dz: i32| {
        lerp(
            lerp(corner(0, 0, dz), corner(1, 0, dz), ux),
            lerp(corner(0, 1, dz), corner(1, 1, dz), ux),
            uy,
        )
    };

    lerp(plane(0), plane(1), uz)
}

#[test]
fn vanishes_on_the_lattice() {
    for cell in [[0.0, 0.0, 0.0], [4.0, -3.0, 1.0]] {
        assert_eq!(gradient_noise(cell, 11), 0.0);
    }
}

#[test]
fn is_not_constant() {
    let values: Vec<f32> = (0..64)
        .map(|i| gradient_noise([i as f32 * 0.37, 0.5, 0.25], 5))
        .collect();
    assert!(values.iter().any(|&v| v > 0.05));
    assert!(values.iter().any(|&v| v < -0.05));
}
