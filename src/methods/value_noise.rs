use crate::error::Result;
use crate::gpu::GpuContext;
use crate::image::Image;
use crate::method::TextureMethod;
use crate::methods::common::{fade, lattice_hash, lerp, to_unit, NoiseParams};

/// Random values on the integer lattice, interpolated with the quintic fade curve.
#[derive(Debug, Default)]
pub struct ValueNoise;

pub type ValueNoiseParams = NoiseParams;

impl TextureMethod for ValueNoise {
    type Params = ValueNoiseParams;
    const NAME: &'static str = "value_noise";

    fn check_target(&self, _: &Image, params: &ValueNoiseParams) -> Result<()> {
        params.check()
    }

    fn compute_cpu(&mut self, target: &mut Image, params: &ValueNoiseParams) -> Result<()> {
        let dim = target.dim();
        super::fill_host(target, |texel, channel| {
            let sample = params.sample(dim, texel, channel);
            value_noise(sample.position, sample.seed)
        })
    }

    fn compute_gpu(
        &mut self,
        gpu: &mut GpuContext,
        target: &mut Image,
        params: &ValueNoiseParams,
    ) -> Result<()> {
        super::render_gpu(
            gpu,
            target,
            Self::NAME,
            include_str!("../shaders/value_noise.wgsl"),
            &params.uniforms(),
            None,
        )
    }
}

pub(crate) fn value_noise(p: [f32; 3], seed: u32) -> f32 {
    let cell = p.map(f32::floor);
    let [ix, iy, iz] = cell.map(|v| v as i32);
    let [fx, fy, fz] = [p[0] - cell[0], p[1] - cell[1], p[2] - cell[2]];
    let [ux, uy, uz] = [fade(fx), fade(fy), fade(fz)];

    let corner = |dx: i32, dy: i32, dz: i32| to_unit(lattice_hash([ix + dx, iy + dy, iz + dz], seed));
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
fn matches_lattice_values() {
    let seed = 7;
    for cell in [[0, 0, 0], [3, -2, 5], [-1, -1, -1]] {
        let p = cell.map(|v: i32| v as f32);
        assert_eq!(value_noise(p, seed), to_unit(lattice_hash(cell, seed)));
    }
}

#[test]
fn stays_in_unit_range() {
    for i in 0..512 {
        let p = [i as f32 * 0.173, i as f32 * 0.091 - 7.0, 0.5];
        let v = value_noise(p, 3);
        assert!((0.0..=1.0).contains(&v));
    }
}
