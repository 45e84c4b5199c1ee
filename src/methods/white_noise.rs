use bytemuck::{Pod, Zeroable};

use crate::error::Result;
use crate::gpu::GpuContext;
use crate::image::Image;
use crate::method::TextureMethod;
use crate::methods::common::{hash, to_unit};

/// Independent uniform values in `[0, 1)` for every element.
///
/// The value of an element is the hash of its storage index, so the output depends on the
/// extent and channel count of the target.
#[derive(Debug, Default)]
pub struct WhiteNoise;

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct WhiteNoiseParams {
    pub global_seed: u32,
}

crate::method::pod_params!(WhiteNoiseParams);

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Uniforms {
    seed: u32,
    _pad: [u32; 3],
}

impl TextureMethod for WhiteNoise {
    type Params = WhiteNoiseParams;
    const NAME: &'static str = "white_noise";

    fn compute_cpu(&mut self, target: &mut Image, params: &WhiteNoiseParams) -> Result<()> {
        let dim = target.dim();
        let seed = hash(params.global_seed);

        super::fill_host(target, |[x, y, z], channel| {
            let index = (dim.index(x, y, z, channel) as u32) ^ seed;
            to_unit(hash(index))
        })
    }

    fn compute_gpu(
        &mut self,
        gpu: &mut GpuContext,
        target: &mut Image,
        params: &WhiteNoiseParams,
    ) -> Result<()> {
        let uniforms = Uniforms {
            seed: hash(params.global_seed),
            _pad: [0; 3],
        };

        super::render_gpu(
            gpu,
            target,
            Self::NAME,
            include_str!("../shaders/white_noise.wgsl"),
            &uniforms,
            None,
        )
    }
}

#[test]
fn seeds_change_the_output() {
    use crate::image::{ElementType, ImageDim};

    let dim = ImageDim::new(8, 8, 1, 1);
    let mut a = Image::new_cpu(dim, ElementType::Float32).unwrap();
    let mut b = Image::new_cpu(dim, ElementType::Float32).unwrap();

    WhiteNoise
        .compute_cpu(&mut a, &WhiteNoiseParams { global_seed: 0 })
        .unwrap();
    WhiteNoise
        .compute_cpu(&mut b, &WhiteNoiseParams { global_seed: 42 })
        .unwrap();

    let a = a.host().unwrap().as_f32().unwrap();
    let b = b.host().unwrap().as_f32().unwrap();
    assert_ne!(a, b);
    // The first element of seed zero is the hash of index zero.
    assert_eq!(a[0], 0.0);
}
