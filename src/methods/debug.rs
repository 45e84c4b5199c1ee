use bytemuck::{Pod, Zeroable};

use crate::error::Result;
use crate::gpu::GpuContext;
use crate::image::Image;
use crate::method::TextureMethod;
use crate::methods::common::texel_uv;

/// A gradient of the texel coordinates, for checking orientation and layout.
///
/// Writes the relative x, y and z coordinates of each texel centre to channels 0 to 2 and
/// `alpha_value` to channel 3.
#[derive(Debug, Default)]
pub struct DebugPattern;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct DebugParams {
    pub alpha_value: f32,
}

impl Default for DebugParams {
    fn default() -> Self {
        DebugParams { alpha_value: 1.0 }
    }
}

crate::method::pod_params!(DebugParams);

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Uniforms {
    alpha_value: f32,
    _pad: [u32; 3],
}

impl TextureMethod for DebugPattern {
    type Params = DebugParams;
    const NAME: &'static str = "debug";

    fn compute_cpu(&mut self, target: &mut Image, params: &DebugParams) -> Result<()> {
        let dim = target.dim();
        super::fill_host(target, |texel, channel| match channel {
            0..=2 => texel_uv(dim, texel)[channel],
            _ => params.alpha_value,
        })
    }

    fn compute_gpu(
        &mut self,
        gpu: &mut GpuContext,
        target: &mut Image,
        params: &DebugParams,
    ) -> Result<()> {
        let uniforms = Uniforms {
            alpha_value: params.alpha_value,
            _pad: [0; 3],
        };

        super::render_gpu(
            gpu,
            target,
            Self::NAME,
            include_str!("../shaders/debug.wgsl"),
            &uniforms,
            None,
        )
    }
}

#[test]
fn writes_coordinates() {
    use crate::image::{ElementType, ImageDim};

    let mut image = Image::new_cpu(ImageDim::new(2, 1, 1, 4), ElementType::Float32).unwrap();
    DebugPattern
        .compute_cpu(&mut image, &DebugParams { alpha_value: 0.75 })
        .unwrap();

    let data = image.host().unwrap().as_f32().unwrap();
    assert_eq!(data, &[0.25, 0.5, 0.5, 0.75, 0.75, 0.5, 0.5, 0.75]);
}
