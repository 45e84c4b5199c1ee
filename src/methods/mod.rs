//! The built-in algorithms.
//!
//! Each algorithm has a host implementation in Rust and a WGSL fragment shader in `shaders/`.
//! Both evaluate the same functions but are not bit-identical.
use bytemuck::Pod;

use crate::error::{Error, Result};
use crate::gpu::{GpuContext, ShaderPass};
use crate::image::{DeviceTexture, Image, ImageDim};

mod common;
mod debug;
mod gradient_noise;
mod phasor_noise;
mod simplex_noise;
mod value_noise;
mod white_noise;

pub use self::common::{NoiseParams, STATS_LOOK_AT, STATS_NORMAL, STATS_PROCESS};
pub use self::debug::{DebugParams, DebugPattern};
pub use self::gradient_noise::{GradientNoise, GradientNoiseParams};
pub use self::phasor_noise::{
    PhasorNoise, PhasorNoiseParams, DISTRIBUTION_STRATIFIED, DISTRIBUTION_UNIFORM, PROFILE_SAWTOOTH,
    PROFILE_SINE, PROFILE_SQUARE, WEIGHTS_NONE, WEIGHTS_RANDOM, WEIGHTS_SIGN,
};
pub use self::simplex_noise::{SimplexNoise, SimplexNoiseParams};
pub use self::value_noise::{ValueNoise, ValueNoiseParams};
pub use self::white_noise::{WhiteNoise, WhiteNoiseParams};

/// Evaluate every channel of every texel of a host target, in storage order.
pub(crate) fn fill_host(
    target: &mut Image,
    mut value: impl FnMut([usize; 3], usize) -> f32,
) -> Result<()> {
    let dim = target.dim();
    let host = target
        .host_mut()
        .ok_or_else(|| Error::backend("the target has no host storage"))?;

    let mut idx = 0;
    for z in 0..dim.depth {
        for y in 0..dim.height {
            for x in 0..dim.width {
                for channel in 0..dim.channels {
                    host.store(idx, value([x, y, z], channel));
                    idx += 1;
                }
            }
        }
    }

    Ok(())
}

/// Render the shader of a method into a device target.
pub(crate) fn render_gpu<U: Pod>(
    gpu: &mut GpuContext,
    target: &Image,
    method: &'static str,
    source: &'static str,
    uniforms: &U,
    input: Option<&DeviceTexture>,
) -> Result<()> {
    let texture = target
        .device_texture()
        .ok_or(Error::ContextMismatch("the target has no device storage"))?;

    gpu.render(
        texture,
        ShaderPass {
            method,
            source,
            params: bytemuck::bytes_of(uniforms),
            input,
        },
    )
}

/// Reject targets with depth, for methods defined on the plane.
pub(crate) fn require_2d(target: &Image, method: &str) -> Result<()> {
    let ImageDim { depth, .. } = target.dim();
    if depth != 1 {
        return Err(Error::unsupported(format!(
            "{} is two dimensional, the target has depth {}",
            method, depth
        )));
    }

    Ok(())
}
