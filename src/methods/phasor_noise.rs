//! Phasor noise, a sum of Gabor kernels of which only the phase is kept.
//!
//! Kernels are scattered over the lattice cells around each sample. The complex sum of their
//! contributions gives a phase, which a periodic profile maps to the output value. An orientation
//! field bound to texture unit 0 of the parameter's binding table rotates the kernels per texel.
use core::f32::consts::PI;

use bytemuck::{Pod, Zeroable};

use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use crate::image::Image;
use crate::io::ImageIo;
use crate::method::{MethodParams, TextureMethod};
use crate::methods::common::{hash, lattice_hash, texel_uv, to_unit, NoiseParams};

#[derive(Debug, Default)]
pub struct PhasorNoise;

/// `0.5 + 0.5 sin(phase)`.
pub const PROFILE_SINE: i32 = 0;
/// The phase, linearly mapped to `[0, 1]`.
pub const PROFILE_SAWTOOTH: i32 = 1;
/// `1` on the positive half period, `0` otherwise.
pub const PROFILE_SQUARE: i32 = 2;

/// Every kernel has weight 1.
pub const WEIGHTS_NONE: i32 = 0;
/// Weights uniform in `[0, 1)`.
pub const WEIGHTS_RANDOM: i32 = 1;
/// Weights of random sign.
pub const WEIGHTS_SIGN: i32 = 2;

/// Kernel centres uniformly distributed in their cell.
pub const DISTRIBUTION_UNIFORM: i32 = 0;
/// Kernel centres on a regular grid within their cell, displaced by `jitter_amount`.
pub const DISTRIBUTION_STRATIFIED: i32 = 1;

const MAX_LOOKAHEAD: i32 = 3;
const MAX_KERNELS: i32 = 64;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PhasorNoiseParams {
    pub global_seed: u32,
    /// The size of a lattice cell, in texels.
    pub scale: f32,
    pub stats_mode: i32,
    pub stats_look_at: [f32; 2],
    /// How many neighbouring cells in each direction contribute kernels.
    pub noise_lookahead: i32,
    /// Kernels per cell.
    pub kernel_count: i32,
    /// One of the `PROFILE_*` constants.
    pub noise_profile: i32,
    /// One of the `WEIGHTS_*` constants.
    pub noise_weights: i32,
    /// One of the `DISTRIBUTION_*` constants.
    pub noise_point_distribution: i32,
    /// Oscillations per cell.
    pub noise_frequency: f32,
    /// Kernel orientation in radians.
    pub noise_angle: f32,
    /// Displacement of stratified kernels, relative to their grid spacing.
    pub jitter_amount: f32,
    /// Upper bound of the stratification grid size, `0` for none.
    pub jitter_max: i32,
    /// Auxiliary inputs, may be null.
    pub io: *const ImageIo,
}

/// The blob layout, with the table address as an integer.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct RawParams {
    global_seed: u32,
    scale: f32,
    stats_mode: i32,
    stats_look_at: [f32; 2],
    noise_lookahead: i32,
    kernel_count: i32,
    noise_profile: i32,
    noise_weights: i32,
    noise_point_distribution: i32,
    noise_frequency: f32,
    noise_angle: f32,
    jitter_amount: f32,
    jitter_max: i32,
    io: usize,
}

const _: () = assert!(core::mem::size_of::<RawParams>() == core::mem::size_of::<PhasorNoiseParams>());

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct Uniforms {
    seed: u32,
    scale: f32,
    stats_mode: i32,
    look_at_x: f32,
    look_at_y: f32,
    lookahead: i32,
    kernel_count: i32,
    profile: i32,
    weights: i32,
    distribution: i32,
    frequency: f32,
    angle: f32,
    jitter_amount: f32,
    grid: i32,
    _pad: [u32; 2],
}

impl Default for PhasorNoiseParams {
    fn default() -> Self {
        let noise = NoiseParams::default();
        PhasorNoiseParams {
            global_seed: noise.global_seed,
            scale: noise.scale,
            stats_mode: noise.stats_mode,
            stats_look_at: noise.stats_look_at,
            noise_lookahead: 1,
            kernel_count: 4,
            noise_profile: PROFILE_SINE,
            noise_weights: WEIGHTS_NONE,
            noise_point_distribution: DISTRIBUTION_UNIFORM,
            noise_frequency: 2.0,
            noise_angle: 0.0,
            jitter_amount: 0.5,
            jitter_max: 0,
            io: core::ptr::null(),
        }
    }
}

impl MethodParams for PhasorNoiseParams {
    fn read_blob(blob: &[u8]) -> Self {
        let raw: RawParams = bytemuck::pod_read_unaligned(blob);
        PhasorNoiseParams {
            global_seed: raw.global_seed,
            scale: raw.scale,
            stats_mode: raw.stats_mode,
            stats_look_at: raw.stats_look_at,
            noise_lookahead: raw.noise_lookahead,
            kernel_count: raw.kernel_count,
            noise_profile: raw.noise_profile,
            noise_weights: raw.noise_weights,
            noise_point_distribution: raw.noise_point_distribution,
            noise_frequency: raw.noise_frequency,
            noise_angle: raw.noise_angle,
            jitter_amount: raw.jitter_amount,
            jitter_max: raw.jitter_max,
            io: raw.io as *const ImageIo,
        }
    }
}

impl PhasorNoiseParams {
    fn noise(&self) -> NoiseParams {
        NoiseParams {
            global_seed: self.global_seed,
            scale: self.scale,
            stats_mode: self.stats_mode,
            stats_look_at: self.stats_look_at,
        }
    }

    /// The side length of the stratification grid of a cell.
    fn grid(&self) -> i32 {
        let n = (self.kernel_count.max(1) as f32).sqrt().ceil() as i32;
        match self.jitter_max {
            max if max > 0 => n.min(max),
            _ => n,
        }
    }

    /// The orientation field, if one is bound.
    ///
    /// The caller of `compute` guarantees that a non-null table and the images bound to it are
    /// alive for the duration of the call.
    fn orientation(&self) -> Option<&Image> {
        let io = unsafe { self.io.as_ref() }?;
        unsafe { io.texture_unit(0) }
    }

    fn uniforms(&self) -> Uniforms {
        Uniforms {
            seed: self.global_seed,
            scale: self.scale,
            stats_mode: self.stats_mode,
            look_at_x: self.stats_look_at[0],
            look_at_y: self.stats_look_at[1],
            lookahead: self.noise_lookahead,
            kernel_count: self.kernel_count,
            profile: self.noise_profile,
            weights: self.noise_weights,
            distribution: self.noise_point_distribution,
            frequency: self.noise_frequency,
            angle: self.noise_angle,
            jitter_amount: self.jitter_amount,
            grid: self.grid(),
            _pad: [0; 2],
        }
    }
}

fn check_range(what: &str, value: i32, max: i32) -> Result<()> {
    if (0..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::unsupported(format!("{} must lie in 0..={}, got {}", what, max, value)))
    }
}

impl TextureMethod for PhasorNoise {
    type Params = PhasorNoiseParams;
    const NAME: &'static str = "phasor_noise";

    fn check_target(&self, target: &Image, params: &PhasorNoiseParams) -> Result<()> {
        super::require_2d(target, Self::NAME)?;
        params.noise().check()?;
        check_range("noise_lookahead", params.noise_lookahead, MAX_LOOKAHEAD)?;
        check_range("kernel_count", params.kernel_count, MAX_KERNELS)?;
        check_range("noise_profile", params.noise_profile, PROFILE_SQUARE)?;
        check_range("noise_weights", params.noise_weights, WEIGHTS_SIGN)?;
        check_range(
            "noise_point_distribution",
            params.noise_point_distribution,
            DISTRIBUTION_STRATIFIED,
        )?;

        if let Some(io) = unsafe { params.io.as_ref() } {
            if io.binds(target) {
                return Err(Error::unsupported("the target is bound as an input"));
            }
        }

        Ok(())
    }

    fn compute_cpu(&mut self, target: &mut Image, params: &PhasorNoiseParams) -> Result<()> {
        let dim = target.dim();
        let noise = params.noise();
        let grid = params.grid();

        let orientation = match params.orientation() {
            Some(image) => match image.host() {
                Some(host) if image.context().is_none() => Some((image.dim(), host)),
                _ => return Err(Error::IncompatibleContext),
            },
            None => None,
        };

        super::fill_host(target, |texel, channel| {
            let sample = noise.sample(dim, texel, channel);
            let [u, v, _] = texel_uv(dim, texel);

            let angle = match orientation {
                Some((input_dim, host)) => {
                    let x = ((u * input_dim.width as f32) as usize).min(input_dim.width - 1);
                    let y = ((v * input_dim.height as f32) as usize).min(input_dim.height - 1);
                    let z = texel[2].min(input_dim.depth - 1);
                    params.noise_angle + 2.0 * PI * host.load(input_dim.index(x, y, z, 0))
                }
                None => params.noise_angle,
            };

            let position = [sample.position[0], sample.position[1]];
            let phase = phasor_phase(params, grid, position, sample.seed, angle);
            profile(params.noise_profile, phase)
        })
    }

    fn compute_gpu(
        &mut self,
        gpu: &mut GpuContext,
        target: &mut Image,
        params: &PhasorNoiseParams,
    ) -> Result<()> {
        let input = match params.orientation() {
            Some(image) => match image.device_texture() {
                Some(texture) if texture.context() == gpu.id() => {
                    // Sampling would see the device copy from before those writes.
                    if image.coherency() == crate::image::Coherency::HostNewer {
                        return Err(Error::MappingConflict(
                            "the orientation field has host writes that were not uploaded",
                        ));
                    }
                    Some(texture)
                }
                _ => return Err(Error::IncompatibleContext),
            },
            None => None,
        };

        super::render_gpu(
            gpu,
            target,
            Self::NAME,
            include_str!("../shaders/phasor_noise.wgsl"),
            &params.uniforms(),
            input,
        )
    }
}

/// The position of kernel `k` within its cell.
fn kernel_offset(params: &PhasorNoiseParams, grid: i32, h: u32, k: i32) -> [f32; 2] {
    if params.noise_point_distribution == DISTRIBUTION_STRATIFIED {
        let k = k % (grid * grid);
        let spacing = 1.0 / grid as f32;
        let jitter = |salt: u32| (to_unit(hash(h ^ salt)) - 0.5) * params.jitter_amount * spacing;
        [
            ((k % grid) as f32 + 0.5) * spacing + jitter(0x68e3_1da4),
            ((k / grid) as f32 + 0.5) * spacing + jitter(0xb529_7a4d),
        ]
    } else {
        [to_unit(hash(h ^ 0x68e3_1da4)), to_unit(hash(h ^ 0xb529_7a4d))]
    }
}

fn kernel_weight(params: &PhasorNoiseParams, h: u32) -> f32 {
    let w = hash(h ^ 0x1b56_c4e9);
    match params.noise_weights {
        WEIGHTS_RANDOM => to_unit(w),
        WEIGHTS_SIGN if w & 1 == 1 => -1.0,
        _ => 1.0,
    }
}

/// The phase of the kernel sum at `p`, in `[-π, π]`.
fn phasor_phase(params: &PhasorNoiseParams, grid: i32, p: [f32; 2], seed: u32, angle: f32) -> f32 {
    let cell = [p[0].floor() as i32, p[1].floor() as i32];
    let direction = [angle.cos(), angle.sin()];
    let lookahead = params.noise_lookahead;
    let (mut re, mut im) = (0.0f32, 0.0f32);

    for dy in -lookahead..=lookahead {
        for dx in -lookahead..=lookahead {
            let c = [cell[0] + dx, cell[1] + dy];

            for k in 0..params.kernel_count {
                let h = lattice_hash([c[0], c[1], k], seed);
                let offset = kernel_offset(params, grid, h, k);
                let d = [
                    p[0] - (c[0] as f32 + offset[0]),
                    p[1] - (c[1] as f32 + offset[1]),
                ];

                let window = (-PI * (d[0] * d[0] + d[1] * d[1])).exp();
                let phase = 2.0 * PI * params.noise_frequency * (direction[0] * d[0] + direction[1] * d[1]);
                let amplitude = kernel_weight(params, h) * window;
                re += amplitude * phase.cos();
                im += amplitude * phase.sin();
            }
        }
    }

    im.atan2(re)
}

fn profile(kind: i32, phase: f32) -> f32 {
    match kind {
        PROFILE_SAWTOOTH => ((phase + PI) / (2.0 * PI)).clamp(0.0, 1.0),
        PROFILE_SQUARE => {
            if phase.sin() >= 0.0 {
                1.0
            } else {
                0.0
            }
        }
        _ => 0.5 + 0.5 * phase.sin(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::image::{ElementType, ImageDim};
    use crate::method::Method;

    #[test]
    fn blob_layout() {
        let size = core::mem::size_of::<PhasorNoiseParams>();
        #[cfg(target_pointer_width = "64")]
        assert_eq!(size, 64);
        assert_eq!(PhasorNoise.params_size(), size);

        let params = PhasorNoiseParams {
            global_seed: 9,
            kernel_count: 7,
            jitter_max: 3,
            ..PhasorNoiseParams::default()
        };
        let blob = unsafe {
            core::slice::from_raw_parts((&params as *const PhasorNoiseParams).cast::<u8>(), size)
        };
        assert_eq!(PhasorNoiseParams::read_blob(blob), params);
    }

    #[test]
    fn profiles_stay_in_unit_range() {
        for i in -64..=64 {
            let phase = i as f32 / 64.0 * PI;
            for kind in [PROFILE_SINE, PROFILE_SAWTOOTH, PROFILE_SQUARE] {
                assert!((0.0..=1.0).contains(&profile(kind, phase)));
            }
        }
    }

    #[test]
    fn rejects_volumes_and_bad_enums() {
        let mut ctx = Context::new_cpu();
        let mut volume = Image::new_cpu(ImageDim::new(4, 4, 2, 1), ElementType::Float32).unwrap();
        let err = PhasorNoise.compute(&mut ctx, &mut volume, None).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedTarget);

        let mut plane = Image::new_cpu(ImageDim::new(4, 4, 1, 1), ElementType::Float32).unwrap();
        let params = PhasorNoiseParams {
            noise_profile: 7,
            ..PhasorNoiseParams::default()
        };
        assert!(PhasorNoise.check_target(&plane, &params).is_err());
        PhasorNoise.compute(&mut ctx, &mut plane, None).unwrap();
    }

    #[test]
    fn orientation_field_rotates_kernels() {
        let mut ctx = Context::new_cpu();
        let dim = ImageDim::new(16, 16, 1, 1);
        let mut field = Image::new_cpu(dim, ElementType::Float32).unwrap();
        field.map_write().unwrap().as_f32_mut().unwrap().fill(0.25);

        let mut io = ImageIo::new(&ctx);
        io.set_texture_binding(0, Some(&field)).unwrap();

        let mut rotated = Image::new_cpu(dim, ElementType::Float32).unwrap();
        let with_io = PhasorNoiseParams {
            io: &io,
            ..PhasorNoiseParams::default()
        };
        PhasorNoise
            .compute_params(&mut ctx, &mut rotated, Some(&with_io))
            .unwrap();

        let mut reference = Image::new_cpu(dim, ElementType::Float32).unwrap();
        let quarter_turn = PhasorNoiseParams {
            noise_angle: PI / 2.0,
            ..PhasorNoiseParams::default()
        };
        PhasorNoise.compute_cpu(&mut reference, &quarter_turn).unwrap();

        let rotated = rotated.host().unwrap().as_f32().unwrap();
        let reference = reference.host().unwrap().as_f32().unwrap();
        for (a, b) in rotated.iter().zip(reference) {
            assert!((a - b).abs() < 1e-4);
        }
    }

    #[test]
    fn binding_the_target_is_rejected() {
        let ctx = Context::new_cpu();
        let target = Image::new_cpu(ImageDim::new(4, 4, 1, 1), ElementType::Float32).unwrap();
        let mut io = ImageIo::new(&ctx);
        io.set_texture_binding(0, Some(&target)).unwrap();

        let params = PhasorNoiseParams {
            io: &io,
            ..PhasorNoiseParams::default()
        };
        assert!(PhasorNoise.check_target(&target, &params).is_err());
    }
}
