//! Methods and the dispatch of type-erased parameters.
//!
//! Algorithms implement [`TextureMethod`] with a strongly typed parameter record. The blanket
//! implementation of the object safe [`Method`] on top of it owns all checks shared by every
//! algorithm: the parameter blob size, the context of the target and the mapping state. Only
//! after all of these pass are the parameters decoded and the algorithm run.
//!
//! Rust callers can skip the byte encoding and hand the typed record to
//! [`Method::compute_params`] instead.
use core::any::Any;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::gpu::GpuContext;
use crate::image::Image;

/// A re-invokable instance of a texture generation algorithm.
pub trait Method: Send {
    /// The name the method is registered under.
    fn name(&self) -> &'static str;

    /// The byte size of the parameter record a caller must pass.
    fn params_size(&self) -> usize;

    /// Compute into the target, decoding `params` as the method's parameter record.
    ///
    /// `None` uses the default parameters. A blob of any other size than
    /// [`Method::params_size`] is rejected before a single byte of it is read.
    fn compute(
        &mut self,
        ctx: &mut Context,
        target: &mut Image,
        params: Option<&[u8]>,
    ) -> Result<()>;

    /// Compute into the target with a typed parameter record.
    ///
    /// `params` is the method's own parameter type, or a `&'static [u8]` or `Vec<u8>` blob which
    /// is checked exactly as in [`Method::compute`]. Any other type is a `TypeMismatch`.
    fn compute_params(
        &mut self,
        ctx: &mut Context,
        target: &mut Image,
        params: Option<&dyn Any>,
    ) -> Result<()>;
}

/// A fixed layout parameter record.
pub trait MethodParams: Copy + Default + 'static {
    /// Decode a record from a blob of exactly `size_of::<Self>()` bytes.
    fn read_blob(blob: &[u8]) -> Self;
}

/// The typed side of an algorithm.
pub trait TextureMethod: Send {
    type Params: MethodParams;

    const NAME: &'static str;

    /// Reject targets the algorithm can not fill, before anything is computed.
    fn check_target(&self, target: &Image, params: &Self::Params) -> Result<()> {
        let _ = (target, params);
        Ok(())
    }

    /// Fill the host storage of a target.
    fn compute_cpu(&mut self, target: &mut Image, params: &Self::Params) -> Result<()>;

    /// Render into the device storage of a target.
    fn compute_gpu(
        &mut self,
        gpu: &mut GpuContext,
        target: &mut Image,
        params: &Self::Params,
    ) -> Result<()>;
}

impl<T: TextureMethod> Method for T {
    fn name(&self) -> &'static str {
        T::NAME
    }

    fn params_size(&self) -> usize {
        core::mem::size_of::<T::Params>()
    }

    fn compute(
        &mut self,
        ctx: &mut Context,
        target: &mut Image,
        params: Option<&[u8]>,
    ) -> Result<()> {
        if let Some(blob) = params {
            if blob.len() != self.params_size() {
                return Err(Error::ParamSizeMismatch {
                    expected: self.params_size(),
                    actual: blob.len(),
                });
            }
        }

        admit(ctx, target)?;
        let params = params.map_or_else(T::Params::default, T::Params::read_blob);
        run(self, ctx, target, &params)
    }

    fn compute_params(
        &mut self,
        ctx: &mut Context,
        target: &mut Image,
        params: Option<&dyn Any>,
    ) -> Result<()> {
        let Some(params) = params else {
            return self.compute(ctx, target, None);
        };

        if let Some(typed) = params.downcast_ref::<T::Params>() {
            admit(ctx, target)?;
            return run(self, ctx, target, typed);
        }

        let blob: Option<&[u8]> = match params.downcast_ref::<&[u8]>() {
            Some(blob) => Some(*blob),
            None => params.downcast_ref::<Vec<u8>>().map(Vec::as_slice),
        };

        match blob {
            Some(blob) => self.compute(ctx, target, Some(blob)),
            None => Err(Error::ParamTypeMismatch {
                expected: core::any::type_name::<T::Params>(),
            }),
        }
    }
}

/// The checks on the context and the target shared by both ways of passing parameters.
fn admit(ctx: &Context, target: &Image) -> Result<()> {
    if !ctx.accepts(target) {
        return Err(Error::ContextMismatch(
            "the target image was not created for this context",
        ));
    }

    target.ensure_unmapped("compute into a mapped image")
}

fn run<T: TextureMethod>(
    method: &mut T,
    ctx: &mut Context,
    target: &mut Image,
    params: &T::Params,
) -> Result<()> {
    method.check_target(target, params)?;

    log::debug!("computing {} into {:?}", T::NAME, target.dim());

    match ctx {
        Context::Cpu(_) => {
            method.compute_cpu(target, params)?;
            target.mark_host_written();
        }
        Context::Gpu(gpu) => {
            method.compute_gpu(gpu, target, params)?;
            target.mark_device_written();
        }
    }

    Ok(())
}

/// Implement [`MethodParams`] for plain old data records.
macro_rules! pod_params {
    ($($ty:ty),* $(,)?) => {
        $(
            impl crate::method::MethodParams for $ty {
                fn read_blob(blob: &[u8]) -> Self {
                    bytemuck::pod_read_unaligned(blob)
                }
            }
        )*
    };
}

pub(crate) use pod_params;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::image::{ElementType, ImageDim};

    #[repr(C)]
    #[derive(Clone, Copy, Default, bytemuck::Pod, bytemuck::Zeroable)]
    struct Fill {
        value: f32,
        scale: f32,
    }

    pod_params!(Fill);

    struct Constant;

    impl TextureMethod for Constant {
        type Params = Fill;
        const NAME: &'static str = "constant";

        fn compute_cpu(&mut self, target: &mut Image, params: &Fill) -> Result<()> {
            let host = target.host_mut().ok_or(Error::NoDeviceBacking)?;
            for idx in 0..host.len() {
                host.store(idx, params.value * params.scale);
            }
            Ok(())
        }

        fn compute_gpu(&mut self, _: &mut GpuContext, _: &mut Image, _: &Fill) -> Result<()> {
            Err(Error::unsupported("host only"))
        }
    }

    #[test]
    fn size_is_checked_before_decoding() {
        let mut ctx = Context::new_cpu();
        let mut image = Image::new_cpu(ImageDim::new(2, 2, 1, 1), ElementType::Float32).unwrap();
        let mut method = Constant;
        assert_eq!(Method::params_size(&method), 8);

        let params = Fill {
            value: 0.5,
            scale: 1.0,
        };
        let blob = bytemuck::bytes_of(&params);
        let err = method.compute(&mut ctx, &mut image, Some(&blob[..4])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamSizeMismatch);
        assert_eq!(image.host().unwrap().as_f32().unwrap(), &[0.0; 4]);

        method.compute(&mut ctx, &mut image, Some(blob)).unwrap();
        assert_eq!(image.host().unwrap().as_f32().unwrap(), &[0.5; 4]);

        // Default parameters, which multiply to zero.
        method.compute(&mut ctx, &mut image, None).unwrap();
        assert_eq!(image.host().unwrap().as_f32().unwrap(), &[0.0; 4]);
    }

    #[test]
    fn mapped_targets_are_rejected() {
        let mut ctx = Context::new_cpu();
        let mut image = Image::new_cpu(ImageDim::new(2, 2, 1, 1), ElementType::Float32).unwrap();
        image.begin_map(crate::image::MapMode::Read).unwrap();

        let err = Constant.compute(&mut ctx, &mut image, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MappingConflict);

        let typed = Fill::default();
        let err = Constant
            .compute_params(&mut ctx, &mut image, Some(&typed))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MappingConflict);
    }

    #[test]
    fn typed_params_skip_the_blob() {
        let mut ctx = Context::new_cpu();
        let mut image = Image::new_cpu(ImageDim::new(2, 2, 1, 1), ElementType::Float32).unwrap();
        let mut method = Constant;

        let params = Fill {
            value: 0.25,
            scale: 2.0,
        };
        method.compute_params(&mut ctx, &mut image, Some(&params)).unwrap();
        assert_eq!(image.host().unwrap().as_f32().unwrap(), &[0.5; 4]);

        // Blobs still pass through the size check.
        let short: &'static [u8] = &[0; 4];
        let err = method
            .compute_params(&mut ctx, &mut image, Some(&short))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ParamSizeMismatch);

        let blob = bytemuck::bytes_of(&Fill {
            value: 0.125,
            scale: 2.0,
        })
        .to_vec();
        method.compute_params(&mut ctx, &mut image, Some(&blob)).unwrap();
        assert_eq!(image.host().unwrap().as_f32().unwrap(), &[0.25; 4]);

        method.compute_params(&mut ctx, &mut image, None).unwrap();
        assert_eq!(image.host().unwrap().as_f32().unwrap(), &[0.0; 4]);
    }

    #[test]
    fn foreign_param_types_are_rejected() {
        let mut ctx = Context::new_cpu();
        let mut image = Image::new_cpu(ImageDim::new(2, 2, 1, 1), ElementType::Float32).unwrap();
        image.host_mut().unwrap().store(0, 0.75);

        let err = Constant
            .compute_params(&mut ctx, &mut image, Some(&[0.5f32, 1.0]))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(err.to_string().contains("Fill"));
        assert_eq!(image.host().unwrap().as_f32().unwrap(), &[0.75, 0.0, 0.0, 0.0]);
    }
}
