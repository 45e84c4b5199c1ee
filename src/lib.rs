//! Procedural textures on the CPU and the GPU.
//!
//! ## Quick guide
//!
//! 1. Create a `Registry`, usually `Registry::builtin()`
//! 2. Create a `Context` to run methods on, `Context::new_cpu()` or `Context::new_gpu()`
//! 3. Create the target `Image` under that context
//! 4. Optionally bind auxiliary input images in an `ImageIo` table
//! 5. Create a method by name and `compute` it into the target, from a parameter blob or, with
//!    `compute_params`, from the typed record
//! 6. Retrieve results through `Image::map_read`, which downloads device images as needed
//!
//! The same operations are available to C through the `txkit_*` functions declared in
//! `include/txkit.h`.
//!
//! ```
//! use txkit::{Context, ElementType, Image, ImageDim, Method, Registry, WhiteNoiseParams};
//!
//! let registry = Registry::builtin();
//! let mut ctx = Context::new_cpu();
//! let mut image = Image::new_cpu(ImageDim::new(64, 64, 1, 1), ElementType::Float32)?;
//!
//! let mut method = registry.method_new("white_noise")?;
//! let params = WhiteNoiseParams { global_seed: 42 };
//! method.compute_params(&mut ctx, &mut image, Some(&params))?;
//!
//! let view = image.map_read()?;
//! assert!(view.as_f32().unwrap().iter().all(|v| (0.0..1.0).contains(v)));
//! # Ok::<_, txkit::Error>(())
//! ```

pub mod api;
mod context;
mod error;
mod gpu;
mod image;
mod io;
mod map;
mod method;
pub mod methods;
mod registry;
mod util;

pub use self::context::{Context, ContextId, ContextKind, ContextOptions, CpuContext};
pub use self::error::{
    clear_last_error, last_error_kind, last_error_message, set_last_error, Error, ErrorKind,
    Result, SUCCESS,
};
pub use self::gpu::GpuContext;
pub use self::image::{Coherency, ElementType, Image, ImageDim, SyncOutcome};
pub use self::io::{ImageIo, MAX_BINDING_SLOTS};
pub use self::map::{ReadGuard, WriteGuard};
pub use self::method::{Method, MethodParams, TextureMethod};
pub use self::methods::{
    DebugParams, GradientNoiseParams, NoiseParams, PhasorNoiseParams, SimplexNoiseParams,
    ValueNoiseParams, WhiteNoiseParams,
};
pub use self::registry::Registry;
