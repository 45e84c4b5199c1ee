//! Execution environments that images and methods run against.
use core::sync::atomic::{AtomicU64, Ordering};

use crate::error::Result;
use crate::gpu::GpuContext;
use crate::image::Image;
use crate::io::MAX_BINDING_SLOTS;

/// Identifies one context for the lifetime of the process.
///
/// Identifiers are never reused, so an image remembers which context it was created under even
/// after that context is gone.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

/// The backend family of a context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ContextKind {
    Cpu,
    Gpu,
}

/// An execution environment owning its backend resources.
///
/// Images and methods created against a context must not outlive it. The CPU context holds no
/// resources of its own, CPU images can be created without any context at all.
pub enum Context {
    Cpu(CpuContext),
    Gpu(GpuContext),
}

/// The host execution environment.
#[derive(Debug)]
pub struct CpuContext {
    id: ContextId,
}

/// Configures the selection of a GPU adapter.
#[derive(Clone, Debug)]
pub struct ContextOptions {
    /// The wgpu backends that may be used.
    pub backends: wgpu::Backends,
    /// Which kind of adapter to prefer.
    pub power_preference: wgpu::PowerPreference,
    /// Only use a software fallback adapter.
    pub force_fallback_adapter: bool,
}

impl ContextId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ContextOptions {
    fn default() -> Self {
        ContextOptions {
            backends: wgpu::Backends::all(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
        }
    }
}

impl ContextOptions {
    /// The default options, overridden by `WGPU_BACKEND` and `WGPU_POWER_PREF`.
    pub fn from_env() -> Self {
        let defaults = ContextOptions::default();
        ContextOptions {
            backends: wgpu::util::backend_bits_from_env().unwrap_or(defaults.backends),
            power_preference: wgpu::util::power_preference_from_env()
                .unwrap_or(defaults.power_preference),
            ..defaults
        }
    }
}

impl Context {
    /// Create a context computing on the host.
    pub fn new_cpu() -> Self {
        let id = ContextId::next();
        log::debug!("created cpu context {:?}", id);
        Context::Cpu(CpuContext { id })
    }

    /// Create a GPU context configured from the environment.
    pub fn new_gpu() -> Result<Self> {
        Self::new_gpu_with(&ContextOptions::from_env())
    }

    /// Create a GPU context with explicit adapter options.
    pub fn new_gpu_with(options: &ContextOptions) -> Result<Self> {
        GpuContext::new(ContextId::next(), options).map(Context::Gpu)
    }

    pub fn id(&self) -> ContextId {
        match self {
            Context::Cpu(cpu) => cpu.id,
            Context::Gpu(gpu) => gpu.id(),
        }
    }

    pub fn kind(&self) -> ContextKind {
        match self {
            Context::Cpu(_) => ContextKind::Cpu,
            Context::Gpu(_) => ContextKind::Gpu,
        }
    }

    pub fn gpu(&self) -> Option<&GpuContext> {
        match self {
            Context::Gpu(gpu) => Some(gpu),
            Context::Cpu(_) => None,
        }
    }

    pub fn gpu_mut(&mut self) -> Option<&mut GpuContext> {
        match self {
            Context::Gpu(gpu) => Some(gpu),
            Context::Cpu(_) => None,
        }
    }

    /// The number of slots in each namespace of a binding table owned by this context.
    pub fn binding_slots(&self) -> usize {
        match self {
            Context::Cpu(_) => MAX_BINDING_SLOTS,
            Context::Gpu(gpu) => gpu.binding_slots(),
        }
    }

    /// Check if an image can be used by computations of this context.
    ///
    /// Host images work with any CPU context, device images only with the context that created
    /// them.
    pub fn accepts(&self, image: &Image) -> bool {
        match (self, image.context()) {
            (Context::Cpu(_), None) => true,
            (Context::Gpu(gpu), Some(id)) => gpu.id() == id,
            _ => false,
        }
    }
}

impl CpuContext {
    pub fn id(&self) -> ContextId {
        self.id
    }
}
