//! Images and the coherency between their host and device storage.
//!
//! An image created for the CPU only ever has host storage. An image created for a GPU context
//! owns a device texture and lazily allocates a host buffer on first host access. Two staleness
//! flags track which of the two copies is newer:
//!
//! | state         | host buffer | `host_stale` | `device_stale` |
//! |---------------|-------------|--------------|----------------|
//! | `HostOnly`    | only        | -            | -              |
//! | `DeviceOnly`  | none        | -            | -              |
//! | `Synced`      | yes         | false        | false          |
//! | `HostNewer`   | yes         | false        | true           |
//! | `DeviceNewer` | yes         | true         | false          |
mod device;
mod host;

pub(crate) use self::device::{DeviceTexture, DEVICE_FORMATS, DEVICE_USAGES};
pub(crate) use self::host::HostBuffer;

use crate::context::{Context, ContextId};
use crate::error::{Error, Result};

/// The extent of an image, in texels and channels.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageDim {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub channels: usize,
}

/// The type of each channel value.
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    /// Normalized bytes, `0..=255` mapping to `[0, 1]`.
    UInt8 = 0,
    Float32 = 1,
}

/// Which of the two storages holds the newest texel data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Coherency {
    HostOnly,
    DeviceOnly,
    Synced,
    HostNewer,
    DeviceNewer,
}

/// What an `upload` or `download` did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncOutcome {
    /// Data was copied between host and device.
    Transferred,
    /// The destination was already current.
    UpToDate,
    /// The image only has host storage, there is nothing to synchronize.
    NoDeviceBacking,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum MapMode {
    Read,
    Write,
}

/// An image handle, owning its storage.
pub struct Image {
    dim: ImageDim,
    element_type: ElementType,
    storage: Storage,
    mapped: Option<MapMode>,
}

enum Storage {
    Host(HostBuffer),
    Device(DeviceStorage),
}

struct DeviceStorage {
    texture: DeviceTexture,
    host: Option<HostBuffer>,
    /// The device holds newer data than `host`.
    host_stale: bool,
    /// `host` holds newer data than the device.
    device_stale: bool,
}

impl ImageDim {
    pub const fn new(width: usize, height: usize, depth: usize, channels: usize) -> Self {
        ImageDim {
            width,
            height,
            depth,
            channels,
        }
    }

    /// The number of texels, not counting channels.
    pub fn texels(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// The total number of elements.
    ///
    /// Only meaningful for validated dimensions, which are guaranteed not to overflow.
    pub fn len(&self) -> usize {
        self.texels() * self.channels
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The element index of a channel of a texel in host storage.
    pub fn index(&self, x: usize, y: usize, z: usize, channel: usize) -> usize {
        ((z * self.height + y) * self.width + x) * self.channels + channel
    }

    /// Check that every extent is non-zero and that the byte size is addressable.
    pub(crate) fn validate(&self, element_type: ElementType) -> Result<usize> {
        if [self.width, self.height, self.depth, self.channels].contains(&0) {
            return Err(Error::allocation(format!(
                "every dimension must be at least 1, got {:?}",
                self
            )));
        }

        let len = self
            .width
            .checked_mul(self.height)
            .and_then(|v| v.checked_mul(self.depth))
            .and_then(|v| v.checked_mul(self.channels));

        match len {
            Some(len) if len.checked_mul(element_type.byte_size()).is_some() => Ok(len),
            _ => Err(Error::allocation(format!("{:?} overflows the address space", self))),
        }
    }
}

impl ElementType {
    pub fn byte_size(self) -> usize {
        match self {
            ElementType::UInt8 => 1,
            ElementType::Float32 => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::UInt8 => "uint8",
            ElementType::Float32 => "float32",
        }
    }

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(ElementType::UInt8),
            1 => Some(ElementType::Float32),
            _ => None,
        }
    }
}

impl Image {
    /// Create an image in host memory, usable with any CPU context.
    pub fn new_cpu(dim: ImageDim, element_type: ElementType) -> Result<Self> {
        let len = dim.validate(element_type)?;
        let host = HostBuffer::zeroed(element_type, len)?;
        log::debug!("allocated host image {:?} of {}", dim, element_type.name());

        Ok(Image {
            dim,
            element_type,
            storage: Storage::Host(host),
            mapped: None,
        })
    }

    /// Create a one dimensional image, `height` and `depth` must be `1`.
    pub fn new_gpu_1d(dim: ImageDim, element_type: ElementType, ctx: &Context) -> Result<Self> {
        if dim.height != 1 || dim.depth != 1 {
            return Err(Error::unsupported(format!(
                "a 1d image needs height and depth 1, got {:?}",
                dim
            )));
        }

        Self::new_gpu(dim, element_type, ctx)
    }

    /// Create a two dimensional image, `depth` must be `1`.
    pub fn new_gpu_2d(dim: ImageDim, element_type: ElementType, ctx: &Context) -> Result<Self> {
        if dim.depth != 1 {
            return Err(Error::unsupported(format!(
                "a 2d image needs depth 1, got {:?}",
                dim
            )));
        }

        Self::new_gpu(dim, element_type, ctx)
    }

    /// Create a three dimensional image.
    pub fn new_gpu_3d(dim: ImageDim, element_type: ElementType, ctx: &Context) -> Result<Self> {
        Self::new_gpu(dim, element_type, ctx)
    }

    fn new_gpu(dim: ImageDim, element_type: ElementType, ctx: &Context) -> Result<Self> {
        let gpu = ctx
            .gpu()
            .ok_or(Error::ContextMismatch("device images require a GPU context"))?;
        dim.validate(element_type)?;
        let texture = DeviceTexture::new(gpu, dim, element_type)?;

        Ok(Image {
            dim,
            element_type,
            storage: Storage::Device(DeviceStorage {
                texture,
                host: None,
                host_stale: false,
                device_stale: false,
            }),
            mapped: None,
        })
    }

    pub fn dim(&self) -> ImageDim {
        self.dim
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// The GPU context owning the device storage, `None` for host images.
    pub fn context(&self) -> Option<ContextId> {
        match &self.storage {
            Storage::Host(_) => None,
            Storage::Device(device) => Some(device.texture.context()),
        }
    }

    pub fn coherency(&self) -> Coherency {
        match &self.storage {
            Storage::Host(_) => Coherency::HostOnly,
            Storage::Device(DeviceStorage { host: None, .. }) => Coherency::DeviceOnly,
            Storage::Device(device) if device.host_stale => Coherency::DeviceNewer,
            Storage::Device(device) if device.device_stale => Coherency::HostNewer,
            Storage::Device(_) => Coherency::Synced,
        }
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped.is_some()
    }

    /// Push newer host data to the device.
    pub fn upload(&mut self) -> Result<SyncOutcome> {
        self.ensure_unmapped("upload")?;

        let device = match &mut self.storage {
            Storage::Host(_) => {
                log::warn!("upload of a host image has no effect");
                return Ok(SyncOutcome::NoDeviceBacking);
            }
            Storage::Device(device) => device,
        };

        match &device.host {
            Some(host) if device.device_stale => {
                device.texture.upload(host)?;
                device.device_stale = false;
                Ok(SyncOutcome::Transferred)
            }
            _ => {
                log::debug!("upload skipped, the device is up to date");
                Ok(SyncOutcome::UpToDate)
            }
        }
    }

    /// Pull newer device data to the host, allocating the host buffer if needed.
    pub fn download(&mut self) -> Result<SyncOutcome> {
        self.ensure_unmapped("download")?;
        self.pull()
    }

    fn pull(&mut self) -> Result<SyncOutcome> {
        let device = match &mut self.storage {
            Storage::Host(_) => {
                log::warn!("download of a host image has no effect");
                return Ok(SyncOutcome::NoDeviceBacking);
            }
            Storage::Device(device) => device,
        };

        if device.host.is_some() && !device.host_stale {
            log::debug!("download skipped, the host is up to date");
            return Ok(SyncOutcome::UpToDate);
        }

        let host = match &mut device.host {
            Some(host) => host,
            empty => empty.insert(HostBuffer::zeroed(self.element_type, self.dim.len())?),
        };

        device.texture.download(host)?;
        device.host_stale = false;
        Ok(SyncOutcome::Transferred)
    }

    pub(crate) fn ensure_unmapped(&self, what: &'static str) -> Result<()> {
        match self.mapped {
            None => Ok(()),
            Some(_) => Err(Error::MappingConflict(what)),
        }
    }

    /// Make the host buffer current and record the view.
    pub(crate) fn begin_map(&mut self, mode: MapMode) -> Result<()> {
        if self.mapped.is_some() {
            return Err(Error::MappingConflict("the image already has an open view"));
        }

        self.pull()?;
        self.mapped = Some(mode);
        Ok(())
    }

    /// End a view, a write view leaves the host copy as the newer one.
    pub(crate) fn end_map(&mut self, mode: MapMode) -> Result<()> {
        if self.mapped != Some(mode) {
            return Err(Error::MappingConflict("the image has no view of this kind open"));
        }

        self.mapped = None;
        if mode == MapMode::Write {
            self.mark_host_written();
        }

        Ok(())
    }

    pub(crate) fn host(&self) -> Option<&HostBuffer> {
        match &self.storage {
            Storage::Host(host) => Some(host),
            Storage::Device(device) => device.host.as_ref(),
        }
    }

    pub(crate) fn host_mut(&mut self) -> Option<&mut HostBuffer> {
        match &mut self.storage {
            Storage::Host(host) => Some(host),
            Storage::Device(device) => device.host.as_mut(),
        }
    }

    pub(crate) fn device_texture(&self) -> Option<&DeviceTexture> {
        match &self.storage {
            Storage::Host(_) => None,
            Storage::Device(device) => Some(&device.texture),
        }
    }

    pub(crate) fn mark_host_written(&mut self) {
        if let Storage::Device(device) = &mut self.storage {
            device.host_stale = false;
            device.device_stale = true;
        }
    }

    pub(crate) fn mark_device_written(&mut self) {
        if let Storage::Device(device) = &mut self.storage {
            device.device_stale = false;
            device.host_stale = device.host.is_some();
        }
    }
}

impl core::fmt::Debug for Image {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Image")
            .field("dim", &self.dim)
            .field("element_type", &self.element_type)
            .field("coherency", &self.coherency())
            .field("mapped", &self.mapped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_and_overflowing_dims() {
        let err = Image::new_cpu(ImageDim::new(4, 0, 1, 1), ElementType::UInt8).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::AllocationFailure);

        let huge = ImageDim::new(usize::MAX, 2, 1, 1);
        assert!(huge.validate(ElementType::UInt8).is_err());
        let wide = ImageDim::new(usize::MAX / 2, 1, 1, 1);
        assert!(wide.validate(ElementType::UInt8).is_ok());
        assert!(wide.validate(ElementType::Float32).is_err());
    }

    #[test]
    fn index_is_channel_fastest() {
        let dim = ImageDim::new(3, 2, 2, 4);
        assert_eq!(dim.index(0, 0, 0, 1), 1);
        assert_eq!(dim.index(1, 0, 0, 0), 4);
        assert_eq!(dim.index(0, 1, 0, 0), 12);
        assert_eq!(dim.index(0, 0, 1, 0), 24);
        assert_eq!(dim.index(2, 1, 1, 3), dim.len() - 1);
    }

    #[test]
    fn host_images_stay_host_only() {
        let mut image = Image::new_cpu(ImageDim::new(2, 2, 1, 1), ElementType::Float32).unwrap();
        assert_eq!(image.coherency(), Coherency::HostOnly);
        assert_eq!(image.upload(), Ok(SyncOutcome::NoDeviceBacking));
        assert_eq!(image.download(), Ok(SyncOutcome::NoDeviceBacking));

        image.begin_map(MapMode::Write).unwrap();
        assert!(image.begin_map(MapMode::Read).is_err());
        assert!(image.upload().is_err());
        assert!(image.end_map(MapMode::Read).is_err());
        image.end_map(MapMode::Write).unwrap();

        assert!(!image.is_mapped());
        assert_eq!(image.coherency(), Coherency::HostOnly);
    }

    #[test]
    fn gpu_images_need_a_gpu_context() {
        let ctx = Context::new_cpu();
        let dim = ImageDim::new(4, 4, 1, 1);
        let err = Image::new_gpu_2d(dim, ElementType::UInt8, &ctx).unwrap_err();
        assert_eq!(err, Error::ContextMismatch("device images require a GPU context"));

        let err = Image::new_gpu_1d(dim, ElementType::UInt8, &ctx).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedTarget);
    }
}
