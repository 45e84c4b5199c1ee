//! Scoped views of the host storage of an image.
//!
//! Opening a view first makes the host copy current, downloading from the device when it is
//! stale. Only one view may be open per image. Closing a write view marks the host copy as the
//! newer one, so that the next `upload` pushes it to the device.
//!
//! In Rust the views are guards, released when dropped. The C interface boxes a
//! [`MappedView`] instead and releases it in the explicit unmap call.
use core::ptr::NonNull;

use crate::error::{Error, Result};
use crate::image::{ElementType, HostBuffer, Image, MapMode};

/// A read view, see [`Image::map_read`].
pub struct ReadGuard<'a> {
    image: &'a mut Image,
}

/// A write view, see [`Image::map_write`].
pub struct WriteGuard<'a> {
    image: &'a mut Image,
}

impl Image {
    /// Open a read view of the host storage.
    pub fn map_read(&mut self) -> Result<ReadGuard<'_>> {
        self.begin_map(MapMode::Read)?;
        Ok(ReadGuard { image: self })
    }

    /// Open a write view of the host storage.
    pub fn map_write(&mut self) -> Result<WriteGuard<'_>> {
        self.begin_map(MapMode::Write)?;
        Ok(WriteGuard { image: self })
    }
}

fn mapped_host(image: &Image) -> &HostBuffer {
    // Opening the view allocated and synchronized the host buffer.
    image
        .host()
        .unwrap_or_else(|| unreachable!("mapped image without host storage"))
}

fn mapped_host_mut(image: &mut Image) -> &mut HostBuffer {
    image
        .host_mut()
        .unwrap_or_else(|| unreachable!("mapped image without host storage"))
}

impl ReadGuard<'_> {
    /// The element count of the view.
    pub fn len(&self) -> usize {
        mapped_host(self.image).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The elements, if the image holds `f32`.
    pub fn as_f32(&self) -> Option<&[f32]> {
        mapped_host(self.image).as_f32()
    }

    /// The elements, if the image holds `u8`.
    pub fn as_u8(&self) -> Option<&[u8]> {
        mapped_host(self.image).as_u8()
    }
}

impl WriteGuard<'_> {
    pub fn len(&self) -> usize {
        mapped_host(self.image).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        mapped_host(self.image).as_f32()
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        mapped_host(self.image).as_u8()
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        mapped_host_mut(self.image).as_f32_mut()
    }

    pub fn as_u8_mut(&mut self) -> Option<&mut [u8]> {
        mapped_host_mut(self.image).as_u8_mut()
    }
}

impl Drop for ReadGuard<'_> {
    fn drop(&mut self) {
        let _ = self.image.end_map(MapMode::Read);
    }
}

impl Drop for WriteGuard<'_> {
    fn drop(&mut self) {
        let _ = self.image.end_map(MapMode::Write);
    }
}

/// A view handed out through the C interface.
///
/// Holds a pointer to the image instead of a borrow. The caller guarantees that the image
/// outlives the view and is not destroyed while it is open.
pub(crate) struct MappedView {
    image: NonNull<Image>,
    mode: MapMode,
}

impl MappedView {
    /// Open a view on an image that must outlive it.
    pub(crate) fn open(image: &mut Image, mode: MapMode) -> Result<Self> {
        image.begin_map(mode)?;
        Ok(MappedView {
            image: NonNull::from(image),
            mode,
        })
    }

    pub(crate) fn len(&self) -> usize {
        // SAFETY: the image outlives the view.
        mapped_host(unsafe { self.image.as_ref() }).len()
    }

    pub(crate) fn element_type(&self) -> ElementType {
        // SAFETY: as above.
        unsafe { self.image.as_ref() }.element_type()
    }

    /// A pointer to the `f32` elements, null on a type mismatch.
    pub(crate) fn data_f32(&self) -> *mut f32 {
        // SAFETY: the image outlives the view and nothing else accesses it while mapped.
        let host = mapped_host_mut(unsafe { &mut *self.image.as_ptr() });
        host.as_f32_mut()
            .map_or(core::ptr::null_mut(), |data| data.as_mut_ptr())
    }

    /// A pointer to the `u8` elements, null on a type mismatch.
    pub(crate) fn data_u8(&self) -> *mut u8 {
        // SAFETY: as above.
        let host = mapped_host_mut(unsafe { &mut *self.image.as_ptr() });
        host.as_u8_mut()
            .map_or(core::ptr::null_mut(), |data| data.as_mut_ptr())
    }

    /// Close the view, checking that it is of the expected kind.
    pub(crate) fn close(self, mode: MapMode) -> Result<()> {
        if self.mode != mode {
            return Err(Error::MappingConflict("unmapped a view of the other kind"));
        }

        // SAFETY: the image outlives the view.
        unsafe { &mut *self.image.as_ptr() }.end_map(mode)
    }
}
