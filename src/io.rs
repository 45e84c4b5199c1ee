//! Tables of auxiliary images consumed by methods.
use core::ptr::NonNull;

use crate::context::{Context, ContextId, ContextKind};
use crate::error::{Error, Result};
use crate::image::Image;

/// The slot count of each namespace on the CPU, and the upper bound on any GPU.
pub const MAX_BINDING_SLOTS: usize = 8;

/// An index to image table with separate image unit and texture unit namespaces.
///
/// The table does not own the bound images, it only remembers where they are. A bound image must
/// outlive its binding, or the binding must be cleared first.
pub struct ImageIo {
    context: ContextId,
    kind: ContextKind,
    image_units: Vec<Option<NonNull<Image>>>,
    texture_units: Vec<Option<NonNull<Image>>>,
}

impl ImageIo {
    /// Create an empty table for images usable under `ctx`.
    pub fn new(ctx: &Context) -> Self {
        let slots = ctx.binding_slots();
        ImageIo {
            context: ctx.id(),
            kind: ctx.kind(),
            image_units: vec![None; slots],
            texture_units: vec![None; slots],
        }
    }

    /// The context this table was created for.
    pub fn context(&self) -> ContextId {
        self.context
    }

    /// The number of slots in each namespace.
    pub fn slots(&self) -> usize {
        self.image_units.len()
    }

    /// Bind an image to a read/write storage slot, `None` clears it.
    pub fn set_image_binding(&mut self, index: usize, image: Option<&Image>) -> Result<()> {
        let entry = self.check(index, image)?;
        self.image_units[index] = entry;
        Ok(())
    }

    /// Bind an image to a sampled slot, `None` clears it.
    pub fn set_texture_binding(&mut self, index: usize, image: Option<&Image>) -> Result<()> {
        let entry = self.check(index, image)?;
        self.texture_units[index] = entry;
        Ok(())
    }

    pub fn is_image_bound(&self, index: usize) -> bool {
        matches!(self.image_units.get(index), Some(Some(_)))
    }

    pub fn is_texture_bound(&self, index: usize) -> bool {
        matches!(self.texture_units.get(index), Some(Some(_)))
    }

    /// The image bound to a texture slot.
    ///
    /// # Safety
    ///
    /// Every image bound to the table must still be alive, and not be mutably borrowed for the
    /// returned lifetime.
    pub(crate) unsafe fn texture_unit(&self, index: usize) -> Option<&Image> {
        let image = (*self.texture_units.get(index)?)?;
        Some(image.as_ref())
    }

    /// Whether `image` is bound in any slot.
    pub(crate) fn binds(&self, image: &Image) -> bool {
        let ptr = NonNull::from(image);
        self.image_units
            .iter()
            .chain(&self.texture_units)
            .any(|slot| *slot == Some(ptr))
    }

    fn check(&self, index: usize, image: Option<&Image>) -> Result<Option<NonNull<Image>>> {
        if index >= self.slots() {
            return Err(Error::BindingOutOfRange {
                index,
                slots: self.slots(),
            });
        }

        let image = match image {
            None => return Ok(None),
            Some(image) => image,
        };

        let compatible = match (self.kind, image.context()) {
            (ContextKind::Cpu, None) => true,
            (ContextKind::Gpu, Some(id)) => id == self.context,
            _ => false,
        };

        if !compatible {
            return Err(Error::IncompatibleContext);
        }

        Ok(Some(NonNull::from(image)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{ElementType, ImageDim};

    #[test]
    fn binding_and_clearing() {
        let ctx = Context::new_cpu();
        let image = Image::new_cpu(ImageDim::new(2, 2, 1, 1), ElementType::Float32).unwrap();
        let mut io = ImageIo::new(&ctx);
        assert_eq!(io.slots(), MAX_BINDING_SLOTS);

        io.set_texture_binding(0, Some(&image)).unwrap();
        assert!(io.is_texture_bound(0));
        assert!(!io.is_image_bound(0));
        assert!(io.binds(&image));

        io.set_texture_binding(0, None).unwrap();
        assert!(!io.is_texture_bound(0));
        assert!(!io.binds(&image));
    }

    #[test]
    fn out_of_range_leaves_table_unchanged() {
        let ctx = Context::new_cpu();
        let image = Image::new_cpu(ImageDim::new(2, 2, 1, 1), ElementType::Float32).unwrap();
        let mut io = ImageIo::new(&ctx);

        io.set_image_binding(1, Some(&image)).unwrap();
        let err = io.set_image_binding(MAX_BINDING_SLOTS, None).unwrap_err();
        assert_eq!(
            err,
            Error::BindingOutOfRange {
                index: MAX_BINDING_SLOTS,
                slots: MAX_BINDING_SLOTS
            }
        );
        assert!(io.is_image_bound(1));
    }
}
