//! Host resident texel storage.
use crate::error::{Error, Result};
use crate::image::ElementType;

/// A tightly packed buffer of texels, channel-fastest.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum HostBuffer {
    UInt8(Vec<u8>),
    Float32(Vec<f32>),
}

impl HostBuffer {
    /// Allocate a zeroed buffer, failing instead of aborting when memory is short.
    pub(crate) fn zeroed(element_type: ElementType, len: usize) -> Result<Self> {
        fn alloc<T: Clone + Default>(len: usize) -> Result<Vec<T>> {
            let mut data = Vec::new();
            data.try_reserve_exact(len).map_err(|err| {
                Error::allocation(format!("host buffer of {} elements: {}", len, err))
            })?;
            data.resize(len, T::default());
            Ok(data)
        }

        Ok(match element_type {
            ElementType::UInt8 => HostBuffer::UInt8(alloc(len)?),
            ElementType::Float32 => HostBuffer::Float32(alloc(len)?),
        })
    }

    pub(crate) fn element_type(&self) -> ElementType {
        match self {
            HostBuffer::UInt8(_) => ElementType::UInt8,
            HostBuffer::Float32(_) => ElementType::Float32,
        }
    }

    /// The number of elements, not bytes.
    pub(crate) fn len(&self) -> usize {
        match self {
            HostBuffer::UInt8(data) => data.len(),
            HostBuffer::Float32(data) => data.len(),
        }
    }

    pub(crate) fn as_bytes(&self) -> &[u8] {
        match self {
            HostBuffer::UInt8(data) => data,
            HostBuffer::Float32(data) => bytemuck::cast_slice(data),
        }
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        match self {
            HostBuffer::UInt8(data) => data,
            HostBuffer::Float32(data) => bytemuck::cast_slice_mut(data),
        }
    }

    pub(crate) fn as_u8(&self) -> Option<&[u8]> {
        match self {
            HostBuffer::UInt8(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn as_u8_mut(&mut self) -> Option<&mut [u8]> {
        match self {
            HostBuffer::UInt8(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn as_f32(&self) -> Option<&[f32]> {
        match self {
            HostBuffer::Float32(data) => Some(data),
            _ => None,
        }
    }

    pub(crate) fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match self {
            HostBuffer::Float32(data) => Some(data),
            _ => None,
        }
    }

    /// Store a normalized value, quantizing it for byte buffers.
    pub(crate) fn store(&mut self, index: usize, value: f32) {
        match self {
            HostBuffer::UInt8(data) => data[index] = quantize(value),
            HostBuffer::Float32(data) => data[index] = value,
        }
    }

    /// Load an element as a normalized value.
    pub(crate) fn load(&self, index: usize) -> f32 {
        match self {
            HostBuffer::UInt8(data) => f32::from(data[index]) / 255.0,
            HostBuffer::Float32(data) => data[index],
        }
    }
}

fn quantize(value: f32) -> u8 {
    // NaN saturates to zero.
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[test]
fn quantizes_like_unorm() {
    assert_eq!(quantize(0.0), 0);
    assert_eq!(quantize(1.0), 255);
    assert_eq!(quantize(0.5), 128);
    assert_eq!(quantize(-3.0), 0);
    assert_eq!(quantize(f32::NAN), 0);
}

#[test]
fn typed_access_does_not_convert() {
    let mut buffer = HostBuffer::zeroed(ElementType::Float32, 6).unwrap();
    assert!(buffer.as_u8().is_none());
    assert_eq!(buffer.as_bytes().len(), 24);

    buffer.store(2, 0.25);
    assert_eq!(buffer.as_f32().unwrap()[2], 0.25);
    assert_eq!(buffer.load(2), 0.25);

    let mut bytes = HostBuffer::zeroed(ElementType::UInt8, 3).unwrap();
    bytes.store(1, 1.0);
    assert!(bytes.as_f32().is_none());
    assert_eq!(bytes.as_u8().unwrap(), &[0, 255, 0]);
    assert_eq!(bytes.load(1), 1.0);
}
