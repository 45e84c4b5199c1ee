//! Device resident texel storage.
//!
//! Every device image is a 2D array texture with one layer per depth slice, regardless of the
//! dimensionality it was created with. That keeps a single render path for all methods, a 3D
//! target is rendered one layer at a time.
use std::borrow::Cow;
use std::sync::{mpsc, Arc};

use crate::context::ContextId;
use crate::error::{Error, Result};
use crate::gpu::{GpuContext, GpuShared};
use crate::image::{ElementType, HostBuffer, ImageDim};
use crate::util::align_to;

pub(crate) struct DeviceTexture {
    shared: Arc<GpuShared>,
    texture: wgpu::Texture,
    format: wgpu::TextureFormat,
    /// Channels per texel in device memory, three channel images are padded to four.
    device_channels: usize,
    element_type: ElementType,
    dim: ImageDim,
    context: ContextId,
}

/// Every format [`texture_format`] can choose.
pub(crate) const DEVICE_FORMATS: [wgpu::TextureFormat; 6] = [
    wgpu::TextureFormat::R8Unorm,
    wgpu::TextureFormat::Rg8Unorm,
    wgpu::TextureFormat::Rgba8Unorm,
    wgpu::TextureFormat::R32Float,
    wgpu::TextureFormat::Rg32Float,
    wgpu::TextureFormat::Rgba32Float,
];

/// Images are rendered to, sampled as method inputs and copied in both directions.
pub(crate) const DEVICE_USAGES: wgpu::TextureUsages = wgpu::TextureUsages::TEXTURE_BINDING
    .union(wgpu::TextureUsages::RENDER_ATTACHMENT)
    .union(wgpu::TextureUsages::COPY_SRC)
    .union(wgpu::TextureUsages::COPY_DST);

/// Choose the texture format holding images of this shape.
fn texture_format(element_type: ElementType, channels: usize) -> Result<(wgpu::TextureFormat, usize)> {
    use wgpu::TextureFormat as F;
    Ok(match (element_type, channels) {
        (ElementType::UInt8, 1) => (F::R8Unorm, 1),
        (ElementType::UInt8, 2) => (F::Rg8Unorm, 2),
        (ElementType::UInt8, 3 | 4) => (F::Rgba8Unorm, 4),
        (ElementType::Float32, 1) => (F::R32Float, 1),
        (ElementType::Float32, 2) => (F::Rg32Float, 2),
        (ElementType::Float32, 3 | 4) => (F::Rgba32Float, 4),
        (_, channels) => {
            return Err(Error::unsupported(format!(
                "device images hold at most 4 channels, not {}",
                channels
            )))
        }
    })
}

impl DeviceTexture {
    pub(crate) fn new(gpu: &GpuContext, dim: ImageDim, element_type: ElementType) -> Result<Self> {
        let (format, device_channels) = texture_format(element_type, dim.channels)?;
        let shared = Arc::clone(&gpu.shared);
        let limits = &shared.limits;

        let fits = |value: usize, max: u32| u32::try_from(value).map_or(false, |v| v <= max);
        if !fits(dim.width, limits.max_texture_dimension_2d)
            || !fits(dim.height, limits.max_texture_dimension_2d)
            || !fits(dim.depth, limits.max_texture_array_layers)
        {
            return Err(Error::allocation(format!(
                "{}x{}x{} exceeds the device texture limits",
                dim.width, dim.height, dim.depth
            )));
        }

        let texture = shared.scoped("image allocation", |device, _| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some("txkit_image"),
                size: extent(dim),
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: DEVICE_USAGES,
                view_formats: &[],
            })
        })?;

        log::debug!("allocated {:?} texture for {:?}", format, dim);

        Ok(DeviceTexture {
            shared,
            texture,
            format,
            device_channels,
            element_type,
            dim,
            context: gpu.id(),
        })
    }

    pub(crate) fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub(crate) fn dim(&self) -> ImageDim {
        self.dim
    }

    pub(crate) fn context(&self) -> ContextId {
        self.context
    }

    /// A view of one depth slice, used as a render attachment.
    pub(crate) fn layer_view(&self, layer: u32) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("txkit_layer"),
            dimension: Some(wgpu::TextureViewDimension::D2),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }

    /// A view of all slices, used as a sampled input.
    pub(crate) fn array_view(&self) -> wgpu::TextureView {
        self.texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("txkit_input"),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            ..Default::default()
        })
    }

    fn host_texel_bytes(&self) -> usize {
        self.dim.channels * self.element_type.byte_size()
    }

    fn device_texel_bytes(&self) -> usize {
        self.device_channels * self.element_type.byte_size()
    }

    /// Copy the complete host buffer into the texture, blocking until the queue is idle.
    pub(crate) fn upload(&self, host: &HostBuffer) -> Result<()> {
        debug_assert_eq!(host.element_type(), self.element_type);
        let data = self.pad_texels(host.as_bytes());
        let bytes_per_row = self.dim.width * self.device_texel_bytes();

        log::debug!("uploading {} bytes to {:?}", data.len(), self.format);

        self.shared.scoped("upload", |device, queue| {
            queue.write_texture(
                self.texture.as_image_copy(),
                &data,
                wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row as u32),
                    rows_per_image: Some(self.dim.height as u32),
                },
                extent(self.dim),
            );

            queue.submit(None);
            let _ = device.poll(wgpu::Maintain::Wait);
        })
    }

    /// Copy the texture into the host buffer, blocking until the data arrived.
    pub(crate) fn download(&self, host: &mut HostBuffer) -> Result<()> {
        debug_assert_eq!(host.element_type(), self.element_type);

        let row_bytes = self.dim.width * self.device_texel_bytes();
        let padded_row = u32::try_from(row_bytes)
            .ok()
            .and_then(|row| align_to(row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT))
            .ok_or_else(|| Error::allocation("row of the readback buffer too large"))?;
        let rows = (self.dim.height * self.dim.depth) as u64;
        let size = u64::from(padded_row) * rows;

        log::debug!("downloading {} bytes from {:?}", size, self.format);

        let buffer = self.shared.scoped("download", |device, queue| {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("txkit_readback"),
                size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("txkit_readback"),
            });

            encoder.copy_texture_to_buffer(
                self.texture.as_image_copy(),
                wgpu::ImageCopyBuffer {
                    buffer: &buffer,
                    layout: wgpu::ImageDataLayout {
                        offset: 0,
                        bytes_per_row: Some(padded_row),
                        rows_per_image: Some(self.dim.height as u32),
                    },
                },
                extent(self.dim),
            );

            queue.submit(Some(encoder.finish()));
            buffer
        })?;

        let slice = buffer.slice(..);
        let (send, recv) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = send.send(result);
        });

        let _ = self.shared.device.poll(wgpu::Maintain::Wait);
        recv.recv()
            .map_err(|_| Error::backend("readback was dropped by the device"))?
            .map_err(|err| Error::backend(format!("mapping the readback buffer: {}", err)))?;

        {
            let data = slice.get_mapped_range();
            let host_row = self.dim.width * self.host_texel_bytes();
            let target = host.as_bytes_mut();

            for (row, target_row) in target.chunks_exact_mut(host_row).enumerate() {
                let source_row = &data[row * padded_row as usize..][..row_bytes];
                self.unpad_row(source_row, target_row);
            }
        }

        buffer.unmap();
        Ok(())
    }

    /// Convert host texels to the device layout.
    fn pad_texels<'data>(&self, host: &'data [u8]) -> Cow<'data, [u8]> {
        if self.device_channels == self.dim.channels {
            return Cow::Borrowed(host);
        }

        let source = self.host_texel_bytes();
        let target = self.device_texel_bytes();
        let mut padded = vec![0; host.len() / source * target];

        for (from, into) in host.chunks_exact(source).zip(padded.chunks_exact_mut(target)) {
            into[..source].copy_from_slice(from);
        }

        Cow::Owned(padded)
    }

    fn unpad_row(&self, source: &[u8], target: &mut [u8]) {
        if self.device_channels == self.dim.channels {
            return target.copy_from_slice(source);
        }

        let keep = self.host_texel_bytes();
        let stride = self.device_texel_bytes();

        for (from, into) in source.chunks_exact(stride).zip(target.chunks_exact_mut(keep)) {
            into.copy_from_slice(&from[..keep]);
        }
    }
}

fn extent(dim: ImageDim) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: dim.width as u32,
        height: dim.height as u32,
        depth_or_array_layers: dim.depth as u32,
    }
}

#[test]
fn formats_pad_three_channels() {
    assert_eq!(
        texture_format(ElementType::UInt8, 3).unwrap(),
        (wgpu::TextureFormat::Rgba8Unorm, 4)
    );
    assert_eq!(
        texture_format(ElementType::Float32, 2).unwrap(),
        (wgpu::TextureFormat::Rg32Float, 2)
    );
    assert!(texture_format(ElementType::Float32, 5).is_err());
}

#[test]
fn formats_are_all_listed() {
    for element_type in [ElementType::UInt8, ElementType::Float32] {
        for channels in 1..=4 {
            let (format, _) = texture_format(element_type, channels).unwrap();
            assert!(DEVICE_FORMATS.contains(&format), "{:?}", format);
        }
    }
}
