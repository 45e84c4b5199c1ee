//! The wgpu backend of GPU contexts.
//!
//! Methods run as a single fragment shader over a fullscreen triangle, once per layer of the
//! target texture. Every method shader is the concatenation of a shared prelude (vertex stage,
//! frame uniforms, the input texture and the fragment entry point) and a method specific part
//! which declares its `Params` block at binding 1 and a `texel_value` function.
use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::context::{ContextId, ContextOptions};
use crate::error::{Error, Result};
use crate::image::{DeviceTexture, DEVICE_FORMATS, DEVICE_USAGES};
use crate::io::MAX_BINDING_SLOTS;

/// The vertex stage and the fragment entry point shared by all method shaders.
const PRELUDE: &str = include_str!("shaders/prelude.wgsl");

/// A GPU execution context.
pub struct GpuContext {
    id: ContextId,
    pub(crate) shared: Arc<GpuShared>,
    info: wgpu::AdapterInfo,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    /// Bound as the input texture of passes without any input.
    placeholder: wgpu::TextureView,
    pipelines: HashMap<PipelineKey, wgpu::RenderPipeline>,
}

/// Device state shared between a context and the images created under it.
pub(crate) struct GpuShared {
    pub(crate) device: wgpu::Device,
    pub(crate) queue: wgpu::Queue,
    pub(crate) limits: wgpu::Limits,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct PipelineKey {
    method: &'static str,
    format: wgpu::TextureFormat,
}

/// One method invocation, rendered over all layers of a target.
pub(crate) struct ShaderPass<'a> {
    /// The unique method name, keys the pipeline cache.
    pub method: &'static str,
    /// The method specific WGSL source.
    pub source: &'static str,
    /// Uniform data matching the `Params` block of the source.
    pub params: &'a [u8],
    /// The texture sampled through `input_texture`, if any.
    pub input: Option<&'a DeviceTexture>,
}

/// Matches `Frame` in the prelude.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct FrameUniforms {
    size: [u32; 4],
    layer: u32,
    has_input: u32,
    _pad: [u32; 2],
}

impl GpuContext {
    pub(crate) fn new(id: ContextId, options: &ContextOptions) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: options.backends,
            ..Default::default()
        });

        let requested = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: options.power_preference,
            force_fallback_adapter: options.force_fallback_adapter,
            compatible_surface: None,
        }))
        .ok_or_else(|| Error::allocation("no suitable GPU adapter found"))?;

        let adapter = match missing_image_support(&requested) {
            None => requested,
            Some((format, usages)) => {
                let rejected = requested.get_info();
                log::info!(
                    "adapter {} ({:?}) can not use {:?} textures as {:?}",
                    rejected.name,
                    rejected.backend,
                    format,
                    usages
                );

                // Downlevel backends restrict format usages, another backend may not.
                instance
                    .enumerate_adapters(options.backends)
                    .into_iter()
                    .find(|other| missing_image_support(other).is_none())
                    .ok_or_else(|| {
                        Error::allocation(format!(
                            "adapter {} ({:?}) does not support {:?} textures with usages {:?}",
                            rejected.name, rejected.backend, format, usages
                        ))
                    })?
            }
        };

        let info = adapter.get_info();
        let limits = wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits());

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("txkit"),
                required_features: wgpu::Features::empty(),
                required_limits: limits.clone(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|err| Error::allocation(format!("failed to request a device: {}", err)))?;

        // Errors outside of our error scopes must not abort the process.
        device.on_uncaptured_error(Box::new(|err| {
            log::error!("uncaptured device error: {}", err);
        }));

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("txkit_method"),
            entries: &[
                uniform_entry(0),
                uniform_entry(1),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        multisampled: false,
                        view_dimension: wgpu::TextureViewDimension::D2Array,
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("txkit_method"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let placeholder = device
            .create_texture(&wgpu::TextureDescriptor {
                label: Some("txkit_placeholder"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::R32Float,
                usage: wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
            .create_view(&wgpu::TextureViewDescriptor {
                dimension: Some(wgpu::TextureViewDimension::D2Array),
                ..Default::default()
            });

        log::debug!(
            "created gpu context {:?} on {} ({:?})",
            id,
            info.name,
            info.backend
        );

        Ok(GpuContext {
            id,
            shared: Arc::new(GpuShared {
                device,
                queue,
                limits,
            }),
            info,
            bind_group_layout,
            pipeline_layout,
            placeholder,
            pipelines: HashMap::new(),
        })
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Information about the adapter this context runs on.
    pub fn adapter_info(&self) -> &wgpu::AdapterInfo {
        &self.info
    }

    pub(crate) fn binding_slots(&self) -> usize {
        let sampled = self.shared.limits.max_sampled_textures_per_shader_stage as usize;
        sampled.min(MAX_BINDING_SLOTS)
    }

    /// Render a method over every layer of the target, blocking until the device is done.
    pub(crate) fn render(&mut self, target: &DeviceTexture, pass: ShaderPass<'_>) -> Result<()> {
        let key = PipelineKey {
            method: pass.method,
            format: target.format(),
        };

        if !self.pipelines.contains_key(&key) {
            let pipeline = self.create_pipeline(key, pass.source)?;
            self.pipelines.insert(key, pipeline);
        } else {
            log::trace!("pipeline cache hit for {:?}", key);
        }

        let this = &*self;
        let pipeline = this
            .pipelines
            .get(&key)
            .ok_or_else(|| Error::backend("pipeline vanished from the cache"))?;
        let input = pass.input.map(DeviceTexture::array_view);
        let dim = target.dim();

        this.shared.scoped(pass.method, |device, queue| {
            let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(pass.method),
                contents: pass.params,
                usage: wgpu::BufferUsages::UNIFORM,
            });

            let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some(pass.method),
            });

            // Each layer gets its own frame uniforms, all writes land before the submit.
            for layer in 0..dim.depth as u32 {
                let frame = FrameUniforms {
                    size: [
                        dim.width as u32,
                        dim.height as u32,
                        dim.depth as u32,
                        dim.channels as u32,
                    ],
                    layer,
                    has_input: input.is_some() as u32,
                    _pad: [0; 2],
                };

                let frame = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("txkit_frame"),
                    contents: bytemuck::bytes_of(&frame),
                    usage: wgpu::BufferUsages::UNIFORM,
                });

                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(pass.method),
                    layout: &this.bind_group_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: frame.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: params.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(
                                input.as_ref().unwrap_or(&this.placeholder),
                            ),
                        },
                    ],
                });

                let view = target.layer_view(layer);
                let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some(pass.method),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: &view,
                        resolve_target: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });

                rpass.set_pipeline(pipeline);
                rpass.set_bind_group(0, &bind_group, &[]);
                rpass.draw(0..3, 0..1);
            }

            let index = queue.submit(Some(encoder.finish()));
            let _ = device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
        })
    }

    fn create_pipeline(&self, key: PipelineKey, source: &str) -> Result<wgpu::RenderPipeline> {
        log::debug!("compiling pipeline {:?}", key);
        let source = format!("{}\n{}", PRELUDE, source);

        self.shared.scoped(key.method, |device, _| {
            let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(key.method),
                source: wgpu::ShaderSource::Wgsl(source.into()),
            });

            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(key.method),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    compilation_options: wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: key.format,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview: None,
                cache: None,
            })
        })
    }
}

impl GpuShared {
    /// Run device operations, turning validation and memory errors into a `BackendFailure`.
    pub(crate) fn scoped<T>(
        &self,
        what: &str,
        operation: impl FnOnce(&wgpu::Device, &wgpu::Queue) -> T,
    ) -> Result<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let value = operation(&self.device, &self.queue);

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());

        match out_of_memory.or(validation) {
            None => Ok(value),
            Some(err) => Err(Error::backend(format!("{}: {}", what, err))),
        }
    }
}

/// The first image format the adapter can not use as an image texture, and the usages it lacks.
fn missing_image_support(adapter: &wgpu::Adapter) -> Option<(wgpu::TextureFormat, wgpu::TextureUsages)> {
    missing_format_usages(|format| adapter.get_texture_format_features(format))
}

fn missing_format_usages(
    features: impl Fn(wgpu::TextureFormat) -> wgpu::TextureFormatFeatures,
) -> Option<(wgpu::TextureFormat, wgpu::TextureUsages)> {
    DEVICE_FORMATS.iter().find_map(|&format| {
        let missing = DEVICE_USAGES.difference(features(format).allowed_usages);
        (!missing.is_empty()).then_some((format, missing))
    })
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wgpu::{TextureFormat, TextureUsages};

    fn features(allowed_usages: TextureUsages) -> wgpu::TextureFormatFeatures {
        wgpu::TextureFormatFeatures {
            allowed_usages,
            flags: wgpu::TextureFormatFeatureFlags::empty(),
        }
    }

    #[test]
    fn image_formats_need_every_usage() {
        assert_eq!(missing_format_usages(|_| features(DEVICE_USAGES)), None);
        assert_eq!(missing_format_usages(|_| features(TextureUsages::all())), None);

        // Downlevel GL can not render into 32 bit float textures.
        let downlevel = |format: TextureFormat| match format {
            TextureFormat::R32Float | TextureFormat::Rg32Float | TextureFormat::Rgba32Float => {
                features(DEVICE_USAGES.difference(TextureUsages::RENDER_ATTACHMENT))
            }
            _ => features(DEVICE_USAGES),
        };
        assert_eq!(
            missing_format_usages(downlevel),
            Some((TextureFormat::R32Float, TextureUsages::RENDER_ATTACHMENT))
        );

        let no_copies = |_: TextureFormat| features(TextureUsages::TEXTURE_BINDING | TextureUsages::RENDER_ATTACHMENT);
        assert_eq!(
            missing_format_usages(no_copies),
            Some((
                TextureFormat::R8Unorm,
                TextureUsages::COPY_SRC | TextureUsages::COPY_DST
            ))
        );
    }
}
