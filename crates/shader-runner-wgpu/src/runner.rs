//! wgpu implementation of [`Backend`]
//!
//! Every operation runs inside a validation error scope, so a test that asks
//! for something the device rejects fails that one operation instead of
//! aborting the run. Results are read back through a mapped staging buffer
//! with rows padded to [`wgpu::COPY_BYTES_PER_ROW_ALIGNMENT`].

use crate::compiler::{SAMPLER_BINDING_BASE, SRV_BINDING_BASE, UAV_BINDING_BASE, UNIFORM_BINDING};
use crate::convert::{buffer_size, compare_function, primitive_topology, sampler_descriptor, texture_extent, texture_format, texture_usage, vertex_format, view_dimension};
use shader_runner::format::FORMATS;
use shader_runner::session::UNIFORM_FILL;
use shader_runner::{
    Backend, BackendError, BindingKind, Cap, Capabilities, ClearValue, CompiledShader, Dimension, FilterMode, FormatCaps, Readback, RenderState, Resource, ResourceDesc, ResourceType,
    ShaderBinding, ShaderCode, ShaderModel, ShaderType, SourceFormat, Topology, Viewport,
};
use std::collections::BTreeMap;
use wgpu::util::DeviceExt;

/// Smallest uniform buffer bound at `b0`
const MIN_UNIFORM_SIZE: usize = 256;

/// Optional device features requested when the adapter has them
fn optional_features() -> wgpu::Features {
    wgpu::Features::SHADER_F64
        | wgpu::Features::SHADER_INT64
        | wgpu::Features::SHADER_F16
        | wgpu::Features::SUBGROUP
        | wgpu::Features::TEXTURE_FORMAT_16BIT_NORM
        | wgpu::Features::ADDRESS_MODE_CLAMP_TO_BORDER
        | wgpu::Features::FLOAT32_FILTERABLE
        | wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES
}

/// Errors raised while opening a device
#[derive(Debug, thiserror::Error)]
pub enum WgpuRunnerError {
    #[error("failed to find a suitable adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("failed to create device: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
}

/// GPU object behind a live resource
#[derive(Debug)]
pub enum WgpuResource {
    Texture(wgpu::Texture),
    Buffer(wgpu::Buffer),
}

/// A resource bound for one draw or dispatch
enum Bound<'a> {
    Buffer(&'a wgpu::Buffer),
    View(wgpu::TextureView),
    Sampler(wgpu::Sampler),
}

/// Runs tests on a wgpu device
pub struct WgpuRunner {
    device: wgpu::Device,
    queue: wgpu::Queue,
    caps: Capabilities,
}

impl WgpuRunner {
    /// Opens the preferred adapter and creates a device with every optional feature it has
    pub async fn new() -> Result<Self, WgpuRunnerError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let features = adapter.features() & optional_features();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Shader Runner Device"),
                required_features: features,
                required_limits: adapter.limits(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: Default::default(),
            })
            .await?;
        device.on_uncaptured_error(Box::new(|error| tracing::error!("Uncaptured wgpu error: {error}")));

        let info = adapter.get_info();
        tracing::info!("Using {} ({:?})", info.name, info.backend);

        let adapter_formats = features.contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES);
        let caps = build_capabilities(info.backend, &info.name, features, |format| {
            if adapter_formats {
                adapter.get_texture_format_features(format)
            } else {
                format.guaranteed_format_features(features)
            }
        });

        Ok(Self { device, queue, caps })
    }

    /// Replaces the advertised capabilities, typically with a profile applied
    pub fn set_capabilities(&mut self, caps: Capabilities) {
        self.caps = caps;
    }

    /// Runs `f` inside a validation error scope
    fn scoped<T>(&self, f: impl FnOnce(&Self) -> T) -> Result<T, wgpu::Error> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(self);
        match pollster::block_on(self.device.pop_error_scope()) {
            Some(error) => Err(error),
            None => Ok(value),
        }
    }

    /// Waits for submitted work to finish
    fn wait(&self) -> bool {
        match self.device.poll(wgpu::PollType::Wait) {
            Ok(_) => true,
            Err(error) => {
                tracing::warn!("Failed to wait for the device: {error}");
                false
            }
        }
    }

    fn create_buffer(&self, desc: &ResourceDesc, data: &[u8]) -> Result<WgpuResource, BackendError> {
        let size = buffer_size(desc).max(data.len() as u64).max(4).next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT);

        let buffer = self
            .scoped(|runner| {
                let buffer = runner.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some(&format!("{} {}", desc.ty, desc.slot)),
                    size,
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                if !data.is_empty() {
                    let mut contents = data.to_vec();
                    contents.resize(data.len().next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize), 0);
                    runner.queue.write_buffer(&buffer, 0, &contents);
                }
                buffer
            })
            .map_err(|e| BackendError::Failed(e.to_string()))?;

        Ok(WgpuResource::Buffer(buffer))
    }

    fn create_texture(&self, desc: &ResourceDesc, data: &[u8]) -> Result<WgpuResource, BackendError> {
        let format = texture_format(desc.format).ok_or_else(|| BackendError::Unsupported(format!("format {} has no texture format", desc.format)))?;
        let required = format.required_features();
        if !self.device.features().contains(required) {
            return Err(BackendError::Unsupported(format!("format {} needs {required:?}", desc.format)));
        }
        if desc.dimension == Dimension::Cube && desc.layer_count % 6 != 0 {
            return Err(BackendError::Failed(format!("cube texture with {} layers", desc.layer_count)));
        }

        let layouts = (0..desc.level_count)
            .map(|level| subresource_layout(desc, level))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| BackendError::Failed(format!("{} {} is too large to upload", desc.ty, desc.slot)))?;

        let (dimension, size) = texture_extent(desc);
        let texture = self
            .scoped(|runner| {
                let texture = runner.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some(&format!("{} {}", desc.ty, desc.slot)),
                    size,
                    mip_level_count: desc.level_count,
                    sample_count: desc.sample_count,
                    dimension,
                    format,
                    usage: texture_usage(desc),
                    view_formats: &[],
                });
                runner.upload_texture(&texture, desc, &layouts, data);
                texture
            })
            .map_err(|e| BackendError::Failed(e.to_string()))?;

        Ok(WgpuResource::Texture(texture))
    }

    /// Uploads initial contents, one subresource after another with levels varying fastest
    ///
    /// A short final subresource is zero-padded; depth and multisampled
    /// textures cannot be written and keep their cleared contents.
    fn upload_texture(&self, texture: &wgpu::Texture, desc: &ResourceDesc, layouts: &[SubresourceLayout], data: &[u8]) {
        if data.is_empty() || desc.format.is_depth() || desc.sample_count > 1 {
            return;
        }

        let mut offset = 0;
        for layer in 0..desc.layer_count {
            for (level, &SubresourceLayout { width, height, depth, row, size }) in (0..).zip(layouts) {
                if offset >= data.len() {
                    return;
                }

                let mut contents = data[offset..offset.saturating_add(size).min(data.len())].to_vec();
                contents.resize(size, 0);
                self.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture,
                        mip_level: level,
                        origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
                        aspect: wgpu::TextureAspect::All,
                    },
                    &contents,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(row),
                        rows_per_image: Some(height),
                    },
                    wgpu::Extent3d {
                        width,
                        height,
                        depth_or_array_layers: depth,
                    },
                );
                offset = offset.saturating_add(size);
            }
        }
    }

    fn shader_module(&self, shader: &CompiledShader) -> Result<wgpu::ShaderModule, String> {
        let source = match &shader.code {
            ShaderCode::Wgsl(text) => wgpu::ShaderSource::Wgsl(text.as_str().into()),
            ShaderCode::SpirV(words) => wgpu::ShaderSource::SpirV(words.as_slice().into()),
            ShaderCode::Bytecode(_) => return Err(format!("{} bytecode cannot be loaded", shader.shader_type)),
        };

        Ok(self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(shader.shader_type.block_name()),
            source,
        }))
    }

    /// Uniform buffer padded with the fill byte
    fn uniform_buffer(&self, uniforms: &[u8]) -> wgpu::Buffer {
        let mut contents = uniforms.to_vec();
        contents.resize(uniforms.len().max(MIN_UNIFORM_SIZE).next_multiple_of(16), UNIFORM_FILL);

        self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Buffer"),
            contents: &contents,
            usage: wgpu::BufferUsages::UNIFORM,
        })
    }

    /// Builds the group 0 layout and bind group for the given shader bindings
    fn bind_group<'a>(
        &self,
        state: &'a RenderState<'_, WgpuResource>,
        bindings: &[ShaderBinding],
        visibility: wgpu::ShaderStages,
        uniforms: &'a wgpu::Buffer,
    ) -> Result<(wgpu::BindGroupLayout, wgpu::BindGroup), String> {
        let mut layout_entries = Vec::with_capacity(bindings.len());
        let mut bound = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let (ty, resource) = self.bind(state, binding, uniforms)?;
            layout_entries.push(wgpu::BindGroupLayoutEntry {
                binding: binding.binding,
                visibility,
                ty,
                count: None,
            });
            bound.push((binding.binding, resource));
        }

        let layout = self.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Test Bind Group Layout"),
            entries: &layout_entries,
        });
        let entries: Vec<wgpu::BindGroupEntry> = bound
            .iter()
            .map(|(binding, resource)| wgpu::BindGroupEntry {
                binding: *binding,
                resource: match resource {
                    Bound::Buffer(buffer) => buffer.as_entire_binding(),
                    Bound::View(view) => wgpu::BindingResource::TextureView(view),
                    Bound::Sampler(sampler) => wgpu::BindingResource::Sampler(sampler),
                },
            })
            .collect();
        let group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Test Bind Group"),
            layout: &layout,
            entries: &entries,
        });

        Ok((layout, group))
    }

    /// Resolves one reflected binding through the register convention
    fn bind<'a>(&self, state: &'a RenderState<'_, WgpuResource>, binding: &ShaderBinding, uniforms: &'a wgpu::Buffer) -> Result<(wgpu::BindingType, Bound<'a>), String> {
        match (binding.binding, binding.kind) {
            (UNIFORM_BINDING, BindingKind::UniformBuffer) => Ok((
                wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                Bound::Buffer(uniforms),
            )),
            (index, kind) if (SRV_BINDING_BASE..UAV_BINDING_BASE).contains(&index) => self.bind_resource(state, ResourceType::Texture, index - SRV_BINDING_BASE, kind),
            (index, kind) if (UAV_BINDING_BASE..SAMPLER_BINDING_BASE).contains(&index) => self.bind_resource(state, ResourceType::Uav, index - UAV_BINDING_BASE, kind),
            (index, BindingKind::Sampler { comparison }) if index >= SAMPLER_BINDING_BASE => {
                let slot = index - SAMPLER_BINDING_BASE;
                let sampler = state.samplers().iter().find(|sampler| sampler.slot == slot).ok_or_else(|| format!("sampler {slot} is not defined"))?;
                let descriptor = sampler_descriptor(sampler).ok_or_else(|| format!("sampler {slot} uses an unsupported address mode"))?;
                let filtering = [sampler.filter.min, sampler.filter.mag, sampler.filter.mip].contains(&FilterMode::Linear);
                let ty = if comparison {
                    wgpu::SamplerBindingType::Comparison
                } else if filtering {
                    wgpu::SamplerBindingType::Filtering
                } else {
                    wgpu::SamplerBindingType::NonFiltering
                };
                Ok((wgpu::BindingType::Sampler(ty), Bound::Sampler(self.device.create_sampler(&descriptor))))
            }
            (index, kind) => Err(format!("binding {index} ({kind:?}) is outside the register ranges")),
        }
    }

    fn bind_resource<'a>(&self, state: &'a RenderState<'_, WgpuResource>, ty: ResourceType, slot: u32, kind: BindingKind) -> Result<(wgpu::BindingType, Bound<'a>), String> {
        let resource = state.registry.get(ty, slot).ok_or_else(|| format!("{ty} {slot} is not defined"))?;
        let view_dimension = view_dimension(&resource.desc);

        match (&resource.handle, kind) {
            (WgpuResource::Buffer(buffer), BindingKind::StorageBuffer { read_only }) => Ok((
                wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                Bound::Buffer(buffer),
            )),
            (WgpuResource::Texture(texture), BindingKind::Texture { multisampled }) => {
                let aspect = resource.desc.format.is_depth().then_some(wgpu::TextureAspect::DepthOnly);
                let sample_type = texture
                    .format()
                    .sample_type(aspect, Some(self.device.features()))
                    .ok_or_else(|| format!("{ty} {slot} cannot be sampled"))?;
                let view = texture.create_view(&wgpu::TextureViewDescriptor {
                    dimension: Some(view_dimension),
                    aspect: aspect.unwrap_or_default(),
                    ..Default::default()
                });
                Ok((
                    wgpu::BindingType::Texture {
                        sample_type,
                        view_dimension,
                        multisampled,
                    },
                    Bound::View(view),
                ))
            }
            (WgpuResource::Texture(texture), BindingKind::StorageTexture) => {
                let access = if self.caps.format_caps(resource.desc.format).contains(FormatCaps::UAV_LOAD) {
                    wgpu::StorageTextureAccess::ReadWrite
                } else {
                    wgpu::StorageTextureAccess::WriteOnly
                };
                let view = texture.create_view(&wgpu::TextureViewDescriptor {
                    dimension: Some(view_dimension),
                    ..Default::default()
                });
                Ok((
                    wgpu::BindingType::StorageTexture {
                        access,
                        format: texture.format(),
                        view_dimension,
                    },
                    Bound::View(view),
                ))
            }
            _ => Err(format!("{ty} {slot} cannot be bound as {kind:?}")),
        }
    }

    fn encode_draw(
        &self,
        state: &RenderState<'_, WgpuResource>,
        vertex: &CompiledShader,
        pixel: &CompiledShader,
        topology: wgpu::PrimitiveTopology,
        vertex_count: u32,
        instance_count: u32,
    ) -> Result<(), String> {
        let viewport = single_viewport(state.viewports)?;
        let vertex_module = self.shader_module(vertex)?;
        let pixel_module = self.shader_module(pixel)?;

        let mut bindings: Vec<ShaderBinding> = vertex.bindings.iter().chain(&pixel.bindings).copied().collect();
        bindings.sort_by_key(|binding| binding.binding);
        bindings.dedup_by_key(|binding| binding.binding);
        let uniforms = self.uniform_buffer(state.uniforms);
        let (bind_group_layout, bind_group) = self.bind_group(state, &bindings, wgpu::ShaderStages::VERTEX_FRAGMENT, &uniforms)?;

        // Render targets in slot order
        let mut render_targets: Vec<&Resource<WgpuResource>> = state.registry.of_type(ResourceType::RenderTarget).collect();
        render_targets.sort_by_key(|resource| resource.desc.slot);
        let targets: Vec<(wgpu::TextureView, wgpu::TextureFormat)> = render_targets
            .iter()
            .filter_map(|resource| match &resource.handle {
                WgpuResource::Texture(texture) => Some((texture.create_view(&wgpu::TextureViewDescriptor::default()), texture.format())),
                WgpuResource::Buffer(_) => None,
            })
            .collect();
        let depth = match state.registry.get(ResourceType::DepthStencil, 0).map(|resource| &resource.handle) {
            Some(WgpuResource::Texture(texture)) => Some((texture.create_view(&wgpu::TextureViewDescriptor::default()), texture.format())),
            _ => None,
        };
        let sample_count = render_targets.first().map_or(1, |resource| resource.desc.sample_count);

        // One vertex buffer layout per input slot, elements packed in declaration order
        let mut slots: BTreeMap<u32, (u64, Vec<wgpu::VertexAttribute>)> = BTreeMap::new();
        for (location, element) in state.input_elements.iter().enumerate() {
            let format = vertex_format(element.format).ok_or_else(|| format!("{} is not a vertex format", element.format))?;
            let (stride, attributes) = slots.entry(element.slot).or_default();
            attributes.push(wgpu::VertexAttribute {
                format,
                offset: *stride,
                shader_location: location as u32,
            });
            *stride += format.size();
        }
        let buffer_layouts: Vec<wgpu::VertexBufferLayout> = slots
            .values()
            .map(|(stride, attributes)| wgpu::VertexBufferLayout {
                array_stride: *stride,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();
        let vertex_buffers = slots
            .keys()
            .map(|&slot| match state.registry.get(ResourceType::VertexBuffer, slot).map(|resource| &resource.handle) {
                Some(WgpuResource::Buffer(buffer)) => Ok(buffer),
                _ => Err(format!("vertex buffer {slot} is not defined")),
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Draw Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let color_targets: Vec<Option<wgpu::ColorTargetState>> = targets
            .iter()
            .map(|(_, format)| {
                Some(wgpu::ColorTargetState {
                    format: *format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })
            })
            .collect();
        let depth_stencil = depth.as_ref().map(|(_, format)| wgpu::DepthStencilState {
            format: *format,
            depth_write_enabled: state.fixed.depth_func.is_some(),
            depth_compare: state.fixed.depth_func.map_or(wgpu::CompareFunction::Always, compare_function),
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        });
        let pipeline = self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Draw Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some(&vertex.entry_point),
                compilation_options: Default::default(),
                buffers: &buffer_layouts,
            },
            primitive: wgpu::PrimitiveState {
                topology,
                ..Default::default()
            },
            depth_stencil,
            multisample: wgpu::MultisampleState {
                count: sample_count,
                mask: state.fixed.sample_mask as u64,
                alpha_to_coverage_enabled: false,
            },
            fragment: Some(wgpu::FragmentState {
                module: &pixel_module,
                entry_point: Some(&pixel.entry_point),
                compilation_options: Default::default(),
                targets: &color_targets,
            }),
            multiview: None,
            cache: None,
        });

        let color_attachments: Vec<Option<wgpu::RenderPassColorAttachment>> = targets
            .iter()
            .map(|(view, _)| {
                Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })
            })
            .collect();
        let depth_stencil_attachment = depth.as_ref().map(|(view, format)| wgpu::RenderPassDepthStencilAttachment {
            view,
            depth_ops: Some(wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            }),
            stencil_ops: format.has_stencil_aspect().then_some(wgpu::Operations {
                load: wgpu::LoadOp::Load,
                store: wgpu::StoreOp::Store,
            }),
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Draw Encoder") });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Draw Pass"),
                color_attachments: &color_attachments,
                depth_stencil_attachment,
                ..Default::default()
            });
            render_pass.set_pipeline(&pipeline);
            render_pass.set_bind_group(0, &bind_group, &[]);
            for (index, buffer) in vertex_buffers.iter().enumerate() {
                render_pass.set_vertex_buffer(index as u32, buffer.slice(..));
            }
            if let Some(viewport) = viewport {
                render_pass.set_viewport(viewport.x, viewport.y, viewport.width, viewport.height, viewport.min_depth, viewport.max_depth);
            }
            render_pass.draw(0..vertex_count, 0..instance_count);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        Ok(())
    }

    fn encode_dispatch(&self, state: &RenderState<'_, WgpuResource>, compute: &CompiledShader, x: u32, y: u32, z: u32) -> Result<(), String> {
        let module = self.shader_module(compute)?;
        let uniforms = self.uniform_buffer(state.uniforms);
        let (bind_group_layout, bind_group) = self.bind_group(state, &compute.bindings, wgpu::ShaderStages::COMPUTE, &uniforms)?;

        let pipeline_layout = self.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Dispatch Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });
        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Dispatch Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(&compute.entry_point),
            compilation_options: Default::default(),
            cache: None,
        });

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Dispatch Encoder") });
        {
            let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Dispatch Pass"),
                timestamp_writes: None,
            });
            compute_pass.set_pipeline(&pipeline);
            compute_pass.set_bind_group(0, &bind_group, &[]);
            compute_pass.dispatch_workgroups(x, y, z);
        }
        self.queue.submit(std::iter::once(encoder.finish()));

        Ok(())
    }

    /// Copies `size` bytes of a source into a mappable staging buffer and reads them back
    fn read_staging(&self, copy: impl FnOnce(&mut wgpu::CommandEncoder, &wgpu::Buffer), size: u64) -> Option<Vec<u8>> {
        let staging = self
            .scoped(|runner| {
                let staging = runner.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Readback Buffer"),
                    size,
                    usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                });
                let mut encoder = runner.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Readback Encoder") });
                copy(&mut encoder, &staging);
                runner.queue.submit(std::iter::once(encoder.finish()));
                staging
            })
            .inspect_err(|error| tracing::debug!("Readback failed: {error}"))
            .ok()?;

        let slice = staging.slice(..);
        let (sender, receiver) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });

        self.device.poll(wgpu::PollType::Wait).ok()?;
        pollster::block_on(receiver.receive())?.ok()?;

        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Some(data)
    }
}

impl Backend for WgpuRunner {
    type Resource = WgpuResource;

    fn capabilities(&self) -> &Capabilities {
        &self.caps
    }

    fn create_resource(&mut self, desc: &ResourceDesc, data: &[u8]) -> Result<WgpuResource, BackendError> {
        if desc.dimension.is_buffer() {
            self.create_buffer(desc, data)
        } else {
            self.create_texture(desc, data)
        }
    }

    fn destroy_resource(&mut self, resource: Resource<WgpuResource>) {
        match resource.handle {
            WgpuResource::Texture(texture) => texture.destroy(),
            WgpuResource::Buffer(buffer) => buffer.destroy(),
        }
    }

    fn clear(&mut self, resource: &Resource<WgpuResource>, value: ClearValue) -> bool {
        let WgpuResource::Texture(texture) = &resource.handle else {
            return false;
        };
        if texture.dimension() == wgpu::TextureDimension::D3 {
            tracing::debug!("Clearing 3D textures is not supported");
            return false;
        }

        let result = self.scoped(|runner| {
            let mut encoder = runner.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Clear Encoder") });
            for layer in 0..texture.depth_or_array_layers() {
                let view = texture.create_view(&wgpu::TextureViewDescriptor {
                    dimension: Some(wgpu::TextureViewDimension::D2),
                    base_array_layer: layer,
                    array_layer_count: Some(1),
                    mip_level_count: Some(1),
                    ..Default::default()
                });
                let _clear_pass = match value {
                    ClearValue::Color([r, g, b, a]) => encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Clear Pass"),
                        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                            view: &view,
                            resolve_target: None,
                            ops: wgpu::Operations {
                                load: wgpu::LoadOp::Clear(wgpu::Color {
                                    r: r as f64,
                                    g: g as f64,
                                    b: b as f64,
                                    a: a as f64,
                                }),
                                store: wgpu::StoreOp::Store,
                            },
                        })],
                        ..Default::default()
                    }),
                    ClearValue::Depth(depth) => encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                        label: Some("Clear Pass"),
                        depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                            view: &view,
                            depth_ops: Some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(depth),
                                store: wgpu::StoreOp::Store,
                            }),
                            stencil_ops: texture.format().has_stencil_aspect().then_some(wgpu::Operations {
                                load: wgpu::LoadOp::Clear(0),
                                store: wgpu::StoreOp::Store,
                            }),
                        }),
                        ..Default::default()
                    }),
                };
            }
            runner.queue.submit(std::iter::once(encoder.finish()));
        });

        match result {
            Ok(()) => self.wait(),
            Err(error) => {
                tracing::debug!("Clear failed: {error}");
                false
            }
        }
    }

    fn draw(&mut self, state: &RenderState<'_, WgpuResource>, topology: Topology, vertex_count: u32, instance_count: u32) -> bool {
        let Some(primitive) = primitive_topology(topology) else {
            tracing::debug!("Topology {topology:?} is not supported");
            return false;
        };
        let (Some(vertex), Some(pixel)) = (state.shader(ShaderType::Vertex), state.shader(ShaderType::Pixel)) else {
            tracing::debug!("Drawing needs a vertex and a pixel shader");
            return false;
        };

        match self.scoped(|runner| runner.encode_draw(state, vertex, pixel, primitive, vertex_count, instance_count)) {
            Ok(Ok(())) => self.wait(),
            Ok(Err(reason)) => {
                tracing::debug!("Draw failed: {reason}");
                false
            }
            Err(error) => {
                tracing::debug!("Draw failed: {error}");
                false
            }
        }
    }

    fn dispatch(&mut self, state: &RenderState<'_, WgpuResource>, x: u32, y: u32, z: u32) -> bool {
        let Some(compute) = state.shader(ShaderType::Compute) else {
            tracing::debug!("Dispatching needs a compute shader");
            return false;
        };

        match self.scoped(|runner| runner.encode_dispatch(state, compute, x, y, z)) {
            Ok(Ok(())) => self.wait(),
            Ok(Err(reason)) => {
                tracing::debug!("Dispatch failed: {reason}");
                false
            }
            Err(error) => {
                tracing::debug!("Dispatch failed: {error}");
                false
            }
        }
    }

    fn copy(&mut self, src: &Resource<WgpuResource>, dst: &Resource<WgpuResource>) -> bool {
        let result = self.scoped(|runner| {
            let mut encoder = runner.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Copy Encoder") });
            match (&src.handle, &dst.handle) {
                (WgpuResource::Buffer(source), WgpuResource::Buffer(destination)) => {
                    encoder.copy_buffer_to_buffer(source, 0, destination, 0, source.size().min(destination.size()));
                }
                (WgpuResource::Texture(source), WgpuResource::Texture(destination)) => {
                    let desc = &src.desc;
                    for level in 0..desc.level_count {
                        encoder.copy_texture_to_texture(
                            wgpu::TexelCopyTextureInfo {
                                texture: source,
                                mip_level: level,
                                origin: wgpu::Origin3d::ZERO,
                                aspect: wgpu::TextureAspect::All,
                            },
                            wgpu::TexelCopyTextureInfo {
                                texture: destination,
                                mip_level: level,
                                origin: wgpu::Origin3d::ZERO,
                                aspect: wgpu::TextureAspect::All,
                            },
                            wgpu::Extent3d {
                                width: desc.level_width(level),
                                height: desc.level_height(level),
                                depth_or_array_layers: if desc.dimension == Dimension::Texture3d { desc.level_depth(level) } else { desc.layer_count },
                            },
                        );
                    }
                }
                _ => return false,
            }
            runner.queue.submit(std::iter::once(encoder.finish()));
            true
        });

        match result {
            Ok(true) => self.wait(),
            Ok(false) => false,
            Err(error) => {
                tracing::debug!("Copy failed: {error}");
                false
            }
        }
    }

    fn readback(&mut self, resource: &Resource<WgpuResource>, subresource: u32) -> Option<Readback> {
        let desc = &resource.desc;
        match &resource.handle {
            WgpuResource::Buffer(buffer) => {
                let data = self.read_staging(|encoder, staging| encoder.copy_buffer_to_buffer(buffer, 0, staging, 0, buffer.size()), buffer.size())?;
                Some(Readback {
                    format: desc.format,
                    width: desc.width,
                    height: 1,
                    depth: 1,
                    row_pitch: data.len(),
                    texel_size: desc.texel_size as usize,
                    data,
                })
            }
            WgpuResource::Texture(texture) => {
                if desc.sample_count > 1 || texture.format() == wgpu::TextureFormat::Depth24PlusStencil8 {
                    tracing::debug!("{} {} cannot be read back", desc.ty, desc.slot);
                    return None;
                }

                let level = subresource % desc.level_count;
                let layer = subresource / desc.level_count;
                let is_3d = desc.dimension == Dimension::Texture3d;
                let SubresourceLayout { width, height, depth, row, .. } = subresource_layout(desc, level)?;

                // Rows must be aligned to 256 bytes for texture-to-buffer copies
                let row_pitch = row.checked_next_multiple_of(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)?;
                let aspect = if desc.format.is_depth() { wgpu::TextureAspect::DepthOnly } else { wgpu::TextureAspect::All };

                let data = self.read_staging(
                    |encoder, staging| {
                        encoder.copy_texture_to_buffer(
                            wgpu::TexelCopyTextureInfo {
                                texture,
                                mip_level: level,
                                origin: wgpu::Origin3d {
                                    x: 0,
                                    y: 0,
                                    z: if is_3d { 0 } else { layer },
                                },
                                aspect,
                            },
                            wgpu::TexelCopyBufferInfo {
                                buffer: staging,
                                layout: wgpu::TexelCopyBufferLayout {
                                    offset: 0,
                                    bytes_per_row: Some(row_pitch),
                                    rows_per_image: Some(height),
                                },
                            },
                            wgpu::Extent3d {
                                width,
                                height,
                                depth_or_array_layers: depth,
                            },
                        );
                    },
                    row_pitch as u64 * height as u64 * depth as u64,
                )?;

                Some(Readback {
                    format: desc.format,
                    width,
                    height,
                    depth,
                    row_pitch: row_pitch as usize,
                    texel_size: desc.texel_size as usize,
                    data,
                })
            }
        }
    }
}

/// The viewport of a draw; a render pass has only one
fn single_viewport(viewports: &[Option<Viewport>]) -> Result<Option<Viewport>, String> {
    if let Some(index) = viewports.iter().skip(1).position(Option::is_some) {
        return Err(format!("viewport {} is set but only one viewport is supported", index + 1));
    }
    Ok(viewports.first().copied().flatten())
}

/// Extent and byte size of one subresource at a mip level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SubresourceLayout {
    width: u32,
    height: u32,
    depth: u32,
    /// Bytes per row
    row: u32,
    size: usize,
}

/// `None` when the subresource does not fit in memory
fn subresource_layout(desc: &ResourceDesc, level: u32) -> Option<SubresourceLayout> {
    let width = desc.level_width(level);
    let height = desc.level_height(level);
    let depth = if desc.dimension == Dimension::Texture3d { desc.level_depth(level) } else { 1 };
    let row = width.checked_mul(desc.texel_size)?;
    let size = u64::from(row).checked_mul(u64::from(height))?.checked_mul(u64::from(depth))?;
    Some(SubresourceLayout {
        width,
        height,
        depth,
        row,
        size: usize::try_from(size).ok()?,
    })
}

/// Tags for an adapter: `wgpu`, the graphics API and known software rasterizers
fn adapter_tags(backend: wgpu::Backend, name: &str) -> Vec<String> {
    let mut tags = vec!["wgpu".to_string()];
    let api = match backend {
        wgpu::Backend::Vulkan => Some("vulkan"),
        wgpu::Backend::Dx12 => Some("d3d12"),
        wgpu::Backend::Metal => Some("msl"),
        wgpu::Backend::Gl => Some("opengl"),
        _ => None,
    };
    tags.extend(api.map(str::to_string));

    let name = name.to_lowercase();
    if name.contains("llvmpipe") {
        tags.push("llvmpipe".to_string());
    }
    if name.contains("microsoft basic render driver") {
        tags.push("warp".to_string());
    }
    tags
}

/// Capabilities of a device with the given features
///
/// # Arguments
///
/// * `backend` - Graphics API of the adapter
/// * `name` - Adapter name, used to detect software rasterizers
/// * `features` - Features enabled on the device
/// * `format_features` - Features of each texture format on the device
fn build_capabilities(backend: wgpu::Backend, name: &str, features: wgpu::Features, format_features: impl Fn(wgpu::TextureFormat) -> wgpu::TextureFormatFeatures) -> Capabilities {
    let mut caps = Capabilities {
        runner: "wgpu".to_string(),
        compiler: "naga".to_string(),
        tags: adapter_tags(backend, name),
        minimum_model: ShaderModel::FIRST_SM6,
        maximum_model: ShaderModel::MAX,
        source_formats: vec![SourceFormat::Hlsl, SourceFormat::Wgsl],
        ..Default::default()
    };

    for (feature, cap) in [
        (wgpu::Features::SHADER_F64, Cap::Float64),
        (wgpu::Features::SHADER_INT64, Cap::Int64),
        (wgpu::Features::SUBGROUP, Cap::WaveOps),
        (wgpu::Features::SHADER_F16, Cap::Native16Bit),
    ] {
        if features.contains(feature) {
            caps.caps.insert(cap);
        }
    }

    for (format, _) in FORMATS {
        let Some(texture_format) = texture_format(*format) else {
            continue;
        };
        let supported = format_features(texture_format);
        if supported.allowed_usages.contains(wgpu::TextureUsages::STORAGE_BINDING) && supported.flags.contains(wgpu::TextureFormatFeatureFlags::STORAGE_READ_WRITE) {
            caps.format_caps.insert(*format, FormatCaps::UAV_LOAD);
        }
    }

    caps
}

#[cfg(test)]
mod tests {
    use super::*;
    use shader_runner::Format;

    #[test]
    fn test_adapter_tags() {
        assert_eq!(adapter_tags(wgpu::Backend::Vulkan, "NVIDIA GeForce RTX 4090"), ["wgpu", "vulkan"]);
        assert_eq!(adapter_tags(wgpu::Backend::Vulkan, "llvmpipe (LLVM 17.0.6, 256 bits)"), ["wgpu", "vulkan", "llvmpipe"]);
        assert_eq!(adapter_tags(wgpu::Backend::Dx12, "Microsoft Basic Render Driver"), ["wgpu", "d3d12", "warp"]);
        assert_eq!(adapter_tags(wgpu::Backend::Metal, "Apple M2"), ["wgpu", "msl"]);
    }

    #[test]
    fn test_capabilities_follow_features() {
        let features = wgpu::Features::SHADER_F64 | wgpu::Features::SUBGROUP;
        let caps = build_capabilities(wgpu::Backend::Vulkan, "test", features, |format| format.guaranteed_format_features(features));

        assert_eq!(caps.runner, "wgpu");
        assert!(caps.has(Cap::Float64));
        assert!(caps.has(Cap::WaveOps));
        assert!(!caps.has(Cap::Int64));
        assert!(!caps.has(Cap::GeometryShader));
        assert!(caps.accepts_source(SourceFormat::Wgsl));
        assert_eq!((caps.minimum_model, caps.maximum_model), (ShaderModel::FIRST_SM6, ShaderModel::MAX));
    }

    #[test]
    fn test_single_viewport() {
        let viewport = Viewport {
            x: 0.0,
            y: 0.0,
            width: 320.0,
            height: 240.0,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        assert_eq!(single_viewport(&[None; 4]), Ok(None));
        assert_eq!(single_viewport(&[Some(viewport), None, None, None]), Ok(Some(viewport)));
        assert!(single_viewport(&[None, Some(viewport), None, None]).is_err());
        assert!(single_viewport(&[Some(viewport), None, None, Some(viewport)]).is_err());
    }

    #[test]
    fn test_subresource_layouts() {
        let mut desc = ResourceDesc::new(ResourceType::Texture, 0);
        (desc.width, desc.height, desc.level_count) = (8, 4, 4);
        assert_eq!(
            subresource_layout(&desc, 1),
            Some(SubresourceLayout {
                width: 4,
                height: 2,
                depth: 1,
                row: 64,
                size: 128,
            })
        );
        assert_eq!(subresource_layout(&desc, 40).map(|layout| layout.size), Some(16));

        desc.dimension = Dimension::Texture3d;
        (desc.width, desc.height, desc.depth) = (65536, 65536, 4);
        let layout = subresource_layout(&desc, 0).unwrap();
        assert_eq!(layout.row, 1 << 20);
        assert_eq!(layout.size as u64, 1 << 38);

        desc.width = u32::MAX;
        assert_eq!(subresource_layout(&desc, 0), None);
    }

    #[test]
    fn test_uav_load_formats() {
        let features = wgpu::Features::empty();
        let caps = build_capabilities(wgpu::Backend::Vulkan, "test", features, |format| format.guaranteed_format_features(features));

        assert!(caps.format_caps(Format::R32Float).contains(FormatCaps::UAV_LOAD));
        assert!(caps.format_caps(Format::R32Uint).contains(FormatCaps::UAV_LOAD));
        assert!(!caps.format_caps(Format::D32Float).contains(FormatCaps::UAV_LOAD));
        assert!(!caps.format_caps(Format::R8G8B8A8Unorm).contains(FormatCaps::UAV_LOAD));
    }
}
