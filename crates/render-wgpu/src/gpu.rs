use std::mem::size_of;

use tilegrid_common::{
    BufferAllocator, BufferHandle, BufferKind, QUAD_INDICES, RenderError, TextureHandle, Vertex,
    unit_quad, write_end,
};
use tilegrid_render::{
    DrawCommand, FramePlan, RenderConfig, SPRITE_PUSH_SIZE, SpriteMode, SpritePush,
    TRANSFORMS_SIZE, check_tile_extent,
};
use wgpu::util::DeviceExt;

use crate::shaders;

const QUAD_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x3];

const SPRITE_INSTANCE_ATTRIBUTES: [wgpu::VertexAttribute; 4] = wgpu::vertex_attr_array![
    2 => Float32x2,
    3 => Uint32x2,
    4 => Float32x2,
    5 => Float32x2,
];

/// How sprite draws are issued on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpritePath {
    PushConstants,
    Instanced,
}

/// Pick the sprite path for a device.
///
/// `Auto` falls back to instancing when push constants are missing;
/// an explicit `PushConstants` request on such a device is a config error.
pub fn resolve_sprite_path(
    mode: SpriteMode,
    features: wgpu::Features,
    limits: &wgpu::Limits,
) -> Result<SpritePath, RenderError> {
    let push_supported = features.contains(wgpu::Features::PUSH_CONSTANTS)
        && limits.max_push_constant_size as usize >= SPRITE_PUSH_SIZE;
    match mode {
        SpriteMode::Auto if push_supported => Ok(SpritePath::PushConstants),
        SpriteMode::Auto => {
            tracing::warn!("push constants unavailable, sprites will be instanced");
            Ok(SpritePath::Instanced)
        }
        SpriteMode::PushConstants if push_supported => Ok(SpritePath::PushConstants),
        SpriteMode::PushConstants => Err(RenderError::InvalidConfig(
            "sprite_mode = push_constants but the device has no push constant support".into(),
        )),
        SpriteMode::Instanced => Ok(SpritePath::Instanced),
    }
}

/// A run of consecutive sprite draws that share a sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteBatch {
    pub sheet: TextureHandle,
    /// Index of the first sprite in the frame's sprite list.
    pub first: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Tilemap {
        tiles: BufferHandle,
        sheet: TextureHandle,
        instances: u32,
    },
    Sprites(SpriteBatch),
}

/// Flatten a plan into pipeline steps, merging adjacent sprites on the same
/// sheet. Draw order is preserved.
fn plan_steps(plan: &FramePlan) -> (Vec<Step>, Vec<SpritePush>) {
    let mut steps = Vec::new();
    let mut sprites: Vec<SpritePush> = Vec::new();
    for command in &plan.commands {
        match command {
            DrawCommand::Tilemap {
                tiles,
                sheet,
                instances,
            } => steps.push(Step::Tilemap {
                tiles: *tiles,
                sheet: *sheet,
                instances: *instances,
            }),
            DrawCommand::Sprite { sheet, push } => {
                let index = sprites.len() as u32;
                sprites.push(*push);
                match steps.last_mut() {
                    Some(Step::Sprites(batch)) if batch.sheet == *sheet => batch.count += 1,
                    _ => steps.push(Step::Sprites(SpriteBatch {
                        sheet: *sheet,
                        first: index,
                        count: 1,
                    })),
                }
            }
        }
    }
    (steps, sprites)
}

/// Round up to wgpu's copy alignment.
fn align_to_copy(size: u64) -> u64 {
    let align = wgpu::COPY_BUFFER_ALIGNMENT;
    size.div_ceil(align) * align
}

fn buffer_usage(kind: BufferKind) -> wgpu::BufferUsages {
    match kind {
        BufferKind::Uniform => wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        BufferKind::Storage => wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        BufferKind::Instance => wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    }
}

/// Per-frame statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub draw_calls: u32,
    pub tile_instances: u64,
    pub sprites: u32,
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    kind: BufferKind,
    size: u64,
    data_len: u64,
}

struct SheetTexture {
    view: wgpu::TextureView,
}

fn layout_entry(
    binding: u32,
    visibility: wgpu::ShaderStages,
    ty: wgpu::BindingType,
) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty,
        count: None,
    }
}

fn sheet_layout_entries() -> [wgpu::BindGroupLayoutEntry; 3] {
    [
        layout_entry(
            0,
            wgpu::ShaderStages::VERTEX,
            wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: wgpu::BufferSize::new(TRANSFORMS_SIZE),
            },
        ),
        layout_entry(
            3,
            wgpu::ShaderStages::FRAGMENT,
            wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
        ),
        layout_entry(
            4,
            wgpu::ShaderStages::FRAGMENT,
            wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        ),
    ]
}

/// wgpu-based tilemap and sprite renderer.
///
/// Owns the device and queue, every buffer it hands out through
/// `BufferAllocator`, and the sheet textures created with
/// `create_sheet_texture`.
pub struct WgpuTileRenderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: RenderConfig,
    sprite_path: SpritePath,
    tilemap_pipeline: wgpu::RenderPipeline,
    sprite_pipeline: wgpu::RenderPipeline,
    tilemap_layout: wgpu::BindGroupLayout,
    sprite_layout: wgpu::BindGroupLayout,
    quad_vertex_buffer: wgpu::Buffer,
    quad_index_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    buffers: Vec<Option<GpuBuffer>>,
    textures: Vec<Option<SheetTexture>>,
    sprite_instances: Option<GpuBuffer>,
    target_format: wgpu::TextureFormat,
}

impl WgpuTileRenderer {
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target_format: wgpu::TextureFormat,
        config: RenderConfig,
    ) -> Result<Self, RenderError> {
        let sprite_path =
            resolve_sprite_path(config.sprite_mode, device.features(), &device.limits())?;
        tracing::info!(?sprite_path, ?target_format, "creating tile renderer");

        let [transforms_entry, texture_entry, sampler_entry] = sheet_layout_entries();
        let tilemap_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("tilemap_bind_group_layout"),
            entries: &[
                transforms_entry,
                layout_entry(
                    1,
                    wgpu::ShaderStages::VERTEX,
                    wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                ),
                texture_entry,
                sampler_entry,
            ],
        });
        let sprite_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite_bind_group_layout"),
            entries: &sheet_layout_entries(),
        });

        let tilemap_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("tilemap_pipeline_layout"),
                bind_group_layouts: &[&tilemap_layout],
                push_constant_ranges: &[],
            });
        let push_ranges: &[wgpu::PushConstantRange] = match sprite_path {
            SpritePath::PushConstants => &[wgpu::PushConstantRange {
                stages: wgpu::ShaderStages::VERTEX,
                range: 0..SPRITE_PUSH_SIZE as u32,
            }],
            SpritePath::Instanced => &[],
        };
        let sprite_pipeline_layout =
            device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("sprite_pipeline_layout"),
                bind_group_layouts: &[&sprite_layout],
                push_constant_ranges: push_ranges,
            });

        let quad_layout = wgpu::VertexBufferLayout {
            array_stride: size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &QUAD_ATTRIBUTES,
        };
        let instance_layout = wgpu::VertexBufferLayout {
            array_stride: SPRITE_PUSH_SIZE as u64,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &SPRITE_INSTANCE_ATTRIBUTES,
        };

        let tilemap_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("tilemap_shader"),
            source: wgpu::ShaderSource::Wgsl(shaders::tilemap_shader().into()),
        });
        let tilemap_pipeline = create_pipeline(
            &device,
            "tilemap_pipeline",
            &tilemap_pipeline_layout,
            &tilemap_shader,
            shaders::TILEMAP_VS_ENTRY,
            &[quad_layout.clone()],
            target_format,
            config.alpha_blend,
        );

        let (sprite_source, sprite_buffers) = match sprite_path {
            SpritePath::PushConstants => (shaders::sprite_push_shader(), vec![quad_layout]),
            SpritePath::Instanced => (
                shaders::sprite_instanced_shader(),
                vec![quad_layout, instance_layout],
            ),
        };
        let sprite_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sprite_shader"),
            source: wgpu::ShaderSource::Wgsl(sprite_source.into()),
        });
        let sprite_pipeline = create_pipeline(
            &device,
            "sprite_pipeline",
            &sprite_pipeline_layout,
            &sprite_shader,
            shaders::SPRITE_VS_ENTRY,
            &sprite_buffers,
            target_format,
            config.alpha_blend,
        );

        let quad = unit_quad();
        let quad_vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_vertex_buffer"),
            contents: bytemuck::cast_slice(&quad),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let quad_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("quad_index_buffer"),
            contents: bytemuck::cast_slice(&QUAD_INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("sheet_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Nearest,
            min_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        Ok(Self {
            device,
            queue,
            config,
            sprite_path,
            tilemap_pipeline,
            sprite_pipeline,
            tilemap_layout,
            sprite_layout,
            quad_vertex_buffer,
            quad_index_buffer,
            sampler,
            buffers: Vec::new(),
            textures: Vec::new(),
            sprite_instances: None,
            target_format,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn sprite_path(&self) -> SpritePath {
        self.sprite_path
    }

    pub fn target_format(&self) -> wgpu::TextureFormat {
        self.target_format
    }

    /// Upload an RGBA8 tile sheet and return its handle.
    pub fn create_sheet_texture(
        &mut self,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> Result<TextureHandle, RenderError> {
        let expected = width as usize * height as usize * 4;
        if width == 0 || height == 0 || rgba.len() != expected {
            return Err(RenderError::InvalidConfig(format!(
                "sheet {width}x{height} needs {expected} RGBA bytes, got {}",
                rgba.len()
            )));
        }
        let max = self.device.limits().max_texture_dimension_2d;
        if width > max || height > max {
            return Err(RenderError::ResourceExhausted(format!(
                "sheet {width}x{height} exceeds the {max} texel limit"
            )));
        }

        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("sheet_texture"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ResourceExhausted(format!("sheet texture: {err}")));
        }
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            size,
        );

        let sheet = SheetTexture {
            view: texture.create_view(&Default::default()),
        };
        let index = insert_slot(&mut self.textures, sheet);
        tracing::debug!(width, height, index, "sheet texture created");
        Ok(TextureHandle(index))
    }

    pub fn release_texture(&mut self, handle: TextureHandle) {
        if let Some(slot) = self.textures.get_mut(handle.0 as usize) {
            *slot = None;
        }
    }

    fn gpu_buffer(&self, handle: BufferHandle, kind: BufferKind) -> Result<&wgpu::Buffer, RenderError> {
        match self.buffers.get(handle.0 as usize).and_then(Option::as_ref) {
            Some(b) if b.kind == kind => Ok(&b.buffer),
            _ => Err(RenderError::UnknownHandle {
                kind: "buffer",
                id: handle.0,
            }),
        }
    }

    fn sheet_view(&self, handle: TextureHandle) -> Result<&wgpu::TextureView, RenderError> {
        self.textures
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .map(|t| &t.view)
            .ok_or(RenderError::UnknownHandle {
                kind: "texture",
                id: handle.0,
            })
    }

    fn validate(&self, plan: &FramePlan, steps: &[Step]) -> Result<(), RenderError> {
        self.gpu_buffer(plan.transforms, BufferKind::Uniform)?;
        for step in steps {
            match step {
                Step::Tilemap {
                    tiles,
                    sheet,
                    instances,
                } => {
                    self.gpu_buffer(*tiles, BufferKind::Storage)?;
                    check_tile_extent(*instances, self.data_len(*tiles).unwrap_or(0))?;
                    self.sheet_view(*sheet)?;
                }
                Step::Sprites(batch) => {
                    self.sheet_view(batch.sheet)?;
                }
            }
        }
        Ok(())
    }

    /// Copy the frame's sprites into the instance buffer, growing it if needed.
    fn write_sprite_instances(&mut self, sprites: &[SpritePush]) -> Result<(), RenderError> {
        let bytes: &[u8] = bytemuck::cast_slice(sprites);
        let needed = bytes.len() as u64;
        let fits = self
            .sprite_instances
            .as_ref()
            .is_some_and(|b| b.size >= needed);
        if !fits {
            let size = needed.next_power_of_two();
            let buffer = self.create_gpu_buffer(BufferKind::Instance, "sprite_instances", size)?;
            self.sprite_instances = Some(buffer);
        }
        if let Some(instances) = &self.sprite_instances {
            self.queue.write_buffer(&instances.buffer, 0, bytes);
        }
        Ok(())
    }

    fn create_gpu_buffer(
        &self,
        kind: BufferKind,
        label: &str,
        size: u64,
    ) -> Result<GpuBuffer, RenderError> {
        let size = align_to_copy(size.max(wgpu::COPY_BUFFER_ALIGNMENT));
        let limits = self.device.limits();
        let binding_limit = match kind {
            BufferKind::Uniform => limits.max_uniform_buffer_binding_size as u64,
            BufferKind::Storage => limits.max_storage_buffer_binding_size as u64,
            BufferKind::Instance => limits.max_buffer_size,
        };
        let limit = binding_limit.min(limits.max_buffer_size);
        if size > limit {
            return Err(RenderError::ResourceExhausted(format!(
                "{label}: {size} bytes exceeds the {limit} byte device limit"
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: buffer_usage(kind),
            mapped_at_creation: false,
        });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ResourceExhausted(format!("{label}: {err}")));
        }
        Ok(GpuBuffer {
            buffer,
            kind,
            size,
            data_len: 0,
        })
    }

    /// Execute a frame plan into `target`.
    ///
    /// Every handle is checked before encoding starts; on error nothing is
    /// submitted.
    pub fn render_to(
        &mut self,
        target: &wgpu::TextureView,
        plan: &FramePlan,
    ) -> Result<FrameStats, RenderError> {
        let _span = tracing::info_span!("wgpu_render", draws = plan.commands.len()).entered();
        let (steps, sprites) = plan_steps(plan);
        self.validate(plan, &steps)?;
        if self.sprite_path == SpritePath::Instanced && !sprites.is_empty() {
            self.write_sprite_instances(&sprites)?;
        }

        let transforms = self.gpu_buffer(plan.transforms, BufferKind::Uniform)?;
        let mut bind_groups = Vec::with_capacity(steps.len());
        for step in &steps {
            let bind_group = match step {
                Step::Tilemap { tiles, sheet, .. } => {
                    self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some("tilemap_bind_group"),
                        layout: &self.tilemap_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: transforms.as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: self
                                    .gpu_buffer(*tiles, BufferKind::Storage)?
                                    .as_entire_binding(),
                            },
                            wgpu::BindGroupEntry {
                                binding: 3,
                                resource: wgpu::BindingResource::TextureView(
                                    self.sheet_view(*sheet)?,
                                ),
                            },
                            wgpu::BindGroupEntry {
                                binding: 4,
                                resource: wgpu::BindingResource::Sampler(&self.sampler),
                            },
                        ],
                    })
                }
                Step::Sprites(batch) => self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("sprite_bind_group"),
                    layout: &self.sprite_layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: transforms.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(
                                self.sheet_view(batch.sheet)?,
                            ),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::Sampler(&self.sampler),
                        },
                    ],
                }),
            };
            bind_groups.push(bind_group);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("tile_render_encoder"),
            });
        let mut stats = FrameStats::default();
        let index_count = QUAD_INDICES.len() as u32;
        {
            let [r, g, b, a] = self.config.clear_color;
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("tile_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });

            pass.set_vertex_buffer(0, self.quad_vertex_buffer.slice(..));
            pass.set_index_buffer(self.quad_index_buffer.slice(..), wgpu::IndexFormat::Uint32);

            for (step, bind_group) in steps.iter().zip(&bind_groups) {
                match step {
                    Step::Tilemap { instances, .. } => {
                        pass.set_pipeline(&self.tilemap_pipeline);
                        pass.set_bind_group(0, bind_group, &[]);
                        pass.draw_indexed(0..index_count, 0, 0..*instances);
                        stats.draw_calls += 1;
                        stats.tile_instances += *instances as u64;
                    }
                    Step::Sprites(batch) => {
                        pass.set_pipeline(&self.sprite_pipeline);
                        pass.set_bind_group(0, bind_group, &[]);
                        let range = batch.first..batch.first + batch.count;
                        match (self.sprite_path, &self.sprite_instances) {
                            (SpritePath::Instanced, Some(instances)) => {
                                pass.set_vertex_buffer(1, instances.buffer.slice(..));
                                pass.draw_indexed(0..index_count, 0, range);
                                stats.draw_calls += 1;
                            }
                            _ => {
                                for sprite in &sprites[range.start as usize..range.end as usize] {
                                    pass.set_push_constants(
                                        wgpu::ShaderStages::VERTEX,
                                        0,
                                        bytemuck::bytes_of(sprite),
                                    );
                                    pass.draw_indexed(0..index_count, 0, 0..1);
                                    stats.draw_calls += 1;
                                }
                            }
                        }
                        stats.sprites += batch.count;
                    }
                }
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        tracing::debug!(
            draw_calls = stats.draw_calls,
            tiles = stats.tile_instances,
            sprites = stats.sprites,
            "frame submitted"
        );
        Ok(stats)
    }
}

impl BufferAllocator for WgpuTileRenderer {
    fn allocate(
        &mut self,
        kind: BufferKind,
        label: &str,
        size: u64,
    ) -> Result<BufferHandle, RenderError> {
        let buffer = self.create_gpu_buffer(kind, label, size)?;
        let index = insert_slot(&mut self.buffers, buffer);
        tracing::debug!(label, size, index, "gpu buffer allocated");
        Ok(BufferHandle(index))
    }

    fn write(
        &mut self,
        handle: BufferHandle,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), RenderError> {
        let buffer = self
            .buffers
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(RenderError::UnknownHandle {
                kind: "buffer",
                id: handle.0,
            })?;
        let end = write_end(offset, bytes.len(), buffer.size)?;
        let align = wgpu::COPY_BUFFER_ALIGNMENT;
        if offset % align != 0 || bytes.len() as u64 % align != 0 {
            return Err(RenderError::InvalidConfig(format!(
                "buffer writes must be {align}-byte aligned (offset {offset}, len {})",
                bytes.len()
            )));
        }
        self.queue.write_buffer(&buffer.buffer, offset, bytes);
        buffer.data_len = buffer.data_len.max(end);
        Ok(())
    }

    fn capacity(&self, handle: BufferHandle) -> Option<u64> {
        self.buffers
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .map(|b| b.size)
    }

    fn data_len(&self, handle: BufferHandle) -> Option<u64> {
        self.buffers
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .map(|b| b.data_len)
    }

    fn set_data_len(&mut self, handle: BufferHandle, len: u64) -> Result<(), RenderError> {
        let buffer = self
            .buffers
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(RenderError::UnknownHandle {
                kind: "buffer",
                id: handle.0,
            })?;
        if len > buffer.size {
            return Err(RenderError::OutOfRange {
                requested: len,
                available: buffer.size,
            });
        }
        buffer.data_len = len;
        Ok(())
    }

    fn release(&mut self, handle: BufferHandle) {
        if let Some(slot) = self.buffers.get_mut(handle.0 as usize) {
            *slot = None;
        }
    }
}

fn insert_slot<T>(slots: &mut Vec<Option<T>>, value: T) -> u32 {
    match slots.iter().position(Option::is_none) {
        Some(free) => {
            slots[free] = Some(value);
            free as u32
        }
        None => {
            slots.push(Some(value));
            slots.len() as u32 - 1
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    module: &wgpu::ShaderModule,
    vs_entry: &str,
    buffers: &[wgpu::VertexBufferLayout<'_>],
    format: wgpu::TextureFormat,
    alpha_blend: bool,
) -> wgpu::RenderPipeline {
    let blend = if alpha_blend {
        wgpu::BlendState::ALPHA_BLENDING
    } else {
        wgpu::BlendState::REPLACE
    };
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module,
            entry_point: Some(vs_entry),
            compilation_options: Default::default(),
            buffers,
        },
        fragment: Some(wgpu::FragmentState {
            module,
            entry_point: Some(shaders::FS_ENTRY),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            // the camera flips y, so winding is not a reliable facing test
            cull_mode: None,
            ..Default::default()
        },
        depth_stencil: None,
        multisample: Default::default(),
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{UVec2, Vec2};

    fn sprite(x: f32) -> SpritePush {
        SpritePush::new(Vec2::new(x, 0.0), UVec2::ZERO, Vec2::ONE, Vec2::ONE)
    }

    #[test]
    fn adjacent_sprites_on_one_sheet_are_batched() {
        let plan = FramePlan {
            transforms: BufferHandle(0),
            commands: vec![
                DrawCommand::Sprite {
                    sheet: TextureHandle(0),
                    push: sprite(0.0),
                },
                DrawCommand::Sprite {
                    sheet: TextureHandle(0),
                    push: sprite(1.0),
                },
                DrawCommand::Tilemap {
                    tiles: BufferHandle(1),
                    sheet: TextureHandle(0),
                    instances: 4,
                },
                DrawCommand::Sprite {
                    sheet: TextureHandle(0),
                    push: sprite(2.0),
                },
                DrawCommand::Sprite {
                    sheet: TextureHandle(1),
                    push: sprite(3.0),
                },
            ],
        };
        let (steps, sprites) = plan_steps(&plan);
        assert_eq!(sprites.len(), 4);
        assert_eq!(sprites[3].world_pos, [3.0, 0.0]);
        assert_eq!(
            steps,
            vec![
                Step::Sprites(SpriteBatch {
                    sheet: TextureHandle(0),
                    first: 0,
                    count: 2
                }),
                Step::Tilemap {
                    tiles: BufferHandle(1),
                    sheet: TextureHandle(0),
                    instances: 4
                },
                Step::Sprites(SpriteBatch {
                    sheet: TextureHandle(0),
                    first: 2,
                    count: 1
                }),
                Step::Sprites(SpriteBatch {
                    sheet: TextureHandle(1),
                    first: 3,
                    count: 1
                }),
            ]
        );
    }

    #[test]
    fn sprite_path_resolution() {
        let push_limits = wgpu::Limits {
            max_push_constant_size: 128,
            ..wgpu::Limits::default()
        };
        let with_push = wgpu::Features::PUSH_CONSTANTS;
        let none = wgpu::Features::empty();

        assert_eq!(
            resolve_sprite_path(SpriteMode::Auto, with_push, &push_limits),
            Ok(SpritePath::PushConstants)
        );
        assert_eq!(
            resolve_sprite_path(SpriteMode::Auto, none, &wgpu::Limits::default()),
            Ok(SpritePath::Instanced)
        );
        assert_eq!(
            resolve_sprite_path(SpriteMode::Instanced, with_push, &push_limits),
            Ok(SpritePath::Instanced)
        );
        assert!(matches!(
            resolve_sprite_path(SpriteMode::PushConstants, none, &wgpu::Limits::default()),
            Err(RenderError::InvalidConfig(_))
        ));
        // feature present but the limit is too small for the record
        assert_eq!(
            resolve_sprite_path(SpriteMode::Auto, with_push, &wgpu::Limits::default()),
            Ok(SpritePath::Instanced)
        );
    }

    #[test]
    fn copy_alignment_and_usages() {
        assert_eq!(align_to_copy(0), 0);
        assert_eq!(align_to_copy(1), 4);
        assert_eq!(align_to_copy(24), 24);
        assert_eq!(align_to_copy(25), 28);
        assert!(buffer_usage(BufferKind::Storage).contains(wgpu::BufferUsages::STORAGE));
        assert!(buffer_usage(BufferKind::Uniform).contains(wgpu::BufferUsages::COPY_DST));
        assert!(buffer_usage(BufferKind::Instance).contains(wgpu::BufferUsages::VERTEX));
    }

    #[test]
    fn slots_are_reused() {
        let mut slots: Vec<Option<u8>> = vec![Some(1), None, Some(3)];
        assert_eq!(insert_slot(&mut slots, 2), 1);
        assert_eq!(insert_slot(&mut slots, 4), 3);
    }

    #[test]
    fn instance_attributes_match_push_layout() {
        let offsets: Vec<u64> = SPRITE_INSTANCE_ATTRIBUTES.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 8, 16, 24]);
        assert_eq!(QUAD_ATTRIBUTES[1].offset, 8);
    }
}
