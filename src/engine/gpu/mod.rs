//! wgpu renderer for [`FrameSnapshot`]s.
//!
//! The renderer keeps GPU copies of what snapshots reference (vertex
//! buffers per mesh entity, albedo textures per path, one environment
//! cube) and drops whatever the latest snapshot no longer names. It draws
//! either into a caller's texture view (the window surface) or into an
//! off-screen target that is read back as an image.

mod environment;
mod pipelines;
mod shaders;
mod uniforms;

use crate::engine::frame::{DrawItem, FrameSnapshot, Shading};
use crate::engine::tessellate::MeshData;
use crate::engine::Entity;
use environment::GpuEnvironment;
use image::RgbaImage;
use pipelines::{Layouts, ScenePipelines, DEPTH_FORMAT};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uniforms::{FrameUniform, ObjectUniform, ShadowPassUniform};
use wgpu::util::DeviceExt;

/// Color format of off-screen captures.
pub const CAPTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no compatible GPU adapter found")]
    NoAdapter,
    #[error("failed to open GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),
    #[error("capture size {width}x{height} exceeds the device limit of {limit}")]
    TooLarge { width: u32, height: u32, limit: u32 },
    #[error("failed to read back frame: {0}")]
    Readback(String),
}

/// Device and queue shared by the scene renderer and the UI painter.
#[derive(Clone)]
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Opens a device with no surface, for off-screen rendering.
    pub fn headless() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or(GpuError::NoAdapter)?;
        Self::from_adapter(&adapter)
    }

    pub fn from_adapter(adapter: &wgpu::Adapter) -> Result<Self, GpuError> {
        let info = adapter.get_info();
        log::info!("GPU adapter: {} ({:?})", info.name, info.backend);
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("shapeview_device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))?;
        device.on_uncaptured_error(Box::new(|err| log::error!("GPU error: {}", err)));
        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

impl GpuMesh {
    fn new(device: &wgpu::Device, layout: &wgpu::BindGroupLayout, data: &MeshData) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_vertices"),
            contents: bytemuck::cast_slice(&uniforms::vertices(data)),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("mesh_indices"),
            contents: bytemuck::cast_slice(&data.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mesh_uniform"),
            size: std::mem::size_of::<ObjectUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mesh_bind_group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
            uniform_buffer,
            bind_group,
        }
    }

    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

struct AlbedoTexture {
    bind_group: wgpu::BindGroup,
}

impl AlbedoTexture {
    fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        sampler: &wgpu::Sampler,
        image: &RgbaImage,
        label: &str,
    ) -> Self {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: image.width(),
                    height: image.height(),
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            image.as_raw(),
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
        });
        Self { bind_group }
    }
}

/// Depth attachment sized to the render target.
struct DepthTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthTarget {
    fn new(device: &wgpu::Device, label: &str, width: u32, height: u32, sampled: bool) -> Self {
        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;
        if sampled {
            usage |= wgpu::TextureUsages::TEXTURE_BINDING;
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    fn matches(&self, width: u32, height: u32) -> bool {
        self.texture.width() == width && self.texture.height() == height
    }
}

pub struct Renderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    layouts: Layouts,
    pipelines: HashMap<wgpu::TextureFormat, ScenePipelines>,
    shadow_pipeline: wgpu::RenderPipeline,
    frame_buffer: wgpu::Buffer,
    shadow_pass_buffer: wgpu::Buffer,
    shadow_pass_bind_group: wgpu::BindGroup,
    shadow_sampler: wgpu::Sampler,
    linear_sampler: wgpu::Sampler,
    shadow_map: DepthTarget,
    depth: DepthTarget,
    empty_environment: GpuEnvironment,
    environment: Option<(PathBuf, GpuEnvironment)>,
    white: AlbedoTexture,
    textures: HashMap<PathBuf, Option<AlbedoTexture>>,
    meshes: HashMap<Entity, GpuMesh>,
}

impl Renderer {
    pub fn new(context: &GpuContext) -> Self {
        let device = context.device.clone();
        let queue = context.queue.clone();
        let layouts = pipelines::create_layouts(&device);
        let shadow_pipeline = pipelines::create_shadow_pipeline(&device, &layouts);

        let frame_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("frame_uniform"),
            size: std::mem::size_of::<FrameUniform>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let shadow_pass_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("shadow_pass_uniform"),
            contents: bytemuck::bytes_of(&ShadowPassUniform::default()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let shadow_pass_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("shadow_pass_bind_group"),
            layout: &layouts.shadow_pass,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: shadow_pass_buffer.as_entire_binding(),
            }],
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("shadow_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });
        let linear_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("linear_sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::Repeat,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let shadow_map = DepthTarget::new(&device, "shadow_map", 1, 1, true);
        let depth = DepthTarget::new(&device, "scene_depth", 1, 1, false);
        let empty_environment = GpuEnvironment::empty(&device, &queue);
        let white = AlbedoTexture::new(
            &device,
            &queue,
            &layouts.albedo,
            &linear_sampler,
            &RgbaImage::from_pixel(1, 1, image::Rgba([255; 4])),
            "white_texture",
        );
        log::info!("Renderer created");

        Self {
            device,
            queue,
            layouts,
            pipelines: HashMap::new(),
            shadow_pipeline,
            frame_buffer,
            shadow_pass_buffer,
            shadow_pass_bind_group,
            shadow_sampler,
            linear_sampler,
            shadow_map,
            depth,
            empty_environment,
            environment: None,
            white,
            textures: HashMap::new(),
            meshes: HashMap::new(),
        }
    }

    /// Mesh entities with GPU buffers.
    pub fn resident_meshes(&self) -> usize {
        self.meshes.len()
    }

    /// Draws `frame` into `target`, which must be `frame.width` by
    /// `frame.height` texels of `format`.
    pub fn render(
        &mut self,
        frame: &FrameSnapshot<'_>,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) {
        let commands = self.encode(frame, target, format);
        self.queue.submit(Some(commands));
    }

    /// Draws `frame` off-screen and reads the pixels back.
    pub fn render_to_image(&mut self, frame: &FrameSnapshot<'_>) -> Result<RgbaImage, GpuError> {
        let (width, height) = (frame.width, frame.height);
        let limit = self.device.limits().max_texture_dimension_2d;
        if width > limit || height > limit {
            return Err(GpuError::TooLarge {
                width,
                height,
                limit,
            });
        }
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let target = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("capture_target"),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: CAPTURE_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());
        let draw = self.encode(frame, &view, CAPTURE_FORMAT);

        let bytes_per_row = padded_bytes_per_row(width);
        let readback = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("capture_readback"),
            size: bytes_per_row as u64 * height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("capture_copy"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            size,
        );
        self.queue.submit([draw, encoder.finish()]);

        let slice = readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|err| GpuError::Readback(err.to_string()))?
            .map_err(|err| GpuError::Readback(err.to_string()))?;

        let row = width as usize * 4;
        let mut pixels = Vec::with_capacity(row * height as usize);
        {
            let mapped = slice.get_mapped_range();
            for chunk in mapped.chunks(bytes_per_row as usize) {
                pixels.extend_from_slice(&chunk[..row]);
            }
        }
        readback.unmap();
        RgbaImage::from_raw(width, height, pixels)
            .ok_or_else(|| GpuError::Readback("readback buffer too short".to_string()))
    }

    fn encode(
        &mut self,
        frame: &FrameSnapshot<'_>,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
    ) -> wgpu::CommandBuffer {
        self.prepare(frame, format);

        let environment = match &self.environment {
            Some((_, environment)) => environment,
            None => &self.empty_environment,
        };
        let uniform = FrameUniform::new(
            frame,
            if self.environment.is_some() {
                environment.mip_count
            } else {
                0
            },
        );
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&uniform));
        if let Some(shadow) = &frame.shadow {
            let pass = ShadowPassUniform {
                light_view_proj: shadow.view_projection.to_cols_array_2d(),
            };
            self.queue
                .write_buffer(&self.shadow_pass_buffer, 0, bytemuck::bytes_of(&pass));
        }
        for item in &frame.items {
            if let Some(mesh) = self.meshes.get(&item.entity) {
                self.queue.write_buffer(
                    &mesh.uniform_buffer,
                    0,
                    bytemuck::bytes_of(&ObjectUniform::new(item)),
                );
            }
        }

        let frame_bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("frame_bind_group"),
            layout: &self.layouts.frame,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: self.frame_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&self.shadow_map.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&self.shadow_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&environment.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&self.linear_sampler),
                },
            ],
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("scene_encoder"),
            });

        if let Some(shadow) = &frame.shadow {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("shadow_pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.shadow_map.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.shadow_pipeline);
            pass.set_bind_group(0, &self.shadow_pass_bind_group, &[]);
            for item in frame
                .items
                .iter()
                .filter(|item| shadow.casters.contains(&item.entity))
            {
                if let Some(mesh) = self.meshes.get(&item.entity) {
                    pass.set_bind_group(1, &mesh.bind_group, &[]);
                    mesh.draw(&mut pass);
                }
            }
        }

        {
            let [r, g, b, a] = frame.clear_color.map(f64::from);
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("scene_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color { r, g, b, a }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            let pipelines = &self.pipelines[&format];
            pass.set_bind_group(0, &frame_bind_group, &[]);
            if frame.skybox && self.environment.is_some() {
                pass.set_pipeline(&pipelines.skybox);
                pass.draw(0..3, 0..1);
            }
            for item in frame.draw_order() {
                let Some(mesh) = self.meshes.get(&item.entity) else {
                    continue;
                };
                pass.set_pipeline(if item.blend {
                    &pipelines.blended
                } else {
                    &pipelines.opaque
                });
                pass.set_bind_group(1, &mesh.bind_group, &[]);
                pass.set_bind_group(2, &self.albedo(item).bind_group, &[]);
                mesh.draw(&mut pass);
            }
        }

        encoder.finish()
    }

    fn albedo(&self, item: &DrawItem<'_>) -> &AlbedoTexture {
        match &item.shading {
            Shading::Lit {
                texture: Some(path),
                ..
            } => self
                .textures
                .get(*path)
                .and_then(Option::as_ref)
                .unwrap_or(&self.white),
            _ => &self.white,
        }
    }

    /// Brings cached GPU resources in line with `frame`.
    fn prepare(&mut self, frame: &FrameSnapshot<'_>, format: wgpu::TextureFormat) {
        let live: HashSet<Entity> = frame.items.iter().map(|item| item.entity).collect();
        self.meshes.retain(|entity, _| live.contains(entity));
        for item in &frame.items {
            if self.meshes.contains_key(&item.entity) {
                continue;
            }
            let data = item.geometry.tessellate();
            if data.is_empty() {
                continue;
            }
            let mesh = GpuMesh::new(&self.device, &self.layouts.item, &data);
            self.meshes.insert(item.entity, mesh);
        }

        let paths: HashSet<&Path> = frame
            .items
            .iter()
            .filter_map(|item| match &item.shading {
                Shading::Lit { texture, .. } => *texture,
                Shading::Grid(_) => None,
            })
            .collect();
        self.textures.retain(|path, _| paths.contains(path.as_path()));
        for path in paths {
            if !self.textures.contains_key(path) {
                let texture = self.load_texture(path);
                self.textures.insert(path.to_path_buf(), texture);
            }
        }

        self.sync_environment(frame.environment);

        let shadow_size = frame
            .shadow
            .as_ref()
            .map_or(1, |shadow| shadow.map_size.max(1));
        if !self.shadow_map.matches(shadow_size, shadow_size) {
            self.shadow_map = DepthTarget::new(&self.device, "shadow_map", shadow_size, shadow_size, true);
        }
        if !self.depth.matches(frame.width, frame.height) {
            self.depth = DepthTarget::new(&self.device, "scene_depth", frame.width, frame.height, false);
        }
        if !self.pipelines.contains_key(&format) {
            let pipelines = pipelines::create_scene_pipelines(&self.device, &self.layouts, format);
            self.pipelines.insert(format, pipelines);
        }
    }

    /// Missing or undecodable textures map to `None` and draw white.
    fn load_texture(&self, path: &Path) -> Option<AlbedoTexture> {
        match image::open(path) {
            Ok(image) => {
                log::debug!("Uploaded texture {}", path.display());
                Some(AlbedoTexture::new(
                    &self.device,
                    &self.queue,
                    &self.layouts.albedo,
                    &self.linear_sampler,
                    &image.to_rgba8(),
                    "albedo_texture",
                ))
            }
            Err(err) => {
                log::warn!("Texture {} not loaded: {}", path.display(), err);
                None
            }
        }
    }

    fn sync_environment(&mut self, path: Option<&Path>) {
        let Some(path) = path else {
            self.environment = None;
            return;
        };
        if self
            .environment
            .as_ref()
            .is_some_and(|(current, _)| current == path)
        {
            return;
        }
        let cube = environment::load_cube(path);
        let uploaded = GpuEnvironment::upload(&self.device, &self.queue, &cube, "environment_cube");
        self.environment = Some((path.to_path_buf(), uploaded));
    }
}

fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readback_rows_are_aligned() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(1920), 7680);
        assert_eq!(padded_bytes_per_row(1921) % 256, 0);
    }
}
