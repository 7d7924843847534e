use std::sync::mpsc;

use tilegrid_common::RenderError;
use tilegrid_render::{SPRITE_PUSH_SIZE, SpriteMode};

/// Colour format of offscreen targets; matches the sheet textures.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Open a device without a surface.
///
/// Push constants are requested when the adapter has them, unless sprites
/// are forced onto the instanced path.
pub fn request_headless_device(mode: SpriteMode) -> Result<(wgpu::Device, wgpu::Queue), RenderError> {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::all(),
        ..Default::default()
    });

    let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
        power_preference: wgpu::PowerPreference::HighPerformance,
        compatible_surface: None,
        force_fallback_adapter: false,
    }))
    .ok_or_else(|| RenderError::ResourceExhausted("no compatible GPU adapter".into()))?;

    let info = adapter.get_info();
    tracing::info!(name = %info.name, backend = ?info.backend, "adapter selected");

    let adapter_limits = adapter.limits();
    let want_push = mode != SpriteMode::Instanced
        && adapter.features().contains(wgpu::Features::PUSH_CONSTANTS)
        && adapter_limits.max_push_constant_size as usize >= SPRITE_PUSH_SIZE;

    let mut required_limits = wgpu::Limits::downlevel_defaults().using_resolution(adapter_limits);
    let required_features = if want_push {
        required_limits.max_push_constant_size = SPRITE_PUSH_SIZE as u32;
        wgpu::Features::PUSH_CONSTANTS
    } else {
        wgpu::Features::empty()
    };

    let (device, queue) = pollster::block_on(adapter.request_device(
        &wgpu::DeviceDescriptor {
            label: Some("tilegrid_device"),
            required_features,
            required_limits,
            memory_hints: Default::default(),
        },
        None,
    ))
    .map_err(|e| RenderError::ResourceExhausted(format!("request device: {e}")))?;

    Ok((device, queue))
}

/// bytes_per_row for texture-to-buffer copies must be a multiple of 256.
fn padded_row_bytes(width: u32) -> u32 {
    let unpadded = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unpadded.div_ceil(align) * align
}

/// A colour texture that frames can be rendered into and read back from.
pub struct OffscreenTarget {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

impl OffscreenTarget {
    pub fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self, RenderError> {
        let max = device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 {
            return Err(RenderError::InvalidConfig(format!(
                "offscreen target must be non-empty, got {width}x{height}"
            )));
        }
        if width > max || height > max {
            return Err(RenderError::ResourceExhausted(format!(
                "offscreen target {width}x{height} exceeds the {max} texel limit"
            )));
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen_target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&Default::default());
        Ok(Self {
            texture,
            view,
            width,
            height,
        })
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Copy the target back to the host as tightly packed RGBA8 rows.
    pub fn read_pixels(
        &self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<Vec<u8>, RenderError> {
        let padded = padded_row_bytes(self.width);
        let readback = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("offscreen_readback"),
            size: padded as u64 * self.height as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("offscreen_readback_encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &readback,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = readback.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| RenderError::ResourceExhausted("readback callback dropped".into()))?
            .map_err(|e| RenderError::ResourceExhausted(format!("map readback: {e}")))?;

        let row = self.width as usize * 4;
        let mut pixels = Vec::with_capacity(row * self.height as usize);
        {
            let mapped = slice.get_mapped_range();
            for chunk in mapped.chunks(padded as usize).take(self.height as usize) {
                pixels.extend_from_slice(&chunk[..row]);
            }
        }
        readback.unmap();
        tracing::debug!(width = self.width, height = self.height, "pixels read back");
        Ok(pixels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rows_pad_to_copy_alignment() {
        assert_eq!(padded_row_bytes(1), 256);
        assert_eq!(padded_row_bytes(64), 256);
        assert_eq!(padded_row_bytes(65), 512);
        assert_eq!(padded_row_bytes(128), 512);
    }
}
