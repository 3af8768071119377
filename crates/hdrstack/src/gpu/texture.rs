use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::error::StageError;

use super::context::GpuContext;

/// Pixel format produced by the linearization stage. Half-float keeps the
/// gamma-expanded signal free of clipping and banding.
pub const LINEAR_OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Reference-counted frame handle as stored in the frame window. The
/// window holds references, not copies; true ownership stays with the
/// component that allocated the texture.
pub type FrameHandle = Arc<GpuTexture>;

/// A GPU-resident 2D color texture together with its default sampling view.
///
/// The texture is exclusively owned by whichever stage created it until
/// [`GpuTexture::release`] is called. Releasing a texture that is still
/// referenced by a frame window is detected at bind time and surfaces as
/// [`StageError::ResourceLifetime`].
#[derive(Debug)]
pub struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
    released: AtomicBool,
}

impl GpuTexture {
    /// Uploads tightly packed RGBA8 pixels as a sampleable source texture.
    pub fn upload_rgba8(
        ctx: &GpuContext,
        width: u32,
        height: u32,
        pixels: &[u8],
        label: &str,
    ) -> Result<Self, StageError> {
        check_dimensions(ctx, width, height)?;
        let expected = (width as usize) * (height as usize) * 4;
        if pixels.len() != expected {
            return Err(StageError::InvalidInput(format!(
                "pixel payload is {} bytes, expected {expected} for {width}x{height} RGBA8",
                pixels.len()
            )));
        }

        let texture = ctx.device().create_texture_with_data(
            ctx.queue(),
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            TextureDataOrder::LayerMajor,
            pixels,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            width,
            height,
            format: wgpu::TextureFormat::Rgba8Unorm,
            released: AtomicBool::new(false),
        })
    }

    /// Allocates a destination texture a render pass can draw into and a
    /// later pass (or readback) can sample or copy from.
    pub(crate) fn render_target(
        ctx: &GpuContext,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Result<Self, StageError> {
        check_dimensions(ctx, width, height)?;
        let texture = ctx.device().create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            width,
            height,
            format,
            released: AtomicBool::new(false),
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub(crate) fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    /// Frees the GPU allocation. Idempotent; later binds of this handle
    /// fail with [`StageError::ResourceLifetime`] instead of reading a
    /// destroyed texture.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.texture.destroy();
        }
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }

    /// Copies the texture back into host memory as tightly packed rows.
    pub fn read_back(&self, ctx: &GpuContext) -> Result<Vec<u8>, StageError> {
        if self.is_released() {
            return Err(StageError::ResourceLifetime(
                "cannot read back a released texture".into(),
            ));
        }
        let bytes_per_pixel = bytes_per_pixel(self.format)?;
        let unpadded_bytes_per_row = self.width * bytes_per_pixel;
        let padded_bytes_per_row =
            unpadded_bytes_per_row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
                * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let buffer = ctx.device().create_buffer(&wgpu::BufferDescriptor {
            label: Some("texture readback"),
            size: u64::from(padded_bytes_per_row) * u64::from(self.height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue().submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (sender, receiver) = crossbeam_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        ctx.wait()?;
        receiver
            .recv()
            .map_err(|_| StageError::GpuUnavailable("readback callback dropped".into()))?
            .map_err(|err| StageError::GpuUnavailable(format!("readback map failed: {err}")))?;

        let mut pixels =
            Vec::with_capacity((unpadded_bytes_per_row as usize) * (self.height as usize));
        {
            let data = slice.get_mapped_range();
            for row in 0..self.height as usize {
                let start = row * padded_bytes_per_row as usize;
                pixels.extend_from_slice(&data[start..start + unpadded_bytes_per_row as usize]);
            }
        }
        buffer.unmap();
        Ok(pixels)
    }
}

fn check_dimensions(ctx: &GpuContext, width: u32, height: u32) -> Result<(), StageError> {
    if width == 0 || height == 0 {
        return Err(StageError::InvalidInput(format!(
            "texture dimensions must be non-zero, got {width}x{height}"
        )));
    }
    let max = ctx.max_texture_dimension();
    if width > max || height > max {
        return Err(StageError::InvalidInput(format!(
            "texture {width}x{height} exceeds the adapter limit of {max}"
        )));
    }
    Ok(())
}

fn bytes_per_pixel(format: wgpu::TextureFormat) -> Result<u32, StageError> {
    match format {
        wgpu::TextureFormat::Rgba8Unorm
        | wgpu::TextureFormat::Rgba8UnormSrgb
        | wgpu::TextureFormat::Bgra8Unorm => Ok(4),
        wgpu::TextureFormat::Rgba16Float => Ok(8),
        other => Err(StageError::InvalidInput(format!(
            "unsupported readback format {other:?}"
        ))),
    }
}

/// Decodes tightly packed RGBA16F bytes into f32 components.
pub fn rgba16f_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| half::f16::from_le_bytes([pair[0], pair[1]]).to_f32())
        .collect()
}
