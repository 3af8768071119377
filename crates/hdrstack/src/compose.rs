use std::borrow::Cow;

use crate::error::StageError;
use crate::gpu::context::GpuContext;
use crate::gpu::texture::{FrameHandle, GpuTexture};
use crate::gpu::uniforms::StackUniforms;
use crate::gpu::FULLSCREEN_VERTEX_WGSL;
use crate::types::CompositorOptions;

/// Generates the stacking shader for a given window size.
///
/// Each slot gets its own texture binding; the fragment stage maps the
/// output row onto a band index `k = uv.y / band_height` and samples slot
/// `k` over the half-open interval `[k, k + 1)`. Bands at or beyond the
/// available frame count return the sentinel color without sampling, so
/// slots bound to the placeholder texture are never read.
fn stack_shader_source(window_size: usize) -> String {
    let mut source = String::from(FULLSCREEN_VERTEX_WGSL);
    source.push_str(
        r#"
struct StackParams {
    band_height: f32,
    available: f32,
    _pad: vec2<f32>,
    sentinel: vec4<f32>,
}

@group(0) @binding(0) var<uniform> params: StackParams;
@group(0) @binding(1) var frame_sampler: sampler;
"#,
    );
    for slot in 0..window_size {
        source.push_str(&format!(
            "@group(1) @binding({slot}) var frame_{slot}: texture_2d<f32>;\n"
        ));
    }

    source.push_str(
        r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let band = in.uv.y / params.band_height;
    if (band >= params.available) {
        return params.sentinel;
    }
    let local = vec2<f32>(in.uv.x, fract(band));
"#,
    );
    for slot in 0..window_size {
        source.push_str(&format!(
            "    if (band < {threshold}.0) {{\n        return textureSampleLevel(frame_{slot}, frame_sampler, local, 0.0);\n    }}\n",
            threshold = slot + 1
        ));
    }
    source.push_str("    return params.sentinel;\n}\n");
    source
}

struct StackPipeline {
    pipeline: wgpu::RenderPipeline,
    param_layout: wgpu::BindGroupLayout,
    frame_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
    /// Bound to slots that have no buffered frame; never sampled.
    placeholder: GpuTexture,
    format: wgpu::TextureFormat,
}

/// Multi-texture pass that stacks a window snapshot into one tall texture.
///
/// The output is `window_size` vertical bands of the source dimensions,
/// oldest frame in the top band. Output format matches the bound inputs;
/// the pipeline is compiled on first use and rebuilt only if that format
/// changes between calls.
pub struct ExposureStackCompositor {
    options: CompositorOptions,
    pipeline: Option<StackPipeline>,
}

impl ExposureStackCompositor {
    pub fn new(options: CompositorOptions) -> Result<Self, StageError> {
        options.validate()?;
        Ok(Self {
            options,
            pipeline: None,
        })
    }

    pub fn options(&self) -> &CompositorOptions {
        &self.options
    }

    /// Renders up to `window_size` frames, oldest first, into a freshly
    /// allocated texture of `window_size` times the source height. The
    /// caller owns the returned texture.
    pub fn compose(
        &mut self,
        ctx: &GpuContext,
        frames: &[FrameHandle],
    ) -> Result<GpuTexture, StageError> {
        if frames.is_empty() {
            return Err(StageError::InsufficientInput);
        }
        let window_size = self.options.window_size;
        if frames.len() > window_size {
            return Err(StageError::InvalidInput(format!(
                "got {} frames for a window of {window_size}",
                frames.len()
            )));
        }

        let first = &frames[0];
        for (slot, frame) in frames.iter().enumerate() {
            if frame.is_released() {
                return Err(StageError::ResourceLifetime(format!(
                    "frame in slot {slot} was released while still cached"
                )));
            }
            if frame.width() != first.width() || frame.height() != first.height() {
                return Err(StageError::InvalidInput(format!(
                    "frame in slot {slot} is {}x{}, expected {}x{}",
                    frame.width(),
                    frame.height(),
                    first.width(),
                    first.height()
                )));
            }
            if frame.format() != first.format() {
                return Err(StageError::InvalidInput(format!(
                    "frame in slot {slot} has format {:?}, expected {:?}",
                    frame.format(),
                    first.format()
                )));
            }
        }

        let format = first.format();
        let needs_build = !matches!(self.pipeline, Some(ref pipeline) if pipeline.format == format);
        if needs_build {
            if self.pipeline.is_some() {
                tracing::debug!(new = ?format, "input format changed; rebuilding stack pipeline");
            }
            let built = build_pipeline(ctx, window_size, format)?;
            tracing::debug!(window_size, ?format, "compiled stack pipeline");
            self.pipeline = Some(built);
        }
        let pipeline = self
            .pipeline
            .as_ref()
            .expect("stack pipeline built immediately above");

        let destination = GpuTexture::render_target(
            ctx,
            first.width(),
            first.height() * window_size as u32,
            format,
            "stacked frame",
        )?;

        let uniforms = StackUniforms {
            band_height: 1.0 / window_size as f32,
            available: frames.len() as f32,
            _pad: [0.0; 2],
            sentinel: self.options.sentinel,
        };
        ctx.queue()
            .write_buffer(&pipeline.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let param_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stack params"),
            layout: &pipeline.param_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: pipeline.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&pipeline.sampler),
                },
            ],
        });

        let frame_entries: Vec<wgpu::BindGroupEntry> = (0..window_size)
            .map(|slot| wgpu::BindGroupEntry {
                binding: slot as u32,
                resource: wgpu::BindingResource::TextureView(
                    frames
                        .get(slot)
                        .map(|frame| frame.view())
                        .unwrap_or_else(|| pipeline.placeholder.view()),
                ),
            })
            .collect();
        let frame_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("stack frames"),
            layout: &pipeline.frame_layout,
            entries: &frame_entries,
        });

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("stack encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("stack pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: destination.view(),
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            pass.set_pipeline(&pipeline.pipeline);
            pass.set_bind_group(0, &param_group, &[]);
            pass.set_bind_group(1, &frame_group, &[]);
            pass.draw(0..3, 0..1);
        }
        ctx.queue().submit(std::iter::once(encoder.finish()));
        ctx.wait()?;

        Ok(destination)
    }
}

fn build_pipeline(
    ctx: &GpuContext,
    window_size: usize,
    format: wgpu::TextureFormat,
) -> Result<StackPipeline, StageError> {
    let device = ctx.device();
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("stack shader"),
        source: wgpu::ShaderSource::Wgsl(Cow::Owned(stack_shader_source(window_size))),
    });

    let param_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("stack param layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let frame_entries: Vec<wgpu::BindGroupLayoutEntry> = (0..window_size)
        .map(|slot| wgpu::BindGroupLayoutEntry {
            binding: slot as u32,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        })
        .collect();
    let frame_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("stack frame layout"),
        entries: &frame_entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("stack pipeline layout"),
        bind_group_layouts: &[&param_layout, &frame_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("stack pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &module,
            entry_point: Some("vs_main"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: &module,
            entry_point: Some("fs_main"),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multiview: None,
        cache: None,
    });

    if let Some(error) = pollster::block_on(device.pop_error_scope()) {
        return Err(StageError::ShaderInit(error.to_string()));
    }

    let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("stack uniforms"),
        size: std::mem::size_of::<StackUniforms>() as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });
    let placeholder = GpuTexture::upload_rgba8(ctx, 1, 1, &[0, 0, 0, 255], "stack placeholder")?;

    Ok(StackPipeline {
        pipeline,
        param_layout,
        frame_layout,
        uniform_buffer,
        sampler,
        placeholder,
        format,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MAX_WINDOW_SLOTS;

    #[test]
    fn generated_shader_declares_one_binding_per_slot() {
        let source = stack_shader_source(3);
        for slot in 0..3 {
            assert!(source.contains(&format!("var frame_{slot}: texture_2d<f32>")));
        }
        assert!(!source.contains("frame_3:"));
    }

    #[test]
    fn generated_shader_is_valid_wgsl_for_all_window_sizes() {
        for window_size in 1..=MAX_WINDOW_SLOTS {
            let source = stack_shader_source(window_size);
            let module = naga::front::wgsl::parse_str(&source)
                .unwrap_or_else(|err| panic!("window {window_size}: parse failed: {err}"));
            naga::valid::Validator::new(
                naga::valid::ValidationFlags::all(),
                naga::valid::Capabilities::default(),
            )
            .validate(&module)
            .unwrap_or_else(|err| panic!("window {window_size}: validation failed: {err:?}"));
        }
    }

    #[test]
    fn band_thresholds_are_half_open() {
        // Band k covers [k, k + 1): the first branch taken for band == 1.0
        // must be the slot-1 branch, not slot 0.
        let source = stack_shader_source(2);
        let slot0 = source.find("band < 1.0").expect("slot 0 threshold");
        let slot1 = source.find("band < 2.0").expect("slot 1 threshold");
        assert!(slot0 < slot1);
    }
}
