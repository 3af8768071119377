use std::borrow::Cow;

use crate::error::StageError;
use crate::gpu::context::GpuContext;
use crate::gpu::texture::{GpuTexture, LINEAR_OUTPUT_FORMAT};
use crate::gpu::uniforms::LinearizeUniforms;
use crate::gpu::FULLSCREEN_VERTEX_WGSL;
use crate::types::LinearizerOptions;

/// Gamma-expands the source signal and divides by the capture exposure so
/// every frame lands on a common radiance scale. Alpha is forced opaque.
const LINEARIZE_FRAGMENT_WGSL: &str = r#"
struct LinearizeParams {
    exposure: f32,
    gamma: f32,
    _pad: vec2<f32>,
}

@group(0) @binding(0) var<uniform> params: LinearizeParams;
@group(0) @binding(1) var frame_texture: texture_2d<f32>;
@group(0) @binding(2) var frame_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = textureSample(frame_texture, frame_sampler, in.uv);
    let radiance = pow(max(color.rgb, vec3<f32>(0.0)), vec3<f32>(params.gamma)) / params.exposure;
    return vec4<f32>(radiance, 1.0);
}
"#;

pub(crate) fn linearize_shader_source() -> String {
    format!("{FULLSCREEN_VERTEX_WGSL}\n{LINEARIZE_FRAGMENT_WGSL}")
}

struct LinearizePipeline {
    pipeline: wgpu::RenderPipeline,
    bind_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
}

/// Single-texture pass that converts one gamma-encoded LDR frame into
/// linear light at [`LINEAR_OUTPUT_FORMAT`] precision.
///
/// The render pipeline is compiled on the first [`linearize`] call and
/// reused afterwards; dropping the stage releases it. A failed invocation
/// leaves the compiled pipeline intact for subsequent calls.
///
/// [`linearize`]: ExposureLinearizer::linearize
pub struct ExposureLinearizer {
    options: LinearizerOptions,
    pipeline: Option<LinearizePipeline>,
}

impl ExposureLinearizer {
    pub fn new(options: LinearizerOptions) -> Result<Self, StageError> {
        options.validate()?;
        Ok(Self {
            options,
            pipeline: None,
        })
    }

    pub fn options(&self) -> &LinearizerOptions {
        &self.options
    }

    /// Renders `source` into a freshly allocated linear-light texture of
    /// the same dimensions. The caller owns the returned texture and is
    /// responsible for releasing both it and `source`.
    pub fn linearize(
        &mut self,
        ctx: &GpuContext,
        source: &GpuTexture,
        exposure: f32,
    ) -> Result<GpuTexture, StageError> {
        if !exposure.is_finite() || exposure <= 0.0 {
            return Err(StageError::InvalidInput(format!(
                "exposure value must be a positive finite number, got {exposure}"
            )));
        }
        if source.is_released() {
            return Err(StageError::ResourceLifetime(
                "linearize source texture was released".into(),
            ));
        }

        if self.pipeline.is_none() {
            let built = build_pipeline(ctx)?;
            tracing::debug!("compiled linearize pipeline");
            self.pipeline = Some(built);
        }
        let pipeline = self
            .pipeline
            .as_ref()
            .expect("linearize pipeline built immediately above");

        let destination = GpuTexture::render_target(
            ctx,
            source.width(),
            source.height(),
            LINEAR_OUTPUT_FORMAT,
            "linearized frame",
        )?;

        let uniforms = LinearizeUniforms {
            exposure,
            gamma: self.options.gamma,
            _pad: [0.0; 2],
        };
        ctx.queue()
            .write_buffer(&pipeline.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));

        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("linearize bind group"),
            layout: &pipeline.bind_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: pipeline.uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(source.view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&pipeline.sampler),
                },
            ],
        });

        let mut encoder = ctx
            .device()
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("linearize encoder"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("linearize pass"),
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
            pass.set_bind_group(0, &bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        ctx.queue().submit(std::iter::once(encoder.finish()));
        ctx.wait()?;

        Ok(destination)
    }
}

fn build_pipeline(ctx: &GpuContext) -> Result<LinearizePipeline, StageError> {
    let device = ctx.device();
    device.push_error_scope(wgpu::ErrorFilter::Validation);

    let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("linearize shader"),
        source: wgpu::ShaderSource::Wgsl(Cow::Owned(linearize_shader_source())),
    });

    let bind_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("linearize bind layout"),
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
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("linearize pipeline layout"),
        bind_group_layouts: &[&bind_layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("linearize pipeline"),
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
                format: LINEAR_OUTPUT_FORMAT,
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
        label: Some("linearize uniforms"),
        size: std::mem::size_of::<LinearizeUniforms>() as u64,
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

    Ok(LinearizePipeline {
        pipeline,
        bind_layout,
        uniform_buffer,
        sampler,
    })
}
