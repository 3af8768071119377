pub mod context;
pub mod texture;
pub(crate) mod uniforms;

/// Fullscreen-triangle vertex stage shared by both passes.
///
/// `uv` follows framebuffer orientation: (0, 0) at the top-left of the
/// destination, matching the row addressing of the stacked output.
pub(crate) const FULLSCREEN_VERTEX_WGSL: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -3.0),
        vec2<f32>(3.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let pos = positions[index];
    var out: VertexOutput;
    out.position = vec4<f32>(pos, 0.0, 1.0);
    out.uv = vec2<f32>(pos.x, -pos.y) * 0.5 + vec2<f32>(0.5, 0.5);
    return out;
}
"#;
