use bytemuck::{Pod, Zeroable};

/// Per-call parameters for the linearization pass. Field order and padding
/// must match the `LinearizeParams` uniform block in the WGSL source.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct LinearizeUniforms {
    pub exposure: f32,
    pub gamma: f32,
    pub _pad: [f32; 2],
}

/// Per-call parameters for the stacking pass. `band_height` is the
/// normalized height of one source band (1 / W); `available` is the number
/// of frames actually bound this call, so the shader can route the
/// remaining bands to the sentinel color instead of sampling.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct StackUniforms {
    pub band_height: f32,
    pub available: f32,
    pub _pad: [f32; 2],
    pub sentinel: [f32; 4],
}
