//! End-to-end exercises for both render stages. Each test acquires its own
//! headless context and skips (with a note on stderr) when the machine has
//! no usable GPU adapter, so the suite stays green on headless CI runners.

use std::sync::Arc;

use hdrstack::{
    rgba16f_to_f32, CompositorOptions, ExposureLinearizer, ExposureStackCompositor, FrameWindow,
    GpuContext, GpuTexture, LinearizerOptions, StageError, LINEAR_OUTPUT_FORMAT,
};

const WIDTH: u32 = 8;
const HEIGHT: u32 = 8;

fn test_context() -> Option<GpuContext> {
    match GpuContext::new() {
        Ok(ctx) => Some(ctx),
        Err(err) => {
            eprintln!("skipping GPU test: {err}");
            None
        }
    }
}

fn solid_frame(ctx: &GpuContext, rgba: [u8; 4]) -> GpuTexture {
    sized_frame(ctx, WIDTH, HEIGHT, rgba)
}

fn sized_frame(ctx: &GpuContext, width: u32, height: u32, rgba: [u8; 4]) -> GpuTexture {
    let pixels: Vec<u8> = rgba
        .iter()
        .copied()
        .cycle()
        .take((width * height * 4) as usize)
        .collect();
    GpuTexture::upload_rgba8(ctx, width, height, &pixels, "test frame").expect("upload frame")
}

fn rgba8_pixel(bytes: &[u8], width: u32, x: u32, y: u32) -> [u8; 4] {
    let index = ((y * width + x) * 4) as usize;
    [
        bytes[index],
        bytes[index + 1],
        bytes[index + 2],
        bytes[index + 3],
    ]
}

fn rgba16f_pixel(components: &[f32], width: u32, x: u32, y: u32) -> [f32; 4] {
    let index = ((y * width + x) * 4) as usize;
    [
        components[index],
        components[index + 1],
        components[index + 2],
        components[index + 3],
    ]
}

#[test]
fn linearize_matches_gamma_reference() {
    let Some(ctx) = test_context() else { return };
    let mut linearizer = ExposureLinearizer::new(LinearizerOptions::default()).expect("stage");

    // Solid gray 128/255 at exposure 2.0, per channel: (g^2.2) / 2.0.
    let source = solid_frame(&ctx, [128, 128, 128, 64]);
    let output = linearizer.linearize(&ctx, &source, 2.0).expect("linearize");

    assert_eq!(output.width(), WIDTH);
    assert_eq!(output.height(), HEIGHT);
    assert_eq!(output.format(), LINEAR_OUTPUT_FORMAT);

    let components = rgba16f_to_f32(&output.read_back(&ctx).expect("readback"));
    let expected = (128.0_f32 / 255.0).powf(2.2) / 2.0;
    let [r, g, b, a] = rgba16f_pixel(&components, WIDTH, WIDTH / 2, HEIGHT / 2);
    for (channel, value) in [("r", r), ("g", g), ("b", b)] {
        assert!(
            (value - expected).abs() < 2e-3,
            "{channel} = {value}, expected {expected}"
        );
    }
    assert_eq!(a, 1.0, "alpha must be forced opaque");

    source.release();
    output.release();
}

#[test]
fn linearize_output_stays_finite_across_exposure_range() {
    let Some(ctx) = test_context() else { return };
    let mut linearizer = ExposureLinearizer::new(LinearizerOptions::default()).expect("stage");
    let source = solid_frame(&ctx, [255, 3, 0, 255]);

    for exposure in [0.01_f32, 1.0, 100.0] {
        let output = linearizer
            .linearize(&ctx, &source, exposure)
            .expect("linearize");
        let components = rgba16f_to_f32(&output.read_back(&ctx).expect("readback"));
        for value in components {
            assert!(value.is_finite(), "exposure {exposure} produced {value}");
            assert!(value >= 0.0, "exposure {exposure} produced {value}");
        }
        output.release();
    }
}

#[test]
fn linearize_rejects_invalid_exposure() {
    let Some(ctx) = test_context() else { return };
    let mut linearizer = ExposureLinearizer::new(LinearizerOptions::default()).expect("stage");
    let source = solid_frame(&ctx, [10, 20, 30, 255]);

    for exposure in [0.0, -1.0, f32::NAN, f32::INFINITY] {
        match linearizer.linearize(&ctx, &source, exposure) {
            Err(StageError::InvalidInput(_)) => {}
            other => panic!("exposure {exposure} produced {other:?}"),
        }
    }
}

#[test]
fn compose_partial_window_fills_remaining_bands_with_sentinel() {
    let Some(ctx) = test_context() else { return };
    let mut compositor = ExposureStackCompositor::new(CompositorOptions::default()).expect("stage");

    let red = Arc::new(solid_frame(&ctx, [255, 0, 0, 255]));
    let stacked = compositor
        .compose(&ctx, std::slice::from_ref(&red))
        .expect("compose");
    assert_eq!(stacked.width(), WIDTH);
    assert_eq!(stacked.height(), HEIGHT * 3);

    let bytes = stacked.read_back(&ctx).expect("readback");
    let x = WIDTH / 2;
    assert_eq!(
        rgba8_pixel(&bytes, WIDTH, x, HEIGHT / 2),
        [255, 0, 0, 255],
        "band 0 must sample the only frame"
    );
    for band in 1..3 {
        assert_eq!(
            rgba8_pixel(&bytes, WIDTH, x, band * HEIGHT + HEIGHT / 2),
            [0, 0, 0, 255],
            "band {band} must be sentinel"
        );
    }
}

#[test]
fn compose_full_window_stacks_frames_oldest_first() {
    let Some(ctx) = test_context() else { return };
    let mut compositor = ExposureStackCompositor::new(CompositorOptions::default()).expect("stage");
    let mut window = FrameWindow::new(3).expect("window");

    // Push A, compose; then push B, C, D with evict-after-read. The final
    // compose must see exactly {B, C, D}.
    let colors = [
        [255, 0, 0, 255],   // A
        [0, 255, 0, 255],   // B
        [0, 0, 255, 255],   // C
        [255, 255, 255, 255], // D
    ];
    let mut stacked = None;
    for color in colors {
        window.push(Arc::new(solid_frame(&ctx, color)));
        let snapshot = window.snapshot();
        stacked = Some(compositor.compose(&ctx, &snapshot).expect("compose"));
        window.evict_oldest_if_full();
    }

    let stacked = stacked.expect("at least one compose ran");
    let bytes = stacked.read_back(&ctx).expect("readback");
    let x = WIDTH / 2;
    let expected_bands = [colors[1], colors[2], colors[3]];
    for (band, expected) in expected_bands.iter().enumerate() {
        assert_eq!(
            &rgba8_pixel(&bytes, WIDTH, x, band as u32 * HEIGHT + HEIGHT / 2),
            expected,
            "band {band} holds the wrong frame"
        );
    }
}

#[test]
fn compose_same_snapshot_twice_is_pixel_identical() {
    let Some(ctx) = test_context() else { return };
    let mut compositor = ExposureStackCompositor::new(CompositorOptions::default()).expect("stage");

    let frames = vec![
        Arc::new(solid_frame(&ctx, [10, 60, 200, 255])),
        Arc::new(solid_frame(&ctx, [200, 60, 10, 255])),
    ];
    let first = compositor.compose(&ctx, &frames).expect("first compose");
    let second = compositor.compose(&ctx, &frames).expect("second compose");

    assert_eq!(
        first.read_back(&ctx).expect("readback"),
        second.read_back(&ctx).expect("readback"),
        "identical snapshots must produce identical output"
    );
}

#[test]
fn compose_empty_window_fails() {
    let Some(ctx) = test_context() else { return };
    let mut compositor = ExposureStackCompositor::new(CompositorOptions::default()).expect("stage");
    match compositor.compose(&ctx, &[]) {
        Err(StageError::InsufficientInput) => {}
        other => panic!("expected InsufficientInput, got {other:?}"),
    }
}

#[test]
fn compose_rejects_more_frames_than_the_window() {
    let Some(ctx) = test_context() else { return };
    let mut compositor = ExposureStackCompositor::new(CompositorOptions::default()).expect("stage");

    let frames: Vec<_> = (0..4)
        .map(|_| Arc::new(solid_frame(&ctx, [30, 30, 30, 255])))
        .collect();
    match compositor.compose(&ctx, &frames) {
        Err(StageError::InvalidInput(_)) => {}
        other => panic!("expected InvalidInput for 4 frames in a window of 3, got {other:?}"),
    }
}

#[test]
fn compose_rejects_mismatched_dimensions_and_formats() {
    let Some(ctx) = test_context() else { return };
    let mut compositor = ExposureStackCompositor::new(CompositorOptions::default()).expect("stage");
    let base = Arc::new(solid_frame(&ctx, [9, 9, 9, 255]));

    let wide = Arc::new(sized_frame(&ctx, WIDTH * 2, HEIGHT, [9, 9, 9, 255]));
    match compositor.compose(&ctx, &[Arc::clone(&base), wide]) {
        Err(StageError::InvalidInput(_)) => {}
        other => panic!("expected InvalidInput for mismatched dimensions, got {other:?}"),
    }

    let mut linearizer = ExposureLinearizer::new(LinearizerOptions::default()).expect("stage");
    let linear = Arc::new(linearizer.linearize(&ctx, &base, 1.0).expect("linearize"));
    match compositor.compose(&ctx, &[base, linear]) {
        Err(StageError::InvalidInput(_)) => {}
        other => panic!("expected InvalidInput for mismatched formats, got {other:?}"),
    }
}

#[test]
fn compose_detects_released_frame() {
    let Some(ctx) = test_context() else { return };
    let mut compositor = ExposureStackCompositor::new(CompositorOptions::default()).expect("stage");

    let frame = Arc::new(solid_frame(&ctx, [5, 5, 5, 255]));
    frame.release();
    match compositor.compose(&ctx, std::slice::from_ref(&frame)) {
        Err(StageError::ResourceLifetime(_)) => {}
        other => panic!("expected ResourceLifetime, got {other:?}"),
    }
}

#[test]
fn linearized_frames_flow_through_the_full_pipeline() {
    let Some(ctx) = test_context() else { return };
    let mut linearizer = ExposureLinearizer::new(LinearizerOptions::default()).expect("stage");
    let mut compositor = ExposureStackCompositor::new(CompositorOptions::default()).expect("stage");
    let mut window = FrameWindow::new(3).expect("window");

    for (gray, exposure) in [(64_u8, 0.5_f32), (128, 1.0), (255, 2.0)] {
        let source = solid_frame(&ctx, [gray, gray, gray, 255]);
        let linear = linearizer
            .linearize(&ctx, &source, exposure)
            .expect("linearize");
        source.release();
        window.push(Arc::new(linear));
    }

    let snapshot = window.snapshot();
    let stacked = compositor.compose(&ctx, &snapshot).expect("compose");
    window.evict_oldest_if_full();

    assert_eq!(stacked.format(), LINEAR_OUTPUT_FORMAT);
    assert_eq!(stacked.height(), HEIGHT * 3);

    let components = rgba16f_to_f32(&stacked.read_back(&ctx).expect("readback"));
    let x = WIDTH / 2;
    for (band, (gray, exposure)) in [(64_u8, 0.5_f32), (128, 1.0), (255, 2.0)]
        .iter()
        .enumerate()
    {
        let expected = (f32::from(*gray) / 255.0).powf(2.2) / exposure;
        let [r, _, _, a] =
            rgba16f_pixel(&components, WIDTH, x, band as u32 * HEIGHT + HEIGHT / 2);
        assert!(
            (r - expected).abs() < expected.max(0.01) * 0.02,
            "band {band}: r = {r}, expected {expected}"
        );
        assert_eq!(a, 1.0);
    }
}
