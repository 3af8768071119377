use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use hdrstack::{
    rgba16f_to_f32, CompositorOptions, ExposureLinearizer, ExposureStackCompositor, FrameHandle,
    FrameWindow, GpuContext, GpuTexture, LinearizerOptions, LINEAR_OUTPUT_FORMAT,
};

use crate::cli::{parse_frame_arg, Args, FrameArg};
use crate::config::Settings;

pub fn run(args: Args) -> Result<()> {
    init_logging(&args.log);

    let mut settings = match args.config {
        Some(ref path) => Settings::load(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(window) = args.window {
        settings.window = window;
    }
    if let Some(gamma) = args.gamma {
        settings.gamma = gamma;
    }

    let frames: Vec<FrameArg> = args
        .frames
        .iter()
        .map(|raw| parse_frame_arg(raw).map_err(|message| anyhow::anyhow!(message)))
        .collect::<Result<_>>()?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create output directory {}", args.output.display()))?;

    let ctx = GpuContext::new().context("failed to acquire a GPU context")?;
    let mut linearizer = ExposureLinearizer::new(LinearizerOptions {
        gamma: settings.gamma,
    })?;
    let mut compositor = ExposureStackCompositor::new(CompositorOptions {
        window_size: settings.window,
        sentinel: settings.sentinel,
    })?;
    let mut window: FrameWindow<FrameHandle> = FrameWindow::new(settings.window)?;

    for (index, frame) in frames.iter().enumerate() {
        let image = image::open(&frame.path)
            .with_context(|| format!("failed to open {}", frame.path.display()))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        let source = GpuTexture::upload_rgba8(&ctx, width, height, image.as_raw(), "ldr frame")?;

        let linear = linearizer.linearize(&ctx, &source, frame.exposure)?;
        source.release();
        tracing::info!(frame = index, exposure = frame.exposure, "linearized frame");

        if args.emit_linear {
            write_frame(&ctx, &linear, &args.output, &format!("linear_{index:03}"))?;
        }

        window.push(Arc::new(linear));
        let snapshot = window.snapshot();
        tracing::info!(
            buffered = snapshot.len(),
            window = settings.window,
            "composing stacked frame"
        );
        let stacked = compositor.compose(&ctx, &snapshot)?;
        window.evict_oldest_if_full();

        let path = write_frame(&ctx, &stacked, &args.output, &format!("stack_{index:03}"))?;
        stacked.release();
        tracing::info!(path = %path.display(), "wrote stacked composite");
    }

    Ok(())
}

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Reads a texture back and writes it to `dir`. Half-float frames become
/// 32-bit float OpenEXR, 8-bit frames become PNG. Returns the chosen path.
fn write_frame(
    ctx: &GpuContext,
    texture: &GpuTexture,
    dir: &Path,
    stem: &str,
) -> Result<PathBuf> {
    let bytes = texture.read_back(ctx)?;
    let path = if texture.format() == LINEAR_OUTPUT_FORMAT {
        let path = dir.join(format!("{stem}.exr"));
        let image =
            image::Rgba32FImage::from_raw(texture.width(), texture.height(), rgba16f_to_f32(&bytes))
                .context("readback returned an unexpected pixel count")?;
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        path
    } else {
        let path = dir.join(format!("{stem}.png"));
        let image = image::RgbaImage::from_raw(texture.width(), texture.height(), bytes)
            .context("readback returned an unexpected pixel count")?;
        image
            .save(&path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        path
    };
    Ok(path)
}
