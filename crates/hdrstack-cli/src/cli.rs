use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "hdrstack",
    author,
    version,
    about = "Linearize LDR exposures and stack them into HDR fusion input",
    arg_required_else_help = true
)]
pub struct Args {
    /// Input frames as `IMAGE:EXPOSURE` pairs in capture order
    /// (e.g. `dark.png:0.25 mid.png:1.0 bright.png:4.0`).
    #[arg(value_name = "IMAGE:EXPOSURE", required = true)]
    pub frames: Vec<String>,

    /// Number of frames stacked into one output texture.
    #[arg(long, value_name = "N")]
    pub window: Option<usize>,

    /// Gamma exponent used to linearize the input signal.
    #[arg(long, value_name = "GAMMA")]
    pub gamma: Option<f32>,

    /// Optional TOML settings file; command-line flags take precedence.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory that receives the stacked composites.
    #[arg(long, value_name = "DIR", default_value = "out")]
    pub output: PathBuf,

    /// Also write each linearized frame next to the composites.
    #[arg(long)]
    pub emit_linear: bool,

    /// Logging filter, e.g. `info` or `hdrstack=debug`.
    #[arg(long, value_name = "FILTER", env = "HDRSTACK_LOG", default_value = "info")]
    pub log: String,
}

pub fn parse() -> Args {
    Args::parse()
}

/// One input frame with its capture exposure value.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameArg {
    pub path: PathBuf,
    pub exposure: f32,
}

/// Splits an `IMAGE:EXPOSURE` argument on its last colon, so paths that
/// contain colons still parse.
pub fn parse_frame_arg(raw: &str) -> Result<FrameArg, String> {
    let (path, exposure) = raw
        .rsplit_once(':')
        .ok_or_else(|| format!("`{raw}` is missing an `:EXPOSURE` suffix"))?;
    if path.is_empty() {
        return Err(format!("`{raw}` has an empty image path"));
    }
    let exposure: f32 = exposure
        .parse()
        .map_err(|_| format!("`{exposure}` is not a valid exposure value"))?;
    if !exposure.is_finite() || exposure <= 0.0 {
        return Err(format!("exposure must be positive, got {exposure}"));
    }
    Ok(FrameArg {
        path: PathBuf::from(path),
        exposure,
    })
}
