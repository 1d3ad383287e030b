use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use occlusion_rgba::cli::{self, CommonArgs, OcclusionConfig};

#[derive(Parser)]
#[command(name = "rgb2rgba")]
#[command(
    about = "由 RGB 体的亮度计算遮挡 alpha 通道，输出 RGBA 体",
    long_about = "Input formats supported: MHD/MHA, NRRD/NHDR, VTK"
)]
struct Cli {
    /// 输入 RGB 体文件
    rgb: PathBuf,

    /// 输出 RGBA 体文件
    output: PathBuf,

    #[command(flatten)]
    common: CommonArgs,
}

fn main() -> Result<()> {
    cli::init_tracing();

    let args = Cli::parse();
    let config = OcclusionConfig::from(&args.common);
    cli::run_rgb_to_rgba(&args.rgb, &args.output, &config)?;

    Ok(())
}
