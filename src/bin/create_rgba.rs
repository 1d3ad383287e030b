use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use occlusion_rgba::cli::{self, CommonArgs, OcclusionConfig};

#[derive(Parser)]
#[command(name = "create-rgba")]
#[command(
    about = "由灰度体计算遮挡 alpha 通道，并与 RGB 体合成 RGBA 体",
    long_about = "Input formats supported: MHD/MHA, NRRD/NHDR, VTK"
)]
struct Cli {
    /// 输入灰度体文件
    gray: PathBuf,

    /// 输入 RGB 体文件，尺寸必须与灰度体一致
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
    cli::run_create_rgba(&args.gray, &args.rgb, &args.output, &config)?;

    Ok(())
}
