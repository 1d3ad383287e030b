//! 两个命令行工具共用的参数、日志初始化与处理流程

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::compose::{compose_rgba, rgb_to_gray};
use crate::error::OcclusionError;
use crate::occlusion::{
    BoundaryCondition, ConvolutionMethod, MapType, OcclusionEngine, OcclusionStats,
};
use crate::utils::format::Encoding;
use crate::utils::format_registry::FormatRegistry;
use crate::volume::{GrayVolume, RgbVolume};

/// 遮挡计算相关的命令行参数
#[derive(Debug, Clone, Args)]
pub struct CommonArgs {
    /// 球形核权重类型
    #[arg(long, value_enum, default_value_t = MapType::Linear)]
    pub map: MapType,

    /// 体外采样策略
    #[arg(long, value_enum, default_value_t = BoundaryCondition::Replicate)]
    pub boundary: BoundaryCondition,

    /// 卷积实现
    #[arg(long, value_enum, default_value_t = ConvolutionMethod::Fft)]
    pub method: ConvolutionMethod,

    /// 覆盖按体数据维度推导的核半径
    #[arg(long)]
    pub radius: Option<usize>,

    /// 压缩输出数据（MetaImage 用 zlib，NRRD 用 gzip）
    #[arg(long)]
    pub compress: bool,

    /// 把遮挡统计信息写成 JSON
    #[arg(long, value_name = "FILE")]
    pub stats_json: Option<PathBuf>,
}

/// 一次处理的配置
#[derive(Debug, Clone, Default)]
pub struct OcclusionConfig {
    pub map_type: MapType,
    pub boundary: BoundaryCondition,
    pub method: ConvolutionMethod,
    pub radius: Option<usize>,
    pub encoding: Encoding,
    pub stats_json: Option<PathBuf>,
}

impl From<&CommonArgs> for OcclusionConfig {
    fn from(args: &CommonArgs) -> Self {
        Self {
            map_type: args.map,
            boundary: args.boundary,
            method: args.method,
            radius: args.radius,
            encoding: if args.compress {
                Encoding::Compressed
            } else {
                Encoding::Raw
            },
            stats_json: args.stats_json.clone(),
        }
    }
}

/// 初始化日志，输出到 stderr，默认级别 info，可用 RUST_LOG 覆盖
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// 按配置构建引擎并计算 alpha 通道
pub fn compute_alpha(
    gray: &GrayVolume,
    config: &OcclusionConfig,
) -> Result<(GrayVolume, OcclusionStats), OcclusionError> {
    let mut engine = OcclusionEngine::new(gray)?
        .with_boundary(config.boundary)
        .with_method(config.method);
    if let Some(radius) = config.radius {
        engine = engine.with_radius(radius);
    }
    info!(
        "[遮挡] 半径 {}，核类型 {:?}，边界 {:?}，方法 {:?}",
        engine.radius(),
        config.map_type,
        config.boundary,
        config.method
    );
    engine.compute_alpha_channel(config.map_type)
}

/// 灰度体 + RGB 体 -> RGBA 体
pub fn run_create_rgba(
    gray_path: &Path,
    rgb_path: &Path,
    output: &Path,
    config: &OcclusionConfig,
) -> anyhow::Result<OcclusionStats> {
    let registry = FormatRegistry::new();

    info!("[读取] 读取输入体数据...");
    let gray = registry
        .read_gray(gray_path)
        .with_context(|| format!("读取灰度体失败: {}", gray_path.display()))?;
    let rgb = registry
        .read_rgb(rgb_path)
        .with_context(|| format!("读取 RGB 体失败: {}", rgb_path.display()))?;
    gray.ensure_same_shape(&rgb)
        .context("输入体数据尺寸不一致")?;

    process(&registry, &gray, &rgb, output, config)
}

/// RGB 体 -> RGBA 体，灰度体由亮度换算得到
pub fn run_rgb_to_rgba(
    rgb_path: &Path,
    output: &Path,
    config: &OcclusionConfig,
) -> anyhow::Result<OcclusionStats> {
    let registry = FormatRegistry::new();

    info!("[读取] 读取输入体数据...");
    let rgb = registry
        .read_rgb(rgb_path)
        .with_context(|| format!("读取 RGB 体失败: {}", rgb_path.display()))?;
    let gray = rgb_to_gray(&rgb);
    info!("[读取] 已由亮度生成灰度体");

    process(&registry, &gray, &rgb, output, config)
}

fn process(
    registry: &FormatRegistry,
    gray: &GrayVolume,
    rgb: &RgbVolume,
    output: &Path,
    config: &OcclusionConfig,
) -> anyhow::Result<OcclusionStats> {
    let [nx, ny, nz] = rgb.shape();
    info!("体数据尺寸: {nx} x {ny} x {nz}");

    let (alpha, stats) = compute_alpha(gray, config).context("计算 alpha 通道失败")?;

    info!("[合成] 合成 RGBA 体数据...");
    let rgba = compose_rgba(rgb, &alpha).context("合成 RGBA 失败")?;

    info!("[保存] 写入 {}", output.display());
    registry
        .write_rgba(output, &rgba, config.encoding)
        .with_context(|| format!("写入 RGBA 体失败: {}", output.display()))?;

    if let Some(path) = &config.stats_json {
        let json = serde_json::to_string_pretty(&stats)?;
        fs::write(path, json)
            .with_context(|| format!("写入统计信息失败: {}", path.display()))?;
        info!("[保存] 统计信息已写入 {}", path.display());
    }

    info!(elapsed_ms = stats.elapsed_ms, "完成");
    Ok(stats)
}
