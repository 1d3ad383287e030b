//! 遮挡谱计算：球形核 + 三维卷积 + 归一化为 8 位 alpha 通道

pub mod convolution;
pub mod engine;
pub mod kernel;

use clap::ValueEnum;
use serde::Serialize;

pub use convolution::{BoundaryCondition, ConvolutionMethod};
pub use engine::{
    DEGENERATE_ALPHA, DEGENERATE_TOLERANCE, EngineState, OcclusionEngine, OcclusionStats,
    derive_radius,
};
pub use kernel::Kernel;

/// 球形核的权重类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MapType {
    /// 球内权重恒为 1
    #[default]
    Linear,
    /// 球内权重为 exp(-d²)
    Exponential,
}
