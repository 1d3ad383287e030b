//! 由灰度体计算遮挡谱并生成 alpha 通道，与 RGB 体合成为 RGBA 体。
//!
//! 核心流程：根据体数据维度推导球形核半径，构建球形核，
//! 与输入体做三维卷积（默认频域），再把结果线性拉伸到 8 位 alpha。
//! 文件读写支持 MetaImage、NRRD 与旧版 VTK。

pub mod cli;
pub mod compose;
pub mod error;
pub mod formats;
pub mod occlusion;
pub mod utils;
pub mod volume;

pub use compose::{compose_rgba, rgb_to_gray};
pub use error::{OcclusionError, VolumeIoError};
pub use occlusion::{
    BoundaryCondition, ConvolutionMethod, DEGENERATE_ALPHA, MapType, OcclusionEngine,
    OcclusionStats,
};
pub use utils::format::Encoding;
pub use utils::format_registry::FormatRegistry;
pub use volume::{GrayVolume, OcclusionMap, RgbVolume, RgbaVolume, Volume};
