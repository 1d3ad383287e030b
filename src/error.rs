use std::io;

use thiserror::Error;

/// 遮挡计算与体数据构造过程中的错误
#[derive(Debug, Error)]
pub enum OcclusionError {
    #[error("无效的体数据维度 {shape:?}：每个维度都必须至少为 1")]
    InvalidVolume { shape: [usize; 3] },

    #[error("数据量不匹配: shape {shape:?} 需要 {expected} 个元素，但提供了 {actual} 个")]
    DataLength {
        shape: [usize; 3],
        expected: usize,
        actual: usize,
    },

    #[error("体数据尺寸不一致: 期望 {expected:?}，实际 {actual:?}")]
    DimensionMismatch {
        expected: [usize; 3],
        actual: [usize; 3],
    },

    #[error("卷积失败: {0}")]
    Convolution(String),
}

/// 体数据文件读写错误
#[derive(Debug, Error)]
pub enum VolumeIoError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("不支持的文件格式: {0}")]
    UnsupportedFormat(String),

    #[error("文件头解析失败: {0}")]
    Header(String),

    #[error("不支持的像素类型: {0}")]
    UnsupportedPixel(String),

    #[error("通道数不匹配: 期望 {expected}，实际 {actual}")]
    ComponentMismatch { expected: usize, actual: usize },

    #[error("数据被截断: 期望 {expected} 字节，实际 {actual} 字节")]
    Truncated { expected: usize, actual: usize },

    #[error(transparent)]
    Volume(#[from] OcclusionError),
}

impl VolumeIoError {
    pub(crate) fn header(msg: impl Into<String>) -> Self {
        VolumeIoError::Header(msg.into())
    }
}
