use std::path::Path;

use crate::error::VolumeIoError;
use crate::volume::Volume;

/// 文件头中的几何与通道信息
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeHeader {
    /// 网格维度 [nx, ny, nz]
    pub shape: [usize; 3],
    pub spacing: [f64; 3],
    pub origin: [f64; 3],
    /// 每个体素的 u8 通道数（1、3 或 4）
    pub components: usize,
}

impl VolumeHeader {
    pub fn new(shape: [usize; 3], components: usize) -> Self {
        Self {
            shape,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            components,
        }
    }

    /// 数据区应有的字节数
    pub fn byte_len(&self) -> Result<usize, VolumeIoError> {
        let voxels = crate::volume::voxel_count(self.shape)?;
        voxels
            .checked_mul(self.components)
            .ok_or_else(|| VolumeIoError::header(format!("数据量溢出: {:?}", self.shape)))
    }

    pub(crate) fn check_components(&self) -> Result<(), VolumeIoError> {
        match self.components {
            1 | 3 | 4 => Ok(()),
            n => Err(VolumeIoError::UnsupportedPixel(format!("{n} 通道"))),
        }
    }
}

/// 未解释的体数据：文件头 + 按体素交错存放的字节
#[derive(Debug, Clone, PartialEq)]
pub struct RawVolume {
    pub header: VolumeHeader,
    pub bytes: Vec<u8>,
}

/// 写文件时数据区的编码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encoding {
    #[default]
    Raw,
    /// MetaImage 用 zlib，NRRD 用 gzip，VTK 不支持压缩
    Compressed,
}

/// 可以在 RawVolume 与 Volume 之间转换的像素类型
pub trait Pixel: Sized + Copy {
    const COMPONENTS: usize;

    fn from_bytes(bytes: &[u8]) -> Self;

    fn extend_bytes(&self, out: &mut Vec<u8>);
}

impl Pixel for u8 {
    const COMPONENTS: usize = 1;

    fn from_bytes(bytes: &[u8]) -> Self {
        bytes[0]
    }

    fn extend_bytes(&self, out: &mut Vec<u8>) {
        out.push(*self);
    }
}

impl<const N: usize> Pixel for [u8; N] {
    const COMPONENTS: usize = N;

    fn from_bytes(bytes: &[u8]) -> Self {
        let mut px = [0u8; N];
        px.copy_from_slice(&bytes[..N]);
        px
    }

    fn extend_bytes(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(self);
    }
}

impl RawVolume {
    pub fn from_volume<P: Pixel>(volume: &Volume<P>) -> Self {
        let mut bytes = Vec::with_capacity(volume.len() * P::COMPONENTS);
        for px in volume.data() {
            px.extend_bytes(&mut bytes);
        }
        Self {
            header: VolumeHeader {
                shape: volume.shape(),
                spacing: volume.spacing(),
                origin: volume.origin(),
                components: P::COMPONENTS,
            },
            bytes,
        }
    }

    /// 按像素类型解释字节，通道数必须一致
    pub fn into_volume<P: Pixel>(self) -> Result<Volume<P>, VolumeIoError> {
        if self.header.components != P::COMPONENTS {
            return Err(VolumeIoError::ComponentMismatch {
                expected: P::COMPONENTS,
                actual: self.header.components,
            });
        }
        let expected = self.header.byte_len()?;
        if self.bytes.len() != expected {
            return Err(VolumeIoError::Truncated {
                expected,
                actual: self.bytes.len(),
            });
        }

        let data = self
            .bytes
            .chunks_exact(P::COMPONENTS)
            .map(P::from_bytes)
            .collect();
        Ok(Volume::new(self.header.shape, data)?
            .with_spacing(self.header.spacing)
            .with_origin(self.header.origin))
    }
}

/// 体数据文件格式 trait
/// 不同文件格式需要实现这个 trait
pub trait VolumeFormat: Send + Sync {
    /// 获取支持的文件扩展名（不含点号），例如: "mhd"
    fn supported_extensions(&self) -> Vec<&'static str>;

    /// 检查文件扩展名是否被支持
    fn supports(&self, extension: &str) -> bool {
        self.supported_extensions()
            .iter()
            .any(|ext| ext.eq_ignore_ascii_case(extension))
    }

    /// 只读取文件头（维度、间距、通道数），不读数据区
    fn read_header(&self, path: &Path) -> Result<VolumeHeader, VolumeIoError>;

    fn read(&self, path: &Path) -> Result<RawVolume, VolumeIoError>;

    fn write(&self, path: &Path, volume: &RawVolume, encoding: Encoding)
    -> Result<(), VolumeIoError>;

    /// 获取格式名称（用于日志和错误信息）
    fn name(&self) -> &'static str;
}
