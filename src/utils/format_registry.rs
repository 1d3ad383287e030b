use std::path::Path;

use tracing::{debug, info};

use crate::error::VolumeIoError;
use crate::utils::format::{Encoding, Pixel, RawVolume, VolumeFormat, VolumeHeader};
use crate::volume::{GrayVolume, RgbVolume, RgbaVolume, Volume};

/// 格式注册表
/// 管理所有可用的体数据格式，并根据文件扩展名匹配对应的读写器
pub struct FormatRegistry {
    formats: Vec<Box<dyn VolumeFormat>>,
}

impl FormatRegistry {
    /// 创建新的格式注册表，自动注册所有可用的格式
    pub fn new() -> Self {
        let formats = crate::formats::get_all_formats();
        Self { formats }
    }

    /// 根据文件扩展名查找匹配的格式
    /// extension: 文件扩展名（不含点号），例如 "nrrd"
    pub fn find_format(&self, extension: &str) -> Option<&dyn VolumeFormat> {
        self.formats
            .iter()
            .find(|format| format.supports(extension))
            .map(|f| f.as_ref())
    }

    /// 根据文件路径查找匹配的格式
    /// 自动提取文件扩展名
    pub fn find_format_for_file(&self, path: &Path) -> Option<(&dyn VolumeFormat, String)> {
        let extension = path.extension().and_then(|ext| ext.to_str())?.to_string();

        self.find_format(&extension)
            .map(|format| (format, extension))
    }

    /// 获取所有支持的扩展名列表
    pub fn supported_extensions(&self) -> Vec<String> {
        let mut extensions = Vec::new();
        for format in &self.formats {
            extensions.extend(
                format
                    .supported_extensions()
                    .iter()
                    .map(|s| s.to_lowercase()),
            );
        }
        extensions.sort();
        extensions.dedup();
        extensions
    }

    fn resolve(&self, path: &Path) -> Result<&dyn VolumeFormat, VolumeIoError> {
        match self.find_format_for_file(path) {
            Some((format, _)) => Ok(format),
            None => Err(VolumeIoError::UnsupportedFormat(format!(
                "{}（支持: {}）",
                path.display(),
                self.supported_extensions().join(", ")
            ))),
        }
    }

    pub fn read_header(&self, path: &Path) -> Result<VolumeHeader, VolumeIoError> {
        self.resolve(path)?.read_header(path)
    }

    pub fn read_volume<P: Pixel>(&self, path: &Path) -> Result<Volume<P>, VolumeIoError> {
        let format = self.resolve(path)?;
        let raw = format.read(path)?;
        info!(
            file = %path.display(),
            format = format.name(),
            shape = ?raw.header.shape,
            components = raw.header.components,
            "[读取] 体数据读取完成"
        );
        raw.into_volume()
    }

    pub fn read_gray(&self, path: &Path) -> Result<GrayVolume, VolumeIoError> {
        self.read_volume(path)
    }

    pub fn read_rgb(&self, path: &Path) -> Result<RgbVolume, VolumeIoError> {
        self.read_volume(path)
    }

    pub fn write_volume<P: Pixel>(
        &self,
        path: &Path,
        volume: &Volume<P>,
        encoding: Encoding,
    ) -> Result<(), VolumeIoError> {
        let format = self.resolve(path)?;
        debug!(file = %path.display(), format = format.name(), ?encoding, "写入体数据");
        format.write(path, &RawVolume::from_volume(volume), encoding)
    }

    pub fn write_gray(
        &self,
        path: &Path,
        volume: &GrayVolume,
        encoding: Encoding,
    ) -> Result<(), VolumeIoError> {
        self.write_volume(path, volume, encoding)
    }

    pub fn write_rgb(
        &self,
        path: &Path,
        volume: &RgbVolume,
        encoding: Encoding,
    ) -> Result<(), VolumeIoError> {
        self.write_volume(path, volume, encoding)
    }

    pub fn write_rgba(
        &self,
        path: &Path,
        volume: &RgbaVolume,
        encoding: Encoding,
    ) -> Result<(), VolumeIoError> {
        self.write_volume(path, volume, encoding)
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
