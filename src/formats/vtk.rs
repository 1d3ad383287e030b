use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use tracing::warn;

use super::{parse_numbers, parse_shape, parse_vec3, read_header_line, take_payload, write_file};
use crate::error::VolumeIoError;
use crate::utils::format::{Encoding, RawVolume, VolumeFormat, VolumeHeader};

/// 旧版 VTK 文件格式，只支持 STRUCTURED_POINTS
pub struct VtkFormat;

impl VtkFormat {
    pub fn new() -> Self {
        VtkFormat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attribute {
    /// SCALARS，unsigned_char 整数
    Scalars,
    /// COLOR_SCALARS，ASCII 时为 [0, 1] 浮点数
    ColorScalars,
}

#[derive(Debug)]
struct VtkHeader {
    header: VolumeHeader,
    binary: bool,
    attribute: Attribute,
}

/// 解析到数据区起点为止
fn parse_header<R: BufRead>(reader: &mut R) -> Result<VtkHeader, VolumeIoError> {
    let version = read_header_line(reader)?.unwrap_or_default();
    if !version.starts_with("# vtk DataFile") {
        return Err(VolumeIoError::header(format!("不是 VTK 文件: {version}")));
    }
    // 第二行是标题
    read_header_line(reader)?;
    let binary = match read_header_line(reader)?.as_deref().map(str::trim) {
        Some("BINARY") => true,
        Some("ASCII") => false,
        other => {
            return Err(VolumeIoError::header(format!(
                "未知的数据类型: {}",
                other.unwrap_or("")
            )));
        }
    };

    let mut shape = None;
    let mut header = VolumeHeader::new([0; 3], 1);

    loop {
        let Some(line) = read_header_line(reader)? else {
            return Err(VolumeIoError::header("缺少 SCALARS 或 COLOR_SCALARS 字段"));
        };
        let line = line.trim();
        let (keyword, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match keyword.to_ascii_uppercase().as_str() {
            "" => {}
            "DATASET" if rest != "STRUCTURED_POINTS" => {
                return Err(VolumeIoError::UnsupportedPixel(format!("VTK 数据集 {rest}")));
            }
            "DIMENSIONS" => shape = Some(parse_shape(rest, keyword)?),
            "SPACING" | "ASPECT_RATIO" => header.spacing = parse_vec3(rest, keyword)?,
            "ORIGIN" => header.origin = parse_vec3(rest, keyword)?,
            "SCALARS" => {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                let data_type = parts.get(1).copied().unwrap_or("");
                if data_type != "unsigned_char" {
                    return Err(VolumeIoError::UnsupportedPixel(data_type.to_string()));
                }
                if let Some(n) = parts.get(2) {
                    header.components = parse_numbers(n, "SCALARS", 1)?[0];
                }
                // SCALARS 之后必须紧跟 LOOKUP_TABLE
                let table = read_header_line(reader)?.unwrap_or_default();
                if !table.trim_start().starts_with("LOOKUP_TABLE") {
                    return Err(VolumeIoError::header("SCALARS 之后缺少 LOOKUP_TABLE"));
                }
                return finish(shape, header, binary, Attribute::Scalars);
            }
            "COLOR_SCALARS" => {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                let n = parts
                    .get(1)
                    .ok_or_else(|| VolumeIoError::header("COLOR_SCALARS 缺少通道数"))?;
                header.components = parse_numbers(n, "COLOR_SCALARS", 1)?[0];
                return finish(shape, header, binary, Attribute::ColorScalars);
            }
            _ => {}
        }
    }
}

fn finish(
    shape: Option<[usize; 3]>,
    mut header: VolumeHeader,
    binary: bool,
    attribute: Attribute,
) -> Result<VtkHeader, VolumeIoError> {
    header.shape = shape.ok_or_else(|| VolumeIoError::header("缺少 DIMENSIONS 字段"))?;
    header.check_components()?;
    Ok(VtkHeader {
        header,
        binary,
        attribute,
    })
}

fn decode_ascii(bytes: &[u8], attribute: Attribute) -> Result<Vec<u8>, VolumeIoError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| VolumeIoError::header("ASCII 数据包含非 UTF-8 字符"))?;
    text.split_whitespace()
        .map(|token| {
            let value: f64 = token
                .parse()
                .map_err(|_| VolumeIoError::header(format!("无法解析数值: {token}")))?;
            let value = match attribute {
                Attribute::Scalars => value,
                Attribute::ColorScalars => value * 255.0,
            };
            Ok(value.round().clamp(0.0, 255.0) as u8)
        })
        .collect()
}

impl VolumeFormat for VtkFormat {
    fn supported_extensions(&self) -> Vec<&'static str> {
        vec!["vtk"]
    }

    fn name(&self) -> &'static str {
        "Legacy VTK"
    }

    fn read_header(&self, path: &Path) -> Result<VolumeHeader, VolumeIoError> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(parse_header(&mut reader)?.header)
    }

    fn read(&self, path: &Path) -> Result<RawVolume, VolumeIoError> {
        let mut reader = BufReader::new(File::open(path)?);
        let meta = parse_header(&mut reader)?;
        let expected = meta.header.byte_len()?;

        let mut stored = Vec::new();
        reader.read_to_end(&mut stored)?;
        let bytes = if meta.binary {
            stored
        } else {
            decode_ascii(&stored, meta.attribute)?
        };

        Ok(RawVolume {
            header: meta.header,
            bytes: take_payload(bytes, expected)?,
        })
    }

    fn write(
        &self,
        path: &Path,
        volume: &RawVolume,
        encoding: Encoding,
    ) -> Result<(), VolumeIoError> {
        let h = &volume.header;
        h.check_components()?;
        if encoding == Encoding::Compressed {
            warn!(file = %path.display(), "VTK 格式不支持压缩，按原始数据写入");
        }

        let [nx, ny, nz] = h.shape;
        let [sx, sy, sz] = h.spacing;
        let [ox, oy, oz] = h.origin;

        let mut text = String::from("# vtk DataFile Version 3.0\n");
        text.push_str("occlusion-rgba volume\n");
        text.push_str("BINARY\n");
        text.push_str("DATASET STRUCTURED_POINTS\n");
        text.push_str(&format!("DIMENSIONS {nx} {ny} {nz}\n"));
        text.push_str(&format!("SPACING {sx} {sy} {sz}\n"));
        text.push_str(&format!("ORIGIN {ox} {oy} {oz}\n"));
        text.push_str(&format!("POINT_DATA {}\n", nx * ny * nz));
        if h.components == 1 {
            text.push_str("SCALARS scalars unsigned_char 1\n");
            text.push_str("LOOKUP_TABLE default\n");
        } else {
            text.push_str(&format!("COLOR_SCALARS color_scalars {}\n", h.components));
        }

        write_file(path, &text, Some(&volume.bytes))?;
        Ok(())
    }
}
