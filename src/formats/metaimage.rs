use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use super::{
    Codec, deflate, detached_name, has_extension, inflate, parse_numbers, parse_shape, parse_vec3,
    read_header_line, sibling_path, skip_leading, take_payload, write_file,
};
use crate::error::VolumeIoError;
use crate::utils::format::{Encoding, RawVolume, VolumeFormat, VolumeHeader};

/// MetaImage 文件格式（.mhd 分离式，.mha 一体式）
pub struct MetaImageFormat;

impl MetaImageFormat {
    pub fn new() -> Self {
        MetaImageFormat
    }
}

#[derive(Debug)]
struct MetaHeader {
    header: VolumeHeader,
    compressed: bool,
    /// 分离式数据文件开头要跳过的字节数，-1 表示数据位于文件末尾
    header_size: i64,
    /// "LOCAL" 表示数据紧跟在文件头之后
    data_file: String,
}

/// 逐行解析 "Key = Value"，ElementDataFile 必须是最后一个字段
fn parse_header<R: BufRead>(reader: &mut R) -> Result<MetaHeader, VolumeIoError> {
    let mut shape = None;
    let mut header = VolumeHeader::new([0; 3], 1);
    let mut compressed = false;
    let mut header_size = 0i64;

    loop {
        let Some(line) = read_header_line(reader)? else {
            return Err(VolumeIoError::header("缺少 ElementDataFile 字段"));
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(VolumeIoError::header(format!("无法解析的行: {line}")));
        };
        let (key, value) = (key.trim(), value.trim());

        match key {
            "ObjectType" if !value.eq_ignore_ascii_case("Image") => {
                return Err(VolumeIoError::header(format!("ObjectType 必须为 Image: {value}")));
            }
            "NDims" => {
                let ndims = parse_numbers::<usize>(value, key, 1)?[0];
                if ndims != 3 {
                    return Err(VolumeIoError::UnsupportedPixel(format!("{ndims} 维体数据")));
                }
            }
            "DimSize" => shape = Some(parse_shape(value, key)?),
            "ElementSpacing" | "ElementSize" => header.spacing = parse_vec3(value, key)?,
            "Offset" | "Origin" | "Position" => header.origin = parse_vec3(value, key)?,
            "ElementNumberOfChannels" => header.components = parse_numbers(value, key, 1)?[0],
            "ElementType" => {
                if value != "MET_UCHAR" && value != "MET_UCHAR_ARRAY" {
                    return Err(VolumeIoError::UnsupportedPixel(value.to_string()));
                }
            }
            "BinaryData" if value.eq_ignore_ascii_case("False") => {
                return Err(VolumeIoError::UnsupportedPixel("ASCII MetaImage".to_string()));
            }
            "CompressedData" => compressed = value.eq_ignore_ascii_case("True"),
            "HeaderSize" => header_size = parse_numbers(value, key, 1)?[0],
            "ElementDataFile" => {
                if value.eq_ignore_ascii_case("LIST") || value.contains('%') {
                    return Err(VolumeIoError::header(format!(
                        "不支持多文件数据: {value}"
                    )));
                }
                header.shape =
                    shape.ok_or_else(|| VolumeIoError::header("缺少 DimSize 字段"))?;
                header.check_components()?;
                return Ok(MetaHeader {
                    header,
                    compressed,
                    header_size,
                    data_file: value.to_string(),
                });
            }
            _ => {}
        }
    }
}

impl VolumeFormat for MetaImageFormat {
    fn supported_extensions(&self) -> Vec<&'static str> {
        vec!["mhd", "mha"]
    }

    fn name(&self) -> &'static str {
        "MetaImage"
    }

    fn read_header(&self, path: &Path) -> Result<VolumeHeader, VolumeIoError> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(parse_header(&mut reader)?.header)
    }

    fn read(&self, path: &Path) -> Result<RawVolume, VolumeIoError> {
        let mut reader = BufReader::new(File::open(path)?);
        let meta = parse_header(&mut reader)?;
        let expected = meta.header.byte_len()?;

        let stored = if meta.data_file.eq_ignore_ascii_case("LOCAL") {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            buf
        } else {
            if meta.header_size == -1 && meta.compressed {
                return Err(VolumeIoError::header("HeaderSize = -1 不能用于压缩数据"));
            }
            let file = fs::read(sibling_path(path, &meta.data_file))?;
            skip_leading(file, meta.header_size, expected)?
        };

        let bytes = if meta.compressed {
            inflate(&stored, Codec::Zlib)?
        } else {
            stored
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

        let compressed = encoding == Encoding::Compressed;
        let payload = if compressed {
            deflate(&volume.bytes, Codec::Zlib)?
        } else {
            volume.bytes.clone()
        };

        let detached = has_extension(path, "mhd");
        let data_file = if detached {
            detached_name(path, if compressed { "zraw" } else { "raw" })?
        } else {
            "LOCAL".to_string()
        };

        let mut text = String::new();
        text.push_str("ObjectType = Image\n");
        text.push_str("NDims = 3\n");
        text.push_str("BinaryData = True\n");
        text.push_str("BinaryDataByteOrderMSB = False\n");
        if compressed {
            text.push_str("CompressedData = True\n");
            text.push_str(&format!("CompressedDataSize = {}\n", payload.len()));
        } else {
            text.push_str("CompressedData = False\n");
        }
        let [ox, oy, oz] = h.origin;
        let [sx, sy, sz] = h.spacing;
        let [nx, ny, nz] = h.shape;
        text.push_str(&format!("Offset = {ox} {oy} {oz}\n"));
        text.push_str(&format!("ElementSpacing = {sx} {sy} {sz}\n"));
        text.push_str(&format!("DimSize = {nx} {ny} {nz}\n"));
        if h.components > 1 {
            text.push_str(&format!("ElementNumberOfChannels = {}\n", h.components));
            text.push_str("ElementType = MET_UCHAR_ARRAY\n");
        } else {
            text.push_str("ElementType = MET_UCHAR\n");
        }
        text.push_str(&format!("ElementDataFile = {data_file}\n"));

        if detached {
            write_file(path, &text, None)?;
            fs::write(sibling_path(path, &data_file), &payload)?;
        } else {
            write_file(path, &text, Some(&payload))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn parses_itk_style_header() {
        let text = "ObjectType = Image\nNDims = 3\nBinaryData = True\n\
                    CompressedData = False\nOffset = 0 0 -12.5\n\
                    ElementSpacing = 0.5 0.5 1.25\nDimSize = 64 32 16\n\
                    ElementNumberOfChannels = 3\nElementType = MET_UCHAR_ARRAY\n\
                    ElementDataFile = LOCAL\n";
        let meta = parse_header(&mut Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(meta.header.shape, [64, 32, 16]);
        assert_eq!(meta.header.spacing, [0.5, 0.5, 1.25]);
        assert_eq!(meta.header.origin, [0.0, 0.0, -12.5]);
        assert_eq!(meta.header.components, 3);
        assert!(!meta.compressed);
        assert_eq!(meta.data_file, "LOCAL");
    }

    #[test]
    fn rejects_non_uchar_elements() {
        let text = "NDims = 3\nDimSize = 2 2 2\nElementType = MET_SHORT\nElementDataFile = LOCAL\n";
        let err = parse_header(&mut Cursor::new(text.as_bytes())).unwrap_err();
        assert!(matches!(err, VolumeIoError::UnsupportedPixel(_)));
    }

    #[test]
    fn rejects_two_dimensional_images() {
        let text = "NDims = 2\nDimSize = 2 2\nElementType = MET_UCHAR\nElementDataFile = LOCAL\n";
        let err = parse_header(&mut Cursor::new(text.as_bytes())).unwrap_err();
        assert!(matches!(err, VolumeIoError::UnsupportedPixel(_)));
    }

    fn write_detached(dir: &Path, header_size: &str, data: &[u8]) -> std::path::PathBuf {
        let header = format!(
            "NDims = 3\nDimSize = 2 2 1\nElementType = MET_UCHAR\n\
             HeaderSize = {header_size}\nElementDataFile = head.raw\n"
        );
        let path = dir.join("head.mhd");
        fs::write(&path, header).unwrap();
        fs::write(dir.join("head.raw"), data).unwrap();
        path
    }

    #[test]
    fn header_size_skips_data_file_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_detached(dir.path(), "3", &[7, 7, 7, 1, 2, 3, 4]);
        let volume = MetaImageFormat::new().read(&path).unwrap();
        assert_eq!(volume.bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn header_size_minus_one_reads_from_end() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_detached(dir.path(), "-1", &[7, 7, 1, 2, 3, 4]);
        let volume = MetaImageFormat::new().read(&path).unwrap();
        assert_eq!(volume.bytes, vec![1, 2, 3, 4]);
    }

    #[test]
    fn header_size_minus_one_rejects_compressed_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("head.mhd");
        fs::write(
            &path,
            "NDims = 3\nDimSize = 2 2 1\nElementType = MET_UCHAR\nCompressedData = True\n\
             HeaderSize = -1\nElementDataFile = head.zraw\n",
        )
        .unwrap();
        fs::write(dir.path().join("head.zraw"), deflate(&[1, 2, 3, 4], Codec::Zlib).unwrap())
            .unwrap();
        let err = MetaImageFormat::new().read(&path).unwrap_err();
        assert!(matches!(err, VolumeIoError::Header(_)));
    }

    #[test]
    fn missing_data_file_is_an_error() {
        let text = "NDims = 3\nDimSize = 2 2 2\nElementType = MET_UCHAR\n";
        let err = parse_header(&mut Cursor::new(text.as_bytes())).unwrap_err();
        assert!(matches!(err, VolumeIoError::Header(_)));
    }
}
