mod metaimage;
mod nrrd;
mod vtk;

use std::io::{self, BufRead, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use flate2::Compression;
use flate2::read::{MultiGzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};

pub use metaimage::MetaImageFormat;
pub use nrrd::NrrdFormat;
pub use vtk::VtkFormat;

use crate::error::VolumeIoError;
use crate::utils::format::VolumeFormat;

/// 获取所有可用的格式
pub fn get_all_formats() -> Vec<Box<dyn VolumeFormat>> {
    vec![
        Box::new(MetaImageFormat::new()),
        Box::new(NrrdFormat::new()),
        Box::new(VtkFormat::new()),
    ]
}

/// 数据区的压缩方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Zlib,
    Gzip,
}

fn inflate(bytes: &[u8], codec: Codec) -> Result<Vec<u8>, VolumeIoError> {
    let mut out = Vec::new();
    match codec {
        Codec::Zlib => ZlibDecoder::new(bytes).read_to_end(&mut out)?,
        Codec::Gzip => MultiGzDecoder::new(bytes).read_to_end(&mut out)?,
    };
    Ok(out)
}

fn deflate(bytes: &[u8], codec: Codec) -> Result<Vec<u8>, VolumeIoError> {
    let out = match codec {
        Codec::Zlib => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes)?;
            encoder.finish()?
        }
        Codec::Gzip => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(bytes)?;
            encoder.finish()?
        }
    };
    Ok(out)
}

/// 数据区不能短于文件头声明的长度，多余的尾部字节被丢弃
fn take_payload(mut bytes: Vec<u8>, expected: usize) -> Result<Vec<u8>, VolumeIoError> {
    if bytes.len() < expected {
        return Err(VolumeIoError::Truncated {
            expected,
            actual: bytes.len(),
        });
    }
    bytes.truncate(expected);
    Ok(bytes)
}

/// 丢弃数据区前 skip 个字节；skip 为 -1 时数据位于末尾，只保留最后 expected 个字节
fn skip_leading(mut bytes: Vec<u8>, skip: i64, expected: usize) -> Result<Vec<u8>, VolumeIoError> {
    let start = match skip {
        -1 => bytes
            .len()
            .checked_sub(expected)
            .ok_or(VolumeIoError::Truncated {
                expected,
                actual: bytes.len(),
            })?,
        s => usize::try_from(s)
            .map_err(|_| VolumeIoError::header(format!("无效的跳过字节数: {s}")))?,
    };
    if start > bytes.len() {
        return Err(VolumeIoError::Truncated {
            expected,
            actual: 0,
        });
    }
    Ok(bytes.split_off(start))
}

/// 读取一行文本文件头，去掉行尾的 \r\n；到达文件末尾时返回 None
fn read_header_line<R: BufRead>(reader: &mut R) -> Result<Option<String>, VolumeIoError> {
    let mut buf = Vec::new();
    if reader.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| VolumeIoError::header("文件头包含非 UTF-8 字符"))
}

/// 解析固定个数的空白分隔数值
fn parse_numbers<T: FromStr>(value: &str, field: &str, count: usize) -> Result<Vec<T>, VolumeIoError> {
    let values: Vec<T> = value
        .split_whitespace()
        .map(|s| s.parse::<T>())
        .collect::<Result<_, _>>()
        .map_err(|_| VolumeIoError::header(format!("无法解析 {field}: {value}")))?;

    if values.len() != count {
        return Err(VolumeIoError::header(format!(
            "{field} 应该包含 {count} 个值，但得到 {} 个",
            values.len()
        )));
    }
    Ok(values)
}

fn parse_shape(value: &str, field: &str) -> Result<[usize; 3], VolumeIoError> {
    let v = parse_numbers::<usize>(value, field, 3)?;
    Ok([v[0], v[1], v[2]])
}

fn parse_vec3(value: &str, field: &str) -> Result<[f64; 3], VolumeIoError> {
    let v = parse_numbers::<f64>(value, field, 3)?;
    Ok([v[0], v[1], v[2]])
}

/// 分离式文件头引用的数据文件与文件头位于同一目录
fn sibling_path(header_path: &Path, name: &str) -> PathBuf {
    let candidate = Path::new(name);
    if candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    header_path
        .parent()
        .map(|dir| dir.join(candidate))
        .unwrap_or_else(|| candidate.to_path_buf())
}

/// 分离式数据文件名：与文件头同名，换成给定扩展名
fn detached_name(header_path: &Path, extension: &str) -> Result<String, VolumeIoError> {
    let stem = header_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| VolumeIoError::header(format!("无效的文件名: {}", header_path.display())))?;
    Ok(format!("{stem}.{extension}"))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

fn write_file(path: &Path, header: &str, payload: Option<&[u8]>) -> io::Result<()> {
    let mut file = io::BufWriter::new(std::fs::File::create(path)?);
    file.write_all(header.as_bytes())?;
    if let Some(payload) = payload {
        file.write_all(payload)?;
    }
    file.flush()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lines_strip_line_endings() {
        let mut reader = io::Cursor::new(b"NDims = 3\r\nDimSize = 1 2 3\n\x00\x01".to_vec());
        assert_eq!(read_header_line(&mut reader).unwrap().as_deref(), Some("NDims = 3"));
        assert_eq!(
            read_header_line(&mut reader).unwrap().as_deref(),
            Some("DimSize = 1 2 3")
        );
        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, vec![0, 1]);
    }

    #[test]
    fn wrong_value_count_is_a_header_error() {
        let err = parse_shape("4 4", "DimSize").unwrap_err();
        assert!(matches!(err, VolumeIoError::Header(_)));
        assert!(parse_vec3("1 x 3", "Offset").is_err());
    }

    #[test]
    fn compressed_payload_survives_both_codecs() {
        let data: Vec<u8> = (0..=255).cycle().take(4096).collect();
        for codec in [Codec::Zlib, Codec::Gzip] {
            let packed = deflate(&data, codec).unwrap();
            assert!(packed.len() < data.len());
            assert_eq!(inflate(&packed, codec).unwrap(), data);
        }
    }

    #[test]
    fn payload_is_trimmed_or_rejected() {
        assert_eq!(take_payload(vec![1, 2, 3, 4], 3).unwrap(), vec![1, 2, 3]);
        assert!(matches!(
            take_payload(vec![1, 2], 3).unwrap_err(),
            VolumeIoError::Truncated {
                expected: 3,
                actual: 2
            }
        ));
    }

    #[test]
    fn leading_bytes_are_skipped() {
        assert_eq!(skip_leading(vec![9, 9, 1, 2], 2, 2).unwrap(), vec![1, 2]);
        assert_eq!(skip_leading(vec![9, 9, 9, 1, 2], -1, 2).unwrap(), vec![1, 2]);
        assert_eq!(skip_leading(vec![1, 2], 0, 2).unwrap(), vec![1, 2]);
        assert!(matches!(
            skip_leading(vec![1], -1, 2).unwrap_err(),
            VolumeIoError::Truncated {
                expected: 2,
                actual: 1
            }
        ));
        assert!(matches!(
            skip_leading(vec![1, 2], 3, 2).unwrap_err(),
            VolumeIoError::Truncated { .. }
        ));
        assert!(matches!(
            skip_leading(vec![1, 2], -2, 2).unwrap_err(),
            VolumeIoError::Header(_)
        ));
    }

    #[test]
    fn detached_files_live_next_to_header() {
        let header = Path::new("/data/volumes/head.mhd");
        assert_eq!(
            sibling_path(header, "head.raw"),
            PathBuf::from("/data/volumes/head.raw")
        );
        assert_eq!(detached_name(header, "zraw").unwrap(), "head.zraw");
        assert!(has_extension(header, "MHD"));
    }
}
