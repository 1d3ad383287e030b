use std::fs::{self, File};
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use super::{
    Codec, deflate, detached_name, has_extension, inflate, read_header_line, sibling_path,
    skip_leading, take_payload, write_file,
};
use crate::error::VolumeIoError;
use crate::utils::format::{Encoding, RawVolume, VolumeFormat, VolumeHeader};

/// NRRD 文件格式（.nrrd 一体式，.nhdr 分离式）
pub struct NrrdFormat;

impl NrrdFormat {
    pub fn new() -> Self {
        NrrdFormat
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NrrdEncoding {
    Raw,
    Gzip,
    Ascii,
}

#[derive(Debug)]
struct NrrdHeader {
    header: VolumeHeader,
    encoding: NrrdEncoding,
    data_file: Option<String>,
    line_skip: usize,
    byte_skip: i64,
}

const UCHAR_TYPES: [&str; 4] = ["uchar", "unsigned char", "uint8", "uint8_t"];

/// 解析 "(x,y,z)" 形式的向量，"none" 返回 None
fn parse_vector(token: &str) -> Result<Option<[f64; 3]>, VolumeIoError> {
    if token == "none" {
        return Ok(None);
    }
    let inner = token
        .strip_prefix('(')
        .and_then(|t| t.strip_suffix(')'))
        .ok_or_else(|| VolumeIoError::header(format!("无法解析向量: {token}")))?;
    let values: Vec<f64> = inner
        .split(',')
        .map(|s| s.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| VolumeIoError::header(format!("无法解析向量: {token}")))?;
    match values.as_slice() {
        &[x, y, z] => Ok(Some([x, y, z])),
        _ => Err(VolumeIoError::header(format!("向量应该包含 3 个分量: {token}"))),
    }
}

/// 按空白分隔向量，向量内部允许出现空格
fn split_vectors(value: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0usize;
    for ch in value.chars() {
        match ch {
            '(' => {
                depth += 1;
                current.push(ch);
            }
            ')' => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c if c.is_whitespace() => {}
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// 第 4 维（如果有）必须是最快变化的颜色轴
fn split_axes<T: Copy>(values: &[T], field: &str, dimension: usize) -> Result<Vec<T>, VolumeIoError> {
    if values.len() != dimension {
        return Err(VolumeIoError::header(format!(
            "{field} 应该包含 {dimension} 个值，但得到 {} 个",
            values.len()
        )));
    }
    Ok(values[dimension - 3..].to_vec())
}

fn parse_header<R: BufRead>(reader: &mut R) -> Result<NrrdHeader, VolumeIoError> {
    let magic = read_header_line(reader)?.unwrap_or_default();
    if !magic.starts_with("NRRD000") {
        return Err(VolumeIoError::header(format!("不是 NRRD 文件: {magic}")));
    }

    let mut dimension = None;
    let mut sizes: Option<Vec<usize>> = None;
    let mut spacings: Option<Vec<f64>> = None;
    let mut directions: Option<Vec<Option<[f64; 3]>>> = None;
    let mut origin = [0.0; 3];
    let mut encoding = None;
    let mut data_file = None;
    let mut line_skip = 0usize;
    let mut byte_skip = 0i64;

    // 一体式文件以空行结束文件头，分离式文件可以直接读到末尾
    while let Some(line) = read_header_line(reader)? {
        if line.is_empty() {
            break;
        }
        if line.starts_with('#') || line.contains(":=") {
            continue;
        }
        let Some((field, value)) = line.split_once(": ") else {
            return Err(VolumeIoError::header(format!("无法解析的行: {line}")));
        };
        let value = value.trim();

        match field {
            "type" => {
                if !UCHAR_TYPES.contains(&value) {
                    return Err(VolumeIoError::UnsupportedPixel(value.to_string()));
                }
            }
            "dimension" => {
                let d: usize = value
                    .parse()
                    .map_err(|_| VolumeIoError::header(format!("无法解析 dimension: {value}")))?;
                if d != 3 && d != 4 {
                    return Err(VolumeIoError::UnsupportedPixel(format!("{d} 维体数据")));
                }
                dimension = Some(d);
            }
            "sizes" => {
                sizes = Some(
                    value
                        .split_whitespace()
                        .map(|s| s.parse())
                        .collect::<Result<_, _>>()
                        .map_err(|_| VolumeIoError::header(format!("无法解析 sizes: {value}")))?,
                );
            }
            "spacings" => {
                spacings = Some(
                    value
                        .split_whitespace()
                        .map(|s| s.parse::<f64>())
                        .collect::<Result<_, _>>()
                        .map_err(|_| {
                            VolumeIoError::header(format!("无法解析 spacings: {value}"))
                        })?,
                );
            }
            "space directions" => {
                directions = Some(
                    split_vectors(value)
                        .iter()
                        .map(|t| parse_vector(t))
                        .collect::<Result<_, _>>()?,
                );
            }
            "space origin" => {
                if let Some(v) = parse_vector(value)? {
                    origin = v;
                }
            }
            "encoding" => {
                encoding = Some(match value {
                    "raw" => NrrdEncoding::Raw,
                    "gzip" | "gz" => NrrdEncoding::Gzip,
                    "ascii" | "text" | "txt" => NrrdEncoding::Ascii,
                    other => {
                        return Err(VolumeIoError::header(format!("不支持的编码: {other}")));
                    }
                });
            }
            "data file" | "datafile" => {
                if value.starts_with("LIST") || value.contains('%') {
                    return Err(VolumeIoError::header(format!("不支持多文件数据: {value}")));
                }
                data_file = Some(value.to_string());
            }
            "line skip" | "lineskip" => {
                line_skip = value
                    .parse()
                    .map_err(|_| VolumeIoError::header(format!("无法解析 line skip: {value}")))?;
            }
            "byte skip" | "byteskip" => {
                byte_skip = value
                    .parse()
                    .map_err(|_| VolumeIoError::header(format!("无法解析 byte skip: {value}")))?;
            }
            _ => {}
        }
    }

    let dimension = dimension.ok_or_else(|| VolumeIoError::header("缺少 dimension 字段"))?;
    let sizes = sizes.ok_or_else(|| VolumeIoError::header("缺少 sizes 字段"))?;
    let encoding = encoding.ok_or_else(|| VolumeIoError::header("缺少 encoding 字段"))?;

    let spatial = split_axes(&sizes, "sizes", dimension)?;
    let mut header = VolumeHeader::new([spatial[0], spatial[1], spatial[2]], 1);
    header.origin = origin;
    if dimension == 4 {
        header.components = sizes[0];
    }
    header.check_components()?;

    if let Some(directions) = directions {
        let spatial = split_axes(&directions, "space directions", dimension)?;
        for (axis, dir) in spatial.iter().enumerate() {
            let [x, y, z] = dir.ok_or_else(|| VolumeIoError::header("空间轴的方向不能为 none"))?;
            header.spacing[axis] = (x * x + y * y + z * z).sqrt();
        }
    } else if let Some(spacings) = spacings {
        let spatial = split_axes(&spacings, "spacings", dimension)?;
        for (axis, s) in spatial.iter().enumerate() {
            if s.is_finite() {
                header.spacing[axis] = *s;
            }
        }
    }

    Ok(NrrdHeader {
        header,
        encoding,
        data_file,
        line_skip,
        byte_skip,
    })
}

/// line skip 作用于文件中存储的字节
fn skip_lines(mut bytes: Vec<u8>, lines: usize) -> Result<Vec<u8>, VolumeIoError> {
    let mut start = 0usize;
    for _ in 0..lines {
        match bytes[start..].iter().position(|&b| b == b'\n') {
            Some(pos) => start += pos + 1,
            None => return Err(VolumeIoError::header("line skip 超出数据长度")),
        }
    }
    Ok(bytes.split_off(start))
}

/// 按编码解出数据区
///
/// gzip 编码下 byte skip 计的是解压后的字节，其余编码计的是文件字节。
/// byte skip: -1 表示数据位于文件末尾，只能用于 raw 编码。
fn decode_payload(stored: Vec<u8>, meta: &NrrdHeader, expected: usize) -> Result<Vec<u8>, VolumeIoError> {
    if meta.byte_skip == -1 && meta.encoding != NrrdEncoding::Raw {
        return Err(VolumeIoError::header("byte skip: -1 只能用于 raw 编码"));
    }
    let stored = skip_lines(stored, meta.line_skip)?;
    match meta.encoding {
        NrrdEncoding::Raw => skip_leading(stored, meta.byte_skip, expected),
        NrrdEncoding::Gzip => skip_leading(inflate(&stored, Codec::Gzip)?, meta.byte_skip, expected),
        NrrdEncoding::Ascii => decode_ascii(&skip_leading(stored, meta.byte_skip, expected)?),
    }
}

fn decode_ascii(bytes: &[u8]) -> Result<Vec<u8>, VolumeIoError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| VolumeIoError::header("ASCII 数据包含非 UTF-8 字符"))?;
    text.split_whitespace()
        .map(|token| {
            token
                .parse::<u8>()
                .or_else(|_| token.parse::<f64>().map(|v| v.round().clamp(0.0, 255.0) as u8))
                .map_err(|_| VolumeIoError::header(format!("无法解析数值: {token}")))
        })
        .collect()
}

impl VolumeFormat for NrrdFormat {
    fn supported_extensions(&self) -> Vec<&'static str> {
        vec!["nrrd", "nhdr"]
    }

    fn name(&self) -> &'static str {
        "NRRD"
    }

    fn read_header(&self, path: &Path) -> Result<VolumeHeader, VolumeIoError> {
        let mut reader = BufReader::new(File::open(path)?);
        Ok(parse_header(&mut reader)?.header)
    }

    fn read(&self, path: &Path) -> Result<RawVolume, VolumeIoError> {
        let mut reader = BufReader::new(File::open(path)?);
        let meta = parse_header(&mut reader)?;
        let expected = meta.header.byte_len()?;

        let stored = match &meta.data_file {
            Some(name) => fs::read(sibling_path(path, name))?,
            None => {
                let mut buf = Vec::new();
                reader.read_to_end(&mut buf)?;
                buf
            }
        };
        let bytes = decode_payload(stored, &meta, expected)?;

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
            deflate(&volume.bytes, Codec::Gzip)?
        } else {
            volume.bytes.clone()
        };

        let color = h.components > 1;
        let [nx, ny, nz] = h.shape;
        let [sx, sy, sz] = h.spacing;
        let [ox, oy, oz] = h.origin;

        let mut text = String::from("NRRD0004\n");
        text.push_str("# Complete NRRD file format specification at:\n");
        text.push_str("# http://teem.sourceforge.net/nrrd/format.html\n");
        text.push_str("type: uchar\n");
        if color {
            text.push_str("dimension: 4\n");
            text.push_str(&format!("sizes: {} {nx} {ny} {nz}\n", h.components));
            let kind = if h.components == 4 { "RGBA-color" } else { "RGB-color" };
            text.push_str(&format!("kinds: {kind} domain domain domain\n"));
        } else {
            text.push_str("dimension: 3\n");
            text.push_str(&format!("sizes: {nx} {ny} {nz}\n"));
            text.push_str("kinds: domain domain domain\n");
        }
        text.push_str("space dimension: 3\n");
        let prefix = if color { "none " } else { "" };
        text.push_str(&format!(
            "space directions: {prefix}({sx},0,0) (0,{sy},0) (0,0,{sz})\n"
        ));
        text.push_str(&format!("space origin: ({ox},{oy},{oz})\n"));
        text.push_str(&format!(
            "encoding: {}\n",
            if compressed { "gzip" } else { "raw" }
        ));

        if has_extension(path, "nhdr") {
            let data_file = detached_name(path, if compressed { "raw.gz" } else { "raw" })?;
            text.push_str(&format!("data file: {data_file}\n"));
            write_file(path, &text, None)?;
            fs::write(sibling_path(path, &data_file), &payload)?;
        } else {
            text.push('\n');
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
    fn parses_color_header_with_directions() {
        let text = "NRRD0004\n# comment\ntype: unsigned char\ndimension: 4\n\
                    sizes: 3 10 20 30\nspace: left-posterior-superior\n\
                    space directions: none (0.5, 0, 0) (0,2,0) (0,0,1.5)\n\
                    kinds: RGB-color domain domain domain\n\
                    space origin: (1,2,3)\nencoding: gzip\nendian: little\n\n";
        let meta = parse_header(&mut Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(meta.header.shape, [10, 20, 30]);
        assert_eq!(meta.header.components, 3);
        assert_eq!(meta.header.spacing, [0.5, 2.0, 1.5]);
        assert_eq!(meta.header.origin, [1.0, 2.0, 3.0]);
        assert_eq!(meta.encoding, NrrdEncoding::Gzip);
        assert!(meta.data_file.is_none());
    }

    #[test]
    fn spacings_field_is_used_without_directions() {
        let text = "NRRD0004\ntype: uchar\ndimension: 3\nsizes: 4 5 6\n\
                    spacings: 0.25 0.5 nan\nencoding: raw\n\n";
        let meta = parse_header(&mut Cursor::new(text.as_bytes())).unwrap();
        assert_eq!(meta.header.spacing, [0.25, 0.5, 1.0]);
        assert_eq!(meta.header.components, 1);
    }

    #[test]
    fn rejects_float_samples() {
        let text = "NRRD0004\ntype: float\ndimension: 3\nsizes: 2 2 2\nencoding: raw\n\n";
        let err = parse_header(&mut Cursor::new(text.as_bytes())).unwrap_err();
        assert!(matches!(err, VolumeIoError::UnsupportedPixel(_)));
    }

    #[test]
    fn rejects_missing_magic() {
        let err = parse_header(&mut Cursor::new(b"P5\n2 2\n".to_vec())).unwrap_err();
        assert!(matches!(err, VolumeIoError::Header(_)));
    }

    #[test]
    fn ascii_samples_accept_integers_and_floats() {
        assert_eq!(decode_ascii(b"0 12\n255 7.6\n").unwrap(), vec![0, 12, 255, 8]);
    }

    fn header_with(encoding: &str, extra: &str) -> NrrdHeader {
        let text = format!(
            "NRRD0004\ntype: uchar\ndimension: 3\nsizes: 2 1 1\nencoding: {encoding}\n{extra}\n"
        );
        parse_header(&mut Cursor::new(text.into_bytes())).unwrap()
    }

    #[test]
    fn byte_skip_from_end() {
        let meta = header_with("raw", "byte skip: -1\n");
        let data = decode_payload(vec![9, 9, 9, 1, 2], &meta, 2).unwrap();
        assert_eq!(data, vec![1, 2]);
    }

    #[test]
    fn line_skip_precedes_byte_skip() {
        let meta = header_with("raw", "line skip: 1\nbyte skip: 1\n");
        let data = decode_payload(b"junk\n\x09\x01\x02".to_vec(), &meta, 2).unwrap();
        assert_eq!(data, vec![1, 2]);
    }

    #[test]
    fn gzip_byte_skip_counts_decompressed_bytes() {
        let meta = header_with("gzip", "byte skip: 4\n");
        let packed = deflate(&[9, 9, 9, 9, 1, 2], Codec::Gzip).unwrap();
        assert_eq!(decode_payload(packed, &meta, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn gzip_line_skip_counts_file_bytes() {
        let meta = header_with("gzip", "line skip: 1\n");
        let mut stored = b"junk\n".to_vec();
        stored.extend(deflate(&[1, 2], Codec::Gzip).unwrap());
        assert_eq!(decode_payload(stored, &meta, 2).unwrap(), vec![1, 2]);
    }

    #[test]
    fn byte_skip_from_end_requires_raw() {
        let meta = header_with("gzip", "byte skip: -1\n");
        let packed = deflate(&[1, 2], Codec::Gzip).unwrap();
        assert!(matches!(
            decode_payload(packed, &meta, 2).unwrap_err(),
            VolumeIoError::Header(_)
        ));
    }

    #[test]
    fn gzip_byte_skip_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("skip.nrrd");
        let mut file = b"NRRD0004\ntype: uchar\ndimension: 3\nsizes: 2 1 1\n\
                         encoding: gzip\nbyte skip: 4\n\n"
            .to_vec();
        file.extend(deflate(&[9, 9, 9, 9, 1, 2], Codec::Gzip).unwrap());
        fs::write(&path, file).unwrap();

        let volume = NrrdFormat::new().read(&path).unwrap();
        assert_eq!(volume.header.shape, [2, 1, 1]);
        assert_eq!(volume.bytes, vec![1, 2]);
    }

    #[test]
    fn vectors_may_contain_spaces() {
        assert_eq!(
            split_vectors("none (1, 0, 0)  (0,1,0) (0, 0,1)"),
            vec!["none", "(1,0,0)", "(0,1,0)", "(0,0,1)"]
        );
    }
}
