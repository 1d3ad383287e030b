//! 各容器格式写入后再读取，几何信息与数据保持不变

use std::path::Path;

use occlusion_rgba::{Encoding, FormatRegistry, GrayVolume, RgbaVolume, Volume, VolumeIoError};

fn sample_rgba() -> RgbaVolume {
    Volume::from_fn([5, 4, 3], |i, j, k| {
        [(i * 50) as u8, (j * 60) as u8, (k * 100) as u8, (i + j + k) as u8 * 20]
    })
    .unwrap()
    .with_spacing([0.5, 0.75, 2.0])
    .with_origin([-1.0, 0.0, 10.5])
}

fn check_rgba(registry: &FormatRegistry, path: &Path, encoding: Encoding) {
    let original = sample_rgba();
    registry.write_rgba(path, &original, encoding).unwrap();

    let header = registry.read_header(path).unwrap();
    assert_eq!(header.shape, [5, 4, 3], "{}", path.display());
    assert_eq!(header.components, 4, "{}", path.display());

    let loaded: RgbaVolume = registry.read_volume(path).unwrap();
    assert_eq!(loaded, original, "{}", path.display());
}

#[test]
fn metaimage_attached_and_detached() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::new();

    check_rgba(&registry, &dir.path().join("volume.mha"), Encoding::Raw);
    check_rgba(&registry, &dir.path().join("volume.mhd"), Encoding::Raw);
    assert!(dir.path().join("volume.raw").exists());

    check_rgba(&registry, &dir.path().join("packed.mhd"), Encoding::Compressed);
    assert!(dir.path().join("packed.zraw").exists());
}

#[test]
fn nrrd_attached_and_detached() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::new();

    check_rgba(&registry, &dir.path().join("volume.nrrd"), Encoding::Raw);
    check_rgba(&registry, &dir.path().join("packed.nrrd"), Encoding::Compressed);
    check_rgba(&registry, &dir.path().join("volume.nhdr"), Encoding::Compressed);
    assert!(dir.path().join("volume.raw.gz").exists());
}

#[test]
fn legacy_vtk_binary() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::new();
    check_rgba(&registry, &dir.path().join("volume.vtk"), Encoding::Raw);
}

#[test]
fn compression_shrinks_smooth_data() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::new();
    let gray = GrayVolume::filled([32, 32, 32], 17).unwrap();

    let raw = dir.path().join("raw.nrrd");
    let packed = dir.path().join("packed.nrrd");
    registry.write_gray(&raw, &gray, Encoding::Raw).unwrap();
    registry.write_gray(&packed, &gray, Encoding::Compressed).unwrap();

    let raw_len = std::fs::metadata(&raw).unwrap().len();
    let packed_len = std::fs::metadata(&packed).unwrap().len();
    assert!(packed_len < raw_len / 10);
    assert_eq!(registry.read_gray(&packed).unwrap(), gray);
}

#[test]
fn reading_gray_from_color_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::new();
    let path = dir.path().join("color.mha");
    registry
        .write_rgba(&path, &sample_rgba(), Encoding::Raw)
        .unwrap();

    let err = registry.read_gray(&path).unwrap_err();
    assert!(matches!(
        err,
        VolumeIoError::ComponentMismatch {
            expected: 1,
            actual: 4
        }
    ));
}

#[test]
fn truncated_payload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("short.nrrd");
    std::fs::write(
        &path,
        b"NRRD0004\ntype: uchar\ndimension: 3\nsizes: 2 2 2\nencoding: raw\n\n\x01\x02\x03",
    )
    .unwrap();

    let err = FormatRegistry::new().read_gray(&path).unwrap_err();
    assert!(matches!(
        err,
        VolumeIoError::Truncated {
            expected: 8,
            actual: 3
        }
    ));
}

#[test]
fn ascii_vtk_written_by_hand() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hand.vtk");
    std::fs::write(
        &path,
        "# vtk DataFile Version 2.0\nhand written\nASCII\nDATASET STRUCTURED_POINTS\n\
         DIMENSIONS 2 2 1\nORIGIN 0 0 0\nSPACING 1 1 1\nPOINT_DATA 4\n\
         SCALARS density unsigned_char 1\nLOOKUP_TABLE default\n0 64\n128 255\n",
    )
    .unwrap();

    let gray = FormatRegistry::new().read_gray(&path).unwrap();
    assert_eq!(gray.shape(), [2, 2, 1]);
    assert_eq!(gray.data(), &[0, 64, 128, 255]);
}
