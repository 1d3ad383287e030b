//! 命令行处理流程：读文件、计算 alpha、合成、写文件

use occlusion_rgba::cli::{OcclusionConfig, run_create_rgba, run_rgb_to_rgba};
use occlusion_rgba::{
    DEGENERATE_ALPHA, Encoding, FormatRegistry, GrayVolume, OcclusionError, RgbVolume, RgbaVolume,
    Volume,
};

fn step_gray(shape: [usize; 3]) -> GrayVolume {
    Volume::from_fn(shape, |i, _, _| if i < shape[0] / 2 { 0 } else { 255 }).unwrap()
}

fn gradient_rgb(shape: [usize; 3]) -> RgbVolume {
    Volume::from_fn(shape, |i, j, k| [(i * 10) as u8, (j * 30) as u8, (k * 50) as u8])
        .unwrap()
        .with_spacing([1.0, 1.0, 1.5])
}

#[test]
fn create_rgba_keeps_color_and_stretches_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::new();
    let shape = [20, 4, 4];

    let gray_path = dir.path().join("gray.nrrd");
    let rgb_path = dir.path().join("rgb.mha");
    let out_path = dir.path().join("rgba.mhd");
    let stats_path = dir.path().join("stats.json");

    let rgb = gradient_rgb(shape);
    registry
        .write_gray(&gray_path, &step_gray(shape), Encoding::Raw)
        .unwrap();
    registry.write_rgb(&rgb_path, &rgb, Encoding::Compressed).unwrap();

    let config = OcclusionConfig {
        stats_json: Some(stats_path.clone()),
        ..OcclusionConfig::default()
    };
    let stats = run_create_rgba(&gray_path, &rgb_path, &out_path, &config).unwrap();
    assert_eq!(stats.radius, 1);
    assert!(!stats.degenerate);

    let rgba: RgbaVolume = registry.read_volume(&out_path).unwrap();
    assert_eq!(rgba.shape(), shape);
    assert_eq!(rgba.spacing(), [1.0, 1.0, 1.5]);
    for (out, input) in rgba.data().iter().zip(rgb.data()) {
        assert_eq!(&out[..3], &input[..]);
    }
    let alphas: Vec<u8> = rgba.data().iter().map(|px| px[3]).collect();
    assert_eq!(alphas.iter().min(), Some(&0));
    assert_eq!(alphas.iter().max(), Some(&255));

    let report: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&stats_path).unwrap()).unwrap();
    assert_eq!(report["radius"], 1);
    assert_eq!(report["map_type"], "linear");
    assert_eq!(report["boundary"], "replicate");
    assert_eq!(report["shape"], serde_json::json!([20, 4, 4]));
}

#[test]
fn mismatched_inputs_are_rejected_before_writing() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::new();

    let gray_path = dir.path().join("gray.mha");
    let rgb_path = dir.path().join("rgb.mha");
    let out_path = dir.path().join("rgba.mha");
    registry
        .write_gray(&gray_path, &step_gray([20, 4, 4]), Encoding::Raw)
        .unwrap();
    registry
        .write_rgb(&rgb_path, &gradient_rgb([20, 4, 5]), Encoding::Raw)
        .unwrap();

    let err = run_create_rgba(&gray_path, &rgb_path, &out_path, &OcclusionConfig::default())
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<OcclusionError>(),
        Some(OcclusionError::DimensionMismatch {
            expected: [20, 4, 4],
            actual: [20, 4, 5],
        })
    ));
    assert!(!out_path.exists());
}

#[test]
fn rgb2rgba_derives_gray_from_luminance() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::new();
    let shape = [16, 8, 6];

    let rgb = Volume::from_fn(shape, |i, _, _| if i < 8 { [0, 0, 0] } else { [200, 180, 90] })
        .unwrap();
    let rgb_path = dir.path().join("rgb.vtk");
    let out_path = dir.path().join("rgba.nhdr");
    registry.write_rgb(&rgb_path, &rgb, Encoding::Raw).unwrap();

    let stats = run_rgb_to_rgba(&rgb_path, &out_path, &OcclusionConfig::default()).unwrap();
    assert!(!stats.degenerate);

    let rgba: RgbaVolume = registry.read_volume(&out_path).unwrap();
    assert_eq!(rgba.get(0, 0, 0), Some(&[0, 0, 0, 0]));
    assert_eq!(rgba.get(15, 7, 5), Some(&[200, 180, 90, 255]));
}

#[test]
fn flat_rgb_volume_gets_fallback_alpha() {
    let dir = tempfile::tempdir().unwrap();
    let registry = FormatRegistry::new();

    let rgb = RgbVolume::filled([3, 3, 3], [100, 100, 100]).unwrap();
    let rgb_path = dir.path().join("flat.nrrd");
    let out_path = dir.path().join("flat_rgba.nrrd");
    registry.write_rgb(&rgb_path, &rgb, Encoding::Raw).unwrap();

    let stats = run_rgb_to_rgba(&rgb_path, &out_path, &OcclusionConfig::default()).unwrap();
    assert!(stats.degenerate);
    assert_eq!(stats.radius, 0);

    let rgba: RgbaVolume = registry.read_volume(&out_path).unwrap();
    assert!(rgba.data().iter().all(|px| px[3] == DEGENERATE_ALPHA));
}
