use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::MapType;
use super::convolution::{BoundaryCondition, ConvolutionMethod, convolve, widen};
use super::kernel;
use crate::error::OcclusionError;
use crate::volume::{GrayVolume, OcclusionMap, voxel_count};

/// 遮挡图为常数（max == min）时 alpha 通道的取值
pub const DEGENERATE_ALPHA: u8 = 0;

/// 相对容差：max - min 不超过该比例时视为常数遮挡图（吸收 FFT 舍入误差）
pub const DEGENERATE_TOLERANCE: f64 = 1e-9;

/// 由体数据维度推导球形核半径：round(0.1 * (nx + ny + nz) / 3)
/// 半径应能覆盖体数据中物体的典型尺寸
pub fn derive_radius(shape: [usize; 3]) -> usize {
    let sum = shape.iter().sum::<usize>() as f64;
    (0.1 * sum / 3.0).round() as usize
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// 仅保存了输入体和半径
    Constructed,
    /// 遮挡图已计算，可通过 `occlusion_map` 读取
    Computed,
    /// 已归一化为 alpha 通道，遮挡图已释放
    Normalized,
}

/// 一次 alpha 计算的统计信息
#[derive(Debug, Clone, Serialize)]
pub struct OcclusionStats {
    pub shape: [usize; 3],
    pub radius: usize,
    pub map_type: MapType,
    pub boundary: BoundaryCondition,
    pub method: ConvolutionMethod,
    pub occ_min: f64,
    pub occ_max: f64,
    /// 是否走了常数遮挡图的回退分支
    pub degenerate: bool,
    pub elapsed_ms: u64,
}

/// 遮挡谱引擎
///
/// 借用输入灰度体，按维度推导半径，构建球形核并做三维卷积，
/// 再把卷积结果线性拉伸到 [0, 255] 作为 alpha 通道。
/// 同一个实例只能顺序使用（方法都需要 `&mut self`）。
pub struct OcclusionEngine<'a> {
    image: &'a GrayVolume,
    radius: usize,
    boundary: BoundaryCondition,
    method: ConvolutionMethod,
    /// 在 `compute_occlusion_map` 完成之前为 None
    occlusion: Option<OcclusionMap>,
    state: EngineState,
}

impl<'a> OcclusionEngine<'a> {
    pub fn new(image: &'a GrayVolume) -> Result<Self, OcclusionError> {
        let shape = image.shape();
        voxel_count(shape)?;
        let radius = derive_radius(shape);
        debug!(?shape, radius, "遮挡引擎初始化");

        Ok(Self {
            image,
            radius,
            boundary: BoundaryCondition::default(),
            method: ConvolutionMethod::default(),
            occlusion: None,
            state: EngineState::Constructed,
        })
    }

    /// 覆盖自动推导的半径
    pub fn with_radius(mut self, radius: usize) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_boundary(mut self, boundary: BoundaryCondition) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn with_method(mut self, method: ConvolutionMethod) -> Self {
        self.method = method;
        self
    }

    pub fn radius(&self) -> usize {
        self.radius
    }

    pub fn shape(&self) -> [usize; 3] {
        self.image.shape()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn occlusion_map(&self) -> Option<&OcclusionMap> {
        self.occlusion.as_ref()
    }

    fn run_convolution(&self, map_type: MapType) -> Result<OcclusionMap, OcclusionError> {
        let kernel = kernel::build(self.radius, map_type);
        debug!(
            radius = self.radius,
            size = kernel.size(),
            inside = kernel.inside_count(),
            "球形核已构建"
        );

        let input = widen(self.image)?;
        convolve(&input, &kernel, self.boundary, self.method)
    }

    /// 计算浮点遮挡图，每次调用都从头计算
    pub fn compute_occlusion_map(
        &mut self,
        map_type: MapType,
    ) -> Result<&OcclusionMap, OcclusionError> {
        self.occlusion = None;
        self.state = EngineState::Constructed;

        let map = self.run_convolution(map_type)?;
        self.state = EngineState::Computed;
        Ok(&*self.occlusion.insert(map))
    }

    /// 以 Linear 核计算 alpha 通道
    pub fn compute_default_alpha_channel(
        &mut self,
    ) -> Result<(GrayVolume, OcclusionStats), OcclusionError> {
        self.compute_alpha_channel(MapType::default())
    }

    /// 计算遮挡图并归一化为 8 位 alpha 通道
    ///
    /// 映射规则为 round((v - min) * 255 / (max - min))，结果截断到 [0, 255]。
    /// 遮挡图为常数（在 [`DEGENERATE_TOLERANCE`] 范围内）时无法拉伸，
    /// 所有体素取 [`DEGENERATE_ALPHA`]。
    pub fn compute_alpha_channel(
        &mut self,
        map_type: MapType,
    ) -> Result<(GrayVolume, OcclusionStats), OcclusionError> {
        let start = Instant::now();

        self.compute_occlusion_map(map_type)?;
        let Some(map) = self.occlusion.take() else {
            return Err(OcclusionError::Convolution("遮挡图缺失".to_string()));
        };

        let (occ_min, occ_max) = value_range(&map);
        info!("[遮挡] Min = {occ_min:.6}, Max = {occ_max:.6}");

        let (alpha, degenerate) = normalize(&map, occ_min, occ_max);
        if degenerate {
            warn!(
                value = occ_min,
                fallback = DEGENERATE_ALPHA,
                "遮挡图为常数，无法拉伸到 [0, 255]，使用固定 alpha"
            );
        }
        self.state = EngineState::Normalized;

        let stats = OcclusionStats {
            shape: self.image.shape(),
            radius: self.radius,
            map_type,
            boundary: self.boundary,
            method: self.method,
            occ_min,
            occ_max,
            degenerate,
            elapsed_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            radius = stats.radius,
            elapsed_ms = stats.elapsed_ms,
            "[遮挡] alpha 通道计算完成"
        );
        Ok((alpha, stats))
    }
}

/// 单次线性扫描求最小值与最大值
fn value_range(map: &OcclusionMap) -> (f64, f64) {
    map.data()
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

fn normalize(map: &OcclusionMap, occ_min: f64, occ_max: f64) -> (GrayVolume, bool) {
    let range = occ_max - occ_min;
    let scale = occ_min.abs().max(occ_max.abs()).max(1.0);
    if !(range.is_finite() && range > DEGENERATE_TOLERANCE * scale) {
        return (map.map(|_| DEGENERATE_ALPHA), true);
    }

    let factor = 255.0 / range;
    let alpha = map.map(|&v| ((v - occ_min) * factor).round().clamp(0.0, 255.0) as u8);
    (alpha, false)
}
