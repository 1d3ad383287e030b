use std::sync::Arc;

use clap::ValueEnum;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::Serialize;

use super::kernel::Kernel;
use crate::error::OcclusionError;
use crate::volume::{GrayVolume, OcclusionMap, Volume, voxel_count};

/// 体外采样策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BoundaryCondition {
    /// 取最近的边界体素（零通量 Neumann 边界）
    #[default]
    Replicate,
    /// 体外一律为 0
    Zero,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConvolutionMethod {
    /// 频域卷积（FFT），适合大体数据
    #[default]
    Fft,
    /// 直接空间域卷积
    Spatial,
}

/// 三维线性卷积，输出与输入同尺寸
///
/// 输出 o[x] = Σ_q w[q] · f(x + r - q)，体外的 f 由 `boundary` 决定。
/// 两种方法在浮点误差范围内结果一致。
pub fn convolve(
    input: &Volume<f64>,
    kernel: &Kernel,
    boundary: BoundaryCondition,
    method: ConvolutionMethod,
) -> Result<OcclusionMap, OcclusionError> {
    let data = match method {
        ConvolutionMethod::Fft => convolve_fft(input, kernel, boundary)?,
        ConvolutionMethod::Spatial => convolve_spatial(input, kernel, boundary)?,
    };
    Ok(Volume::new(input.shape(), data)?.with_geometry_of(input))
}

/// 将越界坐标映射回体内，Zero 边界下越界返回 None
fn resolve(coord: isize, n: usize, boundary: BoundaryCondition) -> Option<usize> {
    if (0..n as isize).contains(&coord) {
        return Some(coord as usize);
    }
    match boundary {
        BoundaryCondition::Replicate => Some(coord.clamp(0, n as isize - 1) as usize),
        BoundaryCondition::Zero => None,
    }
}

fn try_alloc<T: Clone>(len: usize, fill: T) -> Result<Vec<T>, OcclusionError> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|e| {
        OcclusionError::Convolution(format!("无法分配 {len} 个元素的工作缓冲区: {e}"))
    })?;
    buf.resize(len, fill);
    Ok(buf)
}

/// 把 8 位灰度体转成浮点体，缓冲区分配失败时返回错误而不是中止进程
pub fn widen(image: &GrayVolume) -> Result<Volume<f64>, OcclusionError> {
    let mut values = try_alloc(image.len(), 0.0)?;
    for (dst, &src) in values.iter_mut().zip(image.data()) {
        *dst = f64::from(src);
    }
    Ok(Volume::new(image.shape(), values)?.with_geometry_of(image))
}

fn convolve_spatial(
    input: &Volume<f64>,
    kernel: &Kernel,
    boundary: BoundaryCondition,
) -> Result<Vec<f64>, OcclusionError> {
    let [nx, ny, nz] = input.shape();
    let r = kernel.radius() as isize;
    let size = kernel.size();

    // 只保留非零权重，偏移量为 r - q
    let mut taps = Vec::new();
    for c in 0..size {
        for b in 0..size {
            for a in 0..size {
                let w = kernel.get(a, b, c);
                if w != 0.0 {
                    taps.push((r - a as isize, r - b as isize, r - c as isize, w));
                }
            }
        }
    }

    let data = input.data();
    let mut out = try_alloc(data.len(), 0.0)?;
    for k in 0..nz {
        for j in 0..ny {
            for i in 0..nx {
                let mut acc = 0.0;
                for &(di, dj, dk, w) in &taps {
                    let (Some(x), Some(y), Some(z)) = (
                        resolve(i as isize + di, nx, boundary),
                        resolve(j as isize + dj, ny, boundary),
                        resolve(k as isize + dk, nz, boundary),
                    ) else {
                        continue;
                    };
                    acc += w * data[x + nx * (y + ny * z)];
                }
                out[i + nx * (j + ny * k)] = acc;
            }
        }
    }
    Ok(out)
}

/// 不小于 n 且只含 2、3、5 因子的最小长度
pub fn next_smooth_len(n: usize) -> usize {
    let mut candidate = n.max(1);
    loop {
        let mut m = candidate;
        for p in [2, 3, 5] {
            while m % p == 0 {
                m /= p;
            }
        }
        if m == 1 {
            return candidate;
        }
        candidate += 1;
    }
}

/// 单次频域卷积的工作区，计算结束（或失败）时随作用域一起释放
struct FftWorkspace {
    dims: [usize; 3],
    forward: [Arc<dyn Fft<f64>>; 3],
    inverse: [Arc<dyn Fft<f64>>; 3],
    signal: Vec<Complex<f64>>,
    kernel: Vec<Complex<f64>>,
    line: Vec<Complex<f64>>,
    /// 所有计划共用的原地变换暂存区
    scratch: Vec<Complex<f64>>,
}

impl FftWorkspace {
    fn allocate(dims: [usize; 3], planner: &mut FftPlanner<f64>) -> Result<Self, OcclusionError> {
        let len = voxel_count(dims).map_err(|_| {
            OcclusionError::Convolution(format!("补零后的尺寸 {dims:?} 超出可寻址范围"))
        })?;
        let forward = dims.map(|n| planner.plan_fft_forward(n));
        let inverse = dims.map(|n| planner.plan_fft_inverse(n));
        let scratch_len = forward
            .iter()
            .chain(&inverse)
            .map(|plan| plan.get_inplace_scratch_len())
            .max()
            .unwrap_or(0);

        let zero = Complex::new(0.0, 0.0);
        Ok(Self {
            dims,
            forward,
            inverse,
            signal: try_alloc(len, zero)?,
            kernel: try_alloc(len, zero)?,
            line: try_alloc(dims[1].max(dims[2]), zero)?,
            scratch: try_alloc(scratch_len, zero)?,
        })
    }

    fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.dims[0] * (j + self.dims[1] * k)
    }

    /// 对 signal 与 kernel 做正变换，相乘后逆变换回 signal
    fn multiply_spectra(&mut self) {
        let Self {
            dims,
            forward,
            inverse,
            signal,
            kernel,
            line,
            scratch,
        } = self;

        transform(signal, line, scratch, *dims, forward);
        transform(kernel, line, scratch, *dims, forward);

        for (s, k) in signal.iter_mut().zip(kernel.iter()) {
            *s *= *k;
        }

        transform(signal, line, scratch, *dims, inverse);
    }
}

/// 沿三个轴依次做一维 FFT
fn transform(
    buf: &mut [Complex<f64>],
    line: &mut [Complex<f64>],
    scratch: &mut [Complex<f64>],
    dims: [usize; 3],
    plans: &[Arc<dyn Fft<f64>>; 3],
) {
    let [lx, ly, lz] = dims;

    // x 轴数据连续，按块处理
    plans[0].process_with_scratch(buf, scratch);

    let line_y = &mut line[..ly];
    for k in 0..lz {
        for i in 0..lx {
            let base = i + lx * ly * k;
            for (j, v) in line_y.iter_mut().enumerate() {
                *v = buf[base + lx * j];
            }
            plans[1].process_with_scratch(line_y, scratch);
            for (j, v) in line_y.iter().enumerate() {
                buf[base + lx * j] = *v;
            }
        }
    }

    let line_z = &mut line[..lz];
    let plane = lx * ly;
    for base in 0..plane {
        for (k, v) in line_z.iter_mut().enumerate() {
            *v = buf[base + plane * k];
        }
        plans[2].process_with_scratch(line_z, scratch);
        for (k, v) in line_z.iter().enumerate() {
            buf[base + plane * k] = *v;
        }
    }
}

fn convolve_fft(
    input: &Volume<f64>,
    kernel: &Kernel,
    boundary: BoundaryCondition,
) -> Result<Vec<f64>, OcclusionError> {
    let shape = input.shape();
    let r = kernel.radius();
    let ksize = kernel.size();

    // 每侧按边界策略扩展 r，再补零到 2·3·5 平滑长度；
    // 保留的输出下标为 2r..2r+n，循环卷积的回绕不会落到这一段
    let padded = shape.map(|n| n + 2 * r);
    let dims = padded.map(next_smooth_len);

    let mut planner = FftPlanner::new();
    let mut workspace = FftWorkspace::allocate(dims, &mut planner)?;

    let data = input.data();
    let [nx, ny, _] = shape;
    for s in 0..padded[2] {
        let Some(z) = resolve(s as isize - r as isize, shape[2], boundary) else {
            continue;
        };
        for q in 0..padded[1] {
            let Some(y) = resolve(q as isize - r as isize, shape[1], boundary) else {
                continue;
            };
            for p in 0..padded[0] {
                let Some(x) = resolve(p as isize - r as isize, shape[0], boundary) else {
                    continue;
                };
                let idx = workspace.index(p, q, s);
                workspace.signal[idx] = Complex::new(data[x + nx * (y + ny * z)], 0.0);
            }
        }
    }

    for c in 0..ksize {
        for b in 0..ksize {
            for a in 0..ksize {
                let idx = workspace.index(a, b, c);
                workspace.kernel[idx] = Complex::new(kernel.get(a, b, c), 0.0);
            }
        }
    }

    workspace.multiply_spectra();

    // rustfft 的逆变换不做归一化
    let scale = 1.0 / workspace.signal.len() as f64;
    let mut out = try_alloc(data.len(), 0.0)?;
    for k in 0..shape[2] {
        for j in 0..shape[1] {
            for i in 0..shape[0] {
                let idx = workspace.index(i + 2 * r, j + 2 * r, k + 2 * r);
                out[i + nx * (j + ny * k)] = workspace.signal[idx].re * scale;
            }
        }
    }
    Ok(out)
}
