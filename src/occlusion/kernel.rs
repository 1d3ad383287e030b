use super::MapType;

/// 球形加权核，边长为 2 * radius + 1
/// 数据布局与体数据相同（x 变化最快）
#[derive(Debug, Clone, PartialEq)]
pub struct Kernel {
    radius: usize,
    weights: Vec<f64>,
    inside_count: usize,
}

/// 构建球形核
///
/// 球外（d² > r²）权重为 0；球内权重为 1（Linear）或 exp(-d²)（Exponential）。
/// 填充完成后，所有权重除以球内体素的**个数**而不是权重之和，
/// 因此 Exponential 核的总和一般不等于 1。
pub fn build(radius: usize, map_type: MapType) -> Kernel {
    let size = 2 * radius + 1;
    let r = radius as i64;
    let r2 = r * r;

    let mut weights = Vec::with_capacity(size * size * size);
    let mut inside_count = 0usize;

    for k in 0..size as i64 {
        for j in 0..size as i64 {
            for i in 0..size as i64 {
                let (ii, jj, kk) = (i - r, j - r, k - r);
                let dist2 = ii * ii + jj * jj + kk * kk;
                if dist2 > r2 {
                    weights.push(0.0);
                } else {
                    weights.push(match map_type {
                        MapType::Linear => 1.0,
                        MapType::Exponential => (-(dist2 as f64)).exp(),
                    });
                    inside_count += 1;
                }
            }
        }
    }

    // 中心点总在球内，inside_count >= 1
    let norm = inside_count as f64;
    for w in &mut weights {
        *w /= norm;
    }

    Kernel {
        radius,
        weights,
        inside_count,
    }
}

impl Kernel {
    pub fn radius(&self) -> usize {
        self.radius
    }

    /// 边长
    pub fn size(&self) -> usize {
        2 * self.radius + 1
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> f64 {
        let size = self.size();
        self.weights[i + size * (j + size * k)]
    }

    /// 球内体素个数
    pub fn inside_count(&self) -> usize {
        self.inside_count
    }

    pub fn sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}
