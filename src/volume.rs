use crate::error::OcclusionError;

/// 体数据结构
/// 表示三维规则网格上的体素数据，体素类型由 `T` 决定
#[derive(Debug, Clone, PartialEq)]
pub struct Volume<T> {
    /// 网格维度 [nx, ny, nz]
    shape: [usize; 3],
    /// 体素间距，只在读写文件时保留，不参与计算
    spacing: [f64; 3],
    /// 原点坐标，同上
    origin: [f64; 3],
    /// 数据数组，x 变化最快，y 其次，z 最慢
    /// 索引计算: index = k * nx * ny + j * nx + i
    data: Vec<T>,
}

/// 单通道 8 位灰度体（输入体与 alpha 体）
pub type GrayVolume = Volume<u8>;
/// 三通道 RGB 体
pub type RgbVolume = Volume<[u8; 3]>;
/// 四通道 RGBA 体
pub type RgbaVolume = Volume<[u8; 4]>;
/// 卷积得到的浮点遮挡图
pub type OcclusionMap = Volume<f64>;

/// 检查维度是否合法（每个维度至少为 1），返回体素总数
pub fn voxel_count(shape: [usize; 3]) -> Result<usize, OcclusionError> {
    if shape.iter().any(|&n| n == 0) {
        return Err(OcclusionError::InvalidVolume { shape });
    }
    shape
        .iter()
        .try_fold(1usize, |acc, &n| acc.checked_mul(n))
        .ok_or(OcclusionError::InvalidVolume { shape })
}

impl<T> Volume<T> {
    /// 创建新的体数据，间距默认为 1，原点默认为 0
    pub fn new(shape: [usize; 3], data: Vec<T>) -> Result<Self, OcclusionError> {
        let expected = voxel_count(shape)?;

        if data.len() != expected {
            return Err(OcclusionError::DataLength {
                shape,
                expected,
                actual: data.len(),
            });
        }

        Ok(Volume {
            shape,
            spacing: [1.0; 3],
            origin: [0.0; 3],
            data,
        })
    }

    /// 用同一个值填满整个体
    pub fn filled(shape: [usize; 3], value: T) -> Result<Self, OcclusionError>
    where
        T: Clone,
    {
        let len = voxel_count(shape)?;
        Self::new(shape, vec![value; len])
    }

    /// 按坐标生成体数据
    pub fn from_fn(
        shape: [usize; 3],
        mut f: impl FnMut(usize, usize, usize) -> T,
    ) -> Result<Self, OcclusionError> {
        let len = voxel_count(shape)?;
        let mut data = Vec::with_capacity(len);
        for k in 0..shape[2] {
            for j in 0..shape[1] {
                for i in 0..shape[0] {
                    data.push(f(i, j, k));
                }
            }
        }
        Self::new(shape, data)
    }

    pub fn with_spacing(mut self, spacing: [f64; 3]) -> Self {
        self.spacing = spacing;
        self
    }

    pub fn with_origin(mut self, origin: [f64; 3]) -> Self {
        self.origin = origin;
        self
    }

    /// 复制另一个体的几何信息（间距、原点）
    pub fn with_geometry_of<U>(self, other: &Volume<U>) -> Self {
        self.with_spacing(other.spacing).with_origin(other.origin)
    }

    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    pub fn spacing(&self) -> [f64; 3] {
        self.spacing
    }

    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// 获取整个数据切片
    pub fn data(&self) -> &[T] {
        &self.data
    }

    pub fn into_data(self) -> Vec<T> {
        self.data
    }

    pub fn index(&self, i: usize, j: usize, k: usize) -> usize {
        i + self.shape[0] * (j + self.shape[1] * k)
    }

    pub fn get(&self, i: usize, j: usize, k: usize) -> Option<&T> {
        if i >= self.shape[0] || j >= self.shape[1] || k >= self.shape[2] {
            return None;
        }
        self.data.get(self.index(i, j, k))
    }

    /// 两个体的维度必须一致
    pub fn ensure_same_shape<U>(&self, other: &Volume<U>) -> Result<(), OcclusionError> {
        if self.shape != other.shape {
            return Err(OcclusionError::DimensionMismatch {
                expected: self.shape,
                actual: other.shape,
            });
        }
        Ok(())
    }

    /// 逐体素映射为新的体，保留几何信息
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Volume<U> {
        Volume {
            shape: self.shape,
            spacing: self.spacing,
            origin: self.origin,
            data: self.data.iter().map(f).collect(),
        }
    }
}
