//! 体素索引到物理坐标的 4x4 affine 变换.

use nifti::NiftiHeader;

use crate::Idx3d;

/// 4x4 affine 矩阵, 行优先存储. 最后一行恒为 `[0, 0, 0, 1]`.
#[derive(Copy, Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Affine(pub [[f64; 4]; 4]);

impl Default for Affine {
    #[inline]
    fn default() -> Self {
        Self::identity()
    }
}

impl Affine {
    /// 单位矩阵.
    pub const fn identity() -> Self {
        Self([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// 从 header 推出最佳 affine:
    ///
    /// 1. `sform_code > 0` 时使用 `srow_{x, y, z}`;
    /// 2. 否则 `qform_code > 0` 时使用四元数 + 偏移 + `pixdim`;
    /// 3. 否则按体素尺寸构造, x 轴翻转, 原点位于数据中心.
    pub fn from_header(h: &NiftiHeader) -> Self {
        if h.sform_code > 0 {
            Self::from_sform(h)
        } else if h.qform_code > 0 {
            Self::from_qform(h)
        } else {
            Self::from_shape_zooms(h)
        }
    }

    fn from_sform(h: &NiftiHeader) -> Self {
        let row = |r: [f32; 4]| r.map(f64::from);
        Self([
            row(h.srow_x),
            row(h.srow_y),
            row(h.srow_z),
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    fn from_qform(h: &NiftiHeader) -> Self {
        let (b, c, d) = (
            f64::from(h.quatern_b),
            f64::from(h.quatern_c),
            f64::from(h.quatern_d),
        );
        // 存储精度误差可能让 a^2 略小于 0.
        let a = (1.0 - (b * b + c * c + d * d)).max(0.0).sqrt();
        let rot = [
            [
                a * a + b * b - c * c - d * d,
                2.0 * (b * c - a * d),
                2.0 * (b * d + a * c),
            ],
            [
                2.0 * (b * c + a * d),
                a * a + c * c - b * b - d * d,
                2.0 * (c * d - a * b),
            ],
            [
                2.0 * (b * d - a * c),
                2.0 * (c * d + a * b),
                a * a + d * d - b * b - c * c,
            ],
        ];
        let qfac = if h.pixdim[0] < 0.0 { -1.0 } else { 1.0 };
        let zooms = [
            f64::from(h.pixdim[1]),
            f64::from(h.pixdim[2]),
            f64::from(h.pixdim[3]) * qfac,
        ];
        let offset = [
            f64::from(h.quatern_x),
            f64::from(h.quatern_y),
            f64::from(h.quatern_z),
        ];

        let mut m = Self::identity().0;
        for i in 0..3 {
            for j in 0..3 {
                m[i][j] = rot[i][j] * zooms[j];
            }
            m[i][3] = offset[i];
        }
        Self(m)
    }

    fn from_shape_zooms(h: &NiftiHeader) -> Self {
        let mut m = Self::identity().0;
        for i in 0..3 {
            let mut zoom = f64::from(h.pixdim[i + 1]);
            if zoom == 0.0 {
                zoom = 1.0;
            }
            if i == 0 {
                zoom = -zoom;
            }
            let center = (f64::from(h.dim[i + 1].max(1)) - 1.0) / 2.0;
            m[i][i] = zoom;
            m[i][3] = -center * zoom;
        }
        Self(m)
    }

    /// 平移部分.
    #[inline]
    pub fn translation(&self) -> [f64; 3] {
        [self.0[0][3], self.0[1][3], self.0[2][3]]
    }

    /// 计算 `self * [x, y, z, 1]` 的前三个分量.
    pub fn apply_point(&self, p: [f64; 3]) -> [f64; 3] {
        let m = &self.0;
        [0, 1, 2].map(|i| m[i][0] * p[0] + m[i][1] * p[1] + m[i][2] * p[2] + m[i][3])
    }

    /// 体素索引 `(x, y, z)` 对应的物理坐标.
    #[inline]
    pub fn apply(&self, (x, y, z): Idx3d) -> [f64; 3] {
        self.apply_point([x as f64, y as f64, z as f64])
    }

    /// 将原点移动到体素 `origin` 处: 新平移部分为 `self * [origin, 1]`, 线性部分不变.
    ///
    /// 所得矩阵把 `(0, 0, 0)` 映射到 `self` 映射 `origin` 所得的同一物理点.
    pub fn translated_to(&self, origin: Idx3d) -> Self {
        let t = self.apply(origin);
        let mut m = self.0;
        for (row, v) in m.iter_mut().zip(t) {
            row[3] = v;
        }
        Self(m)
    }

    /// 将该矩阵写入 `header` 的 sform (`sform_code` 为 0 时设为 2, 即 aligned).
    /// 若 qform 有效, 则只更新它的偏移, 旋转与缩放保持不变.
    pub fn write_into(&self, header: &mut NiftiHeader) {
        let row = |i: usize| self.0[i].map(|v| v as f32);
        header.srow_x = row(0);
        header.srow_y = row(1);
        header.srow_z = row(2);
        if header.sform_code <= 0 {
            header.sform_code = 2;
        }
        if header.qform_code > 0 {
            let [x, y, z] = self.translation();
            (header.quatern_x, header.quatern_y, header.quatern_z) = (x as f32, y as f32, z as f32);
        }
    }
}
