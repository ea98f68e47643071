//! 强度规范化与定长填充.

use std::path::Path;

use ndarray::{s, Array4, ArrayView, Ix3, Ix4, Zip};

use super::CroppedVolume;
use crate::consts::{INTENSITY_CEILING, TARGET_SHAPE};
use crate::sink::LogSink;
use crate::Idx3d;

/// 定长 `(217, 178, 60, 1)` 的模型输入张量.
#[derive(Debug, Clone, PartialEq)]
pub struct PaddedVolume {
    data: Array4<f32>,
    source_shape: Idx3d,
}

impl PaddedVolume {
    /// 张量视图, 形状恒为 `(217, 178, 60, 1)`.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix4> {
        self.data.view()
    }

    /// 去掉通道维后的三维视图.
    #[inline]
    pub fn spatial(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.slice(s![.., .., .., 0])
    }

    /// 填充前的数据形状.
    #[inline]
    pub fn source_shape(&self) -> Idx3d {
        self.source_shape
    }

    /// 填充前的数据是否在某一轴上超出目标形状 (超出部分已被截断).
    #[inline]
    pub fn is_truncated(&self) -> bool {
        exceeds_target(self.source_shape)
    }
}

/// `shape` 是否在任一轴上超出 [`TARGET_SHAPE`].
#[inline]
fn exceeds_target((x, y, z): Idx3d) -> bool {
    let (tx, ty, tz) = TARGET_SHAPE;
    x > tx || y > ty || z > tz
}

/// 单个体素的清洗: 非有限值为 0, 然后截断到 `[0, INTENSITY_CEILING]`.
#[inline]
fn clean(v: f32) -> f32 {
    if !v.is_finite() || v < 0.0 {
        0.0
    } else if v >= INTENSITY_CEILING {
        INTENSITY_CEILING
    } else {
        v
    }
}

/// 将 `data` 规范化并填充为 [`PaddedVolume`].
///
/// 1. NaN, 正负无穷替换为 0;
/// 2. 小于 0 的值置 0, 不小于 10000 的值置 10000;
/// 3. 追加长度为 1 的通道维;
/// 4. 复制到全零的 `(217, 178, 60, 1)` 张量的原点角. 超出目标形状的部分直接丢弃,
///   不做缩放, 以保持与原点对齐.
pub fn normalize(data: ArrayView<'_, f32, Ix3>) -> PaddedVolume {
    let source_shape = data.dim();
    let (tx, ty, tz) = TARGET_SHAPE;
    let (x, y, z) = (
        source_shape.0.min(tx),
        source_shape.1.min(ty),
        source_shape.2.min(tz),
    );

    let mut pad = Array4::<f32>::zeros((tx, ty, tz, 1));
    let zip = Zip::from(pad.slice_mut(s![..x, ..y, ..z, 0])).and(data.slice(s![..x, ..y, ..z]));
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            zip.par_for_each(|p, &v| *p = clean(v));
        } else {
            zip.for_each(|p, &v| *p = clean(v));
        }
    }

    PaddedVolume {
        data: pad,
        source_shape,
    }
}

/// 规范化组件. 对超出目标形状的输入给出警告, 然后继续处理.
#[derive(Debug, Copy, Clone, Default)]
pub struct ShapeNormalizer {
    sink: LogSink,
}

impl ShapeNormalizer {
    /// 以 `sink` 为日志出口创建.
    #[inline]
    pub fn new(sink: LogSink) -> Self {
        Self { sink }
    }

    /// 对来自 `source` 的 `data` 执行 [`normalize`].
    pub fn normalize(&self, data: ArrayView<'_, f32, Ix3>, source: &Path) -> PaddedVolume {
        if exceeds_target(data.dim()) {
            self.sink.warn(format_args!(
                "{} exceeds dimensions {:?}, truncated",
                source.display(),
                TARGET_SHAPE
            ));
        }
        normalize(data)
    }

    /// 规范化裁剪结果.
    #[inline]
    pub fn normalize_cropped(&self, cropped: &CroppedVolume) -> PaddedVolume {
        self.normalize(cropped.data(), cropped.source())
    }
}
