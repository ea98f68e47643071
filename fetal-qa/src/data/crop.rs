//! 前景包围盒裁剪.

use std::path::{Path, PathBuf};

use ndarray::{s, Array3, ArrayView, Ix3};
use nifti::writer::WriterOptions;
use nifti::NiftiHeader;

use super::{Affine, BoxedHeader, MriVolume, NiftiHeaderAttr};
use crate::consts::CROP_SUFFIX;
use crate::Idx3d;

/// 裁剪错误. 两种情况都意味着体数据没有可评分的前景.
#[derive(Copy, Clone, Debug, PartialEq, thiserror::Error)]
pub enum CropError {
    /// 不存在强度严格为正的体素, 包围盒无定义.
    #[error("volume has no voxel with positive intensity")]
    NoForeground,

    /// 包围盒在某一轴上的跨度为 0. 由于上界不包含在裁剪结果中,
    /// 前景只有一层厚时会出现这种情况.
    #[error("foreground bounding box {0:?} yields an empty crop")]
    Degenerate(BoundingBox),
}

/// 前景体素的轴对齐包围盒.
///
/// `lower` 与 `upper` 分别为各轴上前景体素索引的最小值和最大值 (均为闭区间端点).
/// 但裁剪时使用半开区间 `lower..upper`, 即 **不包含** `upper` 这一层.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BoundingBox {
    /// 各轴最小前景索引.
    pub lower: Idx3d,

    /// 各轴最大前景索引.
    pub upper: Idx3d,
}

impl BoundingBox {
    /// 计算 `data` 中所有强度 `> 0` 体素的包围盒. 不存在这样的体素时返回 `None`.
    ///
    /// NaN 不算前景.
    pub fn of_foreground(data: ArrayView<'_, f32, Ix3>) -> Option<Self> {
        data.indexed_iter()
            .filter(|(_, &v)| v > 0.0)
            .fold(None, |acc, ((x, y, z), _)| {
                Some(match acc {
                    None => Self {
                        lower: (x, y, z),
                        upper: (x, y, z),
                    },
                    Some(Self { lower, upper }) => Self {
                        lower: (lower.0.min(x), lower.1.min(y), lower.2.min(z)),
                        upper: (upper.0.max(x), upper.1.max(y), upper.2.max(z)),
                    },
                })
            })
    }

    /// 裁剪结果的形状 `upper - lower`.
    #[inline]
    pub fn crop_shape(&self) -> Idx3d {
        (
            self.upper.0 - self.lower.0,
            self.upper.1 - self.lower.1,
            self.upper.2 - self.lower.2,
        )
    }

    /// 裁剪结果是否为空.
    #[inline]
    pub fn is_degenerate(&self) -> bool {
        let (x, y, z) = self.crop_shape();
        x == 0 || y == 0 || z == 0
    }

    /// 索引 `pos` 是否落在半开区间 `lower..upper` 内.
    #[inline]
    pub fn contains(&self, (x, y, z): Idx3d) -> bool {
        (self.lower.0..self.upper.0).contains(&x)
            && (self.lower.1..self.upper.1).contains(&y)
            && (self.lower.2..self.upper.2).contains(&z)
    }
}

/// 裁剪后的 3D MRI 体数据. 保留原 header, affine 的原点已移动到裁剪角点.
#[derive(Debug, Clone)]
pub struct CroppedVolume {
    source: PathBuf,
    header: BoxedHeader,
    data: Array3<f32>,
    affine: Affine,
    bbox: BoundingBox,
}

impl NiftiHeaderAttr for CroppedVolume {
    /// 原体数据的 header.
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }

    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }

    /// 调整后的 affine.
    #[inline]
    fn best_affine(&self) -> Affine {
        self.affine
    }
}

/// 裁剪实现块
impl MriVolume {
    /// 裁剪到前景包围盒.
    ///
    /// 裁剪区间为 `[x1, x2) x [y1, y2) x [z1, z2)`, 其中 `x1`/`x2` 为前景最小/最大索引.
    /// 新 affine 由 **原** affine 在 `(x1, y1, z1)` 处平移得到.
    ///
    /// # 返回值
    ///
    /// - 没有正强度体素时返回 `Err(CropError::NoForeground)`;
    /// - 裁剪结果在某一轴上为空时返回 `Err(CropError::Degenerate)`;
    /// - 其他情况下返回 `Ok(CroppedVolume)`.
    pub fn crop(&self) -> Result<CroppedVolume, CropError> {
        let bbox = BoundingBox::of_foreground(self.data()).ok_or(CropError::NoForeground)?;
        if bbox.is_degenerate() {
            return Err(CropError::Degenerate(bbox));
        }
        let (l, u) = (bbox.lower, bbox.upper);
        let data = self
            .data
            .slice(s![l.0..u.0, l.1..u.1, l.2..u.2])
            .to_owned();

        Ok(CroppedVolume {
            source: self.path().to_owned(),
            header: self.header.clone(),
            data,
            affine: self.affine().translated_to(l),
            bbox,
        })
    }
}

impl CroppedVolume {
    /// 不裁剪, 直接以整个体数据构造. 用于已经裁剪过的输入.
    pub fn whole(volume: &MriVolume) -> Self {
        let shape = volume.shape();
        Self {
            source: volume.path().to_owned(),
            header: volume.header.clone(),
            data: volume.data.clone(),
            affine: *volume.affine(),
            bbox: BoundingBox {
                lower: (0, 0, 0),
                upper: shape,
            },
        }
    }

    /// 原体数据的路径.
    #[inline]
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// 调整后的 affine.
    #[inline]
    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    /// 裁剪所用包围盒 (在原体数据中的坐标).
    #[inline]
    pub fn bounding_box(&self) -> BoundingBox {
        self.bbox
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }

    /// 以原文件名插入 `_crop` 后缀, 保存到目录 `folder` 下. 返回写出的路径.
    ///
    /// 写出的 header 以原 header 为模板, sform (以及 qform 的偏移) 更新为调整后的 affine.
    pub fn save_into<P: AsRef<Path>>(&self, folder: P) -> nifti::Result<PathBuf> {
        let dest = folder.as_ref().join(cropped_file_name(&self.source));
        let mut header = self.header.clone();
        self.affine.write_into(&mut header);
        WriterOptions::new(&dest)
            .reference_header(&header)
            .write_nifti(&self.data)?;
        Ok(dest)
    }
}

/// 在 `path` 文件名的 `.nii` 前插入 `_crop`: `a.nii` -> `a_crop.nii`,
/// `a.nii.gz` -> `a_crop.nii.gz`. 文件名不含 `.nii` 时插入到最后一个扩展名前.
pub fn cropped_file_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let at = name
        .find(".nii")
        .or_else(|| name.rfind('.').filter(|&i| i > 0))
        .unwrap_or(name.len());
    format!("{}{CROP_SUFFIX}{}", &name[..at], &name[at..])
}

#[cfg(test)]
mod tests {
    use super::{cropped_file_name, BoundingBox, CropError};
    use crate::data::testing::{header_with, write_nii};
    use crate::{MriVolume, NiftiHeaderAttr};
    use ndarray::Array3;
    use std::path::Path;

    fn volume(data: Array3<f32>) -> MriVolume {
        let header = header_with([1.0, 1.0, 3.0], [-50.0, -60.0, -20.0]);
        MriVolume::from_parts("sub-01.nii", header, data)
    }

    /// 单个正体素 -> 包围盒退化 -> 空裁剪.
    #[test]
    fn test_single_voxel_is_degenerate() {
        let mut data = Array3::<f32>::zeros((300, 200, 70));
        data[(10, 10, 10)] = 1.0;
        let err = volume(data).crop().unwrap_err();
        let bbox = BoundingBox {
            lower: (10, 10, 10),
            upper: (10, 10, 10),
        };
        assert_eq!(err, CropError::Degenerate(bbox));
        assert_eq!(bbox.crop_shape(), (0, 0, 0));
    }

    #[test]
    fn test_no_foreground() {
        let mut data = Array3::<f32>::zeros((8, 8, 8));
        data[(1, 1, 1)] = -3.0;
        data[(2, 2, 2)] = f32::NAN;
        assert_eq!(volume(data).crop().unwrap_err(), CropError::NoForeground);
    }

    /// 上界所在层被排除, 下界所在层被保留.
    #[test]
    fn test_crop_is_half_open() {
        let mut data = Array3::<f32>::zeros((20, 20, 20));
        data[(2, 3, 4)] = 5.0;
        data[(9, 12, 7)] = 6.0;
        data[(5, 5, 5)] = 1.0;
        let cropped = volume(data).crop().unwrap();
        let bbox = cropped.bounding_box();
        assert_eq!(bbox.lower, (2, 3, 4));
        assert_eq!(bbox.upper, (9, 12, 7));
        assert_eq!(cropped.shape(), (7, 9, 3));
        assert_eq!(cropped.data()[(0, 0, 0)], 5.0);
        assert_eq!(cropped.data()[(3, 2, 1)], 1.0);
        // (9, 12, 7) 这个最大角点不在裁剪结果内.
        assert_eq!(cropped.data().iter().filter(|&&v| v > 0.0).count(), 2);
    }

    /// 包围盒内包含所有正体素 (上界层除外), 盒外不含正体素.
    #[test]
    fn test_bbox_covers_foreground() {
        let mut data = Array3::<f32>::zeros((16, 12, 10));
        let points = [(3, 4, 2), (11, 4, 8), (7, 10, 5), (5, 2, 3)];
        for (i, pos) in points.into_iter().enumerate() {
            data[pos] = (i + 1) as f32;
        }
        let bbox = BoundingBox::of_foreground(data.view()).unwrap();
        assert_eq!(bbox.lower, (3, 2, 2));
        assert_eq!(bbox.upper, (11, 10, 8));
        for ((x, y, z), &v) in data.indexed_iter() {
            let on_upper = x == bbox.upper.0 || y == bbox.upper.1 || z == bbox.upper.2;
            if v > 0.0 && !on_upper {
                assert!(bbox.contains((x, y, z)));
            }
        }
    }

    /// 裁剪后 (0, 0, 0) 与原数据 (x1, y1, z1) 对应同一物理点.
    #[test]
    fn test_cropped_affine_origin() {
        let mut data = Array3::<f32>::zeros((10, 10, 10));
        data[(2, 3, 4)] = 1.0;
        data[(6, 8, 9)] = 1.0;
        let vol = volume(data);
        let cropped = vol.crop().unwrap();
        assert_eq!(
            cropped.affine().apply((0, 0, 0)),
            vol.affine().apply((2, 3, 4))
        );
        assert_eq!(cropped.affine().translation(), [-48.0, -57.0, -8.0]);
        // 原体数据的 affine 不受影响.
        assert_eq!(vol.affine().translation(), [-50.0, -60.0, -20.0]);
    }

    #[test]
    fn test_cropped_file_name() {
        assert_eq!(cropped_file_name(Path::new("/in/a.nii")), "a_crop.nii");
        assert_eq!(cropped_file_name(Path::new("b.nii.gz")), "b_crop.nii.gz");
        assert_eq!(cropped_file_name(Path::new("dir/c.img")), "c_crop.img");
        assert_eq!(cropped_file_name(Path::new("noext")), "noext_crop");
    }

    /// 保存后重新读入: 数据与 affine 一致.
    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("brain.nii");
        let mut data = Array3::<f32>::zeros((12, 10, 8));
        data[(2, 2, 2)] = 100.0;
        data[(4, 5, 3)] = 250.0;
        data[(9, 7, 6)] = 30.0;
        write_nii(&src, &header_with([0.5, 0.5, 4.0], [1.0, 2.0, 3.0]), &data);

        let cropped = MriVolume::open(&src).unwrap().crop().unwrap();
        let dest = cropped.save_into(dir.path()).unwrap();
        assert_eq!(dest, dir.path().join("brain_crop.nii"));

        let back = MriVolume::open(&dest).unwrap();
        assert_eq!(back.shape(), (7, 5, 4));
        assert_eq!(back.data(), cropped.data());
        assert_eq!(back.affine(), cropped.affine());
        assert_eq!(back.slice_thickness(), 4.0);
    }
}
