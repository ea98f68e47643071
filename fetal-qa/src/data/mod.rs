use std::ops::Index;
use std::path::{Path, PathBuf};

use ndarray::{Array3, ArrayD, ArrayView, Axis, Ix3};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};

use crate::Idx3d;

mod affine;
mod crop;
mod pad;

pub use affine::Affine;
pub use crop::{cropped_file_name, BoundingBox, CropError, CroppedVolume};
pub use pad::{normalize, PaddedVolume, ShapeNormalizer};

/// `NiftiHeader` 是栈上大对象, 移动该对象的开销很可观.
/// 因此我们将其分配到堆上.
type BoxedHeader = Box<NiftiHeader>;

/// 加载 nii 文件错误.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// 底层 nifti 读取或解析错误.
    #[error("cannot read nifti file: {0}")]
    Nifti(#[from] nifti::NiftiError),

    /// 数据不是三维体数据 (或多出的维度不全为 1).
    #[error("expected a 3D volume, found shape {0:?}")]
    NotVolumetric(Vec<usize>),

    /// 数据无法整理为三维数组.
    #[error("cannot reshape volume: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

/// 3D MRI nii 文件 header 的共用属性.
pub trait NiftiHeaderAttr {
    /// 获取 header 部分.
    fn header(&self) -> &NiftiHeader;

    /// 获取 header 声明的数据形状 `(x, y, z)`.
    #[inline]
    fn shape(&self) -> Idx3d {
        let [_, x, y, z, ..] = self.header().dim;
        (x as usize, y as usize, z as usize)
    }

    /// 各数据维度上的体素尺寸 (zoom), 即 `pixdim[1..=ndim]`.
    fn zooms(&self) -> Vec<f32> {
        let h = self.header();
        let ndim = (h.dim[0] as usize).clamp(1, 7);
        h.pixdim[1..=ndim].to_vec()
    }

    /// header `dim_info` 中记录的切片方向 (从 0 开始). 未记录时返回 `None`.
    #[inline]
    fn slice_dim(&self) -> Option<usize> {
        match (self.header().dim_info >> 4) & 0b11 {
            0 => None,
            d => Some(d as usize - 1),
        }
    }

    /// 切片厚度, 即切片方向上的 zoom. 以毫米为单位.
    ///
    /// 如果 header 没有记录切片方向, 则按第三个空间维度 (z) 处理.
    fn slice_thickness(&self) -> f32 {
        let axis = self.slice_dim().unwrap_or(2);
        self.zooms().get(axis).copied().unwrap_or(1.0)
    }

    /// 体素到物理坐标的最佳 affine 矩阵.
    #[inline]
    fn best_affine(&self) -> Affine {
        Affine::from_header(self.header())
    }
}

/// nii 格式 3D MRI 体数据, 包括来源路径、header 和 `f32` 体素数据.
///
/// 数据按 nifti 原生顺序 `(x, y, z)` 索引.
#[derive(Debug, Clone)]
pub struct MriVolume {
    path: PathBuf,
    header: BoxedHeader,
    data: Array3<f32>,
    affine: Affine,
}

impl NiftiHeaderAttr for MriVolume {
    #[inline]
    fn header(&self) -> &NiftiHeader {
        &self.header
    }

    /// 以实际数据为准.
    #[inline]
    fn shape(&self) -> Idx3d {
        self.data.dim()
    }
}

impl Index<Idx3d> for MriVolume {
    type Output = f32;

    #[inline]
    fn index(&self, index: Idx3d) -> &Self::Output {
        &self.data[index]
    }
}

impl MriVolume {
    /// 打开 nii 文件格式的 3D MRI 体数据. `path` 为 nii 文件的本地路径.
    ///
    /// 体素值会经过 header 中的 `scl_slope`/`scl_inter` 变换后转换为 `f32`.
    /// 末尾长度为 1 的多余维度会被去掉; 其余非三维数据返回
    /// `Err(LoadError::NotVolumetric)`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let obj = ReaderOptions::new().read_file(path)?;
        let header = Box::new(obj.header().clone());
        let data = squeeze_to_3d(obj.into_volume().into_ndarray::<f32>()?)?;
        Ok(Self::from_parts(path, header, data))
    }

    /// 根据 header 和 `(x, y, z)` 顺序的数据直接创建实体. affine 由 header 推出.
    ///
    /// # 注意
    ///
    /// `header.dim` 会被改写为数据的实际形状.
    pub fn from_parts<P: AsRef<Path>>(path: P, mut header: BoxedHeader, data: Array3<f32>) -> Self {
        let (x, y, z) = data.dim();
        header.dim[0] = 3;
        header.dim[1..4].copy_from_slice(&[x as u16, y as u16, z as u16]);
        header.dim[4..].fill(1);
        let affine = Affine::from_header(&header);
        Self {
            path: path.as_ref().to_owned(),
            header,
            data,
            affine,
        }
    }

    /// 来源路径.
    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 体素到物理坐标的 affine 矩阵.
    #[inline]
    pub fn affine(&self) -> &Affine {
        &self.affine
    }

    /// 获得数据的一份不可变 shallow copy.
    #[inline]
    pub fn data(&self) -> ArrayView<'_, f32, Ix3> {
        self.data.view()
    }
}

/// 去掉第三维之后长度为 1 的维度, 得到三维数组.
fn squeeze_to_3d(mut data: ArrayD<f32>) -> Result<Array3<f32>, LoadError> {
    if data.ndim() < 3 {
        return Err(LoadError::NotVolumetric(data.shape().to_vec()));
    }
    while data.ndim() > 3 {
        let last = Axis(data.ndim() - 1);
        if data.len_of(last) != 1 {
            return Err(LoadError::NotVolumetric(data.shape().to_vec()));
        }
        data = data.index_axis_move(last, 0);
    }
    Ok(data.into_dimensionality::<Ix3>()?)
}

#[cfg(test)]
pub(crate) mod testing {
    //! 测试用的 nii 文件构造工具.

    use ndarray::Array3;
    use nifti::writer::WriterOptions;
    use nifti::NiftiHeader;
    use std::path::Path;

    /// 体素尺寸为 `pix_dim`, 切片方向为 z, sform 为带平移的缩放矩阵的 header.
    pub(crate) fn header_with(pix_dim: [f32; 3], origin: [f32; 3]) -> Box<NiftiHeader> {
        let mut header = Box::<NiftiHeader>::default();
        let [_, px, py, pz, ..] = &mut header.pixdim;
        (*px, *py, *pz) = (pix_dim[0], pix_dim[1], pix_dim[2]);
        header.dim_info = 3 << 4;
        header.sform_code = 1;
        header.srow_x = [pix_dim[0], 0.0, 0.0, origin[0]];
        header.srow_y = [0.0, pix_dim[1], 0.0, origin[1]];
        header.srow_z = [0.0, 0.0, pix_dim[2], origin[2]];
        header
    }

    /// 把 `(x, y, z)` 顺序的 `data` 写成 `path` 处的 nii 文件.
    pub(crate) fn write_nii(path: &Path, header: &NiftiHeader, data: &Array3<f32>) {
        WriterOptions::new(path)
            .reference_header(header)
            .write_nifti(data)
            .unwrap();
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{header_with, write_nii};
    use super::{squeeze_to_3d, LoadError, MriVolume, NiftiHeaderAttr};
    use ndarray::{Array3, ArrayD, IxDyn};

    fn f32_eq(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    /// 写出再读回, 检查数据顺序、affine 与切片厚度.
    #[test]
    fn test_open_written_volume() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub-01.nii");
        let mut data = Array3::<f32>::zeros((4, 5, 6));
        data[(1, 2, 3)] = 42.0;
        data[(3, 4, 5)] = -7.5;
        write_nii(&path, &header_with([0.8, 0.8, 3.5], [-10.0, 5.0, 2.0]), &data);

        let vol = MriVolume::open(&path).unwrap();
        assert_eq!(vol.shape(), (4, 5, 6));
        assert_eq!(vol[(1, 2, 3)], 42.0);
        assert_eq!(vol[(3, 4, 5)], -7.5);
        assert_eq!(vol.data(), data);
        assert!(f32_eq(vol.slice_thickness(), 3.5));

        let p = vol.affine().apply((1, 2, 3));
        assert!((p[0] - (-10.0 + 0.8)).abs() < 1e-5);
        assert!((p[1] - (5.0 + 1.6)).abs() < 1e-5);
        assert!((p[2] - (2.0 + 10.5)).abs() < 1e-5);
    }

    /// 切片方向由 `dim_info` 决定.
    #[test]
    fn test_slice_thickness_follows_dim_info() {
        let mut header = header_with([0.5, 4.0, 1.0], [0.0; 3]);
        header.dim_info = 2 << 4;
        let vol = MriVolume::from_parts("a.nii", header, Array3::zeros((2, 2, 2)));
        assert_eq!(vol.slice_dim(), Some(1));
        assert!(f32_eq(vol.slice_thickness(), 4.0));

        let mut header = header_with([0.5, 4.0, 1.5], [0.0; 3]);
        header.dim_info = 0;
        let vol = MriVolume::from_parts("a.nii", header, Array3::zeros((2, 2, 2)));
        assert_eq!(vol.slice_dim(), None);
        assert!(f32_eq(vol.slice_thickness(), 1.5));
    }

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MriVolume::open(dir.path().join("nope.nii")).unwrap_err();
        assert!(matches!(err, LoadError::Nifti(_)));
    }

    #[test]
    fn test_squeeze() {
        let a = ArrayD::<f32>::zeros(IxDyn(&[3, 4, 5, 1]));
        assert_eq!(squeeze_to_3d(a).unwrap().dim(), (3, 4, 5));

        let a = ArrayD::<f32>::zeros(IxDyn(&[3, 4, 5, 2]));
        assert!(matches!(
            squeeze_to_3d(a),
            Err(LoadError::NotVolumetric(s)) if s == vec![3, 4, 5, 2]
        ));

        let a = ArrayD::<f32>::zeros(IxDyn(&[3, 4]));
        assert!(matches!(squeeze_to_3d(a), Err(LoadError::NotVolumetric(_))));
    }
}
