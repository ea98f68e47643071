//! 输入文件发现与数据加载器.
//!
//! 提供迭代器风格的数据集获取模式.

use std::path::{Path, PathBuf};

use glob::{glob, Pattern, PatternError};

use crate::{LoadError, MriVolume};

/// 列出目录 `dir` 下文件名匹配 `filter` (glob 语法, 如 `*.nii`) 的文件, 按路径排序.
///
/// `dir` 本身按字面处理, 不参与模式匹配. 无法访问的条目会被跳过.
pub fn discover<P: AsRef<Path>>(dir: P, filter: &str) -> Result<Vec<PathBuf>, PatternError> {
    let base = Pattern::escape(&dir.as_ref().to_string_lossy());
    let pattern = Path::new(&base).join(filter);
    let mut found: Vec<PathBuf> = glob(&pattern.to_string_lossy())?
        .filter_map(Result::ok)
        .filter(|p| p.is_file())
        .collect();
    found.sort();
    Ok(found)
}

/// 从路径列表创建体数据加载器, 按给定顺序依次打开.
pub fn volume_loader<I: IntoIterator<Item = PathBuf>>(paths: I) -> VolumeLoader {
    let mut paths: Vec<PathBuf> = paths.into_iter().collect();
    paths.reverse();
    VolumeLoader { paths_rev: paths }
}

/// 3D MRI 体数据加载器. 每个文件的加载结果单独返回, 单个文件失败不影响后续文件.
#[derive(Debug)]
pub struct VolumeLoader {
    paths_rev: Vec<PathBuf>,
}

impl Iterator for VolumeLoader {
    type Item = (PathBuf, Result<MriVolume, LoadError>);

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths_rev.pop()?;
        let data = MriVolume::open(&path);
        Some((path, data))
    }

    #[inline]
    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.paths_rev.len(), Some(self.paths_rev.len()))
    }
}

impl ExactSizeIterator for VolumeLoader {
    #[inline]
    fn len(&self) -> usize {
        self.paths_rev.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{discover, volume_loader};
    use crate::data::testing::{header_with, write_nii};
    use ndarray::Array3;
    use std::fs;

    #[test]
    fn test_discover_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.nii", "a.nii", "a_crop.nii", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        fs::create_dir(dir.path().join("sub.nii")).unwrap();

        let all = discover(dir.path(), "*.nii").unwrap();
        let names: Vec<_> = all
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.nii", "a_crop.nii", "b.nii"]);

        let crops = discover(dir.path(), "*_crop.nii").unwrap();
        assert_eq!(crops, vec![dir.path().join("a_crop.nii")]);
    }

    /// 目录名中的通配字符按字面处理.
    #[test]
    fn test_discover_escapes_dir() {
        let dir = tempfile::tempdir().unwrap();
        let odd = dir.path().join("run[1]");
        fs::create_dir(&odd).unwrap();
        fs::write(odd.join("x.nii"), b"").unwrap();
        assert_eq!(discover(&odd, "*.nii").unwrap(), vec![odd.join("x.nii")]);
    }

    /// 坏文件单独报错, 不影响其他文件, 顺序保持.
    #[test]
    fn test_loader_per_file_results() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.nii");
        let bad = dir.path().join("bad.nii");
        write_nii(&good, &header_with([1.0; 3], [0.0; 3]), &Array3::ones((2, 3, 4)));
        fs::write(&bad, b"not a nifti file").unwrap();

        let mut loader = volume_loader([bad.clone(), good.clone()]);
        assert_eq!(loader.len(), 2);
        let (p, r) = loader.next().unwrap();
        assert_eq!(p, bad);
        assert!(r.is_err());
        let (p, r) = loader.next().unwrap();
        assert_eq!(p, good);
        assert_eq!(r.unwrap().data().dim(), (2, 3, 4));
        assert!(loader.next().is_none());
    }
}
