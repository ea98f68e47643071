//! 按阈值挑选体数据, 并保存入选的裁剪结果.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::consts::{DEFAULT_THRESHOLD, SELECTION_DISABLED_ABOVE};
use crate::score::ScoreRecord;
use crate::sink::LogSink;
use crate::CroppedVolume;

/// 挑选与保存错误. 均应终止整次运行.
#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    /// 目标目录已经存在. 目录创建不可重入, 不会覆盖已有内容.
    #[error("destination {0} already exists")]
    DestinationExists(PathBuf),

    /// 创建目录时的其他 I/O 错误.
    #[error("cannot create destination {path}: {source}")]
    Io {
        /// 目标目录.
        path: PathBuf,
        /// 底层错误.
        source: io::Error,
    },

    /// 写出 nii 文件失败.
    #[error("cannot save {path}: {source}")]
    Save {
        /// 源文件.
        path: PathBuf,
        /// 底层错误.
        source: nifti::NiftiError,
    },
}

/// 创建目标目录. 目录已存在时返回 `Err(SelectError::DestinationExists)`.
pub fn create_destination(path: &Path) -> Result<(), SelectError> {
    fs::create_dir(path).map_err(|e| match e.kind() {
        io::ErrorKind::AlreadyExists => SelectError::DestinationExists(path.to_owned()),
        _ => SelectError::Io {
            path: path.to_owned(),
            source: e,
        },
    })
}

/// 创建目录 `folder` 并把 `volumes` 全部保存进去, 返回写出的路径.
pub fn save_all<'a, I>(folder: &Path, volumes: I) -> Result<Vec<PathBuf>, SelectError>
where
    I: IntoIterator<Item = &'a CroppedVolume>,
{
    create_destination(folder)?;
    volumes
        .into_iter()
        .map(|v| save_one(v, folder))
        .collect()
}

#[inline]
fn save_one(volume: &CroppedVolume, folder: &Path) -> Result<PathBuf, SelectError> {
    volume.save_into(folder).map_err(|source| SelectError::Save {
        path: volume.source().to_owned(),
        source,
    })
}

/// 阈值挑选策略: 分数 `>=` 阈值即入选. 阈值大于 1 时整体关闭.
#[derive(Debug, Copy, Clone)]
pub struct SelectionPolicy {
    threshold: f64,
    sink: LogSink,
}

impl Default for SelectionPolicy {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, LogSink::global())
    }
}

impl SelectionPolicy {
    /// 以阈值 `threshold` 创建.
    #[inline]
    pub fn new(threshold: f64, sink: LogSink) -> Self {
        Self { threshold, sink }
    }

    /// 阈值.
    #[inline]
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// 阈值大于 1 时不做任何挑选.
    #[inline]
    pub fn is_disabled(&self) -> bool {
        self.threshold > SELECTION_DISABLED_ABOVE
    }

    /// 分数为 `score` 的体数据是否入选. 等于阈值也入选.
    #[inline]
    pub fn keeps(&self, score: f32) -> bool {
        !self.is_disabled() && f64::from(score) >= self.threshold
    }

    /// 就地标记 `records` 的 `selected` 字段, 返回入选个数.
    pub fn select(&self, records: &mut [ScoreRecord]) -> usize {
        let mut kept = 0;
        for r in records.iter_mut() {
            r.selected = self.keeps(r.quality);
            kept += usize::from(r.selected);
        }
        kept
    }

    /// 将入选记录对应的裁剪结果保存到 `dest` 目录, 返回写出的路径.
    ///
    /// `records` 与 `volumes` 按位置一一对应, 且应当已经过 [`Self::select`].
    /// 挑选关闭时既不创建目录也不写文件.
    pub fn persist(
        &self,
        dest: &Path,
        records: &[ScoreRecord],
        volumes: &[CroppedVolume],
    ) -> Result<Vec<PathBuf>, SelectError> {
        if self.is_disabled() {
            self.sink.debug(format_args!(
                "threshold {} > {SELECTION_DISABLED_ABOVE}, selection disabled",
                self.threshold
            ));
            return Ok(Vec::new());
        }

        create_destination(dest)?;
        let mut written = Vec::new();
        for (record, volume) in records.iter().zip(volumes) {
            self.sink.debug(format_args!(
                "{:<60}  {:<1.6}  {}",
                record.filename,
                record.quality,
                if record.selected { "SELECTED" } else { "REJECTED" }
            ));
            if record.selected {
                written.push(save_one(volume, dest)?);
            }
        }
        Ok(written)
    }
}
