//! 批量质量评分.
//!
//! 所有填充后的体数据先堆叠为一个 `(n, 217, 178, 60, 1)` 的批次, 按批次最小值
//! `m` 和固定上限 10000 归一化为 `(v - m) / (10000 - m)`, 再交给外部模型.
//! 上限固定而不取实际最大值, 使得不同批次的分数可以相互比较.

use itertools::{Itertools, MinMaxResult};
use ndarray::{Array5, ArrayView5, Axis};

use crate::consts::{INTENSITY_CEILING, TARGET_SHAPE};
use crate::sink::LogSink;
use crate::PaddedVolume;

mod command;

cfg_if::cfg_if! {
    if #[cfg(feature = "rayon")] {
        use rayon::iter::{IndexedParallelIterator, IntoParallelIterator, ParallelIterator};
    }
}

pub use command::{CommandModelError, NpyCommandModel};

/// 模型运行时错误.
pub type ModelError = Box<dyn std::error::Error + Send + Sync>;

/// 质量评分模型: 把一个批次映射为每个体数据一个分数, 顺序与批次一致.
pub trait QualityModel {
    /// 对形状为 `(n, 217, 178, 60, 1)` 的已归一化批次评分, 返回 `n` 个分数.
    fn predict(&mut self, batch: ArrayView5<'_, f32>) -> Result<Vec<f32>, ModelError>;
}

impl<F> QualityModel for F
where
    F: FnMut(ArrayView5<'_, f32>) -> Result<Vec<f32>, ModelError>,
{
    #[inline]
    fn predict(&mut self, batch: ArrayView5<'_, f32>) -> Result<Vec<f32>, ModelError> {
        self(batch)
    }
}

/// 批量评分错误. 均属于集成错误, 应终止整次运行.
#[derive(Debug, thiserror::Error)]
pub enum ScoreError {
    /// 体数据个数与标签个数不一致.
    #[error("{volumes} volumes but {labels} labels")]
    SizeMismatch {
        /// 体数据个数.
        volumes: usize,
        /// 标签个数.
        labels: usize,
    },

    /// 空批次, 归一化无定义.
    #[error("cannot score an empty batch")]
    EmptyBatch,

    /// 批次最小值不小于上限, 归一化分母非正.
    #[error("batch minimum {0} leaves no range below the intensity ceiling")]
    FlatBatch(f32),

    /// 模型运行失败.
    #[error("model failed: {0}")]
    Model(#[source] ModelError),

    /// 模型返回的分数个数与批次大小不一致.
    #[error("model returned {got} scores for {expected} volumes")]
    ScoreCount {
        /// 批次大小.
        expected: usize,
        /// 实际分数个数.
        got: usize,
    },
}

/// 评分前已知的单条记录信息.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordLabel {
    /// 文件名 (按输入时的形式保存).
    pub filename: String,

    /// 切片厚度, 以毫米为单位.
    pub slice_thickness: f32,
}

/// 单个输入文件的评分结果.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ScoreRecord {
    /// 文件名.
    pub filename: String,

    /// 模型给出的质量分数.
    pub quality: f32,

    /// 切片厚度, 以毫米为单位.
    pub slice_thickness: f32,

    /// 是否入选.
    pub selected: bool,
}

/// 将批次就地归一化为 `(v - min) / (ceiling - min)`, 返回批次最小值.
///
/// 结果与批次实际最大值无关. 空批次或 `min >= ceiling` 时返回 `Err`.
pub fn normalize_batch(batch: &mut Array5<f32>, ceiling: f32) -> Result<f32, ScoreError> {
    let min = batch
        .iter()
        .copied()
        .reduce(f32::min)
        .ok_or(ScoreError::EmptyBatch)?;
    let range = ceiling - min;
    if range <= 0.0 {
        return Err(ScoreError::FlatBatch(min));
    }
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            batch.par_mapv_inplace(|v| (v - min) / range);
        } else {
            batch.mapv_inplace(|v| (v - min) / range);
        }
    }
    Ok(min)
}

/// 批量评分组件.
#[derive(Debug)]
pub struct BatchScorer<M> {
    model: M,
    ceiling: f32,
    sink: LogSink,
}

impl<M: QualityModel> BatchScorer<M> {
    /// 以 `model` 评分, 上限为 [`INTENSITY_CEILING`].
    pub fn new(model: M, sink: LogSink) -> Self {
        Self {
            model,
            ceiling: INTENSITY_CEILING,
            sink,
        }
    }

    /// 对 `volumes` 评分, `labels` 与之一一对应. 结果保持输入顺序, `selected` 均为 `false`.
    ///
    /// `volumes` 在堆叠进批次时逐个释放, 因此不会同时存在两份体数据.
    pub fn score(
        &mut self,
        volumes: Vec<PaddedVolume>,
        labels: &[RecordLabel],
    ) -> Result<Vec<ScoreRecord>, ScoreError> {
        if volumes.len() != labels.len() {
            return Err(ScoreError::SizeMismatch {
                volumes: volumes.len(),
                labels: labels.len(),
            });
        }
        if volumes.is_empty() {
            return Err(ScoreError::EmptyBatch);
        }

        let n = volumes.len();
        let mut batch = stack(volumes);
        let min = normalize_batch(&mut batch, self.ceiling)?;
        self.sink.info(format_args!("Min: {min}"));
        self.sink.info(format_args!("Max: {}", self.ceiling));
        if let MinMaxResult::MinMax(lo, hi) = batch.iter().minmax_by(|a, b| a.total_cmp(b)) {
            self.sink.info(format_args!("New min: {lo}"));
            self.sink.info(format_args!("New max: {hi}"));
        }

        self.sink
            .debug(format_args!("Doing prediction on {n} volumes"));
        let scores = self
            .model
            .predict(batch.view())
            .map_err(ScoreError::Model)?;
        if scores.len() != n {
            return Err(ScoreError::ScoreCount {
                expected: n,
                got: scores.len(),
            });
        }

        Ok(labels
            .iter()
            .zip(scores)
            .map(|(label, quality)| ScoreRecord {
                filename: label.filename.clone(),
                quality,
                slice_thickness: label.slice_thickness,
                selected: false,
            })
            .collect())
    }
}

/// 将所有体数据堆叠为 `(n, 217, 178, 60, 1)` 的批次. 每个体数据复制后立即释放.
fn stack(volumes: Vec<PaddedVolume>) -> Array5<f32> {
    let (x, y, z) = TARGET_SHAPE;
    let mut batch = Array5::<f32>::zeros((volumes.len(), x, y, z, 1));
    cfg_if::cfg_if! {
        if #[cfg(feature = "rayon")] {
            batch
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .zip(volumes.into_par_iter())
                .for_each(|(mut slot, v)| slot.assign(&v.data()));
        } else {
            for (mut slot, v) in batch.axis_iter_mut(Axis(0)).zip(volumes) {
                slot.assign(&v.data());
            }
        }
    }
    batch
}
