//! 一次完整运行: 发现文件, 逐个加载/裁剪/规范化, 整批评分, 写出 CSV, 挑选并保存.
//!
//! 单个文件的加载或裁剪失败只记录日志并从结果中剔除; 批量评分、CSV 写出与目录冲突
//! 属于致命错误, 直接返回 `Err`.

use std::path::{Path, PathBuf};

use crate::consts::*;
use crate::dataset::{discover, volume_loader};
use crate::score::{BatchScorer, QualityModel, RecordLabel, ScoreError, ScoreRecord};
use crate::select::{save_all, SelectError, SelectionPolicy};
use crate::sink::LogSink;
use crate::{
    CropError, CroppedVolume, LoadError, MriVolume, NiftiHeaderAttr, PaddedVolume, ShapeNormalizer,
};

/// 运行模式.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Mode {
    /// 裁剪后评分, 可保存裁剪结果与入选结果. CSV 分数列名为 `quality`.
    Assess,

    /// 输入已经裁剪过, 只评分. CSV 分数列名为 `prediction`.
    Predict,
}

impl Mode {
    /// CSV 中分数列的列名.
    #[inline]
    pub fn score_column(&self) -> &'static str {
        match self {
            Mode::Assess => "quality",
            Mode::Predict => "prediction",
        }
    }
}

/// 运行配置.
#[derive(Clone, Debug)]
pub struct AssessOptions {
    /// 输入目录.
    pub input_dir: PathBuf,

    /// 输出目录. CSV 与各保存目录都位于其下.
    pub output_dir: PathBuf,

    /// 输入文件名模式.
    pub input_filter: String,

    /// 输出 CSV 文件名.
    pub output_file: String,

    /// 保存全部裁剪结果 (挑选前) 的目录名. `None` 表示不保存.
    pub crop_destination: Option<String>,

    /// 保存入选裁剪结果的目录名. `None` 表示不挑选.
    pub destination: Option<String>,

    /// 挑选阈值. 大于 1 时不挑选.
    pub threshold: f64,

    /// 运行模式.
    pub mode: Mode,
}

impl Default for AssessOptions {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            input_filter: DEFAULT_INPUT_FILTER.to_string(),
            output_file: DEFAULT_OUTPUT_FILE.to_string(),
            crop_destination: None,
            destination: Some(DEFAULT_DESTINATION.to_string()),
            threshold: DEFAULT_THRESHOLD,
            mode: Mode::Assess,
        }
    }
}

impl AssessOptions {
    /// 仅评分模式的默认配置.
    pub fn predict() -> Self {
        Self {
            input_filter: DEFAULT_PREDICT_FILTER.to_string(),
            output_file: DEFAULT_PREDICT_OUTPUT_FILE.to_string(),
            destination: None,
            mode: Mode::Predict,
            ..Self::default()
        }
    }
}

/// 单个文件的错误. 只影响该文件.
#[derive(Debug, thiserror::Error)]
pub enum FileError {
    /// 无法读取.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// 没有可用前景.
    #[error(transparent)]
    Empty(#[from] CropError),
}

/// 致命错误. 终止整次运行.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// 输入文件模式非法.
    #[error("invalid input filter: {0}")]
    Pattern(#[from] glob::PatternError),

    /// 批量评分失败.
    #[error(transparent)]
    Score(#[from] ScoreError),

    /// 保存目录冲突或写出失败.
    #[error(transparent)]
    Select(#[from] SelectError),

    /// 写出 CSV 失败.
    #[error("cannot write results: {0}")]
    Csv(#[from] csv::Error),
}

/// 运行结果.
#[derive(Debug, Default)]
pub struct AssessReport {
    /// 评分记录, 与成功处理的输入文件顺序一致.
    pub records: Vec<ScoreRecord>,

    /// 失败的文件及原因.
    pub failures: Vec<(PathBuf, FileError)>,

    /// 写出的 CSV 路径. 没有输入文件时为 `None`.
    pub output_csv: Option<PathBuf>,

    /// 保存的全部裁剪结果.
    pub cropped: Vec<PathBuf>,

    /// 保存的入选裁剪结果.
    pub selected: Vec<PathBuf>,
}

/// 单个文件预处理后的结果.
struct Prepared {
    label: RecordLabel,
    cropped: CroppedVolume,
    padded: PaddedVolume,
}

/// 加载、裁剪 (仅 `Mode::Assess`) 并规范化.
fn prepare(
    path: &Path,
    volume: Result<MriVolume, LoadError>,
    mode: Mode,
    normalizer: &ShapeNormalizer,
) -> Result<Prepared, FileError> {
    let volume = volume?;
    let cropped = match mode {
        Mode::Assess => volume.crop()?,
        Mode::Predict => CroppedVolume::whole(&volume),
    };
    let padded = normalizer.normalize_cropped(&cropped);
    Ok(Prepared {
        label: RecordLabel {
            filename: path.display().to_string(),
            slice_thickness: volume.slice_thickness(),
        },
        cropped,
        padded,
    })
}

/// 将 `records` 写为 CSV: 表头 `filename,<score_column>,slice_thickness`, 无索引列.
pub fn write_csv(path: &Path, score_column: &str, records: &[ScoreRecord]) -> csv::Result<()> {
    let mut w = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    w.write_record(["filename", score_column, "slice_thickness"])?;
    for r in records {
        w.serialize((&r.filename, r.quality, r.slice_thickness))?;
    }
    w.flush()?;
    Ok(())
}

/// 按 `options` 运行一次, 以 `model` 评分, 日志输出到 `sink`.
///
/// # 注意
///
/// 所有填充后的体数据会同时驻留内存, 约为 `文件数 * PADDED_VOLUME_BYTES` 字节.
/// 堆叠为批次时逐个移交, 峰值不会翻倍.
pub fn run<M: QualityModel>(
    options: &AssessOptions,
    model: M,
    sink: LogSink,
) -> Result<AssessReport, RunError> {
    let mut report = AssessReport::default();

    let inputs = discover(&options.input_dir, &options.input_filter)?;
    if inputs.is_empty() {
        sink.warn(format_args!(
            "No input files found in \"{}\"",
            options.input_dir.join(&options.input_filter).display()
        ));
        return Ok(report);
    }
    sink.info(format_args!(
        "{} input files, about {} MiB of padded volumes",
        inputs.len(),
        inputs.len() * PADDED_VOLUME_BYTES / (1 << 20)
    ));

    let normalizer = ShapeNormalizer::new(sink);
    let (mut labels, mut cropped, mut padded) = (Vec::new(), Vec::new(), Vec::new());
    for (path, volume) in volume_loader(inputs) {
        sink.debug(format_args!("Loading {}", path.display()));
        match prepare(&path, volume, options.mode, &normalizer) {
            Ok(p) => {
                labels.push(p.label);
                cropped.push(p.cropped);
                padded.push(p.padded);
            }
            Err(e) => {
                sink.error(format_args!("{}: {e}, skipped", path.display()));
                report.failures.push((path, e));
            }
        }
    }

    let assess = options.mode == Mode::Assess;
    if let Some(dir) = options.crop_destination.as_ref().filter(|_| assess) {
        report.cropped = save_all(&options.output_dir.join(dir), &cropped)?;
    }

    if padded.is_empty() {
        sink.error(format_args!("no input file could be prepared for scoring"));
    } else {
        report.records = BatchScorer::new(model, sink).score(padded, &labels)?;
    }

    let csv_path = options.output_dir.join(&options.output_file);
    sink.debug(format_args!("Saving results to {}", csv_path.display()));
    write_csv(&csv_path, options.mode.score_column(), &report.records)?;
    report.output_csv = Some(csv_path);

    sink.debug(format_args!("threshold={}", options.threshold));
    let policy = SelectionPolicy::new(options.threshold, sink);
    let destination = options
        .destination
        .as_ref()
        .filter(|_| assess && !report.records.is_empty());
    if let Some(dir) = destination {
        policy.select(&mut report.records);
        report.selected = policy.persist(&options.output_dir.join(dir), &report.records, &cropped)?;
    }

    Ok(report)
}
