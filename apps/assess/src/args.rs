//! 命令行参数.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use fetal_qa::consts::{DEFAULT_DESTINATION, DEFAULT_THRESHOLD};
use fetal_qa::pipeline::{AssessOptions, Mode};
use log::LevelFilter;

#[derive(Parser, Debug)]
#[command(name = "fetal-qa", version, about, long_about = None)]
pub struct Cli {
    /// 日志详细程度. 0: warn, 1: info, 2 及以上: debug.
    #[arg(
        short,
        long,
        global = true,
        default_value_t = 1,
        env = "FETAL_QA_VERBOSITY"
    )]
    pub verbosity: u8,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// 对应的日志级别.
    pub fn level(&self) -> LevelFilter {
        match self.verbosity {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            _ => LevelFilter::Debug,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 裁剪、评分并挑选高质量体数据.
    Assess(Common),

    /// 对已经裁剪过的体数据评分.
    Predict(Common),
}

impl Command {
    /// 运行模式.
    pub fn mode(&self) -> Mode {
        match self {
            Command::Assess(_) => Mode::Assess,
            Command::Predict(_) => Mode::Predict,
        }
    }

    /// 两种模式共用的参数.
    pub fn common(&self) -> &Common {
        match self {
            Command::Assess(c) | Command::Predict(c) => c,
        }
    }

    /// 转为库的运行配置. 未给出的参数取对应模式的默认值.
    pub fn options(&self) -> AssessOptions {
        let c = self.common();
        let base = match self.mode() {
            Mode::Assess => AssessOptions::default(),
            Mode::Predict => AssessOptions::predict(),
        };
        let assess = self.mode() == Mode::Assess;
        AssessOptions {
            input_dir: c.input_dir.clone(),
            output_dir: c.output_dir.clone(),
            input_filter: c.input_filter.clone().unwrap_or(base.input_filter),
            output_file: c.output_file.clone().unwrap_or(base.output_file),
            crop_destination: non_empty(&c.crop_destination).filter(|_| assess),
            destination: non_empty(&c.destination).filter(|_| assess),
            threshold: c.threshold,
            mode: base.mode,
        }
    }
}

/// 空字符串表示关闭该输出.
fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

#[derive(Args, Debug)]
pub struct Common {
    /// 输入目录.
    #[arg(value_name = "INPUTDIR")]
    pub input_dir: PathBuf,

    /// 输出目录. CSV 与保存目录都写在其下.
    #[arg(value_name = "OUTPUTDIR")]
    pub output_dir: PathBuf,

    /// 输入文件名模式. 默认 assess 为 `*.nii`, predict 为 `*_crop.nii`.
    #[arg(short = 'p', long = "inputPathFilter", value_name = "GLOB")]
    pub input_filter: Option<String>,

    /// 输出 CSV 文件名.
    #[arg(short, long, value_name = "FILE")]
    pub output_file: Option<String>,

    /// 保存全部裁剪结果的目录名. 为空时不保存.
    #[arg(short, long, value_name = "DIR", default_value = "")]
    pub crop_destination: String,

    /// 保存入选裁剪结果的目录名. 为空时不挑选.
    #[arg(short, long, value_name = "DIR", default_value = DEFAULT_DESTINATION)]
    pub destination: String,

    /// 挑选阈值. 大于 1 时不挑选.
    #[arg(
        short,
        long,
        default_value_t = DEFAULT_THRESHOLD,
        env = "FETAL_QA_THRESHOLD"
    )]
    pub threshold: f64,

    /// 评分命令. 归一化后的批次以 `.npy` 文件路径作为最后一个参数传入.
    #[arg(long, value_name = "PROGRAM", env = "FETAL_QA_MODEL")]
    pub model: PathBuf,

    /// 传给评分命令的前置参数, 可重复.
    #[arg(long = "model-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub model_args: Vec<OsString>,
}

#[cfg(test)]
mod tests {
    use super::Cli;
    use clap::{CommandFactory, Parser};
    use fetal_qa::pipeline::Mode;
    use log::LevelFilter;
    use std::ffi::OsString;
    use std::path::Path;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_assess_defaults() {
        let cli = Cli::try_parse_from(["fetal-qa", "assess", "in", "out", "--model", "m"]).unwrap();
        let opts = cli.command.options();
        assert_eq!(opts.mode, Mode::Assess);
        assert_eq!(opts.input_dir, Path::new("in"));
        assert_eq!(opts.input_filter, "*.nii");
        assert_eq!(opts.output_file, "quality_assessment.csv");
        assert_eq!(opts.crop_destination, None);
        assert_eq!(opts.destination.as_deref(), Some("Best_Images_crop"));
        assert_eq!(opts.threshold, 0.4);
        assert_eq!(cli.level(), LevelFilter::Info);
    }

    #[test]
    fn test_predict_and_overrides() {
        let cli = Cli::try_parse_from([
            "fetal-qa", "predict", "in", "out", "--model", "m", "-v", "2", "-t", "1.5", "-c",
            "crops", "--model-arg", "--gpu",
        ])
        .unwrap();
        let opts = cli.command.options();
        assert_eq!(opts.mode, Mode::Predict);
        assert_eq!(opts.input_filter, "*_crop.nii");
        assert_eq!(opts.output_file, "predictions.csv");
        assert_eq!(opts.crop_destination, None);
        assert_eq!(opts.destination, None);
        assert_eq!(opts.threshold, 1.5);
        assert_eq!(cli.level(), LevelFilter::Debug);
        assert_eq!(cli.command.common().model_args, vec![OsString::from("--gpu")]);
    }

    /// 空字符串关闭输出.
    #[test]
    fn test_empty_destination_disables() {
        let cli = Cli::try_parse_from([
            "fetal-qa", "assess", "in", "out", "--model", "m", "-d", "", "-c", "all",
        ])
        .unwrap();
        let opts = cli.command.options();
        assert_eq!(opts.destination, None);
        assert_eq!(opts.crop_destination.as_deref(), Some("all"));
    }
}
