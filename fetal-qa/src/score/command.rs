//! 以外部命令为运行时的模型.
//!
//! 归一化后的批次以 `.npy` 格式写入临时目录, 文件路径作为最后一个参数传给命令.
//! 命令需在标准输出上按批次顺序打印每个体数据的分数, 以空白字符分隔.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use ndarray::ArrayView5;
use ndarray_npy::{write_npy, WriteNpyError};

use super::{ModelError, QualityModel};

/// 批次文件名.
const BATCH_FILE: &str = "batch.npy";

/// 外部命令模型的运行时错误.
#[derive(Debug, thiserror::Error)]
pub enum CommandModelError {
    /// 写批次文件失败.
    #[error("cannot write batch file: {0}")]
    WriteBatch(#[from] WriteNpyError),

    /// 创建临时目录或启动命令失败.
    #[error("cannot run model command: {0}")]
    Io(#[from] io::Error),

    /// 命令以非零状态退出.
    #[error("model command exited with {status}: {stderr}")]
    Status {
        /// 退出状态.
        status: ExitStatus,
        /// 标准错误输出.
        stderr: String,
    },

    /// 标准输出中存在无法解析为浮点数的内容.
    #[error("cannot parse model output token {0:?}")]
    Parse(String),
}

/// 调用外部命令评分的模型.
#[derive(Debug, Clone)]
pub struct NpyCommandModel {
    program: PathBuf,
    args: Vec<OsString>,
}

impl NpyCommandModel {
    /// 以 `program` 及前置参数 `args` 构造. 批次文件路径会追加在 `args` 之后.
    pub fn new<P, I, S>(program: P, args: I) -> Self
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.as_ref().to_owned(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// 命令路径.
    #[inline]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(&self, batch: ArrayView5<'_, f32>) -> Result<Vec<f32>, CommandModelError> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join(BATCH_FILE);
        write_npy(&file, &batch)?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(&file)
            .output()?;
        if !output.status.success() {
            return Err(CommandModelError::Status {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        parse_scores(&String::from_utf8_lossy(&output.stdout))
    }
}

impl QualityModel for NpyCommandModel {
    fn predict(&mut self, batch: ArrayView5<'_, f32>) -> Result<Vec<f32>, ModelError> {
        Ok(self.run(batch)?)
    }
}

/// 按空白字符切分并解析分数.
fn parse_scores(stdout: &str) -> Result<Vec<f32>, CommandModelError> {
    stdout
        .split_whitespace()
        .map(|t| {
            t.parse::<f32>()
                .map_err(|_| CommandModelError::Parse(t.to_string()))
        })
        .collect()
}
