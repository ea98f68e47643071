//! 显式日志出口.
//!
//! 库内各组件不直接调用 `log::info!` 之类的全局宏, 而是在构造时接收一个
//! [`LogSink`]. 日志级别由持有的 `log::Log` 实现自行决定, 通常在程序启动时设置一次.

use log::{Level, Log, Metadata, Record};
use std::fmt::{self, Arguments};

/// 默认日志 target.
const DEFAULT_TARGET: &str = "fetal_qa";

/// 日志出口. 该结构很轻, 可以随意复制并传给各组件.
#[derive(Copy, Clone)]
pub struct LogSink {
    logger: &'static dyn Log,
    target: &'static str,
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink")
            .field("target", &self.target)
            .finish_non_exhaustive()
    }
}

impl Default for LogSink {
    #[inline]
    fn default() -> Self {
        Self::global()
    }
}

impl LogSink {
    /// 以 `logger` 为出口创建.
    #[inline]
    pub fn new(logger: &'static dyn Log) -> Self {
        Self {
            logger,
            target: DEFAULT_TARGET,
        }
    }

    /// 使用 `log` 门面当前安装的全局 logger. 未安装时所有消息都会被丢弃.
    #[inline]
    pub fn global() -> Self {
        Self::new(log::logger())
    }

    /// 以 `level` 级别输出 `args`.
    pub fn log(&self, level: Level, args: Arguments<'_>) {
        let metadata = Metadata::builder()
            .level(level)
            .target(self.target)
            .build();
        if !self.logger.enabled(&metadata) {
            return;
        }
        self.logger.log(
            &Record::builder()
                .metadata(metadata)
                .args(args)
                .module_path_static(Some(module_path!()))
                .build(),
        );
    }

    /// 输出 error 级别消息.
    #[inline]
    pub fn error(&self, args: Arguments<'_>) {
        self.log(Level::Error, args);
    }

    /// 输出 warn 级别消息.
    #[inline]
    pub fn warn(&self, args: Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    /// 输出 info 级别消息.
    #[inline]
    pub fn info(&self, args: Arguments<'_>) {
        self.log(Level::Info, args);
    }

    /// 输出 debug 级别消息.
    #[inline]
    pub fn debug(&self, args: Arguments<'_>) {
        self.log(Level::Debug, args);
    }
}
