//! 日志系统配置模块
//! 支持结构化日志、日志级别配置和日志轮转

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry,
};

use crate::config::LoggingConfig;

/// 初始化日志系统
///
/// 返回的guard在存续期间保证文件日志落盘；调用方应持有到进程退出。
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let json = config.format == "json";

    if config.enable_file_logging {
        let log_dir = config
            .log_file_path
            .as_ref()
            .and_then(|p| Path::new(p).parent().map(Path::to_path_buf))
            .unwrap_or_else(|| Path::new("./logs").to_path_buf());
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("failed to create log dir: {}", log_dir.display()))?;

        let file_appender = rolling::daily(&log_dir, "walletcore.log");
        let (writer, guard) = non_blocking(file_appender);

        if json {
            Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_writer(writer).with_ansi(false))
                .with(fmt::layer().json())
                .init();
        } else {
            Registry::default()
                .with(filter)
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(fmt::layer().with_ansi(true))
                .init();
        }
        Ok(Some(guard))
    } else {
        if json {
            Registry::default()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        } else {
            Registry::default()
                .with(filter)
                .with(fmt::layer().with_ansi(true))
                .init();
        }
        Ok(None)
    }
}

/// 简化初始化（使用默认配置）
pub fn init_default_logging() {
    let config = LoggingConfig::default();
    if init_logging(&config).is_err() {
        // 回退到最基本的日志初始化
        tracing_subscriber::fmt::init();
    }
}

#[cfg(test)]
mod tests {
    use crate::config::LoggingConfig;

    #[test]
    fn test_logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.format, "text");
        assert!(!config.enable_file_logging);
    }
}
