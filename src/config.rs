//! 编译期常量与日志级别配置

use crate::task::Priority;
use log::LevelFilter;

/// 最低优先级
pub const PRI_MIN: Priority = 0;
/// 新建线程的默认优先级
pub const PRI_DEFAULT: Priority = 31;
/// 最高优先级
pub const PRI_MAX: Priority = 63;

/// 信号量自检中 ping-pong 的轮数
pub const SEMA_SELF_TEST_ROUNDS: usize = 10;

/// 由构建时环境变量 `LOG` 决定的日志级别
pub fn log_level() -> LevelFilter {
    parse_level(option_env!("LOG"))
}

fn parse_level(level: Option<&str>) -> LevelFilter {
    match level {
        Some("error") => LevelFilter::Error,
        Some("warn") => LevelFilter::Warn,
        Some("info") => LevelFilter::Info,
        Some("debug") => LevelFilter::Debug,
        Some("trace") => LevelFilter::Trace,
        _ => LevelFilter::Off,
    }
}
