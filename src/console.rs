//! # 控制台输出与日志模块
//!
//! ## Overview
//! 平台在启动时通过 `init` 注册字符输出函数，
//! 之后 `print!` / `println!` 与 `log` 门面的所有记录都经由它输出。
//! 日志级别由构建时环境变量 `LOG` 决定（见 `config::log_level`）。

use crate::config;
use core::fmt::{self, Write};
use log::{Level, Log, Metadata, Record};
use spin::Once;

/// 平台提供的输出函数，由串口或控制台驱动实现
pub type ConsoleSink = fn(&str);

static SINK: Once<ConsoleSink> = Once::new();

struct Stdout;

impl Write for Stdout {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        if let Some(sink) = SINK.get() {
            sink(s);
        }
        Ok(())
    }
}

pub fn print(args: fmt::Arguments) {
    // 未注册输出函数时静默丢弃
    let _ = Stdout.write_fmt(args);
}

#[macro_export]
macro_rules! print {
    ($fmt: literal $(, $($arg: tt)+)?) => {
        $crate::console::print(format_args!($fmt $(, $($arg)+)?))
    }
}

#[macro_export]
macro_rules! println {
    ($fmt: literal) => {
        $crate::console::print(format_args!(concat!($fmt, "\n")))
    };
    ($fmt: literal, $($arg: tt)*) => {
        $crate::console::print(format_args!(concat!($fmt, "\n"), $($arg)*))
    };
}

/// 注册输出函数并安装日志器
///
/// ## Behavior
/// - 输出函数只会被注册一次，重复调用保留第一次的注册
/// - 日志器已被其他组件安装时不覆盖
pub fn init(sink: ConsoleSink) {
    static LOGGER: Logger = Logger;
    SINK.call_once(|| sink);
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(config::log_level());
    }
}

struct Logger;
impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let _ = write_record(&mut Stdout, record);
    }

    fn flush(&self) {}
}

fn write_record<W: Write>(out: &mut W, record: &Record) -> fmt::Result {
    writeln!(
        out,
        "\x1b[{}m[{:>5}] {}\x1b[0m",
        level_to_color_code(record.level()),
        record.level(),
        record.args()
    )
}

fn level_to_color_code(level: Level) -> u8 {
    match level {
        Level::Error => 31, // Red
        Level::Warn => 93,  // BrightYellow
        Level::Info => 34,  // Blue
        Level::Debug => 32, // Green
        Level::Trace => 90, // BrightBlack
    }
}
