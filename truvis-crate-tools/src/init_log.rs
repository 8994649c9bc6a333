use std::io::Write;

/// 默认的日志级别，`RUST_LOG` 存在时以环境变量为准
const DEFAULT_LEVEL: log::LevelFilter = log::LevelFilter::Info;

fn truvis_format(buf: &mut env_logger::fmt::Formatter, record: &log::Record) -> std::io::Result<()> {
    let level_style = match record.level() {
        log::Level::Info => buf
            .default_level_style(log::Level::Info)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))),
        log::Level::Warn => buf
            .default_level_style(log::Level::Warn)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
        log::Level::Error => buf
            .default_level_style(log::Level::Error)
            .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
        level => buf.default_level_style(level),
    };
    let grey_style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

    // windows 和 unix 的路径分隔符都要处理
    let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
    let line = record.line().unwrap_or(0);
    let time = chrono::Local::now().format("%Y/%m/%d %H:%M:%S%.3f");
    let module = record.module_path().unwrap_or("");

    writeln!(
        buf,
        "{level_style}[{time}] {}: {}{level_style:#}\n\t {grey_style}In {module} At {file}:{line}{grey_style:#}",
        record.level(),
        record.args()
    )
}

/// 初始化全局 logger
///
/// 只能调用一次，重复调用会 panic（与 `env_logger::Builder::init` 一致）
///
/// ```no_run
/// truvis_crate_tools::init_log::init_log();
/// log::info!("renderer started");
/// ```
pub fn init_log() {
    env_logger::Builder::new()
        .format(truvis_format)
        .filter(None, DEFAULT_LEVEL)
        .parse_default_env()
        .init();
}

/// 单元测试使用的 logger
///
/// 输出会被 test harness 捕获；多个测试重复调用时静默忽略
pub fn init_test_log() {
    let _ = env_logger::Builder::new()
        .format(truvis_format)
        .filter(None, log::LevelFilter::Debug)
        .parse_default_env()
        .is_test(true)
        .try_init();
}
