//! Truvis 工具集
//!
//! 提供在各个 crate 之间共享的日志初始化工具。
//!
//! - [`init_log::init_log`]：给应用使用，彩色输出，日志级别可以通过 `RUST_LOG` 覆盖
//! - [`init_log::init_test_log`]：给单元测试使用，可以重复调用

pub mod init_log;
