#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! `ferry-core` 汇集 ferry 工作区各容器 crate 共享的最小契约。
//!
//! # 模块定位（Why）
//! - 缓冲与对象池容器分布在独立的实现 crate 中，但它们对外报告失败、
//!   输出诊断信息时必须讲同一种语言；本 crate 给出统一的错误域与诊断门面，
//!   避免每个容器各自发明错误码或日志格式。
//! - 容器面向网络收发线程的热路径，`no_std + alloc` 必须可用；
//!   因此这里不依赖 `std::error::Error`，而是直接实现 [`core::error::Error`]。
//!
//! # 内容概览（How）
//! - [`error`]：稳定错误码（`<域>.<语义>` 约定）与轻量 [`CoreError`] 载体；
//! - [`diagnostics`]：行式文本诊断门面 [`DiagnosticSink`]，附带 `std` 写出
//!   适配器与供测试复用的捕获桩；
//! - [`prelude`]：调用端一次性引入的常用符号。
//!
//! # 契约说明（What）
//! - 本 crate 不包含任何容器实现，仅承载可被多方实现、多方消费的契约；
//! - 所有公开类型满足 `Send + Sync`（或在文档中显式说明例外）。

extern crate alloc;

pub mod diagnostics;
pub mod error;
pub mod prelude;

pub use diagnostics::{CaptureSink, DiagnosticSink};
pub use error::{codes, CoreError};

/// 框架统一的 `Result` 别名，默认错误类型为 [`CoreError`]。
pub type Result<T, E = CoreError> = core::result::Result<T, E>;
