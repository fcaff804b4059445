//! 一次性引入常用契约符号的 prelude。
//!
//! 调用端通常写 `use ferry_core::prelude::*;` 即可获得错误域与诊断门面的
//! 全部入口，无需逐项导入。

pub use crate::diagnostics::{CaptureSink, DiagnosticSink};
pub use crate::error::{codes, CoreError};
pub use crate::Result;
