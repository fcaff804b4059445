//! 行式诊断门面：对象池等容器向外报告非致命异常（如泄漏）的统一出口。

use alloc::string::{String, ToString};
use alloc::vec::Vec;

/// `DiagnosticSink` 定义行缓冲文本诊断的接收端。
///
/// # 设计背景（Why）
/// - 对象池在销毁时若仍有未归还槽位，需要把一行泄漏摘要交给调用方指定的
///   出口；容器本身不内置日志实现，保持 `no_std` 可用与零强制依赖。
/// - 以“整行”为单位而非字节流，接收端无需自行组装断行，便于对接测试捕获、
///   标准错误或任意日志后端。
///
/// # 契约说明（What）
/// - `line` 不含换行符，由实现决定如何落盘或缓存；
/// - 实现必须线程安全（`Send + Sync`），且**不得 panic**：
///   调用发生在 `Drop` 路径上，panic 将升级为进程终止。
pub trait DiagnosticSink: Send + Sync {
    /// 接收一行诊断文本。
    fn write_line(&self, line: &str);
}

/// 把诊断行累积在内存中的官方测试桩。
///
/// # 使用方式（How）
/// - 与框架其它 `Noop`/`Mock` 桩一样随 crate 正式发布，供依赖方的集成测试
///   直接复用，而非散落在各处重复定义；
/// - `lines()` 返回快照，`take()` 清空并取走全部内容。
#[derive(Default)]
pub struct CaptureSink {
    lines: spin::Mutex<Vec<String>>,
}

impl CaptureSink {
    /// 创建空的捕获桩。
    pub fn new() -> Self {
        Self::default()
    }

    /// 返回当前累积行的快照。
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    /// 取走并清空全部累积行。
    pub fn take(&self) -> Vec<String> {
        core::mem::take(&mut *self.lines.lock())
    }
}

impl DiagnosticSink for CaptureSink {
    fn write_line(&self, line: &str) {
        self.lines.lock().push(line.to_string());
    }
}

/// 将诊断行写入任意 [`std::io::Write`] 的适配器。
///
/// # 契约说明（What）
/// - 每行追加 `\n` 后立即写出并 flush，匹配“行缓冲文本”语义；
/// - 写出失败被静默忽略：诊断属于尽力而为的旁路，不允许反向干扰
///   容器的析构流程。
#[cfg(feature = "std")]
pub struct WriteSink<W: std::io::Write + Send> {
    inner: spin::Mutex<W>,
}

#[cfg(feature = "std")]
impl<W: std::io::Write + Send> WriteSink<W> {
    /// 包装一个写出端。
    pub fn new(writer: W) -> Self {
        Self {
            inner: spin::Mutex::new(writer),
        }
    }

    /// 解除包装，取回内部写出端。
    pub fn into_inner(self) -> W {
        self.inner.into_inner()
    }
}

#[cfg(feature = "std")]
impl<W: std::io::Write + Send> DiagnosticSink for WriteSink<W> {
    fn write_line(&self, line: &str) {
        let mut writer = self.inner.lock();
        let _ = writeln!(writer, "{line}");
        let _ = writer.flush();
    }
}
