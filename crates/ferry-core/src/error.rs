//! 稳定错误域：错误码常量与跨容器共享的错误载体。

use alloc::borrow::Cow;
use core::fmt;

/// `CoreError` 是 ferry 各容器对外暴露失败时的统一载体。
///
/// # 设计背景（Why）
/// - 容器操作（写入、读取、窥视）在容量不足时以 `Err` 返回，调用方往往把多次
///   操作串联后统一检查；错误码必须稳定，才能支撑日志聚合与断言精确匹配。
/// - 容器位于收发热路径，失败分支不允许触发堆分配；因此 `code` 恒为
///   `'static` 字符串，`message` 以 [`Cow`] 承载，常规路径只存借用。
///
/// # 契约说明（What）
/// - `code`：遵循 `<域>.<语义>` 约定的稳定错误码，见 [`codes`] 模块；
/// - `message`：面向排障人员的简短描述，不携带敏感信息；
/// - 类型满足 `Send + Sync + 'static`，可安全跨线程传播。
///
/// # 取舍（Trade-offs）
/// - 不携带底层 `source` 链：容器是依赖图的叶子，没有更底层的错误可嵌套；
///   若未来出现组合场景，可在上层错误中包裹本类型。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoreError {
    code: &'static str,
    message: Cow<'static, str>,
}

impl CoreError {
    /// 以稳定错误码与描述构造错误。
    ///
    /// 传入 `&'static str` 描述时不发生任何堆分配。
    pub fn new(code: &'static str, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取描述文本。
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl core::error::Error for CoreError {}

/// 官方登记的稳定错误码。
///
/// # 命名约定（What）
/// - `buffer.*`：线性序列化缓冲的失败语义；
/// - `ring.*`：环形字节缓冲（单线程与 SPSC 共用）的失败语义。
///
/// 新增错误码必须同步更新依赖这些常量的契约测试。
pub mod codes {
    /// 写入长度超过缓冲剩余可写空间。
    pub const BUFFER_INSUFFICIENT_SPACE: &str = "buffer.insufficient_space";
    /// 读取或窥视长度超过缓冲未读数据量。
    pub const BUFFER_INSUFFICIENT_DATA: &str = "buffer.insufficient_data";
    /// 字符串长度超出所选长度前缀类型的表示范围。
    pub const BUFFER_LENGTH_OVERFLOW: &str = "buffer.length_overflow";
    /// 读出的字符串负载不是合法 UTF-8。
    pub const BUFFER_MALFORMED_TEXT: &str = "buffer.malformed_text";
    /// C 字符串读取的目标切片放不下负载与终止符。
    pub const BUFFER_DESTINATION_TOO_SMALL: &str = "buffer.destination_too_small";

    /// 环形缓冲剩余可写空间不足。
    pub const RING_INSUFFICIENT_SPACE: &str = "ring.insufficient_space";
    /// 环形缓冲可读数据不足。
    pub const RING_INSUFFICIENT_DATA: &str = "ring.insufficient_data";
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::format;
    use alloc::string::String;

    /// 验证错误码与描述在构造后保持原样，`Display` 输出 `[code] message` 形态。
    #[test]
    fn display_carries_code_and_message() {
        let err = CoreError::new(codes::BUFFER_INSUFFICIENT_SPACE, "write of 8 bytes rejected");
        assert_eq!(err.code(), "buffer.insufficient_space");
        assert_eq!(err.message(), "write of 8 bytes rejected");
        assert_eq!(
            format!("{err}"),
            "[buffer.insufficient_space] write of 8 bytes rejected"
        );
    }

    /// 验证动态描述同样可用，且相等性按值比较。
    #[test]
    fn owned_message_round_trips() {
        let dynamic = String::from("requested 32, available 16");
        let err = CoreError::new(codes::RING_INSUFFICIENT_DATA, dynamic.clone());
        assert_eq!(err.message(), dynamic);
        assert_eq!(
            err,
            CoreError::new(codes::RING_INSUFFICIENT_DATA, dynamic)
        );
    }
}
