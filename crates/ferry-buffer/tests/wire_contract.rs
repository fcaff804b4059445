//! `wire_contract` 集成测试：从公开 API 视角验证序列化缓冲的线格式、
//! 粘滞失败位与扩缩容契约。
//!
//! # 测试目标（Why）
//! - 线格式是跨主机互通的硬契约：任何一次字节序或前缀宽度的回归都会
//!   破坏线上对端，必须以逐字节金样固定下来；
//! - 失败位的粘滞语义允许调用方把一串写读串起来最后检查一次，这里
//!   验证“置位即保持、仅 clear 复位、失败不提交”三条；
//! - 扩缩容把未读负载压实到偏移 0，内容不得有丝毫出入。
//!
//! # 结构安排（How）
//! - 金样测试逐字节比对混合类型消息的完整线像；
//! - 各类型族（标量、字符串、宽码元、C 字符串）分别往返；
//! - 失败路径测试覆盖短写、短读、前缀溢出与目标过小。

use std::ffi::CStr;

use ferry_buffer::WireBuffer;
use ferry_core::codes;

/// 混合类型消息的逐字节金样（小端）：
/// `i8 = −7`、`u32 = 0xDEADBEEF`、`f64 = 3.125`、`str = "hi"`。
#[test]
fn golden_image_of_mixed_message() {
    let mut buf = WireBuffer::with_capacity(64);
    buf.write_num(-7i8).expect("容量足够");
    buf.write_num(0xDEAD_BEEFu32).expect("容量足够");
    buf.write_num(3.125f64).expect("容量足够");
    buf.write_str("hi").expect("容量足够");

    let expected: &[u8] = &[
        0xF9, // -7i8
        0xEF, 0xBE, 0xAD, 0xDE, // 0xDEADBEEF 小端
        0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x09, 0x40, // 3.125f64 小端
        0x02, 0x00, 0x00, 0x00, // 长度前缀 2（u32 小端）
        0x68, 0x69, // "hi"
    ];
    assert_eq!(buf.unread(), expected, "线像必须与金样逐字节一致");

    assert_eq!(buf.read_num::<i8>().expect("按序读取"), -7);
    assert_eq!(buf.read_num::<u32>().expect("按序读取"), 0xDEAD_BEEF);
    assert_eq!(buf.read_num::<f64>().expect("按序读取"), 3.125);
    assert_eq!(buf.read_string().expect("按序读取"), "hi");

    assert!(buf.is_empty(), "全部读完后应为空");
    assert!(!buf.fail(), "成功路径不得触碰失败位");
}

/// 短写置位失败且不提交；失败位粘滞到 `clear()` 为止。
#[test]
fn sticky_fail_latches_until_clear() {
    let mut buf = WireBuffer::with_capacity(4);

    let err = buf.write_num(0u64).expect_err("4 字节容量装不下 u64");
    assert_eq!(err.code(), codes::BUFFER_INSUFFICIENT_SPACE);
    assert!(buf.fail());
    assert_eq!(buf.write_pos(), 0, "短写不得提交任何字节");

    // 后续操作照常执行，失败位保持置位。
    buf.write_num(1u16).expect("容量足够");
    assert!(buf.fail(), "失败位必须粘滞");
    assert_eq!(buf.read_num::<u16>().expect("数据就位"), 1);
    assert!(buf.fail());

    buf.clear();
    assert!(!buf.fail(), "仅 clear() 允许复位失败位");
    assert_eq!(buf.read_pos(), 0);
    assert_eq!(buf.write_pos(), 0);
}

/// 短读不移动游标：声称 10 码元但只有 2 字节负载时整体拒绝。
#[test]
fn truncated_string_read_rejects_without_advancing() {
    let mut buf = WireBuffer::with_capacity(16);
    buf.write_num(10u32).expect("容量足够"); // 伪造的长度前缀
    buf.write_bytes(&[0x68, 0x69]).expect("容量足够");

    let before = buf.read_pos();
    let err = buf.read_string().expect_err("负载不完整必须失败");
    assert_eq!(err.code(), codes::BUFFER_INSUFFICIENT_DATA);
    assert_eq!(buf.read_pos(), before, "失败的读取不得移动读游标");
    assert!(buf.fail());
}

/// 非法 UTF-8 负载：失败、回退游标、置位。
#[test]
fn malformed_utf8_payload_is_rejected() {
    let mut buf = WireBuffer::with_capacity(16);
    buf.write_num(2u32).expect("容量足够");
    buf.write_bytes(&[0xFF, 0xFE]).expect("容量足够");

    let before = buf.read_pos();
    let err = buf.read_string().expect_err("坏负载必须失败");
    assert_eq!(err.code(), codes::BUFFER_MALFORMED_TEXT);
    assert_eq!(buf.read_pos(), before);
    assert!(buf.fail());
}

/// 窥视返回值但不消费；随后的正式读取取得同一值。
#[test]
fn peek_returns_value_without_consuming() {
    let mut buf = WireBuffer::with_capacity(32);
    buf.write_num(0x1234u16).expect("容量足够");
    buf.write_str("peek").expect("容量足够");

    assert_eq!(buf.peek_num::<u16>().expect("窥视标量"), 0x1234);
    assert_eq!(buf.read_num::<u16>().expect("正式读取"), 0x1234);

    assert_eq!(buf.peek_string().expect("窥视字符串"), "peek");
    assert_eq!(buf.read_string().expect("正式读取"), "peek");
    assert!(buf.is_empty());
    assert!(!buf.fail());
}

/// 自定义长度前缀：u8 前缀只占 1 字节，线像与默认前缀不同。
#[test]
fn custom_length_prefix_width() {
    let mut buf = WireBuffer::with_capacity(16);
    buf.write_str_with::<u8>("abc").expect("容量足够");
    assert_eq!(buf.unread(), &[0x03, 0x61, 0x62, 0x63]);

    assert_eq!(buf.read_string_with::<u8>().expect("按同前缀读取"), "abc");
    assert!(buf.is_empty());
}

/// UTF-16 码元串往返：前缀记录码元个数，每码元小端两字节。
#[test]
fn utf16_units_round_trip() {
    let units: Vec<u16> = "héllo ✓".encode_utf16().collect();

    let mut buf = WireBuffer::with_capacity(64);
    buf.write_utf16(&units).expect("容量足够");
    assert_eq!(
        buf.unread()[..4],
        (units.len() as u32).to_le_bytes(),
        "前缀应记录码元个数而非字节数"
    );

    let back = buf.read_utf16().expect("按序读取");
    assert_eq!(back, units);
    assert_eq!(String::from_utf16(&back).expect("码元合法"), "héllo ✓");
}

/// UTF-32 码元串往返。
#[test]
fn utf32_units_round_trip() {
    let units: Vec<u32> = "数据✓".chars().map(|ch| ch as u32).collect();

    let mut buf = WireBuffer::with_capacity(64);
    buf.write_utf32(&units).expect("容量足够");
    let back = buf.read_utf32().expect("按序读取");
    assert_eq!(back, units);
}

/// C 字符串与普通字符串线格式完全一致，可交叉读取。
#[test]
fn c_string_shares_wire_format_with_str() {
    let value = CStr::from_bytes_with_nul(b"ferry\0").expect("合法 C 字符串");

    let mut buf = WireBuffer::with_capacity(32);
    buf.write_c_str(value).expect("容量足够");
    assert_eq!(buf.read_string().expect("以普通字符串读取"), "ferry");

    buf.clear();
    buf.write_str("ferry").expect("容量足够");
    let mut dst = [0u8; 8];
    let back = buf.read_c_str_into(&mut dst).expect("以 C 字符串读取");
    assert_eq!(back.to_bytes(), b"ferry");
    assert_eq!(dst[5], 0, "读取端必须补零终止");
}

/// C 字符串读取的目标切片必须容得下负载加终止符。
#[test]
fn c_string_destination_too_small_is_checked() {
    let mut buf = WireBuffer::with_capacity(32);
    buf.write_str("ferry").expect("容量足够");

    let mut dst = [0u8; 5]; // 负载 5 字节 + 终止符需要 6
    let before = buf.read_pos();
    let err = buf.read_c_str_into(&mut dst).expect_err("目标过小必须失败");
    assert_eq!(err.code(), codes::BUFFER_DESTINATION_TOO_SMALL);
    assert_eq!(buf.read_pos(), before, "失败不得消费负载");
    assert!(buf.fail());
}

/// 扩缩容把未读负载压实到偏移 0，内容保持不变；非法请求原样拒绝。
#[test]
fn resize_compacts_unread_payload() {
    let mut buf = WireBuffer::with_capacity(16);
    buf.write_num(0xAABBu16).expect("容量足够");
    buf.write_num(0xCCDDu16).expect("容量足够");
    assert_eq!(buf.read_num::<u16>().expect("读掉前两字节"), 0xAABB);

    assert!(!buf.try_resize(1), "容不下未读负载的缩容必须失败");
    assert!(!buf.try_resize(16), "等容量请求不构成重分配");

    assert!(buf.try_resize(8));
    assert_eq!(buf.capacity(), 8);
    assert_eq!(buf.read_pos(), 0, "压实后读游标回到 0");
    assert_eq!(buf.used_space(), 2);
    assert_eq!(buf.read_num::<u16>().expect("数据完好"), 0xCCDD);
}

/// 空与满在游标推到末尾时可同时成立。
#[test]
fn empty_and_full_can_coincide_at_the_end() {
    let mut buf = WireBuffer::with_capacity(2);
    buf.write_num(7u16).expect("容量足够");
    assert!(buf.is_full());
    assert!(!buf.is_empty());

    let _ = buf.read_num::<u16>().expect("数据就位");
    assert!(buf.is_full(), "写游标仍在末尾");
    assert!(buf.is_empty(), "读游标追平写游标");
}
