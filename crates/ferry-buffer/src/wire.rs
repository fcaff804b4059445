//! 线性序列化缓冲：把异构值按确定的线格式追加到一段连续字节区，再按同样
//! 的顺序取回。
//!
//! # 模块定位（Why）
//! - 网络消息在进出 SPSC 环之前需要一个“先写后读、或先读后写”的扁平
//!   工作区来拼装与拆解字段；本模块即该工作区，不做回绕，写满即满。
//! - 线格式固定为小端：跨主机得到逐位一致的字节序列；宽于一字节的字符
//!   码元逐个按小端落盘，保持码元语义而非字节序语义。
//!
//! # 契约说明（What）
//! - 读写游标 `r ≤ w ≤ capacity`；`[r, w)` 为未读负载，`[w, capacity)`
//!   为空闲区；二者只增不减，唯 [`WireBuffer::clear`] 归零；
//! - 任何一次短读/短写都置起粘滞失败位，仅 `clear()` 清除；失败的操作
//!   不提交任何游标移动；
//! - 缓冲不自动扩容，空间不足由调用方 [`WireBuffer::try_resize`]。
//!
//! # 取舍（Trade-offs）
//! - 窥视操作同样可能置失败位，因此一律收取 `&mut self`，不玩只读
//!   接收者 + 内部可变性的把戏；
//! - 交替读写请改用环形缓冲，本缓冲的游标单调性是结构保证而非惯例。

use alloc::string::String;
use alloc::vec::Vec;
use core::ffi::CStr;
use core::mem::MaybeUninit;
use core::ptr;

use ferry_core::{codes, CoreError, Result};

use crate::raw_buf::RawBuf;

mod sealed {
    pub trait Sealed {}
    pub trait SealedLen {}
}

/// 可直接上线的定宽标量：定宽整数与浮点，线上恒为小端。
///
/// 封闭 trait，仅对 `u8/i8/u16/i16/u32/i32/u64/i64/f32/f64` 实现；
/// 大端主机上的字节翻转由 `to_le_bytes`/`from_le_bytes` 吸收。
pub trait Scalar: Copy + sealed::Sealed {
    /// 线上占用的字节数。
    const SIZE: usize;

    /// 把小端表示写入 `dst[..SIZE]`。
    fn write_le(self, dst: &mut [u8]);

    /// 从 `src[..SIZE]` 的小端表示还原值。
    fn read_le(src: &[u8]) -> Self;
}

macro_rules! impl_scalar {
    ($($num:ty),* $(,)?) => {$(
        impl sealed::Sealed for $num {}

        impl Scalar for $num {
            const SIZE: usize = core::mem::size_of::<$num>();

            fn write_le(self, dst: &mut [u8]) {
                dst[..Self::SIZE].copy_from_slice(&self.to_le_bytes());
            }

            fn read_le(src: &[u8]) -> Self {
                let mut raw = [0u8; core::mem::size_of::<$num>()];
                raw.copy_from_slice(&src[..Self::SIZE]);
                Self::from_le_bytes(raw)
            }
        }
    )*};
}

impl_scalar!(u8, i8, u16, i16, u32, i32, u64, i64, f32, f64);

/// 字符串长度前缀的合法类型：无符号定宽整数，默认 `u32`。
///
/// 前缀记录码元个数而非字节数；写入长度超出前缀表示范围按
/// [`codes::BUFFER_LENGTH_OVERFLOW`] 失败，而不是静默截断。
pub trait LenPrefix: Scalar + sealed::SealedLen {
    /// 把码元个数装入前缀；超出表示范围返回 `None`。
    fn from_len(len: usize) -> Option<Self>;

    /// 展开为 64 位长度，供负载校验运算。
    fn to_len(self) -> u64;
}

macro_rules! impl_len_prefix {
    ($($num:ty),* $(,)?) => {$(
        impl sealed::SealedLen for $num {}

        impl LenPrefix for $num {
            fn from_len(len: usize) -> Option<Self> {
                <$num>::try_from(len).ok()
            }

            fn to_len(self) -> u64 {
                self as u64
            }
        }
    )*};
}

impl_len_prefix!(u8, u16, u32, u64);

/// 序列化缓冲本体。
///
/// # 结构解析（How）
/// - 底层是一段裸字节分配（容量 0 时不分配），游标以偏移量表达；
/// - 写入端把值的（小端）表示 memcpy 到 `w` 处并推进 `w`；读取端
///   从 `r` 处取回并推进 `r`；窥视读取同样校验但不推进；
/// - [`WireBuffer::try_resize`] 重新分配并把未读负载压实到偏移 0。
///
/// # 生命周期（What）
/// - 移动语义为 Rust 原生移动；[`Default`] 即容量 0 的空缓冲；
/// - 析构释放底层分配，途中不触碰游标。
pub struct WireBuffer {
    raw: RawBuf,
    pos_read: usize,
    pos_write: usize,
    fail: bool,
}

impl WireBuffer {
    /// 容量 0 的空缓冲，不发生分配。
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 预留 `capacity` 字节的缓冲。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: RawBuf::allocate(capacity),
            pos_read: 0,
            pos_write: 0,
            fail: false,
        }
    }

    /// 是否发生过至少一次短读/短写；仅 [`WireBuffer::clear`] 复位。
    pub fn fail(&self) -> bool {
        self.fail
    }

    /// 游标与失败位全部归零；容量保持不变。
    pub fn clear(&mut self) {
        self.pos_read = 0;
        self.pos_write = 0;
        self.fail = false;
    }

    /// 缓冲总容量（字节）。
    pub fn capacity(&self) -> usize {
        self.raw.len()
    }

    /// 未读负载字节数（可读量）。
    pub fn used_space(&self) -> usize {
        self.pos_write - self.pos_read
    }

    /// 空闲字节数（可写量）。
    pub fn available_space(&self) -> usize {
        self.capacity() - self.pos_write
    }

    /// 是否无未读负载。
    ///
    /// 注意：这只比较 `r == w`，当两游标同时推到缓冲末尾时，
    /// `is_empty()` 与 [`WireBuffer::is_full`] 可以同时为真。
    pub fn is_empty(&self) -> bool {
        self.pos_read == self.pos_write
    }

    /// 是否已无空闲空间；与 [`WireBuffer::is_empty`] 可同时为真。
    pub fn is_full(&self) -> bool {
        self.available_space() == 0
    }

    /// 读游标偏移。
    pub fn read_pos(&self) -> usize {
        self.pos_read
    }

    /// 写游标偏移。
    pub fn write_pos(&self) -> usize {
        self.pos_write
    }

    /// 未读负载的只读视图 `[r, w)`。
    pub fn unread(&self) -> &[u8] {
        if self.is_empty() {
            return &[];
        }
        // SAFETY: [r, w) 落在分配内且已初始化。
        unsafe { core::slice::from_raw_parts(self.raw.as_ptr().add(self.pos_read), self.used_space()) }
    }

    /// 空闲区 `[w, capacity)` 的可写视图，配合 [`WireBuffer::advance_write`]
    /// 支撑免拷贝收包。
    ///
    /// 空闲区尚未初始化，故以 `MaybeUninit` 暴露；填充后由
    /// [`WireBuffer::advance_write`] 声明生效长度。
    pub fn free_mut(&mut self) -> &mut [MaybeUninit<u8>] {
        if self.is_full() {
            return &mut [];
        }
        let len = self.available_space();
        // SAFETY: [w, capacity) 落在分配内；调用方经由 &mut self 独占访问。
        unsafe {
            core::slice::from_raw_parts_mut(
                self.raw.as_ptr().add(self.pos_write).cast::<MaybeUninit<u8>>(),
                len,
            )
        }
    }

    /// 把读游标前移 `len` 字节，视作已消费。
    ///
    /// # Panics
    /// `len` 超过未读负载时 panic——游标单调性是结构不变量，越界推进
    /// 属于调用方逻辑错误。
    pub fn advance_read(&mut self, len: usize) {
        assert!(len <= self.used_space(), "advance_read past unread payload");
        self.pos_read += len;
    }

    /// 把写游标前移 `len` 字节，声明 [`WireBuffer::free_mut`] 区间的前
    /// `len` 字节已经填充。
    ///
    /// # Panics
    /// `len` 超过空闲空间时 panic。
    pub fn advance_write(&mut self, len: usize) {
        assert!(len <= self.available_space(), "advance_write past free space");
        self.pos_write += len;
    }

    /// 重新分配到 `new_capacity` 并把未读负载压实到偏移 0。
    ///
    /// `new_capacity` 小于未读负载量、或与现容量相同，返回 `false` 且
    /// 不做任何事；失败位不受影响。返回值表示“是否真的发生了重分配”。
    pub fn try_resize(&mut self, new_capacity: usize) -> bool {
        let used = self.used_space();
        if new_capacity < used || new_capacity == self.capacity() {
            return false;
        }

        let new_raw = RawBuf::allocate(new_capacity);
        if used > 0 {
            // SAFETY: 源区间 [r, r+used) 在旧分配内；目标容量 ≥ used。
            unsafe {
                ptr::copy_nonoverlapping(
                    self.raw.as_ptr().add(self.pos_read),
                    new_raw.as_ptr(),
                    used,
                );
            }
        }
        self.raw = new_raw;
        self.pos_read = 0;
        self.pos_write = used;
        true
    }

    /// 追加 `src` 的全部字节。
    ///
    /// 空间不足时置失败位并返回 [`codes::BUFFER_INSUFFICIENT_SPACE`]，
    /// 不写入任何字节。
    pub fn write_bytes(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.available_space() {
            self.fail = true;
            return Err(CoreError::new(
                codes::BUFFER_INSUFFICIENT_SPACE,
                "write exceeds free space",
            ));
        }
        if !src.is_empty() {
            // SAFETY: 上方校验保证 [w, w+len) 在分配内；src 与缓冲不重叠。
            unsafe {
                ptr::copy_nonoverlapping(src.as_ptr(), self.raw.as_ptr().add(self.pos_write), src.len());
            }
        }
        self.pos_write += src.len();
        Ok(())
    }

    /// 读出恰好 `dst.len()` 字节并推进读游标。
    pub fn read_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        self.peek_bytes(dst)?;
        self.pos_read += dst.len();
        Ok(())
    }

    /// 与 [`WireBuffer::read_bytes`] 相同的校验与拷贝，但不推进游标。
    pub fn peek_bytes(&mut self, dst: &mut [u8]) -> Result<()> {
        if dst.len() > self.used_space() {
            self.fail = true;
            return Err(CoreError::new(
                codes::BUFFER_INSUFFICIENT_DATA,
                "read exceeds unread payload",
            ));
        }
        if !dst.is_empty() {
            // SAFETY: [r, r+len) 在未读区间内且已初始化。
            unsafe {
                ptr::copy_nonoverlapping(self.raw.as_ptr().add(self.pos_read), dst.as_mut_ptr(), dst.len());
            }
        }
        Ok(())
    }

    /// 写入一个定宽标量（小端上线）。
    pub fn write_num<V: Scalar>(&mut self, value: V) -> Result<()> {
        let mut raw = [0u8; 8];
        value.write_le(&mut raw);
        self.write_bytes(&raw[..V::SIZE])
    }

    /// 读出一个定宽标量并推进游标。
    pub fn read_num<V: Scalar>(&mut self) -> Result<V> {
        let value = self.peek_num::<V>()?;
        self.pos_read += V::SIZE;
        Ok(value)
    }

    /// 窥视一个定宽标量，不推进游标。
    pub fn peek_num<V: Scalar>(&mut self) -> Result<V> {
        let mut raw = [0u8; 8];
        self.peek_bytes(&mut raw[..V::SIZE])?;
        Ok(V::read_le(&raw[..V::SIZE]))
    }

    /// 写入 UTF-8 字符串：`u32` 小端长度前缀（字节数）+ 原始字节。
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        self.write_str_with::<u32>(value)
    }

    /// 指定长度前缀类型的 [`WireBuffer::write_str`]。
    pub fn write_str_with<L: LenPrefix>(&mut self, value: &str) -> Result<()> {
        self.write_units::<L, u8>(value.as_bytes())
    }

    /// 读出 UTF-8 字符串（`u32` 前缀）。
    ///
    /// 负载不是合法 UTF-8 时置失败位、回退游标并返回
    /// [`codes::BUFFER_MALFORMED_TEXT`]。
    pub fn read_string(&mut self) -> Result<String> {
        self.read_string_with::<u32>()
    }

    /// 指定长度前缀类型的 [`WireBuffer::read_string`]。
    pub fn read_string_with<L: LenPrefix>(&mut self) -> Result<String> {
        let start = self.pos_read;
        let raw = self.read_units::<L, u8>()?;
        match String::from_utf8(raw) {
            Ok(text) => Ok(text),
            Err(_) => {
                self.pos_read = start;
                self.fail = true;
                Err(CoreError::new(
                    codes::BUFFER_MALFORMED_TEXT,
                    "string payload is not valid UTF-8",
                ))
            }
        }
    }

    /// 窥视 UTF-8 字符串：返回值但不推进游标。
    pub fn peek_string(&mut self) -> Result<String> {
        self.peek_string_with::<u32>()
    }

    /// 指定长度前缀类型的 [`WireBuffer::peek_string`]。
    pub fn peek_string_with<L: LenPrefix>(&mut self) -> Result<String> {
        let start = self.pos_read;
        let text = self.read_string_with::<L>()?;
        self.pos_read = start;
        Ok(text)
    }

    /// 写入 UTF-16 码元串：前缀记录码元个数，各码元小端上线。
    pub fn write_utf16(&mut self, units: &[u16]) -> Result<()> {
        self.write_utf16_with::<u32>(units)
    }

    /// 指定长度前缀类型的 [`WireBuffer::write_utf16`]。
    pub fn write_utf16_with<L: LenPrefix>(&mut self, units: &[u16]) -> Result<()> {
        self.write_units::<L, u16>(units)
    }

    /// 读出 UTF-16 码元串；不做配对合法性校验，保持码元语义。
    pub fn read_utf16(&mut self) -> Result<Vec<u16>> {
        self.read_utf16_with::<u32>()
    }

    /// 指定长度前缀类型的 [`WireBuffer::read_utf16`]。
    pub fn read_utf16_with<L: LenPrefix>(&mut self) -> Result<Vec<u16>> {
        self.read_units::<L, u16>()
    }

    /// 窥视 UTF-16 码元串。
    pub fn peek_utf16(&mut self) -> Result<Vec<u16>> {
        let start = self.pos_read;
        let units = self.read_utf16()?;
        self.pos_read = start;
        Ok(units)
    }

    /// 写入 UTF-32 码元串。
    pub fn write_utf32(&mut self, units: &[u32]) -> Result<()> {
        self.write_utf32_with::<u32>(units)
    }

    /// 指定长度前缀类型的 [`WireBuffer::write_utf32`]。
    pub fn write_utf32_with<L: LenPrefix>(&mut self, units: &[u32]) -> Result<()> {
        self.write_units::<L, u32>(units)
    }

    /// 读出 UTF-32 码元串。
    pub fn read_utf32(&mut self) -> Result<Vec<u32>> {
        self.read_utf32_with::<u32>()
    }

    /// 指定长度前缀类型的 [`WireBuffer::read_utf32`]。
    pub fn read_utf32_with<L: LenPrefix>(&mut self) -> Result<Vec<u32>> {
        self.read_units::<L, u32>()
    }

    /// 窥视 UTF-32 码元串。
    pub fn peek_utf32(&mut self) -> Result<Vec<u32>> {
        let start = self.pos_read;
        let units = self.read_utf32()?;
        self.pos_read = start;
        Ok(units)
    }

    /// 写入 C 字符串：线格式与 [`WireBuffer::write_str`] 完全一致，
    /// 长度为终止符之前的字节数。
    pub fn write_c_str(&mut self, value: &CStr) -> Result<()> {
        self.write_c_str_with::<u32>(value)
    }

    /// 指定长度前缀类型的 [`WireBuffer::write_c_str`]。
    pub fn write_c_str_with<L: LenPrefix>(&mut self, value: &CStr) -> Result<()> {
        self.write_units::<L, u8>(value.to_bytes())
    }

    /// 读出 C 字符串：把负载拷入 `dst` 并补零终止。
    ///
    /// `dst` 放不下“负载 + 终止符”时置失败位并返回
    /// [`codes::BUFFER_DESTINATION_TOO_SMALL`]，游标不动。
    pub fn read_c_str_into<'d>(&mut self, dst: &'d mut [u8]) -> Result<&'d CStr> {
        self.read_c_str_into_with::<u32>(dst)
    }

    /// 指定长度前缀类型的 [`WireBuffer::read_c_str_into`]。
    pub fn read_c_str_into_with<'d, L: LenPrefix>(
        &mut self,
        dst: &'d mut [u8],
    ) -> Result<&'d CStr> {
        let len = self.check_payload::<L>(1)?;
        if len + 1 > dst.len() {
            self.fail = true;
            return Err(CoreError::new(
                codes::BUFFER_DESTINATION_TOO_SMALL,
                "destination cannot hold payload and terminator",
            ));
        }
        if len > 0 {
            // SAFETY: check_payload 已确认负载完整在未读区间内。
            unsafe {
                ptr::copy_nonoverlapping(
                    self.raw.as_ptr().add(self.pos_read + L::SIZE),
                    dst.as_mut_ptr(),
                    len,
                );
            }
        }
        dst[len] = 0;
        self.pos_read += L::SIZE + len;
        // 负载若含内嵌 0，与 C 惯例相同：字符串在首个 0 处截断。
        Ok(CStr::from_bytes_until_nul(&dst[..=len]).expect("terminator was appended above"))
    }

    /// 校验“前缀 + `unit_size` 宽码元负载”完整存在，返回负载字节数。
    ///
    /// 任何一步失败都置失败位且不移动游标。
    fn check_payload<L: LenPrefix>(&mut self, unit_size: usize) -> Result<usize> {
        let prefix: L = self.peek_num()?;
        let payload = prefix
            .to_len()
            .checked_mul(unit_size as u64)
            .and_then(|bytes| bytes.checked_add(L::SIZE as u64));
        match payload {
            Some(total) if total <= self.used_space() as u64 => {
                Ok((total - L::SIZE as u64) as usize)
            }
            _ => {
                self.fail = true;
                Err(CoreError::new(
                    codes::BUFFER_INSUFFICIENT_DATA,
                    "string payload is not fully present",
                ))
            }
        }
    }

    fn write_units<L: LenPrefix, U: Scalar>(&mut self, units: &[U]) -> Result<()> {
        let Some(prefix) = L::from_len(units.len()) else {
            self.fail = true;
            return Err(CoreError::new(
                codes::BUFFER_LENGTH_OVERFLOW,
                "length does not fit the chosen prefix type",
            ));
        };
        // 切片本身占据内存，字节数不会越过 isize::MAX。
        let payload = units.len() * U::SIZE;
        if L::SIZE + payload > self.available_space() {
            self.fail = true;
            return Err(CoreError::new(
                codes::BUFFER_INSUFFICIENT_SPACE,
                "prefixed payload exceeds free space",
            ));
        }

        let written = self.write_num::<L>(prefix);
        debug_assert!(written.is_ok());

        if U::SIZE == 1 || cfg!(target_endian = "little") {
            if payload > 0 {
                // SAFETY: 容量已校验；小端主机（或单字节码元）下内存表示
                // 即线格式，可整段拷贝。
                unsafe {
                    ptr::copy_nonoverlapping(
                        units.as_ptr().cast::<u8>(),
                        self.raw.as_ptr().add(self.pos_write),
                        payload,
                    );
                }
            }
            self.pos_write += payload;
        } else {
            for &unit in units {
                let written = self.write_num::<U>(unit);
                debug_assert!(written.is_ok());
            }
        }
        Ok(())
    }

    fn read_units<L: LenPrefix, U: Scalar>(&mut self) -> Result<Vec<U>> {
        let payload = self.check_payload::<L>(U::SIZE)?;
        let count = payload / U::SIZE;
        self.pos_read += L::SIZE;

        let mut units: Vec<U> = Vec::with_capacity(count);
        if U::SIZE == 1 || cfg!(target_endian = "little") {
            if payload > 0 {
                // SAFETY: 负载完整在未读区间；Vec 预留了 count 个码元的
                // 空间，小端主机下内存表示即线格式。
                unsafe {
                    ptr::copy_nonoverlapping(
                        self.raw.as_ptr().add(self.pos_read),
                        units.as_mut_ptr().cast::<u8>(),
                        payload,
                    );
                    units.set_len(count);
                }
            }
            self.pos_read += payload;
        } else {
            for _ in 0..count {
                let unit = self.read_num::<U>();
                debug_assert!(unit.is_ok());
                if let Ok(unit) = unit {
                    units.push(unit);
                }
            }
        }
        Ok(units)
    }
}

impl Default for WireBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for WireBuffer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WireBuffer")
            .field("capacity", &self.capacity())
            .field("read_pos", &self.pos_read)
            .field("write_pos", &self.pos_write)
            .field("fail", &self.fail)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 容量 0 的缓冲：不分配、任何有长度的操作干净失败。
    #[test]
    fn zero_capacity_rejects_sized_operations() {
        let mut buf = WireBuffer::new();
        assert_eq!(buf.capacity(), 0);
        assert!(buf.is_empty() && buf.is_full());

        assert!(buf.write_bytes(&[1]).is_err());
        assert!(buf.fail());

        buf.clear();
        assert!(!buf.fail());
        // 零长度操作不算短写。
        assert!(buf.write_bytes(&[]).is_ok());
        assert!(!buf.fail());
    }

    /// `free_mut` + `advance_write` 的免拷贝路径要与常规读取互通。
    #[test]
    fn free_region_feeds_reader() {
        let mut buf = WireBuffer::with_capacity(8);
        for (slot, byte) in buf.free_mut().iter_mut().zip([7u8, 8, 9]) {
            slot.write(byte);
        }
        buf.advance_write(3);

        assert_eq!(buf.unread(), &[7, 8, 9]);
        let mut out = [0u8; 3];
        buf.read_bytes(&mut out).expect("负载已就位");
        assert_eq!(out, [7, 8, 9]);
        assert!(buf.is_empty());
    }

    /// 越界推进是逻辑错误，必须当场 panic。
    #[test]
    #[should_panic(expected = "advance_write past free space")]
    fn advance_write_past_capacity_panics() {
        let mut buf = WireBuffer::with_capacity(4);
        buf.advance_write(5);
    }

    /// 长度超出 `u8` 前缀表示范围时拒绝写入而非截断。
    #[test]
    fn oversized_prefix_is_rejected() {
        let mut buf = WireBuffer::with_capacity(1024);
        let long = "x".repeat(300);
        let err = buf.write_str_with::<u8>(&long).unwrap_err();
        assert_eq!(err.code(), codes::BUFFER_LENGTH_OVERFLOW);
        assert!(buf.fail());
        assert_eq!(buf.write_pos(), 0, "失败的写入不得提交任何字节");
    }
}
