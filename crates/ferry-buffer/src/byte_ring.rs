//! 单线程环形字节缓冲：支持回绕两段拷贝的有界字节 FIFO。
//!
//! # 模块定位（Why）
//! - 同一线程内的定帧循环需要“边写边读”的字节缓冲，线性缓冲的单调游标
//!   不敷使用；本类型以回绕下标提供稳定的有界 FIFO；
//! - 底层槽位数为 `effective_capacity + 1`，保留一个哨兵槽区分满与空。
//!
//! # 契约说明（What）
//! - 有效容量即可用字节上限；`available_read + available_write =
//!   effective_capacity` 恒成立；
//! - 满了不自动扩容，由调用方 [`ByteRing::try_resize`]，扩缩容把可读
//!   字节压实到偏移 0。

use core::ptr;

use ferry_core::{codes, CoreError, Result};

use crate::raw_buf::RawBuf;

/// 单线程环形字节缓冲。
///
/// # 结构解析（How）
/// - `cap` 为槽位数（有效容量 + 1），容量 0 时不分配、槽位数记 1；
/// - 读写游标在 `[0, cap)` 内回绕；拷贝若越过缓冲末尾则拆成“先到末尾、
///   再从头部续” 的两段；
/// - 读写均收取 `&mut self`，并发场景请使用
///   [`SpscByteRing`](crate::spsc_ring::SpscByteRing)。
pub struct ByteRing {
    raw: RawBuf,
    cap: usize,
    pos_read: usize,
    pos_write: usize,
}

impl ByteRing {
    /// 有效容量 0 的空环，不发生分配。
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 预留 `effective_capacity` 字节的环。
    pub fn with_capacity(effective_capacity: usize) -> Self {
        let raw = if effective_capacity == 0 {
            RawBuf::empty()
        } else {
            RawBuf::allocate(effective_capacity + 1)
        };
        Self {
            raw,
            cap: effective_capacity + 1,
            pos_read: 0,
            pos_write: 0,
        }
    }

    /// 可用字节上限。
    pub fn effective_capacity(&self) -> usize {
        self.cap - 1
    }

    /// 当前可读字节数。
    pub fn available_read(&self) -> usize {
        (self.cap + self.pos_write - self.pos_read) % self.cap
    }

    /// 当前可写字节数。
    pub fn available_write(&self) -> usize {
        self.effective_capacity() - self.available_read()
    }

    /// 是否无可读字节。
    pub fn is_empty(&self) -> bool {
        self.pos_read == self.pos_write
    }

    /// 是否已无可写空间。
    pub fn is_full(&self) -> bool {
        self.available_write() == 0
    }

    /// 写入 `src` 的全部字节；空间不足整体拒绝，不产生部分写。
    pub fn try_write(&mut self, src: &[u8]) -> Result<()> {
        if src.len() > self.available_write() {
            return Err(CoreError::new(
                codes::RING_INSUFFICIENT_SPACE,
                "write exceeds ring free space",
            ));
        }
        copy_in(self.raw.as_ptr(), self.cap, self.pos_write, src);
        self.pos_write = (self.pos_write + src.len()) % self.cap;
        Ok(())
    }

    /// 读出恰好 `dst.len()` 字节并推进读游标。
    pub fn try_read(&mut self, dst: &mut [u8]) -> Result<()> {
        self.try_peek(dst)?;
        self.pos_read = (self.pos_read + dst.len()) % self.cap;
        Ok(())
    }

    /// 与 [`ByteRing::try_read`] 相同的拷贝，但不推进游标。
    pub fn try_peek(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() > self.available_read() {
            return Err(CoreError::new(
                codes::RING_INSUFFICIENT_DATA,
                "read exceeds ring readable bytes",
            ));
        }
        copy_out(self.raw.as_ptr(), self.cap, self.pos_read, dst);
        Ok(())
    }

    /// 丢弃全部内容，游标归零；容量不变。
    pub fn clear(&mut self) {
        self.pos_read = 0;
        self.pos_write = 0;
    }

    /// 重新分配到新的有效容量，并把可读字节压实到偏移 0。
    ///
    /// 新容量小于现有可读量、或与现有效容量相同，返回 `false`。
    pub fn try_resize(&mut self, new_effective_capacity: usize) -> bool {
        let used = self.available_read();
        if new_effective_capacity < used || new_effective_capacity == self.effective_capacity() {
            return false;
        }

        let new_raw = if new_effective_capacity == 0 {
            RawBuf::empty()
        } else {
            RawBuf::allocate(new_effective_capacity + 1)
        };
        if used > 0 {
            // 压实：把可能跨越回绕点的可读区间连续拷贝到新缓冲头部。
            // SAFETY: used ≤ new_effective_capacity，目标区间在新分配内。
            unsafe {
                copy_out_raw(self.raw.as_ptr(), self.cap, self.pos_read, new_raw.as_ptr(), used);
            }
        }

        self.raw = new_raw;
        self.cap = new_effective_capacity + 1;
        self.pos_read = 0;
        self.pos_write = used;
        true
    }
}

impl Default for ByteRing {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for ByteRing {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ByteRing")
            .field("effective_capacity", &self.effective_capacity())
            .field("available_read", &self.available_read())
            .finish()
    }
}

/// 向环内 `pos` 起写入 `src`，必要时按回绕点拆成两段。
///
/// 调用方负责保证 `src.len()` 不超过可写量。
pub(crate) fn copy_in(buf: *mut u8, cap: usize, pos: usize, src: &[u8]) {
    if src.is_empty() {
        return;
    }
    let consecutive = cap - pos;
    if src.len() <= consecutive {
        // SAFETY: [pos, pos+len) 在分配内。
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), buf.add(pos), src.len()) };
    } else {
        let (first, second) = src.split_at(consecutive);
        // SAFETY: 第一段填到缓冲末尾，第二段从头部续写；调用方已保证
        // 总长不超过可写量，两段互不越界。
        unsafe {
            ptr::copy_nonoverlapping(first.as_ptr(), buf.add(pos), first.len());
            ptr::copy_nonoverlapping(second.as_ptr(), buf, second.len());
        }
    }
}

/// 自环内 `pos` 起读出填满 `dst`，必要时按回绕点拆成两段。
///
/// 调用方负责保证 `dst.len()` 不超过可读量。
pub(crate) fn copy_out(buf: *const u8, cap: usize, pos: usize, dst: &mut [u8]) {
    // SAFETY: 目标由切片担保有效，长度约束由调用方担保。
    unsafe { copy_out_raw(buf, cap, pos, dst.as_mut_ptr(), dst.len()) };
}

/// [`copy_out`] 的裸指针形态，供扩缩容把可读区间搬进尚未初始化的新分配。
///
/// # Safety
/// `dst` 必须指向至少 `len` 字节的可写内存，且 `len` 不超过环内可读量。
pub(crate) unsafe fn copy_out_raw(buf: *const u8, cap: usize, pos: usize, dst: *mut u8, len: usize) {
    if len == 0 {
        return;
    }
    let consecutive = cap - pos;
    if len <= consecutive {
        // SAFETY: [pos, pos+len) 在分配内且为已写入字节。
        unsafe { ptr::copy_nonoverlapping(buf.add(pos), dst, len) };
    } else {
        // SAFETY: 同 copy_in 的两段论证，方向相反。
        unsafe {
            ptr::copy_nonoverlapping(buf.add(pos), dst, consecutive);
            ptr::copy_nonoverlapping(buf, dst.add(consecutive), len - consecutive);
        }
    }
}
