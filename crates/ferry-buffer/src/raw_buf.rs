//! 裸字节分配的所有权载体，供线性缓冲与两种环形字节缓冲共用。

use alloc::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use core::ptr;

/// 一段对齐为 1 的裸字节分配；长度为 0 时不持有任何内存。
///
/// 容器只关心“一段可读写的原始字节”与确定性的释放，这里集中承载
/// 分配、释放与空分配的判空约定，避免每个容器重复同一套 `unsafe`。
#[derive(Debug)]
pub(crate) struct RawBuf {
    ptr: *mut u8,
    len: usize,
}

impl RawBuf {
    /// 不持有内存的空缓冲。
    pub(crate) const fn empty() -> Self {
        Self {
            ptr: ptr::null_mut(),
            len: 0,
        }
    }

    /// 分配 `len` 字节；`len == 0` 时不分配。
    ///
    /// 分配失败走 [`handle_alloc_error`]，与全局分配器的既有语义一致。
    pub(crate) fn allocate(len: usize) -> Self {
        if len == 0 {
            return Self::empty();
        }
        let layout = Self::layout(len);
        // SAFETY: layout 尺寸非零，由 `Layout::array::<u8>` 构造，合法。
        let ptr = unsafe { alloc(layout) };
        if ptr.is_null() {
            handle_alloc_error(layout);
        }
        Self { ptr, len }
    }

    pub(crate) fn as_ptr(&self) -> *mut u8 {
        self.ptr
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    fn layout(len: usize) -> Layout {
        Layout::array::<u8>(len).expect("字节布局不会超过 isize::MAX")
    }
}

impl Drop for RawBuf {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            // SAFETY: ptr 来自同布局的 `alloc`，仅释放一次。
            unsafe { dealloc(self.ptr, Self::layout(self.len)) };
        }
    }
}

// SAFETY: RawBuf 独占其分配，跨线程移动与共享只读指针均无别名冲突。
unsafe impl Send for RawBuf {}
unsafe impl Sync for RawBuf {}
