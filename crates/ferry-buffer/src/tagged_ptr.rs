//! 指针与整数标签打包进同一 64 位字的原语，含可 CAS 的原子形态。
//!
//! # 设计背景（Why）
//! - 无锁自由链表的头指针若只存裸指针，弹出-压回之间链表结构可能已被
//!   他人改写而指针值恰好复原（ABA）；把单调递增的标签与指针打包进同
//!   一个可原子交换的字，失败的 CAS 会因标签不同而被识破。
//! - 标签借用的是指针中“必然为零”的位：高位取虚拟地址宽度 `VA_BITS`
//!   之上的区间，低位取指向目标对齐值之下的区间；两段在读写时拼合为
//!   一个连续的逻辑标签。
//!
//! # 契约说明（What）
//! - 仅支持 64 位目标；`VA_BITS` 为类型级配置（默认 56），对应典型
//!   五级页表之前的用户态地址宽度；
//! - 非法配置（`VA_BITS ∉ [8, 64]`、两段掩码重叠、目标对齐不足）在
//!   常量求值阶段直接拒绝编译；
//! - 指针地址若占用任何标签位，构造与 `set_ptr` 以 panic 报告——这是
//!   调用方的逻辑错误，而非可恢复的运行期失败。

use core::fmt;
use core::marker::PhantomData;
use core::mem;

use crate::sync::{AtomicUsize, Ordering};

/// 打包了 `*mut T` 与标签的 64 位字。
///
/// 相等性按整字逐位比较；`Copy` 语义与裸指针一致，复制不影响指向对象。
pub struct TaggedPtr<T, const VA_BITS: u32 = 56> {
    packed: usize,
    _marker: PhantomData<*mut T>,
}

impl<T, const VA_BITS: u32> TaggedPtr<T, VA_BITS> {
    /// 高位标签占据的位数（`64 − VA_BITS`）。
    pub const UPPER_TAG_BITS: u32 = 64 - VA_BITS;
    /// 高位标签掩码：`[VA_BITS, 64)` 区间全 1。
    pub const UPPER_TAG_MASK: usize = if VA_BITS == 64 {
        0
    } else {
        usize::MAX << VA_BITS
    };

    /// 低位标签占据的位数（`log2(align_of::<T>())`）。
    pub const LOWER_TAG_BITS: u32 = mem::align_of::<T>().trailing_zeros();
    /// 低位标签掩码：对齐值以下全 1。
    pub const LOWER_TAG_MASK: usize = mem::align_of::<T>() - 1;

    /// 完整标签掩码，指针地址不得与其相交。
    pub const TAG_MASK: usize = Self::UPPER_TAG_MASK | Self::LOWER_TAG_MASK;
    /// 逻辑标签的总位宽，`increase_tag` 以 `2^TAG_BITS` 为周期回绕。
    pub const TAG_BITS: u32 = Self::UPPER_TAG_BITS + Self::LOWER_TAG_BITS;

    /// 高低两段拼接时高段需要右移的位数。
    const SPLIT_SHIFT: u32 = VA_BITS - Self::LOWER_TAG_BITS;

    /// 配置合法性检查，在常量求值阶段执行；任何实例化入口都会触发。
    const LAYOUT_CHECKS: () = {
        assert!(
            mem::size_of::<usize>() == 8,
            "tagged pointer packing requires a 64-bit target"
        );
        assert!(8 <= VA_BITS && VA_BITS <= 64, "VA_BITS must lie in [8, 64]");
        assert!(
            mem::align_of::<T>() >= 2,
            "pointee alignment must be at least 2 to donate low tag bits"
        );
        assert!(
            Self::UPPER_TAG_MASK & Self::LOWER_TAG_MASK == 0,
            "tag masks overlap; VA_BITS is too small for this alignment"
        );
        assert!(
            VA_BITS >= Self::LOWER_TAG_BITS,
            "VA_BITS is smaller than the pointee alignment width"
        );
    };

    /// 空指针、零标签的打包字。
    pub fn null() -> Self {
        let () = Self::LAYOUT_CHECKS;
        Self {
            packed: 0,
            _marker: PhantomData,
        }
    }

    /// 以零标签打包 `ptr`。
    ///
    /// # Panics
    /// `ptr` 的地址占用标签位时 panic：说明 `VA_BITS` 配置不符合运行
    /// 环境，或指针对 `T` 而言未对齐。
    pub fn new(ptr: *mut T) -> Self {
        let () = Self::LAYOUT_CHECKS;
        let addr = ptr as usize;
        assert!(
            addr & Self::TAG_MASK == 0,
            "pointer address 0x{addr:016x} holds tag bits"
        );
        Self {
            packed: addr,
            _marker: PhantomData,
        }
    }

    /// 以指定标签打包 `ptr`；标签超宽的位被截断。
    pub fn with_tag(ptr: *mut T, tag: usize) -> Self {
        let mut packed = Self::new(ptr);
        packed.set_tag(tag);
        packed
    }

    /// 取出指针部分。
    pub fn get_ptr(self) -> *mut T {
        (self.packed & !Self::TAG_MASK) as *mut T
    }

    /// 替换指针部分，保留现有标签。
    ///
    /// # Panics
    /// 同 [`TaggedPtr::new`]，地址占用标签位时 panic。
    pub fn set_ptr(&mut self, ptr: *mut T) {
        let addr = ptr as usize;
        assert!(
            addr & Self::TAG_MASK == 0,
            "pointer address 0x{addr:016x} holds tag bits"
        );
        self.packed = (self.packed & Self::TAG_MASK) | addr;
    }

    /// 指针部分是否为空。
    pub fn is_null(self) -> bool {
        self.get_ptr().is_null()
    }

    /// 取出逻辑标签：高低两段无损拼合。
    pub fn get_tag(self) -> usize {
        ((self.packed & Self::UPPER_TAG_MASK) >> Self::SPLIT_SHIFT)
            | (self.packed & Self::LOWER_TAG_MASK)
    }

    /// 写入逻辑标签；超出 [`TaggedPtr::TAG_BITS`] 的位被静默截断。
    pub fn set_tag(&mut self, tag: usize) {
        let upper = (tag & (Self::UPPER_TAG_MASK >> Self::SPLIT_SHIFT)) << Self::SPLIT_SHIFT;
        let lower = tag & Self::LOWER_TAG_MASK;
        self.packed = (self.packed & !Self::TAG_MASK) | upper | lower;
    }

    /// 标签自增一，按标签位宽回绕；用于每次弹出时压制 ABA。
    pub fn increase_tag(&mut self) {
        self.set_tag(self.get_tag().wrapping_add(1));
    }

    fn from_packed(packed: usize) -> Self {
        Self {
            packed,
            _marker: PhantomData,
        }
    }

    fn into_packed(self) -> usize {
        self.packed
    }
}

impl<T, const VA_BITS: u32> Clone for TaggedPtr<T, VA_BITS> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, const VA_BITS: u32> Copy for TaggedPtr<T, VA_BITS> {}

impl<T, const VA_BITS: u32> PartialEq for TaggedPtr<T, VA_BITS> {
    fn eq(&self, other: &Self) -> bool {
        self.packed == other.packed
    }
}

impl<T, const VA_BITS: u32> Eq for TaggedPtr<T, VA_BITS> {}

impl<T, const VA_BITS: u32> Default for TaggedPtr<T, VA_BITS> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T, const VA_BITS: u32> fmt::Debug for TaggedPtr<T, VA_BITS> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaggedPtr")
            .field("ptr", &self.get_ptr())
            .field("tag", &self.get_tag())
            .finish()
    }
}

/// 持有打包字的原子单元，CAS 语义与 [`core::sync::atomic::AtomicPtr`] 同形。
///
/// 排序由调用方按场景指定：自由链表的弹出走 AcqRel/Acquire，压回走
/// Release——标签只负责识破 ABA，不承担任何排序职责。
pub struct AtomicTaggedPtr<T, const VA_BITS: u32 = 56> {
    packed: AtomicUsize,
    _marker: PhantomData<*mut T>,
}

impl<T, const VA_BITS: u32> AtomicTaggedPtr<T, VA_BITS> {
    /// 以给定初值构造原子单元。
    pub fn new(value: TaggedPtr<T, VA_BITS>) -> Self {
        Self {
            packed: AtomicUsize::new(value.into_packed()),
            _marker: PhantomData,
        }
    }

    /// 原子读取当前打包字。
    pub fn load(&self, order: Ordering) -> TaggedPtr<T, VA_BITS> {
        TaggedPtr::from_packed(self.packed.load(order))
    }

    /// 原子写入打包字。
    pub fn store(&self, value: TaggedPtr<T, VA_BITS>, order: Ordering) {
        self.packed.store(value.into_packed(), order);
    }

    /// 弱形态比较交换；失败返回实际观测值，允许伪失败，须在循环中使用。
    pub fn compare_exchange_weak(
        &self,
        current: TaggedPtr<T, VA_BITS>,
        new: TaggedPtr<T, VA_BITS>,
        success: Ordering,
        failure: Ordering,
    ) -> Result<TaggedPtr<T, VA_BITS>, TaggedPtr<T, VA_BITS>> {
        self.packed
            .compare_exchange_weak(
                current.into_packed(),
                new.into_packed(),
                success,
                failure,
            )
            .map(TaggedPtr::from_packed)
            .map_err(TaggedPtr::from_packed)
    }
}

// SAFETY: 原子单元只搬运地址值本身，解引用责任在使用方；
// 与 `AtomicPtr<T>` 一样对任意 `T` 均可跨线程共享。
unsafe impl<T, const VA_BITS: u32> Send for AtomicTaggedPtr<T, VA_BITS> {}
unsafe impl<T, const VA_BITS: u32> Sync for AtomicTaggedPtr<T, VA_BITS> {}
