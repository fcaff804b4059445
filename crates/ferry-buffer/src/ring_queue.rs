//! 单线程有界 FIFO：在一段对齐的裸分配上原地构造与析构 `T`。
//!
//! # 模块定位（Why）
//! - 流水线相邻两个单线程阶段之间交接已定型的元素时，不需要原子开销，
//!   只需要一个容量确定、满了就拒绝的环形队列；
//! - 槽位数取 `capacity + 1`：永远留一个空槽，使“满”与“空”可以仅凭
//!   两个下标区分，无需额外计数。
//!
//! # 契约说明（What）
//! - 只增不减的容量策略：[`RingQueue::try_resize_buffer`] 请求不大于现
//!   容量时成功但不动作，收缩必须显式 [`RingQueue::shrink_to_fit`]；
//! - 占用槽持有已构造的 `T`，其余槽是未初始化存储；弹出与整体析构负责
//!   运行析构函数；
//! - 分配器身份固定为全局分配器，[`RingQueue::swap`] 交换全部状态。

use alloc::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use core::mem;
use core::ptr;

/// 有界环形队列。
///
/// # 结构解析（How）
/// - `slots` 指向 `capacity + 1` 个 `T` 槽位的对齐分配（容量 0 时悬空）；
/// - 计数恒等于 `(W − R) mod (capacity + 1)`；
/// - 扩缩容把现存元素按 FIFO 序搬到新分配的 `[0, size)`，随后
///   `R = 0`、`W = size`。
///
/// 零尺寸类型没有可安排的槽位语义，在常量求值阶段拒绝。
pub struct RingQueue<T> {
    slots: *mut T,
    cap_plus_one: usize,
    read_idx: usize,
    write_idx: usize,
}

impl<T> RingQueue<T> {
    const NOT_ZST: () = assert!(
        mem::size_of::<T>() != 0,
        "RingQueue does not support zero-sized element types"
    );

    /// 容量 0 的队列，不发生分配；`empty` 与 `full` 同时为真。
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 预留 `capacity` 个元素的队列。
    pub fn with_capacity(capacity: usize) -> Self {
        let () = Self::NOT_ZST;
        let mut queue = Self {
            slots: ptr::null_mut(),
            cap_plus_one: 1,
            read_idx: 0,
            write_idx: 0,
        };
        if capacity > 0 {
            queue.slots = Self::allocate(capacity + 1);
            queue.cap_plus_one = capacity + 1;
        }
        queue
    }

    /// 可容纳的元素上限。
    pub fn capacity(&self) -> usize {
        self.cap_plus_one - 1
    }

    /// 当前元素个数。
    pub fn size(&self) -> usize {
        (self.write_idx + self.cap_plus_one - self.read_idx) % self.cap_plus_one
    }

    /// 是否为空。
    pub fn is_empty(&self) -> bool {
        self.read_idx == self.write_idx
    }

    /// 是否已满（含容量 0 的退化情形）。
    pub fn is_full(&self) -> bool {
        self.step(self.write_idx, 1) == self.read_idx
    }

    /// 尝试入队；队列已满时把值原样退还给调用方。
    pub fn try_push(&mut self, value: T) -> Result<(), T> {
        if self.is_full() {
            return Err(value);
        }
        // SAFETY: 未满保证 W 槽为空闲的未初始化存储，且落在分配内。
        unsafe { ptr::write(self.slots.add(self.write_idx), value) };
        self.write_idx = self.step(self.write_idx, 1);
        Ok(())
    }

    /// 有空槽时才执行 `init` 并入队；返回是否成功。
    ///
    /// 这是“原地构造”的等价物：构造代价只在确有槽位时支付。
    pub fn try_push_with(&mut self, init: impl FnOnce() -> T) -> bool {
        if self.is_full() {
            return false;
        }
        // SAFETY: 同 try_push。
        unsafe { ptr::write(self.slots.add(self.write_idx), init()) };
        self.write_idx = self.step(self.write_idx, 1);
        true
    }

    /// 队首引用。
    ///
    /// # Panics
    /// 队列为空时 panic。
    pub fn front(&self) -> &T {
        assert!(!self.is_empty(), "front() on empty RingQueue");
        // SAFETY: 非空保证 R 槽持有已构造元素。
        unsafe { &*self.slots.add(self.read_idx) }
    }

    /// 队首可变引用。
    ///
    /// # Panics
    /// 队列为空时 panic。
    pub fn front_mut(&mut self) -> &mut T {
        assert!(!self.is_empty(), "front_mut() on empty RingQueue");
        // SAFETY: 同 front。
        unsafe { &mut *self.slots.add(self.read_idx) }
    }

    /// 队尾引用（最近入队的元素）。
    ///
    /// # Panics
    /// 队列为空时 panic。
    pub fn back(&self) -> &T {
        assert!(!self.is_empty(), "back() on empty RingQueue");
        let idx = self.step(self.write_idx, -1);
        // SAFETY: 非空保证 W−1 槽持有已构造元素。
        unsafe { &*self.slots.add(idx) }
    }

    /// 队尾可变引用。
    ///
    /// # Panics
    /// 队列为空时 panic。
    pub fn back_mut(&mut self) -> &mut T {
        assert!(!self.is_empty(), "back_mut() on empty RingQueue");
        let idx = self.step(self.write_idx, -1);
        // SAFETY: 同 back。
        unsafe { &mut *self.slots.add(idx) }
    }

    /// 弹出队首元素；空队列返回 `None`。
    ///
    /// 元素被移出到调用方，析构时机随返回值的生命周期。
    pub fn pop(&mut self) -> Option<T> {
        if self.is_empty() {
            return None;
        }
        // SAFETY: 非空保证 R 槽持有已构造元素；读出后该槽回归未初始化。
        let value = unsafe { ptr::read(self.slots.add(self.read_idx)) };
        self.read_idx = self.step(self.read_idx, 1);
        Some(value)
    }

    /// 请求把预留空间调整到 `new_capacity`。
    ///
    /// - `new_capacity < size()`：失败，返回 `false`；
    /// - `new_capacity ≤ capacity()`：成功但保持现容量（只增不减）；
    /// - 其余情形扩容并按 FIFO 序搬移元素。
    pub fn try_resize_buffer(&mut self, new_capacity: usize) -> bool {
        if new_capacity < self.size() {
            return false;
        }
        if new_capacity <= self.capacity() {
            return true;
        }
        self.resize(new_capacity);
        true
    }

    /// 若有富余空间，把容量收缩到恰好等于当前元素个数。
    pub fn shrink_to_fit(&mut self) {
        if !self.is_full() {
            self.resize(self.size());
        }
    }

    /// 交换两个队列的全部状态（缓冲、下标、容量）。
    ///
    /// 分配器身份固定为全局分配器，无传播语义可言。
    pub fn swap(&mut self, other: &mut Self) {
        mem::swap(self, other);
    }

    fn resize(&mut self, new_capacity: usize) {
        let count = self.size();
        if new_capacity == 0 {
            debug_assert!(count == 0);
            self.release_storage();
            self.slots = ptr::null_mut();
            self.cap_plus_one = 1;
            self.read_idx = 0;
            self.write_idx = 0;
            return;
        }

        let new_slots = Self::allocate(new_capacity + 1);
        let mut old_idx = self.read_idx;
        for new_idx in 0..count {
            // SAFETY: 旧槽 old_idx 持有元素；读出即转移所有权，旧槽随后
            // 只被整体释放，不再触碰。
            unsafe {
                ptr::write(new_slots.add(new_idx), ptr::read(self.slots.add(old_idx)));
            }
            old_idx = self.step(old_idx, 1);
        }

        self.release_storage();
        self.slots = new_slots;
        self.cap_plus_one = new_capacity + 1;
        self.read_idx = 0;
        self.write_idx = count;
    }

    /// 带符号步进后对 `capacity + 1` 取非负模，是所有下标运算的唯一入口。
    fn step(&self, idx: usize, delta: isize) -> usize {
        let len = self.cap_plus_one as isize;
        (idx as isize + delta).rem_euclid(len) as usize
    }

    fn allocate(slot_count: usize) -> *mut T {
        let layout = Self::slots_layout(slot_count);
        // SAFETY: layout 尺寸非零（T 非零尺寸且 slot_count ≥ 1）。
        let raw = unsafe { alloc(layout) };
        if raw.is_null() {
            handle_alloc_error(layout);
        }
        raw.cast()
    }

    fn release_storage(&mut self) {
        if !self.slots.is_null() {
            // SAFETY: slots 来自同布局的 allocate，仅释放一次。
            unsafe { dealloc(self.slots.cast(), Self::slots_layout(self.cap_plus_one)) };
        }
    }

    fn slots_layout(slot_count: usize) -> Layout {
        Layout::array::<T>(slot_count).expect("slot array layout fits isize")
    }
}

impl<T> Default for RingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for RingQueue<T> {
    fn drop(&mut self) {
        if self.slots.is_null() {
            return;
        }
        while self.pop().is_some() {}
        self.release_storage();
    }
}

// SAFETY: 队列独占其存储；跨线程移动只要求元素可移动，共享只读访问
// 要求元素可共享。
unsafe impl<T: Send> Send for RingQueue<T> {}
unsafe impl<T: Sync> Sync for RingQueue<T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::rc::Rc;
    use core::cell::RefCell;

    /// 基础 FIFO：入队顺序即出队顺序，front/back 指向两端。
    #[test]
    fn fifo_order_is_preserved() {
        let mut queue = RingQueue::with_capacity(3);
        assert!(queue.try_push(1).is_ok());
        assert!(queue.try_push(2).is_ok());
        assert!(queue.try_push(3).is_ok());
        assert_eq!(queue.try_push(4), Err(4), "满队列必须退还原值");

        assert_eq!(*queue.front(), 1);
        assert_eq!(*queue.back(), 3);
        assert_eq!(queue.pop(), Some(1));
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    /// 满槽时 `try_push_with` 不得执行构造闭包。
    #[test]
    fn push_with_skips_construction_when_full() {
        let constructed = Rc::new(RefCell::new(0));
        let mut queue = RingQueue::with_capacity(1);

        let tally = Rc::clone(&constructed);
        assert!(queue.try_push_with(move || {
            *tally.borrow_mut() += 1;
            42
        }));

        let tally = Rc::clone(&constructed);
        assert!(!queue.try_push_with(move || {
            *tally.borrow_mut() += 1;
            43
        }));

        assert_eq!(*constructed.borrow(), 1, "被拒绝的入队不应付出构造代价");
    }

    /// 析构队列时残留元素的析构函数必须全部运行。
    #[test]
    fn drop_runs_remaining_destructors() {
        let alive = Rc::new(RefCell::new(0));

        struct Tracked(Rc<RefCell<i32>>);
        impl Drop for Tracked {
            fn drop(&mut self) {
                *self.0.borrow_mut() -= 1;
            }
        }

        {
            let mut queue = RingQueue::with_capacity(4);
            for _ in 0..3 {
                *alive.borrow_mut() += 1;
                assert!(queue.try_push(Tracked(Rc::clone(&alive))).is_ok());
            }
            let popped = queue.pop().expect("队列非空");
            drop(popped);
            assert_eq!(*alive.borrow(), 2);
        }
        assert_eq!(*alive.borrow(), 0, "队列析构应补齐剩余元素的析构");
    }

    /// 回绕多圈后下标运算与元素序仍然一致。
    #[test]
    fn wrap_around_keeps_order() {
        let mut queue = RingQueue::with_capacity(4);
        for round in 0..10 {
            for value in 0..4 {
                assert!(queue.try_push(round * 4 + value).is_ok());
            }
            for value in 0..4 {
                assert_eq!(queue.pop(), Some(round * 4 + value));
            }
        }
    }

    /// `swap` 交换全部状态，双方各自保持自洽。
    #[test]
    fn swap_exchanges_whole_state() {
        let mut lhs = RingQueue::with_capacity(2);
        let mut rhs = RingQueue::new();
        assert!(lhs.try_push(5).is_ok());

        lhs.swap(&mut rhs);
        assert_eq!(lhs.capacity(), 0);
        assert!(lhs.is_empty());
        assert_eq!(rhs.capacity(), 2);
        assert_eq!(rhs.pop(), Some(5));
    }
}
