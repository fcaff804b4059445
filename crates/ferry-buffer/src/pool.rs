//! 无锁对象池：按块增长的槽位仓库 + 标签指针自由链表。
//!
//! # 模块定位（Why）
//! - 消息对象的分配/回收频率远高于其生命周期多样性，逐次走全局分配器
//!   既慢又抖；池把槽位按块批发进来，以无锁自由链表零散零售出去；
//! - 自由链表头是 [`AtomicTaggedPtr`]：每次弹出令标签加一，压回沿用
//!   旧标签——被调度切走的竞争者即便看到“指针值复原”的头，也会因标签
//!   不符而 CAS 失败，ABA 由此失效；
//! - 槽位永不独立释放：节点出生在块里，终老在块里，块在池析构时整体
//!   归还分配器。
//!
//! # 两种形态（What）
//! - [`LockfreePool`]：归还即析构。节点的链表指针与对象存储共用同一
//!   地址（union）——析构把存储还原为裸字节，指针随后覆写其上；
//! - [`LockfreeRecyclePool`]：热保留。归还不析构，对象在自由链表上
//!   保持存活，再次取出同一槽位时不再重复构造；链表指针、存储与
//!   `constructed` 标志因此必须各占其位。
//!
//! # 并发契约（How）
//! - 任意多线程可同时取用/归还，全程无锁；唯一可能阻塞之处是补块时的
//!   互斥锁，锁内复查自由链表以免重复扩容；
//! - 弹出 CAS 成功走 AcqRel：取得的节点 happens-after 把它压回的那次
//!   Release，对象状态完整可见；标签不承担排序职责。

use alloc::alloc::{alloc, dealloc, handle_alloc_error, Layout};
#[cfg(feature = "integrity-check")]
use alloc::sync::Arc;
use core::marker::PhantomData;
use core::mem::{offset_of, ManuallyDrop, MaybeUninit};
use core::ops::{Deref, DerefMut};
use core::ptr::{self, addr_of, addr_of_mut, NonNull};
// 节点内的 next 指针始终使用 core 原子：它受链表头 CAS 的排序保护，
// loom 模型只需穷举头部与计数器的交错。
use core::sync::atomic::AtomicPtr;

#[cfg(feature = "integrity-check")]
use ferry_core::DiagnosticSink;

use crate::sync::{AtomicUsize, Mutex, Ordering};
use crate::tagged_ptr::{AtomicTaggedPtr, TaggedPtr};

/// 起始块的节点数；此后每个新块的节点数等于当时的总容量（翻倍增长）。
const INIT_BLOCK_NODE_COUNT: usize = 16;

/// 块头：记录归还分配器所需的布局。
struct Block {
    next: *mut Block,
    layout: Layout,
}

/// 块链表与下一块规模，整体置于互斥锁内。
struct BlockChain {
    head: *mut Block,
    next_count: usize,
}

// SAFETY: 裸指针仅在锁内或独占析构期访问。
unsafe impl Send for BlockChain {}

/// 分配能容纳一个块头加 `count` 个 `N` 节点的裸内存。
///
/// `Layout::extend` 一步给出对齐好的节点区偏移，免去手工对齐运算。
fn alloc_block<N>(count: usize) -> (*mut Block, *mut N) {
    debug_assert!(count > 0);
    let (layout, nodes_offset) = Layout::new::<Block>()
        .extend(Layout::array::<N>(count).expect("node array layout fits isize"))
        .expect("block layout fits isize");
    let layout = layout.pad_to_align();
    // SAFETY: 布局含块头，尺寸非零。
    let raw = unsafe { alloc(layout) };
    if raw.is_null() {
        handle_alloc_error(layout);
    }
    let block = raw.cast::<Block>();
    // SAFETY: raw 按布局对齐到 Block。
    unsafe {
        block.write(Block {
            next: ptr::null_mut(),
            layout,
        });
    }
    // SAFETY: nodes_offset 由 extend 计算，落在分配内且对齐到 N。
    let nodes = unsafe { raw.add(nodes_offset) }.cast::<N>();
    (block, nodes)
}

/// 逐块释放整条块链表；此后任何节点指针都不得再被触碰。
unsafe fn free_blocks(mut head: *mut Block) {
    while !head.is_null() {
        // SAFETY: 块头由 alloc_block 写入，布局原样保存。
        let block = unsafe { head.read() };
        // SAFETY: head 即当初分配返回的地址。
        unsafe { dealloc(head.cast(), block.layout) };
        head = block.next;
    }
}

// ---------------------------------------------------------------------------
// 归还即析构形态
// ---------------------------------------------------------------------------

/// 链表指针与对象存储共用地址：空闲期是指针，占用期是对象。
#[repr(C)]
union DropSlot<T> {
    next: ManuallyDrop<AtomicPtr<DropNode<T>>>,
    data: ManuallyDrop<T>,
}

/// 归还即析构形态的节点。`repr(C)` 且 union 打头：对象地址即节点地址，
/// 归还时一次指针转换即可找回节点。
#[repr(C)]
struct DropNode<T> {
    slot: DropSlot<T>,
    #[cfg(feature = "integrity-check")]
    owner: *const (),
}

impl<T> DropNode<T> {
    /// union 的 next 视图；字段是否为活动变体由调用处的状态论证保证。
    unsafe fn next_ref<'a>(node: *mut Self) -> &'a AtomicPtr<DropNode<T>> {
        // SAFETY: ManuallyDrop 透明包装 AtomicPtr；节点自初始化起，该
        // 地址上要么是链表指针、要么是曾被初始化过的对象字节，引用创建
        // 合法；误读的指针值会随 CAS 失败一起被丢弃。
        unsafe { &*addr_of!((*node).slot.next).cast::<AtomicPtr<DropNode<T>>>() }
    }
}

/// 归还即析构的无锁对象池。
///
/// # 契约说明（What）
/// - [`LockfreePool::construct`] 每次都移入新值（放置构造的等价物），
///   [`LockfreePool::destroy`] 当场运行析构并把槽位还给自由链表；
/// - 裸指针 API 面向需要自管生命周期的调用方；[`LockfreePool::alloc`]
///   返回的 [`Pooled`] 守卫在 `Drop` 时自动归还，是常规入口；
/// - `integrity-check` 特性开启时，节点记录所属池，归还他池对象立即
///   panic；池析构时若仍有未归还槽位，向诊断出口写一行泄漏摘要。
///
/// # 风险提示（Trade-offs）
/// - 池不搬移、不克隆：自由链表里存着指向自身块的裸指针；
/// - 泄漏的对象不会被补救析构——泄漏就是泄漏，诊断行负责让它可见。
pub struct LockfreePool<T> {
    head: AtomicTaggedPtr<DropNode<T>>,
    blocks: Mutex<BlockChain>,
    capacity: AtomicUsize,
    used: AtomicUsize,
    #[cfg(feature = "integrity-check")]
    leak_sink: Option<Arc<dyn DiagnosticSink>>,
    _marker: PhantomData<T>,
}

impl<T> LockfreePool<T> {
    /// 空池：不预留任何块，首次取用时补第一块（16 个槽）。
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 预留恰好 `capacity` 个槽位的池；0 等价于 [`LockfreePool::new`]。
    pub fn with_capacity(capacity: usize) -> Self {
        let pool = Self {
            head: AtomicTaggedPtr::new(TaggedPtr::null()),
            blocks: Mutex::new(BlockChain {
                head: ptr::null_mut(),
                next_count: if capacity == 0 {
                    INIT_BLOCK_NODE_COUNT
                } else {
                    capacity
                },
            }),
            capacity: AtomicUsize::new(0),
            used: AtomicUsize::new(0),
            #[cfg(feature = "integrity-check")]
            leak_sink: None,
            _marker: PhantomData,
        };
        if capacity > 0 {
            pool.add_block();
        }
        pool
    }

    /// 总槽位数。
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// 已借出槽位数。
    pub fn used_slots(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// 空闲槽位数；与 [`LockfreePool::used_slots`] 之和恒等于容量。
    pub fn unused_slots(&self) -> usize {
        self.capacity() - self.used_slots()
    }

    /// 设置泄漏诊断出口；`None` 关闭报告。
    #[cfg(feature = "integrity-check")]
    pub fn set_leak_sink(&mut self, sink: Option<Arc<dyn DiagnosticSink>>) {
        self.leak_sink = sink;
    }

    /// 从池中取槽并移入 `value`，返回对象指针。
    ///
    /// 返回的指针必须且只能通过 [`LockfreePool::destroy`] 归还一次；
    /// 只求安全用法请改用 [`LockfreePool::alloc`]。
    #[must_use = "the slot leaks unless returned via destroy()"]
    pub fn construct(&self, value: T) -> NonNull<T> {
        let node = self.pop_free();
        // SAFETY: CAS 胜出者独占该槽；对象写在 union 打头处，地址即
        // 节点地址。
        unsafe { ptr::write(node.as_ptr().cast::<T>(), value) };
        self.used.fetch_add(1, Ordering::Relaxed);
        node.cast::<T>()
    }

    /// 运行 `obj` 的析构并把槽位归还自由链表。
    ///
    /// # Safety
    /// `obj` 必须是本池 [`LockfreePool::construct`] 的返回值，且此前未
    /// 归还过；调用后指针立即失效。
    ///
    /// # Panics
    /// `integrity-check` 开启且 `obj` 属于其它池时 panic——这是调用方的
    /// 逻辑错误，不是可恢复的失败。
    pub unsafe fn destroy(&self, obj: NonNull<T>) {
        let node = obj.as_ptr().cast::<DropNode<T>>();
        #[cfg(feature = "integrity-check")]
        {
            // SAFETY: 调用约定保证 obj 指向某个池节点，owner 可读。
            let owner = unsafe { (*node).owner };
            assert!(
                core::ptr::eq(owner, self as *const Self as *const ()),
                "destroy() called with an object that is not from this pool (pool at 0x{:016x})",
                self as *const Self as usize
            );
        }
        // SAFETY: 调用约定保证槽内持有已构造对象，且本线程独占它。
        unsafe { ptr::drop_in_place(obj.as_ptr()) };
        self.push_free(node);
        self.used.fetch_sub(1, Ordering::Relaxed);
    }

    /// 取槽、移入 `value`，返回析构时自动归还的守卫。
    pub fn alloc(&self, value: T) -> Pooled<'_, T> {
        Pooled {
            pool: self,
            obj: self.construct(value),
        }
    }

    fn pop_free(&self) -> NonNull<DropNode<T>> {
        let mut cur = self.head.load(Ordering::Acquire);
        loop {
            while cur.is_null() {
                self.add_block();
                cur = self.head.load(Ordering::Acquire);
            }
            let node = cur.get_ptr();
            // SAFETY: node 非空。槽若恰在此刻被他人占用，读到的 next
            // 会因下方 CAS 失败而被丢弃，不会被解引用。
            let next_ptr = unsafe { DropNode::next_ref(node) }.load(Ordering::Relaxed);
            // 弹出时标签加一，压制 ABA。
            let next = TaggedPtr::with_tag(next_ptr, cur.get_tag().wrapping_add(1));
            match self
                .head
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                // SAFETY: 来自块分配的非空节点。
                Ok(_) => return unsafe { NonNull::new_unchecked(node) },
                Err(observed) => cur = observed,
            }
        }
    }

    fn push_free(&self, node: *mut DropNode<T>) {
        let mut old = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: 归还路径独占该槽，union 此刻回归指针变体。
            unsafe { DropNode::next_ref(node) }.store(old.get_ptr(), Ordering::Relaxed);
            // 压回沿用旧标签；下一次弹出再行加一。
            let new = TaggedPtr::with_tag(node, old.get_tag());
            match self
                .head
                .compare_exchange_weak(old, new, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => old = observed,
            }
        }
    }

    fn add_block(&self) {
        let mut chain = self.blocks.lock();
        // 锁内复查：排队等锁期间别的线程可能已经补过块。
        if !self.head.load(Ordering::Acquire).is_null() {
            return;
        }

        let count = chain.next_count;
        let (block, nodes) = alloc_block::<DropNode<T>>(count);
        // SAFETY: 块头刚写入，独占访问。
        unsafe { (*block).next = chain.head };
        chain.head = block;

        for i in 0..count {
            // SAFETY: i < count，节点区由 alloc_block 保证有效对齐。
            let node = unsafe { nodes.add(i) };
            let next = if i + 1 < count {
                // SAFETY: 同上。
                unsafe { nodes.add(i + 1) }
            } else {
                ptr::null_mut()
            };
            // SAFETY: 新节点独占初始化；union 以指针变体落位。
            unsafe {
                addr_of_mut!((*node).slot.next).write(ManuallyDrop::new(AtomicPtr::new(next)));
                #[cfg(feature = "integrity-check")]
                addr_of_mut!((*node).owner).write(self as *const Self as *const ());
            }
        }

        // 整条新链 CAS 压上自由链表头，尾节点衔接旧头。
        // SAFETY: count ≥ 1，尾节点有效。
        let tail = unsafe { nodes.add(count - 1) };
        let mut old = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: 新链尚未发布，独占访问尾节点。
            unsafe { DropNode::next_ref(tail) }.store(old.get_ptr(), Ordering::Relaxed);
            let new = TaggedPtr::with_tag(nodes, old.get_tag());
            match self
                .head
                .compare_exchange_weak(old, new, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => old = observed,
            }
        }

        self.capacity.fetch_add(count, Ordering::Relaxed);
        // 下一块的规模等于当前总容量：块数对数增长。
        chain.next_count = self.capacity.load(Ordering::Relaxed);
    }

    #[cfg(feature = "integrity-check")]
    fn report_leak_if_any(&self) {
        let Some(sink) = &self.leak_sink else {
            return;
        };
        let live = self.used_slots();
        if live > 0 {
            let line = alloc::format!(
                "[LEAK] {live} nodes are not returned to pool at 0x{:016x}",
                self as *const Self as usize
            );
            sink.write_line(&line);
        }
    }
}

impl<T> Default for LockfreePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockfreePool<T> {
    fn drop(&mut self) {
        #[cfg(feature = "integrity-check")]
        self.report_leak_if_any();

        let chain = self.blocks.lock();
        // SAFETY: 独占析构期，自由链表不再被访问；泄漏对象不做补救。
        unsafe { free_blocks(chain.head) };
    }
}

// SAFETY: 池移交 T 值的所有权跨线程（construct/destroy 均可发生在任意
// 线程），故要求 T: Send；共享 &pool 不暴露任何 &T。
unsafe impl<T: Send> Send for LockfreePool<T> {}
unsafe impl<T: Send> Sync for LockfreePool<T> {}

/// [`LockfreePool`] 的 RAII 守卫：解引用到对象，`Drop` 时自动归还。
pub struct Pooled<'a, T> {
    pool: &'a LockfreePool<T>,
    obj: NonNull<T>,
}

impl<T> Deref for Pooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 守卫存续期间槽位归本守卫独占。
        unsafe { self.obj.as_ref() }
    }
}

impl<T> DerefMut for Pooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 同上，且 &mut self 保证唯一可变访问。
        unsafe { self.obj.as_mut() }
    }
}

impl<T> Drop for Pooled<'_, T> {
    fn drop(&mut self) {
        // SAFETY: obj 来自同一池的 construct，且只在此归还一次。
        unsafe { self.pool.destroy(self.obj) };
    }
}

// SAFETY: 守卫独占槽位；跨线程移动等价于移动 T。
unsafe impl<T: Send> Send for Pooled<'_, T> {}
unsafe impl<T: Sync> Sync for Pooled<'_, T> {}

// ---------------------------------------------------------------------------
// 热保留形态
// ---------------------------------------------------------------------------

/// 热保留形态的节点：对象在自由链表上保持存活，指针、存储与构造标志
/// 各占其位。
#[repr(C)]
struct WarmNode<T> {
    next: AtomicPtr<WarmNode<T>>,
    #[cfg(feature = "integrity-check")]
    owner: *const (),
    constructed: bool,
    data: MaybeUninit<T>,
}

impl<T> WarmNode<T> {
    /// 对象地址到节点地址的还原：`data` 不在节点起始处，靠字段偏移回退。
    const DATA_OFFSET: usize = offset_of!(WarmNode<T>, data);

    unsafe fn from_data(obj: NonNull<T>) -> *mut Self {
        // SAFETY: 调用约定保证 obj 指向某个 WarmNode 的 data 字段。
        unsafe { obj.as_ptr().cast::<u8>().sub(Self::DATA_OFFSET) }.cast::<Self>()
    }

    fn data_ptr(node: *mut Self) -> *mut T {
        // SAFETY: 字段投影，不解引用。
        unsafe { addr_of_mut!((*node).data) }.cast::<T>()
    }
}

/// 热保留的无锁对象池：归还不析构，重取同一槽位时跳过构造。
///
/// # 使用方式（How）
/// - 适合构造代价高的载荷（如内部预留大缓冲的消息体）：构造只在槽位
///   第一次被取用时发生，之后取到的是“上一任用完的旧对象”；
/// - 调用方负责用一个成员方法重置业务状态——池不知道什么算“干净”；
/// - 对象的析构推迟到池整体销毁时：届时遍历自由链表，凡 `constructed`
///   的槽位补跑析构。
///
/// 其余契约（无锁纪律、ABA 防护、块增长、完整性检查、泄漏诊断）与
/// [`LockfreePool`] 完全一致。
pub struct LockfreeRecyclePool<T> {
    head: AtomicTaggedPtr<WarmNode<T>>,
    blocks: Mutex<BlockChain>,
    capacity: AtomicUsize,
    used: AtomicUsize,
    #[cfg(feature = "integrity-check")]
    leak_sink: Option<Arc<dyn DiagnosticSink>>,
    _marker: PhantomData<T>,
}

impl<T> LockfreeRecyclePool<T> {
    /// 空池：不预留任何块。
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// 预留恰好 `capacity` 个槽位的池。
    pub fn with_capacity(capacity: usize) -> Self {
        let pool = Self {
            head: AtomicTaggedPtr::new(TaggedPtr::null()),
            blocks: Mutex::new(BlockChain {
                head: ptr::null_mut(),
                next_count: if capacity == 0 {
                    INIT_BLOCK_NODE_COUNT
                } else {
                    capacity
                },
            }),
            capacity: AtomicUsize::new(0),
            used: AtomicUsize::new(0),
            #[cfg(feature = "integrity-check")]
            leak_sink: None,
            _marker: PhantomData,
        };
        if capacity > 0 {
            pool.add_block();
        }
        pool
    }

    /// 总槽位数。
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Relaxed)
    }

    /// 已借出槽位数。
    pub fn used_slots(&self) -> usize {
        self.used.load(Ordering::Relaxed)
    }

    /// 空闲槽位数。
    pub fn unused_slots(&self) -> usize {
        self.capacity() - self.used_slots()
    }

    /// 设置泄漏诊断出口；`None` 关闭报告。
    #[cfg(feature = "integrity-check")]
    pub fn set_leak_sink(&mut self, sink: Option<Arc<dyn DiagnosticSink>>) {
        self.leak_sink = sink;
    }

    /// 取槽；仅当槽位从未被构造过时运行 `init`。
    ///
    /// 返回的指针必须且只能通过 [`LockfreeRecyclePool::destroy`] 归还
    /// 一次；只求安全用法请改用 [`LockfreeRecyclePool::alloc_with`]。
    #[must_use = "the slot leaks unless returned via destroy()"]
    pub fn construct_with(&self, init: impl FnOnce() -> T) -> NonNull<T> {
        let node = self.pop_free().as_ptr();
        // SAFETY: CAS 胜出者独占该槽；constructed 只被槽位持有者读写。
        unsafe {
            if !(*node).constructed {
                WarmNode::data_ptr(node).write(init());
                (*node).constructed = true;
            }
        }
        self.used.fetch_add(1, Ordering::Relaxed);
        // SAFETY: data 字段地址非空。
        unsafe { NonNull::new_unchecked(WarmNode::data_ptr(node)) }
    }

    /// 把槽位归还自由链表；不运行析构，对象保持存活等待复用。
    ///
    /// # Safety
    /// `obj` 必须是本池 [`LockfreeRecyclePool::construct_with`] 的返回
    /// 值，且此前未归还过；调用后指针立即失效。
    ///
    /// # Panics
    /// `integrity-check` 开启且 `obj` 属于其它池时 panic。
    pub unsafe fn destroy(&self, obj: NonNull<T>) {
        // SAFETY: 调用约定保证 obj 指向本池节点的 data 字段。
        let node = unsafe { WarmNode::from_data(obj) };
        #[cfg(feature = "integrity-check")]
        {
            // SAFETY: 调用约定保证节点可读。
            let owner = unsafe { (*node).owner };
            assert!(
                core::ptr::eq(owner, self as *const Self as *const ()),
                "destroy() called with an object that is not from this pool (pool at 0x{:016x})",
                self as *const Self as usize
            );
        }
        self.push_free(node);
        self.used.fetch_sub(1, Ordering::Relaxed);
    }

    /// 取槽并返回析构时自动归还的守卫。
    pub fn alloc_with(&self, init: impl FnOnce() -> T) -> RecyclePooled<'_, T> {
        RecyclePooled {
            pool: self,
            obj: self.construct_with(init),
        }
    }

    fn pop_free(&self) -> NonNull<WarmNode<T>> {
        let mut cur = self.head.load(Ordering::Acquire);
        loop {
            while cur.is_null() {
                self.add_block();
                cur = self.head.load(Ordering::Acquire);
            }
            let node = cur.get_ptr();
            // SAFETY: node 非空；误读值随 CAS 失败丢弃。
            let next_ptr = unsafe { &(*node).next }.load(Ordering::Relaxed);
            let next = TaggedPtr::with_tag(next_ptr, cur.get_tag().wrapping_add(1));
            match self
                .head
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
            {
                // SAFETY: 来自块分配的非空节点。
                Ok(_) => return unsafe { NonNull::new_unchecked(node) },
                Err(observed) => cur = observed,
            }
        }
    }

    fn push_free(&self, node: *mut WarmNode<T>) {
        let mut old = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: 归还路径独占该槽。
            unsafe { &(*node).next }.store(old.get_ptr(), Ordering::Relaxed);
            let new = TaggedPtr::with_tag(node, old.get_tag());
            match self
                .head
                .compare_exchange_weak(old, new, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => return,
                Err(observed) => old = observed,
            }
        }
    }

    fn add_block(&self) {
        let mut chain = self.blocks.lock();
        if !self.head.load(Ordering::Acquire).is_null() {
            return;
        }

        let count = chain.next_count;
        let (block, nodes) = alloc_block::<WarmNode<T>>(count);
        // SAFETY: 块头刚写入，独占访问。
        unsafe { (*block).next = chain.head };
        chain.head = block;

        for i in 0..count {
            // SAFETY: i < count。
            let node = unsafe { nodes.add(i) };
            let next = if i + 1 < count {
                // SAFETY: 同上。
                unsafe { nodes.add(i + 1) }
            } else {
                ptr::null_mut()
            };
            // SAFETY: 新节点独占初始化；data 保持未初始化。
            unsafe {
                addr_of_mut!((*node).next).write(AtomicPtr::new(next));
                #[cfg(feature = "integrity-check")]
                addr_of_mut!((*node).owner).write(self as *const Self as *const ());
                addr_of_mut!((*node).constructed).write(false);
            }
        }

        // SAFETY: count ≥ 1。
        let tail = unsafe { nodes.add(count - 1) };
        let mut old = self.head.load(Ordering::Relaxed);
        loop {
            // SAFETY: 新链尚未发布。
            unsafe { &(*tail).next }.store(old.get_ptr(), Ordering::Relaxed);
            let new = TaggedPtr::with_tag(nodes, old.get_tag());
            match self
                .head
                .compare_exchange_weak(old, new, Ordering::Release, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => old = observed,
            }
        }

        self.capacity.fetch_add(count, Ordering::Relaxed);
        chain.next_count = self.capacity.load(Ordering::Relaxed);
    }

    #[cfg(feature = "integrity-check")]
    fn report_leak_if_any(&self) {
        let Some(sink) = &self.leak_sink else {
            return;
        };
        let live = self.used_slots();
        if live > 0 {
            let line = alloc::format!(
                "[LEAK] {live} nodes are not returned to pool at 0x{:016x}",
                self as *const Self as usize
            );
            sink.write_line(&line);
        }
    }
}

impl<T> Default for LockfreeRecyclePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for LockfreeRecyclePool<T> {
    fn drop(&mut self) {
        #[cfg(feature = "integrity-check")]
        self.report_leak_if_any();

        // 自由链表上热保留的对象在此补跑析构；泄漏在外的对象无从寻回。
        let mut node = self.head.load(Ordering::Relaxed).get_ptr();
        while !node.is_null() {
            // SAFETY: 独占析构期；constructed 标志指明槽内是否有活对象。
            unsafe {
                if (*node).constructed {
                    ptr::drop_in_place(WarmNode::data_ptr(node));
                }
                node = (*node).next.load(Ordering::Relaxed);
            }
        }

        let chain = self.blocks.lock();
        // SAFETY: 节点析构已毕，整块归还分配器。
        unsafe { free_blocks(chain.head) };
    }
}

// SAFETY: 同 LockfreePool 的论证。
unsafe impl<T: Send> Send for LockfreeRecyclePool<T> {}
unsafe impl<T: Send> Sync for LockfreeRecyclePool<T> {}

/// [`LockfreeRecyclePool`] 的 RAII 守卫：`Drop` 归还但不析构对象。
pub struct RecyclePooled<'a, T> {
    pool: &'a LockfreeRecyclePool<T>,
    obj: NonNull<T>,
}

impl<T> Deref for RecyclePooled<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // SAFETY: 守卫存续期间槽位归本守卫独占。
        unsafe { self.obj.as_ref() }
    }
}

impl<T> DerefMut for RecyclePooled<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: 同上。
        unsafe { self.obj.as_mut() }
    }
}

impl<T> Drop for RecyclePooled<'_, T> {
    fn drop(&mut self) {
        // SAFETY: obj 来自同一池，且只在此归还一次。
        unsafe { self.pool.destroy(self.obj) };
    }
}

// SAFETY: 同 Pooled 的论证。
unsafe impl<T: Send> Send for RecyclePooled<'_, T> {}
unsafe impl<T: Sync> Sync for RecyclePooled<'_, T> {}
