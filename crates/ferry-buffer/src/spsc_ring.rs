//! 单生产者/单消费者无锁环形字节缓冲。
//!
//! # 模块定位（Why）
//! - 收包线程与解析线程之间以字节流交接时，需要一个无锁、无阻塞、
//!   容量确定的环形缓冲：生产者独占写游标，消费者独占读游标，
//!   跨线程可见性由 Release/Acquire 配对承担；
//! - 原型实现通常把“单写单读”写进文档由调用方自律；这里改为在类型
//!   层面固化纪律：环被 [`SpscByteRing::split`] 拆成写者与读者两个
//!   不可克隆句柄，独占操作（清空、扩缩容）必须先
//!   [`SpscByteRing::unsplit`] 收回完整所有权。
//!
//! # 内存序（What）
//! - 写路径：Acquire 读对方游标计算可写量，拷贝完成后 Release 发布新
//!   写游标；读路径对称；
//! - 监视快照：两次 Relaxed 读之间插入显式 Acquire 栅栏，仅供观察，
//!   不得用于同步；
//! - 两个游标落在不同缓存行（`CachePadded`），避免伪共享。

use alloc::sync::Arc;

use crossbeam_utils::CachePadded;
use ferry_core::{codes, CoreError, Result};

use crate::byte_ring::{copy_in, copy_out, copy_out_raw};
use crate::raw_buf::RawBuf;
use crate::sync::{fence, AtomicUsize, Ordering};

/// 写者与读者共享的存储与游标。
#[derive(Debug)]
struct Shared {
    raw: RawBuf,
    /// 槽位数 = 有效容量 + 1，哨兵槽区分满与空。
    cap: usize,
    pos_read: CachePadded<AtomicUsize>,
    pos_write: CachePadded<AtomicUsize>,
}

impl Shared {
    fn effective_capacity(&self) -> usize {
        self.cap - 1
    }

    /// （消费者视角）可读字节数：Acquire 读写游标，Relaxed 读自有游标。
    fn consumer_available_read(&self) -> usize {
        let write = self.pos_write.load(Ordering::Acquire);
        let read = self.pos_read.load(Ordering::Relaxed);
        (self.cap + write - read) % self.cap
    }

    /// （生产者视角）可写字节数：Acquire 读读游标，Relaxed 读自有游标。
    fn producer_available_write(&self) -> usize {
        let write = self.pos_write.load(Ordering::Relaxed);
        let read = self.pos_read.load(Ordering::Acquire);
        self.effective_capacity() - (self.cap + write - read) % self.cap
    }
}

/// 独占状态下的 SPSC 环本体。
///
/// # 生命周期（How）
/// - 构造后处于独占态，可以 [`SpscByteRing::clear`] 与
///   [`SpscByteRing::try_resize`]；
/// - [`SpscByteRing::split`] 让渡出读写两个并发句柄；
/// - [`SpscByteRing::unsplit`] 在两个句柄（以及全部监视句柄）归还后
///   恢复独占态——“仅限静止期”的搬移与扩缩容因此成为编译期保证。
#[derive(Debug)]
pub struct SpscByteRing {
    shared: Shared,
}

impl SpscByteRing {
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
            shared: Shared {
                raw,
                cap: effective_capacity + 1,
                pos_read: CachePadded::new(AtomicUsize::new(0)),
                pos_write: CachePadded::new(AtomicUsize::new(0)),
            },
        }
    }

    /// 可用字节上限。
    pub fn effective_capacity(&self) -> usize {
        self.shared.effective_capacity()
    }

    /// 当前可读字节数（独占态下两游标都稳定）。
    pub fn available_read(&self) -> usize {
        self.shared.consumer_available_read()
    }

    /// 丢弃全部内容；独占访问，无并发可见性要求。
    pub fn clear(&mut self) {
        self.shared.pos_read.store(0, Ordering::Relaxed);
        self.shared.pos_write.store(0, Ordering::Relaxed);
    }

    /// 重新分配到新的有效容量，把可读字节压实到偏移 0。
    ///
    /// 新容量容不下现有可读量、或与现有效容量相同，返回 `false`。
    pub fn try_resize(&mut self, new_effective_capacity: usize) -> bool {
        let used = self.available_read();
        if new_effective_capacity < used
            || new_effective_capacity == self.effective_capacity()
        {
            return false;
        }

        let new_raw = if new_effective_capacity == 0 {
            RawBuf::empty()
        } else {
            RawBuf::allocate(new_effective_capacity + 1)
        };
        if used > 0 {
            let pos = self.shared.pos_read.load(Ordering::Relaxed);
            // SAFETY: used ≤ new_effective_capacity，目标区间在新分配内。
            unsafe {
                copy_out_raw(self.shared.raw.as_ptr(), self.shared.cap, pos, new_raw.as_ptr(), used);
            }
        }

        self.shared.raw = new_raw;
        self.shared.cap = new_effective_capacity + 1;
        self.shared.pos_read.store(0, Ordering::Relaxed);
        self.shared.pos_write.store(used, Ordering::Relaxed);
        true
    }

    /// 拆分为生产者与消费者句柄，进入并发运行态。
    pub fn split(self) -> (SpscByteWriter, SpscByteReader) {
        let shared = Arc::new(self.shared);
        (
            SpscByteWriter {
                shared: Arc::clone(&shared),
            },
            SpscByteReader { shared },
        )
    }

    /// 以一对句柄恢复独占态。
    ///
    /// 两个句柄不属于同一环、或仍有监视句柄在外时，原样退还双方，
    /// 调用方可稍后重试。
    pub fn unsplit(
        writer: SpscByteWriter,
        reader: SpscByteReader,
    ) -> core::result::Result<Self, (SpscByteWriter, SpscByteReader)> {
        if !Arc::ptr_eq(&writer.shared, &reader.shared) {
            return Err((writer, reader));
        }
        let SpscByteWriter { shared } = writer;
        let SpscByteReader { shared: reader_arc } = reader;
        drop(reader_arc);
        match Arc::try_unwrap(shared) {
            Ok(shared) => Ok(Self { shared }),
            Err(arc) => Err((
                SpscByteWriter {
                    shared: Arc::clone(&arc),
                },
                SpscByteReader { shared: arc },
            )),
        }
    }
}

impl Default for SpscByteRing {
    fn default() -> Self {
        Self::new()
    }
}

/// 生产者句柄：独占写游标。不可克隆；操作收取 `&mut self`，
/// 即便被共享包装也无法出现第二个并发生产者。
#[derive(Debug)]
pub struct SpscByteWriter {
    shared: Arc<Shared>,
}

impl SpscByteWriter {
    /// 写入 `src` 的全部字节；空间不足整体拒绝，不产生部分写。
    ///
    /// 先 Acquire 读消费者游标计算可写量，拷贝（必要时跨回绕点两段）
    /// 完成后 Release 发布新写游标，使消费者看到完整字节。
    pub fn try_write(&mut self, src: &[u8]) -> Result<()> {
        let shared = &*self.shared;
        if src.len() > shared.producer_available_write() {
            return Err(CoreError::new(
                codes::RING_INSUFFICIENT_SPACE,
                "write exceeds ring free space",
            ));
        }
        let pos = shared.pos_write.load(Ordering::Relaxed);
        copy_in(shared.raw.as_ptr(), shared.cap, pos, src);
        shared
            .pos_write
            .store((pos + src.len()) % shared.cap, Ordering::Release);
        Ok(())
    }

    /// 当前可写字节数。
    pub fn available_write(&self) -> usize {
        self.shared.producer_available_write()
    }

    /// 是否已无可写空间。
    pub fn is_full(&self) -> bool {
        self.available_write() == 0
    }

    /// 可用字节上限。
    pub fn effective_capacity(&self) -> usize {
        self.shared.effective_capacity()
    }

    /// 派生一个监视句柄。
    pub fn monitor(&self) -> SpscRingMonitor {
        SpscRingMonitor {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// 消费者句柄：独占读游标。不可克隆。
#[derive(Debug)]
pub struct SpscByteReader {
    shared: Arc<Shared>,
}

impl SpscByteReader {
    /// 读出恰好 `dst.len()` 字节并发布新的读游标。
    pub fn try_read(&mut self, dst: &mut [u8]) -> Result<()> {
        self.try_peek(dst)?;
        let shared = &*self.shared;
        let pos = shared.pos_read.load(Ordering::Relaxed);
        shared
            .pos_read
            .store((pos + dst.len()) % shared.cap, Ordering::Release);
        Ok(())
    }

    /// 与 [`SpscByteReader::try_read`] 相同的校验与拷贝，但不推进游标。
    ///
    /// Acquire 读写游标后，`[r, r+len)` 内的字节已完整可见。
    pub fn try_peek(&self, dst: &mut [u8]) -> Result<()> {
        let shared = &*self.shared;
        if dst.len() > shared.consumer_available_read() {
            return Err(CoreError::new(
                codes::RING_INSUFFICIENT_DATA,
                "read exceeds ring readable bytes",
            ));
        }
        let pos = shared.pos_read.load(Ordering::Relaxed);
        copy_out(shared.raw.as_ptr(), shared.cap, pos, dst);
        Ok(())
    }

    /// 当前可读字节数。
    pub fn available_read(&self) -> usize {
        self.shared.consumer_available_read()
    }

    /// 是否无可读字节。
    pub fn is_empty(&self) -> bool {
        self.available_read() == 0
    }

    /// 可用字节上限。
    pub fn effective_capacity(&self) -> usize {
        self.shared.effective_capacity()
    }

    /// 派生一个监视句柄。
    pub fn monitor(&self) -> SpscRingMonitor {
        SpscRingMonitor {
            shared: Arc::clone(&self.shared),
        }
    }
}

/// 旁路观察句柄：只提供快照，不参与同步。
///
/// 快照取两次 Relaxed 读并在中间插入 Acquire 栅栏，数值在并发运行期
/// 只具统计意义；持有监视句柄期间 [`SpscByteRing::unsplit`] 会失败。
#[derive(Clone)]
pub struct SpscRingMonitor {
    shared: Arc<Shared>,
}

impl SpscRingMonitor {
    /// 已占用字节数的快照。
    pub fn used_space(&self) -> usize {
        let shared = &*self.shared;
        let read = shared.pos_read.load(Ordering::Relaxed);
        fence(Ordering::Acquire);
        let write = shared.pos_write.load(Ordering::Relaxed);
        (shared.cap - read + write) % shared.cap
    }

    /// 剩余空间的快照。
    pub fn available_space(&self) -> usize {
        self.shared.effective_capacity() - self.used_space()
    }

    /// 可用字节上限。
    pub fn effective_capacity(&self) -> usize {
        self.shared.effective_capacity()
    }
}
