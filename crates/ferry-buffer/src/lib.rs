#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

//! `ferry-buffer` 提供网络消息系统收发两侧之间搬运字节与定型对象的原语容器。
//!
//! # 模块定位（Why）
//! - 收发线程与业务逻辑之间的缝隙需要一组固定容量、可精确推理的容器：
//!   字节到达后被定帧、序列化、排队、经池回收，最终再度上线；
//!   本 crate 即是这条流水线的最底层地基。
//! - 容器之间运行期互不引用，但共享同一套实现语汇：对齐的裸分配、
//!   回绕下标运算、按位放置的构造与析构。
//!
//! # 内容概览（How）
//! - [`tagged_ptr`]：64 位指针 + 标签的打包字，含可 CAS 的原子形态；
//! - [`wire`]：线性序列化缓冲 [`WireBuffer`]，按小端写读异构值；
//! - [`ring_queue`]：单线程有界 FIFO [`RingQueue`]，原地构造与析构；
//! - [`byte_ring`]：单线程环形字节缓冲 [`ByteRing`]；
//! - [`spsc_ring`]：单生产者/单消费者无锁环形字节缓冲 [`SpscByteRing`]，
//!   以拆分句柄在类型层面固化读写纪律；
//! - [`pool`]：带标签指针自由链表的无锁对象池，
//!   [`LockfreePool`]（归还即析构）与 [`LockfreeRecyclePool`]（热保留）两种形态。
//!
//! # 契约说明（What）
//! - 所有容器满了都不自动扩容，调用方显式 `try_resize*`；
//! - 除对象池扩块互斥锁外，任何操作都不阻塞；
//! - `no_std + alloc` 可用，`std` 特性仅增开标准库适配面。

extern crate alloc;

mod raw_buf;
mod sync;

pub mod byte_ring;
pub mod pool;
pub mod ring_queue;
pub mod spsc_ring;
pub mod tagged_ptr;
pub mod wire;

pub use byte_ring::ByteRing;
pub use pool::{LockfreePool, LockfreeRecyclePool, Pooled, RecyclePooled};
pub use ring_queue::RingQueue;
pub use spsc_ring::{SpscByteReader, SpscByteRing, SpscByteWriter, SpscRingMonitor};
pub use tagged_ptr::{AtomicTaggedPtr, TaggedPtr};
pub use wire::{LenPrefix, Scalar, WireBuffer};
