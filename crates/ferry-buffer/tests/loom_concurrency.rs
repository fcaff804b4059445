#![cfg(loom)]

//! Loom 并发模型：在穷举调度下验证 SPSC 环与无锁对象池的核心协议。
//!
//! # 教案级注释概览
//!
//! - **核心目标 (Why)**：(1) SPSC 环的 Release/Acquire 配对必须保证消费
//!   者一旦观测到新写游标，负载字节随之完整可见；(2) 对象池的标签 CAS
//!   必须保证同一槽位绝不双重借出，归还-再借出构成 happens-before；
//!   (3) 陈旧取槽场景——取槽线程观测头 `(N, t)` 后被切走，干扰线程完成
//!   两次完整借还把头推回 `(N, t+2)`——在穷举调度下只能以 CAS 失败重试
//!   收场，绝不污染自由链表。
//! - **设计手法 (Why)**：`--cfg loom` 构建下，容器内部的原子与互斥原语
//!   切换到 loom 的模型化类型（见 `src/sync.rs`），这里驱动的是真实
//!   容器而非手抄模型；循环等待处以 `yield_now` 让出，供 loom 探索。
//! - **契约与边界 (What)**：场景刻意保持最小（两三个线程、个位数字
//!   节），loom 的状态空间随规模指数增长，大场景由常规线程测试覆盖；
//!   头部标签的逐次推进断言需要池的内部视角，放在
//!   `src/pool.rs` 的 `cfg(all(test, loom))` 模块中。

use loom::model;
use loom::thread;
use std::ptr::NonNull;
use std::sync::Arc;

use ferry_buffer::{LockfreePool, SpscByteRing};

/// 消费者读到写游标的新值时，负载字节必须同时可见。
#[test]
fn spsc_published_bytes_are_visible() {
    model(|| {
        let (mut writer, mut reader) = SpscByteRing::with_capacity(2).split();

        let producer = thread::spawn(move || {
            writer.try_write(&[7, 9]).expect("容量足够");
        });

        let mut out = [0u8; 2];
        while reader.try_read(&mut out).is_err() {
            thread::yield_now();
        }
        assert_eq!(out, [7, 9], "游标可见即负载可见");

        producer.join().expect("生产者不应 panic");
    });
}

/// 写满-读空交错下，可读与可写量不会越过有效容量。
#[test]
fn spsc_availability_never_exceeds_capacity() {
    model(|| {
        let (mut writer, mut reader) = SpscByteRing::with_capacity(1).split();

        let producer = thread::spawn(move || {
            let _ = writer.try_write(&[1]);
            let avail = writer.available_write();
            assert!(avail <= 1, "可写量不得超过有效容量");
        });

        let mut out = [0u8; 1];
        let _ = reader.try_read(&mut out);
        assert!(reader.available_read() <= 1);

        producer.join().expect("生产者不应 panic");
    });
}

/// 两个线程并发取槽：拿到的槽位必须不同，记账恒等式成立。
#[test]
fn pool_never_hands_out_a_slot_twice() {
    model(|| {
        let pool = Arc::new(LockfreePool::<u32>::with_capacity(2));

        let first = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.construct(1).as_ptr() as usize)
        };
        let second = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || pool.construct(2).as_ptr() as usize)
        };

        let addr_a = first.join().expect("线程不应 panic");
        let addr_b = second.join().expect("线程不应 panic");

        assert_ne!(addr_a, addr_b, "同一槽位绝不允许双重借出");
        assert_eq!(pool.used_slots(), 2);
        assert_eq!(pool.used_slots() + pool.unused_slots(), pool.capacity());

        // SAFETY: 地址来自本池 construct，各归还一次。
        unsafe {
            pool.destroy(NonNull::new(addr_a as *mut u32).expect("地址非空"));
            pool.destroy(NonNull::new(addr_b as *mut u32).expect("地址非空"));
        }
        assert_eq!(pool.used_slots(), 0);
    });
}

/// 字面场景重放：取槽线程可能在观测到头 `(N, t)` 后被调度切走，干扰
/// 线程随即完成两次完整的借出/归还，指针值复原而标签推进到 `t+2`。
///
/// loom 穷举的调度里包含这一停驻点：彼时取槽线程持有的期望值
/// `(N, t)` 与实际头 `(N, t+2)` 指针相同、标签不同，CAS 必须失败并以
/// 新观测重试。断言收口在可观测结果上：任何调度下同一槽位都不得双重
/// 借出，记账恒等式成立。
#[test]
fn stale_acquire_survives_interfering_round_trips() {
    model(|| {
        let pool = Arc::new(LockfreePool::<u32>::with_capacity(3));

        let acquirer = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                let obj = pool.construct(0xAC);
                // SAFETY: 指针来自本池 construct，此刻由本线程独占。
                assert_eq!(unsafe { *obj.as_ref() }, 0xAC, "持有期间槽位不得被改写");
                obj.as_ptr() as usize
            })
        };

        let interferer = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                // 两次完整借还：弹出令标签加一、压回沿用旧标签，
                // 头部指针值一再复原而标签只进不退。
                for round in 0..2u32 {
                    let guard = pool.alloc(round);
                    assert_eq!(*guard, round, "借出期间槽位内容不得被他人改写");
                }
            })
        };

        let held = acquirer.join().expect("取槽线程不应 panic");
        interferer.join().expect("干扰线程不应 panic");
        assert_eq!(pool.used_slots(), 1);
        assert_eq!(pool.used_slots() + pool.unused_slots(), pool.capacity());

        // 自由链表未被陈旧 CAS 污染：补齐剩余槽位，地址必须两两不同。
        let second = pool.construct(2).as_ptr() as usize;
        let third = pool.construct(3).as_ptr() as usize;
        assert_ne!(held, second, "同一槽位绝不允许双重借出");
        assert_ne!(held, third, "同一槽位绝不允许双重借出");
        assert_ne!(second, third, "同一槽位绝不允许双重借出");

        // SAFETY: 地址均来自本池 construct，各归还一次。
        unsafe {
            pool.destroy(NonNull::new(held as *mut u32).expect("地址非空"));
            pool.destroy(NonNull::new(second as *mut u32).expect("地址非空"));
            pool.destroy(NonNull::new(third as *mut u32).expect("地址非空"));
        }
        assert_eq!(pool.used_slots(), 0);
    });
}

/// 归还与再借出竞争同一槽位时，后借出者必须看到完整的归还效果。
#[test]
fn pool_release_happens_before_reacquire() {
    model(|| {
        let pool = Arc::new(LockfreePool::<u32>::with_capacity(1));
        let obj = pool.construct(41);
        let addr = obj.as_ptr() as usize;

        let returner = {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                // SAFETY: 指针来自本池且只归还一次。
                unsafe { pool.destroy(NonNull::new(addr as *mut u32).expect("地址非空")) };
            })
        };

        // 容量 1：唯一槽位归还前取槽会触发扩块，这里等归还完成后再取，
        // 验证 Release(push) → Acquire(pop) 的传递。
        returner.join().expect("归还线程不应 panic");
        let again = pool.construct(42);
        // SAFETY: 同上。
        assert_eq!(unsafe { *again.as_ref() }, 42);
        unsafe { pool.destroy(again) };
    });
}
