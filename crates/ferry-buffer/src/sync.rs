//! 原子与互斥原语的选择层：常规构建走 `core`/`spin`，`--cfg loom` 构建
//! 切换到 loom 的模型化类型，使 SPSC 环与对象池能在调度穷举下接受检验。

#[cfg(loom)]
pub(crate) use loom::sync::atomic::{fence, AtomicUsize, Ordering};

#[cfg(not(loom))]
pub(crate) use core::sync::atomic::{fence, AtomicUsize, Ordering};

#[cfg(not(loom))]
pub(crate) type Mutex<T> = spin::Mutex<T>;

/// loom 的 `Mutex` 以 `LockResult` 暴露毒化语义，模型测试中不存在
/// panic 穿越锁的场景，这里直接展开为守卫，保持与 `spin` 相同的调用面。
#[cfg(loom)]
pub(crate) struct Mutex<T>(loom::sync::Mutex<T>);

#[cfg(loom)]
impl<T> Mutex<T> {
    pub(crate) fn new(value: T) -> Self {
        Self(loom::sync::Mutex::new(value))
    }

    pub(crate) fn lock(&self) -> loom::sync::MutexGuard<'_, T> {
        self.0.lock().expect("loom mutex 在模型内不会毒化")
    }
}
