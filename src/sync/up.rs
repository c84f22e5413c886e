//! # 单处理器中断屏蔽内部可变性封装模块
//!
//! ## Overview
//! 在 **单处理器（UP）+ 中断并发** 模型下，屏蔽中断就是唯一的互斥手段。
//! 本模块提供：
//! - `UPIntrFreeCell`：访问期间自动关闭中断的内部可变性容器
//! - `UPIntrRefMut`：配合使用的 RAII 守卫，drop 时恢复进入前的中断级别
//! - `critical_section`：在关中断状态下执行一个闭包
//!
//! ## Assumptions
//! - 系统运行在单核处理器环境中
//! - 持有守卫期间不会发生线程切换（调用者不得在持有守卫时阻塞或让出）
//!
//! ## Invariants
//! - 若某个 `UPIntrFreeCell` 处于借用状态，则中断必然被屏蔽
//! - 守卫被 drop 时，中断级别恢复为获取守卫之前的值
//!
//! ## Behavior
//! - 嵌套访问不同的 cell 是允许的，恢复顺序与获取顺序相反
//! - 对同一个 cell 的重入访问直接 panic（等同 `RefCell` 的借用冲突）

use crate::task::{Interrupts, IntrLevel};
use core::ops::{Deref, DerefMut};
use spin::{Mutex, MutexGuard};

/// 在访问期间自动关闭中断的 UP 内部可变性封装
///
/// 内部使用 `spin::Mutex` 仅作为借用标记：
/// 单处理器且已关中断时不可能出现真正的竞争，
/// `try_lock` 失败只可能是同一执行流的重入。
pub struct UPIntrFreeCell<T> {
    inner: Mutex<T>,
}

/// `UPIntrFreeCell` 的可变借用守卫
pub struct UPIntrRefMut<'a, T> {
    guard: Option<MutexGuard<'a, T>>,
    intr: &'a dyn Interrupts,
    saved: IntrLevel,
}

impl<T> UPIntrFreeCell<T> {
    pub const fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// 获取内部数据的独占访问权
    ///
    /// ## Behavior
    /// - 屏蔽中断并记录之前的级别
    /// - 若发生借用冲突将 panic
    pub fn exclusive_access<'a>(&'a self, intr: &'a dyn Interrupts) -> UPIntrRefMut<'a, T> {
        let saved = intr.disable();
        match self.inner.try_lock() {
            Some(guard) => UPIntrRefMut {
                guard: Some(guard),
                intr,
                saved,
            },
            None => {
                intr.set_level(saved);
                panic!("UPIntrFreeCell: already borrowed");
            }
        }
    }

    /// 在独占访问会话中执行闭包
    pub fn exclusive_session<F, V>(&self, intr: &dyn Interrupts, f: F) -> V
    where
        F: FnOnce(&mut T) -> V,
    {
        let mut inner = self.exclusive_access(intr);
        f(inner.deref_mut())
    }
}

impl<'a, T> Drop for UPIntrRefMut<'a, T> {
    fn drop(&mut self) {
        // 先释放借用，再恢复中断
        self.guard = None;
        self.intr.set_level(self.saved);
    }
}

impl<'a, T> Deref for UPIntrRefMut<'a, T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        self.guard.as_deref().expect("UPIntrRefMut used after release")
    }
}

impl<'a, T> DerefMut for UPIntrRefMut<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.guard.as_deref_mut().expect("UPIntrRefMut used after release")
    }
}

/// 在关中断状态下执行 `f`，返回后恢复调用前的中断级别
pub fn critical_section<F, R>(intr: &dyn Interrupts, f: F) -> R
where
    F: FnOnce() -> R,
{
    let saved = intr.disable();
    let ret = f();
    intr.set_level(saved);
    ret
}
