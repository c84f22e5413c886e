//! # 条件变量（Condvar）同步原语模块
//!
//! ## Overview
//! 条件变量本身 **不保存条件状态**，只维护一个按优先级排序的等待队列，
//! 队列中每一项是一个一次性信号量以及等待者入队时的优先级。
//! 条件判断由使用者在锁保护的临界区内完成。
//!
//! ## Assumptions
//! - 条件变量总是与某一把锁配合使用（一把锁可以对应多个条件变量）
//! - 对应关系由调用者保证，结构上不强制
//!
//! ## Behavior
//! - Mesa 语义：`signal` 与被唤醒者重新获得锁之间不是原子的，
//!   被唤醒的线程必须重新检查条件
//! - 唤醒顺序按入队时记录的优先级降序，同优先级先到先出

use super::lock::Lock;
use super::semaphore::Semaphore;
use super::up::UPIntrFreeCell;
use super::wait_queue::WaitQueue;
use super::SyncSubsystem;
use crate::task::Priority;
use alloc::sync::Arc;

/// 条件变量等待队列中的一项
struct CondWaiter {
    semaphore: Arc<Semaphore>,
    priority: Priority,
}

/// 条件变量
pub struct Condvar {
    sys: Arc<SyncSubsystem>,
    waiters: UPIntrFreeCell<WaitQueue<CondWaiter>>,
}

impl Condvar {
    pub fn new(sys: &Arc<SyncSubsystem>) -> Self {
        Self {
            sys: Arc::clone(sys),
            waiters: UPIntrFreeCell::new(WaitQueue::new()),
        }
    }

    /// 释放 `lock` 并等待被唤醒，返回前重新获得 `lock`
    ///
    /// ## Behavior
    /// 1. 创建初值为 0 的一次性信号量，记录当前优先级，按优先级入队
    /// 2. 释放锁（撤销捐赠）
    /// 3. 在一次性信号量上阻塞
    /// 4. 被唤醒后重新获取锁（争用时进行捐赠）
    ///
    /// ## Panics
    /// - 在中断上下文中调用
    /// - 当前线程未持有 `lock`
    pub fn wait(&self, lock: &Lock) {
        self.check_caller("wait", lock);

        let semaphore = Arc::new(Semaphore::new(&self.sys, 0));
        let priority = self.sys.scheduler().priority(self.sys.scheduler().current());
        self.waiters.exclusive_session(self.sys.interrupts(), |waiters| {
            waiters.insert_ordered(
                CondWaiter {
                    semaphore: Arc::clone(&semaphore),
                    priority,
                },
                |a, b| a.priority > b.priority,
            )
        });
        lock.release();
        semaphore.down();
        lock.acquire();
    }

    /// 唤醒等待队列中优先级最高的一个线程（若存在）
    ///
    /// ## Panics
    /// - 在中断上下文中调用
    /// - 当前线程未持有 `lock`
    pub fn signal(&self, lock: &Lock) {
        self.check_caller("signal", lock);

        let front = self
            .waiters
            .exclusive_session(self.sys.interrupts(), |waiters| waiters.pop_front());
        if let Some(waiter) = front {
            waiter.semaphore.up();
        }
    }

    /// 唤醒所有等待者，按优先级降序逐个 `signal`
    pub fn broadcast(&self, lock: &Lock) {
        while self.waiters() > 0 {
            self.signal(lock);
        }
    }

    /// 当前等待者数量的快照
    pub fn waiters(&self) -> usize {
        self.waiters
            .exclusive_session(self.sys.interrupts(), |waiters| waiters.len())
    }

    fn check_caller(&self, op: &str, lock: &Lock) {
        assert!(
            !self.sys.interrupts().in_interrupt(),
            "Condvar::{} called from interrupt context",
            op
        );
        assert!(
            lock.held_by_current_thread(),
            "Condvar::{}: {:?} not held by current thread",
            op,
            lock.id()
        );
    }
}
