//! # 信号量（Semaphore）同步原语模块
//!
//! ## Overview
//! 计数型信号量：一个非负计数器加一个按优先级排序的等待队列，
//! 支持 `down`（P）与 `up`（V）操作，是锁与条件变量的基础。
//!
//! ## Assumptions
//! - 单处理器，并发仅来源于中断
//! - 所有对内部状态的修改都在关中断状态下完成
//!
//! ## Invariants
//! - `value` 始终非负
//! - 等待队列按有效优先级降序排列，同优先级先到先出
//! - 等待队列中的线程一定处于阻塞状态，且其 blocked-on 反向引用指向本信号量
//!
//! ## Behavior
//! - `down`：
//!   - 计数为 0 时按优先级插入等待队列并阻塞，被唤醒后重新检查
//! - `up`：
//!   - 计数加一，唤醒队首线程，然后让出处理器

use super::up::{critical_section, UPIntrFreeCell};
use super::wait_queue::WaitQueue;
use super::SyncSubsystem;
use crate::config::{PRI_DEFAULT, SEMA_SELF_TEST_ROUNDS};
use crate::task::Tid;
use alloc::boxed::Box;
use alloc::sync::Arc;
use log::{info, trace};

/// 信号量的内部状态
///
/// ## Fields
/// - `value`：当前可用资源计数
/// - `waiters`：等待该信号量的线程
pub(crate) struct SemaInner {
    value: usize,
    waiters: WaitQueue<Tid>,
}

/// 线程的 blocked-on 反向引用所指向的对象
pub(crate) type SemaCell = UPIntrFreeCell<SemaInner>;

/// 计数型信号量
pub struct Semaphore {
    sys: Arc<SyncSubsystem>,
    inner: Arc<SemaCell>,
}

impl Semaphore {
    /// 创建一个初始计数为 `value`、等待队列为空的信号量
    pub fn new(sys: &Arc<SyncSubsystem>, value: usize) -> Self {
        Self {
            sys: Arc::clone(sys),
            inner: Arc::new(UPIntrFreeCell::new(SemaInner {
                value,
                waiters: WaitQueue::new(),
            })),
        }
    }

    /// 执行 P 操作（down）
    ///
    /// ## Behavior
    /// - 计数为 0 时：
    ///   - 按优先级插入等待队列，记录 blocked-on，阻塞
    ///   - 被唤醒后重新检查计数
    /// - 计数大于 0 时减一并返回
    ///
    /// 可以在已关中断的状态下调用，返回前恢复调用者的中断级别。
    ///
    /// ## Panics
    /// - 在中断上下文中调用
    pub fn down(&self) {
        let intr = self.sys.interrupts();
        let sched = self.sys.scheduler();
        assert!(
            !intr.in_interrupt(),
            "Semaphore::down called from interrupt context"
        );

        let saved = intr.disable();
        loop {
            let me = sched.current();
            {
                let mut inner = self.inner.exclusive_access(intr);
                if inner.value > 0 {
                    inner.value -= 1;
                    break;
                }
                inner
                    .waiters
                    .insert_ordered(me, |a, b| sched.higher_priority(*a, *b));
            }
            self.sys.set_blocked_on(me, Some(Arc::downgrade(&self.inner)));
            trace!("{:?} blocks on semaphore", me);
            sched.block();
        }
        intr.set_level(saved);
    }

    /// 非阻塞的 P 操作，可在中断上下文中调用
    ///
    /// ## Returns
    /// - `true`：计数已减一
    /// - `false`：计数为 0，未做任何修改
    pub fn try_down(&self) -> bool {
        self.inner
            .exclusive_session(self.sys.interrupts(), |inner| {
                if inner.value > 0 {
                    inner.value -= 1;
                    true
                } else {
                    false
                }
            })
    }

    /// 执行 V 操作（up），可在中断上下文中调用
    ///
    /// ## Behavior
    /// - 计数加一
    /// - 若等待队列非空，唤醒队首线程并清除其 blocked-on
    /// - 无论是否唤醒，都让出处理器（中断上下文中改为返回时让出）
    pub fn up(&self) {
        let intr = self.sys.interrupts();
        critical_section(intr, || {
            let woken = {
                let mut inner = self.inner.exclusive_access(intr);
                inner.value += 1;
                inner.waiters.pop_front()
            };
            if let Some(tid) = woken {
                trace!("semaphore wakes {:?}", tid);
                self.sys.set_blocked_on(tid, None);
                self.sys.scheduler().unblock(tid);
            }
        });
        self.sys.yield_cpu();
    }

    /// 当前计数的快照
    pub fn value(&self) -> usize {
        self.inner.exclusive_session(self.sys.interrupts(), |inner| inner.value)
    }

    pub(crate) fn front_waiter(&self) -> Option<Tid> {
        self.inner
            .exclusive_session(self.sys.interrupts(), |inner| inner.waiters.front().copied())
    }

    pub(crate) fn has_waiter(&self, tid: Tid) -> bool {
        self.inner
            .exclusive_session(self.sys.interrupts(), |inner| inner.waiters.contains(&tid))
    }

    pub(crate) fn resort_waiters(&self) {
        self.sys.resort(&self.inner);
    }
}

impl SyncSubsystem {
    /// 按当前有效优先级重排一个信号量的等待队列
    pub(crate) fn resort(&self, sema: &SemaCell) {
        let sched = self.scheduler();
        sema.exclusive_session(self.interrupts(), |inner| {
            inner.waiters.resort(|a, b| sched.higher_priority(*a, *b))
        });
    }
}

/// 信号量自检：在调用者与一个辅助线程之间来回传递控制权
///
/// 两个初值为 0 的信号量，调用者 `up` 第一个、`down` 第二个，
/// 辅助线程相反，共 `SEMA_SELF_TEST_ROUNDS` 轮。
pub fn self_test(sys: &Arc<SyncSubsystem>) {
    info!("Testing semaphores...");
    let pair = Arc::new([Semaphore::new(sys, 0), Semaphore::new(sys, 0)]);
    let helper = Arc::clone(&pair);
    sys.scheduler().spawn(
        "sema-test",
        PRI_DEFAULT,
        Box::new(move || {
            for _ in 0..SEMA_SELF_TEST_ROUNDS {
                helper[0].down();
                helper[1].up();
            }
        }),
    );
    for _ in 0..SEMA_SELF_TEST_ROUNDS {
        pair[0].up();
        pair[1].down();
    }
    info!("done.");
}
