//! # 锁（Lock）同步原语模块
//!
//! ## Overview
//! 锁是初值为 1 的信号量的特化，另外记录持有者：
//! - 同一时刻最多一个持有者，且必须由持有者释放
//! - 不可重入：持有者再次获取是致命错误
//! - 争用时先进行优先级捐赠，再阻塞在内部信号量上
//!
//! ## Invariants
//! - `holder == None` 当且仅当内部信号量计数为 1
//! - 锁在创建时登记进注册表，之后不再移除
//!
//! ## Behavior
//! - `acquire`：捐赠 → `down` → 记录持有者
//! - `release`：清除持有者 → 撤销捐赠 → `up` → 让出处理器

use super::registry::LockId;
use super::semaphore::Semaphore;
use super::up::{critical_section, UPIntrFreeCell};
use super::SyncSubsystem;
use crate::task::Tid;
use alloc::sync::Arc;

/// 注册表中登记的锁本体
pub(crate) struct LockCore {
    pub(crate) id: LockId,
    pub(crate) holder: UPIntrFreeCell<Option<Tid>>,
    pub(crate) semaphore: Semaphore,
}

impl LockCore {
    pub(crate) fn holder(&self, sys: &SyncSubsystem) -> Option<Tid> {
        self.holder.exclusive_session(sys.interrupts(), |holder| *holder)
    }
}

/// 带优先级捐赠的互斥锁
pub struct Lock {
    sys: Arc<SyncSubsystem>,
    core: Arc<LockCore>,
}

impl Lock {
    /// 创建一把空闲的锁并登记进注册表
    pub fn new(sys: &Arc<SyncSubsystem>) -> Self {
        let core = sys.register_lock(|id| LockCore {
            id,
            holder: UPIntrFreeCell::new(None),
            semaphore: Semaphore::new(sys, 1),
        });
        Self {
            sys: Arc::clone(sys),
            core,
        }
    }

    pub fn id(&self) -> LockId {
        self.core.id
    }

    /// 当前持有者的快照，对非当前线程的查询存在竞争
    pub fn holder(&self) -> Option<Tid> {
        self.core.holder(&self.sys)
    }

    /// 获取锁，必要时阻塞
    ///
    /// ## Behavior
    /// - 先对当前持有者进行优先级捐赠（捐赠依赖于阻塞前的持有者）
    /// - 在内部信号量上 `down`
    /// - 记录持有者并加入当前线程的持有集合
    ///
    /// ## Panics
    /// - 在中断上下文中调用
    /// - 当前线程已持有该锁
    pub fn acquire(&self) {
        assert!(
            !self.sys.interrupts().in_interrupt(),
            "Lock::acquire called from interrupt context"
        );
        assert!(
            !self.held_by_current_thread(),
            "Lock::acquire: {:?} already held by current thread",
            self.core.id
        );

        self.sys.donate(&self.core);
        self.core.semaphore.down();
        self.take_ownership();
    }

    /// 尝试获取锁，不阻塞，也不进行捐赠
    ///
    /// ## Panics
    /// - 当前线程已持有该锁
    pub fn try_acquire(&self) -> bool {
        assert!(
            !self.held_by_current_thread(),
            "Lock::try_acquire: {:?} already held by current thread",
            self.core.id
        );

        let success = self.core.semaphore.try_down();
        if success {
            self.take_ownership();
        }
        success
    }

    /// 释放锁
    ///
    /// ## Behavior
    /// - 先清除持有者，再撤销捐赠
    /// - `up` 唤醒优先级最高的等待者，最后让出处理器
    ///
    /// ## Panics
    /// - 当前线程不是持有者
    pub fn release(&self) {
        assert!(
            self.held_by_current_thread(),
            "Lock::release: {:?} not held by current thread",
            self.core.id
        );

        self.core
            .holder
            .exclusive_session(self.sys.interrupts(), |holder| *holder = None);
        self.sys.withdraw(&self.core);
        self.core.semaphore.up();
        self.sys.yield_cpu();
    }

    /// 当前线程是否持有该锁
    pub fn held_by_current_thread(&self) -> bool {
        self.holder() == Some(self.sys.scheduler().current())
    }

    fn take_ownership(&self) {
        let me = self.sys.scheduler().current();
        critical_section(self.sys.interrupts(), || {
            self.core
                .holder
                .exclusive_session(self.sys.interrupts(), |holder| *holder = Some(me));
            self.sys.add_held(me, self.core.id);
        });
    }
}
