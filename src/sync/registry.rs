//! # 同步子系统与锁注册表
//!
//! ## Overview
//! `SyncSubsystem` 是所有同步原语共享的上下文，持有：
//! - 外部调度器与中断控制器的句柄
//! - 锁注册表：系统中每一把锁的弱引用，按 `LockId` 寻址，只增不减
//! - 每个线程的同步侧状态：持有的锁集合、阻塞所在的信号量
//!
//! 捐赠引擎通过它遍历等待关系，而不是访问任何全局变量。
//!
//! ## Invariants
//! - `LockId` 等于锁在注册表中的下标，永不复用
//! - 线程的 blocked-on 只在其位于该信号量等待队列期间为 `Some`
//! - 同一把锁在一个线程的持有集合中最多出现一次

use super::lock::LockCore;
use super::semaphore::SemaCell;
use super::up::UPIntrFreeCell;
use crate::task::{Interrupts, Scheduler, Tid};
use alloc::collections::BTreeMap;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;

/// 锁在注册表中的稳定句柄
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LockId(pub usize);

/// 线程的同步侧状态
#[derive(Default)]
struct ThreadLinks {
    held: Vec<LockId>,
    blocked_on: Option<Weak<SemaCell>>,
}

impl ThreadLinks {
    fn is_empty(&self) -> bool {
        self.held.is_empty() && self.blocked_on.is_none()
    }
}

pub struct SyncSubsystem {
    sched: Arc<dyn Scheduler>,
    intr: Arc<dyn Interrupts>,
    locks: UPIntrFreeCell<Vec<Weak<LockCore>>>,
    threads: UPIntrFreeCell<BTreeMap<Tid, ThreadLinks>>,
}

impl SyncSubsystem {
    pub fn new(sched: Arc<dyn Scheduler>, intr: Arc<dyn Interrupts>) -> Arc<Self> {
        Arc::new(Self {
            sched,
            intr,
            locks: UPIntrFreeCell::new(Vec::new()),
            threads: UPIntrFreeCell::new(BTreeMap::new()),
        })
    }

    pub fn scheduler(&self) -> &dyn Scheduler {
        &*self.sched
    }

    pub fn interrupts(&self) -> &dyn Interrupts {
        &*self.intr
    }

    /// 让出处理器；在中断上下文中改为请求中断返回时让出
    pub(crate) fn yield_cpu(&self) {
        if self.intr.in_interrupt() {
            self.intr.yield_on_return();
        } else {
            self.sched.yield_now();
        }
    }

    /// 分配 `LockId` 并把新锁登记进注册表
    pub(crate) fn register_lock<F>(&self, build: F) -> Arc<LockCore>
    where
        F: FnOnce(LockId) -> LockCore,
    {
        let mut locks = self.locks.exclusive_access(self.interrupts());
        let core = Arc::new(build(LockId(locks.len())));
        locks.push(Arc::downgrade(&core));
        core
    }

    /// 注册表中仍然存活的锁的快照
    pub(crate) fn registered_locks(&self) -> Vec<Arc<LockCore>> {
        self.locks.exclusive_session(self.interrupts(), |locks| {
            locks.iter().filter_map(Weak::upgrade).collect()
        })
    }

    pub(crate) fn lock_by_id(&self, id: LockId) -> Option<Arc<LockCore>> {
        self.locks
            .exclusive_session(self.interrupts(), |locks| locks.get(id.0).and_then(Weak::upgrade))
    }

    /// 已登记的锁的数量（包括已被释放的锁）
    pub fn lock_count(&self) -> usize {
        self.locks.exclusive_session(self.interrupts(), |locks| locks.len())
    }

    fn with_links<F, V>(&self, tid: Tid, f: F) -> V
    where
        F: FnOnce(&mut ThreadLinks) -> V,
    {
        self.threads.exclusive_session(self.interrupts(), |threads| {
            let links = threads.entry(tid).or_default();
            let ret = f(links);
            if links.is_empty() {
                threads.remove(&tid);
            }
            ret
        })
    }

    pub(crate) fn set_blocked_on(&self, tid: Tid, sema: Option<Weak<SemaCell>>) {
        self.with_links(tid, |links| links.blocked_on = sema);
    }

    pub(crate) fn blocked_on(&self, tid: Tid) -> Option<Arc<SemaCell>> {
        self.with_links(tid, |links| links.blocked_on.as_ref().and_then(Weak::upgrade))
    }

    /// 线程当前是否阻塞在某个信号量上
    pub fn blocked_on_semaphore(&self, tid: Tid) -> bool {
        self.blocked_on(tid).is_some()
    }

    pub(crate) fn add_held(&self, tid: Tid, lock: LockId) {
        self.with_links(tid, |links| {
            assert!(
                !links.held.contains(&lock),
                "{:?} already in held set of {:?}",
                lock,
                tid
            );
            links.held.push(lock);
        });
    }

    /// 从持有集合中移除一把锁，返回剩余的锁
    pub(crate) fn remove_held(&self, tid: Tid, lock: LockId) -> Vec<LockId> {
        self.with_links(tid, |links| {
            links.held.retain(|held| *held != lock);
            links.held.clone()
        })
    }

    /// 线程当前持有的锁，按获取顺序排列
    pub fn held_locks(&self, tid: Tid) -> Vec<LockId> {
        self.with_links(tid, |links| links.held.clone())
    }
}
