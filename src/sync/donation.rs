//! # 优先级捐赠引擎
//!
//! ## Overview
//! 高优先级线程阻塞在低优先级线程持有的锁上时，
//! 把自己的优先级临时借给持有者，避免持有者被中等优先级线程饿死（优先级反转）。
//!
//! - `donate`：争用一把锁之前调用，沿等待关系（waits-for）向上传递提升
//! - `withdraw`：释放一把锁之后调用，把释放者的优先级恢复到仍然“欠着”的最大值
//!
//! 多级反馈队列模式下两者都不修改优先级。
//!
//! ## Assumptions
//! - 同步核心之外没有人修改线程的有效优先级
//! - 正确的程序中等待关系是无环的
//!
//! ## Invariants
//! - `donate` 只会提升、不会降低任何线程的优先级
//! - `withdraw` 之后线程的优先级不低于其原始优先级
//! - 两个算法都在关中断状态下整体执行
//!
//! ## Behavior
//! 传递捐赠使用显式工作表加已访问集合，
//! 即使等待关系出现环（程序错误）也保证终止，并记录一条警告。

use super::lock::LockCore;
use super::SyncSubsystem;
use super::up::critical_section;
use alloc::collections::BTreeSet;
use alloc::sync::Arc;
use alloc::vec;
use log::{debug, warn};

impl SyncSubsystem {
    /// 当前线程即将争用 `lock` 时，把优先级捐赠给持有者及其上游
    pub(crate) fn donate(&self, lock: &Arc<LockCore>) {
        let sched = self.scheduler();
        if sched.mlfqs() {
            return;
        }
        critical_section(self.interrupts(), || {
            let donor = sched.priority(sched.current());
            let mut visited = BTreeSet::new();
            let mut work = vec![Arc::clone(lock)];

            while let Some(lock) = work.pop() {
                if !visited.insert(lock.id) {
                    warn!("donation revisits {:?}: waits-for cycle", lock.id);
                    continue;
                }
                let Some(holder) = lock.holder(self) else {
                    continue;
                };

                // 链上的等待者可能刚被提升，先重排再看队首
                lock.semaphore.resort_waiters();
                let candidate = match lock.semaphore.front_waiter() {
                    Some(front) => donor.max(sched.priority(front)),
                    None => donor,
                };
                let current = sched.priority(holder);
                if candidate > current {
                    debug!(
                        "{:?} donates {} -> {} to {:?} holding {:?}",
                        sched.current(),
                        current,
                        candidate,
                        holder,
                        lock.id
                    );
                    sched.set_priority(holder, candidate);
                }

                // 持有者自己也在等锁：继续沿链向上
                for other in self.registered_locks() {
                    if other.semaphore.has_waiter(holder) {
                        other.semaphore.resort_waiters();
                        work.push(other);
                    }
                }
                if let Some(sema) = self.blocked_on(holder) {
                    self.resort(&sema);
                }
            }
        });
    }

    /// 当前线程释放 `lock` 后，撤销不再需要的捐赠
    pub(crate) fn withdraw(&self, lock: &LockCore) {
        let sched = self.scheduler();
        critical_section(self.interrupts(), || {
            let me = sched.current();
            let remaining = self.remove_held(me, lock.id);
            if sched.mlfqs() {
                return;
            }

            let owed = remaining
                .into_iter()
                .filter_map(|id| self.lock_by_id(id))
                .filter_map(|held| held.semaphore.front_waiter())
                .map(|waiter| sched.priority(waiter))
                .max();
            let origin = sched.origin_priority(me);
            let restored = owed.map_or(origin, |owed| owed.max(origin));
            if restored != sched.priority(me) {
                debug!(
                    "{:?} releases {:?}: priority {} -> {}",
                    me,
                    lock.id,
                    sched.priority(me),
                    restored
                );
            }
            sched.set_priority(me, restored);

            if let Some(sema) = self.blocked_on(me) {
                self.resort(&sema);
            }
        });
    }
}
