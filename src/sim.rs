//! # 测试用单处理器调度器
//!
//! ## Overview
//! 在宿主机上模拟一个单核 CPU，为同步原语的单元测试实现
//! `Scheduler` 与 `Interrupts`：
//! - 每个内核线程对应一个宿主线程，但只有 `running` 指向的那个可以前进
//! - 就绪队列按优先级取任务，同优先级先进先出（让出时排到同级末尾）
//! - 新建线程优先级高于当前线程时立即让出
//! - 中断级别与中断上下文都是模拟的状态位
//!
//! ## Invariants
//! - 任意时刻只有 `running` 线程在执行同步核心代码
//! - 线程切换只发生在 `block` / `yield_now` / 线程退出时，且切换点中断关闭
//!
//! ## Behavior
//! - 没有可运行线程时视为死锁，测试失败
//! - 模拟线程中的 panic 会让所有等待中的线程（包括测试主线程）随之 panic

use crate::config::PRI_DEFAULT;
use crate::sync::SyncSubsystem;
use crate::task::{Interrupts, IntrLevel, Priority, Scheduler, Tid};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TaskStatus {
    Ready,
    Running,
    Blocked,
    Exited,
}

struct SimTask {
    name: String,
    status: TaskStatus,
    priority: Priority,
    origin: Priority,
}

/// 模拟 CPU 的全部可变状态
struct TaskManager {
    tasks: Vec<SimTask>,
    ready_queue: VecDeque<Tid>,
    running: Tid,
    intr_enabled: bool,
    in_interrupt: bool,
    yield_on_return: bool,
    mlfqs: bool,
    failure: Option<String>,
    trace: Vec<String>,
}

impl TaskManager {
    fn task(&mut self, tid: Tid) -> &mut SimTask {
        &mut self.tasks[tid.0]
    }

    /// 将任务标记为就绪并排到队尾
    fn add(&mut self, tid: Tid) {
        self.task(tid).status = TaskStatus::Ready;
        self.ready_queue.push_back(tid);
    }

    /// 取出优先级最高、最早入队的任务
    fn fetch(&mut self) -> Option<Tid> {
        let tasks = &self.tasks;
        let best = self
            .ready_queue
            .iter()
            .map(|tid| tasks[tid.0].priority)
            .max()?;
        let pos = self
            .ready_queue
            .iter()
            .position(|tid| tasks[tid.0].priority == best)?;
        self.ready_queue.remove(pos)
    }
}

pub struct SimCpu {
    this: Weak<SimCpu>,
    manager: Mutex<TaskManager>,
    switch: Condvar,
}

impl SimCpu {
    /// 创建模拟 CPU，调用者所在的宿主线程成为 `PRI_DEFAULT` 的主线程
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            manager: Mutex::new(TaskManager {
                tasks: vec![SimTask {
                    name: "main".into(),
                    status: TaskStatus::Running,
                    priority: PRI_DEFAULT,
                    origin: PRI_DEFAULT,
                }],
                ready_queue: VecDeque::new(),
                running: Tid(0),
                intr_enabled: true,
                in_interrupt: false,
                yield_on_return: false,
                mlfqs: false,
                failure: None,
                trace: Vec::new(),
            }),
            switch: Condvar::new(),
        })
    }

    pub fn subsystem(self: &Arc<Self>) -> Arc<SyncSubsystem> {
        SyncSubsystem::new(self.clone(), self.clone())
    }

    fn lock(&self) -> MutexGuard<'_, TaskManager> {
        self.manager.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 设置线程的原始优先级与有效优先级（相当于 thread_set_priority）
    pub fn set_base_priority(&self, tid: Tid, priority: Priority) {
        let mut m = self.lock();
        let task = m.task(tid);
        task.priority = priority;
        task.origin = priority;
    }

    pub fn set_mlfqs(&self, on: bool) {
        self.lock().mlfqs = on;
    }

    pub fn is_blocked(&self, tid: Tid) -> bool {
        self.lock().tasks[tid.0].status == TaskStatus::Blocked
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.lock().intr_enabled
    }

    /// 追加一条测试事件
    pub fn record(&self, event: impl Into<String>) {
        self.lock().trace.push(event.into());
    }

    pub fn trace(&self) -> Vec<String> {
        self.lock().trace.clone()
    }

    /// 在模拟的外部中断上下文中执行 `f`
    ///
    /// 处理期间中断关闭；返回时若有人请求过让出，则立即让出。
    pub fn raise_interrupt<R>(&self, f: impl FnOnce() -> R) -> R {
        let saved = {
            let mut m = self.lock();
            assert!(!m.in_interrupt, "nested interrupt");
            let saved = m.intr_enabled;
            m.in_interrupt = true;
            m.intr_enabled = false;
            saved
        };
        let ret = f();
        let pending = {
            let mut m = self.lock();
            m.in_interrupt = false;
            m.intr_enabled = saved;
            std::mem::take(&mut m.yield_on_return)
        };
        if pending {
            self.yield_now();
        }
        ret
    }

    fn wait_until_running<'a>(
        &'a self,
        mut m: MutexGuard<'a, TaskManager>,
        me: Tid,
    ) -> MutexGuard<'a, TaskManager> {
        loop {
            if let Some(failure) = m.failure.clone() {
                drop(m);
                panic!("simulated cpu halted: {failure}");
            }
            if m.running == me {
                return m;
            }
            m = self.switch.wait(m).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 切换到下一个就绪任务；`me` 的状态必须已经更新
    fn schedule<'a>(
        &'a self,
        mut m: MutexGuard<'a, TaskManager>,
        me: Tid,
    ) -> MutexGuard<'a, TaskManager> {
        let Some(next) = m.fetch() else {
            let msg = format!("deadlock: no runnable task after {} stopped", m.tasks[me.0].name);
            m.failure.get_or_insert_with(|| msg.clone());
            self.switch.notify_all();
            drop(m);
            panic!("{msg}");
        };
        m.running = next;
        m.task(next).status = TaskStatus::Running;
        if next != me {
            self.switch.notify_all();
            if m.tasks[me.0].status != TaskStatus::Exited {
                m = self.wait_until_running(m, me);
            }
        }
        m
    }

    fn run_task(&self, tid: Tid, entry: Box<dyn FnOnce() + Send>) {
        {
            let m = self.lock();
            let mut m = self.wait_until_running(m, tid);
            // 新线程总是以开中断状态开始运行
            m.intr_enabled = true;
        }
        let outcome = panic::catch_unwind(AssertUnwindSafe(entry));

        let mut m = self.lock();
        if let Err(payload) = outcome {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".into());
            let msg = format!("task {} panicked: {reason}", m.tasks[tid.0].name);
            m.failure.get_or_insert(msg);
            self.switch.notify_all();
            return;
        }
        m.intr_enabled = false;
        m.task(tid).status = TaskStatus::Exited;
        drop(self.schedule(m, tid));
    }
}

impl Scheduler for SimCpu {
    fn current(&self) -> Tid {
        self.lock().running
    }

    fn block(&self) {
        let mut m = self.lock();
        assert!(!m.in_interrupt, "block in interrupt context");
        assert!(!m.intr_enabled, "block with interrupts enabled");
        let me = m.running;
        m.task(me).status = TaskStatus::Blocked;
        drop(self.schedule(m, me));
    }

    fn unblock(&self, tid: Tid) {
        let mut m = self.lock();
        assert_eq!(
            m.tasks[tid.0].status,
            TaskStatus::Blocked,
            "unblock of a task that is not blocked"
        );
        m.add(tid);
    }

    fn yield_now(&self) {
        let mut m = self.lock();
        assert!(!m.in_interrupt, "yield in interrupt context");
        let saved = m.intr_enabled;
        m.intr_enabled = false;
        let me = m.running;
        m.add(me);
        let mut m = self.schedule(m, me);
        m.intr_enabled = saved;
    }

    fn priority(&self, tid: Tid) -> Priority {
        self.lock().tasks[tid.0].priority
    }

    fn set_priority(&self, tid: Tid, priority: Priority) {
        self.lock().task(tid).priority = priority;
    }

    fn origin_priority(&self, tid: Tid) -> Priority {
        self.lock().tasks[tid.0].origin
    }

    fn mlfqs(&self) -> bool {
        self.lock().mlfqs
    }

    fn spawn(&self, name: &str, priority: Priority, entry: Box<dyn FnOnce() + Send>) -> Tid {
        let tid = {
            let mut m = self.lock();
            let tid = Tid(m.tasks.len());
            m.tasks.push(SimTask {
                name: name.into(),
                status: TaskStatus::Ready,
                priority,
                origin: priority,
            });
            m.ready_queue.push_back(tid);
            tid
        };
        let cpu = self.this.upgrade().expect("simulated cpu dropped");
        thread::Builder::new()
            .name(name.into())
            .spawn(move || cpu.run_task(tid, entry))
            .expect("failed to spawn host thread");

        if priority > self.priority(self.current()) {
            self.yield_now();
        }
        tid
    }
}

impl Interrupts for SimCpu {
    fn disable(&self) -> IntrLevel {
        self.set_level(IntrLevel::Off)
    }

    fn set_level(&self, level: IntrLevel) -> IntrLevel {
        let mut m = self.lock();
        let old = if m.intr_enabled {
            IntrLevel::On
        } else {
            IntrLevel::Off
        };
        m.intr_enabled = level == IntrLevel::On;
        old
    }

    fn in_interrupt(&self) -> bool {
        self.lock().in_interrupt
    }

    fn yield_on_return(&self) {
        let mut m = self.lock();
        assert!(m.in_interrupt, "yield_on_return outside interrupt context");
        m.yield_on_return = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_spawn_preempts() {
        let cpu = SimCpu::new();
        let log = cpu.clone();
        cpu.spawn("hi", PRI_DEFAULT + 1, Box::new(move || log.record("hi")));
        cpu.record("main");
        assert_eq!(cpu.trace(), ["hi", "main"]);
    }

    #[test]
    fn equal_priority_runs_on_yield() {
        let cpu = SimCpu::new();
        let log = cpu.clone();
        cpu.spawn("peer", PRI_DEFAULT, Box::new(move || log.record("peer")));
        cpu.record("main");
        cpu.yield_now();
        assert_eq!(cpu.trace(), ["main", "peer"]);
        assert!(cpu.interrupts_enabled());
    }

    #[test]
    #[should_panic(expected = "deadlock")]
    fn blocking_the_last_task_is_a_deadlock() {
        let cpu = SimCpu::new();
        cpu.disable();
        cpu.block();
    }

    #[test]
    #[should_panic(expected = "task boom panicked")]
    fn task_panic_reaches_main() {
        let cpu = SimCpu::new();
        cpu.spawn("boom", PRI_DEFAULT + 1, Box::new(|| panic!("kaboom")));
    }
}
