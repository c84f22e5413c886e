//! # 外部协作者接口（调度器与中断控制器）
//!
//! ## Overview
//! 同步核心不拥有线程，也不直接操作硬件。
//! 它所依赖的全部外部能力都在这里以 trait 的形式给出：
//! - `Scheduler`：当前线程、阻塞 / 唤醒 / 让出、优先级读写
//! - `Interrupts`：关中断、恢复中断级别、中断上下文查询
//!
//! 线程通过 `Tid` 句柄引用，同步核心从不延长线程的生命周期。
//!
//! ## Assumptions
//! - 单处理器，任意时刻只有一个线程在执行同步核心代码
//! - `Scheduler::block` 调用时中断已被屏蔽

use alloc::boxed::Box;

/// 线程优先级，数值越大优先级越高
pub type Priority = u8;

/// 线程句柄，对应调度器线程表中的一项
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tid(pub usize);

/// 中断级别
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IntrLevel {
    On,
    Off,
}

/// 调度器提供给同步核心的接口
pub trait Scheduler: Send + Sync {
    /// 当前正在运行的线程
    fn current(&self) -> Tid;

    /// 挂起当前线程，直到其他线程对它调用 `unblock`
    ///
    /// ## Safety
    /// - 调用时中断必须已关闭，且不得处于中断上下文
    fn block(&self);

    /// 将一个阻塞中的线程标记为就绪，不发生抢占
    fn unblock(&self, tid: Tid);

    /// 主动让出处理器，被重新调度后返回
    fn yield_now(&self);

    /// 线程当前的有效优先级（可能来自捐赠）
    fn priority(&self, tid: Tid) -> Priority;

    /// 修改线程的有效优先级，仅由捐赠引擎调用
    fn set_priority(&self, tid: Tid, priority: Priority);

    /// 线程在没有任何捐赠时的优先级
    fn origin_priority(&self, tid: Tid) -> Priority;

    /// 是否处于多级反馈队列调度模式（该模式下不进行捐赠）
    fn mlfqs(&self) -> bool;

    /// 创建一个新的内核线程，仅供自检代码使用
    fn spawn(&self, name: &str, priority: Priority, entry: Box<dyn FnOnce() + Send>) -> Tid;

    /// `a` 是否应排在 `b` 之前
    fn higher_priority(&self, a: Tid, b: Tid) -> bool {
        self.priority(a) > self.priority(b)
    }
}

/// 中断控制器提供给同步核心的接口
pub trait Interrupts: Send + Sync {
    /// 关闭中断并返回之前的级别
    fn disable(&self) -> IntrLevel;

    /// 设置中断级别并返回之前的级别
    fn set_level(&self, level: IntrLevel) -> IntrLevel;

    /// 当前是否正在处理外部中断
    fn in_interrupt(&self) -> bool;

    /// 请求在中断处理返回时让出处理器
    fn yield_on_return(&self);
}
