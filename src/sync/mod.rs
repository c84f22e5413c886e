//! # 内核同步原语模块（sync）
//!
//! ## Overview
//! 本模块是同步核心的统一入口，按功能拆分为：
//! - `semaphore`：计数型信号量
//! - `lock`：带优先级捐赠的互斥锁
//! - `donation`：优先级捐赠与撤销算法
//! - `condvar`：条件变量（Mesa 语义）
//! - `registry`：同步子系统上下文与锁注册表
//! - `wait_queue`：稳定的优先级等待队列
//! - `up`：单处理器环境下的中断屏蔽内部可变性封装
//!
//! ## Assumptions
//! - 系统运行在单处理器环境，不存在真正的并行执行
//! - 屏蔽中断是唯一的互斥手段
//!
//! ## Invariants
//! - 所有结构性修改都在关中断状态下完成
//! - 在阻塞当前线程前，内部状态必然已经更新且不再持有任何借用
//! - 被加入等待队列的线程一定处于阻塞状态
//!
//! ## Behavior
//! - 只有 `Semaphore::down`、争用时的 `Lock::acquire` 与 `Condvar::wait` 会阻塞
//! - 其余操作都不阻塞

mod condvar;
mod donation;
mod lock;
mod registry;
pub mod semaphore;
mod up;
mod wait_queue;

/// 条件变量
pub use condvar::Condvar;

/// 带优先级捐赠的互斥锁
pub use lock::Lock;

/// 同步子系统上下文与锁句柄
pub use registry::{LockId, SyncSubsystem};

/// 计数型信号量
pub use semaphore::Semaphore;

/// 单处理器中断屏蔽工具
pub use up::{critical_section, UPIntrFreeCell, UPIntrRefMut};

/// 稳定的优先级等待队列
pub use wait_queue::WaitQueue;
