//! # ksync：单处理器内核线程同步核心
//!
//! ## Overview
//! 提供信号量、带优先级捐赠的锁以及条件变量。
//! 调度器与中断控制器是外部协作者，仅通过 `task` 模块中的
//! `Scheduler` / `Interrupts` 两个 trait 接入。

#![cfg_attr(not(test), no_std)]

extern crate alloc;

#[macro_use]
pub mod console;
pub mod config;
pub mod sync;
pub mod task;

#[cfg(test)]
mod sim;

pub use sync::{Condvar, Lock, LockId, Semaphore, SyncSubsystem};
pub use task::{Interrupts, IntrLevel, Priority, Scheduler, Tid};
