//! 按优先级有序、同优先级先进先出的等待队列

use alloc::collections::VecDeque;
use core::cmp::Ordering;

/// 稳定的优先级等待队列
///
/// 队列不缓存优先级：排序依据由调用者以“`a` 是否应排在 `b` 之前”的谓词给出，
/// 因此在元素的优先级被外部修改后，可以用 `resort` 重新排序。
pub struct WaitQueue<T> {
    entries: VecDeque<T>,
}

impl<T> WaitQueue<T> {
    pub const fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// 插入到第一个优先级严格低于 `item` 的元素之前
    pub fn insert_ordered<F>(&mut self, item: T, before: F)
    where
        F: Fn(&T, &T) -> bool,
    {
        let pos = self
            .entries
            .iter()
            .position(|queued| before(&item, queued))
            .unwrap_or(self.entries.len());
        self.entries.insert(pos, item);
    }

    /// 优先级变化后的稳定重排，同优先级元素保持原有相对顺序
    pub fn resort<F>(&mut self, before: F)
    where
        F: Fn(&T, &T) -> bool,
    {
        self.entries.make_contiguous().sort_by(|a, b| {
            if before(a, b) {
                Ordering::Less
            } else if before(b, a) {
                Ordering::Greater
            } else {
                Ordering::Equal
            }
        });
    }

    pub fn pop_front(&mut self) -> Option<T> {
        self.entries.pop_front()
    }

    pub fn front(&self) -> Option<&T> {
        self.entries.front()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: PartialEq> WaitQueue<T> {
    pub fn contains(&self, item: &T) -> bool {
        self.entries.contains(item)
    }
}

impl<T> Default for WaitQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
