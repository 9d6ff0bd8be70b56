use std::fmt::Display;
use std::ops::Deref;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};

/// 会话内唯一的标识符，加入种子时分配
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Ord, PartialOrd, Default)]
pub struct Id(u64);

impl Id {
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Deref for Id {
    type Target = u64;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Display for Id {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 全局 id 分配器
#[derive(Default)]
pub struct GlobalId {
    /// id 计数器
    id_counter: AtomicU64,
}

impl GlobalId {
    pub fn global() -> &'static Self {
        static GLOBAL_ID: OnceLock<GlobalId> = OnceLock::new();
        GLOBAL_ID.get_or_init(|| GlobalId {
            id_counter: AtomicU64::new(1),
        })
    }

    /// 分配下一个 id
    pub fn next_id() -> Id {
        Id(Self::global().id_counter.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_id_monotonic() {
        let a = GlobalId::next_id();
        let b = GlobalId::next_id();
        assert!(b.value() > a.value());
    }
}
