//! 种子的对外状态模型：标志位、生命周期状态与状态快照。

use std::fmt::{self, Display, Formatter};
use std::ops::{BitAnd, BitOr, BitOrAssign};

use kumo_util::global::Id;

/// 每个种子的标志位集合。
///
/// `paused` 与 `auto_managed` 共同决定调度归属：
/// 两者的四种组合分别对应自动管理、强制启动与强制停止。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TorrentFlags(u32);

impl TorrentFlags {
    /// 做种模式，跳过校验直接视为数据完整
    pub const SEED_MODE: TorrentFlags = TorrentFlags(1 << 0);
    /// 只上传，不请求数据
    pub const UPLOAD_MODE: TorrentFlags = TorrentFlags(1 << 1);
    /// 共享模式
    pub const SHARE_MODE: TorrentFlags = TorrentFlags(1 << 2);
    /// 应用全局 ip 过滤器
    pub const APPLY_IP_FILTER: TorrentFlags = TorrentFlags(1 << 3);
    /// 暂停：不做任何网络 I/O
    pub const PAUSED: TorrentFlags = TorrentFlags(1 << 4);
    /// 由调度器决定启停
    pub const AUTO_MANAGED: TorrentFlags = TorrentFlags(1 << 5);
    /// 超级做种
    pub const SUPER_SEEDING: TorrentFlags = TorrentFlags(1 << 6);
    /// 顺序下载
    pub const SEQUENTIAL_DOWNLOAD: TorrentFlags = TorrentFlags(1 << 7);
    /// 就绪（校验完成）后立即停止
    pub const STOP_WHEN_READY: TorrentFlags = TorrentFlags(1 << 8);
    pub const DISABLE_DHT: TorrentFlags = TorrentFlags(1 << 9);
    pub const DISABLE_LSD: TorrentFlags = TorrentFlags(1 << 10);
    pub const DISABLE_PEX: TorrentFlags = TorrentFlags(1 << 11);

    pub const fn empty() -> Self {
        TorrentFlags(0)
    }

    pub fn contains(self, other: TorrentFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: TorrentFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: TorrentFlags) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: TorrentFlags, on: bool) {
        if on {
            self.insert(other);
        } else {
            self.remove(other);
        }
    }
}

impl BitOr for TorrentFlags {
    type Output = TorrentFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        TorrentFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for TorrentFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TorrentFlags {
    type Output = TorrentFlags;

    fn bitand(self, rhs: Self) -> Self::Output {
        TorrentFlags(self.0 & rhs.0)
    }
}

/// 生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TorrentState {
    /// 兼容保留，不再产生
    QueuedForChecking,
    /// 校验续传数据
    CheckingResumeData,
    /// 校验磁盘数据
    CheckingFiles,
    /// 等待元数据（磁力添加）
    DownloadingMetadata,
    /// 下载中
    Downloading,
    /// 已完成但尚未全部校验
    Finished,
    /// 做种中
    Seeding,
    /// 预分配磁盘空间
    Allocating,
}

impl TorrentState {
    /// 是否处于校验类状态
    pub fn is_checking(self) -> bool {
        matches!(
            self,
            TorrentState::QueuedForChecking
                | TorrentState::CheckingResumeData
                | TorrentState::CheckingFiles
        )
    }
}

impl Display for TorrentState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            TorrentState::QueuedForChecking => "queued_for_checking",
            TorrentState::CheckingResumeData => "checking_resume_data",
            TorrentState::CheckingFiles => "checking_files",
            TorrentState::DownloadingMetadata => "downloading_metadata",
            TorrentState::Downloading => "downloading",
            TorrentState::Finished => "finished",
            TorrentState::Seeding => "seeding",
            TorrentState::Allocating => "allocating",
        };
        write!(f, "{name}")
    }
}

/// `get_status` 返回的状态快照
#[derive(Debug, Clone)]
pub struct TorrentStatus {
    pub id: Id,
    pub name: String,
    pub flags: TorrentFlags,
    pub state: TorrentState,
    pub paused: bool,
    pub auto_managed: bool,
    pub is_finished: bool,
    pub is_seeding: bool,
    pub download_rate: u64,
    pub upload_rate: u64,
    /// 在所属队列里的序号，越小优先级越高
    pub queue_position: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_ops() {
        let mut flags = TorrentFlags::PAUSED | TorrentFlags::AUTO_MANAGED;
        assert!(flags.contains(TorrentFlags::PAUSED));
        assert!(!flags.contains(TorrentFlags::SEED_MODE));

        flags.remove(TorrentFlags::PAUSED);
        assert!(!flags.contains(TorrentFlags::PAUSED));
        assert!(flags.contains(TorrentFlags::AUTO_MANAGED));

        flags.set(TorrentFlags::SEED_MODE, true);
        assert!(flags.contains(TorrentFlags::SEED_MODE));
        flags.set(TorrentFlags::SEED_MODE, false);
        assert!(!flags.contains(TorrentFlags::SEED_MODE));
    }

    #[test]
    fn test_is_checking() {
        assert!(TorrentState::CheckingFiles.is_checking());
        assert!(TorrentState::CheckingResumeData.is_checking());
        assert!(!TorrentState::Downloading.is_checking());
        assert!(!TorrentState::Seeding.is_checking());
    }
}
