//! 会话配置。

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ===========================================================================
// 写死的配置值，一般也不会改的
// ===========================================================================

/// channel 大小
pub const CHANNEL_BUFFER: usize = 100;

/// 滴答间隔的下限
pub const MIN_TICK_INTERVAL: Duration = Duration::from_secs(5);

/// 滴答间隔的上限
pub const MAX_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// 会话调度参数。负数的并发上限表示不限制。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// 同时活跃的下载数上限
    pub active_downloads: i32,

    /// 同时活跃的做种数上限
    pub active_seeds: i32,

    /// 同时校验的种子数上限
    pub active_checking: i32,

    /// 全局活跃种子数上限
    pub active_limit: i32,

    /// 慢速种子不占用活跃名额
    pub dont_count_slow_torrents: bool,

    /// 低于这个下载速率（B/s）视为不活跃
    pub inactive_down_rate: u64,

    /// 低于这个上传速率（B/s）视为不活跃
    pub inactive_up_rate: u64,

    /// 刚启动的种子在这段时间内不算慢速，照常占用名额。
    /// 这也决定了自动管理放行新种子的节奏。
    pub auto_manage_startup: Duration,

    /// 调度滴答间隔，实际生效值收敛到 [5s, 60s]
    pub tick_interval: Duration,

    /// 同一种子两次 tracker 公告之间的最小间隔
    pub tracker_backoff: Duration,

    /// 一次磁盘校验占用的时间。磁盘本身是外部协作者，
    /// 这里只是给校验过程一个可观测的时长。
    pub file_check_duration: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            active_downloads: 3,
            active_seeds: 5,
            active_checking: 1,
            active_limit: 15,
            dont_count_slow_torrents: true,
            inactive_down_rate: 2048,
            inactive_up_rate: 1024,
            auto_manage_startup: Duration::from_secs(60),
            tick_interval: Duration::from_secs(60),
            tracker_backoff: Duration::from_secs(250),
            file_check_duration: Duration::from_secs(2),
        }
    }
}

impl Settings {
    /// 收敛到允许范围内的滴答间隔
    pub fn clamped_tick_interval(&self) -> Duration {
        self.tick_interval.clamp(MIN_TICK_INTERVAL, MAX_TICK_INTERVAL)
    }

    /// 放行新种子的时间窗口，跟随滴答间隔而不是写死常量
    pub fn startup_window(&self) -> Duration {
        self.auto_manage_startup.max(self.clamped_tick_interval())
    }

    /// 把带 -1 哨兵值的上限换算成可比较的数
    pub fn limit(value: i32) -> usize {
        if value < 0 { usize::MAX } else { value as usize }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_interval_clamped() {
        let mut settings = Settings {
            tick_interval: Duration::from_secs(1),
            ..Default::default()
        };
        assert_eq!(settings.clamped_tick_interval(), MIN_TICK_INTERVAL);

        settings.tick_interval = Duration::from_secs(600);
        assert_eq!(settings.clamped_tick_interval(), MAX_TICK_INTERVAL);
    }

    #[test]
    fn test_unlimited_sentinel() {
        assert_eq!(Settings::limit(-1), usize::MAX);
        assert_eq!(Settings::limit(0), 0);
        assert_eq!(Settings::limit(3), 3);
    }
}
