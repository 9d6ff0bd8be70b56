//! 事件队列。会话把生命周期事件按发生顺序追加进来，
//! 消费方通过 `pop_alerts` 一次性取走。

use std::collections::VecDeque;
use std::time::Duration;

use kumo_util::global::Id;
use tracing::trace;

use crate::core::status::TorrentState;

/// 事件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// 种子已加入会话
    TorrentAdded,
    /// 从暂停转为活跃
    TorrentResumed,
    /// 从活跃转为暂停
    TorrentPaused,
    /// 生命周期状态变化
    StateChanged {
        prev: TorrentState,
        cur: TorrentState,
    },
    /// 发起了一次 tracker 公告
    TrackerAnnounce,
}

/// 带时间戳的事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// 会话时间轴上的时刻
    pub timestamp: Duration,
    pub id: Id,
    pub kind: AlertKind,
}

/// 单生产者单消费者的有序事件队列
#[derive(Debug, Default)]
pub struct AlertQueue {
    queue: VecDeque<Alert>,
}

impl AlertQueue {
    pub fn post(&mut self, timestamp: Duration, id: Id, kind: AlertKind) {
        trace!("[{}s] torrent {id} 事件: {kind:?}", timestamp.as_secs());
        self.queue.push_back(Alert { timestamp, id, kind });
    }

    /// 取走全部事件，保持发生顺序。传入的容器会先被清空。
    pub fn pop_alerts(&mut self, out: &mut Vec<Alert>) {
        out.clear();
        out.extend(self.queue.drain(..));
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordered_drain() {
        let mut alerts = AlertQueue::default();
        let id = Id::default();
        alerts.post(Duration::from_secs(1), id, AlertKind::TorrentAdded);
        alerts.post(Duration::from_secs(2), id, AlertKind::TorrentResumed);
        alerts.post(Duration::from_secs(3), id, AlertKind::TorrentPaused);

        let mut out = vec![Alert {
            timestamp: Duration::ZERO,
            id,
            kind: AlertKind::TrackerAnnounce,
        }];
        alerts.pop_alerts(&mut out);

        assert_eq!(out.len(), 3);
        assert!(out.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(out[0].kind, AlertKind::TorrentAdded);
        assert!(alerts.is_empty());
    }
}
