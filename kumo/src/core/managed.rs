//! 会话侧的种子记录。
//!
//! 添加参数整体保留在记录里，调度过程中直接更新其中的
//! 标志位、时间与计数器，生成续传快照时按值取走即可。

use std::time::Duration;

use kumo_util::datetime;
use kumo_util::global::Id;
use tracing::debug;

use crate::core::config::Settings;
use crate::core::status::{TorrentFlags, TorrentState, TorrentStatus};
use crate::resume::AddTorrentParams;

/// 调度队列的归类。校验状态优先于下载/做种意图。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueClass {
    Checking,
    Downloading,
    Seeding,
}

pub struct ManagedTorrent {
    pub(crate) id: Id,

    /// 添加参数，随会话状态持续更新
    pub(crate) params: AddTorrentParams,

    /// 生命周期状态
    pub(crate) state: TorrentState,

    /// 在所属队列里的序号
    pub(crate) queue_position: i64,

    /// 最近一个窗口的传输速率，由 I/O 方上报
    pub(crate) download_rate: u64,
    pub(crate) upload_rate: u64,

    /// 最近一次从暂停转为活跃的会话时刻
    pub(crate) last_start: Option<Duration>,

    /// 本轮磁盘校验开始的时刻
    pub(crate) check_started: Option<Duration>,

    /// 最近一次公告的时刻
    pub(crate) last_announce: Option<Duration>,

    /// 本次激活是否已经公告过
    pub(crate) announced: bool,

    /// 磁盘上是否已有完整数据（添加时的探测结果）
    pub(crate) data_on_disk: bool,
}

impl ManagedTorrent {
    pub(crate) fn new(id: Id, params: AddTorrentParams) -> Self {
        Self {
            id,
            params,
            state: TorrentState::CheckingResumeData,
            queue_position: -1,
            download_rate: 0,
            upload_rate: 0,
            last_start: None,
            check_started: None,
            last_announce: None,
            announced: false,
            data_on_disk: false,
        }
    }

    pub fn name(&self) -> String {
        if !self.params.name.is_empty() {
            return self.params.name.clone();
        }
        self.params
            .ti
            .as_ref()
            .map(|ti| ti.info.name.clone())
            .unwrap_or_default()
    }

    pub fn is_paused(&self) -> bool {
        self.params.flags.contains(TorrentFlags::PAUSED)
    }

    pub fn is_auto_managed(&self) -> bool {
        self.params.flags.contains(TorrentFlags::AUTO_MANAGED)
    }

    /// 所有分片都已到手（不必已全部验证）
    pub fn is_finished(&self) -> bool {
        matches!(self.state, TorrentState::Finished | TorrentState::Seeding)
    }

    pub fn is_seeding(&self) -> bool {
        self.state == TorrentState::Seeding
    }

    pub(crate) fn class(&self) -> QueueClass {
        if self.state.is_checking() {
            QueueClass::Checking
        } else if self.is_finished() {
            QueueClass::Seeding
        } else {
            QueueClass::Downloading
        }
    }

    /// 慢速：两个方向的速率都低于阈值，且不在校验、也不在启动窗口内
    pub(crate) fn is_slow(&self, now: Duration, settings: &Settings) -> bool {
        if self.is_paused() || self.state.is_checking() {
            return false;
        }
        let Some(last_start) = self.last_start else {
            return false;
        };
        if now.saturating_sub(last_start) < settings.startup_window() {
            return false;
        }
        self.download_rate < settings.inactive_down_rate
            && self.upload_rate < settings.inactive_up_rate
    }

    /// 从暂停转为活跃。返回是否真的发生了转变。
    pub(crate) fn resume(&mut self, now: Duration) -> bool {
        if !self.is_paused() {
            return false;
        }
        self.params.flags.remove(TorrentFlags::PAUSED);
        self.last_start = Some(now);
        self.announced = false;
        // 排队等校验的种子拿到名额后才真正开始扫盘
        if self.state == TorrentState::CheckingFiles {
            self.check_started = Some(now);
        }
        true
    }

    /// 从活跃转为暂停。返回是否真的发生了转变。
    pub(crate) fn pause(&mut self, graceful: bool) -> bool {
        if self.is_paused() {
            return false;
        }
        if graceful {
            debug!("torrent {} 将平滑暂停", self.id);
        }
        self.params.flags.insert(TorrentFlags::PAUSED);
        // 校验中断后下次从头再来
        self.check_started = None;
        true
    }

    /// 本轮校验是否已经跑完
    pub(crate) fn check_due(&self, now: Duration, check_duration: Duration) -> bool {
        self.state == TorrentState::CheckingFiles
            && !self.is_paused()
            && self
                .check_started
                .is_some_and(|started| now.saturating_sub(started) >= check_duration)
    }

    /// 累加活跃计时。暂停的种子不计。
    pub(crate) fn accumulate(&mut self, dt: Duration) {
        if self.is_paused() {
            return;
        }
        let secs = dt.as_secs() as i64;
        self.params.active_time += secs;
        if self.is_finished() {
            self.params.finished_time += secs;
        }
        if self.is_seeding() {
            self.params.seeding_time += secs;
        }
    }

    /// I/O 方上报速率，顺带记录最近活跃时间
    pub(crate) fn set_rates(&mut self, download_rate: u64, upload_rate: u64) {
        self.download_rate = download_rate;
        self.upload_rate = upload_rate;
        if download_rate > 0 {
            self.params.last_download = datetime::now_secs();
        }
        if upload_rate > 0 {
            self.params.last_upload = datetime::now_secs();
        }
    }

    /// 标记全部分片到手，首次完成时落下完成时间
    pub(crate) fn mark_all_pieces(&mut self) {
        if let Some(ti) = &self.params.ti {
            self.params.have_pieces = vec![true; ti.piece_num()];
        } else if !self.params.have_pieces.is_empty() {
            self.params.have_pieces.iter_mut().for_each(|b| *b = true);
        }
        if self.params.completed_time == 0 {
            self.params.completed_time = datetime::now_secs();
        }
    }

    /// 是否应该发起一次公告
    pub(crate) fn should_announce(&self, now: Duration, backoff: Duration) -> bool {
        if self.is_paused() || self.state.is_checking() || self.announced {
            return false;
        }
        if self.params.trackers.is_empty() {
            return false;
        }
        match self.last_announce {
            Some(last) => now.saturating_sub(last) >= backoff,
            None => true,
        }
    }

    pub(crate) fn mark_announced(&mut self, now: Duration) {
        self.announced = true;
        self.last_announce = Some(now);
    }

    /// 状态快照
    pub fn status(&self) -> TorrentStatus {
        TorrentStatus {
            id: self.id,
            name: self.name(),
            flags: self.params.flags,
            state: self.state,
            paused: self.is_paused(),
            auto_managed: self.is_auto_managed(),
            is_finished: self.is_finished(),
            is_seeding: self.is_seeding(),
            download_rate: self.download_rate,
            upload_rate: self.upload_rate,
            queue_position: self.queue_position,
        }
    }
}
