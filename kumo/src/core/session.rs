//! 会话：持有全部种子记录，驱动调度滴答、执行用户命令、产出事件。
//!
//! 整个会话在单线程上协作运行：滴答是一次同步的、不阻塞的遍历，
//! 命令只改内存状态，事件按发生顺序进入队列。

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Result, anyhow};
use kumo_util::datetime;
use kumo_util::global::{GlobalId, Id};
use tracing::{debug, info};

use crate::core::alert::{Alert, AlertKind, AlertQueue};
use crate::core::config::Settings;
use crate::core::managed::ManagedTorrent;
use crate::core::scheduler;
use crate::core::status::{TorrentFlags, TorrentState, TorrentStatus};
use crate::core::storage::{EmptyStorage, StorageProbe};
use crate::resume::AddTorrentParams;
use crate::torrent::TorrentArc;

pub struct Session {
    settings: Settings,

    /// 全部种子记录
    torrents: HashMap<Id, ManagedTorrent>,

    /// 未完成种子的队列，下标即队列序号
    download_queue: Vec<Id>,

    /// 已完成种子的队列
    seed_queue: Vec<Id>,

    /// 事件队列
    alerts: AlertQueue,

    /// 磁盘探测钩子
    storage: Box<dyn StorageProbe>,

    /// 会话时间轴上的当前时刻
    now: Duration,

    /// 上一次滴答的时刻
    last_tick: Option<Duration>,

    /// 最近一次放行新种子的时刻，控制启动节奏
    last_admission: Option<Duration>,
}

impl Session {
    pub fn new(settings: Settings) -> Self {
        Self::with_storage(settings, Box::new(EmptyStorage))
    }

    pub fn with_storage(settings: Settings, storage: Box<dyn StorageProbe>) -> Self {
        Self {
            settings,
            torrents: HashMap::new(),
            download_queue: Vec::new(),
            seed_queue: Vec::new(),
            alerts: AlertQueue::default(),
            storage,
            now: Duration::ZERO,
            last_tick: None,
            last_admission: None,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// 替换调度参数，下一个滴答按新参数重新计算
    pub fn apply_settings(&mut self, settings: Settings) {
        info!("会话配置已更新");
        self.settings = settings;
    }

    pub fn num_torrents(&self) -> usize {
        self.torrents.len()
    }

    /// 按队列顺序列出全部种子
    pub fn torrent_ids(&self) -> Vec<Id> {
        let mut ids = self.download_queue.clone();
        ids.extend_from_slice(&self.seed_queue);
        ids
    }

    pub fn get_status(&self, id: Id) -> Result<TorrentStatus> {
        self.torrents
            .get(&id)
            .map(|torrent| torrent.status())
            .ok_or_else(|| anyhow!("torrent 不存在: {id}"))
    }

    /// 取走全部事件
    pub fn pop_alerts(&mut self, out: &mut Vec<Alert>) {
        self.alerts.pop_alerts(out);
    }

    /// 加入一个种子。同步完成续传数据检查并路由到下一个状态，
    /// 真正的启停交给调度滴答。
    pub fn add_torrent(&mut self, params: AddTorrentParams) -> Id {
        let id = GlobalId::next_id();
        let mut torrent = ManagedTorrent::new(id, params);
        if torrent.params.added_time == 0 {
            torrent.params.added_time = datetime::now_secs();
        }
        if !torrent.is_paused() {
            torrent.last_start = Some(self.now);
        }
        debug!("加入 torrent {id}: {}", torrent.name());

        self.torrents.insert(id, torrent);
        self.alerts.post(self.now, id, AlertKind::TorrentAdded);
        self.route_torrent(id);

        // 路由完成后再入队：已完成的直接进做种队列
        if let Some(torrent) = self.torrents.get_mut(&id) {
            if torrent.is_finished() {
                torrent.queue_position = self.seed_queue.len() as i64;
                self.seed_queue.push(id);
            } else {
                torrent.queue_position = self.download_queue.len() as i64;
                self.download_queue.push(id);
            }
        }
        id
    }

    /// 移除一个种子
    pub fn remove_torrent(&mut self, id: Id) -> Result<()> {
        self.torrents
            .remove(&id)
            .ok_or_else(|| anyhow!("torrent 不存在: {id}"))?;
        self.download_queue.retain(|&x| x != id);
        self.seed_queue.retain(|&x| x != id);
        self.reindex_queues();
        Ok(())
    }

    /// 用户恢复。自动管理的种子下个滴答可能再被调度器暂停。
    pub fn resume_torrent(&mut self, id: Id) -> Result<()> {
        self.ensure_exists(id)?;
        self.do_resume(id);
        Ok(())
    }

    /// 用户暂停。自动管理的种子下个滴答可能再被调度器恢复，
    /// 要彻底停住应当先去掉 auto_managed 标志。
    pub fn pause_torrent(&mut self, id: Id) -> Result<()> {
        self.ensure_exists(id)?;
        self.do_pause(id, false);
        Ok(())
    }

    /// 置上标志位。暂停位走正常的暂停流程（带事件）。
    pub fn set_flags(&mut self, id: Id, flags: TorrentFlags) -> Result<()> {
        self.ensure_exists(id)?;
        if flags.contains(TorrentFlags::PAUSED) {
            self.do_pause(id, false);
        }
        let mut rest = flags;
        rest.remove(TorrentFlags::PAUSED);
        if let Some(torrent) = self.torrents.get_mut(&id) {
            torrent.params.flags.insert(rest);
        }
        Ok(())
    }

    /// 清掉标志位。暂停位走正常的恢复流程（带事件）。
    pub fn unset_flags(&mut self, id: Id, flags: TorrentFlags) -> Result<()> {
        self.ensure_exists(id)?;
        if flags.contains(TorrentFlags::PAUSED) {
            self.do_resume(id);
        }
        let mut rest = flags;
        rest.remove(TorrentFlags::PAUSED);
        if let Some(torrent) = self.torrents.get_mut(&id) {
            torrent.params.flags.remove(rest);
        }
        Ok(())
    }

    /// I/O 方上报最近窗口的传输速率
    pub fn set_transfer_rates(&mut self, id: Id, download_rate: u64, upload_rate: u64) -> Result<()> {
        self.torrents
            .get_mut(&id)
            .map(|torrent| torrent.set_rates(download_rate, upload_rate))
            .ok_or_else(|| anyhow!("torrent 不存在: {id}"))
    }

    /// 元数据就位（磁力添加的种子），重新路由生命周期状态
    pub fn set_metadata(&mut self, id: Id, ti: TorrentArc) -> Result<()> {
        let torrent = self
            .torrents
            .get_mut(&id)
            .ok_or_else(|| anyhow!("torrent 不存在: {id}"))?;
        if torrent.state != TorrentState::DownloadingMetadata {
            return Err(anyhow!("torrent {id} 不在等元数据"));
        }
        torrent.params.ti = Some(ti);
        self.route_torrent(id);
        if self
            .torrents
            .get(&id)
            .is_some_and(|torrent| torrent.is_finished())
        {
            self.move_to_seed_queue(id);
        }
        Ok(())
    }

    /// 重新校验磁盘数据。手头的位图作废，重新探测磁盘，
    /// 校验名额仍然由调度器分配。
    pub fn force_recheck(&mut self, id: Id) -> Result<()> {
        let torrent = self
            .torrents
            .get_mut(&id)
            .ok_or_else(|| anyhow!("torrent 不存在: {id}"))?;
        if torrent.params.ti.is_none() {
            return Err(anyhow!("torrent {id} 还没有元数据，无从校验"));
        }
        torrent.params.have_pieces.clear();
        torrent.params.verified_pieces.clear();
        let save_path = torrent.params.save_path.clone();
        let name = torrent.name();
        torrent.data_on_disk = self.storage.has_complete_data(&save_path, &name);
        torrent.check_started = if torrent.is_paused() {
            None
        } else {
            Some(self.now)
        };
        self.set_state(id, TorrentState::CheckingFiles);
        Ok(())
    }

    /// 生成续传快照的输入。记录里的参数一直与会话状态同步，
    /// 按值取走即可交给编码器。
    pub fn save_resume_data(&self, id: Id) -> Result<AddTorrentParams> {
        self.torrents
            .get(&id)
            .map(|torrent| torrent.params.clone())
            .ok_or_else(|| anyhow!("torrent 不存在: {id}"))
    }

    // =======================================================================
    // 队列序号
    // =======================================================================

    pub fn set_queue_position(&mut self, id: Id, position: i64) -> Result<()> {
        self.move_in_queue(id, position)
    }

    pub fn queue_top(&mut self, id: Id) -> Result<()> {
        self.move_in_queue(id, 0)
    }

    pub fn queue_bottom(&mut self, id: Id) -> Result<()> {
        self.move_in_queue(id, i64::MAX)
    }

    pub fn queue_up(&mut self, id: Id) -> Result<()> {
        let position = self.get_status(id)?.queue_position;
        self.move_in_queue(id, position.saturating_sub(1))
    }

    pub fn queue_down(&mut self, id: Id) -> Result<()> {
        let position = self.get_status(id)?.queue_position;
        self.move_in_queue(id, position.saturating_add(1))
    }

    // =======================================================================
    // 滴答
    // =======================================================================

    /// 一次调度滴答。`now` 是会话时间轴上的当前时刻，单调递增。
    pub fn tick(&mut self, now: Duration) {
        self.now = now;
        let dt = self
            .last_tick
            .map_or(Duration::ZERO, |last| now.saturating_sub(last));
        self.last_tick = Some(now);

        // 1. 累加活跃计时
        for id in self.torrent_ids() {
            if let Some(torrent) = self.torrents.get_mut(&id) {
                torrent.accumulate(dt);
            }
        }

        // 2. 校验收尾
        let check_duration = self.settings.file_check_duration;
        let due: Vec<Id> = self
            .torrent_ids()
            .into_iter()
            .filter(|id| {
                self.torrents
                    .get(id)
                    .is_some_and(|torrent| torrent.check_due(now, check_duration))
            })
            .collect();
        for id in due {
            self.finish_check(id);
        }

        // 3. 调度：先暂停腾名额，再按节奏放行
        let outcome = scheduler::recalculate_auto_managed(
            &self.settings,
            now,
            &self.torrents,
            &self.download_queue,
            &self.seed_queue,
        );
        for id in outcome.to_pause {
            self.do_pause(id, true);
        }
        for id in outcome.to_resume {
            if let Some(last) = self.last_admission {
                if now.saturating_sub(last) < self.settings.startup_window() {
                    debug!("torrent {id} 的恢复推迟到下一个滴答");
                    continue;
                }
            }
            if self.do_resume(id) {
                self.last_admission = Some(now);
            }
        }

        // 4. 公告。校验中的种子绝不公告。
        let backoff = self.settings.tracker_backoff;
        for id in self.torrent_ids() {
            let Some(torrent) = self.torrents.get_mut(&id) else {
                continue;
            };
            if torrent.should_announce(now, backoff) {
                torrent.mark_announced(now);
                self.alerts.post(now, id, AlertKind::TrackerAnnounce);
            }
        }
    }

    // =======================================================================
    // 内部流转
    // =======================================================================

    fn ensure_exists(&self, id: Id) -> Result<()> {
        if self.torrents.contains_key(&id) {
            Ok(())
        } else {
            Err(anyhow!("torrent 不存在: {id}"))
        }
    }

    /// 续传数据检查之后的状态路由。
    ///
    /// 没有元数据的等元数据；seed_mode 或续传位图完整的直接做种；
    /// 磁盘上有数据的排队校验；其余进入下载。强制停止的种子也允许
    /// 走到排队校验这一步，但拿不到名额，不会再往前走。
    fn route_torrent(&mut self, id: Id) {
        let Some(torrent) = self.torrents.get_mut(&id) else {
            return;
        };
        let next = if torrent.params.ti.is_none() {
            TorrentState::DownloadingMetadata
        } else if torrent.params.flags.contains(TorrentFlags::SEED_MODE) {
            torrent.mark_all_pieces();
            TorrentState::Seeding
        } else if resume_bitmap_complete(torrent) {
            torrent.mark_all_pieces();
            TorrentState::Seeding
        } else {
            let save_path = torrent.params.save_path.clone();
            let name = torrent.name();
            if self.storage.has_complete_data(&save_path, &name) {
                torrent.data_on_disk = true;
                TorrentState::CheckingFiles
            } else {
                TorrentState::Downloading
            }
        };
        if next == TorrentState::CheckingFiles && !torrent.is_paused() {
            torrent.check_started = Some(self.now);
        }
        self.set_state(id, next);
    }

    /// 状态迁移并发事件
    fn set_state(&mut self, id: Id, next: TorrentState) {
        let Some(torrent) = self.torrents.get_mut(&id) else {
            return;
        };
        if torrent.state == next {
            return;
        }
        let prev = torrent.state;
        torrent.state = next;
        let now = self.now;
        self.alerts.post(now, id, AlertKind::StateChanged { prev, cur: next });
    }

    /// 校验跑完，应用结果。数据完整则转做种并迁入做种队列；
    /// 否则回到下载。从校验转出的过程不公告。
    fn finish_check(&mut self, id: Id) {
        let Some(torrent) = self.torrents.get_mut(&id) else {
            return;
        };
        torrent.check_started = None;
        let complete = torrent.data_on_disk;
        if complete {
            torrent.mark_all_pieces();
            torrent.params.verified_pieces = torrent.params.have_pieces.clone();
        }
        let stop_when_ready = torrent.params.flags.contains(TorrentFlags::STOP_WHEN_READY);

        if complete {
            self.set_state(id, TorrentState::Seeding);
            self.move_to_seed_queue(id);
        } else {
            // 数据不在（或读不出来），回到下载队列等数据
            self.set_state(id, TorrentState::Downloading);
            self.move_to_download_queue(id);
        }

        if stop_when_ready {
            // 就绪即停：退出自动管理并暂停
            if let Some(torrent) = self.torrents.get_mut(&id) {
                torrent.params.flags.remove(TorrentFlags::AUTO_MANAGED);
            }
            self.do_pause(id, false);
        }
    }

    /// 完成的种子从下载队列迁入做种队列，序号排到末尾
    fn move_to_seed_queue(&mut self, id: Id) {
        let Some(position) = self.download_queue.iter().position(|&x| x == id) else {
            return;
        };
        self.download_queue.remove(position);
        self.seed_queue.push(id);
        self.reindex_queues();
    }

    /// 重新校验后发现数据不全的种子迁回下载队列
    fn move_to_download_queue(&mut self, id: Id) {
        let Some(position) = self.seed_queue.iter().position(|&x| x == id) else {
            return;
        };
        self.seed_queue.remove(position);
        self.download_queue.push(id);
        self.reindex_queues();
    }

    fn do_resume(&mut self, id: Id) -> bool {
        let Some(torrent) = self.torrents.get_mut(&id) else {
            return false;
        };
        let now = self.now;
        if torrent.resume(now) {
            self.alerts.post(now, id, AlertKind::TorrentResumed);
            true
        } else {
            false
        }
    }

    fn do_pause(&mut self, id: Id, graceful: bool) -> bool {
        let Some(torrent) = self.torrents.get_mut(&id) else {
            return false;
        };
        if torrent.pause(graceful) {
            let now = self.now;
            self.alerts.post(now, id, AlertKind::TorrentPaused);
            true
        } else {
            false
        }
    }

    fn move_in_queue(&mut self, id: Id, target: i64) -> Result<()> {
        let finished = self
            .torrents
            .get(&id)
            .ok_or_else(|| anyhow!("torrent 不存在: {id}"))?
            .is_finished();
        let queue = if finished {
            &mut self.seed_queue
        } else {
            &mut self.download_queue
        };
        let current = queue
            .iter()
            .position(|&x| x == id)
            .ok_or_else(|| anyhow!("torrent 不在队列里: {id}"))?;
        let target = target.clamp(0, queue.len() as i64 - 1) as usize;
        queue.remove(current);
        queue.insert(target, id);
        self.reindex_queues();
        Ok(())
    }

    /// 队列序号始终保持 [0, n) 连续无重复
    fn reindex_queues(&mut self) {
        for (index, id) in self.download_queue.clone().into_iter().enumerate() {
            if let Some(torrent) = self.torrents.get_mut(&id) {
                torrent.queue_position = index as i64;
            }
        }
        for (index, id) in self.seed_queue.clone().into_iter().enumerate() {
            if let Some(torrent) = self.torrents.get_mut(&id) {
                torrent.queue_position = index as i64;
            }
        }
    }
}

/// 续传位图是否声明了全部分片
fn resume_bitmap_complete(torrent: &ManagedTorrent) -> bool {
    let have = &torrent.params.have_pieces;
    if have.is_empty() || !have.iter().all(|&b| b) {
        return false;
    }
    match &torrent.params.ti {
        Some(ti) => have.len() >= ti.piece_num(),
        None => true,
    }
}
