//! 自动管理调度。
//!
//! 每个滴答做一趟完整的计算：把自动管理的种子按类划分、
//! 按队列序号排队、在并发上限内选出期望的活跃集合，
//! 再与当前状态做差生成暂停/恢复命令。强制启动和强制停止
//! （`auto_managed=false`）的种子从头到尾不会被碰。


use std::collections::{HashMap, HashSet};
use std::time::Duration;

use kumo_util::global::Id;
use tracing::trace;

use crate::core::config::Settings;
use crate::core::managed::{ManagedTorrent, QueueClass};

/// 一趟调度的结论。命令按类内队列序号排序，
/// 应用时先暂停后恢复，腾出名额再补位。
#[derive(Debug, Default)]
pub(crate) struct ScheduleOutcome {
    pub to_pause: Vec<Id>,
    pub to_resume: Vec<Id>,
}

/// 计算期望的活跃集合并与现状做差。
///
/// 校验、下载、做种三类依次分配；慢速种子在
/// `dont_count_slow_torrents` 打开时不占用类名额，
/// 但仍然受全局上限约束。
pub(crate) fn recalculate_auto_managed(
    settings: &Settings,
    now: Duration,
    torrents: &HashMap<Id, ManagedTorrent>,
    download_queue: &[Id],
    seed_queue: &[Id],
) -> ScheduleOutcome {
    let mut checking = Vec::new();
    let mut downloading = Vec::new();
    let mut seeding = Vec::new();

    for &id in download_queue.iter().chain(seed_queue.iter()) {
        let Some(torrent) = torrents.get(&id) else {
            continue;
        };
        if !torrent.is_auto_managed() {
            continue;
        }
        match torrent.class() {
            QueueClass::Checking => checking.push(id),
            QueueClass::Downloading => downloading.push(id),
            QueueClass::Seeding => seeding.push(id),
        }
    }

    let global_cap = Settings::limit(settings.active_limit);
    let mut desired: HashSet<Id> = HashSet::new();
    let mut total = 0usize;

    // 校验类永远占名额，慢速规则不适用
    let checking_cap = Settings::limit(settings.active_checking);
    let mut num_checking = 0usize;
    for &id in &checking {
        if num_checking < checking_cap && total < global_cap {
            desired.insert(id);
            num_checking += 1;
            total += 1;
        }
    }

    for (queue, cap) in [
        (&downloading, Settings::limit(settings.active_downloads)),
        (&seeding, Settings::limit(settings.active_seeds)),
    ] {
        let mut num = 0usize;
        for &id in queue {
            let torrent = &torrents[&id];
            if settings.dont_count_slow_torrents && torrent.is_slow(now, settings) {
                if total < global_cap {
                    desired.insert(id);
                    total += 1;
                }
            } else if num < cap && total < global_cap {
                desired.insert(id);
                num += 1;
                total += 1;
            }
        }
    }

    let mut outcome = ScheduleOutcome::default();
    for queue in [&checking, &downloading, &seeding] {
        for &id in queue {
            let torrent = &torrents[&id];
            let want_active = desired.contains(&id);
            if want_active && torrent.is_paused() {
                outcome.to_resume.push(id);
            } else if !want_active && !torrent.is_paused() {
                outcome.to_pause.push(id);
            }
        }
    }

    trace!(
        "调度: checking={} downloading={} seeding={} 期望活跃={} 暂停={} 恢复={}",
        checking.len(),
        downloading.len(),
        seeding.len(),
        desired.len(),
        outcome.to_pause.len(),
        outcome.to_resume.len(),
    );
    outcome
}
