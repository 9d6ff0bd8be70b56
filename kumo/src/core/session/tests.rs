use std::time::Duration;

use super::*;
use crate::core::storage::StorageProbe;
use crate::resume::AddTorrentParams;
use crate::torrent::{Torrent, TorrentArc};

/// 磁盘上什么都有
struct FullDisk;

impl StorageProbe for FullDisk {
    fn has_complete_data(&self, _save_path: &str, _name: &str) -> bool {
        true
    }
}

fn build_ti(name: &str) -> TorrentArc {
    let mut raw = Vec::new();
    raw.extend_from_slice(b"d4:infod6:lengthi32768e4:name");
    raw.extend_from_slice(format!("{}:{}", name.len(), name).as_bytes());
    raw.extend_from_slice(b"12:piece lengthi16384e6:pieces40:");
    raw.extend_from_slice(&[b'p'; 40]);
    raw.extend_from_slice(b"ee");
    TorrentArc::new(Torrent::from_bytes(&raw).unwrap())
}

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn params(name: &str, flags: TorrentFlags) -> AddTorrentParams {
    AddTorrentParams {
        ti: Some(build_ti(name)),
        save_path: "/data".to_string(),
        flags,
        ..Default::default()
    }
}

#[test]
fn test_add_routes_magnet_to_metadata() {
    let mut session = Session::new(Settings::default());
    let id = session.add_torrent(AddTorrentParams {
        info_hash: Some([1u8; 20]),
        flags: TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED,
        ..Default::default()
    });
    assert_eq!(session.get_status(id).unwrap().state, TorrentState::DownloadingMetadata);
}

#[test]
fn test_add_routes_no_data_to_downloading() {
    let mut session = Session::new(Settings::default());
    let id = session.add_torrent(params("a", TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED));
    let status = session.get_status(id).unwrap();
    assert_eq!(status.state, TorrentState::Downloading);
    assert_eq!(status.queue_position, 0);
}

#[test]
fn test_add_routes_disk_data_to_checking() {
    let mut session = Session::with_storage(Settings::default(), Box::new(FullDisk));
    let id = session.add_torrent(params("a", TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED));
    assert_eq!(session.get_status(id).unwrap().state, TorrentState::CheckingFiles);
}

#[test]
fn test_seed_mode_skips_checking() {
    let mut session = Session::new(Settings::default());
    let id = session.add_torrent(params("a", TorrentFlags::SEED_MODE | TorrentFlags::PAUSED));
    let status = session.get_status(id).unwrap();
    assert_eq!(status.state, TorrentState::Seeding);
    assert!(status.is_seeding);
    assert!(status.is_finished);
    // 做种队列自己的序号空间
    assert_eq!(status.queue_position, 0);
}

#[test]
fn test_force_stopped_parks_in_checking_state() {
    let mut session = Session::with_storage(Settings::default(), Box::new(FullDisk));
    let id = session.add_torrent(params("a", TorrentFlags::PAUSED));

    for i in 0..5 {
        session.tick(secs(i * 60));
    }

    let status = session.get_status(id).unwrap();
    // 可以走到排队校验，但没有名额可拿，不会变成做种
    assert_eq!(status.state, TorrentState::CheckingFiles);
    assert!(status.paused);
    assert!(!status.is_seeding);
}

#[test]
fn test_auto_managed_check_completes_to_seeding() {
    let mut session = Session::with_storage(Settings::default(), Box::new(FullDisk));
    let id = session.add_torrent(params("a", TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED));

    session.tick(secs(0));
    assert_eq!(session.get_status(id).unwrap().state, TorrentState::CheckingFiles);
    assert!(!session.get_status(id).unwrap().paused);

    session.tick(secs(60));
    let status = session.get_status(id).unwrap();
    assert!(status.is_seeding);
    assert!(!status.paused);

    // 校验结果落进了续传参数
    let atp = session.save_resume_data(id).unwrap();
    assert!(atp.have_pieces.iter().all(|&b| b));
    assert_eq!(atp.have_pieces.len(), 2);
    assert!(atp.completed_time > 0);
}

#[test]
fn test_stop_when_ready_parks_after_check() {
    let mut session = Session::with_storage(Settings::default(), Box::new(FullDisk));
    let flags = TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED | TorrentFlags::STOP_WHEN_READY;
    let id = session.add_torrent(params("a", flags));

    session.tick(secs(0));
    session.tick(secs(60));

    let status = session.get_status(id).unwrap();
    // 就绪即停：退出自动管理并暂停
    assert!(status.paused);
    assert!(!status.auto_managed);
    assert!(status.is_seeding);
}

#[test]
fn test_queue_positions_stay_contiguous() {
    let mut session = Session::new(Settings::default());
    let a = session.add_torrent(params("a", TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED));
    let b = session.add_torrent(params("b", TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED));
    let c = session.add_torrent(params("c", TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED));

    session.queue_top(c).unwrap();
    assert_eq!(session.get_status(c).unwrap().queue_position, 0);
    assert_eq!(session.get_status(a).unwrap().queue_position, 1);
    assert_eq!(session.get_status(b).unwrap().queue_position, 2);

    session.queue_down(a).unwrap();
    assert_eq!(session.get_status(b).unwrap().queue_position, 1);
    assert_eq!(session.get_status(a).unwrap().queue_position, 2);

    session.remove_torrent(b).unwrap();
    assert_eq!(session.get_status(c).unwrap().queue_position, 0);
    assert_eq!(session.get_status(a).unwrap().queue_position, 1);

    // 越界的目标序号收敛到合法范围
    session.set_queue_position(c, 99).unwrap();
    assert_eq!(session.get_status(c).unwrap().queue_position, 1);
}

#[test]
fn test_announce_waits_for_backoff() {
    let mut session = Session::new(Settings::default());
    let mut p = params("a", TorrentFlags::empty());
    p.trackers = vec!["http://t/announce".to_string()];
    p.tracker_tiers = vec![0];
    let id = session.add_torrent(p);

    let mut alerts = Vec::new();
    session.tick(secs(0));
    session.pop_alerts(&mut alerts);
    let announces = |alerts: &[Alert]| {
        alerts
            .iter()
            .filter(|a| a.kind == AlertKind::TrackerAnnounce)
            .count()
    };
    assert_eq!(announces(&alerts), 1);

    // 暂停再恢复，间隔小于 tracker_backoff，不应重复公告
    session.pause_torrent(id).unwrap();
    session.resume_torrent(id).unwrap();
    session.tick(secs(60));
    session.pop_alerts(&mut alerts);
    assert_eq!(announces(&alerts), 0);

    // 超过间隔之后的再激活可以公告
    session.pause_torrent(id).unwrap();
    session.resume_torrent(id).unwrap();
    session.tick(secs(600));
    session.pop_alerts(&mut alerts);
    assert_eq!(announces(&alerts), 1);
}

#[test]
fn test_counters_accumulate_only_while_active() {
    let mut session = Session::new(Settings::default());
    let id = session.add_torrent(params("a", TorrentFlags::empty()));

    session.tick(secs(0));
    session.tick(secs(60));
    session.tick(secs(120));
    session.pause_torrent(id).unwrap();
    session.tick(secs(180));

    let atp = session.save_resume_data(id).unwrap();
    assert_eq!(atp.active_time, 120);
    assert!(atp.flags.contains(TorrentFlags::PAUSED));
}

#[test]
fn test_set_metadata_reroutes() {
    let mut session = Session::new(Settings::default());
    let id = session.add_torrent(AddTorrentParams {
        info_hash: Some([1u8; 20]),
        flags: TorrentFlags::PAUSED,
        ..Default::default()
    });
    assert_eq!(session.get_status(id).unwrap().state, TorrentState::DownloadingMetadata);

    session.set_metadata(id, build_ti("late")).unwrap();
    assert_eq!(session.get_status(id).unwrap().state, TorrentState::Downloading);

    // 不在等元数据的种子拒绝这个命令
    assert!(session.set_metadata(id, build_ti("late")).is_err());
}

#[test]
fn test_force_recheck_demotes_missing_data() {
    // 数据在磁盘上时正常跑到做种
    let mut session = Session::with_storage(Settings::default(), Box::new(FullDisk));
    let id = session.add_torrent(params("a", TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED));
    session.tick(secs(0));
    session.tick(secs(60));
    assert!(session.get_status(id).unwrap().is_seeding);

    // 重新校验：位图作废，回到校验状态
    session.force_recheck(id).unwrap();
    let status = session.get_status(id).unwrap();
    assert_eq!(status.state, TorrentState::CheckingFiles);
    assert!(!status.is_seeding);

    session.tick(secs(120));
    session.tick(secs(180));
    assert!(session.get_status(id).unwrap().is_seeding);

    // 没有元数据的种子无从校验
    let magnet = session.add_torrent(AddTorrentParams {
        info_hash: Some([2u8; 20]),
        flags: TorrentFlags::PAUSED,
        ..Default::default()
    });
    assert!(session.force_recheck(magnet).is_err());
}

#[test]
fn test_unknown_id_is_an_error() {
    let mut session = Session::new(Settings::default());
    let id = session.add_torrent(params("a", TorrentFlags::empty()));
    session.remove_torrent(id).unwrap();

    assert!(session.pause_torrent(id).is_err());
    assert!(session.get_status(id).is_err());
    assert!(session.save_resume_data(id).is_err());
}
