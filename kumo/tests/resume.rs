//! 续传快照的端到端验证：会话状态 -> 编码 -> 解码 -> 新会话。

use std::time::Duration;

use kumo::config::Settings;
use kumo::resume::{AddTorrentParams, read_resume_data, write_resume_data_buf, write_torrent_file};
use kumo::session::Session;
use kumo::status::{TorrentFlags, TorrentState};
use kumo::storage::StorageProbe;
use kumo::torrent::{Torrent, TorrentArc};
use kumo_util::default_logger;
use tracing::Level;

default_logger!(Level::INFO);

struct FullDisk;

impl StorageProbe for FullDisk {
    fn has_complete_data(&self, _save_path: &str, _name: &str) -> bool {
        true
    }
}

fn build_ti() -> TorrentArc {
    let mut raw = Vec::new();
    raw.extend_from_slice(b"d8:announce17:http://t/announce7:comment5:hello4:info");
    raw.extend_from_slice(b"d6:lengthi49152e4:name4:blob12:piece lengthi16384e6:pieces60:");
    raw.extend_from_slice(&[b'h'; 60]);
    raw.extend_from_slice(b"ee");
    TorrentArc::new(Torrent::from_bytes(&raw).unwrap())
}

/// 会话里跑出来的快照，经过编解码后能在新会话里原地恢复
#[test]
fn test_snapshot_restores_into_new_session() {
    let mut session = Session::with_storage(Settings::default(), Box::new(FullDisk));
    let ti = build_ti();
    let id = session.add_torrent(AddTorrentParams {
        ti: Some(ti.clone()),
        save_path: "/srv/data".to_string(),
        trackers: vec!["http://t/announce".to_string()],
        tracker_tiers: vec![0],
        flags: TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED,
        ..Default::default()
    });

    // 跑到做种为止
    for minute in 0..3 {
        session.tick(Duration::from_secs(minute * 60));
    }
    assert!(session.get_status(id).unwrap().is_seeding);

    let snapshot = session.save_resume_data(id).unwrap();
    let buf = write_resume_data_buf(&snapshot);
    let restored = read_resume_data(&buf).unwrap();

    // 调度器写下的字段都在
    assert!(restored.flags.contains(TorrentFlags::AUTO_MANAGED));
    assert!(!restored.flags.contains(TorrentFlags::PAUSED));
    assert!(restored.active_time >= 120);
    assert!(restored.completed_time > 0);
    assert!(restored.added_time > 0);
    assert_eq!(restored.have_pieces, vec![true; 3]);
    assert_eq!(restored.save_path, "/srv/data");

    // 位图齐全的种子在新会话里直接回到做种，不再重新校验
    let mut fresh = Session::new(Settings::default());
    let restored_id = fresh.add_torrent(restored);
    assert_eq!(fresh.get_status(restored_id).unwrap().state, TorrentState::Seeding);
}

#[test]
fn test_info_hash_identity_through_snapshot() {
    let ti = build_ti();
    let info_hash = ti.info_hash;
    let atp = AddTorrentParams {
        ti: Some(ti),
        trackers: vec!["http://t/announce".to_string()],
        tracker_tiers: vec![0],
        ..Default::default()
    };

    let buf = write_resume_data_buf(&atp);
    let restored = read_resume_data(&buf).unwrap();
    let restored_ti = restored.ti.expect("info 段应该被恢复");
    assert_eq!(restored_ti.info_hash, info_hash);

    // 导出的 .torrent 同样保持 info-hash
    let torrent_bytes = write_torrent_file(&atp).to_bytes();
    assert_eq!(Torrent::from_bytes(&torrent_bytes).unwrap().info_hash, info_hash);
}

/// 快照经过一轮解码再编码，字节不变
#[test]
fn test_snapshot_is_stable_over_recode() {
    let mut session = Session::with_storage(Settings::default(), Box::new(FullDisk));
    let id = session.add_torrent(AddTorrentParams {
        ti: Some(build_ti()),
        save_path: "/srv/data".to_string(),
        flags: TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED,
        ..Default::default()
    });
    for minute in 0..3 {
        session.tick(Duration::from_secs(minute * 60));
    }

    let buf = write_resume_data_buf(&session.save_resume_data(id).unwrap());
    let recoded = write_resume_data_buf(&read_resume_data(&buf).unwrap());
    assert_eq!(recoded, buf);
}
