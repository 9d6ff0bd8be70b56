//! 运行时冒烟测试。虚拟时间驱动，不碰真实时钟。

use std::time::Duration;

use kumo::alert::AlertKind;
use kumo::command::Command;
use kumo::config::Settings;
use kumo::emitter::Emitter;
use kumo::resume::{AddTorrentParams, read_resume_data};
use kumo::runtime::SessionRuntime;
use kumo::status::TorrentFlags;
use kumo::torrent::{Torrent, TorrentArc};
use kumo_util::default_logger;
use tracing::Level;

default_logger!(Level::INFO);

fn build_ti(name: &str) -> TorrentArc {
    let mut raw = Vec::new();
    raw.extend_from_slice(b"d4:infod6:lengthi16384e4:name");
    raw.extend_from_slice(format!("{}:{}", name.len(), name).as_bytes());
    raw.extend_from_slice(b"12:piece lengthi16384e6:pieces20:");
    raw.extend_from_slice(&[b'r'; 20]);
    raw.extend_from_slice(b"ee");
    TorrentArc::new(Torrent::from_bytes(&raw).unwrap())
}

fn paused_auto(name: &str) -> AddTorrentParams {
    AddTorrentParams {
        ti: Some(build_ti(name)),
        save_path: "dummy".to_string(),
        flags: TorrentFlags::AUTO_MANAGED | TorrentFlags::PAUSED,
        ..Default::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_runtime_enforces_download_limit() {
    let handle = SessionRuntime::spawn(Settings {
        active_downloads: 1,
        dont_count_slow_torrents: false,
        ..Default::default()
    });

    for i in 0..3 {
        handle.add_torrent(paused_auto(&format!("t{i}"))).await.unwrap();
    }

    // 快进五分钟虚拟时间，让滴答跑起来
    tokio::time::sleep(Duration::from_secs(300)).await;

    let alerts = handle.pop_alerts().await.unwrap();
    let resumed = alerts
        .iter()
        .filter(|a| a.kind == AlertKind::TorrentResumed)
        .count();
    assert_eq!(resumed, 1);

    handle.cancel();
}

#[tokio::test(start_paused = true)]
async fn test_runtime_command_roundtrip() {
    let handle = SessionRuntime::spawn(Settings::default());

    let id = handle
        .add_torrent(AddTorrentParams {
            ti: Some(build_ti("rt")),
            save_path: "dummy".to_string(),
            flags: TorrentFlags::empty(),
            ..Default::default()
        })
        .await
        .unwrap();

    let status = handle.get_status(id).await.unwrap();
    assert!(!status.paused);

    handle.pause_torrent(id).await.unwrap();
    assert!(handle.get_status(id).await.unwrap().paused);

    // 快照走运行时出来也能解析回去
    let buf = handle.save_resume_data(id).await.unwrap();
    let restored = read_resume_data(&buf).unwrap();
    assert!(restored.flags.contains(TorrentFlags::PAUSED));

    // 通过发射器发命令停机
    Emitter::global()
        .send(handle.name(), Command::Shutdown)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_secs(1)).await;

    // 运行时退出后命令通道随之关闭
    assert!(handle.get_status(id).await.is_err());
}
