//! 会话运行时的命令。需要回执的命令带一个 oneshot 发送端。

use anyhow::Result;
use bytes::Bytes;
use kumo_util::global::Id;
use tokio::sync::oneshot;

use crate::core::alert::Alert;
use crate::core::config::Settings;
use crate::core::status::{TorrentFlags, TorrentStatus};
use crate::resume::AddTorrentParams;

#[derive(Debug)]
pub enum Command {
    /// 加入种子，回报分配的 id
    AddTorrent {
        params: Box<AddTorrentParams>,
        reply: oneshot::Sender<Id>,
    },
    RemoveTorrent {
        id: Id,
        reply: oneshot::Sender<Result<()>>,
    },
    PauseTorrent {
        id: Id,
        reply: oneshot::Sender<Result<()>>,
    },
    ResumeTorrent {
        id: Id,
        reply: oneshot::Sender<Result<()>>,
    },
    SetFlags {
        id: Id,
        flags: TorrentFlags,
        reply: oneshot::Sender<Result<()>>,
    },
    UnsetFlags {
        id: Id,
        flags: TorrentFlags,
        reply: oneshot::Sender<Result<()>>,
    },
    SetQueuePosition {
        id: Id,
        position: i64,
        reply: oneshot::Sender<Result<()>>,
    },
    GetStatus {
        id: Id,
        reply: oneshot::Sender<Result<TorrentStatus>>,
    },
    /// 打包当前状态为续传快照字节
    SaveResumeData {
        id: Id,
        reply: oneshot::Sender<Result<Bytes>>,
    },
    PopAlerts {
        reply: oneshot::Sender<Vec<Alert>>,
    },
    ApplySettings(Box<Settings>),
    Shutdown,
}
