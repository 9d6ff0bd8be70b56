//! 会话运行时：把同步的会话核心包进一个 select 循环，
//! 由命令 channel、定时滴答和停机令牌驱动。

use anyhow::{Result, anyhow};
use bytes::Bytes;
use kumo_util::global::{GlobalId, Id};
use tokio::sync::mpsc::{Receiver, Sender, channel};
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::core::alert::Alert;
use crate::core::command::Command;
use crate::core::config::{CHANNEL_BUFFER, Settings};
use crate::core::emitter::{Emitter, SESSION_PREFIX};
use crate::core::session::Session;
use crate::core::status::{TorrentFlags, TorrentStatus};
use crate::core::storage::{EmptyStorage, StorageProbe};
use crate::resume::{AddTorrentParams, write_resume_data_buf};

/// 运行时的控制端，可随意克隆
#[derive(Clone)]
pub struct SessionHandle {
    name: String,
    send: Sender<Command>,
    cancel_token: CancellationToken,
}

impl SessionHandle {
    /// 在发射器里注册的名字
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// 停机。循环里未处理完的命令会被丢弃。
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    pub async fn add_torrent(&self, params: AddTorrentParams) -> Result<Id> {
        let (reply, recv) = oneshot::channel();
        self.request(Command::AddTorrent {
            params: Box::new(params),
            reply,
        })
        .await?;
        recv.await.map_err(|_| anyhow!("运行时已关闭"))
    }

    pub async fn pause_torrent(&self, id: Id) -> Result<()> {
        let (reply, recv) = oneshot::channel();
        self.request(Command::PauseTorrent { id, reply }).await?;
        recv.await.map_err(|_| anyhow!("运行时已关闭"))?
    }

    pub async fn resume_torrent(&self, id: Id) -> Result<()> {
        let (reply, recv) = oneshot::channel();
        self.request(Command::ResumeTorrent { id, reply }).await?;
        recv.await.map_err(|_| anyhow!("运行时已关闭"))?
    }

    pub async fn remove_torrent(&self, id: Id) -> Result<()> {
        let (reply, recv) = oneshot::channel();
        self.request(Command::RemoveTorrent { id, reply }).await?;
        recv.await.map_err(|_| anyhow!("运行时已关闭"))?
    }

    pub async fn set_flags(&self, id: Id, flags: TorrentFlags) -> Result<()> {
        let (reply, recv) = oneshot::channel();
        self.request(Command::SetFlags { id, flags, reply }).await?;
        recv.await.map_err(|_| anyhow!("运行时已关闭"))?
    }

    pub async fn unset_flags(&self, id: Id, flags: TorrentFlags) -> Result<()> {
        let (reply, recv) = oneshot::channel();
        self.request(Command::UnsetFlags { id, flags, reply }).await?;
        recv.await.map_err(|_| anyhow!("运行时已关闭"))?
    }

    pub async fn set_queue_position(&self, id: Id, position: i64) -> Result<()> {
        let (reply, recv) = oneshot::channel();
        self.request(Command::SetQueuePosition { id, position, reply }).await?;
        recv.await.map_err(|_| anyhow!("运行时已关闭"))?
    }

    pub async fn get_status(&self, id: Id) -> Result<TorrentStatus> {
        let (reply, recv) = oneshot::channel();
        self.request(Command::GetStatus { id, reply }).await?;
        recv.await.map_err(|_| anyhow!("运行时已关闭"))?
    }

    pub async fn save_resume_data(&self, id: Id) -> Result<Bytes> {
        let (reply, recv) = oneshot::channel();
        self.request(Command::SaveResumeData { id, reply }).await?;
        recv.await.map_err(|_| anyhow!("运行时已关闭"))?
    }

    pub async fn pop_alerts(&self) -> Result<Vec<Alert>> {
        let (reply, recv) = oneshot::channel();
        self.request(Command::PopAlerts { reply }).await?;
        recv.await.map_err(|_| anyhow!("运行时已关闭"))
    }

    pub async fn apply_settings(&self, settings: Settings) -> Result<()> {
        self.request(Command::ApplySettings(Box::new(settings))).await
    }

    async fn request(&self, command: Command) -> Result<()> {
        self.send
            .send(command)
            .await
            .map_err(|e| anyhow!("运行时命令通道已关闭: {e}"))
    }
}

pub struct SessionRuntime {
    session: Session,
    recv: Receiver<Command>,
    cancel_token: CancellationToken,
    start: Instant,
}

impl SessionRuntime {
    /// 启动一个运行时任务，返回控制端
    pub fn spawn(settings: Settings) -> SessionHandle {
        Self::spawn_with_storage(settings, Box::new(EmptyStorage))
    }

    pub fn spawn_with_storage(settings: Settings, storage: Box<dyn StorageProbe>) -> SessionHandle {
        let name = format!("{SESSION_PREFIX}{}", GlobalId::next_id());
        let (send, recv) = channel(CHANNEL_BUFFER);
        Emitter::global().register(&name, send.clone());

        let cancel_token = CancellationToken::new();
        let runtime = SessionRuntime {
            session: Session::with_storage(settings, storage),
            recv,
            cancel_token: cancel_token.clone(),
            start: Instant::now(),
        };
        let handle = SessionHandle {
            name: name.clone(),
            send,
            cancel_token,
        };
        tokio::spawn(runtime.run(name));
        handle
    }

    async fn run(mut self, name: String) {
        info!("{name} 运行中...");
        let mut period = self.session.settings().clamped_tick_interval();
        let mut interval = tokio::time::interval(period);

        loop {
            tokio::select! {
                _ = self.cancel_token.cancelled() => {
                    debug!("{name} 收到停机信号");
                    break;
                }
                command = self.recv.recv() => {
                    match command {
                        Some(command) => {
                            if !self.handle_command(command) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = interval.tick() => {
                    self.session.tick(self.start.elapsed());
                }
            }

            // 配置更新后按新的间隔走
            let current = self.session.settings().clamped_tick_interval();
            if current != period {
                period = current;
                interval = tokio::time::interval(period);
            }
        }

        Emitter::global().remove(&name);
        info!("{name} 已关闭");
    }

    /// 处理一条命令，返回是否继续运行
    fn handle_command(&mut self, command: Command) -> bool {
        match command {
            Command::AddTorrent { params, reply } => {
                let id = self.session.add_torrent(*params);
                // 事件驱动的提前滴答，不用等下一个整点
                self.session.tick(self.start.elapsed());
                let _ = reply.send(id);
            }
            Command::RemoveTorrent { id, reply } => {
                let _ = reply.send(self.session.remove_torrent(id));
            }
            Command::PauseTorrent { id, reply } => {
                let _ = reply.send(self.session.pause_torrent(id));
            }
            Command::ResumeTorrent { id, reply } => {
                let _ = reply.send(self.session.resume_torrent(id));
            }
            Command::SetFlags { id, flags, reply } => {
                let _ = reply.send(self.session.set_flags(id, flags));
            }
            Command::UnsetFlags { id, flags, reply } => {
                let _ = reply.send(self.session.unset_flags(id, flags));
            }
            Command::SetQueuePosition { id, position, reply } => {
                let _ = reply.send(self.session.set_queue_position(id, position));
            }
            Command::GetStatus { id, reply } => {
                let _ = reply.send(self.session.get_status(id));
            }
            Command::SaveResumeData { id, reply } => {
                let result = self
                    .session
                    .save_resume_data(id)
                    .map(|params| write_resume_data_buf(&params));
                let _ = reply.send(result);
            }
            Command::PopAlerts { reply } => {
                let mut alerts = Vec::new();
                self.session.pop_alerts(&mut alerts);
                let _ = reply.send(alerts);
            }
            Command::ApplySettings(settings) => {
                self.session.apply_settings(*settings);
                self.session.tick(self.start.elapsed());
            }
            Command::Shutdown => return false,
        }
        true
    }
}
