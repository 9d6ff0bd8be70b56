//! 命令发射器。统一管理运行时实例的 channel sender 端。

use std::sync::{Arc, OnceLock};

use anyhow::{Result, anyhow};
use dashmap::DashMap;
use tokio::sync::mpsc::Sender;

use crate::core::command::Command;

/// 会话运行时的发送器前缀
pub static SESSION_PREFIX: &str = "session_";

#[derive(Clone, Default)]
pub struct Emitter {
    senders: Arc<DashMap<String, Sender<Command>>>,
}

impl Emitter {
    pub fn global() -> &'static Self {
        static EMITTER: OnceLock<Emitter> = OnceLock::new();
        EMITTER.get_or_init(|| Self {
            senders: Arc::new(DashMap::default()),
        })
    }

    pub async fn send(&self, transfer_id: &str, command: Command) -> Result<()> {
        let Some(sender) = self.get(transfer_id) else {
            return Err(anyhow!("transfer id 未注册: {transfer_id}"));
        };
        sender
            .send(command)
            .await
            .map_err(|e| anyhow!("发送命令失败: {e}"))
    }

    pub fn register<T: ToString>(&self, transfer_id: T, sender: Sender<Command>) {
        self.senders.insert(transfer_id.to_string(), sender);
    }

    pub fn get(&self, transfer_id: &str) -> Option<Sender<Command>> {
        self.senders.get(transfer_id).map(|sender| sender.clone())
    }

    pub fn remove(&self, transfer_id: &str) -> Option<Sender<Command>> {
        self.senders.remove(transfer_id).map(|(_, sender)| sender)
    }
}
