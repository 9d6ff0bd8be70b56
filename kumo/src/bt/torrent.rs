//! 种子元数据。解析 `.torrent` 字节流，保留原始 info 段，
//! 供续传快照原样透传（保证 info-hash 位级一致）。


use std::ops::Deref;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use bendy::decoding::{Error, FromBencode, Object, ResultExt};
use bytes::Bytes;
use sha1::{Digest, Sha1};
use tracing::warn;

/// 传输块大小，16 KiB
pub const BLOCK_SIZE: u64 = 0x4000;

/// 种子元数据，多处共享
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct TorrentArc {
    inner: Arc<Torrent>,
}

impl TorrentArc {
    pub fn new(torrent: Torrent) -> Self {
        Self {
            inner: Arc::new(torrent),
        }
    }
}

impl Deref for TorrentArc {
    type Target = Torrent;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

/// 种子结构体
#[derive(Debug, Eq, PartialEq, Default)]
pub struct Torrent {
    pub announce: Option<String>,        // Tracker 地址
    pub announce_list: Vec<Vec<String>>, // 分层的 Tracker 列表
    pub created_by: Option<String>,      // 制作程序
    pub creation_date: i64,              // 创建时间
    pub comment: Option<String>,         // 种子描述
    pub encoding: Option<String>,        // 编码方式
    pub info: Info,                      // 种子信息
    pub info_hash: [u8; 20],             // info 段的 sha1
    pub info_bytes: Bytes,               // info 段原始字节
}

impl Torrent {
    /// 从 `.torrent` 字节流解析
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_bencode(bytes).map_err(|e| anyhow!("种子解析失败: {e}"))
    }

    /// 合并 announce 与 announce-list，得到按层级划分的 tracker 列表
    pub fn trackers(&self) -> Vec<Vec<String>> {
        let mut trackers = Vec::new();
        if let Some(announce) = &self.announce {
            if !announce.is_empty() {
                trackers.push(vec![announce.clone()]);
            }
        }
        trackers.extend_from_slice(&self.announce_list);
        trackers
    }

    /// 分片数量
    pub fn piece_num(&self) -> usize {
        self.info.pieces.len() / 20
    }
}

impl FromBencode for Torrent {
    fn decode_bencode_object(object: Object) -> Result<Self, Error>
    where
        Self: Sized,
    {
        let mut announce = None;
        let mut announce_list = None;
        let mut created_by = None;
        let mut creation_date = None;
        let mut comment = None;
        let mut encoding = None;
        let mut info = None;
        let mut info_hash = None;
        let mut info_bytes = None;

        let mut dict = object.try_into_dictionary()?;
        while let Some(pair) = dict.next_pair()? {
            match pair {
                (b"announce", value) => {
                    announce = String::decode_bencode_object(value)
                        .context("announce")
                        .map(Some)?;
                }
                (b"announce-list", value) => {
                    announce_list = Vec::<Vec<String>>::decode_bencode_object(value)
                        .context("announce-list")
                        .map(Some)?;
                }
                (b"created by", value) => {
                    created_by = String::decode_bencode_object(value)
                        .context("created by")
                        .map(Some)?;
                }
                (b"creation date", value) => {
                    creation_date = i64::decode_bencode_object(value)
                        .context("creation date")
                        .map(Some)?;
                }
                (b"comment", value) => {
                    comment = String::decode_bencode_object(value)
                        .context("comment")
                        .map(Some)?;
                }
                (b"encoding", value) => {
                    encoding = String::decode_bencode_object(value)
                        .context("encoding")
                        .map(Some)?;
                }
                (b"info", Object::Dict(dict)) => {
                    let raw = dict.into_raw()?;
                    info_hash = Some(calculate_info_hash(raw));
                    info_bytes = Some(Bytes::copy_from_slice(raw));
                    info = Info::from_bencode(raw).context("info").map(Some)?;
                }
                (unknown_field, _) => {
                    warn!("未知的字段: {:?}", String::from_utf8_lossy(unknown_field));
                }
            }
        }

        let info = info.ok_or_else(|| Error::missing_field("info"))?;
        let info_hash = info_hash.ok_or_else(|| Error::missing_field("info"))?;
        let info_bytes = info_bytes.ok_or_else(|| Error::missing_field("info"))?;

        Ok(Self {
            announce,
            announce_list: announce_list.unwrap_or_default(),
            created_by,
            creation_date: creation_date.unwrap_or(0),
            comment,
            encoding,
            info,
            info_hash,
            info_bytes,
        })
    }
}

/// 计算 info 段的 sha1
pub fn calculate_info_hash(info_bytes: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(info_bytes);
    hasher.finalize().into()
}

/// 统一视角下的文件条目（单文件种子视为只有一个条目）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileEntry {
    pub length: u64,
    /// BEP-47 填充文件
    pub pad: bool,
}

/// 种子信息结构体
#[derive(Debug, Eq, PartialEq, Default)]
pub struct Info {
    pub name: String,           // 文件名（多文件时为目录名）
    pub length: u64,            // 总大小
    pub piece_length: u64,      // 分片大小
    pub pieces: Vec<u8>,        // 每 20 字节一块的 v1 校验码
    pub files: Vec<File>,       // 多文件列表，单文件时为空
    pub private: Option<u8>,    // 是否私有
    pub meta_version: Option<i64>, // v2 元数据版本
}

impl Info {
    /// 文件的统一视角，下标即文件序号
    pub fn file_entries(&self) -> Vec<FileEntry> {
        if self.files.is_empty() {
            return vec![FileEntry {
                length: self.length,
                pad: false,
            }];
        }
        self.files
            .iter()
            .map(|f| FileEntry {
                length: f.length,
                pad: f.is_pad(),
            })
            .collect()
    }

    /// 文件按 16 KiB 块划分后的块数
    pub fn num_blocks(length: u64) -> u64 {
        length.div_ceil(BLOCK_SIZE)
    }

    /// 每个分片覆盖的块数
    pub fn blocks_per_piece(&self) -> u64 {
        (self.piece_length / BLOCK_SIZE).max(1)
    }
}

impl FromBencode for Info {
    fn decode_bencode_object(object: Object) -> Result<Self, Error>
    where
        Self: Sized,
    {
        let mut name = None;
        let mut length = None;
        let mut piece_length = None;
        let mut pieces = None;
        let mut files = None;
        let mut private = None;
        let mut meta_version = None;

        let mut dict = object.try_into_dictionary()?;
        while let Some(pair) = dict.next_pair()? {
            match pair {
                (b"name", value) => {
                    name = String::decode_bencode_object(value).context("name").map(Some)?;
                }
                (b"length", value) => {
                    length = u64::decode_bencode_object(value)
                        .context("length")
                        .map(Some)?;
                }
                (b"piece length", value) => {
                    piece_length = u64::decode_bencode_object(value)
                        .context("piece length")
                        .map(Some)?;
                }
                (b"pieces", value) => {
                    pieces = value.try_into_bytes().context("pieces").map(|v| Some(v.to_vec()))?;
                }
                (b"files", value) => {
                    files = Vec::<File>::decode_bencode_object(value)
                        .context("files")
                        .map(Some)?;
                }
                (b"private", value) => {
                    private = u8::decode_bencode_object(value)
                        .context("private")
                        .map(Some)?;
                }
                (b"meta version", value) => {
                    meta_version = i64::decode_bencode_object(value)
                        .context("meta version")
                        .map(Some)?;
                }
                // TODO: 解析 v2 的 file tree，目前仅依赖外部传入的哈希树
                (unknown_field, _) => {
                    warn!("未知的字段: {:?}", String::from_utf8_lossy(unknown_field));
                }
            }
        }

        let name = name.ok_or_else(|| Error::missing_field("name"))?;
        let piece_length = piece_length.ok_or_else(|| Error::missing_field("piece length"))?;
        let files = files.unwrap_or_default();
        let length = match length {
            Some(length) => length,
            None => files.iter().map(|f| f.length).sum(),
        };

        Ok(Self {
            name,
            length,
            piece_length,
            pieces: pieces.unwrap_or_default(),
            files,
            private,
            meta_version,
        })
    }
}

/// 多文件种子中的单个文件
#[derive(Debug, Eq, PartialEq, Default)]
pub struct File {
    pub length: u64,          // 文件大小
    pub path: Vec<String>,    // 相对路径分段
    pub attr: Option<String>, // BEP-47 属性串
}

impl File {
    pub fn is_pad(&self) -> bool {
        self.attr.as_deref().is_some_and(|attr| attr.contains('p'))
    }
}

impl FromBencode for File {
    fn decode_bencode_object(object: Object) -> Result<Self, Error>
    where
        Self: Sized,
    {
        let mut length = None;
        let mut path = None;
        let mut attr = None;

        let mut dict = object.try_into_dictionary()?;
        while let Some(pair) = dict.next_pair()? {
            match pair {
                (b"length", value) => {
                    length = u64::decode_bencode_object(value)
                        .context("length")
                        .map(Some)?;
                }
                (b"path", value) => {
                    path = Vec::<String>::decode_bencode_object(value)
                        .context("path")
                        .map(Some)?;
                }
                (b"attr", value) => {
                    attr = String::decode_bencode_object(value).context("attr").map(Some)?;
                }
                _ => {}
            }
        }

        let length = length.ok_or_else(|| Error::missing_field("length"))?;
        let path = path.ok_or_else(|| Error::missing_field("path"))?;

        Ok(Self { length, path, attr })
    }
}
