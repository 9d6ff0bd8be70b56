//! 续传快照编解码。
//!
//! 把一个种子的完整添加参数（元数据、哈希树、peer 列表、优先级、
//! 会话计数器）编码为自描述的 bencode 字典，兼容通行的
//! `.torrent` / 续传文件格式。编码永不失败，畸形输入产出
//! 尽力而为的快照；只有解码会报错。


use std::collections::BTreeMap;
use std::net::SocketAddr;

use anyhow::{Result, anyhow, bail};
use bendy::decoding::{Decoder, FromBencode, Object};
use bytes::{BufMut, Bytes, BytesMut};
use kumo_util::if_else;
use kumo_util::net;

use crate::bencoding::Value;
use crate::core::status::TorrentFlags;
use crate::merkle::{MerkleTree, TreeHash};
use crate::torrent::{Info, Torrent, TorrentArc, calculate_info_hash};

/// 续传文件的格式标识，读取方必须拒绝其它取值
pub const FILE_FORMAT: &str = "libtorrent resume file";

/// 续传文件的格式版本
pub const FILE_VERSION: i64 = 1;

/// tracker 层级的上限
const MAX_TRACKER_TIER: i32 = 1024;

/// 磁盘分配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// 稀疏文件
    #[default]
    Sparse,
    /// 预分配
    Allocate,
}

/// 添加（或恢复）一个种子所需的全部参数。
///
/// 调度器维护其中的 `flags`、时间与计数器字段，
/// 编解码器负责把整个结构落成字节。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AddTorrentParams {
    /// 种子元数据，info 段原始字节随之保留
    pub ti: Option<TorrentArc>,
    pub name: String,
    pub save_path: String,
    /// 平铺的 tracker 列表，层级在 `tracker_tiers` 里按下标对应
    pub trackers: Vec<String>,
    pub tracker_tiers: Vec<i32>,
    pub url_seeds: Vec<String>,
    pub http_seeds: Vec<String>,
    pub flags: TorrentFlags,
    pub info_hash: Option<[u8; 20]>,
    pub info_hash_v2: Option<[u8; 32]>,
    pub peers: Vec<SocketAddr>,
    pub banned_peers: Vec<SocketAddr>,
    /// 未完成分片：分片下标 -> 块位图
    pub unfinished_pieces: BTreeMap<i32, Vec<bool>>,
    pub have_pieces: Vec<bool>,
    pub verified_pieces: Vec<bool>,
    pub file_priorities: Vec<u8>,
    pub piece_priorities: Vec<u8>,
    /// 重命名过的文件：文件下标 -> 新相对路径
    pub renamed_files: BTreeMap<i32, String>,
    /// 每个文件的哈希树节点（稠密或稀疏）
    pub merkle_trees: Vec<Vec<TreeHash>>,
    /// 稀疏树的节点掩码，与 `merkle_trees` 按文件对齐
    pub merkle_tree_mask: Vec<Vec<bool>>,
    /// 已验证的叶子位图，与 `merkle_trees` 按文件对齐
    pub verified_leaf_hashes: Vec<Vec<bool>>,
    pub total_uploaded: i64,
    pub total_downloaded: i64,
    pub active_time: i64,
    pub finished_time: i64,
    pub seeding_time: i64,
    pub added_time: i64,
    pub completed_time: i64,
    pub last_seen_complete: i64,
    pub last_download: i64,
    pub last_upload: i64,
    pub num_complete: i32,
    pub num_incomplete: i32,
    pub num_downloaded: i32,
    pub upload_limit: i32,
    pub download_limit: i32,
    pub max_connections: i32,
    pub max_uploads: i32,
    pub storage_mode: StorageMode,
}

fn key(k: &'static str) -> Bytes {
    Bytes::from_static(k.as_bytes())
}

fn bits_to_ascii(bits: &[bool]) -> Vec<u8> {
    bits.iter().map(|&b| if_else!(b, b'1', b'0')).collect()
}

fn ascii_to_bits(ascii: &[u8]) -> Vec<bool> {
    ascii.iter().map(|&b| b == b'1').collect()
}

/// 只输出 `.torrent` 文件应有的字段
pub fn write_torrent_file(atp: &AddTorrentParams) -> Value {
    write_impl(atp, true)
}

/// 输出完整的续传快照
pub fn write_resume_data(atp: &AddTorrentParams) -> Value {
    write_impl(atp, false)
}

/// 输出完整续传快照的 bencode 字节
pub fn write_resume_data_buf(atp: &AddTorrentParams) -> Bytes {
    write_resume_data(atp).to_bytes()
}

fn write_impl(atp: &AddTorrentParams, torrent_only: bool) -> Value {
    let mut ret: BTreeMap<Bytes, Value> = BTreeMap::new();

    if let Some(ti) = &atp.ti {
        // info 段原样透传，保证 info-hash 不变
        ret.insert(key("info"), Value::Preformatted(ti.info_bytes.clone()));
        if let Some(comment) = &ti.comment {
            if !comment.is_empty() {
                ret.insert(key("comment"), Value::from(comment.as_str()));
            }
        }
        if ti.creation_date != 0 {
            ret.insert(key("creation date"), Value::from(ti.creation_date));
        }
        if let Some(created_by) = &ti.created_by {
            if !created_by.is_empty() {
                ret.insert(key("created by"), Value::from(created_by.as_str()));
            }
        }
    }

    // 哈希树与分片层
    let mut ret_trees = Vec::with_capacity(atp.merkle_trees.len());
    if !atp.merkle_trees.is_empty() {
        let mut piece_layers: BTreeMap<Bytes, Value> = BTreeMap::new();
        for (f, tree) in atp.merkle_trees.iter().enumerate() {
            let mut tree_dict: BTreeMap<Bytes, Value> = BTreeMap::new();

            let mut hashes = BytesMut::with_capacity(tree.len() * 32);
            for node in tree {
                hashes.put_slice(node);
            }
            tree_dict.insert(key("hashes"), Value::Str(hashes.freeze()));

            if let Some(verified) = atp.verified_leaf_hashes.get(f) {
                if !verified.is_empty() {
                    tree_dict.insert(key("verified"), Value::from(bits_to_ascii(verified)));
                }
            }
            if let Some(mask) = atp.merkle_tree_mask.get(f) {
                if !mask.is_empty() {
                    tree_dict.insert(key("mask"), Value::from(bits_to_ascii(mask)));
                }
            }
            ret_trees.push(Value::Dict(tree_dict));

            // 分片层从重建的树里取出。填充文件和不足一个分片的文件没有条目。
            if let Some(ti) = &atp.ti {
                let entries = ti.info.file_entries();
                let Some(entry) = entries.get(f) else { continue };
                if entry.pad || entry.length <= ti.info.piece_length {
                    continue;
                }
                let mut t =
                    MerkleTree::new(Info::num_blocks(entry.length), ti.info.blocks_per_piece());
                match atp.merkle_tree_mask.get(f) {
                    Some(mask) if !mask.is_empty() => t.load_sparse_tree(tree, mask),
                    _ => t.load_tree(tree),
                }
                let layer = t.piece_layer();
                let mut concat = BytesMut::with_capacity(layer.len() * 32);
                for hash in &layer {
                    concat.put_slice(hash);
                }
                piece_layers.insert(Bytes::copy_from_slice(&t.root()), Value::Str(concat.freeze()));
            }
        }
        if !piece_layers.is_empty() {
            ret.insert(key("piece layers"), Value::Dict(piece_layers));
        }
    }

    if !atp.url_seeds.is_empty() {
        let url_list = atp.url_seeds.iter().map(|u| Value::from(u.as_str())).collect();
        ret.insert(key("url-list"), Value::List(url_list));
    }
    if !atp.http_seeds.is_empty() {
        let seeds = atp.http_seeds.iter().map(|u| Value::from(u.as_str())).collect();
        ret.insert(key("httpseeds"), Value::List(seeds));
    }

    if !atp.name.is_empty() {
        ret.insert(key("name"), Value::from(atp.name.as_str()));
    }

    if !atp.trackers.is_empty() {
        if atp.trackers.len() == 1 {
            ret.insert(key("announce"), Value::from(atp.trackers[0].as_str()));
        } else {
            ret.insert(key("announce-list"), announce_list(atp));
        }
    }

    // 以上是 .torrent 文件字段

    if torrent_only {
        return Value::Dict(ret);
    }

    // 以下是续传专有字段

    if !atp.merkle_trees.is_empty() {
        ret.insert(key("trees"), Value::List(ret_trees));
    }

    // trackers 的冗余视图。空列表也要写，用来表达"用户清空了 tracker"。
    let trackers_value = if atp.trackers.is_empty() {
        Value::List(Vec::new())
    } else if atp.trackers.len() == 1 {
        Value::List(vec![Value::List(vec![Value::from(atp.trackers[0].as_str())])])
    } else {
        announce_list(atp)
    };
    ret.insert(key("trackers"), trackers_value);

    // 同理，web seed 被清空的信号也要保留
    if atp.url_seeds.is_empty() {
        ret.insert(key("url-list"), Value::List(Vec::new()));
    }
    if atp.http_seeds.is_empty() {
        ret.insert(key("httpseeds"), Value::List(Vec::new()));
    }

    ret.insert(key("file-format"), Value::from(FILE_FORMAT));
    ret.insert(key("file-version"), Value::from(FILE_VERSION));
    ret.insert(key("libtorrent-version"), Value::from(env!("CARGO_PKG_VERSION")));
    ret.insert(
        key("allocation"),
        Value::from(match atp.storage_mode {
            StorageMode::Allocate => "allocate",
            StorageMode::Sparse => "sparse",
        }),
    );

    ret.insert(key("total_uploaded"), Value::from(atp.total_uploaded));
    ret.insert(key("total_downloaded"), Value::from(atp.total_downloaded));

    ret.insert(key("active_time"), Value::from(atp.active_time));
    ret.insert(key("finished_time"), Value::from(atp.finished_time));
    ret.insert(key("seeding_time"), Value::from(atp.seeding_time));
    ret.insert(key("last_seen_complete"), Value::from(atp.last_seen_complete));
    ret.insert(key("last_download"), Value::from(atp.last_download));
    ret.insert(key("last_upload"), Value::from(atp.last_upload));

    ret.insert(key("num_complete"), Value::from(atp.num_complete));
    ret.insert(key("num_incomplete"), Value::from(atp.num_incomplete));
    ret.insert(key("num_downloaded"), Value::from(atp.num_downloaded));

    ret.insert(key("seed_mode"), flag_entry(atp.flags, TorrentFlags::SEED_MODE));
    ret.insert(key("upload_mode"), flag_entry(atp.flags, TorrentFlags::UPLOAD_MODE));
    ret.insert(key("share_mode"), flag_entry(atp.flags, TorrentFlags::SHARE_MODE));
    ret.insert(
        key("apply_ip_filter"),
        flag_entry(atp.flags, TorrentFlags::APPLY_IP_FILTER),
    );
    ret.insert(key("paused"), flag_entry(atp.flags, TorrentFlags::PAUSED));
    ret.insert(key("auto_managed"), flag_entry(atp.flags, TorrentFlags::AUTO_MANAGED));
    ret.insert(key("super_seeding"), flag_entry(atp.flags, TorrentFlags::SUPER_SEEDING));
    ret.insert(
        key("sequential_download"),
        flag_entry(atp.flags, TorrentFlags::SEQUENTIAL_DOWNLOAD),
    );
    ret.insert(
        key("stop_when_ready"),
        flag_entry(atp.flags, TorrentFlags::STOP_WHEN_READY),
    );
    ret.insert(key("disable_dht"), flag_entry(atp.flags, TorrentFlags::DISABLE_DHT));
    ret.insert(key("disable_lsd"), flag_entry(atp.flags, TorrentFlags::DISABLE_LSD));
    ret.insert(key("disable_pex"), flag_entry(atp.flags, TorrentFlags::DISABLE_PEX));

    ret.insert(key("added_time"), Value::from(atp.added_time));
    ret.insert(key("completed_time"), Value::from(atp.completed_time));

    ret.insert(key("save_path"), Value::from(atp.save_path.as_str()));

    if let Some(info_hash) = atp.info_hash.or_else(|| atp.ti.as_ref().map(|ti| ti.info_hash)) {
        ret.insert(key("info-hash"), Value::from(info_hash.to_vec()));
    }
    if let Some(info_hash2) = atp.info_hash_v2 {
        ret.insert(key("info-hash2"), Value::from(info_hash2.to_vec()));
    }

    if !atp.unfinished_pieces.is_empty() {
        let mut up = Vec::with_capacity(atp.unfinished_pieces.len());
        for (&piece, bitmask) in &atp.unfinished_pieces {
            let mut piece_dict: BTreeMap<Bytes, Value> = BTreeMap::new();
            piece_dict.insert(key("piece"), Value::from(piece));
            piece_dict.insert(key("bitmask"), Value::from(pack_bits(bitmask)));
            up.push(Value::Dict(piece_dict));
        }
        ret.insert(key("unfinished"), Value::List(up));
    }

    // 拥有/已验证位图：每个分片一个字节，bit 0 为拥有，bit 1 为已验证
    let pieces_len = atp.have_pieces.len().max(atp.verified_pieces.len());
    let mut pieces = vec![0u8; pieces_len];
    for (i, &have) in atp.have_pieces.iter().enumerate() {
        pieces[i] |= have as u8;
    }
    for (i, &verified) in atp.verified_pieces.iter().enumerate() {
        pieces[i] |= (verified as u8) << 1;
    }
    ret.insert(key("pieces"), Value::from(pieces));

    if !atp.renamed_files.is_empty() {
        let len = atp.renamed_files.keys().next_back().map_or(0, |&i| i as usize + 1);
        let mut fl = vec![Value::from(""); len];
        for (&index, path) in &atp.renamed_files {
            if index >= 0 {
                fl[index as usize] = Value::from(path.as_str());
            }
        }
        ret.insert(key("mapped_files"), Value::List(fl));
    }

    if !atp.peers.is_empty() {
        let (v4, v6) = pack_endpoints(&atp.peers);
        ret.insert(key("peers"), Value::Str(v4));
        ret.insert(key("peers6"), Value::Str(v6));
    }
    if !atp.banned_peers.is_empty() {
        let (v4, v6) = pack_endpoints(&atp.banned_peers);
        ret.insert(key("banned_peers"), Value::Str(v4));
        ret.insert(key("banned_peers6"), Value::Str(v6));
    }

    ret.insert(key("upload_rate_limit"), Value::from(atp.upload_limit));
    ret.insert(key("download_rate_limit"), Value::from(atp.download_limit));
    ret.insert(key("max_connections"), Value::from(atp.max_connections));
    ret.insert(key("max_uploads"), Value::from(atp.max_uploads));

    if !atp.file_priorities.is_empty() {
        let prio = atp.file_priorities.iter().map(|&p| Value::from(p as i64)).collect();
        ret.insert(key("file_priority"), Value::List(prio));
    }
    if !atp.piece_priorities.is_empty() {
        ret.insert(key("piece_priority"), Value::from(atp.piece_priorities.clone()));
    }

    Value::Dict(ret)
}

fn flag_entry(flags: TorrentFlags, flag: TorrentFlags) -> Value {
    Value::from(flags.contains(flag) as i64)
}

/// 按层级组织的 tracker 列表。层级越界时沿用上一个层级，并收敛到上限。
fn announce_list(atp: &AddTorrentParams) -> Value {
    let mut tier_lists: Vec<Vec<Value>> = vec![Vec::new()];
    let mut tier = 0usize;
    for (i, tracker) in atp.trackers.iter().enumerate() {
        if let Some(&t) = atp.tracker_tiers.get(i) {
            tier = t.clamp(0, MAX_TRACKER_TIER) as usize;
        }
        if tier_lists.len() <= tier {
            tier_lists.resize(tier + 1, Vec::new());
        }
        tier_lists[tier].push(Value::from(tracker.as_str()));
    }
    Value::List(tier_lists.into_iter().map(Value::List).collect())
}

/// 把块位图压成字节串，字节内低位在前
fn pack_bits(bits: &[bool]) -> Vec<u8> {
    let mut packed = vec![0u8; bits.len().div_ceil(8)];
    for (i, &bit) in bits.iter().enumerate() {
        packed[i / 8] |= (bit as u8) << (i % 8);
    }
    packed
}

fn unpack_bits(packed: &[u8]) -> Vec<bool> {
    let mut bits = Vec::with_capacity(packed.len() * 8);
    for &byte in packed {
        for j in 0..8 {
            bits.push(byte >> j & 1 == 1);
        }
    }
    bits
}

/// v4 与 v6 地址分别压成紧凑字节串
fn pack_endpoints(peers: &[SocketAddr]) -> (Bytes, Bytes) {
    let mut v4 = BytesMut::new();
    let mut v6 = BytesMut::new();
    for peer in peers {
        if peer.is_ipv6() {
            net::write_endpoint(peer, &mut v6);
        } else {
            net::write_endpoint(peer, &mut v4);
        }
    }
    (v4.freeze(), v6.freeze())
}

/// 从续传快照恢复添加参数。
///
/// `file-format` 不符或版本不为 1 的输入会被拒绝。
pub fn read_resume_data(buf: &[u8]) -> Result<AddTorrentParams> {
    let mut atp = AddTorrentParams::default();

    let mut file_format = None;
    let mut file_version = None;
    let mut announce = None;
    let mut announce_list: Option<Vec<Vec<String>>> = None;
    let mut trackers: Option<Vec<Vec<String>>> = None;
    let mut comment = None;
    let mut created_by = None;
    let mut creation_date = None;
    let mut info_raw: Option<Bytes> = None;

    let mut decoder = Decoder::new(buf);
    let object = decoder
        .next_object()?
        .ok_or_else(|| anyhow!("续传数据为空"))?;
    let mut dict = object.try_into_dictionary()?;
    while let Some(pair) = dict.next_pair()? {
        match pair {
            (b"file-format", value) => {
                file_format = Some(String::decode_bencode_object(value)?);
            }
            (b"file-version", value) => {
                file_version = Some(i64::decode_bencode_object(value)?);
            }
            (b"libtorrent-version", _) => {}
            (b"allocation", value) => {
                let mode = String::decode_bencode_object(value)?;
                atp.storage_mode =
                    if_else!(mode == "allocate", StorageMode::Allocate, StorageMode::Sparse);
            }
            (b"info", Object::Dict(info_dict)) => {
                info_raw = Some(Bytes::copy_from_slice(info_dict.into_raw()?));
            }
            (b"comment", value) => {
                comment = Some(String::decode_bencode_object(value)?);
            }
            (b"created by", value) => {
                created_by = Some(String::decode_bencode_object(value)?);
            }
            (b"creation date", value) => {
                creation_date = Some(i64::decode_bencode_object(value)?);
            }
            (b"announce", value) => {
                announce = Some(String::decode_bencode_object(value)?);
            }
            (b"announce-list", value) => {
                announce_list = Some(Vec::<Vec<String>>::decode_bencode_object(value)?);
            }
            (b"trackers", value) => {
                trackers = Some(Vec::<Vec<String>>::decode_bencode_object(value)?);
            }
            (b"name", value) => {
                atp.name = String::decode_bencode_object(value)?;
            }
            (b"save_path", value) => {
                atp.save_path = String::decode_bencode_object(value)?;
            }
            (b"url-list", value) => {
                atp.url_seeds = Vec::<String>::decode_bencode_object(value)?;
            }
            (b"httpseeds", value) => {
                atp.http_seeds = Vec::<String>::decode_bencode_object(value)?;
            }
            (b"info-hash", value) => {
                let bytes = value.try_into_bytes()?;
                if bytes.len() == 20 {
                    let mut hash = [0u8; 20];
                    hash.copy_from_slice(bytes);
                    atp.info_hash = Some(hash);
                }
            }
            (b"info-hash2", value) => {
                let bytes = value.try_into_bytes()?;
                if bytes.len() == 32 {
                    let mut hash = [0u8; 32];
                    hash.copy_from_slice(bytes);
                    atp.info_hash_v2 = Some(hash);
                }
            }
            (b"pieces", value) => {
                let bytes = value.try_into_bytes()?;
                atp.have_pieces = bytes.iter().map(|&b| b & 1 == 1).collect();
                atp.verified_pieces = bytes.iter().map(|&b| b & 2 == 2).collect();
            }
            (b"unfinished", value) => {
                read_unfinished(value, &mut atp.unfinished_pieces)?;
            }
            (b"mapped_files", value) => {
                let paths = Vec::<String>::decode_bencode_object(value)?;
                for (index, path) in paths.into_iter().enumerate() {
                    if !path.is_empty() {
                        atp.renamed_files.insert(index as i32, path);
                    }
                }
            }
            (b"peers", value) => {
                atp.peers.extend(net::parse_peers_v4(value.try_into_bytes()?)?);
            }
            (b"peers6", value) => {
                atp.peers.extend(net::parse_peers_v6(value.try_into_bytes()?)?);
            }
            (b"banned_peers", value) => {
                atp.banned_peers.extend(net::parse_peers_v4(value.try_into_bytes()?)?);
            }
            (b"banned_peers6", value) => {
                atp.banned_peers.extend(net::parse_peers_v6(value.try_into_bytes()?)?);
            }
            (b"trees", value) => {
                read_trees(value, &mut atp)?;
            }
            (b"piece layers", _) => {
                // 派生数据，重建时由哈希树重新算出
            }
            (b"file_priority", value) => {
                let prio = Vec::<i64>::decode_bencode_object(value)?;
                atp.file_priorities = prio.into_iter().map(|p| p.clamp(0, 7) as u8).collect();
            }
            (b"piece_priority", value) => {
                atp.piece_priorities = value.try_into_bytes()?.to_vec();
            }
            (b"total_uploaded", value) => {
                atp.total_uploaded = i64::decode_bencode_object(value)?;
            }
            (b"total_downloaded", value) => {
                atp.total_downloaded = i64::decode_bencode_object(value)?;
            }
            (b"active_time", value) => {
                atp.active_time = i64::decode_bencode_object(value)?;
            }
            (b"finished_time", value) => {
                atp.finished_time = i64::decode_bencode_object(value)?;
            }
            (b"seeding_time", value) => {
                atp.seeding_time = i64::decode_bencode_object(value)?;
            }
            (b"last_seen_complete", value) => {
                atp.last_seen_complete = i64::decode_bencode_object(value)?;
            }
            (b"last_download", value) => {
                atp.last_download = i64::decode_bencode_object(value)?;
            }
            (b"last_upload", value) => {
                atp.last_upload = i64::decode_bencode_object(value)?;
            }
            (b"num_complete", value) => {
                atp.num_complete = i64::decode_bencode_object(value)? as i32;
            }
            (b"num_incomplete", value) => {
                atp.num_incomplete = i64::decode_bencode_object(value)? as i32;
            }
            (b"num_downloaded", value) => {
                atp.num_downloaded = i64::decode_bencode_object(value)? as i32;
            }
            (b"added_time", value) => {
                atp.added_time = i64::decode_bencode_object(value)?;
            }
            (b"completed_time", value) => {
                atp.completed_time = i64::decode_bencode_object(value)?;
            }
            (b"upload_rate_limit", value) => {
                atp.upload_limit = i64::decode_bencode_object(value)? as i32;
            }
            (b"download_rate_limit", value) => {
                atp.download_limit = i64::decode_bencode_object(value)? as i32;
            }
            (b"max_connections", value) => {
                atp.max_connections = i64::decode_bencode_object(value)? as i32;
            }
            (b"max_uploads", value) => {
                atp.max_uploads = i64::decode_bencode_object(value)? as i32;
            }
            (b"seed_mode", value) => read_flag(value, &mut atp.flags, TorrentFlags::SEED_MODE)?,
            (b"upload_mode", value) => read_flag(value, &mut atp.flags, TorrentFlags::UPLOAD_MODE)?,
            (b"share_mode", value) => read_flag(value, &mut atp.flags, TorrentFlags::SHARE_MODE)?,
            (b"apply_ip_filter", value) => {
                read_flag(value, &mut atp.flags, TorrentFlags::APPLY_IP_FILTER)?
            }
            (b"paused", value) => read_flag(value, &mut atp.flags, TorrentFlags::PAUSED)?,
            (b"auto_managed", value) => read_flag(value, &mut atp.flags, TorrentFlags::AUTO_MANAGED)?,
            (b"super_seeding", value) => {
                read_flag(value, &mut atp.flags, TorrentFlags::SUPER_SEEDING)?
            }
            (b"sequential_download", value) => {
                read_flag(value, &mut atp.flags, TorrentFlags::SEQUENTIAL_DOWNLOAD)?
            }
            (b"stop_when_ready", value) => {
                read_flag(value, &mut atp.flags, TorrentFlags::STOP_WHEN_READY)?
            }
            (b"disable_dht", value) => read_flag(value, &mut atp.flags, TorrentFlags::DISABLE_DHT)?,
            (b"disable_lsd", value) => read_flag(value, &mut atp.flags, TorrentFlags::DISABLE_LSD)?,
            (b"disable_pex", value) => read_flag(value, &mut atp.flags, TorrentFlags::DISABLE_PEX)?,
            _ => {}
        }
    }

    match file_format.as_deref() {
        Some(FILE_FORMAT) => {}
        Some(other) => bail!("无法识别的续传文件格式: {other:?}"),
        None => bail!("缺少 file-format 字段"),
    }
    if file_version != Some(FILE_VERSION) {
        bail!("不支持的续传文件版本: {file_version:?}");
    }

    // tracker 以冗余视图为准，回退到 announce / announce-list
    let tier_lists = trackers
        .or(announce_list.clone())
        .or_else(|| announce.clone().map(|a| vec![vec![a]]));
    if let Some(tier_lists) = tier_lists {
        for (tier, list) in tier_lists.into_iter().enumerate() {
            for tracker in list {
                if tracker.is_empty() {
                    // 空的 tracker 地址直接跳过
                    continue;
                }
                atp.trackers.push(tracker);
                atp.tracker_tiers.push(tier as i32);
            }
        }
    }

    if let Some(info_raw) = info_raw {
        let info = Info::from_bencode(&info_raw)?;
        let torrent = Torrent {
            announce,
            announce_list: announce_list.unwrap_or_default(),
            created_by,
            creation_date: creation_date.unwrap_or(0),
            comment,
            encoding: None,
            info_hash: calculate_info_hash(&info_raw),
            info_bytes: info_raw,
            info,
        };
        atp.ti = Some(TorrentArc::new(torrent));
    }

    Ok(atp)
}

fn read_flag(value: Object, flags: &mut TorrentFlags, flag: TorrentFlags) -> Result<()> {
    let on = i64::decode_bencode_object(value)? != 0;
    flags.set(flag, on);
    Ok(())
}

fn read_unfinished(value: Object, out: &mut BTreeMap<i32, Vec<bool>>) -> Result<()> {
    let mut list = value.try_into_list()?;
    while let Some(item) = list.next_object()? {
        let mut dict = item.try_into_dictionary()?;
        let mut piece = None;
        let mut bitmask = None;
        while let Some(pair) = dict.next_pair()? {
            match pair {
                (b"piece", value) => piece = Some(i64::decode_bencode_object(value)? as i32),
                (b"bitmask", value) => bitmask = Some(unpack_bits(value.try_into_bytes()?)),
                _ => {}
            }
        }
        if let (Some(piece), Some(bitmask)) = (piece, bitmask) {
            out.insert(piece, bitmask);
        }
    }
    Ok(())
}

fn read_trees(value: Object, atp: &mut AddTorrentParams) -> Result<()> {
    let mut list = value.try_into_list()?;
    while let Some(item) = list.next_object()? {
        let mut dict = item.try_into_dictionary()?;
        let mut hashes: Vec<TreeHash> = Vec::new();
        let mut verified = Vec::new();
        let mut mask = Vec::new();
        while let Some(pair) = dict.next_pair()? {
            match pair {
                (b"hashes", value) => {
                    let bytes = value.try_into_bytes()?;
                    hashes = bytes
                        .chunks_exact(32)
                        .map(|chunk| {
                            let mut node = [0u8; 32];
                            node.copy_from_slice(chunk);
                            node
                        })
                        .collect();
                }
                (b"verified", value) => {
                    verified = ascii_to_bits(value.try_into_bytes()?);
                }
                (b"mask", value) => {
                    mask = ascii_to_bits(value.try_into_bytes()?);
                }
                _ => {}
            }
        }
        atp.merkle_trees.push(hashes);
        atp.verified_leaf_hashes.push(verified);
        atp.merkle_tree_mask.push(mask);
    }
    Ok(())
}
