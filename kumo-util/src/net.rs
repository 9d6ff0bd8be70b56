//! 紧凑格式的 peer 地址编解码。
//!
//! v4 为 4 字节地址 + 2 字节大端端口，v6 为 16 字节地址 + 2 字节大端端口。

use std::net::{IpAddr, SocketAddr};

use anyhow::Result;
use bytes::{BufMut, BytesMut};

use crate::anyhow_eq;
use crate::bytes_util::Bytes2Int;

/// 将地址写入紧凑字节流。调用方负责把 v4/v6 分开写入不同的流。
pub fn write_endpoint(addr: &SocketAddr, buf: &mut BytesMut) {
    match addr.ip() {
        IpAddr::V4(ip) => buf.put_slice(&ip.octets()),
        IpAddr::V6(ip) => buf.put_slice(&ip.octets()),
    }
    buf.put_u16(addr.port());
}

/// 解析 peer 列表 - IpV4
pub fn parse_peers_v4(peers: &[u8]) -> Result<Vec<SocketAddr>> {
    anyhow_eq!(peers.len() % 6, 0, "peers length should be a multiple of 6");
    Ok(peers
        .chunks_exact(6)
        .map(|chunk| {
            let ip_bytes: [u8; 4] = chunk[..4].try_into().unwrap();
            SocketAddr::from((ip_bytes, u16::from_be_slice(&chunk[4..])))
        })
        .collect())
}

/// 解析 peer 列表 - IpV6
pub fn parse_peers_v6(peers: &[u8]) -> Result<Vec<SocketAddr>> {
    anyhow_eq!(peers.len() % 18, 0, "peers length should be a multiple of 18");
    Ok(peers
        .chunks_exact(18)
        .map(|chunk| {
            let ip_bytes: [u8; 16] = chunk[..16].try_into().unwrap();
            SocketAddr::from((ip_bytes, u16::from_be_slice(&chunk[16..])))
        })
        .collect())
}
