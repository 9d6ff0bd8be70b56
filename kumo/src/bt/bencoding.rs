//! bencode 的值模型与规范化编解码。
//!
//! 与常见实现的差异：
//! - 字典用 `BTreeMap` 存放，序列化时键天然按字节序升序输出
//! - 提供 `Preformatted` 叶子，编码时原样透传内部字节，
//!   用于 info 段的直通写入（保证 info-hash 不变）
//! - 解码保留对原始 `Bytes` 的切片引用，不做字节拷贝


pub mod error;

use std::collections::BTreeMap;

use bytes::{BufMut, Bytes, BytesMut};

pub use error::ParseError;

/// 解码时允许的最大嵌套深度
const MAX_DEPTH: usize = 32;

/// 一个 bencode 值
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// 整数，`i<digits>e`
    Int(i64),
    /// 字节串，`<len>:<bytes>`
    Str(Bytes),
    /// 列表，`l<items>e`
    List(Vec<Value>),
    /// 字典，`d<key><value>…e`，键按字节序升序
    Dict(BTreeMap<Bytes, Value>),
    /// 预编码数据，序列化时原样输出。解码永远不会产生这个变体。
    Preformatted(Bytes),
}

impl Value {
    /// 序列化到给定缓冲区
    pub fn encode_into(&self, buf: &mut BytesMut) {
        match self {
            Value::Int(v) => {
                buf.put_u8(b'i');
                buf.put_slice(v.to_string().as_bytes());
                buf.put_u8(b'e');
            }
            Value::Str(s) => {
                buf.put_slice(s.len().to_string().as_bytes());
                buf.put_u8(b':');
                buf.put_slice(s);
            }
            Value::List(items) => {
                buf.put_u8(b'l');
                for item in items {
                    item.encode_into(buf);
                }
                buf.put_u8(b'e');
            }
            Value::Dict(dict) => {
                buf.put_u8(b'd');
                for (key, value) in dict {
                    buf.put_slice(key.len().to_string().as_bytes());
                    buf.put_u8(b':');
                    buf.put_slice(key);
                    value.encode_into(buf);
                }
                buf.put_u8(b'e');
            }
            Value::Preformatted(raw) => buf.put_slice(raw),
        }
    }

    /// 序列化为独立的字节块
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// 解析一个完整的 bencode 文档，文档之后不允许有多余字节
    pub fn decode(bytes: &Bytes) -> Result<Value, ParseError> {
        let mut decoder = Decoder { buf: bytes, pos: 0 };
        let value = decoder.parse_value(MAX_DEPTH)?;
        if decoder.pos != bytes.len() {
            return Err(ParseError::TrailingData(decoder.pos));
        }
        Ok(value)
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<Bytes, Value>> {
        match self {
            Value::Dict(dict) => Some(dict),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(Bytes::copy_from_slice(v.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(Bytes::from(v.into_bytes()))
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Str(Bytes::from(v))
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::List(v)
    }
}

impl From<BTreeMap<Bytes, Value>> for Value {
    fn from(v: BTreeMap<Bytes, Value>) -> Self {
        Value::Dict(v)
    }
}

struct Decoder<'a> {
    buf: &'a Bytes,
    pos: usize,
}

impl Decoder<'_> {
    fn parse_value(&mut self, depth: usize) -> Result<Value, ParseError> {
        if depth == 0 {
            return Err(ParseError::DepthExceeded);
        }
        match self.peek()? {
            b'i' => self.parse_int(),
            b'l' => self.parse_list(depth),
            b'd' => self.parse_dict(depth),
            b'0'..=b'9' => self.parse_str(),
            _ => Err(ParseError::InvalidByte(self.pos)),
        }
    }

    fn parse_int(&mut self) -> Result<Value, ParseError> {
        self.pos += 1; // 'i'
        let start = self.pos;
        let end = self.find(b'e')?;
        let digits =
            std::str::from_utf8(&self.buf[start..end]).map_err(|_| ParseError::InvalidByte(start))?;
        let value = digits
            .parse::<i64>()
            .map_err(|_| ParseError::InvalidByte(start))?;
        self.pos = end + 1;
        Ok(Value::Int(value))
    }

    fn parse_str(&mut self) -> Result<Value, ParseError> {
        if !self.peek()?.is_ascii_digit() {
            return Err(ParseError::InvalidByte(self.pos));
        }
        let start = self.pos;
        let sep = self.find(b':')?;
        let len_str =
            std::str::from_utf8(&self.buf[start..sep]).map_err(|_| ParseError::InvalidByte(start))?;
        let len = len_str
            .parse::<usize>()
            .map_err(|_| ParseError::InvalidByte(start))?;
        let data_start = sep + 1;
        let data_end = data_start
            .checked_add(len)
            .filter(|&end| end <= self.buf.len())
            .ok_or(ParseError::UnexpectedEndOfStream)?;
        self.pos = data_end;
        Ok(Value::Str(self.buf.slice(data_start..data_end)))
    }

    fn parse_list(&mut self, depth: usize) -> Result<Value, ParseError> {
        self.pos += 1; // 'l'
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.parse_value(depth - 1)?);
        }
        self.pos += 1; // 'e'
        Ok(Value::List(items))
    }

    fn parse_dict(&mut self, depth: usize) -> Result<Value, ParseError> {
        self.pos += 1; // 'd'
        let mut dict = BTreeMap::new();
        while self.peek()? != b'e' {
            let key = match self.parse_str()? {
                Value::Str(key) => key,
                _ => unreachable!(),
            };
            let value = self.parse_value(depth - 1)?;
            // 重复的键，后者覆盖前者
            dict.insert(key, value);
        }
        self.pos += 1; // 'e'
        Ok(Value::Dict(dict))
    }

    fn peek(&self) -> Result<u8, ParseError> {
        self.buf
            .get(self.pos)
            .copied()
            .ok_or(ParseError::UnexpectedEndOfStream)
    }

    fn find(&self, byte: u8) -> Result<usize, ParseError> {
        self.buf[self.pos..]
            .iter()
            .position(|&b| b == byte)
            .map(|offset| self.pos + offset)
            .ok_or(ParseError::UnexpectedEndOfStream)
    }
}
