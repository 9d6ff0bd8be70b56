use core::fmt::Display;

/// bencode 解析过程中可能出现的错误
#[derive(PartialEq, Eq, Debug)]
pub enum ParseError {
    /// 指定位置出现非法字节
    InvalidByte(usize),
    /// 字节流意外结束
    UnexpectedEndOfStream,
    /// 嵌套层数超出上限
    DepthExceeded,
    /// 文档结束后还有多余数据
    TrailingData(usize),
}

impl Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidByte(pos) => write!(f, "invalid byte at position {pos}"),
            ParseError::UnexpectedEndOfStream => write!(f, "unexpected end of stream"),
            ParseError::DepthExceeded => write!(f, "max recursion depth exceeded"),
            ParseError::TrailingData(pos) => write!(f, "trailing data at position {pos}"),
        }
    }
}

impl std::error::Error for ParseError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        None
    }
}
