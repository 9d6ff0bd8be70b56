pub mod bencoding;
pub mod merkle;
pub mod resume;
pub mod torrent;
