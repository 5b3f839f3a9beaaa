//! Compression level for retired log files

use serde::Deserialize;

/// gzip level applied to rotated-out files when compression is enabled
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CompressionLevel {
    /// Store only, no deflate
    NoCompression,
    /// Fastest deflate setting
    BestSpeed,
    /// Smallest output, slowest
    BestCompression,
    /// Library default trade-off
    #[default]
    Default,
    /// Huffman coding without string matching
    HuffmanOnly,
}

impl CompressionLevel {
    /// Numeric gzip level.
    ///
    /// `HuffmanOnly` has no direct deflate-level equivalent here and maps to
    /// the fastest setting.
    pub fn gzip_level(self) -> u32 {
        match self {
            CompressionLevel::NoCompression => 0,
            CompressionLevel::BestSpeed | CompressionLevel::HuffmanOnly => 1,
            CompressionLevel::BestCompression => 9,
            CompressionLevel::Default => 6,
        }
    }
}
