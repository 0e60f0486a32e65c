//! 编解码器标识符.

use std::fmt;

/// 编解码器标识符
///
/// 除 FLAC 外的音频格式由外部解码器处理, 这里只用于路由与 `can_decode` 判定.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    None,
    /// FLAC (RFC 9639)
    Flac,
    Vorbis,
    Opus,
    /// MP3 (MPEG Audio Layer III)
    Mp3,
    /// G.711 A-law
    PcmALaw,
    /// G.711 μ-law
    PcmMuLaw,
    /// PCM 有符号 16 位小端
    PcmS16le,
}

impl CodecId {
    /// 是否为无损编码
    pub fn is_lossless(&self) -> bool {
        matches!(self, Self::Flac | Self::PcmS16le)
    }

    /// 编解码器短名称
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Flac => "flac",
            Self::Vorbis => "vorbis",
            Self::Opus => "opus",
            Self::Mp3 => "mp3",
            Self::PcmALaw => "pcm_alaw",
            Self::PcmMuLaw => "pcm_mulaw",
            Self::PcmS16le => "pcm_s16le",
        }
    }
}

impl fmt::Display for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
