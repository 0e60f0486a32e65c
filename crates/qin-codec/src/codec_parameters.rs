//! 编解码器参数.
//!
//! 通常由解复用器从容器中提取, 用于判定某个解码器能否处理该流.

use crate::codec_id::CodecId;

/// 音频编解码器参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecParameters {
    pub codec_id: CodecId,
    /// 额外数据 (FLAC 为 STREAMINFO 块内容)
    pub extra_data: Vec<u8>,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    /// 位深 (0 表示未知)
    pub bits_per_sample: u32,
}

impl CodecParameters {
    pub fn audio(codec_id: CodecId, sample_rate: u32, channels: u32, bits_per_sample: u32) -> Self {
        Self {
            codec_id,
            extra_data: Vec::new(),
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    pub fn with_extra_data(mut self, extra_data: Vec<u8>) -> Self {
        self.extra_data = extra_data;
        self
    }
}
