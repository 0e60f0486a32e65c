//! 解码后的音频帧 (AudioFrame).
//!
//! 播放器输出统一为交织的 16 位有符号 PCM.

use qin_core::ChannelLayout;

/// 音频帧
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// 交织 PCM 采样 (采样主序: L0 R0 L1 R1 ...)
    pub samples: Vec<i16>,
    /// 采样率 (Hz)
    pub sample_rate: u32,
    /// 声道数
    pub channels: u32,
    pub channel_layout: Option<ChannelLayout>,
    /// 本帧首个采样在整条流中的序号
    pub timestamp_samples: u64,
    /// 本帧起始时间 (毫秒)
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// 空帧, 表示本次调用没有可交付的音频
    pub fn empty() -> Self {
        Self {
            samples: Vec::new(),
            sample_rate: 0,
            channels: 0,
            channel_layout: None,
            timestamp_samples: 0,
            timestamp_ms: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// 每声道采样数
    pub fn sample_frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// 本帧时长 (毫秒)
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.sample_frame_count() as u64 * 1000 / u64::from(self.sample_rate)
    }
}
