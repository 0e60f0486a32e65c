//! 解码统计.

use std::time::Duration;

use super::error::FlacErrorKind;

/// FLAC 解码器运行统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlacCodecStats {
    pub frames_decoded: u64,
    /// 每声道采样数之和
    pub samples_decoded: u64,
    pub total_bytes_processed: u64,
    /// 位深转换次数 (非 16 位流每帧一次)
    pub conversion_operations: u64,
    pub error_count: u64,
    pub crc_errors: u64,
    pub sync_errors: u64,
    pub header_errors: u64,
    pub subframe_errors: u64,
    pub memory_errors: u64,
    pub metadata_errors: u64,
    pub non_subset_frames: u64,
    pub total_decode_time_us: u64,
    pub min_decode_time_us: u64,
    pub max_decode_time_us: u64,
}

impl FlacCodecStats {
    /// 记录一个成功解码的帧
    pub fn record_frame(&mut self, block_size: u32, bytes: usize, converted: bool, elapsed: Duration) {
        let us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.min_decode_time_us = if self.frames_decoded == 0 {
            us
        } else {
            self.min_decode_time_us.min(us)
        };
        self.max_decode_time_us = self.max_decode_time_us.max(us);
        self.total_decode_time_us = self.total_decode_time_us.saturating_add(us);
        self.frames_decoded += 1;
        self.samples_decoded += u64::from(block_size);
        self.total_bytes_processed += bytes as u64;
        if converted {
            self.conversion_operations += 1;
        }
    }

    /// 按错误大类计数
    pub fn record_error(&mut self, kind: FlacErrorKind) {
        self.error_count += 1;
        match kind {
            FlacErrorKind::Sync => self.sync_errors += 1,
            FlacErrorKind::Header => self.header_errors += 1,
            FlacErrorKind::Crc => self.crc_errors += 1,
            FlacErrorKind::Subframe => self.subframe_errors += 1,
            FlacErrorKind::Memory => self.memory_errors += 1,
            FlacErrorKind::Metadata => self.metadata_errors += 1,
            FlacErrorKind::State => {}
        }
    }

    pub fn average_decode_time_us(&self) -> f64 {
        if self.frames_decoded == 0 {
            0.0
        } else {
            self.total_decode_time_us as f64 / self.frames_decoded as f64
        }
    }

    /// 错误次数占解码尝试次数的比例
    pub fn error_rate(&self) -> f64 {
        let attempts = self.frames_decoded + self.error_count;
        if attempts == 0 {
            0.0
        } else {
            self.error_count as f64 / attempts as f64
        }
    }
}
