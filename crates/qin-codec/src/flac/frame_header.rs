//! FLAC 帧头与帧尾解析.
//!
//! # 帧结构
//! ```text
//! Sync code:     14 bits (0b11111111111110)
//! Reserved:      1 bit (必须为 0)
//! Blocking:      1 bit (0=固定块大小, 1=可变块大小)
//! Block size:    4 bits
//! Sample rate:   4 bits
//! Channel:       4 bits
//! Sample size:   3 bits
//! Reserved:      1 bit (必须为 0)
//! Frame/Sample#: UTF-8 变长编码
//! [Block size]:  8 或 16 bits
//! [Sample rate]: 8 或 16 bits
//! CRC-8:         8 bits
//! Subframes...
//! Padding:       补齐到字节边界
//! CRC-16:        16 bits
//! ```

use log::debug;
use qin_core::BitReader;
use qin_core::crc;
use qin_core::validation::{
    check_forbidden_sample_rate_bits, check_multiply_overflow, check_shift_overflow,
    validate_block_size, validate_sample_rate,
};

use super::decorrelation::ChannelAssignment;
use super::error::FlacError;
use super::metadata::StreamInfo;

/// 帧同步码 (14 位)
pub const SYNC_CODE: u32 = 0x3FFE;

/// 固定块大小流中帧号的上限 (31 位)
const MAX_FRAME_NUMBER: u64 = (1 << 31) - 1;

/// 采样率编码 1-11 对应的采样率
const SAMPLE_RATE_TABLE: [u32; 12] = [
    0, 88200, 176400, 192000, 8000, 16000, 22050, 24000, 32000, 44100, 48000, 96000,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingStrategy {
    /// 帧头携带帧号
    Fixed,
    /// 帧头携带首采样号
    Variable,
}

/// 解析后的帧头
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub blocking_strategy: BlockingStrategy,
    /// 每声道采样数
    pub block_size: u32,
    pub sample_rate: u32,
    pub channel_assignment: ChannelAssignment,
    pub channels: u32,
    pub bits_per_sample: u32,
    /// 帧号 (固定块) 或首采样号 (可变块)
    pub coded_number: u64,
    pub crc8: u8,
    /// 帧头字节数 (含 CRC-8)
    pub header_len: usize,
    sample_rate_code: u32,
    sample_size_code: u32,
}

impl FrameHeader {
    /// 本帧首个采样在流中的序号
    ///
    /// 固定块大小流用帧号乘以名义块大小 (STREAMINFO 中的最大块大小; 未知时用本帧块大小).
    /// 乘积溢出时返回 `None`.
    pub fn first_sample(&self, nominal_block_size: Option<u32>) -> Option<u64> {
        match self.blocking_strategy {
            BlockingStrategy::Variable => Some(self.coded_number),
            BlockingStrategy::Fixed => check_multiply_overflow(
                self.coded_number,
                u64::from(nominal_block_size.unwrap_or(self.block_size)),
            ),
        }
    }

    /// 是否属于 streamable subset (RFC 9639 §7)
    ///
    /// 帧头层面的约束: 块大小不超过 16384, 采样率不超过 48kHz 时不超过 4608;
    /// 采样率与位深必须在帧头中给出, 不能引用 STREAMINFO.
    pub fn is_streamable_subset(&self) -> bool {
        if self.sample_rate_code == 0 || self.sample_size_code == 0 {
            return false;
        }
        if self.block_size > 16384 {
            return false;
        }
        !(self.sample_rate <= 48000 && self.block_size > 4608)
    }
}

fn block_size_overflow(code: u32) -> FlacError {
    FlacError::InvalidFrameHeader(format!("块大小编码 {code} 溢出"))
}

/// 帧尾
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameFooter {
    /// 码流中存储的 CRC-16
    pub crc16: u16,
    /// 按帧内容计算出的 CRC-16
    pub computed_crc16: u16,
    /// 整帧字节数 (含 CRC-16)
    pub frame_len: usize,
}

impl FrameFooter {
    pub fn crc_matches(&self) -> bool {
        self.crc16 == self.computed_crc16
    }
}

/// 帧头解析器
///
/// 持有 STREAMINFO 中的流级默认值, 供帧头中 "引用 STREAMINFO" 的字段回退使用,
/// 并对帧头与流参数的一致性做校验.
#[derive(Debug, Clone, Default)]
pub struct FrameParser {
    stream_info: Option<StreamInfo>,
}

impl FrameParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stream_info(stream_info: Option<StreamInfo>) -> Self {
        Self { stream_info }
    }

    pub fn stream_info(&self) -> Option<&StreamInfo> {
        self.stream_info.as_ref()
    }

    /// 从 `data` 起始位置解析帧头, 包括 CRC-8 校验
    pub fn parse_frame_header(&self, data: &[u8]) -> Result<FrameHeader, FlacError> {
        let mut br = BitReader::new(data);
        let header = self.parse_fields(&mut br).map_err(|e| match e {
            FlacError::UnexpectedEof | FlacError::Bitstream(_) => {
                FlacError::InvalidFrameHeader(format!("帧头读取失败: {e}"))
            }
            other => other,
        })?;

        let crc_pos = br.byte_position();
        let stored = br
            .read_bits(8)
            .map_err(|_| FlacError::InvalidFrameHeader("帧头缺少 CRC-8".into()))? as u8;
        let computed = crc::crc8(&data[..crc_pos]);
        if stored != computed {
            return Err(FlacError::HeaderCrcMismatch { stored, computed });
        }

        Ok(FrameHeader {
            crc8: stored,
            header_len: crc_pos + 1,
            ..header
        })
    }

    fn parse_fields(&self, br: &mut BitReader<'_>) -> Result<FrameHeader, FlacError> {
        let sync = br.read_bits(14)?;
        if sync != SYNC_CODE {
            return Err(FlacError::SyncNotFound);
        }
        if br.read_bit()? {
            return Err(FlacError::InvalidFrameHeader("同步码后的保留位不为 0".into()));
        }
        let blocking_strategy = if br.read_bit()? {
            BlockingStrategy::Variable
        } else {
            BlockingStrategy::Fixed
        };

        let bs_code = br.read_bits(4)?;
        let sr_code = br.read_bits(4)?;
        let ch_code = br.read_bits(4)?;
        let ss_code = br.read_bits(3)?;
        if br.read_bit()? {
            return Err(FlacError::InvalidFrameHeader("位深字段后的保留位不为 0".into()));
        }

        let coded_number = br.read_utf8_u64()?;
        if blocking_strategy == BlockingStrategy::Fixed && coded_number > MAX_FRAME_NUMBER {
            return Err(FlacError::InvalidFrameHeader(format!(
                "帧号超过 31 位: {coded_number}"
            )));
        }

        let block_size = match bs_code {
            0 => return Err(FlacError::InvalidFrameHeader("块大小编码 0 为保留值".into())),
            1 => 192,
            2..=5 => {
                check_shift_overflow(576, bs_code - 2).ok_or_else(|| block_size_overflow(bs_code))?
            }
            6 => br.read_bits(8)? + 1,
            7 => br.read_bits(16)? + 1,
            _ => {
                check_shift_overflow(256, bs_code - 8).ok_or_else(|| block_size_overflow(bs_code))?
            }
        };
        if !validate_block_size(block_size, true) {
            return Err(FlacError::InvalidFrameHeader(format!("块大小越界: {block_size}")));
        }

        if !check_forbidden_sample_rate_bits(sr_code) {
            return Err(FlacError::InvalidFrameHeader("采样率编码 0b1111 为禁用值".into()));
        }
        let sample_rate = match sr_code {
            0 => self
                .stream_info
                .as_ref()
                .map(|si| si.sample_rate)
                .ok_or_else(|| {
                    FlacError::InvalidFrameHeader("帧头引用 STREAMINFO 采样率, 但流信息未知".into())
                })?,
            1..=11 => SAMPLE_RATE_TABLE[sr_code as usize],
            12 => br.read_bits(8)? * 1000,
            13 => br.read_bits(16)?,
            _ => br.read_bits(16)? * 10,
        };
        if sample_rate == 0 || !validate_sample_rate(sample_rate) {
            return Err(FlacError::InvalidFrameHeader(format!("采样率无效: {sample_rate}")));
        }

        let channel_assignment = ChannelAssignment::from_code(ch_code).ok_or_else(|| {
            FlacError::InvalidFrameHeader(format!("保留的声道分配编码: {ch_code}"))
        })?;
        let channels = channel_assignment.channels();

        let bits_per_sample = match ss_code {
            0 => self
                .stream_info
                .as_ref()
                .map(|si| si.bits_per_sample)
                .ok_or_else(|| {
                    FlacError::InvalidFrameHeader("帧头引用 STREAMINFO 位深, 但流信息未知".into())
                })?,
            1 => 8,
            2 => 12,
            3 => return Err(FlacError::InvalidFrameHeader("位深编码 3 为保留值".into())),
            4 => 16,
            5 => 20,
            6 => 24,
            _ => 32,
        };

        if let Some(si) = &self.stream_info {
            if si.channels != channels {
                return Err(FlacError::InvalidFrameHeader(format!(
                    "帧声道数 {channels} 与 STREAMINFO ({}) 不一致",
                    si.channels
                )));
            }
            if si.bits_per_sample != bits_per_sample {
                return Err(FlacError::InvalidFrameHeader(format!(
                    "帧位深 {bits_per_sample} 与 STREAMINFO ({}) 不一致",
                    si.bits_per_sample
                )));
            }
        }

        Ok(FrameHeader {
            blocking_strategy,
            block_size,
            sample_rate,
            channel_assignment,
            channels,
            bits_per_sample,
            coded_number,
            crc8: 0,
            header_len: 0,
            sample_rate_code: sr_code,
            sample_size_code: ss_code,
        })
    }

    /// 解析帧尾: 对齐到字节边界后读取 CRC-16, 并按 `frame[..crc 位置]` 计算校验值
    pub fn parse_frame_footer(
        &self,
        br: &mut BitReader<'_>,
        frame: &[u8],
    ) -> Result<FrameFooter, FlacError> {
        br.align_to_byte();
        let crc_pos = br.byte_position();
        let stored = br.read_bits(16)? as u16;
        let computed = crc::crc16(frame.get(..crc_pos).ok_or(FlacError::UnexpectedEof)?);
        Ok(FrameFooter {
            crc16: stored,
            computed_crc16: computed,
            frame_len: crc_pos + 2,
        })
    }

    /// 同步丢失后的恢复: 从 `start` 起逐字节搜索同步码,
    /// 且其后必须是 CRC-8 正确的完整帧头; 搜索范围不超过 `limit` 字节
    pub fn recover_from_sync_loss(
        &self,
        data: &[u8],
        start: usize,
        limit: usize,
    ) -> Option<(usize, FrameHeader)> {
        let end = data.len().min(start.saturating_add(limit));
        let mut pos = start;
        while pos + 1 < end {
            if data[pos] == 0xFF && data[pos + 1] & 0xFE == 0xF8 {
                if let Ok(header) = self.parse_frame_header(&data[pos..]) {
                    debug!("在偏移 {pos} 处重新找到帧同步 (起点 {start})");
                    return Some((pos, header));
                }
            }
            pos += 1;
        }
        None
    }
}
