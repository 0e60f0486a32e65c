//! 单帧解码流水线与固定容量声道缓冲区.
//!
//! 帧头 -> 各声道子帧 -> 立体声去相关 -> 帧尾 CRC-16. 采样写入预先分配的
//! `MAX_BLOCK_SIZE * MAX_CHANNELS` 缓冲区, 稳态解码不做堆分配.

use log::{trace, warn};
use qin_core::BitReader;
use qin_core::validation::{MAX_BLOCK_SIZE, MAX_CHANNELS};

use super::decorrelation::{ChannelAssignment, decorrelate};
use super::error::FlacError;
use super::frame_header::{FrameFooter, FrameHeader, FrameParser};
use super::subframe::decode_subframe;

const PLANE_LEN: usize = MAX_BLOCK_SIZE as usize;

/// 按声道划分的 32 位采样缓冲区
pub struct ChannelBuffers {
    data: Vec<i32>,
}

impl ChannelBuffers {
    /// 一次性分配全部声道的缓冲区, 分配失败返回 `OutOfMemory`
    pub fn new() -> Result<Self, FlacError> {
        let len = PLANE_LEN * MAX_CHANNELS as usize;
        let mut data = Vec::new();
        data.try_reserve_exact(len).map_err(|e| {
            FlacError::OutOfMemory(format!("声道缓冲区 ({len} 个采样): {e}"))
        })?;
        data.resize(len, 0);
        Ok(Self { data })
    }

    pub fn channel(&self, index: usize) -> &[i32] {
        &self.data[index * PLANE_LEN..(index + 1) * PLANE_LEN]
    }

    pub fn channel_mut(&mut self, index: usize) -> &mut [i32] {
        &mut self.data[index * PLANE_LEN..(index + 1) * PLANE_LEN]
    }

    /// 同时借出声道 0 和声道 1
    pub fn pair_mut(&mut self) -> (&mut [i32], &mut [i32]) {
        let (first, rest) = self.data.split_at_mut(PLANE_LEN);
        (first, &mut rest[..PLANE_LEN])
    }

    /// 把 `channels` 范围内各声道的前 `block_size` 个采样置零
    pub fn silence(&mut self, channels: std::ops::Range<usize>, block_size: usize) {
        for c in channels {
            self.channel_mut(c)[..block_size].fill(0);
        }
    }

    /// 清空全部缓冲区
    pub fn clear(&mut self) {
        self.data.fill(0);
    }
}

/// 一帧的解码结果; 采样留在 [`ChannelBuffers`] 中
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame {
    pub header: FrameHeader,
    /// 子帧失败时无法定位帧尾, 为 `None`
    pub footer: Option<FrameFooter>,
    /// 第一个解码失败的声道及原因; 该声道及其后的声道已被静音
    pub failed_channel: Option<(usize, FlacError)>,
}

impl DecodedFrame {
    /// 整帧字节数; 帧尾未知时为 `None`
    pub fn frame_len(&self) -> Option<usize> {
        self.footer.map(|f| f.frame_len)
    }
}

/// 从 `data` 起始位置解码一帧到 `buffers`
///
/// 帧头错误直接返回; 子帧错误不返回错误, 而是在结果中标记失败声道并静音.
pub fn decode_frame(
    parser: &FrameParser,
    data: &[u8],
    buffers: &mut ChannelBuffers,
) -> Result<DecodedFrame, FlacError> {
    let header = parser.parse_frame_header(data)?;
    let mut br = BitReader::new(data);
    br.skip_bits(header.header_len * 8)?;

    let channels = header.channels as usize;
    let block_size = header.block_size as usize;
    let assignment = header.channel_assignment;

    let mut failed_channel = None;
    for c in 0..channels {
        let is_side = assignment.side_channel() == Some(c);
        match decode_subframe(
            &mut br,
            buffers.channel_mut(c),
            header.block_size,
            header.bits_per_sample,
            is_side,
        ) {
            Ok(sub) => trace!("声道 {c}: {:?}, wasted={}", sub.kind, sub.wasted_bits),
            Err(e) => {
                warn!("声道 {c} 子帧解码失败: {e}");
                failed_channel = Some((c, e));
                break;
            }
        }
    }

    if let Some((failed, _)) = &failed_channel {
        silence_failed(buffers, assignment, *failed, channels, block_size);
        return Ok(DecodedFrame {
            header,
            footer: None,
            failed_channel,
        });
    }

    if assignment.is_decorrelated() {
        let (ch0, ch1) = buffers.pair_mut();
        if let Err(e) = decorrelate(assignment, &mut ch0[..block_size], &mut ch1[..block_size]) {
            buffers.silence(0..channels, block_size);
            return Ok(DecodedFrame {
                header,
                footer: None,
                failed_channel: Some((0, e)),
            });
        }
    }

    let footer = parser.parse_frame_footer(&mut br, data)?;
    Ok(DecodedFrame {
        header,
        footer: Some(footer),
        failed_channel: None,
    })
}

/// 子帧失败后的静音范围
///
/// 独立声道: 失败声道及之后的声道. 去相关立体声: 只有 left-side 中 side 失败时
/// 左声道仍然可用, 其余情况两个声道都无法还原.
fn silence_failed(
    buffers: &mut ChannelBuffers,
    assignment: ChannelAssignment,
    failed: usize,
    channels: usize,
    block_size: usize,
) {
    let first_silenced = match assignment {
        ChannelAssignment::Independent(_) => failed,
        ChannelAssignment::LeftSide if failed == 1 => 1,
        _ => 0,
    };
    buffers.silence(first_silenced..channels, block_size);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flac::testutil::verbatim_frame;

    fn ramp(scale: i64) -> Vec<i64> {
        (0..16).map(|i| i * scale - 100).collect()
    }

    #[test]
    fn test_decode_independent_stereo() {
        let left = ramp(3);
        let right = ramp(-7);
        let data = verbatim_frame(1, 0, &[left.clone(), right.clone()], None);
        let mut buffers = ChannelBuffers::new().unwrap();
        let frame = decode_frame(&FrameParser::new(), &data, &mut buffers).unwrap();
        assert!(frame.failed_channel.is_none());
        assert_eq!(frame.frame_len(), Some(data.len()));
        assert!(frame.footer.unwrap().crc_matches());
        for i in 0..16 {
            assert_eq!(i64::from(buffers.channel(0)[i]), left[i]);
            assert_eq!(i64::from(buffers.channel(1)[i]), right[i]);
        }
    }

    #[test]
    fn test_decode_left_side() {
        let left = ramp(5);
        let right = ramp(-2);
        let side: Vec<i64> = left.iter().zip(&right).map(|(l, r)| l - r).collect();
        let data = verbatim_frame(8, 0, &[left.clone(), side], Some(1));
        let mut buffers = ChannelBuffers::new().unwrap();
        decode_frame(&FrameParser::new(), &data, &mut buffers).unwrap();
        for i in 0..16 {
            assert_eq!(i64::from(buffers.channel(1)[i]), right[i]);
        }
    }

    #[test]
    fn test_subframe_failure_silences_rest() {
        let mut data = verbatim_frame(1, 0, &[ramp(1), ramp(2)], None);
        // 第二个子帧头 (帧头 7 字节 + 首个子帧 1 + 16*2 字节) 改为保留类型
        data[7 + 33] = 0b0000_0100;
        let mut buffers = ChannelBuffers::new().unwrap();
        buffers.channel_mut(1)[..16].fill(77);
        let frame = decode_frame(&FrameParser::new(), &data, &mut buffers).unwrap();
        assert_eq!(frame.failed_channel.as_ref().map(|(c, _)| *c), Some(1));
        assert!(frame.footer.is_none());
        assert_eq!(buffers.channel(0)[15], ramp(1)[15] as i32);
        assert!(buffers.channel(1)[..16].iter().all(|&s| s == 0));
    }

    #[test]
    fn test_truncated_footer() {
        let mut data = verbatim_frame(0, 0, &[ramp(1)], None);
        data.truncate(data.len() - 1);
        let mut buffers = ChannelBuffers::new().unwrap();
        assert_eq!(
            decode_frame(&FrameParser::new(), &data, &mut buffers),
            Err(FlacError::UnexpectedEof)
        );
    }

    #[test]
    fn test_pair_mut_disjoint() {
        let mut buffers = ChannelBuffers::new().unwrap();
        let (a, b) = buffers.pair_mut();
        a[0] = 1;
        b[0] = 2;
        assert_eq!(buffers.channel(0)[0], 1);
        assert_eq!(buffers.channel(1)[0], 2);
        buffers.clear();
        assert_eq!(buffers.channel(1)[0], 0);
    }
}
