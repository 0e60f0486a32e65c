//! 单元测试用的码流构造工具.

use qin_core::bitwriter::BitWriter;
use qin_core::crc;

use super::frame_header::SYNC_CODE;
use super::metadata::StreamInfo;

/// 构造固定块大小, 16 位, 44.1kHz 的帧, 每个声道一个 VERBATIM 子帧
///
/// 块大小取 `planes[0].len()` (8 位跟随编码), `side` 为 side 声道序号 (多写 1 位).
pub(crate) fn verbatim_frame(
    ch_code: u32,
    frame_number: u64,
    planes: &[Vec<i64>],
    side: Option<usize>,
) -> Vec<u8> {
    let mut bw = BitWriter::new();
    bw.write_bits(SYNC_CODE, 14);
    bw.write_bits(0, 2);
    bw.write_bits(6, 4);
    bw.write_bits(9, 4);
    bw.write_bits(ch_code, 4);
    bw.write_bits(4, 3);
    bw.write_bits(0, 1);
    bw.write_utf8(frame_number);
    bw.write_bits(planes[0].len() as u32 - 1, 8);
    let header = bw.bytes().to_vec();
    bw.write_bits(u32::from(crc::crc8(&header)), 8);
    for (c, plane) in planes.iter().enumerate() {
        let bits = if side == Some(c) { 17 } else { 16 };
        bw.write_bits(0, 1);
        bw.write_bits(1, 6);
        bw.write_bits(0, 1);
        for &s in plane {
            bw.write_signed(s, bits);
        }
    }
    bw.align_to_byte();
    let body = bw.bytes().to_vec();
    bw.write_bits(u32::from(crc::crc16(&body)), 16);
    bw.finish()
}

/// 与 [`verbatim_frame`] 匹配的 STREAMINFO
pub(crate) fn stream_info(block_size: u32, channels: u32, total_samples: u64) -> StreamInfo {
    StreamInfo {
        min_block_size: block_size,
        max_block_size: block_size,
        min_frame_size: 0,
        max_frame_size: 0,
        sample_rate: 44100,
        channels,
        bits_per_sample: 16,
        total_samples,
        md5_signature: [0; 16],
    }
}
