//! 比特流写入器.
//!
//! [`BitReader`](crate::bitreader::BitReader) 的逆操作, 按大端位序写入.
//! 解码器本身不需要写入, 它用于在测试和基准中合成 FLAC 码流.

/// 比特流写入器
///
/// ```
/// use qin_core::bitwriter::BitWriter;
///
/// let mut bw = BitWriter::new();
/// bw.write_bits(0b101, 3);
/// bw.write_unary(2);
/// assert_eq!(bw.finish(), vec![0b1010_0100]);
/// ```
#[derive(Debug, Default, Clone)]
pub struct BitWriter {
    bytes: Vec<u8>,
    /// 尚未凑满一个字节的位, 左对齐存放在低 `pending_bits` 位
    pending: u8,
    pending_bits: u32,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(capacity),
            ..Self::default()
        }
    }

    /// 已写入的总位数
    pub fn bits_written(&self) -> usize {
        self.bytes.len() * 8 + self.pending_bits as usize
    }

    pub fn is_aligned(&self) -> bool {
        self.pending_bits == 0
    }

    pub fn write_bit(&mut self, bit: bool) {
        self.write_bits_u64(u64::from(bit), 1);
    }

    /// 写入 `value` 的低 n 位 (n ≤ 32)
    pub fn write_bits(&mut self, value: u32, n: u32) {
        self.write_bits_u64(u64::from(value), n.min(32));
    }

    /// 写入 `value` 的低 n 位 (n ≤ 64)
    pub fn write_bits_u64(&mut self, value: u64, n: u32) {
        let mut left = n.min(64);
        while left > 0 {
            let room = 8 - self.pending_bits;
            let take = left.min(room);
            let chunk = ((value >> (left - take)) & ((1u64 << take) - 1)) as u8;
            self.pending = if take == 8 { chunk } else { (self.pending << take) | chunk };
            self.pending_bits += take;
            left -= take;
            if self.pending_bits == 8 {
                self.bytes.push(self.pending);
                self.pending = 0;
                self.pending_bits = 0;
            }
        }
    }

    /// 以 n 位补码写入有符号值 (n ≤ 64)
    pub fn write_signed(&mut self, value: i64, n: u32) {
        let mask = if n >= 64 { u64::MAX } else { (1u64 << n) - 1 };
        self.write_bits_u64(value as u64 & mask, n);
    }

    /// 写入一元码: `zeros` 个 0 后跟 1
    pub fn write_unary(&mut self, zeros: u32) {
        let mut left = zeros;
        while left >= 32 {
            self.write_bits(0, 32);
            left -= 32;
        }
        self.write_bits(1, left + 1);
    }

    /// 写入 Rice 编码的有符号残差 (zigzag 后拆成一元商和 k 位余数)
    pub fn write_rice(&mut self, residual: i32, k: u32) {
        let folded = ((residual << 1) ^ (residual >> 31)) as u32;
        self.write_unary(folded >> k);
        if k > 0 {
            self.write_bits(folded & ((1u32 << k) - 1), k);
        }
    }

    /// 写入 FLAC 帧头的 UTF-8 风格变长整数 (最大 36 位)
    pub fn write_utf8(&mut self, value: u64) {
        if value < 0x80 {
            self.write_bits(value as u32, 8);
            return;
        }
        // 有效位数决定续字节数: 每个续字节承载 6 位, 首字节承载 6 - continuation 位
        let significant = 64 - value.leading_zeros();
        let continuation = (1..=6u32)
            .find(|&c| significant <= 6 * c + (6 - c))
            .unwrap_or(6);
        let lead_marker: u32 = if continuation == 6 {
            0xFE
        } else {
            (0xFF00u32 >> (continuation + 1)) & 0xFF
        };
        let lead_payload = (value >> (6 * continuation)) as u32;
        self.write_bits(lead_marker | lead_payload, 8);
        for i in (0..continuation).rev() {
            self.write_bits(0x80 | ((value >> (6 * i)) as u32 & 0x3F), 8);
        }
    }

    /// 写入整字节
    pub fn write_bytes(&mut self, data: &[u8]) {
        if self.is_aligned() {
            self.bytes.extend_from_slice(data);
        } else {
            for &b in data {
                self.write_bits(u32::from(b), 8);
            }
        }
    }

    /// 用 0 补齐到字节边界
    pub fn align_to_byte(&mut self) {
        if self.pending_bits > 0 {
            let pad = 8 - self.pending_bits;
            self.write_bits(0, pad);
        }
    }

    /// 已凑满的字节 (不含未对齐的尾部)
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// 补齐并取出全部字节
    pub fn finish(mut self) -> Vec<u8> {
        self.align_to_byte();
        self.bytes
    }
}
