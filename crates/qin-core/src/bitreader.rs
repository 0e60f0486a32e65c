//! 比特流读取器.
//!
//! 在借用的字节缓冲区上维护一个位游标, 按大端位序 (MSB first) 读取定长无符号/有符号值、
//! 一元码和 FLAC 的 UTF-8 风格变长整数.
//!
//! 所有读取都先做边界检查: 剩余位数不足时返回 [`QinError::Eof`], 游标保持原位不动.

use crate::validation::MAX_UNARY_VALUE;
use crate::{QinError, QinResult};

/// 将 `bits` 位宽的补码值符号扩展为 `i64`
///
/// `bits` 取值 1-64; 超出范围时原样返回.
///
/// ```
/// use qin_core::bitreader::sign_extend;
///
/// assert_eq!(sign_extend(0x80, 8), -128);
/// assert_eq!(sign_extend(0x80_0000, 24), -8_388_608);
/// assert_eq!(sign_extend(0x7F, 8), 127);
/// ```
pub fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

/// 比特流读取器
///
/// ```
/// use qin_core::bitreader::BitReader;
///
/// let data = [0b1011_0001, 0b0101_0101];
/// let mut br = BitReader::new(&data);
/// assert_eq!(br.read_bits(4).unwrap(), 0b1011);
/// assert_eq!(br.read_unary().unwrap(), 3);
/// assert_eq!(br.read_bits(8).unwrap(), 0b0101_0101);
/// assert!(br.read_bit().is_err());
/// ```
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    data: &'a [u8],
    /// 当前字节索引
    byte_pos: usize,
    /// 当前字节内的位偏移 (0-7, 0 为最高位)
    bit_pos: u8,
}

impl<'a> BitReader<'a> {
    /// 创建读取器, 游标位于缓冲区起点
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            byte_pos: 0,
            bit_pos: 0,
        }
    }

    /// 切换到新的缓冲区并将游标归零
    pub fn reset(&mut self, data: &'a [u8]) {
        self.data = data;
        self.byte_pos = 0;
        self.bit_pos = 0;
    }

    /// 底层缓冲区
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// 已消耗的位数
    pub fn bits_read(&self) -> usize {
        self.byte_pos * 8 + usize::from(self.bit_pos)
    }

    /// 剩余可读位数
    pub fn bits_left(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.bits_read())
    }

    pub fn is_eof(&self) -> bool {
        self.bits_left() == 0
    }

    /// 游标是否位于字节边界
    pub fn is_aligned(&self) -> bool {
        self.bit_pos == 0
    }

    /// 当前字节索引 (未对齐时指向正在读取的字节)
    pub fn byte_position(&self) -> usize {
        self.byte_pos
    }

    fn ensure(&self, n: u32) -> QinResult<()> {
        if n as usize > self.bits_left() {
            return Err(QinError::Eof);
        }
        Ok(())
    }

    fn advance(&mut self, n: usize) {
        let total = usize::from(self.bit_pos) + n;
        self.byte_pos += total / 8;
        self.bit_pos = (total % 8) as u8;
    }

    /// 读取 1 位
    pub fn read_bit(&mut self) -> QinResult<bool> {
        self.ensure(1)?;
        let bit = (self.data[self.byte_pos] >> (7 - self.bit_pos)) & 1;
        self.advance(1);
        Ok(bit != 0)
    }

    /// 读取 n 位无符号值 (0-32 位)
    pub fn read_bits(&mut self, n: u32) -> QinResult<u32> {
        if n > 32 {
            return Err(QinError::InvalidArgument(format!(
                "read_bits: n={n} 超过 32 位"
            )));
        }
        Ok(self.read_bits_u64(n)? as u32)
    }

    /// 读取 n 位无符号值 (0-64 位)
    pub fn read_bits_u64(&mut self, n: u32) -> QinResult<u64> {
        if n > 64 {
            return Err(QinError::InvalidArgument(format!(
                "read_bits_u64: n={n} 超过 64 位"
            )));
        }
        if n == 0 {
            return Ok(0);
        }
        self.ensure(n)?;

        // 首字节去掉已读的高位, 其余整字节拼接, 最后右移丢弃多读的低位
        let mut acc: u128 = u128::from(self.data[self.byte_pos] & (0xFF >> self.bit_pos));
        let mut have = 8 - u32::from(self.bit_pos);
        let mut idx = self.byte_pos + 1;
        while have < n {
            acc = (acc << 8) | u128::from(self.data[idx]);
            have += 8;
            idx += 1;
        }
        let value = (acc >> (have - n)) as u64;
        self.advance(n as usize);
        Ok(value)
    }

    /// 读取 n 位补码有符号值 (1-32 位)
    pub fn read_bits_signed(&mut self, n: u32) -> QinResult<i32> {
        if n > 32 {
            return Err(QinError::InvalidArgument(format!(
                "read_bits_signed: n={n} 超过 32 位"
            )));
        }
        let raw = self.read_bits_u64(n)?;
        Ok(sign_extend(raw, n) as i32)
    }

    /// 读取 n 位补码有符号值 (1-64 位), 用于 33 位 side 声道
    pub fn read_bits_signed_i64(&mut self, n: u32) -> QinResult<i64> {
        let raw = self.read_bits_u64(n)?;
        Ok(sign_extend(raw, n))
    }

    /// 读取一元码: 统计 1 之前连续 0 的个数
    ///
    /// 计数超过 [`MAX_UNARY_VALUE`] 视为恶意码流, 返回错误; 失败时游标恢复原位.
    pub fn read_unary(&mut self) -> QinResult<u32> {
        let saved = (self.byte_pos, self.bit_pos);
        let mut count: u32 = 0;
        loop {
            if self.byte_pos >= self.data.len() {
                (self.byte_pos, self.bit_pos) = saved;
                return Err(QinError::Eof);
            }
            // 把当前字节已读的位左移出去, 用前导零一次跳过整段 0
            let window = self.data[self.byte_pos] << self.bit_pos;
            let avail = 8 - u32::from(self.bit_pos);
            let zeros = window.leading_zeros().min(avail);
            count = count.saturating_add(zeros);
            if count > MAX_UNARY_VALUE {
                (self.byte_pos, self.bit_pos) = saved;
                return Err(QinError::InvalidData(format!(
                    "一元码超过上限 {MAX_UNARY_VALUE}"
                )));
            }
            if zeros < avail {
                self.advance(zeros as usize + 1);
                return Ok(count);
            }
            self.advance(avail as usize);
        }
    }

    /// 读取 FLAC 帧头中的 UTF-8 风格变长整数 (最多 7 字节, 36 位)
    pub fn read_utf8_u64(&mut self) -> QinResult<u64> {
        let saved = (self.byte_pos, self.bit_pos);
        let result = self.read_utf8_inner();
        if result.is_err() {
            (self.byte_pos, self.bit_pos) = saved;
        }
        result
    }

    fn read_utf8_inner(&mut self) -> QinResult<u64> {
        let lead = self.read_bits(8)? as u8;
        let ones = lead.leading_ones();
        let (mut value, continuation) = match ones {
            0 => (u64::from(lead), 0),
            2..=6 => (u64::from(lead & (0x7F >> ones)), ones - 1),
            7 => (0, 6),
            _ => {
                return Err(QinError::InvalidData(format!(
                    "无效的变长编码首字节: 0x{lead:02X}"
                )));
            }
        };
        for _ in 0..continuation {
            let byte = self.read_bits(8)? as u8;
            if byte & 0xC0 != 0x80 {
                return Err(QinError::InvalidData(format!(
                    "无效的变长编码后续字节: 0x{byte:02X}"
                )));
            }
            value = (value << 6) | u64::from(byte & 0x3F);
        }
        Ok(value)
    }

    /// 窥视 n 位 (不移动游标)
    pub fn peek_bits(&self, n: u32) -> QinResult<u32> {
        self.clone().read_bits(n)
    }

    /// 跳过 n 位
    pub fn skip_bits(&mut self, n: usize) -> QinResult<()> {
        if n > self.bits_left() {
            return Err(QinError::Eof);
        }
        self.advance(n);
        Ok(())
    }

    /// 对齐到下一个字节边界, 已对齐时不动
    pub fn align_to_byte(&mut self) {
        if self.bit_pos != 0 {
            self.bit_pos = 0;
            self.byte_pos += 1;
        }
    }

    /// 读取 len 个整字节, 要求游标已对齐
    pub fn read_bytes(&mut self, len: usize) -> QinResult<&'a [u8]> {
        if !self.is_aligned() {
            return Err(QinError::InvalidState("read_bytes: 游标未按字节对齐".into()));
        }
        let end = self.byte_pos.checked_add(len).ok_or(QinError::Eof)?;
        if end > self.data.len() {
            return Err(QinError::Eof);
        }
        let slice = &self.data[self.byte_pos..end];
        self.byte_pos = end;
        Ok(slice)
    }
}
