//! FLAC 帧校验和.
//!
//! - CRC-8: 多项式 x^8 + x^2 + x + 1 (0x07), 初始值 0, 覆盖帧头 (含同步码, 不含 CRC 本身)
//! - CRC-16: 多项式 x^16 + x^15 + x^2 + 1 (0x8005), 初始值 0, 覆盖整帧 (不含末尾 CRC-16)
//!
//! 查找表在编译期生成, 运行时只读, 可被任意线程并发访问.

const fn build_crc8_table(poly: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut n = 0usize;
    while n < 256 {
        let mut reg = n as u8;
        let mut bit = 0;
        while bit < 8 {
            reg = if reg & 0x80 != 0 { (reg << 1) ^ poly } else { reg << 1 };
            bit += 1;
        }
        table[n] = reg;
        n += 1;
    }
    table
}

const fn build_crc16_table(poly: u16) -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut n = 0usize;
    while n < 256 {
        let mut reg = (n as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            reg = if reg & 0x8000 != 0 { (reg << 1) ^ poly } else { reg << 1 };
            bit += 1;
        }
        table[n] = reg;
        n += 1;
    }
    table
}

static CRC8_TABLE: [u8; 256] = build_crc8_table(0x07);
static CRC16_TABLE: [u16; 256] = build_crc16_table(0x8005);

/// 计算 CRC-8 (帧头)
pub fn crc8(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |crc, &byte| CRC8_TABLE[usize::from(crc ^ byte)])
}

/// 计算 CRC-16 (整帧)
pub fn crc16(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &byte| {
        (crc << 8) ^ CRC16_TABLE[usize::from((crc >> 8) as u8 ^ byte)]
    })
}

/// 校验帧头 CRC-8
pub fn verify_crc8(header: &[u8], expected: u8) -> bool {
    crc8(header) == expected
}

/// 校验整帧 CRC-16
pub fn verify_crc16(frame: &[u8], expected: u16) -> bool {
    crc16(frame) == expected
}
