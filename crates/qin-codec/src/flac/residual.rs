//! 分区 Rice 残差解码.
//!
//! ```text
//! coding method: 2 bits  (0 = 4 位 Rice 参数, 1 = 5 位 Rice 参数, 2/3 保留)
//! partition order: 4 bits
//! 每个分区:
//!   Rice 参数 (4/5 bits); 全 1 为逃逸码, 其后 5 bits 原始位宽, 再跟 n 个原始有符号值
//!   否则 n 个 Rice 码: 一元商 + k 位余数, 再做 zigzag 还原
//! ```
//!
//! 第一个分区的采样数要减去预测阶数 (warm-up 采样已单独存储).

use qin_core::BitReader;
use qin_core::validation::{validate_partition_order, validate_residual_value};

use super::error::FlacError;

/// 残差编码方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResidualCoding {
    /// 4 位 Rice 参数, 逃逸码 15
    Rice,
    /// 5 位 Rice 参数, 逃逸码 31
    Rice2,
}

impl ResidualCoding {
    fn from_code(code: u32) -> Result<Self, FlacError> {
        match code {
            0 => Ok(Self::Rice),
            1 => Ok(Self::Rice2),
            _ => Err(FlacError::InvalidResidual(format!("保留的残差编码方式: {code}"))),
        }
    }

    fn parameter_bits(self) -> u32 {
        match self {
            Self::Rice => 4,
            Self::Rice2 => 5,
        }
    }

    fn escape_code(self) -> u32 {
        (1 << self.parameter_bits()) - 1
    }
}

/// zigzag 还原: 0, 1, 2, 3, 4 ... -> 0, -1, 1, -2, 2 ...
#[inline]
fn unfold(folded: u64) -> i64 {
    (folded >> 1) as i64 ^ -((folded & 1) as i64)
}

/// 解码 `block_size - predictor_order` 个残差, 写入 `out`
///
/// `out` 的长度必须恰好等于残差个数. 任何残差为 `i32::MIN` 或超出 32 位范围都会中止解码.
pub fn decode_residual(
    br: &mut BitReader<'_>,
    block_size: u32,
    predictor_order: u32,
    out: &mut [i32],
) -> Result<(), FlacError> {
    let total = block_size
        .checked_sub(predictor_order)
        .ok_or_else(|| FlacError::InvalidResidual("预测阶数大于块大小".into()))?
        as usize;
    if out.len() != total {
        return Err(FlacError::InvalidResidual(format!(
            "残差缓冲区长度 {} 与残差数 {total} 不符",
            out.len()
        )));
    }

    let coding = ResidualCoding::from_code(br.read_bits(2)?)?;
    let partition_order = br.read_bits(4)?;
    if !validate_partition_order(partition_order, block_size, predictor_order) {
        return Err(FlacError::InvalidResidual(format!(
            "分区阶数 {partition_order} 不适用于块大小 {block_size} / 预测阶数 {predictor_order}"
        )));
    }

    let partition_size = (block_size >> partition_order) as usize;
    let mut filled = 0usize;
    for partition in 0..(1usize << partition_order) {
        let count = if partition == 0 {
            partition_size - predictor_order as usize
        } else {
            partition_size
        };
        let dest = &mut out[filled..filled + count];

        let parameter = br.read_bits(coding.parameter_bits())?;
        if parameter == coding.escape_code() {
            decode_escaped_partition(br, dest)?;
        } else {
            decode_rice_partition(br, parameter, dest)?;
        }
        filled += count;
    }
    Ok(())
}

fn decode_rice_partition(
    br: &mut BitReader<'_>,
    parameter: u32,
    dest: &mut [i32],
) -> Result<(), FlacError> {
    for slot in dest.iter_mut() {
        let quotient = u64::from(br.read_unary()?);
        let remainder = u64::from(br.read_bits(parameter)?);
        let value = unfold((quotient << parameter) | remainder);
        if !validate_residual_value(value) {
            return Err(FlacError::InvalidResidual(format!("残差越界: {value}")));
        }
        *slot = value as i32;
    }
    Ok(())
}

fn decode_escaped_partition(br: &mut BitReader<'_>, dest: &mut [i32]) -> Result<(), FlacError> {
    let width = br.read_bits(5)?;
    if width == 0 {
        dest.fill(0);
        return Ok(());
    }
    for slot in dest.iter_mut() {
        let value = i64::from(br.read_bits_signed(width)?);
        if !validate_residual_value(value) {
            return Err(FlacError::InvalidResidual(format!("逃逸残差越界: {value}")));
        }
        *slot = value as i32;
    }
    Ok(())
}
