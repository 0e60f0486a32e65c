//! 子帧解码.
//!
//! ```text
//! 子帧头: 0 (1 bit) | 类型 (6 bits) | wasted 标志 (1 bit) [| 一元码 k-1]
//! 类型:   000000 CONSTANT
//!         000001 VERBATIM
//!         001xxx FIXED, 阶数 xxx (0-4)
//!         1xxxxx LPC, 阶数 xxxxx + 1
//!         其余   保留
//! ```
//!
//! 解码在调用方提供的缓冲区上原地进行: warm-up 采样写在开头, 残差直接写到 `[order..]`,
//! 再由预测器按顺序把残差替换为重建后的采样. 所有累加都在 i64 中完成.

use log::trace;
use qin_core::BitReader;
use qin_core::validation::{
    MAX_LPC_ORDER, check_forbidden_predictor_precision, validate_fixed_order, validate_lpc_order,
    validate_predictor_shift, validate_sample_value, validate_wasted_bits,
};

use super::error::FlacError;
use super::reconstruct::restore_wasted_bits;
use super::residual::decode_residual;

/// 子帧类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubframeType {
    Constant,
    Verbatim,
    /// 固定多项式预测, 阶数 0-4
    Fixed(u32),
    /// 线性预测, 阶数 1-32
    Lpc(u32),
}

impl SubframeType {
    fn from_code(code: u32) -> Result<Self, FlacError> {
        match code {
            0 => Ok(Self::Constant),
            1 => Ok(Self::Verbatim),
            8..=12 => Ok(Self::Fixed(code - 8)),
            32..=63 => Ok(Self::Lpc(code - 31)),
            _ => Err(FlacError::InvalidSubframe(format!("保留的子帧类型: {code}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubframeHeader {
    pub kind: SubframeType,
    pub wasted_bits: u32,
}

/// 解析子帧头
pub fn parse_subframe_header(br: &mut BitReader<'_>) -> Result<SubframeHeader, FlacError> {
    if br.read_bit()? {
        return Err(FlacError::InvalidSubframe("子帧头填充位不为 0".into()));
    }
    let kind = SubframeType::from_code(br.read_bits(6)?)?;
    let wasted_bits = if br.read_bit()? { br.read_unary()? + 1 } else { 0 };
    Ok(SubframeHeader { kind, wasted_bits })
}

/// 解码一个子帧到 `out[..block_size]`
///
/// `bit_depth` 为帧位深; side 声道 (`is_side_channel`) 多 1 位.
pub fn decode_subframe(
    br: &mut BitReader<'_>,
    out: &mut [i32],
    block_size: u32,
    bit_depth: u32,
    is_side_channel: bool,
) -> Result<SubframeHeader, FlacError> {
    let bs = block_size as usize;
    if out.len() < bs {
        return Err(FlacError::InvalidSubframe(format!(
            "输出缓冲区 {} 小于块大小 {bs}",
            out.len()
        )));
    }
    let out = &mut out[..bs];

    let header = parse_subframe_header(br)?;
    let depth = bit_depth + u32::from(is_side_channel);
    if !validate_wasted_bits(header.wasted_bits, depth) {
        return Err(FlacError::InvalidSubframe(format!(
            "wasted bits {} 不小于位深 {depth}",
            header.wasted_bits
        )));
    }
    let effective = depth - header.wasted_bits;
    trace!("子帧 {:?}, 有效位深 {effective}", header.kind);

    match header.kind {
        SubframeType::Constant => {
            let value = read_sample(br, effective)?;
            out.fill(value);
        }
        SubframeType::Verbatim => {
            for slot in out.iter_mut() {
                *slot = read_sample(br, effective)?;
            }
        }
        SubframeType::Fixed(order) => {
            if !validate_fixed_order(order, block_size) {
                return Err(FlacError::InvalidSubframe(format!(
                    "Fixed 阶数 {order} 不适用于块大小 {block_size}"
                )));
            }
            read_warmup(br, &mut out[..order as usize], effective)?;
            decode_residual(br, block_size, order, &mut out[order as usize..])?;
            restore_fixed(out, order, effective)?;
        }
        SubframeType::Lpc(order) => {
            if !validate_lpc_order(order, block_size) {
                return Err(FlacError::InvalidSubframe(format!(
                    "LPC 阶数 {order} 不适用于块大小 {block_size}"
                )));
            }
            read_warmup(br, &mut out[..order as usize], effective)?;

            let precision_code = br.read_bits(4)?;
            if !check_forbidden_predictor_precision(precision_code) {
                return Err(FlacError::InvalidSubframe("LPC 系数精度为禁用值 0b1111".into()));
            }
            let precision = precision_code + 1;
            let shift = br.read_bits_signed(5)?;
            if !validate_predictor_shift(shift) {
                return Err(FlacError::InvalidSubframe(format!("LPC 移位为负: {shift}")));
            }

            let mut coefs = [0i32; MAX_LPC_ORDER as usize];
            for c in coefs.iter_mut().take(order as usize) {
                *c = br.read_bits_signed(precision)?;
            }

            decode_residual(br, block_size, order, &mut out[order as usize..])?;
            restore_lpc(out, &coefs[..order as usize], shift as u32, effective)?;
        }
    }

    restore_wasted_bits(out, header.wasted_bits, depth)?;
    Ok(header)
}

fn read_sample(br: &mut BitReader<'_>, bits: u32) -> Result<i32, FlacError> {
    let value = br.read_bits_signed_i64(bits)?;
    i32::try_from(value)
        .map_err(|_| FlacError::InvalidSubframe(format!("采样超出 32 位缓冲区: {value}")))
}

fn read_warmup(br: &mut BitReader<'_>, dest: &mut [i32], bits: u32) -> Result<(), FlacError> {
    for slot in dest.iter_mut() {
        *slot = read_sample(br, bits)?;
    }
    Ok(())
}

#[inline]
fn checked_sample(value: i64, bit_depth: u32) -> Result<i32, FlacError> {
    if !validate_sample_value(value, bit_depth) {
        return Err(FlacError::InvalidSubframe(format!(
            "重建采样 {value} 超出 {bit_depth} 位范围"
        )));
    }
    i32::try_from(value)
        .map_err(|_| FlacError::InvalidSubframe(format!("采样超出 32 位缓冲区: {value}")))
}

/// 固定多项式预测重建
///
/// 输入: `samples[..order]` 为 warm-up, `samples[order..]` 为残差; 输出: 完整采样.
pub fn restore_fixed(samples: &mut [i32], order: u32, bit_depth: u32) -> Result<(), FlacError> {
    let order = order as usize;
    for i in order..samples.len() {
        let s = |k: usize| i64::from(samples[i - k]);
        let prediction = match order {
            0 => 0,
            1 => s(1),
            2 => 2 * s(1) - s(2),
            3 => 3 * s(1) - 3 * s(2) + s(3),
            4 => 4 * s(1) - 6 * s(2) + 4 * s(3) - s(4),
            _ => return Err(FlacError::InvalidSubframe(format!("Fixed 阶数 {order} 无效"))),
        };
        samples[i] = checked_sample(prediction + i64::from(samples[i]), bit_depth)?;
    }
    Ok(())
}

/// LPC 重建: `s[n] = (Σ coef[j] · s[n-j-1]) >> shift + residual[n]`
///
/// 输入布局同 [`restore_fixed`]; `coefs[0]` 作用于最近的采样.
pub fn restore_lpc(
    samples: &mut [i32],
    coefs: &[i32],
    shift: u32,
    bit_depth: u32,
) -> Result<(), FlacError> {
    let order = coefs.len();
    for i in order..samples.len() {
        let history = &samples[i - order..i];
        let sum: i64 = coefs
            .iter()
            .zip(history.iter().rev())
            .map(|(&c, &s)| i64::from(c) * i64::from(s))
            .sum();
        samples[i] = checked_sample((sum >> shift) + i64::from(samples[i]), bit_depth)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qin_core::bitwriter::BitWriter;

    fn run(bytes: &[u8], block_size: u32, bps: u32, side: bool) -> Result<Vec<i32>, FlacError> {
        let mut out = vec![0i32; block_size as usize];
        let mut br = BitReader::new(bytes);
        decode_subframe(&mut br, &mut out, block_size, bps, side)?;
        Ok(out)
    }

    #[test]
    fn test_constant() {
        for (value, bps) in [(0i64, 16u32), (-32768, 16), (8_388_607, 24), (-1, 8)] {
            let mut bw = BitWriter::new();
            bw.write_bits(0, 8);
            bw.write_signed(value, bps);
            let data = bw.finish();
            let out = run(&data, 4096, bps, false).unwrap();
            assert!(out.iter().all(|&s| i64::from(s) == value));
            assert_eq!(out.len(), 4096);
        }
    }

    #[test]
    fn test_verbatim_side_channel() {
        // side 声道以 17 位存储
        let values = [65535i64, -65536, 0, 1];
        let mut bw = BitWriter::new();
        bw.write_bits(0b0000_0010, 8);
        for &v in &values {
            bw.write_signed(v, 17);
        }
        let data = bw.finish();
        let out = run(&data, 4, 16, true).unwrap();
        assert_eq!(out, vec![65535, -65536, 0, 1]);
    }

    #[test]
    fn test_fixed_order2_vector() {
        let mut samples = vec![10, 12, 1];
        restore_fixed(&mut samples, 2, 16).unwrap();
        assert_eq!(samples, vec![10, 12, 15]);
    }

    #[test]
    fn test_fixed_all_orders() {
        let warm = [5i32, -3, 8, 2];
        let residuals = [1i32, -2, 3, 0, 4];
        for order in 0..=4u32 {
            let o = order as usize;
            let mut samples: Vec<i32> = warm[..o].iter().chain(residuals.iter()).copied().collect();
            let mut expected: Vec<i64> = warm[..o].iter().map(|&v| i64::from(v)).collect();
            for &r in &residuals {
                let n = expected.len();
                let e = |k: usize| expected[n - k];
                let p = match order {
                    0 => 0,
                    1 => e(1),
                    2 => 2 * e(1) - e(2),
                    3 => 3 * e(1) - 3 * e(2) + e(3),
                    _ => 4 * e(1) - 6 * e(2) + 4 * e(3) - e(4),
                };
                expected.push(p + i64::from(r));
            }
            restore_fixed(&mut samples, order, 24).unwrap();
            let got: Vec<i64> = samples.iter().map(|&v| i64::from(v)).collect();
            assert_eq!(got, expected, "order={order}");
        }
    }

    #[test]
    fn test_lpc_regression_vector() {
        // 2 阶, 系数 [3, -1] (作用于 s[n-1], s[n-2]), shift 1
        let mut samples = vec![100, 104, 2, -1, 0, 5];
        restore_lpc(&mut samples, &[3, -1], 1, 16).unwrap();
        // s2 = (3*104 - 100) >> 1 + 2 = 106 + 2 = 108
        // s3 = (3*108 - 104) >> 1 - 1 = 110 - 1 = 109
        // s4 = (3*109 - 108) >> 1 + 0 = 109
        // s5 = (3*109 - 109) >> 1 + 5 = 109 + 5 = 114
        assert_eq!(samples, vec![100, 104, 108, 109, 109, 114]);
    }

    #[test]
    fn test_lpc_negative_accumulator_floors() {
        let mut samples = vec![-3, 0];
        restore_lpc(&mut samples, &[1], 1, 16).unwrap();
        // -3 >> 1 = -2 (算术右移向负无穷取整)
        assert_eq!(samples[1], -2);
    }

    #[test]
    fn test_lpc_bitstream() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 1);
        bw.write_bits(32, 6); // LPC 1 阶
        bw.write_bits(0, 1);
        bw.write_signed(7, 16); // warm-up
        bw.write_bits(14, 4); // 精度 15
        bw.write_signed(0, 5); // shift 0
        bw.write_signed(1, 15); // coef
        bw.write_bits(0, 2);
        bw.write_bits(0, 4);
        bw.write_bits(1, 4);
        for r in [1, 1, -1] {
            bw.write_rice(r, 1);
        }
        let data = bw.finish();
        assert_eq!(run(&data, 4, 16, false).unwrap(), vec![7, 8, 9, 8]);
    }

    #[test]
    fn test_forbidden_lpc_fields() {
        let build = |precision: u32, shift: i64| {
            let mut bw = BitWriter::new();
            bw.write_bits(32 << 1, 8);
            bw.write_signed(0, 16);
            bw.write_bits(precision, 4);
            bw.write_signed(shift, 5);
            bw.write_bits(0, 32);
            bw.finish()
        };
        assert!(matches!(run(&build(15, 0), 16, 16, false), Err(FlacError::InvalidSubframe(_))));
        assert!(matches!(run(&build(3, -2), 16, 16, false), Err(FlacError::InvalidSubframe(_))));
    }

    #[test]
    fn test_reserved_types() {
        for code in [2u32, 7, 13, 15, 16, 31] {
            let mut bw = BitWriter::new();
            bw.write_bits(code << 1, 8);
            bw.write_bits(0, 16);
            let data = bw.finish();
            assert!(run(&data, 16, 16, false).is_err(), "type {code}");
        }
    }

    #[test]
    fn test_wasted_bits() {
        // CONSTANT, wasted bits = 3 (一元码 "001"), 有效位深 13
        let mut bw = BitWriter::new();
        bw.write_bits(0, 7);
        bw.write_bit(true);
        bw.write_unary(2);
        bw.write_signed(-5, 13);
        let data = bw.finish();
        let out = run(&data, 16, 16, false).unwrap();
        assert!(out.iter().all(|&s| s == -40));
    }

    #[test]
    fn test_wasted_bits_not_below_depth() {
        let mut bw = BitWriter::new();
        bw.write_bits(0, 7);
        bw.write_bit(true);
        bw.write_unary(15); // 16 wasted bits
        bw.write_bits(0, 16);
        let data = bw.finish();
        assert!(matches!(run(&data, 16, 16, false), Err(FlacError::InvalidSubframe(_))));
    }

    #[test]
    fn test_fixed_order_exceeding_block() {
        let mut bw = BitWriter::new();
        bw.write_bits(12 << 1, 8); // FIXED 4 阶
        bw.write_bits(0, 64);
        let data = bw.finish();
        assert!(run(&data, 4, 16, false).is_err());
    }

    #[test]
    fn test_predicted_sample_out_of_range() {
        let mut samples = vec![32767, 1];
        assert!(restore_fixed(&mut samples, 1, 16).is_err());
    }
}
