//! 采样重建: wasted bits 恢复, 位深转换与交织.
//!
//! 播放器输出固定为 16 位: 低于 16 位左移补齐, 高于 16 位算术右移后饱和截断, 不会回绕.

use qin_core::validation::{MAX_CHANNELS, validate_sample_value};

use super::error::FlacError;

/// 恢复 wasted bits: 整块统一左移
///
/// `bit_depth` 为含 wasted bits 的子帧位深 (side 声道可到 33); 结果必须仍能放入 32 位缓冲区.
pub fn restore_wasted_bits(
    samples: &mut [i32],
    wasted_bits: u32,
    bit_depth: u32,
) -> Result<(), FlacError> {
    if wasted_bits == 0 {
        return Ok(());
    }
    for s in samples.iter_mut() {
        let shifted = i64::from(*s) << wasted_bits;
        if !validate_sample_value(shifted, bit_depth) {
            return Err(FlacError::InvalidSubframe(format!(
                "恢复 wasted bits 后采样越界: {shifted}"
            )));
        }
        *s = i32::try_from(shifted).map_err(|_| {
            FlacError::InvalidSubframe(format!("采样超出 32 位缓冲区: {shifted}"))
        })?;
    }
    Ok(())
}

/// 把 N 位采样转换为 16 位
#[inline]
pub fn to_i16(sample: i32, bit_depth: u32) -> i16 {
    match bit_depth {
        16 => sample.clamp(i16::MIN.into(), i16::MAX.into()) as i16,
        0..=15 => {
            let widened = sample << (16 - bit_depth.max(1));
            widened.clamp(i16::MIN.into(), i16::MAX.into()) as i16
        }
        _ => {
            let narrowed = sample >> (bit_depth.min(32) - 16);
            narrowed.clamp(i16::MIN.into(), i16::MAX.into()) as i16
        }
    }
}

/// 把各声道缓冲区交织为采样主序的 16 位 PCM, 追加到 `out`
///
/// `channel(c)` 返回第 c 个声道的采样, 长度至少为 `block_size`.
pub fn interleave_to_i16<'a, F>(
    channel: F,
    channels: usize,
    block_size: usize,
    bit_depth: u32,
    out: &mut Vec<i16>,
) where
    F: Fn(usize) -> &'a [i32],
{
    let mut planes: [&[i32]; MAX_CHANNELS as usize] = [&[]; MAX_CHANNELS as usize];
    let channels = channels.min(planes.len());
    for (c, plane) in planes.iter_mut().take(channels).enumerate() {
        *plane = &channel(c)[..block_size];
    }
    out.reserve(block_size * channels);
    for i in 0..block_size {
        for plane in &planes[..channels] {
            out.push(to_i16(plane[i], bit_depth));
        }
    }
}
