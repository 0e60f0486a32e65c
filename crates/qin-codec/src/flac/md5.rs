//! 全流 MD5 校验.
//!
//! STREAMINFO 中的签名按编码前 PCM 计算: 各声道交织, 每个采样以原始位深
//! 向上取整到字节 (`ceil(bps / 8)`) 的小端有符号整数存储. 这里按同样方式
//! 对解码结果做增量哈希, 而不是对 16 位输出做哈希.
//!
//! 校验只作为完整性提示, 不影响播放.

use log::{debug, warn};

/// MD5 比对结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Md5Status {
    /// 尚未比对, 或中途 seek 导致无法比对
    #[default]
    NotChecked,
    /// STREAMINFO 未提供签名 (全 0)
    Unavailable,
    Match,
    Mismatch,
}

/// 增量 MD5 校验器
pub struct Md5Validator {
    context: md5::Context,
    expected: Option<[u8; 16]>,
    enabled: bool,
    /// seek 之后哈希不再覆盖完整的流
    tainted: bool,
    /// 单帧字节缓冲, 按需增长后复用
    scratch: Vec<u8>,
    status: Md5Status,
}

impl Default for Md5Validator {
    fn default() -> Self {
        Self::new()
    }
}

impl Md5Validator {
    pub fn new() -> Self {
        Self {
            context: md5::Context::new(),
            expected: None,
            enabled: false,
            tainted: false,
            scratch: Vec::new(),
            status: Md5Status::NotChecked,
        }
    }

    /// 设置期望签名, 全 0 视为未提供
    pub fn set_expected(&mut self, signature: [u8; 16]) {
        self.expected = signature.iter().any(|&b| b != 0).then_some(signature);
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_tainted(&self) -> bool {
        self.tainted
    }

    /// 把一帧解码结果加入哈希
    ///
    /// `channel(c)` 返回第 c 个声道的采样 (长度至少 `block_size`).
    pub fn update<'a, F>(&mut self, channel: F, channels: usize, block_size: usize, bits_per_sample: u32)
    where
        F: Fn(usize) -> &'a [i32],
    {
        if !self.enabled || self.tainted {
            return;
        }
        let bytes_per_sample = bits_per_sample.div_ceil(8).clamp(1, 4) as usize;
        self.scratch.clear();
        self.scratch.reserve(block_size * channels * bytes_per_sample);
        for i in 0..block_size {
            for c in 0..channels {
                let le = channel(c)[i].to_le_bytes();
                self.scratch.extend_from_slice(&le[..bytes_per_sample]);
            }
        }
        self.context.consume(&self.scratch);
    }

    /// 标记哈希不完整 (seek 跳过了部分采样)
    pub fn taint(&mut self) {
        if self.enabled && !self.tainted {
            debug!("seek 后 MD5 不再覆盖完整流, 跳过最终比对");
        }
        self.tainted = true;
    }

    /// 结束哈希并与期望签名比对
    pub fn finalize(&mut self) -> Md5Status {
        let context = std::mem::replace(&mut self.context, md5::Context::new());
        self.status = match (self.enabled, self.tainted, self.expected) {
            (false, _, _) | (_, true, _) => Md5Status::NotChecked,
            (true, false, None) => Md5Status::Unavailable,
            (true, false, Some(expected)) => {
                let digest = context.compute();
                if digest.0 == expected {
                    debug!("MD5 校验通过");
                    Md5Status::Match
                } else {
                    warn!("MD5 不匹配: 期望 {:x?}, 实际 {digest:x}", expected);
                    Md5Status::Mismatch
                }
            }
        };
        self.status
    }

    /// 清空哈希状态, 保留期望签名与启用开关
    pub fn reset(&mut self) {
        self.context = md5::Context::new();
        self.tainted = false;
        self.status = Md5Status::NotChecked;
    }

    pub fn status(&self) -> Md5Status {
        self.status
    }
}
