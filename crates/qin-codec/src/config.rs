//! FLAC 解码器配置.
//!
//! 所有字段都有默认值, 可以只给出需要覆盖的部分:
//!
//! ```
//! use qin_codec::config::{CrcPolicy, FlacDecoderConfig};
//!
//! let cfg = FlacDecoderConfig::from_json_str(r#"{ "crc_policy": "discard" }"#).unwrap();
//! assert_eq!(cfg.crc_policy, CrcPolicy::Discard);
//! assert_eq!(cfg.max_consecutive_errors, 10);
//! ```

use qin_core::validation::MAX_SYNC_SEARCH_BYTES;
use qin_core::{QinError, QinResult};
use serde::{Deserialize, Serialize};

/// 帧 CRC-16 校验失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrcPolicy {
    /// 记录并继续使用解出的数据 (RFC 9639 允许)
    #[default]
    Accept,
    /// 丢弃整帧, 本次解码返回空帧
    Discard,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FlacDecoderConfig {
    /// 是否在流结束时比对 STREAMINFO 中的 MD5
    #[serde(default)]
    pub md5_validation: bool,
    #[serde(default)]
    pub crc_policy: CrcPolicy,
    /// 连续失败超过此值后进入 DecoderError
    #[serde(default = "default_max_consecutive_errors")]
    pub max_consecutive_errors: u32,
    /// 同步码搜索上限 (字节), 超出全局上限时按全局上限处理
    #[serde(default = "default_max_sync_search_bytes")]
    pub max_sync_search_bytes: usize,
    /// 拒绝不属于 streamable subset 的帧
    #[serde(default)]
    pub strict_subset: bool,
}

fn default_max_consecutive_errors() -> u32 {
    10
}

fn default_max_sync_search_bytes() -> usize {
    MAX_SYNC_SEARCH_BYTES
}

impl Default for FlacDecoderConfig {
    fn default() -> Self {
        Self {
            md5_validation: false,
            crc_policy: CrcPolicy::default(),
            max_consecutive_errors: default_max_consecutive_errors(),
            max_sync_search_bytes: default_max_sync_search_bytes(),
            strict_subset: false,
        }
    }
}

impl FlacDecoderConfig {
    /// 从 JSON 文本加载配置
    pub fn from_json_str(text: &str) -> QinResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| QinError::InvalidArgument(format!("解码器配置解析失败: {e}")))
    }

    /// 实际生效的同步码搜索上限
    pub fn sync_search_limit(&self) -> usize {
        self.max_sync_search_bytes.min(MAX_SYNC_SEARCH_BYTES)
    }
}
