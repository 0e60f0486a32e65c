//! # qin-core
//!
//! Qin 音频核心库: 错误类型、位级读写、CRC 与码流字段校验.
//!
//! 这些组件不依赖具体编解码器, 由 `qin-codec` 中的 FLAC 解码器在每一层复用.

pub mod bitreader;
pub mod bitwriter;
pub mod channel_layout;
pub mod crc;
pub mod error;
pub mod validation;

pub use bitreader::BitReader;
pub use channel_layout::{ChannelLayout, ChannelMask};
pub use error::{QinError, QinResult};
