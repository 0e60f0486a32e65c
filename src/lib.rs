//! # Qin (琴)
//!
//! 纯 Rust 实现的音频播放器核心, 内置 RFC 9639 FLAC 解码器.
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use qin::codec::flac::{FlacCodec, parse_stream_header};
//! use qin::codec::{AudioCodec, MediaChunk};
//!
//! # fn run(stream: &[u8], first_frame: Vec<u8>) -> qin::core::QinResult<()> {
//! let metadata = parse_stream_header(stream)?;
//! let codec = FlacCodec::new();
//! codec.set_metadata(&metadata)?;
//! codec.initialize()?;
//! let pcm = codec.decode(&MediaChunk::new(first_frame))?;
//! println!("{} Hz, {} 声道", pcm.sample_rate, pcm.channels);
//! # Ok(())
//! # }
//! ```
//!
//! # Crate 结构
//!
//! | Crate | 功能 |
//! |-------|------|
//! | `qin-core` | 错误类型, 位级读写, CRC, 码流字段校验 |
//! | `qin-codec` | 数据块/音频帧抽象, 解码器 trait, FLAC 解码器 |

/// 核心类型与工具
pub use qin_core as core;

/// 音频解码
pub use qin_codec as codec;

/// 日志系统 (控制台 + 按天滚动的日志文件)
pub mod logging;

/// 获取 Qin 版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
