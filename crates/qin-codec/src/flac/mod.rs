//! 原生 FLAC 解码器 (RFC 9639).
//!
//! 解码数据流:
//!
//! ```text
//! MediaChunk -> BitReader -> FrameParser (帧头 + CRC-8)
//!            -> 子帧 x 声道 (FIXED/LPC 经残差解码)
//!            -> 立体声去相关 -> 位深转换与交织 -> AudioFrame
//! ```
//!
//! 元数据 (STREAMINFO, SEEKTABLE 等) 在流打开时由 [`metadata::parse_stream_header`]
//! 解析一次, 再通过 [`FlacCodec::set_metadata`] 注入解码器.

pub mod codec;
pub mod decorrelation;
pub mod error;
pub mod frame_header;
pub mod md5;
pub mod metadata;
pub mod pipeline;
pub mod reconstruct;
pub mod residual;
pub mod state;
pub mod stats;
pub mod subframe;

#[cfg(test)]
pub(crate) mod testutil;

pub use codec::{FlacCodec, SeekPosition};
pub use error::{FlacError, FlacErrorKind};
pub use frame_header::{FrameFooter, FrameHeader, FrameParser};
pub use md5::Md5Status;
pub use metadata::{FlacMetadata, SeekPoint, SeekTable, StreamInfo, parse_stream_header};
pub use state::DecoderState;
pub use stats::FlacCodecStats;
