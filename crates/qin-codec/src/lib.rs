//! # qin-codec
//!
//! Qin 音频解码库: 数据块与音频帧抽象, 解码器 trait, 以及原生 FLAC 解码器.
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use qin_codec::flac::{FlacCodec, parse_stream_header};
//! use qin_codec::{AudioCodec, MediaChunk};
//!
//! # fn run(stream: &[u8], frames: Vec<Vec<u8>>) -> qin_core::QinResult<()> {
//! let metadata = parse_stream_header(stream)?;
//! let codec = FlacCodec::new();
//! codec.set_metadata(&metadata)?;
//! codec.initialize()?;
//! for frame in frames {
//!     let pcm = codec.decode(&MediaChunk::new(frame))?;
//!     println!("{} 个采样", pcm.samples.len());
//! }
//! codec.flush()?;
//! # Ok(())
//! # }
//! ```

pub mod chunk;
pub mod codec;
pub mod codec_id;
pub mod codec_parameters;
pub mod config;
pub mod flac;
pub mod frame;

// 重导出常用类型
pub use chunk::MediaChunk;
pub use codec::AudioCodec;
pub use codec_id::CodecId;
pub use codec_parameters::CodecParameters;
pub use config::{CrcPolicy, FlacDecoderConfig};
pub use frame::AudioFrame;
