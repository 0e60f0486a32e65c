//! 压缩数据块 (MediaChunk).
//!
//! 外部解复用器每次交给解码器一块压缩数据; 对 FLAC 而言恰好是一个完整帧.
//! 帧的采样序号与字节位置都从帧头推出, 数据块本身不携带时间信息.

use bytes::Bytes;

/// 压缩数据块
#[derive(Debug, Clone, Default)]
pub struct MediaChunk {
    /// 压缩数据
    pub data: Bytes,
}

impl MediaChunk {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self { data: data.into() }
    }

    /// 数据大小 (字节)
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
