//! FLAC 解码错误.

use qin_core::QinError;
use thiserror::Error;

use super::state::DecoderState;

/// FLAC 解码过程中的类型化错误
///
/// 与 [`QinError`] 双向转换: 底层读取错误进入 FLAC 流水线, 对外接口再统一为 `QinError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlacError {
    #[error("未找到帧同步码")]
    SyncNotFound,

    #[error("无效帧头: {0}")]
    InvalidFrameHeader(String),

    #[error("帧头 CRC-8 不匹配: 读取=0x{stored:02X}, 计算=0x{computed:02X}")]
    HeaderCrcMismatch { stored: u8, computed: u8 },

    #[error("帧 CRC-16 不匹配: 读取=0x{stored:04X}, 计算=0x{computed:04X}")]
    FrameCrcMismatch { stored: u16, computed: u16 },

    #[error("无效子帧: {0}")]
    InvalidSubframe(String),

    #[error("无效残差: {0}")]
    InvalidResidual(String),

    #[error("无效元数据: {0}")]
    InvalidMetadata(String),

    #[error("比特流错误: {0}")]
    Bitstream(String),

    #[error("数据不足, 帧被截断")]
    UnexpectedEof,

    #[error("非法状态转换: {from} -> {to}")]
    InvalidStateTransition { from: DecoderState, to: DecoderState },

    #[error("内存分配失败: {0}")]
    OutOfMemory(String),
}

/// 错误大类, 用于统计计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlacErrorKind {
    Sync,
    Header,
    Crc,
    Subframe,
    Metadata,
    Memory,
    State,
}

impl FlacError {
    pub fn kind(&self) -> FlacErrorKind {
        match self {
            Self::SyncNotFound => FlacErrorKind::Sync,
            Self::InvalidFrameHeader(_) | Self::HeaderCrcMismatch { .. } => FlacErrorKind::Header,
            Self::FrameCrcMismatch { .. } => FlacErrorKind::Crc,
            Self::InvalidSubframe(_)
            | Self::InvalidResidual(_)
            | Self::Bitstream(_)
            | Self::UnexpectedEof => FlacErrorKind::Subframe,
            Self::InvalidMetadata(_) => FlacErrorKind::Metadata,
            Self::OutOfMemory(_) => FlacErrorKind::Memory,
            Self::InvalidStateTransition { .. } => FlacErrorKind::State,
        }
    }
}

impl From<QinError> for FlacError {
    fn from(err: QinError) -> Self {
        match err {
            QinError::Eof => Self::UnexpectedEof,
            QinError::OutOfMemory(msg) => Self::OutOfMemory(msg),
            other => Self::Bitstream(other.to_string()),
        }
    }
}

impl From<FlacError> for QinError {
    fn from(err: FlacError) -> Self {
        match err {
            FlacError::UnexpectedEof => QinError::Eof,
            FlacError::OutOfMemory(msg) => QinError::OutOfMemory(msg),
            e @ FlacError::InvalidStateTransition { .. } => QinError::InvalidState(e.to_string()),
            other => QinError::InvalidData(other.to_string()),
        }
    }
}
