//! 解码器状态机.
//!
//! ```text
//! Uninitialized -> Initialized            initialize
//! Initialized   -> Decoding               首帧解码成功
//! Decoding      -> EndOfStream            到达总采样数 / flush
//! Initialized | Decoding -> DecoderError  连续失败超过上限
//! Decoding | EndOfStream -> Initialized   reset
//! DecoderError  -> Uninitialized          reset
//! ```
//!
//! 所有转换都经过 [`DecoderState::transition`], 非法转换返回错误而不是被忽略.

use std::fmt;

use super::error::FlacError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DecoderState {
    #[default]
    Uninitialized,
    Initialized,
    Decoding,
    /// 连续失败过多, 必须 reset 后才能继续使用
    DecoderError,
    EndOfStream,
}

impl DecoderState {
    /// 判断转换是否合法; 原地转换总是合法 (空操作)
    pub fn can_transition_to(self, next: DecoderState) -> bool {
        use DecoderState::*;
        if self == next {
            return true;
        }
        matches!(
            (self, next),
            (Uninitialized, Initialized)
                | (Initialized, Decoding)
                | (Initialized, DecoderError)
                | (Initialized, Uninitialized)
                | (Decoding, DecoderError)
                | (Decoding, EndOfStream)
                | (Decoding, Initialized)
                | (DecoderError, Uninitialized)
                | (EndOfStream, Initialized)
        )
    }

    /// 执行状态转换
    pub fn transition(&mut self, next: DecoderState) -> Result<(), FlacError> {
        if !self.can_transition_to(next) {
            return Err(FlacError::InvalidStateTransition { from: *self, to: next });
        }
        *self = next;
        Ok(())
    }

    /// 是否可以接受 decode 调用
    pub fn accepts_data(self) -> bool {
        matches!(self, Self::Initialized | Self::Decoding)
    }

    /// reset 后应进入的状态
    pub fn reset_target(self) -> DecoderState {
        match self {
            Self::DecoderError | Self::Uninitialized => Self::Uninitialized,
            _ => Self::Initialized,
        }
    }
}

impl fmt::Display for DecoderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "UNINITIALIZED",
            Self::Initialized => "INITIALIZED",
            Self::Decoding => "DECODING",
            Self::DecoderError => "DECODER_ERROR",
            Self::EndOfStream => "END_OF_STREAM",
        };
        f.write_str(name)
    }
}
