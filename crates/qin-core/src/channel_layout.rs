//! 声道布局.
//!
//! FLAC 没有显式的声道掩码, 声道数隐含一个固定的扬声器顺序 (RFC 9639 §9.1.3).

use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// 扬声器位置掩码
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChannelMask: u32 {
        const FRONT_LEFT    = 1 << 0;
        const FRONT_RIGHT   = 1 << 1;
        const FRONT_CENTER  = 1 << 2;
        /// 低频效果 (LFE)
        const LOW_FREQUENCY = 1 << 3;
        const BACK_LEFT     = 1 << 4;
        const BACK_RIGHT    = 1 << 5;
        const BACK_CENTER   = 1 << 8;
        const SIDE_LEFT     = 1 << 9;
        const SIDE_RIGHT    = 1 << 10;
    }
}

use ChannelMask as M;

/// 1-8 声道的 FLAC 默认声道顺序
const FLAC_ORDERS: [&[ChannelMask]; 8] = [
    &[M::FRONT_CENTER],
    &[M::FRONT_LEFT, M::FRONT_RIGHT],
    &[M::FRONT_LEFT, M::FRONT_RIGHT, M::FRONT_CENTER],
    &[M::FRONT_LEFT, M::FRONT_RIGHT, M::BACK_LEFT, M::BACK_RIGHT],
    &[M::FRONT_LEFT, M::FRONT_RIGHT, M::FRONT_CENTER, M::BACK_LEFT, M::BACK_RIGHT],
    &[
        M::FRONT_LEFT,
        M::FRONT_RIGHT,
        M::FRONT_CENTER,
        M::LOW_FREQUENCY,
        M::BACK_LEFT,
        M::BACK_RIGHT,
    ],
    &[
        M::FRONT_LEFT,
        M::FRONT_RIGHT,
        M::FRONT_CENTER,
        M::LOW_FREQUENCY,
        M::BACK_CENTER,
        M::SIDE_LEFT,
        M::SIDE_RIGHT,
    ],
    &[
        M::FRONT_LEFT,
        M::FRONT_RIGHT,
        M::FRONT_CENTER,
        M::LOW_FREQUENCY,
        M::BACK_LEFT,
        M::BACK_RIGHT,
        M::SIDE_LEFT,
        M::SIDE_RIGHT,
    ],
];

/// 声道布局: 声道数 + 扬声器掩码
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    pub channels: u32,
    pub mask: ChannelMask,
}

impl ChannelLayout {
    pub const MONO: Self = Self {
        channels: 1,
        mask: M::FRONT_CENTER,
    };

    pub const STEREO: Self = Self {
        channels: 2,
        mask: M::FRONT_LEFT.union(M::FRONT_RIGHT),
    };

    /// 按 FLAC 默认顺序构造 1-8 声道布局, 其余声道数返回 `None`
    pub fn from_flac_channels(channels: u32) -> Option<Self> {
        let order = FLAC_ORDERS.get((channels as usize).checked_sub(1)?)?;
        let mask = order.iter().fold(M::empty(), |acc, &m| acc | m);
        Some(Self { channels, mask })
    }

    /// 交织数据中各声道对应的扬声器, 按码流顺序
    pub fn speaker_order(&self) -> &'static [ChannelMask] {
        (self.channels as usize)
            .checked_sub(1)
            .and_then(|i| FLAC_ORDERS.get(i))
            .copied()
            .unwrap_or(&[])
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.channels {
            1 => write!(f, "mono"),
            2 => write!(f, "stereo"),
            6 if self.mask.contains(M::LOW_FREQUENCY) => write!(f, "5.1"),
            8 if self.mask.contains(M::LOW_FREQUENCY) => write!(f, "7.1"),
            n => write!(f, "{n}ch"),
        }
    }
}
