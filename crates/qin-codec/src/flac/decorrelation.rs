//! 立体声去相关.
//!
//! 声道分配编码 0-7 为独立声道 (1-8 声道); 8/9/10 为双声道的 left-side / right-side / mid-side.
//! side 声道比帧位深多 1 位. 运算在 i64 中进行, 结果不在 32 位范围内时报错.

use super::error::FlacError;

/// 声道分配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelAssignment {
    /// 独立声道, 参数为声道数
    Independent(u32),
    /// ch0 = left, ch1 = side
    LeftSide,
    /// ch0 = side, ch1 = right
    RightSide,
    /// ch0 = mid, ch1 = side
    MidSide,
}

impl ChannelAssignment {
    /// 从 4 位帧头字段解析, 11-15 为保留值
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0..=7 => Some(Self::Independent(code + 1)),
            8 => Some(Self::LeftSide),
            9 => Some(Self::RightSide),
            10 => Some(Self::MidSide),
            _ => None,
        }
    }

    pub fn channels(self) -> u32 {
        match self {
            Self::Independent(n) => n,
            _ => 2,
        }
    }

    /// side 声道所在的子帧序号
    pub fn side_channel(self) -> Option<usize> {
        match self {
            Self::Independent(_) => None,
            Self::LeftSide | Self::MidSide => Some(1),
            Self::RightSide => Some(0),
        }
    }

    pub fn is_decorrelated(self) -> bool {
        !matches!(self, Self::Independent(_))
    }
}

fn narrow(value: i64) -> Result<i32, FlacError> {
    i32::try_from(value)
        .map_err(|_| FlacError::InvalidSubframe(format!("去相关结果超出 32 位: {value}")))
}

/// 把两路子帧还原为左右声道, 结果写回 `ch0` (左) 和 `ch1` (右)
pub fn decorrelate(
    assignment: ChannelAssignment,
    ch0: &mut [i32],
    ch1: &mut [i32],
) -> Result<(), FlacError> {
    match assignment {
        ChannelAssignment::Independent(_) => {}
        ChannelAssignment::LeftSide => {
            for (left, side) in ch0.iter().zip(ch1.iter_mut()) {
                *side = narrow(i64::from(*left) - i64::from(*side))?;
            }
        }
        ChannelAssignment::RightSide => {
            for (side, right) in ch0.iter_mut().zip(ch1.iter()) {
                *side = narrow(i64::from(*side) + i64::from(*right))?;
            }
        }
        ChannelAssignment::MidSide => {
            // 编码端 mid = (l + r) >> 1 丢掉的最低位与 side 的最低位相同
            for (mid, side) in ch0.iter_mut().zip(ch1.iter_mut()) {
                let s = i64::from(*side);
                let m = (i64::from(*mid) << 1) | (s & 1);
                *mid = narrow((m + s) >> 1)?;
                *side = narrow((m - s) >> 1)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode_mid_side(l: i32, r: i32) -> (i32, i32) {
        ((l + r) >> 1, l - r)
    }

    #[test]
    fn test_assignment_codes() {
        assert_eq!(ChannelAssignment::from_code(0), Some(ChannelAssignment::Independent(1)));
        assert_eq!(ChannelAssignment::from_code(7), Some(ChannelAssignment::Independent(8)));
        assert_eq!(ChannelAssignment::from_code(10), Some(ChannelAssignment::MidSide));
        for code in 11..16 {
            assert!(ChannelAssignment::from_code(code).is_none());
        }
        assert_eq!(ChannelAssignment::RightSide.side_channel(), Some(0));
        assert_eq!(ChannelAssignment::MidSide.channels(), 2);
    }

    #[test]
    fn test_left_and_right_side() {
        let mut a = vec![100, -5, 0];
        let mut b = vec![30, -10, -32768];
        decorrelate(ChannelAssignment::LeftSide, &mut a, &mut b).unwrap();
        assert_eq!(a, vec![100, -5, 0]);
        assert_eq!(b, vec![70, 5, 32768]);

        let mut side = vec![70, 5];
        let mut right = vec![30, -10];
        decorrelate(ChannelAssignment::RightSide, &mut side, &mut right).unwrap();
        assert_eq!(side, vec![100, -5]);
        assert_eq!(right, vec![30, -10]);
    }

    #[test]
    fn test_mid_side_bit_exact() {
        let pairs = [
            (0, 0),
            (1, 0),
            (0, 1),
            (-1, 0),
            (3, -4),
            (-7, 8),
            (32767, -32768),
            (-32768, 32767),
            (8_388_607, -8_388_608),
        ];
        for (l, r) in pairs {
            let (m, s) = encode_mid_side(l, r);
            let mut mid = vec![m];
            let mut side = vec![s];
            decorrelate(ChannelAssignment::MidSide, &mut mid, &mut side).unwrap();
            assert_eq!((mid[0], side[0]), (l, r), "l={l} r={r}");
        }
    }

    #[test]
    fn test_overflow_is_reported() {
        let mut left = vec![i32::MAX];
        let mut side = vec![-1];
        assert!(decorrelate(ChannelAssignment::LeftSide, &mut left, &mut side).is_err());
    }
}
