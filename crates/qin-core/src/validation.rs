//! 输入校验与溢出防护.
//!
//! 无状态的纯函数集合, 对码流中解出的原始字段做范围、溢出和 RFC 9639 约束检查.
//! 所有解析组件在信任一个字段之前都必须先经过这里的检查, 这是抵御损坏或恶意输入的第一道防线.
//!
//! 约定: 校验函数只返回判定结果, 不报错, 不打日志; 溢出辅助函数返回 `Option`, 溢出时为 `None`.

/// 最大块大小 (每声道采样数), 65536 被 RFC 明确禁止
pub const MAX_BLOCK_SIZE: u32 = 65535;
/// 最小块大小 (最后一帧除外)
pub const MIN_BLOCK_SIZE: u32 = 16;
/// 最大 Rice 分区阶数
pub const MAX_PARTITION_ORDER: u32 = 15;
/// 最大 LPC 阶数
pub const MAX_LPC_ORDER: u32 = 32;
/// 最大 Fixed 预测阶数
pub const MAX_FIXED_ORDER: u32 = 4;
/// 最大声道数
pub const MAX_CHANNELS: u32 = 8;
/// 最小位深
pub const MIN_BIT_DEPTH: u32 = 4;
/// 最大位深
pub const MAX_BIT_DEPTH: u32 = 32;
/// 最大采样率 (20 位字段)
pub const MAX_SAMPLE_RATE: u32 = 1_048_575;
/// 一元码上限, 超过视为恶意码流
pub const MAX_UNARY_VALUE: u32 = 1_000_000;
/// 同步码搜索上限 (字节)
pub const MAX_SYNC_SEARCH_BYTES: usize = 1_048_576;
/// 元数据块最大长度 (24 位字段)
pub const MAX_METADATA_BLOCK_LENGTH: u32 = 16_777_215;

// ============================================================
// 边界与溢出
// ============================================================

/// 检查 `[offset, offset + count)` 是否落在长度为 `buffer_len` 的缓冲区内
pub fn check_buffer_bounds(buffer_len: usize, offset: usize, count: usize) -> bool {
    offset <= buffer_len && count <= buffer_len - offset
}

/// 无回绕乘法, 溢出返回 `None`
///
/// 采样号与字节偏移都以 u64 计.
pub fn check_multiply_overflow(a: u64, b: u64) -> Option<u64> {
    a.checked_mul(b)
}

/// 无回绕加法, 溢出返回 `None`
pub fn check_add_overflow(a: u64, b: u64) -> Option<u64> {
    a.checked_add(b)
}

/// 无丢位左移
///
/// 移位量 >= 32 或有效位被移出时返回 `None`.
pub fn check_shift_overflow(value: u32, shift: u32) -> Option<u32> {
    if shift >= 32 || value > (u32::MAX >> shift) {
        return None;
    }
    Some(value << shift)
}

// ============================================================
// 流参数
// ============================================================

/// 校验块大小
///
/// `allow_small` 为 true 时允许小于 16 的块 (流的最后一帧).
pub fn validate_block_size(block_size: u32, allow_small: bool) -> bool {
    if block_size == 0 || block_size > MAX_BLOCK_SIZE {
        return false;
    }
    allow_small || block_size >= MIN_BLOCK_SIZE
}

/// 校验采样率, 0 表示沿用 STREAMINFO
pub fn validate_sample_rate(sample_rate: u32) -> bool {
    sample_rate <= MAX_SAMPLE_RATE
}

/// 校验位深, 0 表示沿用 STREAMINFO
pub fn validate_bit_depth(bit_depth: u32) -> bool {
    bit_depth == 0 || (MIN_BIT_DEPTH..=MAX_BIT_DEPTH).contains(&bit_depth)
}

/// 校验声道数
pub fn validate_channel_count(channels: u32) -> bool {
    (1..=MAX_CHANNELS).contains(&channels)
}

/// 校验 STREAMINFO 中的最小/最大块大小
pub fn validate_stream_info_block_sizes(min_block_size: u32, max_block_size: u32) -> bool {
    min_block_size >= MIN_BLOCK_SIZE
        && max_block_size >= MIN_BLOCK_SIZE
        && min_block_size <= max_block_size
        && max_block_size <= MAX_BLOCK_SIZE
}

/// 校验元数据块长度
pub fn validate_metadata_block_length(length: u32) -> bool {
    length <= MAX_METADATA_BLOCK_LENGTH
}

// ============================================================
// 子帧与残差
// ============================================================

/// 校验 Rice 分区阶数
///
/// 块大小必须能被分区数整除, 且每个分区的采样数必须大于预测阶数.
pub fn validate_partition_order(partition_order: u32, block_size: u32, predictor_order: u32) -> bool {
    if partition_order > MAX_PARTITION_ORDER {
        return false;
    }
    let partition_count = 1u32 << partition_order;
    if block_size % partition_count != 0 {
        return false;
    }
    (block_size >> partition_order) > predictor_order
}

/// 校验 LPC 阶数 (1-32, 且小于块大小)
pub fn validate_lpc_order(order: u32, block_size: u32) -> bool {
    (1..=MAX_LPC_ORDER).contains(&order) && order < block_size
}

/// 校验 Fixed 预测阶数 (0-4, 且小于块大小)
pub fn validate_fixed_order(order: u32, block_size: u32) -> bool {
    order <= MAX_FIXED_ORDER && order < block_size
}

/// 校验采样值是否落在 N 位有符号范围 `[-2^(N-1), 2^(N-1)-1]` 内
///
/// N 最大为 33 (32 位流的 side 声道).
pub fn validate_sample_value(sample: i64, bit_depth: u32) -> bool {
    if bit_depth == 0 || bit_depth > MAX_BIT_DEPTH + 1 {
        return false;
    }
    let max = (1i64 << (bit_depth - 1)) - 1;
    let min = -(1i64 << (bit_depth - 1));
    (min..=max).contains(&sample)
}

/// 校验残差值: 必须落在 32 位有符号范围内, 且不能是 `i32::MIN`
pub fn validate_residual_value(residual: i64) -> bool {
    residual > i64::from(i32::MIN) && residual <= i64::from(i32::MAX)
}

/// 采样率编码 0b1111 为禁用值, 返回 true 表示允许
pub fn check_forbidden_sample_rate_bits(sample_rate_bits: u32) -> bool {
    sample_rate_bits != 0b1111
}

/// LPC 系数精度编码 0b1111 为禁用值, 返回 true 表示允许
pub fn check_forbidden_predictor_precision(precision_bits: u32) -> bool {
    precision_bits != 0b1111
}

/// 校验 LPC 量化移位 (0-31, 负数禁用)
pub fn validate_predictor_shift(shift: i32) -> bool {
    (0..=31).contains(&shift)
}

/// 校验 wasted bits: 必须严格小于位深
pub fn validate_wasted_bits(wasted_bits: u32, bit_depth: u32) -> bool {
    wasted_bits == 0 || wasted_bits < bit_depth
}
