//! 集成测试公共工具: 在进程内生成 FLAC 码流.
//!
//! 编码器只追求覆盖解码路径 (CONSTANT / VERBATIM / FIXED / LPC 子帧, 分区 Rice
//! 与逃逸分区, wasted bits, 三种立体声去相关), 不追求压缩率.

#![allow(dead_code)]

use qin::codec::flac::{FlacCodec, parse_stream_header};
use qin::codec::{AudioCodec, MediaChunk};
use qin::core::bitwriter::BitWriter;
use qin::core::crc;

/// 子帧编码方式
#[derive(Debug, Clone, PartialEq)]
pub enum SubframeMode {
    /// 全部相同时用 CONSTANT, 否则用 FIXED 2 阶
    Auto,
    Verbatim,
    Fixed(u32),
    /// 量化系数 (低阶在前), 系数精度与右移位数
    Lpc { coefs: Vec<i32>, precision: u32, shift: u32 },
}

/// 双声道的声道分配
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StereoMode {
    Independent,
    LeftSide,
    RightSide,
    MidSide,
}

#[derive(Debug, Clone)]
pub struct EncoderOptions {
    pub sample_rate: u32,
    pub bits_per_sample: u32,
    pub block_size: usize,
    pub subframe: SubframeMode,
    pub stereo: StereoMode,
    pub partition_order: u32,
    /// 每个分区都用逃逸码 (原始位宽) 存储
    pub escape_partitions: bool,
    /// 自动检测并剥离公共的低位 0
    pub detect_wasted_bits: bool,
    pub variable_blocking: bool,
    /// 每隔多少帧写一个 seek 点, 0 表示不写 SEEKTABLE
    pub seek_point_interval: usize,
    pub write_md5: bool,
    pub vorbis_fields: Vec<(String, String)>,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            sample_rate: 44100,
            bits_per_sample: 16,
            block_size: 1152,
            subframe: SubframeMode::Auto,
            stereo: StereoMode::Independent,
            partition_order: 0,
            escape_partitions: false,
            detect_wasted_bits: false,
            variable_blocking: false,
            seek_point_interval: 0,
            write_md5: true,
            vorbis_fields: Vec::new(),
        }
    }
}

/// 生成的码流
#[derive(Debug, Clone)]
pub struct EncodedStream {
    /// 完整文件内容 (`fLaC` + 元数据 + 帧)
    pub bytes: Vec<u8>,
    /// 首帧在 `bytes` 中的偏移
    pub audio_offset: usize,
    /// 各帧的原始字节
    pub frames: Vec<Vec<u8>>,
    /// 各帧首采样号
    pub frame_first_samples: Vec<u64>,
    pub md5: [u8; 16],
}

impl EncodedStream {
    pub fn chunks(&self) -> Vec<MediaChunk> {
        self.frames
            .iter()
            .map(|f| MediaChunk::new(f.clone()))
            .collect()
    }
}

// ============================================================
// 测试信号
// ============================================================

/// 确定性伪随机数 (LCG)
pub struct Lcg(u64);

impl Lcg {
    pub fn new(seed: u64) -> Self {
        Self(seed)
    }

    pub fn next_u32(&mut self) -> u32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 33) as u32
    }

    /// [-range, range] 内的整数
    pub fn next_in(&mut self, range: i32) -> i32 {
        let span = (range as u32) * 2 + 1;
        (self.next_u32() % span) as i32 - range
    }
}

/// 正弦波 + 少量噪声, 幅度不超过 `bits` 位的范围
pub fn test_signal(len: usize, bits: u32, freq: f64, sample_rate: u32, seed: u64) -> Vec<i32> {
    let max = ((1i64 << (bits - 1)) - 1) as f64;
    let mut rng = Lcg::new(seed);
    (0..len)
        .map(|i| {
            let t = i as f64 / f64::from(sample_rate);
            let v = (t * freq * std::f64::consts::TAU).sin() * max * 0.6;
            let noise = rng.next_in((max * 0.01).max(1.0) as i32);
            (v as i32 + noise).clamp(-(max as i32) - 1, max as i32)
        })
        .collect()
}

// ============================================================
// 编码
// ============================================================

fn block_size_code(bs: usize) -> (u32, Option<(u32, u32)>) {
    match bs {
        192 => (1, None),
        576 | 1152 | 2304 | 4608 => (2 + (bs / 576).trailing_zeros(), None),
        256 | 512 | 1024 | 2048 | 4096 | 8192 | 16384 | 32768 => {
            (8 + (bs / 256).trailing_zeros(), None)
        }
        1..=256 => (6, Some((bs as u32 - 1, 8))),
        _ => (7, Some((bs as u32 - 1, 16))),
    }
}

fn sample_rate_code(rate: u32) -> (u32, Option<(u32, u32)>) {
    const TABLE: [u32; 12] = [
        0, 88200, 176400, 192000, 8000, 16000, 22050, 24000, 32000, 44100, 48000, 96000,
    ];
    if let Some(code) = TABLE.iter().skip(1).position(|&r| r == rate) {
        return (code as u32 + 1, None);
    }
    if rate % 1000 == 0 && rate / 1000 <= 255 {
        (12, Some((rate / 1000, 8)))
    } else if rate <= 65535 {
        (13, Some((rate, 16)))
    } else {
        (14, Some((rate / 10, 16)))
    }
}

fn sample_size_code(bits: u32) -> u32 {
    match bits {
        8 => 1,
        12 => 2,
        16 => 4,
        20 => 5,
        24 => 6,
        32 => 7,
        _ => 0,
    }
}

fn rice_parameter(residuals: &[i64]) -> u32 {
    if residuals.is_empty() {
        return 0;
    }
    let mean = residuals.iter().map(|r| r.unsigned_abs()).sum::<u64>() / residuals.len() as u64;
    (64 - mean.leading_zeros()).min(14)
}

fn write_residual(bw: &mut BitWriter, residuals: &[i64], block_size: usize, order: usize, opts: &EncoderOptions) {
    let mut partition_order = opts.partition_order;
    while partition_order > 0
        && (block_size % (1 << partition_order) != 0 || (block_size >> partition_order) <= order)
    {
        partition_order -= 1;
    }
    bw.write_bits(0, 2);
    bw.write_bits(partition_order, 4);

    let partition_len = block_size >> partition_order;
    let mut start = 0;
    for p in 0..(1usize << partition_order) {
        let len = if p == 0 { partition_len - order } else { partition_len };
        let part = &residuals[start..start + len];
        start += len;
        if opts.escape_partitions {
            let width = part
                .iter()
                .map(|&r| 65 - (r ^ (r >> 63)).leading_zeros())
                .max()
                .unwrap_or(0);
            bw.write_bits(15, 4);
            bw.write_bits(width, 5);
            if width > 0 {
                for &r in part {
                    bw.write_signed(r, width);
                }
            }
        } else {
            let k = rice_parameter(part);
            bw.write_bits(k, 4);
            for &r in part {
                bw.write_rice(r as i32, k);
            }
        }
    }
}

fn fixed_residuals(samples: &[i64], order: usize) -> Vec<i64> {
    (order..samples.len())
        .map(|i| {
            let s = |k: usize| samples[i - k];
            let predicted = match order {
                0 => 0,
                1 => s(1),
                2 => 2 * s(1) - s(2),
                3 => 3 * s(1) - 3 * s(2) + s(3),
                _ => 4 * s(1) - 6 * s(2) + 4 * s(3) - s(4),
            };
            samples[i] - predicted
        })
        .collect()
}

fn lpc_residuals(samples: &[i64], coefs: &[i32], shift: u32) -> Vec<i64> {
    let order = coefs.len();
    (order..samples.len())
        .map(|i| {
            let sum: i64 = coefs
                .iter()
                .enumerate()
                .map(|(j, &c)| i64::from(c) * samples[i - 1 - j])
                .sum();
            samples[i] - (sum >> shift)
        })
        .collect()
}

fn write_type(bw: &mut BitWriter, code: u32, wasted: u32) {
    bw.write_bits(0, 1);
    bw.write_bits(code, 6);
    if wasted > 0 {
        bw.write_bits(1, 1);
        bw.write_unary(wasted - 1);
    } else {
        bw.write_bits(0, 1);
    }
}

fn write_subframe(bw: &mut BitWriter, raw: &[i64], bits: u32, opts: &EncoderOptions) {
    let wasted = if opts.detect_wasted_bits && raw.iter().any(|&s| s != 0) {
        raw.iter()
            .filter(|&&s| s != 0)
            .map(|s| s.trailing_zeros())
            .min()
            .unwrap_or(0)
            .min(bits - 1)
    } else {
        0
    };
    let samples: Vec<i64> = raw.iter().map(|&s| s >> wasted).collect();
    let bits = bits - wasted;
    let block_size = samples.len();

    let mode = match &opts.subframe {
        SubframeMode::Auto if samples.iter().all(|&s| s == samples[0]) => None,
        SubframeMode::Auto => Some(SubframeMode::Fixed(2.min(block_size as u32 - 1))),
        other => Some(other.clone()),
    };

    match mode {
        None => {
            write_type(bw, 0, wasted);
            bw.write_signed(samples[0], bits);
        }
        Some(SubframeMode::Verbatim) | Some(SubframeMode::Auto) => {
            write_type(bw, 1, wasted);
            for &s in &samples {
                bw.write_signed(s, bits);
            }
        }
        Some(SubframeMode::Fixed(order)) => {
            let order = order as usize;
            write_type(bw, 8 + order as u32, wasted);
            for &s in &samples[..order] {
                bw.write_signed(s, bits);
            }
            write_residual(bw, &fixed_residuals(&samples, order), block_size, order, opts);
        }
        Some(SubframeMode::Lpc { coefs, precision, shift }) => {
            let order = coefs.len();
            write_type(bw, 31 + order as u32, wasted);
            for &s in &samples[..order] {
                bw.write_signed(s, bits);
            }
            bw.write_bits(precision - 1, 4);
            bw.write_signed(i64::from(shift), 5);
            for &c in &coefs {
                bw.write_signed(i64::from(c), precision);
            }
            write_residual(bw, &lpc_residuals(&samples, &coefs, shift), block_size, order, opts);
        }
    }
}

fn write_frame(planes: &[&[i32]], number: u64, opts: &EncoderOptions) -> Vec<u8> {
    let channels = planes.len();
    let block_size = planes[0].len();
    let bits = opts.bits_per_sample;
    let stereo = if channels == 2 { opts.stereo } else { StereoMode::Independent };

    let mut bw = BitWriter::new();
    bw.write_bits(0x3FFE, 14);
    bw.write_bits(0, 1);
    bw.write_bits(u32::from(opts.variable_blocking), 1);
    let (bs_code, bs_extra) = block_size_code(block_size);
    let (sr_code, sr_extra) = sample_rate_code(opts.sample_rate);
    bw.write_bits(bs_code, 4);
    bw.write_bits(sr_code, 4);
    let ch_code = match stereo {
        StereoMode::Independent => channels as u32 - 1,
        StereoMode::LeftSide => 8,
        StereoMode::RightSide => 9,
        StereoMode::MidSide => 10,
    };
    bw.write_bits(ch_code, 4);
    bw.write_bits(sample_size_code(bits), 3);
    bw.write_bits(0, 1);
    bw.write_utf8(number);
    if let Some((v, n)) = bs_extra {
        bw.write_bits(v, n);
    }
    if let Some((v, n)) = sr_extra {
        bw.write_bits(v, n);
    }
    let header = bw.bytes().to_vec();
    bw.write_bits(u32::from(crc::crc8(&header)), 8);

    let wide: Vec<Vec<i64>> = planes
        .iter()
        .map(|p| p.iter().map(|&s| i64::from(s)).collect())
        .collect();
    let coded: Vec<(Vec<i64>, u32)> = match stereo {
        StereoMode::Independent => wide.into_iter().map(|p| (p, bits)).collect(),
        _ => {
            let (l, r) = (&wide[0], &wide[1]);
            let side: Vec<i64> = l.iter().zip(r).map(|(a, b)| a - b).collect();
            match stereo {
                StereoMode::LeftSide => vec![(l.clone(), bits), (side, bits + 1)],
                StereoMode::RightSide => vec![(side, bits + 1), (r.clone(), bits)],
                _ => {
                    let mid = l.iter().zip(r).map(|(a, b)| (a + b) >> 1).collect();
                    vec![(mid, bits), (side, bits + 1)]
                }
            }
        }
    };
    for (samples, depth) in &coded {
        write_subframe(&mut bw, samples, *depth, opts);
    }

    bw.align_to_byte();
    let body = bw.bytes().to_vec();
    bw.write_bits(u32::from(crc::crc16(&body)), 16);
    bw.finish()
}

fn metadata_block(out: &mut Vec<u8>, kind: u8, last: bool, body: &[u8]) {
    out.push(kind | if last { 0x80 } else { 0 });
    out.extend_from_slice(&(body.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(body);
}

/// 按 STREAMINFO 规则计算 MD5: 交织, 原始位深, 小端
pub fn pcm_md5(planes: &[Vec<i32>], bits: u32) -> [u8; 16] {
    let bytes_per_sample = bits.div_ceil(8) as usize;
    let mut raw = Vec::new();
    for i in 0..planes[0].len() {
        for plane in planes {
            raw.extend_from_slice(&plane[i].to_le_bytes()[..bytes_per_sample]);
        }
    }
    md5::compute(&raw).0
}

/// 把各声道采样编码为完整的 FLAC 码流
pub fn encode_stream(planes: &[Vec<i32>], opts: &EncoderOptions) -> EncodedStream {
    let channels = planes.len();
    let total = planes[0].len();
    let block_size = opts.block_size;

    let mut frames = Vec::new();
    let mut frame_first_samples = Vec::new();
    let mut start = 0;
    while start < total {
        let end = (start + block_size).min(total);
        let slices: Vec<&[i32]> = planes.iter().map(|p| &p[start..end]).collect();
        let number = if opts.variable_blocking {
            start as u64
        } else {
            (start / block_size) as u64
        };
        frames.push(write_frame(&slices, number, opts));
        frame_first_samples.push(start as u64);
        start = end;
    }

    let md5 = pcm_md5(planes, opts.bits_per_sample);
    let mut si = BitWriter::new();
    si.write_bits(block_size as u32, 16);
    si.write_bits(block_size as u32, 16);
    si.write_bits(frames.iter().map(Vec::len).min().unwrap_or(0) as u32, 24);
    si.write_bits(frames.iter().map(Vec::len).max().unwrap_or(0) as u32, 24);
    si.write_bits(opts.sample_rate, 20);
    si.write_bits(channels as u32 - 1, 3);
    si.write_bits(opts.bits_per_sample - 1, 5);
    si.write_bits_u64(total as u64, 36);
    si.write_bytes(&if opts.write_md5 { md5 } else { [0; 16] });

    let mut bytes = b"fLaC".to_vec();
    let has_seek = opts.seek_point_interval > 0;
    let has_tags = !opts.vorbis_fields.is_empty();
    metadata_block(&mut bytes, 0, !has_seek && !has_tags, &si.finish());

    if has_seek {
        let mut offset = 0u64;
        let mut table = Vec::new();
        for (i, frame) in frames.iter().enumerate() {
            if i % opts.seek_point_interval == 0 {
                table.extend_from_slice(&frame_first_samples[i].to_be_bytes());
                table.extend_from_slice(&offset.to_be_bytes());
                table.extend_from_slice(&(block_size as u16).to_be_bytes());
            }
            offset += frame.len() as u64;
        }
        // 末尾一个占位点
        table.extend_from_slice(&u64::MAX.to_be_bytes());
        table.extend_from_slice(&[0u8; 10]);
        metadata_block(&mut bytes, 3, !has_tags, &table);
    }

    if has_tags {
        let mut body = Vec::new();
        let vendor = b"qin test encoder";
        body.extend_from_slice(&(vendor.len() as u32).to_le_bytes());
        body.extend_from_slice(vendor);
        body.extend_from_slice(&(opts.vorbis_fields.len() as u32).to_le_bytes());
        for (name, value) in &opts.vorbis_fields {
            let field = format!("{name}={value}");
            body.extend_from_slice(&(field.len() as u32).to_le_bytes());
            body.extend_from_slice(field.as_bytes());
        }
        metadata_block(&mut bytes, 4, true, &body);
    }

    let audio_offset = bytes.len();
    for frame in &frames {
        bytes.extend_from_slice(frame);
    }

    EncodedStream {
        bytes,
        audio_offset,
        frames,
        frame_first_samples,
        md5,
    }
}

// ============================================================
// 解码辅助
// ============================================================

/// 测试中把 `log` 输出交给 env_logger, 用 `RUST_LOG=qin_codec=debug` 查看
pub fn init_test_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 解析流头并初始化解码器
pub fn open_codec(stream: &EncodedStream) -> FlacCodec {
    init_test_logger();
    let metadata = parse_stream_header(&stream.bytes)
        .unwrap_or_else(|err| panic!("解析流头失败: {err}"));
    let codec = FlacCodec::new();
    codec
        .set_metadata(&metadata)
        .unwrap_or_else(|err| panic!("注入元数据失败: {err}"));
    codec
        .initialize()
        .unwrap_or_else(|err| panic!("初始化解码器失败: {err}"));
    codec
}

/// 逐帧解码, 返回全部交织 16 位 PCM
pub fn decode_all(codec: &FlacCodec, stream: &EncodedStream) -> Vec<i16> {
    let mut pcm = Vec::new();
    for chunk in stream.chunks() {
        let frame = codec
            .decode(&chunk)
            .unwrap_or_else(|err| panic!("解码失败: {err}"));
        pcm.extend_from_slice(&frame.samples);
    }
    pcm
}

/// 期望的 16 位交织输出
pub fn expected_i16(planes: &[Vec<i32>], bits: u32) -> Vec<i16> {
    let mut out = Vec::with_capacity(planes.len() * planes[0].len());
    for i in 0..planes[0].len() {
        for plane in planes {
            out.push(qin::codec::flac::reconstruct::to_i16(plane[i], bits));
        }
    }
    out
}
