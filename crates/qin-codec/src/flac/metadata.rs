//! FLAC 元数据块解析.
//!
//! 流开头为 `fLaC` 标记, 随后是若干元数据块, 每块 4 字节块头:
//!
//! ```text
//! last-block: 1 bit
//! type:       7 bits (0=STREAMINFO 1=PADDING 2=APPLICATION 3=SEEKTABLE
//!                     4=VORBIS_COMMENT 5=CUESHEET 6=PICTURE, 127 禁用)
//! length:     24 bits
//! ```
//!
//! 除 VORBIS_COMMENT 的长度字段为小端外, 其余整数均为大端.
//! 所有长度字段在读取数据前都与剩余字节数比较, 不会按码流声明的长度盲目分配内存.

use std::io::{Cursor, Read};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use log::{debug, warn};
use qin_core::BitReader;
use qin_core::validation::{
    MAX_SAMPLE_RATE, check_buffer_bounds, validate_bit_depth, validate_channel_count,
    validate_metadata_block_length, validate_stream_info_block_sizes,
};

use super::error::FlacError;

/// 流起始标记
pub const STREAM_MARKER: &[u8; 4] = b"fLaC";
/// STREAMINFO 块固定长度
pub const STREAM_INFO_LEN: usize = 34;
/// 单个 SEEKTABLE 点的长度
pub const SEEK_POINT_LEN: usize = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataBlockType {
    StreamInfo,
    Padding,
    Application,
    SeekTable,
    VorbisComment,
    CueSheet,
    Picture,
    /// 7-126, 跳过不解析
    Reserved(u8),
}

impl MetadataBlockType {
    fn from_code(code: u8) -> Result<Self, FlacError> {
        Ok(match code {
            0 => Self::StreamInfo,
            1 => Self::Padding,
            2 => Self::Application,
            3 => Self::SeekTable,
            4 => Self::VorbisComment,
            5 => Self::CueSheet,
            6 => Self::Picture,
            127 => return Err(FlacError::InvalidMetadata("元数据块类型 127 为禁用值".into())),
            other => Self::Reserved(other),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataBlockHeader {
    pub is_last: bool,
    pub block_type: MetadataBlockType,
    pub length: u32,
}

/// 解析 4 字节元数据块头
pub fn parse_block_header(bytes: &[u8]) -> Result<MetadataBlockHeader, FlacError> {
    let raw: [u8; 4] = bytes
        .get(..4)
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| FlacError::InvalidMetadata("元数据块头被截断".into()))?;
    let length = u32::from_be_bytes([0, raw[1], raw[2], raw[3]]);
    if !validate_metadata_block_length(length) {
        return Err(FlacError::InvalidMetadata(format!("元数据块长度越界: {length}")));
    }
    Ok(MetadataBlockHeader {
        is_last: raw[0] & 0x80 != 0,
        block_type: MetadataBlockType::from_code(raw[0] & 0x7F)?,
        length,
    })
}

// ============================================================
// STREAMINFO
// ============================================================

/// STREAMINFO: 全局流参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub min_block_size: u32,
    pub max_block_size: u32,
    /// 0 表示未知
    pub min_frame_size: u32,
    /// 0 表示未知
    pub max_frame_size: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub bits_per_sample: u32,
    /// 每声道总采样数, 0 表示未知
    pub total_samples: u64,
    /// 未编码 PCM 的 MD5, 全 0 表示未计算
    pub md5_signature: [u8; 16],
}

impl StreamInfo {
    /// 解析 34 字节 STREAMINFO 块体
    pub fn parse(body: &[u8]) -> Result<Self, FlacError> {
        if body.len() < STREAM_INFO_LEN {
            return Err(FlacError::InvalidMetadata(format!(
                "STREAMINFO 长度不足: {} < {STREAM_INFO_LEN}",
                body.len()
            )));
        }
        let mut br = BitReader::new(&body[..STREAM_INFO_LEN]);
        let info = Self {
            min_block_size: br.read_bits(16)?,
            max_block_size: br.read_bits(16)?,
            min_frame_size: br.read_bits(24)?,
            max_frame_size: br.read_bits(24)?,
            sample_rate: br.read_bits(20)?,
            channels: br.read_bits(3)? + 1,
            bits_per_sample: br.read_bits(5)? + 1,
            total_samples: br.read_bits_u64(36)?,
            md5_signature: {
                let mut sig = [0u8; 16];
                sig.copy_from_slice(br.read_bytes(16)?);
                sig
            },
        };
        info.validate()?;
        Ok(info)
    }

    /// 按 RFC 9639 范围校验各字段
    pub fn validate(&self) -> Result<(), FlacError> {
        if !validate_stream_info_block_sizes(self.min_block_size, self.max_block_size) {
            return Err(FlacError::InvalidMetadata(format!(
                "STREAMINFO 块大小无效: min={} max={}",
                self.min_block_size, self.max_block_size
            )));
        }
        if self.sample_rate == 0 || self.sample_rate > MAX_SAMPLE_RATE {
            return Err(FlacError::InvalidMetadata(format!(
                "STREAMINFO 采样率无效: {}",
                self.sample_rate
            )));
        }
        if !validate_channel_count(self.channels) {
            return Err(FlacError::InvalidMetadata(format!(
                "STREAMINFO 声道数无效: {}",
                self.channels
            )));
        }
        if self.bits_per_sample == 0 || !validate_bit_depth(self.bits_per_sample) {
            return Err(FlacError::InvalidMetadata(format!(
                "STREAMINFO 位深无效: {}",
                self.bits_per_sample
            )));
        }
        if self.min_frame_size != 0
            && self.max_frame_size != 0
            && self.min_frame_size > self.max_frame_size
        {
            return Err(FlacError::InvalidMetadata("STREAMINFO 最小帧长大于最大帧长".into()));
        }
        Ok(())
    }

    /// 是否携带 MD5 签名
    pub fn has_md5(&self) -> bool {
        self.md5_signature.iter().any(|&b| b != 0)
    }

    /// 流时长 (毫秒), 总采样数未知时为 `None`
    pub fn duration_ms(&self) -> Option<u64> {
        (self.total_samples > 0).then(|| self.total_samples * 1000 / u64::from(self.sample_rate.max(1)))
    }
}

// ============================================================
// SEEKTABLE
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekPoint {
    /// 目标帧首采样号, `u64::MAX` 为占位点
    pub sample_number: u64,
    /// 相对首帧起点的字节偏移
    pub byte_offset: u64,
    pub frame_samples: u16,
}

impl SeekPoint {
    pub const PLACEHOLDER: u64 = u64::MAX;

    pub fn is_placeholder(&self) -> bool {
        self.sample_number == Self::PLACEHOLDER
    }
}

/// 按采样号升序排列的 seek 点, 占位点只能出现在末尾
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeekTable {
    points: Vec<SeekPoint>,
    /// 非占位点个数
    usable: usize,
}

impl SeekTable {
    /// 由已排序的 seek 点构造, 校验升序与占位点位置
    pub fn new(points: Vec<SeekPoint>) -> Result<Self, FlacError> {
        let usable = points.iter().take_while(|p| !p.is_placeholder()).count();
        if points[usable..].iter().any(|p| !p.is_placeholder()) {
            return Err(FlacError::InvalidMetadata("SEEKTABLE 占位点之后出现有效点".into()));
        }
        if points[..usable]
            .windows(2)
            .any(|w| w[0].sample_number >= w[1].sample_number)
        {
            return Err(FlacError::InvalidMetadata("SEEKTABLE 采样号未严格升序".into()));
        }
        Ok(Self { points, usable })
    }

    /// 解析 SEEKTABLE 块体
    pub fn parse(body: &[u8]) -> Result<Self, FlacError> {
        if body.len() % SEEK_POINT_LEN != 0 {
            return Err(FlacError::InvalidMetadata(format!(
                "SEEKTABLE 长度 {} 不是 {SEEK_POINT_LEN} 的整数倍",
                body.len()
            )));
        }
        let mut cur = Cursor::new(body);
        let mut points = Vec::with_capacity(body.len() / SEEK_POINT_LEN);
        for _ in 0..body.len() / SEEK_POINT_LEN {
            points.push(SeekPoint {
                sample_number: cur.read_u64::<BigEndian>().map_err(truncated)?,
                byte_offset: cur.read_u64::<BigEndian>().map_err(truncated)?,
                frame_samples: cur.read_u16::<BigEndian>().map_err(truncated)?,
            });
        }
        Self::new(points)
    }

    /// 全部 seek 点 (含占位点)
    pub fn points(&self) -> &[SeekPoint] {
        &self.points
    }

    /// 是否没有可用的 seek 点
    pub fn is_empty(&self) -> bool {
        self.usable == 0
    }

    /// 二分查找采样号不大于 `target` 的最近 seek 点
    pub fn find_nearest(&self, target: u64) -> Option<&SeekPoint> {
        let usable = &self.points[..self.usable];
        let idx = usable.partition_point(|p| p.sample_number <= target);
        idx.checked_sub(1).map(|i| &usable[i])
    }
}

// ============================================================
// VORBIS_COMMENT / PICTURE / APPLICATION
// ============================================================

/// Vorbis 注释 (标签)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VorbisComment {
    pub vendor: String,
    /// (字段名, 值), 保持码流中的顺序
    pub fields: Vec<(String, String)>,
}

impl VorbisComment {
    pub fn parse(body: &[u8]) -> Result<Self, FlacError> {
        let mut cur = Cursor::new(body);
        let vendor = read_string_le(&mut cur)?;
        let declared = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
        // 每个字段至少 4 字节长度前缀, 按剩余字节数限制字段个数
        let remaining = body.len() - cur.position() as usize;
        if declared > remaining / 4 {
            return Err(FlacError::InvalidMetadata(format!(
                "VORBIS_COMMENT 字段数 {declared} 超出块长度"
            )));
        }
        let mut fields = Vec::with_capacity(declared);
        for _ in 0..declared {
            let entry = read_string_le(&mut cur)?;
            let (name, value) = entry.split_once('=').ok_or_else(|| {
                FlacError::InvalidMetadata(format!("VORBIS_COMMENT 字段缺少 '=': {entry}"))
            })?;
            if name.is_empty() || !name.bytes().all(|b| (0x20..=0x7E).contains(&b) && b != b'=') {
                return Err(FlacError::InvalidMetadata(format!("VORBIS_COMMENT 字段名无效: {name}")));
            }
            fields.push((name.to_string(), value.to_string()));
        }
        Ok(Self { vendor, fields })
    }

    /// 按字段名查找第一个值 (不区分大小写)
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// 内嵌图片 (封面等)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Picture {
    /// ID3v2 APIC 图片类型 (3 = 封面)
    pub picture_type: u32,
    pub mime_type: String,
    pub description: String,
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
    /// 索引色图片的颜色数, 非索引色为 0
    pub colors_used: u32,
    pub data: Vec<u8>,
}

impl Picture {
    pub fn parse(body: &[u8]) -> Result<Self, FlacError> {
        let mut cur = Cursor::new(body);
        let picture_type = cur.read_u32::<BigEndian>().map_err(truncated)?;
        let mime_type = read_string_be(&mut cur)?;
        if !mime_type.is_ascii() {
            return Err(FlacError::InvalidMetadata("PICTURE MIME 类型不是 ASCII".into()));
        }
        let description = read_string_be(&mut cur)?;
        let width = cur.read_u32::<BigEndian>().map_err(truncated)?;
        let height = cur.read_u32::<BigEndian>().map_err(truncated)?;
        let color_depth = cur.read_u32::<BigEndian>().map_err(truncated)?;
        let colors_used = cur.read_u32::<BigEndian>().map_err(truncated)?;
        let data = read_bytes_be(&mut cur)?;
        Ok(Self {
            picture_type,
            mime_type,
            description,
            width,
            height,
            color_depth,
            colors_used,
            data,
        })
    }
}

/// APPLICATION 块: 4 字节注册 ID + 私有数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationBlock {
    pub id: [u8; 4],
    pub data: Vec<u8>,
}

impl ApplicationBlock {
    pub fn parse(body: &[u8]) -> Result<Self, FlacError> {
        let id: [u8; 4] = body
            .get(..4)
            .and_then(|b| b.try_into().ok())
            .ok_or_else(|| FlacError::InvalidMetadata("APPLICATION 块缺少 ID".into()))?;
        Ok(Self {
            id,
            data: body[4..].to_vec(),
        })
    }
}

fn truncated(_: std::io::Error) -> FlacError {
    FlacError::InvalidMetadata("元数据块被截断".into())
}

fn read_exact_checked(cur: &mut Cursor<&[u8]>, len: usize) -> Result<Vec<u8>, FlacError> {
    let remaining = cur.get_ref().len().saturating_sub(cur.position() as usize);
    if len > remaining {
        return Err(FlacError::InvalidMetadata(format!(
            "声明长度 {len} 超出剩余字节 {remaining}"
        )));
    }
    let mut buf = vec![0u8; len];
    cur.read_exact(&mut buf).map_err(truncated)?;
    Ok(buf)
}

fn read_bytes_be(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>, FlacError> {
    let len = cur.read_u32::<BigEndian>().map_err(truncated)? as usize;
    read_exact_checked(cur, len)
}

fn read_string_be(cur: &mut Cursor<&[u8]>) -> Result<String, FlacError> {
    Ok(String::from_utf8_lossy(&read_bytes_be(cur)?).into_owned())
}

fn read_string_le(cur: &mut Cursor<&[u8]>) -> Result<String, FlacError> {
    let len = cur.read_u32::<LittleEndian>().map_err(truncated)? as usize;
    Ok(String::from_utf8_lossy(&read_exact_checked(cur, len)?).into_owned())
}

// ============================================================
// 流头
// ============================================================

/// 流头中的全部元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlacMetadata {
    pub stream_info: StreamInfo,
    pub seek_table: SeekTable,
    pub vorbis_comment: Option<VorbisComment>,
    pub pictures: Vec<Picture>,
    pub applications: Vec<ApplicationBlock>,
    /// PADDING 块总字节数
    pub padding_bytes: u64,
    /// 首个音频帧在流中的字节偏移
    pub audio_offset: usize,
}

/// 解析 `fLaC` 标记与其后的全部元数据块
///
/// STREAMINFO 必须是第一个块. 保留类型的块被跳过; 无法解析的可选块 (标签, 图片)
/// 记录警告后跳过, 不影响解码.
pub fn parse_stream_header(bytes: &[u8]) -> Result<FlacMetadata, FlacError> {
    if bytes.get(..4) != Some(&STREAM_MARKER[..]) {
        return Err(FlacError::InvalidMetadata("缺少 fLaC 流标记".into()));
    }

    let mut pos = STREAM_MARKER.len();
    let mut stream_info: Option<StreamInfo> = None;
    let mut seek_table = SeekTable::default();
    let mut vorbis_comment = None;
    let mut pictures = Vec::new();
    let mut applications = Vec::new();
    let mut padding_bytes = 0u64;

    loop {
        let header = parse_block_header(&bytes[pos..])?;
        let body_start = pos + 4;
        let length = header.length as usize;
        if !check_buffer_bounds(bytes.len(), body_start, length) {
            return Err(FlacError::InvalidMetadata(format!(
                "元数据块 {:?} 长度 {} 超出数据范围",
                header.block_type, header.length
            )));
        }
        let body_end = body_start + length;
        let body = &bytes[body_start..body_end];

        match (header.block_type, stream_info.is_some()) {
            (MetadataBlockType::StreamInfo, false) => stream_info = Some(StreamInfo::parse(body)?),
            (MetadataBlockType::StreamInfo, true) => {
                return Err(FlacError::InvalidMetadata("出现重复的 STREAMINFO".into()));
            }
            (_, false) => {
                return Err(FlacError::InvalidMetadata("首个元数据块不是 STREAMINFO".into()));
            }
            (MetadataBlockType::SeekTable, true) => seek_table = SeekTable::parse(body)?,
            (MetadataBlockType::VorbisComment, true) => match VorbisComment::parse(body) {
                Ok(vc) => vorbis_comment = Some(vc),
                Err(e) => warn!("忽略无法解析的 VORBIS_COMMENT: {e}"),
            },
            (MetadataBlockType::Picture, true) => match Picture::parse(body) {
                Ok(p) => pictures.push(p),
                Err(e) => warn!("忽略无法解析的 PICTURE: {e}"),
            },
            (MetadataBlockType::Application, true) => applications.push(ApplicationBlock::parse(body)?),
            (MetadataBlockType::Padding, true) => padding_bytes += u64::from(header.length),
            (other, true) => debug!("跳过元数据块 {other:?} ({} 字节)", header.length),
        }

        pos = body_end;
        if header.is_last {
            break;
        }
    }

    let stream_info =
        stream_info.ok_or_else(|| FlacError::InvalidMetadata("缺少 STREAMINFO".into()))?;
    Ok(FlacMetadata {
        stream_info,
        seek_table,
        vorbis_comment,
        pictures,
        applications,
        padding_bytes,
        audio_offset: pos,
    })
}
