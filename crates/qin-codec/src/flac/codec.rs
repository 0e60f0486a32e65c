//! FLAC 解码器门面.
//!
//! [`FlacCodec`] 串联帧头解析, 子帧解码, 去相关与采样重建, 并负责状态机,
//! seek, MD5 校验与错误恢复策略.
//!
//! # 加锁顺序
//!
//! 内部状态按用途分为三把锁, 任何路径都按以下顺序获取, 不会反向:
//!
//! 1. `state`: 状态机, 配置, STREAMINFO, seek 表, 错误计数, 统计
//! 2. `decoder`: 声道缓冲区, 帧头解析器, MD5
//! 3. `output`: 16 位交织输出缓冲区
//!
//! 公开方法获取锁后调用对应的 `*_unlocked` 实现, 内部实现不会再次加锁.
//! 当前播放位置保存在原子变量中, 查询进度不需要任何锁.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use log::{debug, error, info, warn};
use qin_core::validation::{MAX_SAMPLE_RATE, validate_bit_depth, validate_channel_count};
use qin_core::{ChannelLayout, QinError, QinResult};

use super::error::{FlacError, FlacErrorKind};
use super::frame_header::{FrameFooter, FrameParser};
use super::md5::{Md5Status, Md5Validator};
use super::metadata::{FlacMetadata, SeekTable, StreamInfo};
use super::pipeline::{ChannelBuffers, DecodedFrame, decode_frame};
use super::reconstruct::interleave_to_i16;
use super::state::DecoderState;
use super::stats::FlacCodecStats;
use crate::chunk::MediaChunk;
use crate::codec::AudioCodec;
use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::config::{CrcPolicy, FlacDecoderConfig};
use crate::frame::AudioFrame;

/// seek 的定位结果, 交给解复用器跳转
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeekPosition {
    /// 定位到的帧首采样号
    pub sample_number: u64,
    /// 相对首个音频帧的字节偏移
    pub byte_offset: u64,
}

struct StateInner {
    state: DecoderState,
    config: FlacDecoderConfig,
    stream_info: Option<StreamInfo>,
    seek_table: SeekTable,
    consecutive_errors: u32,
    stats: FlacCodecStats,
}

struct DecoderInner {
    /// initialize 时分配, 内存错误恢复时释放
    buffers: Option<ChannelBuffers>,
    parser: FrameParser,
    md5: Md5Validator,
}

struct OutputInner {
    pcm: Vec<i16>,
}

/// 原生 FLAC 解码器
pub struct FlacCodec {
    state: Mutex<StateInner>,
    decoder: Mutex<DecoderInner>,
    output: Mutex<OutputInner>,
    current_sample: AtomicU64,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &str) -> QinResult<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| QinError::Internal(format!("FLAC 解码器 {name} 锁已中毒")))
}

fn ensure_buffers(slot: &mut Option<ChannelBuffers>) -> Result<&mut ChannelBuffers, FlacError> {
    if slot.is_none() {
        *slot = Some(ChannelBuffers::new()?);
    }
    slot.as_mut()
        .ok_or_else(|| FlacError::OutOfMemory("声道缓冲区不可用".into()))
}

impl Default for FlacCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FlacCodec {
    pub fn new() -> Self {
        Self::with_config(FlacDecoderConfig::default())
    }

    pub fn with_config(config: FlacDecoderConfig) -> Self {
        let mut md5 = Md5Validator::new();
        md5.set_enabled(config.md5_validation);
        Self {
            state: Mutex::new(StateInner {
                state: DecoderState::Uninitialized,
                config,
                stream_info: None,
                seek_table: SeekTable::default(),
                consecutive_errors: 0,
                stats: FlacCodecStats::default(),
            }),
            decoder: Mutex::new(DecoderInner {
                buffers: None,
                parser: FrameParser::new(),
                md5,
            }),
            output: Mutex::new(OutputInner { pcm: Vec::new() }),
            current_sample: AtomicU64::new(0),
        }
    }

    // ========================================================
    // 流参数
    // ========================================================

    /// 注入 STREAMINFO (流打开时调用一次, 解码开始后不可更改)
    pub fn set_stream_info(&self, info: StreamInfo) -> QinResult<()> {
        if let Err(e) = info.validate() {
            self.record_metadata_error(&e)?;
            return Err(QinError::InvalidArgument(e.to_string()));
        }
        let mut st = lock(&self.state, "state")?;
        let mut dec = lock(&self.decoder, "decoder")?;
        if st.state == DecoderState::Decoding {
            return Err(QinError::InvalidState("解码过程中不能更换 STREAMINFO".into()));
        }
        debug!(
            "STREAMINFO: {} Hz, {} 声道, {} 位, 块大小 {}-{}, 总采样 {}",
            info.sample_rate,
            info.channels,
            info.bits_per_sample,
            info.min_block_size,
            info.max_block_size,
            info.total_samples
        );
        dec.md5.set_expected(info.md5_signature);
        dec.parser = FrameParser::with_stream_info(Some(info.clone()));
        st.stream_info = Some(info);
        Ok(())
    }

    pub fn set_seek_table(&self, table: SeekTable) -> QinResult<()> {
        let mut st = lock(&self.state, "state")?;
        debug!("SEEKTABLE: {} 个 seek 点", table.points().len());
        st.seek_table = table;
        Ok(())
    }

    /// 一次性注入流头中解析出的 STREAMINFO 与 SEEKTABLE
    pub fn set_metadata(&self, metadata: &FlacMetadata) -> QinResult<()> {
        self.set_stream_info(metadata.stream_info.clone())?;
        self.set_seek_table(metadata.seek_table.clone())
    }

    /// 从 `CodecParameters::extra_data` (STREAMINFO 块体) 配置流参数
    pub fn set_parameters(&self, params: &CodecParameters) -> QinResult<()> {
        if params.codec_id != CodecId::Flac {
            return Err(QinError::InvalidArgument(format!(
                "FLAC 解码器不支持 {}",
                params.codec_id
            )));
        }
        let info = match StreamInfo::parse(&params.extra_data) {
            Ok(info) => info,
            Err(e) => {
                self.record_metadata_error(&e)?;
                return Err(e.into());
            }
        };
        self.set_stream_info(info)
    }

    fn record_metadata_error(&self, err: &FlacError) -> QinResult<()> {
        warn!("拒绝无效的流参数: {err}");
        lock(&self.state, "state")?.stats.record_error(err.kind());
        Ok(())
    }

    pub fn stream_info(&self) -> Option<StreamInfo> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stream_info
            .clone()
    }

    pub fn config(&self) -> FlacDecoderConfig {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    // ========================================================
    // MD5
    // ========================================================

    /// 开启或关闭全流 MD5 校验; 解码中途开启时本条流不再比对
    pub fn set_md5_validation_enabled(&self, enabled: bool) -> QinResult<()> {
        let st = lock(&self.state, "state")?;
        let mut dec = lock(&self.decoder, "decoder")?;
        dec.md5.set_enabled(enabled);
        if enabled && st.state == DecoderState::Decoding {
            dec.md5.taint();
        }
        Ok(())
    }

    /// 流结束后 MD5 是否比对通过
    pub fn check_md5_validation(&self) -> bool {
        self.md5_status() == Md5Status::Match
    }

    pub fn md5_status(&self) -> Md5Status {
        self.decoder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .md5
            .status()
    }

    // ========================================================
    // 查询
    // ========================================================

    pub fn state(&self) -> DecoderState {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).state
    }

    pub fn stats(&self) -> FlacCodecStats {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
            .clone()
    }

    /// 下一个待解码采样的序号 (无锁读取)
    pub fn current_sample(&self) -> u64 {
        self.current_sample.load(Ordering::Acquire)
    }

    // ========================================================
    // seek
    // ========================================================

    /// 定位到不晚于 `target_sample` 的帧
    ///
    /// 有 seek 表时二分查找最近的 seek 点; 否则返回流起点, 由调用方从头逐帧扫描.
    /// 定位后解码器回到 INITIALIZED, 下一次 decode 从定位到的帧开始.
    pub fn seek(&self, target_sample: u64) -> QinResult<SeekPosition> {
        let mut st = lock(&self.state, "state")?;
        let mut dec = lock(&self.decoder, "decoder")?;
        let mut out = lock(&self.output, "output")?;
        self.seek_unlocked(&mut st, &mut dec, &mut out, target_sample)
    }

    fn seek_unlocked(
        &self,
        st: &mut StateInner,
        dec: &mut DecoderInner,
        out: &mut OutputInner,
        target_sample: u64,
    ) -> QinResult<SeekPosition> {
        match st.state {
            DecoderState::Initialized | DecoderState::Decoding | DecoderState::EndOfStream => {}
            other => {
                return Err(QinError::InvalidState(format!("{other} 状态下不能 seek")));
            }
        }
        if let Some(info) = &st.stream_info {
            if info.total_samples > 0 && target_sample >= info.total_samples {
                return Err(QinError::InvalidArgument(format!(
                    "seek 目标 {target_sample} 超出总采样数 {}",
                    info.total_samples
                )));
            }
        }

        let position = match self.seek_using_table(&st.seek_table, target_sample) {
            Some(pos) => pos,
            None => self.seek_by_scanning(target_sample),
        };

        self.reset_unlocked(st, dec, out)?;
        if position.sample_number > 0 {
            dec.md5.taint();
        }
        self.current_sample
            .store(position.sample_number, Ordering::Release);
        debug!(
            "seek {target_sample} -> 采样 {}, 偏移 {}",
            position.sample_number, position.byte_offset
        );
        Ok(position)
    }

    fn seek_using_table(&self, table: &SeekTable, target_sample: u64) -> Option<SeekPosition> {
        table.find_nearest(target_sample).map(|point| SeekPosition {
            sample_number: point.sample_number,
            byte_offset: point.byte_offset,
        })
    }

    /// 无 seek 表时的回退: 回到流起点, 由调用方逐帧解码直到目标采样
    fn seek_by_scanning(&self, target_sample: u64) -> SeekPosition {
        debug!("无可用 seek 点, 从流起点线性扫描到采样 {target_sample}");
        SeekPosition::default()
    }

    // ========================================================
    // 解码
    // ========================================================

    fn initialize_unlocked(&self, st: &mut StateInner, dec: &mut DecoderInner) -> QinResult<()> {
        match st.state {
            DecoderState::Uninitialized => {}
            DecoderState::Initialized => return Ok(()),
            other => {
                return Err(QinError::InvalidState(format!("{other} 状态下不能 initialize")));
            }
        }
        if let Some(info) = &st.stream_info {
            info.validate()
                .map_err(|e| QinError::InvalidArgument(e.to_string()))?;
        }
        if let Err(e) = ensure_buffers(&mut dec.buffers) {
            st.stats.record_error(e.kind());
            self.recover_from_memory_error(dec, &e);
            return Err(e.into());
        }
        st.state.transition(DecoderState::Initialized)?;
        st.consecutive_errors = 0;
        dec.md5.reset();
        self.current_sample.store(0, Ordering::Release);
        info!("FLAC 解码器初始化完成");
        Ok(())
    }

    fn decode_unlocked(
        &self,
        st: &mut StateInner,
        dec: &mut DecoderInner,
        out: &mut OutputInner,
        chunk: &MediaChunk,
    ) -> QinResult<AudioFrame> {
        match st.state {
            DecoderState::Initialized | DecoderState::Decoding => {}
            DecoderState::EndOfStream => {
                return Err(QinError::InvalidState("已到达流末尾, 需要 reset 或 seek".into()));
            }
            DecoderState::DecoderError => {
                return Err(QinError::Codec("解码器处于 DECODER_ERROR 状态, 需要 reset".into()));
            }
            DecoderState::Uninitialized => {
                return Err(QinError::InvalidState("解码器尚未初始化".into()));
            }
        }
        if chunk.is_empty() {
            return Ok(AudioFrame::empty());
        }

        let started = Instant::now();
        let data = &chunk.data[..];
        let limit = st.config.sync_search_limit();

        let buffers = match ensure_buffers(&mut dec.buffers) {
            Ok(b) => b,
            Err(e) => {
                st.stats.record_error(e.kind());
                self.recover_from_memory_error(dec, &e);
                return self.register_failure(st, e);
            }
        };

        let frame = match decode_frame(&dec.parser, data, buffers) {
            Ok(frame) => frame,
            Err(e) if matches!(e.kind(), FlacErrorKind::Sync | FlacErrorKind::Header) => {
                let candidate = if e == FlacError::SyncNotFound {
                    self.recover_from_sync_loss(&dec.parser, data, limit)
                } else {
                    self.recover_from_invalid_header(&dec.parser, data, limit)
                };
                st.stats.record_error(e.kind());
                let retried = match candidate {
                    Some(offset) => decode_frame(&dec.parser, &data[offset..], buffers),
                    None => Err(e),
                };
                match retried {
                    Ok(frame) => frame,
                    Err(e) => return self.register_failure(st, e),
                }
            }
            Err(e) => {
                st.stats.record_error(e.kind());
                return self.register_failure(st, e);
            }
        };
        let DecodedFrame {
            header,
            footer,
            failed_channel,
        } = frame;

        if !header.is_streamable_subset() {
            st.stats.non_subset_frames += 1;
            if st.config.strict_subset {
                let e = FlacError::InvalidFrameHeader("帧不属于 streamable subset".into());
                st.stats.record_error(e.kind());
                return self.register_failure(st, e);
            }
        }

        if let Some(footer) = footer {
            if !footer.crc_matches() && !self.recover_from_crc_error(st, &footer) {
                return self.register_failure(
                    st,
                    FlacError::FrameCrcMismatch {
                        stored: footer.crc16,
                        computed: footer.computed_crc16,
                    },
                );
            }
        }

        let subframe_failed = match &failed_channel {
            Some((channel, e)) => {
                self.recover_from_subframe_error(st, *channel, e);
                true
            }
            None => false,
        };

        let channels = header.channels as usize;
        let block_size = header.block_size as usize;
        let bit_depth = header.bits_per_sample;
        let nominal = st.stream_info.as_ref().map(|si| si.max_block_size);
        let Some(first_sample) = header.first_sample(nominal) else {
            let e = FlacError::InvalidFrameHeader(format!(
                "帧号 {} 对应的采样序号溢出",
                header.coded_number
            ));
            st.stats.record_error(e.kind());
            return self.register_failure(st, e);
        };

        let planes: &ChannelBuffers = buffers;
        dec.md5
            .update(move |c| planes.channel(c), channels, block_size, bit_depth);
        out.pcm.clear();
        interleave_to_i16(move |c| planes.channel(c), channels, block_size, bit_depth, &mut out.pcm);

        st.state.transition(DecoderState::Decoding)?;
        if subframe_failed {
            st.consecutive_errors += 1;
            if st.consecutive_errors > st.config.max_consecutive_errors {
                let e = failed_channel
                    .map(|(_, e)| e)
                    .unwrap_or_else(|| FlacError::InvalidSubframe(String::new()));
                self.handle_unrecoverable_error(st, &e)?;
                return Err(QinError::Codec(format!("连续解码失败过多: {e}")));
            }
        } else {
            st.consecutive_errors = 0;
        }

        let end_sample = first_sample + u64::from(header.block_size);
        self.current_sample.store(end_sample, Ordering::Release);
        let frame_bytes = footer.map_or(data.len(), |f| f.frame_len);
        st.stats
            .record_frame(header.block_size, frame_bytes, bit_depth != 16, started.elapsed());

        let reached_end = st
            .stream_info
            .as_ref()
            .is_some_and(|si| si.total_samples > 0 && end_sample >= si.total_samples);
        if reached_end {
            self.enter_end_of_stream(st, dec)?;
        }

        Ok(AudioFrame {
            samples: out.pcm.clone(),
            sample_rate: header.sample_rate,
            channels: header.channels,
            channel_layout: ChannelLayout::from_flac_channels(header.channels),
            timestamp_samples: first_sample,
            timestamp_ms: first_sample * 1000 / u64::from(header.sample_rate.max(1)),
        })
    }

    fn flush_unlocked(&self, st: &mut StateInner, dec: &mut DecoderInner) -> QinResult<AudioFrame> {
        match st.state {
            DecoderState::Uninitialized => {
                return Err(QinError::InvalidState("解码器尚未初始化".into()));
            }
            DecoderState::Decoding => self.enter_end_of_stream(st, dec)?,
            _ => {}
        }
        Ok(AudioFrame::empty())
    }

    fn reset_unlocked(
        &self,
        st: &mut StateInner,
        dec: &mut DecoderInner,
        out: &mut OutputInner,
    ) -> QinResult<()> {
        let target = st.state.reset_target();
        st.state.transition(target)?;
        st.consecutive_errors = 0;
        if let Some(buffers) = dec.buffers.as_mut() {
            buffers.clear();
        }
        dec.md5.reset();
        out.pcm.clear();
        self.current_sample.store(0, Ordering::Release);
        debug!("FLAC 解码器已重置, 当前状态 {target}");
        Ok(())
    }

    fn enter_end_of_stream(&self, st: &mut StateInner, dec: &mut DecoderInner) -> QinResult<()> {
        st.state.transition(DecoderState::EndOfStream)?;
        let status = dec.md5.finalize();
        debug!("到达流末尾, MD5 状态 {status:?}");
        Ok(())
    }

    // ========================================================
    // 错误恢复
    // ========================================================

    /// 同步丢失: 在本块数据内有界地搜索下一个有效帧头
    fn recover_from_sync_loss(&self, parser: &FrameParser, data: &[u8], limit: usize) -> Option<usize> {
        let found = parser.recover_from_sync_loss(data, 1, limit);
        if found.is_none() {
            debug!("{limit} 字节内未找到帧同步");
        }
        found.map(|(offset, _)| offset)
    }

    /// 帧头无效: 跳过当前候选, 从下一个字节开始寻找下一个候选帧
    fn recover_from_invalid_header(
        &self,
        parser: &FrameParser,
        data: &[u8],
        limit: usize,
    ) -> Option<usize> {
        parser
            .recover_from_sync_loss(data, 1, limit)
            .map(|(offset, header)| {
                debug!("跳过无效帧头, 在偏移 {offset} 处找到候选帧 (块大小 {})", header.block_size);
                offset
            })
    }

    /// 子帧失败: 失败声道已被静音, 其余声道照常输出
    fn recover_from_subframe_error(&self, st: &mut StateInner, channel: usize, err: &FlacError) {
        warn!("声道 {channel} 解码失败, 以静音代替: {err}");
        st.stats.record_error(err.kind());
    }

    /// CRC-16 不匹配: 按配置决定是否使用本帧数据, 返回 true 表示使用
    fn recover_from_crc_error(&self, st: &mut StateInner, footer: &FrameFooter) -> bool {
        st.stats.record_error(FlacErrorKind::Crc);
        match st.config.crc_policy {
            CrcPolicy::Accept => {
                warn!(
                    "帧 CRC-16 不匹配 (读取 0x{:04X}, 计算 0x{:04X}), 仍使用解码数据",
                    footer.crc16, footer.computed_crc16
                );
                true
            }
            CrcPolicy::Discard => {
                warn!(
                    "帧 CRC-16 不匹配 (读取 0x{:04X}, 计算 0x{:04X}), 丢弃本帧",
                    footer.crc16, footer.computed_crc16
                );
                false
            }
        }
    }

    /// 内存分配失败: 释放缓冲区, 下次解码时重新分配
    fn recover_from_memory_error(&self, dec: &mut DecoderInner, err: &FlacError) {
        error!("FLAC 解码器内存错误: {err}");
        dec.buffers = None;
    }

    fn handle_unrecoverable_error(&self, st: &mut StateInner, err: &FlacError) -> QinResult<()> {
        error!(
            "连续 {} 次解码失败, 进入 DECODER_ERROR: {err}",
            st.consecutive_errors
        );
        st.state.transition(DecoderState::DecoderError)?;
        Ok(())
    }

    /// 记录一次失败; 超过连续失败上限时升级为不可恢复错误
    fn register_failure(&self, st: &mut StateInner, err: FlacError) -> QinResult<AudioFrame> {
        st.consecutive_errors += 1;
        debug!("解码失败 ({} 连续): {err}", st.consecutive_errors);
        if st.consecutive_errors > st.config.max_consecutive_errors {
            self.handle_unrecoverable_error(st, &err)?;
            return Err(QinError::Codec(format!("连续解码失败过多: {err}")));
        }
        Ok(AudioFrame::empty())
    }
}

impl AudioCodec for FlacCodec {
    fn codec_id(&self) -> CodecId {
        CodecId::Flac
    }

    fn name(&self) -> &str {
        "flac"
    }

    fn can_decode(&self, params: &CodecParameters) -> bool {
        params.codec_id == CodecId::Flac
            && (1..=MAX_SAMPLE_RATE).contains(&params.sample_rate)
            && validate_channel_count(params.channels)
            && (params.bits_per_sample == 0 || validate_bit_depth(params.bits_per_sample))
    }

    fn initialize(&self) -> QinResult<()> {
        let mut st = lock(&self.state, "state")?;
        let mut dec = lock(&self.decoder, "decoder")?;
        self.initialize_unlocked(&mut st, &mut dec)
    }

    fn decode(&self, chunk: &MediaChunk) -> QinResult<AudioFrame> {
        let mut st = lock(&self.state, "state")?;
        let mut dec = lock(&self.decoder, "decoder")?;
        let mut out = lock(&self.output, "output")?;
        self.decode_unlocked(&mut st, &mut dec, &mut out, chunk)
    }

    fn flush(&self) -> QinResult<AudioFrame> {
        let mut st = lock(&self.state, "state")?;
        let mut dec = lock(&self.decoder, "decoder")?;
        self.flush_unlocked(&mut st, &mut dec)
    }

    fn reset(&self) -> QinResult<()> {
        let mut st = lock(&self.state, "state")?;
        let mut dec = lock(&self.decoder, "decoder")?;
        let mut out = lock(&self.output, "output")?;
        self.reset_unlocked(&mut st, &mut dec, &mut out)
    }
}
