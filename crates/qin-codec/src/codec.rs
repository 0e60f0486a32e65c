//! 音频解码器 trait 定义.

use qin_core::QinResult;

use crate::chunk::MediaChunk;
use crate::codec_id::CodecId;
use crate::codec_parameters::CodecParameters;
use crate::frame::AudioFrame;

/// 音频解码器 trait
///
/// 所有方法只取 `&self`: 实现方自行加锁, 使同一实例可被多个线程共享
/// (例如播放线程解码, UI 线程查询进度).
///
/// 解码流程:
/// 1. `initialize()` 分配资源
/// 2. 每个 [`MediaChunk`] 调用一次 `decode()`, 得到一帧 PCM; 可恢复的错误返回空帧
/// 3. 流结束时调用 `flush()`
/// 4. seek 后调用 `reset()`
pub trait AudioCodec: Send + Sync {
    fn codec_id(&self) -> CodecId;

    fn name(&self) -> &str;

    /// 判断参数描述的流能否由本解码器处理
    fn can_decode(&self, params: &CodecParameters) -> bool;

    fn initialize(&self) -> QinResult<()>;

    /// 解码一个数据块
    fn decode(&self, chunk: &MediaChunk) -> QinResult<AudioFrame>;

    /// 交付缓存中尚未输出的采样, 并标记流结束
    fn flush(&self) -> QinResult<AudioFrame>;

    /// 清空内部状态与播放位置
    fn reset(&self) -> QinResult<()>;
}
