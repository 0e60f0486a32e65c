//! reset 之后重新解码同一条流, 输出与首次完全一致.

mod common;

use common::{EncoderOptions, StereoMode, SubframeMode, decode_all, encode_stream, open_codec, test_signal};
use qin::codec::flac::DecoderState;
use qin::codec::{AudioCodec, MediaChunk};

#[test]
fn test_reset_then_redecode() {
    let planes = vec![
        test_signal(9000, 24, 440.0, 96000, 1),
        test_signal(9000, 24, 441.0, 96000, 2),
    ];
    let opts = EncoderOptions {
        bits_per_sample: 24,
        sample_rate: 96000,
        stereo: StereoMode::RightSide,
        subframe: SubframeMode::Lpc {
            coefs: vec![2, -1],
            precision: 4,
            shift: 0,
        },
        partition_order: 4,
        ..Default::default()
    };
    let stream = encode_stream(&planes, &opts);
    let codec = open_codec(&stream);

    let first = decode_all(&codec, &stream);
    for _ in 0..3 {
        codec.reset().unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(codec.state(), DecoderState::Initialized);
        assert_eq!(codec.current_sample(), 0);
        assert_eq!(decode_all(&codec, &stream), first);
    }
}

#[test]
fn test_reset_mid_stream() {
    let planes = vec![test_signal(1152 * 6, 16, 700.0, 44100, 3)];
    let stream = encode_stream(&planes, &EncoderOptions::default());
    let codec = open_codec(&stream);
    let first = decode_all(&codec, &stream);

    codec.reset().unwrap_or_else(|err| panic!("{err}"));
    for chunk in &stream.chunks()[..3] {
        codec.decode(chunk).unwrap_or_else(|err| panic!("{err}"));
    }
    assert_eq!(codec.state(), DecoderState::Decoding);
    codec.reset().unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(codec.state(), DecoderState::Initialized);
    assert_eq!(decode_all(&codec, &stream), first);
}

#[test]
fn test_reset_after_decoder_error() {
    let planes = vec![test_signal(4000, 16, 500.0, 44100, 8)];
    let stream = encode_stream(&planes, &EncoderOptions::default());
    let codec = open_codec(&stream);
    let first = decode_all(&codec, &stream);
    codec.reset().unwrap_or_else(|err| panic!("{err}"));

    let junk = MediaChunk::new(vec![0u8; 128]);
    while codec.state() != DecoderState::DecoderError {
        let _ = codec.decode(&junk);
    }
    codec.reset().unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(codec.state(), DecoderState::Uninitialized);
    codec.initialize().unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(decode_all(&codec, &stream), first);
    assert_eq!(codec.state(), DecoderState::EndOfStream);
}

#[test]
fn test_reset_is_idempotent() {
    let planes = vec![test_signal(2000, 16, 500.0, 44100, 8)];
    let stream = encode_stream(&planes, &EncoderOptions::default());
    let codec = open_codec(&stream);
    for _ in 0..3 {
        codec.reset().unwrap_or_else(|err| panic!("{err}"));
        assert_eq!(codec.state(), DecoderState::Initialized);
    }
    // initialize 在 Initialized 状态下是空操作
    codec.initialize().unwrap_or_else(|err| panic!("{err}"));
    assert_eq!(decode_all(&codec, &stream).len(), 2000);
}
