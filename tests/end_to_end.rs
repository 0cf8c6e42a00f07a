//! Capture-to-report tests through a full session with mock encoder and transport

use parking_lot::Mutex;
use std::sync::Arc;

use ds4_audio_streamer::audio::{CaptureFormat, ManualCapture, ManualFeeder};
use ds4_audio_streamer::codec::FrameEncoder;
use ds4_audio_streamer::error::{CodecError, Error, TransportError};
use ds4_audio_streamer::protocol::{parse_report, AudioMode, BatchSize};
use ds4_audio_streamer::stream::{AudioPipeline, FrameEmitter, PipelineConfig, StreamSession};
use ds4_audio_streamer::transport::Transport;

/// Tags every frame with its sequence number
struct SequenceEncoder {
    code_size: usize,
    frame_size: usize,
    next: u8,
}

impl FrameEncoder for SequenceEncoder {
    fn code_size(&self) -> usize {
        self.code_size
    }

    fn frame_size(&self) -> usize {
        self.frame_size
    }

    fn encode(&mut self, input: &[u8], output: &mut [u8]) -> Result<usize, CodecError> {
        assert_eq!(input.len(), self.code_size);
        output.fill(self.next);
        self.next = self.next.wrapping_add(1);
        Ok(self.frame_size)
    }
}

#[derive(Clone, Default)]
struct Recorder {
    reports: Arc<Mutex<Vec<Vec<u8>>>>,
    fail: Arc<Mutex<bool>>,
}

impl Transport for Recorder {
    fn write_report(&mut self, report: &[u8]) -> Result<(), TransportError> {
        if *self.fail.lock() {
            return Err(TransportError::Disconnected);
        }
        self.reports.lock().push(report.to_vec());
        Ok(())
    }
}

const FORMAT: CaptureFormat = CaptureFormat {
    sample_rate: 32000,
    channels: 2,
};

/// 10 stereo frames of i16 PCM per code block
const CODE_SIZE: usize = 40;
const FRAME_SIZE: usize = 100;

fn build(
    format: CaptureFormat,
    encoder: Box<dyn FrameEncoder>,
    recorder: Recorder,
) -> (StreamSession<ManualCapture, FrameEmitter<Recorder>>, ManualFeeder) {
    let config = PipelineConfig {
        capture: format,
        target_sample_rate: 32000,
        target_channels: 2,
        buffer_latency_ms: 32,
    };
    let emitter = FrameEmitter::new(recorder, AudioMode::Headset, 1);
    let pipeline = AudioPipeline::new(config, encoder, emitter).unwrap();
    let (capture, feeder) = ManualCapture::new(format);
    (StreamSession::new(capture, pipeline).unwrap(), feeder)
}

fn sequence_encoder() -> Box<dyn FrameEncoder> {
    Box::new(SequenceEncoder {
        code_size: CODE_SIZE,
        frame_size: FRAME_SIZE,
        next: 0,
    })
}

/// (frames, counter, frame tags) for each recorded report, checksum verified
fn decode(reports: &[Vec<u8>]) -> Vec<(usize, u16, Vec<u8>)> {
    reports
        .iter()
        .map(|bytes| {
            let report = parse_report(bytes).expect("report with valid checksum");
            let frames = report.batch.frames();
            let tags = report.payload[..frames * FRAME_SIZE]
                .chunks(FRAME_SIZE)
                .map(|frame| {
                    assert!(frame.iter().all(|&b| b == frame[0]));
                    frame[0]
                })
                .collect();
            (frames, report.counter, tags)
        })
        .collect()
}

#[test]
fn steady_trickle_sends_two_frame_reports() {
    let recorder = Recorder::default();
    let (mut session, feeder) = build(FORMAT, sequence_encoder(), recorder.clone());
    session.start().unwrap();

    // 0.9 of a code block per capture block: 10 blocks encode 9 frames
    for _ in 0..10 {
        assert!(feeder.push(&[0.1; 18]));
    }

    let decoded = decode(&recorder.reports.lock());
    assert_eq!(
        decoded,
        vec![
            (2, 0, vec![0, 1]),
            (2, 2, vec![2, 3]),
            (2, 4, vec![4, 5]),
            (2, 6, vec![6, 7]),
        ]
    );

    let stats = session.stats();
    assert_eq!(stats.frames_encoded, 9);
    assert_eq!(stats.two_frame_batches, 4);
    assert_eq!(stats.four_frame_batches, 0);
    assert_eq!(stats.underflow_cycles, 6);
    assert_eq!(stats.raw_glitches + stats.encoded_glitches, 0);
    // The ninth frame waits for a partner
    session.with_pipeline(|p| assert_eq!(p.encoded_buffer().current_length(), FRAME_SIZE));

    session.stop();
}

#[test]
fn bursty_capture_sends_four_frame_reports() {
    let recorder = Recorder::default();
    let (mut session, feeder) = build(FORMAT, sequence_encoder(), recorder.clone());
    session.start().unwrap();

    // 4.5 code blocks per capture block
    for _ in 0..3 {
        feeder.push(&[-0.2; 90]);
    }

    let reports = recorder.reports.lock().clone();
    assert!(reports.iter().all(|r| r.len() == BatchSize::Four.wire_len()));
    assert!(reports.iter().all(|r| r[462] == 1));

    let decoded = decode(&reports);
    assert_eq!(
        decoded,
        vec![
            (4, 0, vec![0, 1, 2, 3]),
            (4, 4, vec![4, 5, 6, 7]),
            (4, 8, vec![8, 9, 10, 11]),
        ]
    );
    assert_eq!(session.stats().frames_encoded, 13);
    assert_eq!(session.stats().underflow_cycles, 0);
}

#[test]
fn restart_resets_counter() {
    let recorder = Recorder::default();
    let (mut session, feeder) = build(FORMAT, sequence_encoder(), recorder.clone());

    session.start().unwrap();
    feeder.push(&[0.0; 80]);
    session.stop();

    session.start().unwrap();
    feeder.push(&[0.0; 40]);
    session.stop();

    let counters: Vec<u16> = decode(&recorder.reports.lock())
        .into_iter()
        .map(|(_, counter, _)| counter)
        .collect();
    assert_eq!(counters, vec![0, 0]);
}

#[test]
fn transport_failure_ends_the_session() {
    let recorder = Recorder::default();
    let (mut session, feeder) = build(FORMAT, sequence_encoder(), recorder.clone());
    session.start().unwrap();

    feeder.push(&[0.0; 40]);
    assert_eq!(recorder.reports.lock().len(), 1);

    *recorder.fail.lock() = true;
    feeder.push(&[0.0; 40]);
    assert!(matches!(
        session.check_error(),
        Some(Error::Transport(TransportError::Disconnected))
    ));
    assert!(!session.is_running());

    *recorder.fail.lock() = false;
    feeder.push(&[0.0; 40]);
    assert_eq!(recorder.reports.lock().len(), 1);
}

#[test]
fn resampled_capture_produces_valid_reports() {
    let recorder = Recorder::default();
    let native = CaptureFormat {
        sample_rate: 48000,
        channels: 2,
    };
    let encoder = Box::new(SequenceEncoder {
        code_size: 512,
        frame_size: 109,
        next: 0,
    });
    let config = PipelineConfig {
        capture: native,
        target_sample_rate: 32000,
        target_channels: 2,
        buffer_latency_ms: 32,
    };
    let emitter = FrameEmitter::new(recorder.clone(), AudioMode::Speaker, 1);
    let pipeline = AudioPipeline::new(config, encoder, emitter).unwrap();
    let (capture, feeder) = ManualCapture::new(native);
    let mut session = StreamSession::new(capture, pipeline).unwrap();
    session.start().unwrap();

    // One second of a 440Hz tone in 10ms blocks
    let mut phase = 0.0f32;
    let step = 2.0 * std::f32::consts::PI * 440.0 / 48000.0;
    for _ in 0..100 {
        let mut block = Vec::with_capacity(960);
        for _ in 0..480 {
            let s = 0.5 * phase.sin();
            block.push(s);
            block.push(s);
            phase += step;
        }
        feeder.push(&block);
    }
    session.stop();

    // 32000 frames of 4 bytes make 250 code blocks, minus filter delay
    let stats = session.stats();
    assert!(stats.frames_encoded > 200, "{:?}", stats);
    assert!(stats.frames_encoded <= 250, "{:?}", stats);
    assert_eq!(stats.resample_failures, 0);

    let reports = recorder.reports.lock();
    let mut expected_counter = 0u16;
    for bytes in reports.iter() {
        let report = parse_report(bytes).expect("valid report");
        assert_eq!(report.counter, expected_counter);
        assert_eq!(report.mode_flag, 0x02);
        expected_counter = expected_counter.wrapping_add(report.batch.frames() as u16);
    }
    assert_eq!(stats.frames_sent(), expected_counter as u64);
}

#[test]
fn warmup_holds_back_the_first_report() {
    let recorder = Recorder::default();
    let (mut session, feeder) = build(FORMAT, sequence_encoder(), recorder.clone());
    session.set_warmup_frames(4);
    session.start().unwrap();

    // One code block per capture block
    for _ in 0..3 {
        feeder.push(&[0.1; 20]);
        assert!(recorder.reports.lock().is_empty());
    }
    assert!(!session.wait_for_warmup(std::time::Duration::from_millis(20)));

    feeder.push(&[0.1; 20]);
    assert!(session.wait_for_warmup(std::time::Duration::from_millis(20)));

    for _ in 0..4 {
        feeder.push(&[0.1; 20]);
    }

    let decoded = decode(&recorder.reports.lock());
    assert_eq!(
        decoded,
        vec![
            (4, 0, vec![0, 1, 2, 3]),
            (2, 4, vec![4, 5]),
            (2, 6, vec![6, 7]),
        ]
    );
    let stats = session.stats();
    assert_eq!(stats.warmup_cycles, 3);
    assert_eq!(stats.underflow_cycles, 2);
}
