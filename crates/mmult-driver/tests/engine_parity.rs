//! Integration tests for the streaming engine
//!
//! Every run mode (sequential, thread pool, prefetching) and every transport
//! must produce the dense affine transform exactly, in order, with one end
//! marker on the final word.

use mmult_chip::presets::{Compact, Mnist, Unit};
use mmult_chip::{Beat, Geometry};
use mmult_driver::host::{self, Workload};
use mmult_driver::transports::{
    channel_sink, channel_source, BytesSink, BytesSource, MemorySink, MemorySource,
};
use mmult_driver::{Engine, EngineConfig, EngineError, ErrorKind, Parallelism, Stage};
use proptest::prelude::*;
use std::thread;
use std::time::Duration;

/// Three classes on a two-outputs-per-word bus: the offset vector needs a
/// padded word and output words straddle tiles.
#[derive(Debug)]
struct Ragged;

impl Geometry for Ragged {
    const NAME: &'static str = "ragged";
    const BATCH: usize = 6;
    const FEAT: usize = 16;
    const CLASSES: usize = 3;
    const TILING: usize = 3;

    type Word = u64;
    type Input = i8;
    type Weight = i8;
    type Output = i32;
}

/// Unsigned inputs on a 128-bit bus
#[derive(Debug)]
struct Wide;

impl Geometry for Wide {
    const NAME: &'static str = "wide";
    const BATCH: usize = 32;
    const FEAT: usize = 16;
    const CLASSES: usize = 8;
    const TILING: usize = 8;

    type Word = u128;
    type Input = u8;
    type Weight = i8;
    type Output = i32;
}

fn run_memory<G: Geometry>(config: EngineConfig, stream: Vec<G::Word>) -> Vec<Beat<G::Word>> {
    let mut engine = Engine::<G>::new(config).expect("engine");
    let mut sink = MemorySink::new();
    engine
        .run(MemorySource::new(stream), &mut sink)
        .expect("run");
    sink.into_beats()
}

fn run_pipelined<G: Geometry>(config: EngineConfig, stream: Vec<G::Word>) -> Vec<Beat<G::Word>> {
    let mut engine = Engine::<G>::new(config).expect("engine");
    let mut sink = MemorySink::new();
    engine
        .run_pipelined(MemorySource::new(stream), &mut sink)
        .expect("pipelined run");
    sink.into_beats()
}

fn assert_matches_reference<G: Geometry>(work: &Workload<G>, beats: &[Beat<G::Word>]) {
    use mmult_chip::Lane;

    let out = host::decode_outputs::<G>(beats).expect("well-formed output");
    let expected = work.reference().expect("reference");
    assert_eq!(out.len(), expected.len());
    for (i, (o, e)) in out.iter().zip(&expected).enumerate() {
        let (row, class) = (i / G::CLASSES, i % G::CLASSES);
        assert_eq!(o.widen(), *e, "row {row}, class {class}");
    }
}

#[test]
fn unit_scenario() {
    let stream =
        host::encode_stream::<Unit>(&[1, 2], &[1, 1, 1, 1, 2, 0, 0, 2], &[1, 2, 3, 4, 1, 2, 3, 4])
            .unwrap();
    let beats = run_memory::<Unit>(EngineConfig::default(), stream);
    assert_eq!(host::decode_outputs::<Unit>(&beats).unwrap(), vec![11, 12, 11, 12]);
}

#[test]
fn every_mode_matches_reference() {
    let work = Workload::<Compact>::synthetic(1);
    let stream = work.stream().unwrap();

    let seq = run_memory::<Compact>(EngineConfig::default(), stream.clone());
    assert_matches_reference(&work, &seq);

    let par = run_memory::<Compact>(EngineConfig::default().with_threads(3), stream.clone());
    let auto = run_memory::<Compact>(
        EngineConfig::default().with_parallelism(Parallelism::Auto),
        stream.clone(),
    );
    let piped = run_pipelined::<Compact>(
        EngineConfig::default().with_threads(2).with_prefetch_depth(3),
        stream,
    );

    assert_eq!(seq, par);
    assert_eq!(seq, auto);
    assert_eq!(seq, piped);
}

#[test]
fn ragged_geometry_carries_words_across_tiles() {
    let dims = Ragged::DIMS;
    assert_eq!(dims.offset_words(), 2);
    assert_eq!(dims.tile_outputs() % dims.out_ratio(), 1);

    let work = Workload::<Ragged>::synthetic(9);
    let beats = run_memory::<Ragged>(EngineConfig::default(), work.stream().unwrap());
    assert_eq!(beats.len(), dims.output_words());
    assert_matches_reference(&work, &beats);
}

#[test]
fn wide_words_with_unsigned_inputs() {
    let work = Workload::<Wide>::synthetic(5);
    assert!(work.inputs.iter().any(|&x| x > 127));
    let beats = run_pipelined::<Wide>(EngineConfig::default(), work.stream().unwrap());
    assert_matches_reference(&work, &beats);
}

#[test]
fn mnist_preset_matches_reference() {
    let work = Workload::<Mnist>::synthetic(2026);
    let config = EngineConfig::for_dims(&Mnist::DIMS);
    let mut engine = Engine::<Mnist>::new(config).unwrap();
    let mut sink = MemorySink::with_capacity(Mnist::DIMS.output_words());
    let report = engine
        .run_pipelined(MemorySource::new(work.stream().unwrap()), &mut sink)
        .unwrap();

    assert_eq!(report.tiles, 64);
    assert_eq!(report.words_consumed, Mnist::DIMS.input_words());
    assert_eq!(report.words_produced, 40_960);
    assert_matches_reference(&work, sink.beats());
}

#[test]
fn exactly_one_end_marker_on_final_word() {
    let beats = run_memory::<Compact>(
        EngineConfig::default(),
        Workload::<Compact>::synthetic(3).stream().unwrap(),
    );
    let marked: Vec<usize> = beats
        .iter()
        .enumerate()
        .filter(|(_, b)| b.last)
        .map(|(i, _)| i)
        .collect();
    assert_eq!(marked, vec![beats.len() - 1]);
}

#[test]
fn consumes_exactly_the_expected_words() {
    let mut stream = Workload::<Compact>::synthetic(4).stream().unwrap();
    stream.extend([0xdead_beef; 5]);
    let mut source = MemorySource::new(stream);

    let mut engine = Engine::<Compact>::new(EngineConfig::default()).unwrap();
    let report = engine.run(&mut source, MemorySink::new()).unwrap();

    assert_eq!(report.words_consumed, Compact::DIMS.input_words());
    assert_eq!(report.words_produced, Compact::DIMS.output_words());
    assert_eq!(source.remaining(), 5);
}

#[test]
fn loaded_parameters_match_the_workload() {
    let work = Workload::<Ragged>::synthetic(12);
    let mut engine = Engine::<Ragged>::new(EngineConfig::default().with_threads(2)).unwrap();
    assert_eq!(engine.config().parallelism, Parallelism::threads(2));

    engine
        .run(MemorySource::new(work.stream().unwrap()), MemorySink::new())
        .unwrap();

    let params = engine.parameters();
    assert_eq!(params.offsets(), work.offsets.as_slice());
    assert_eq!(params.weights(), work.weights.as_slice());
    assert_eq!(params.weight_row(2), &work.weights[2 * Ragged::FEAT..]);
}

#[test]
fn repeated_runs_are_bit_identical() {
    let stream = Workload::<Compact>::synthetic(6).stream().unwrap();
    let mut engine = Engine::<Compact>::new(EngineConfig::default().with_threads(2)).unwrap();

    let mut first = MemorySink::new();
    engine.run(MemorySource::new(stream.clone()), &mut first).unwrap();
    engine.reset();
    let mut second = MemorySink::new();
    engine.run(MemorySource::new(stream), &mut second).unwrap();

    assert_eq!(first.beats(), second.beats());
}

#[test]
fn short_stream_names_the_section() {
    let dims = Compact::DIMS;
    let stream = Workload::<Compact>::synthetic(7).stream().unwrap();
    let cases = [
        (1, "offset vector"),
        (dims.offset_words() + 3, "weight matrix"),
        (dims.parameter_words() + dims.tile_words() + 1, "input tile"),
        (dims.input_words() - 1, "input tile"),
    ];

    for (len, section) in cases {
        let mut engine = Engine::<Compact>::new(EngineConfig::default()).unwrap();
        let err = engine
            .run(MemorySource::new(stream[..len].to_vec()), MemorySink::new())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MalformedInput, "{len} words");
        assert!(
            matches!(err, EngineError::MalformedInput { section: s, consumed, .. } if s == section && consumed == len),
            "{len} words: {err}"
        );
        assert_eq!(engine.stage(), Stage::Failed);
    }
}

#[test]
fn empty_stream_is_malformed() {
    let mut engine = Engine::<Unit>::new(EngineConfig::default()).unwrap();
    let err = engine
        .run_pipelined(MemorySource::new(Vec::new()), MemorySink::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[test]
fn overflow_is_reported_not_wrapped() {
    let dims = Compact::DIMS;
    let offsets = [0, 0, i32::MIN, 0];
    let weights = vec![-1i8; dims.classes * dims.feat];
    let inputs = vec![1i8; dims.batch * dims.feat];
    let stream = host::encode_stream::<Compact>(&offsets, &weights, &inputs).unwrap();

    let mut engine = Engine::<Compact>::new(EngineConfig::default()).unwrap();
    let mut sink = MemorySink::new();
    let err = engine.run(MemorySource::new(stream), &mut sink).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Overflow);
    assert!(matches!(err, EngineError::Overflow { row: 0, class: 2, .. }));
    assert!(sink.beats().is_empty());
    assert_eq!(engine.stage(), Stage::Failed);
}

#[test]
fn failed_engine_rejects_runs_until_reset() {
    let mut engine = Engine::<Unit>::new(EngineConfig::default()).unwrap();
    assert!(engine
        .run(MemorySource::new(vec![1u32]), MemorySink::new())
        .is_err());

    let good = Workload::<Unit>::synthetic(0).stream().unwrap();
    let err = engine
        .run(MemorySource::new(good.clone()), MemorySink::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);

    engine.reset();
    assert!(engine.run(MemorySource::new(good), MemorySink::new()).is_ok());
}

#[test]
fn channel_transport_end_to_end() {
    let work = Workload::<Compact>::synthetic(11);
    let stream = work.stream().unwrap();
    let (tx, source) = channel_source::<u64>(8);
    let (sink, rx) = channel_sink::<u64>(4);

    let producer = thread::spawn(move || {
        for word in stream {
            tx.send(word).unwrap();
        }
    });
    let consumer = thread::spawn(move || rx.iter().collect::<Vec<_>>());

    let mut engine = Engine::<Compact>::new(EngineConfig::default()).unwrap();
    engine
        .run_pipelined(source.with_timeout(Duration::from_secs(10)), sink)
        .unwrap();

    producer.join().unwrap();
    let beats = consumer.join().unwrap();
    assert_matches_reference(&work, &beats);
}

#[test]
fn stalled_producer_times_out() {
    let stream = Workload::<Unit>::synthetic(12).stream().unwrap();
    let (tx, source) = channel_source::<u32>(16);
    for &word in &stream[..Unit::DIMS.parameter_words()] {
        tx.send(word).unwrap();
    }

    let mut engine = Engine::<Unit>::new(EngineConfig::default()).unwrap();
    let err = engine
        .run(
            source.with_timeout(Duration::from_millis(20)),
            MemorySink::new(),
        )
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(matches!(err, EngineError::Timeout { duration_ms: 20 }));
    assert_eq!(engine.stage(), Stage::Failed);
    drop(tx);
}

#[test]
fn hung_up_producer_is_a_short_stream() {
    let stream = Workload::<Unit>::synthetic(13).stream().unwrap();
    let (tx, source) = channel_source::<u32>(16);
    for &word in &stream[..3] {
        tx.send(word).unwrap();
    }
    drop(tx);

    let mut engine = Engine::<Unit>::new(EngineConfig::default()).unwrap();
    let err = engine.run(source, MemorySink::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::MalformedInput);
}

#[test]
fn byte_images_in_and_out() {
    let work = Workload::<Compact>::synthetic(14);
    let image: Vec<u8> = work
        .stream()
        .unwrap()
        .iter()
        .flat_map(|w| w.to_le_bytes())
        .collect();

    let dims = Compact::DIMS;
    let mut sink = BytesSink::<u64>::with_capacity(dims.output_words());
    let mut engine = Engine::<Compact>::new(EngineConfig::default()).unwrap();
    engine.run(BytesSource::new(image), &mut sink).unwrap();

    assert_eq!(sink.words(), dims.output_words());
    assert!(sink.end_marked());

    let out = sink.freeze();
    assert_eq!(out.len(), dims.output_words() * 8);
    let beats: Vec<Beat<u64>> = out
        .chunks_exact(8)
        .enumerate()
        .map(|(i, b)| {
            let word = u64::from_le_bytes(b.try_into().unwrap());
            Beat::with_last(word, i + 1 == dims.output_words())
        })
        .collect();
    assert_matches_reference(&work, &beats);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn ragged_engine_matches_reference(
        offsets in prop::collection::vec(-1_000_000i32..1_000_000, 3),
        weights in prop::collection::vec(any::<i8>(), 3 * 16),
        inputs in prop::collection::vec(any::<i8>(), 6 * 16),
        threads in 1usize..4,
    ) {
        let stream = host::encode_stream::<Ragged>(&offsets, &weights, &inputs).unwrap();
        let expected = host::reference_affine::<Ragged>(&offsets, &weights, &inputs).unwrap();

        let seq = run_memory::<Ragged>(EngineConfig::default(), stream.clone());
        let piped = run_pipelined::<Ragged>(EngineConfig::default().with_threads(threads), stream);
        prop_assert_eq!(&seq, &piped);

        let out = host::decode_outputs::<Ragged>(&seq).unwrap();
        let out: Vec<i64> = out.into_iter().map(i64::from).collect();
        prop_assert_eq!(out, expected);
    }

    #[test]
    fn truncated_stream_never_panics(cut in 0usize..Compact::DIMS.input_words()) {
        let stream = Workload::<Compact>::synthetic(15).stream().unwrap();
        let mut engine = Engine::<Compact>::new(EngineConfig::default()).unwrap();
        let err = engine
            .run(MemorySource::new(stream[..cut].to_vec()), MemorySink::new())
            .unwrap_err();
        prop_assert_eq!(err.kind(), ErrorKind::MalformedInput);
    }
}
