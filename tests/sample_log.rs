//! Log de amostras em disco: thread de escrita, leitura e exportação.

use std::fs;
use std::io::Write;

use proptest::prelude::*;

use binance_signals::features::{self, FeatureVector, NUM_FEATURES};
use binance_signals::sample_log::{export_training_csv, read_samples, SampleSink, SampleWriter};
use binance_signals::types::{Sample, Side, Signal, Trade};

fn computed_features() -> FeatureVector {
    let trades = [
        Trade::new(68000.1, 0.013, Side::Buy, 1_720_000_000_000),
        Trade::new(68003.7, 0.002, Side::Sell, 1_720_000_000_350),
        Trade::new(67999.9, 0.410, Side::Buy, 1_720_000_001_020),
    ];
    features::compute(&trades).unwrap()
}

fn sample(ts: i64, label: Signal) -> Sample {
    Sample {
        timestamp_ms: ts,
        features: computed_features(),
        predicted_signal: Signal::Buy,
        label,
    }
}

#[test]
fn writer_thread_appends_and_reader_restores_bits() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("samples.jsonl");

    let writer = SampleWriter::spawn(&path).unwrap();
    let mut sink = writer.sink();
    for i in 0..25 {
        sink.append(sample(i, Signal::Hold)).unwrap();
    }
    drop(sink);
    assert_eq!(writer.finish().unwrap(), 25);

    // Segunda execução acrescenta, não trunca.
    let writer = SampleWriter::spawn(&path).unwrap();
    let mut sink = writer.sink();
    sink.append(sample(99, Signal::Sell)).unwrap();
    drop(sink);
    assert_eq!(writer.finish().unwrap(), 1);

    let log = read_samples(&path).unwrap();
    assert_eq!(log.skipped, 0);
    assert_eq!(log.samples.len(), 26);
    assert_eq!(log.samples[25].label, Signal::Sell);

    let original = computed_features();
    for restored in &log.samples {
        for (a, b) in restored.features.values().iter().zip(original.values()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }
}

#[test]
fn reader_skips_bad_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("samples.jsonl");
    let mut file = fs::File::create(&path).unwrap();
    writeln!(file, "{}", serde_json::to_string(&sample(1, Signal::Buy)).unwrap()).unwrap();
    writeln!(file, "{{\"timestamp\": 2, \"features\": {{}}").unwrap();
    writeln!(file).unwrap();
    writeln!(file, "{}", r#"{"timestamp":3,"features":{},"predicted_signal":0,"label":5}"#).unwrap();
    writeln!(file, "{}", serde_json::to_string(&sample(4, Signal::Sell)).unwrap()).unwrap();
    drop(file);

    let log = read_samples(&path).unwrap();
    assert_eq!(log.samples.len(), 2);
    assert_eq!(log.skipped, 2);
    assert_eq!(log.samples[1].timestamp_ms, 4);
}

#[test]
fn export_matches_online_vectors() {
    let samples = vec![sample(10, Signal::Buy), sample(11, Signal::Hold)];
    let mut out = Vec::new();
    export_training_csv(&samples, &mut out).unwrap();

    let mut reader = csv::Reader::from_reader(out.as_slice());
    let headers = reader.headers().unwrap().clone();
    assert_eq!(headers.len(), NUM_FEATURES + 4);

    let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
    assert_eq!(rows.len(), 2);
    let expected = computed_features();
    for (i, value) in expected.values().iter().enumerate() {
        let parsed: f64 = rows[0][i + 1].parse().unwrap();
        assert_eq!(parsed.to_bits(), value.to_bits(), "coluna {}", &headers[i + 1]);
    }
    assert_eq!(&rows[0][NUM_FEATURES + 3], "2");
    assert_eq!(&rows[1][NUM_FEATURES + 3], "1");
}

/// Janelas com preços de 2 casas e quantidades de 3 casas, como na Binance.
fn arb_window() -> impl Strategy<Value = Vec<Trade>> {
    prop::collection::vec((90_000u32..110_000, 1u32..50_000, any::<bool>(), 0i64..800), 2..40)
        .prop_map(|rows| {
            let mut ts = 1_720_000_000_000;
            rows.into_iter()
                .map(|(cents, milli, buy, gap)| {
                    ts += gap;
                    let side = if buy { Side::Buy } else { Side::Sell };
                    Trade::new(cents as f64 / 100.0, milli as f64 / 1000.0, side, ts)
                })
                .collect()
        })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn jsonl_line_restores_computed_vectors_bit_for_bit(trades in arb_window()) {
        let fv = features::compute(&trades).unwrap();
        let line = serde_json::to_string(&Sample {
            timestamp_ms: 1,
            features: fv,
            predicted_signal: Signal::Hold,
            label: Signal::Buy,
        })
        .unwrap();
        let back: Sample = serde_json::from_str(&line).unwrap();
        for (a, b) in back.features.values().iter().zip(fv.values()) {
            prop_assert_eq!(a.to_bits(), b.to_bits(), "{} != {}", a, b);
        }
    }
}

#[test]
fn jsonl_line_restores_last_digit_of_mean_price() {
    let value = 944.5200000000041_f64;
    let fv = FeatureVector::from_values([value; NUM_FEATURES]);
    let json = serde_json::to_string(&fv).unwrap();
    let back: FeatureVector = serde_json::from_str(&json).unwrap();
    for restored in back.values() {
        assert_eq!(restored.to_bits(), value.to_bits());
    }
}
