//! Decoder micro-benchmarks.
//!
//! The decoder sits on the hot receive path of both stream channels, so
//! its throughput bounds how fast the runtime can drain a busy socket.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use polytrader::adapters::feeds::MessageDecoder;

fn legacy_frame() -> String {
    r#"{"event_type":"price_change","market":"0xmarket","asset_id":"1234567890","price":"0.70","bid":"0.69","ask":"0.71","timestamp":"1700000000000"}"#
        .to_string()
}

fn batched_frame(n: usize) -> String {
    let elements: Vec<String> = (0..n)
        .map(|i| {
            format!(
                r#"{{"asset_id":"token-{i}","price":"0.6{i}","best_bid":"0.60","best_ask":"0.70"}}"#
            )
        })
        .collect();
    format!(
        r#"{{"event_type":"price_change","market":"0xmarket","price_changes":[{}]}}"#,
        elements.join(",")
    )
}

fn book_frame(depth: usize) -> String {
    let levels: Vec<String> = (0..depth)
        .map(|i| format!(r#"{{"price":"0.{:02}","size":"{}"}}"#, 10 + i, 100 + i))
        .collect();
    format!(
        r#"{{"event_type":"book","market":"0xmarket","asset_id":"1234567890","bids":[{0}],"asks":[{0}],"timestamp":"1700000000000"}}"#,
        levels.join(",")
    )
}

fn bench_decoder(c: &mut Criterion) {
    let legacy = legacy_frame();
    let batched = batched_frame(32);
    let book = book_frame(50);

    c.bench_function("decode_legacy_price_change", |b| {
        let mut decoder = MessageDecoder::new();
        b.iter(|| black_box(decoder.decode(black_box(&legacy))));
    });

    c.bench_function("decode_batched_price_change_32", |b| {
        let mut decoder = MessageDecoder::new();
        b.iter(|| black_box(decoder.decode(black_box(&batched))));
    });

    c.bench_function("decode_book_depth_50", |b| {
        let mut decoder = MessageDecoder::new();
        b.iter(|| black_box(decoder.decode(black_box(&book))));
    });
}

criterion_group!(benches, bench_decoder);
criterion_main!(benches);
