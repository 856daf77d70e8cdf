//! Criterion benchmarks for sealing and opening transport envelopes.
//!
//! Measures the per-frame cost a transcript chunk pays on the hot path:
//! JSON encoding, ChaCha20-Poly1305, and the wire codec.
//!
//! Run with:
//! ```bash
//! cargo bench --package dictation-core --bench envelope_bench
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dictation_core::protocol::messages::TranscriptChunkMessage;
use dictation_core::{
    decode_frame, derive_session_key, encode_frame, PairingCode, Role, SessionCipher, TransportMessage,
    WireFrame,
};

// ── Fixtures ──────────────────────────────────────────────────────────────────

fn make_chunk(text_len: usize) -> TransportMessage {
    TransportMessage::TranscriptChunk(TranscriptChunkMessage {
        session_id: "bench-session".to_string(),
        sequence_number: 1,
        text: "a".repeat(text_len),
        is_final: false,
    })
}

fn make_ciphers() -> (SessionCipher, SessionCipher) {
    let code = PairingCode::new("482913").unwrap();
    let client = derive_session_key(&code, "A1", "B2", Role::Client).unwrap();
    let host = derive_session_key(&code, "B2", "A1", Role::Host).unwrap();
    (
        SessionCipher::new(&client, Role::Client).unwrap(),
        SessionCipher::new(&host, Role::Host).unwrap(),
    )
}

// ── Benchmarks ────────────────────────────────────────────────────────────────

fn bench_key_derivation(c: &mut Criterion) {
    let code = PairingCode::new("482913").unwrap();
    c.bench_function("derive_session_key", |b| {
        b.iter(|| derive_session_key(black_box(&code), black_box("A1"), black_box("B2"), Role::Client).unwrap())
    });
}

fn bench_seal(c: &mut Criterion) {
    let mut group = c.benchmark_group("seal");
    for len in [16usize, 256, 4096] {
        let msg = make_chunk(len);
        let (mut client, _) = make_ciphers();
        group.bench_with_input(BenchmarkId::from_parameter(len), &msg, |b, msg| {
            b.iter(|| client.seal(black_box(msg)).unwrap())
        });
    }
    group.finish();
}

fn bench_wire_roundtrip(c: &mut Criterion) {
    let mut group = c.benchmark_group("wire_roundtrip");
    for len in [16usize, 256, 4096] {
        let msg = make_chunk(len);
        group.bench_with_input(BenchmarkId::from_parameter(len), &msg, |b, msg| {
            // Fresh ciphers per batch keep sender and receiver counters in step.
            b.iter_batched(
                make_ciphers,
                |(mut client, mut host)| {
                    let env = client.seal(black_box(msg)).unwrap();
                    let text = encode_frame(&WireFrame::Sealed(env)).unwrap();
                    match decode_frame(black_box(&text)).unwrap() {
                        WireFrame::Sealed(env) => host.open(&env).unwrap(),
                        WireFrame::Plain(msg) => msg,
                    }
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_key_derivation, bench_seal, bench_wire_roundtrip);
criterion_main!(benches);
