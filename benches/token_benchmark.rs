use chrono::{Duration, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use macroblog::models::Post;
use macroblog::services::token::{decode_claims, is_token_expired};
use serde_json::json;
use std::hint::black_box;

fn benchmark_token_expiry(c: &mut Criterion) {
    let now = Utc::now();
    let claims = json!({
        "scope": "com.atproto.access",
        "sub": "did:plc:abc",
        "iat": now.timestamp(),
        "exp": (now + Duration::hours(1)).timestamp(),
    });
    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"bench"),
    )
    .expect("Failed to mint token");

    let mut group = c.benchmark_group("token_expiry");

    group.bench_function("decode_claims", |b| {
        b.iter(|| decode_claims(black_box(&token)))
    });

    group.bench_function("is_token_expired", |b| {
        b.iter(|| is_token_expired(black_box(&token), now, Duration::minutes(5)))
    });

    group.bench_function("garbage_token", |b| {
        b.iter(|| is_token_expired(black_box("not.a.jwt"), now, Duration::minutes(5)))
    });

    group.finish();
}

fn benchmark_record_filtering(c: &mut Criterion) {
    let now = Utc::now();
    let records: Vec<_> = (0..100)
        .map(|i| {
            let value = if i % 10 == 0 {
                json!({ "text": "missing title" })
            } else {
                json!({
                    "$type": "com.macroblog.blog.post",
                    "title": format!("Post {i}"),
                    "text": "lorem ipsum ".repeat(200),
                    "tags": ["bench"],
                    "createdAt": "2026-01-01T00:00:00Z",
                })
            };
            (format!("at://did:plc:abc/com.macroblog.blog.post/{i}"), value)
        })
        .collect();

    c.bench_function("filter_page_of_100", |b| {
        b.iter(|| {
            records
                .iter()
                .filter_map(|(uri, value)| Post::from_record(uri, Some("bafy"), value, now).ok())
                .count()
        })
    });
}

criterion_group!(benches, benchmark_token_expiry, benchmark_record_filtering);
criterion_main!(benches);
