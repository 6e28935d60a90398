use criterion::{criterion_group, criterion_main, Criterion};
use std::path::Path;

fn fixture_bytes(name: &str) -> Vec<u8> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    std::fs::read(path).unwrap()
}

fn bench_walk_parts(c: &mut Criterion) {
    let raw = fixture_bytes("noname.eml");

    c.bench_function("walk_disposition_parts", |b| {
        b.iter(|| {
            let message = lostphotosfound::parser::mime::parse_message(&raw).unwrap();
            message.disposition_parts().len()
        })
    });
}

fn bench_extract(c: &mut Criterion) {
    let raw = fixture_bytes("photo.eml");
    let tmp = tempfile::tempdir().unwrap();
    let mut extractor =
        lostphotosfound::export::attachment::AttachmentExtractor::new(tmp.path());

    // The first call writes the file; later iterations hit the already-present path.
    c.bench_function("extract_photo_message", |b| {
        b.iter(|| extractor.extract(&raw).unwrap())
    });
}

fn bench_header_decoding(c: &mut Criterion) {
    c.bench_function("decode_encoded_words", |b| {
        b.iter(|| {
            lostphotosfound::parser::header::decode_encoded_words(
                "=?ISO-8859-1?Q?Caf=E9?= =?UTF-8?B?IGNvbiBsZcOxYQ==?=",
            )
        })
    });
}

criterion_group!(benches, bench_walk_parts, bench_extract, bench_header_decoding);
criterion_main!(benches);
