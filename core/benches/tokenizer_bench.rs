use criterion::{criterion_group, criterion_main, Criterion};
use sitesearch_core::extract::extract_page;
use sitesearch_core::{HookRegistry, Locale, PageInput};

fn sample_html() -> String {
    let row = "<p>The quick brown fox jumps over the lazy dog.</p>\
               <script>var x = 1;</script>\
               <img alt=\"fox\" title=\"dog\">";
    format!(
        "<head><meta name=\"description\" content=\"sample page\"></head><body>{}</body>",
        row.repeat(100)
    )
}

fn bench_tokenize(c: &mut Criterion) {
    let locale = Locale::default();
    let text = "The quick brown fox jumps over the lazy dog. ".repeat(200);
    c.bench_function("tokenize_sample", |b| b.iter(|| locale.words(&text)));
}

fn bench_extract(c: &mut Criterion) {
    let page = PageInput {
        url: "/bench".into(),
        pid: 1,
        title: "Benchmark".into(),
        language: "en".into(),
        protected: false,
        groups: vec![],
        content: sample_html(),
        filesize: None,
    };
    let hooks = HookRegistry::new();
    c.bench_function("extract_sample", |b| b.iter(|| extract_page(&page, &hooks)));
}

criterion_group!(benches, bench_tokenize, bench_extract);
criterion_main!(benches);
