use criterion::{criterion_group, criterion_main, Criterion};

use rfsnap::collector::StyleCollector;
use rfsnap::composer::compose;
use rfsnap::inliner::StyleInliner;
use rfsnap::{CaptureOptions, Capturer, Document, Target};

fn page() -> String {
    let mut items = String::new();
    for i in 0..40 {
        items.push_str(&format!(
            "<li class=\"item\"><span class=\"name\">Entry {i}</span> <em>detail text for row {i}</em></li>"
        ));
    }
    format!(
        r#"<html><head><style>
            .list {{ width: 320px; padding: 8px; background: #fafafa; font-size: 13px }}
            .item {{ padding: 4px; border-bottom: 1px solid #dddddd }}
            .name {{ font-weight: bold; color: #224466 }}
        </style></head><body><ul class="list" id="list">{items}</ul></body></html>"#
    )
}

fn bench_sync_stages(c: &mut Criterion) {
    let doc = Document::parse(&page(), "https://bench.example/").expect("parse");
    let resolver = doc.style_resolver();
    let list = doc.resolve(&Target::selector("#list")).expect("target");

    c.bench_function("collect_styles", |b| {
        b.iter(|| StyleCollector::new(&doc).collect().blob())
    });

    c.bench_function("inline_and_compose", |b| {
        b.iter(|| {
            let fragment = StyleInliner::new(&resolver).inline(list);
            compose(&fragment.to_xhtml(), "", 336.0, 900.0)
        })
    });
}

fn bench_full_capture(c: &mut Criterion) {
    let doc = Document::parse(&page(), "https://bench.example/").expect("parse");
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let target = Target::selector("#list");
    let options = CaptureOptions::default();

    c.bench_function("capture_list", |b| {
        b.iter(|| {
            runtime
                .block_on(Capturer::new(&doc).capture(&target, &options))
                .expect("capture")
        })
    });
}

criterion_group!(benches, bench_sync_stages, bench_full_capture);
criterion_main!(benches);
