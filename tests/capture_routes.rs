use std::cell::Cell;

use futures::future::LocalBoxFuture;
use rfsnap::rendering::{FallbackRenderer, Image, ImageLoader, ImageRequest, PaintCommand, SvgImageLoader};
use rfsnap::{CaptureOptions, Capturer, Document, Error, ImageFormat, RouteKind, Target};

const PAGE: &str = r#"<html><head><style>
    .panel { width: 200px; height: 100px; background: #2266aa; border: 2px solid #113355; box-sizing: border-box }
    .note { width: 160px; padding: 6px; background: #fff8dc; color: #333333; font-size: 14px }
    .ghost { display: none }
    #remote { width: 120px; height: 30px }
    #menu { width: 90px; height: 28px; background: #eeeeee }
</style></head><body>
    <div class="panel" id="panel"></div>
    <p class="note" id="note">This note has far more words than fit on a single line of its box</p>
    <div class="ghost"><span id="hidden">invisible</span></div>
    <div id="menu" x-data="{ open: false }"><button x-on:click="open = true" x-bind:class="{ on: open }">Open</button></div>
    <div id="remote"><img src="https://images.other.example/logo.png" alt="logo"></div>
</body></html>"#;

fn document() -> Document {
    Document::parse(PAGE, "https://app.example/dashboard").expect("parse page")
}

struct Rejecting;

impl ImageLoader for Rejecting {
    fn load<'a>(&'a self, _request: ImageRequest<'a>) -> LocalBoxFuture<'a, rfsnap::Result<Box<dyn Image>>> {
        Box::pin(async { Err(Error::ImageLoad("image decoding disabled".to_string())) })
    }
}

/// Rejects the first load, then behaves like the default loader.
#[derive(Default)]
struct FailsOnce {
    calls: Cell<usize>,
}

impl ImageLoader for FailsOnce {
    fn load<'a>(&'a self, request: ImageRequest<'a>) -> LocalBoxFuture<'a, rfsnap::Result<Box<dyn Image>>> {
        let n = self.calls.get();
        self.calls.set(n + 1);
        if n == 0 {
            Box::pin(async { Err(Error::ImageLoad("first load rejected".to_string())) })
        } else {
            SvgImageLoader.load(request)
        }
    }
}

struct Hangs;

impl ImageLoader for Hangs {
    fn load<'a>(&'a self, _request: ImageRequest<'a>) -> LocalBoxFuture<'a, rfsnap::Result<Box<dyn Image>>> {
        Box::pin(futures::future::pending())
    }
}

#[tokio::test]
async fn vector_route_produces_requested_format() {
    let doc = document();
    let report = Capturer::new(&doc)
        .capture_detailed(&Target::selector("#panel"), &CaptureOptions::default())
        .await
        .unwrap();
    assert_eq!(report.route, RouteKind::ClonedVectorEmbed);
    assert_eq!(report.image.mime(), "image/png");
    assert!(!report.image.is_empty());
    assert_eq!((report.image.width(), report.image.height()), (200, 100));

    let pixels = report.image.decode().unwrap();
    // border then fill
    assert_eq!(pixels.get_pixel(0, 0).0, [0x11, 0x33, 0x55, 255]);
    assert_eq!(pixels.get_pixel(100, 50).0, [0x22, 0x66, 0xaa, 255]);
}

#[tokio::test]
async fn namespaced_framework_attributes_stay_on_the_vector_route() {
    let doc = document();
    let report = Capturer::new(&doc)
        .capture_detailed(&Target::selector("#menu"), &CaptureOptions::default())
        .await
        .unwrap();
    assert_eq!(report.route, RouteKind::ClonedVectorEmbed);
    assert!(report.failures.is_empty());
    assert_eq!((report.image.width(), report.image.height()), (90, 28));
}

#[tokio::test]
async fn hidden_element_is_clamped_to_one_pixel() {
    let doc = document();
    let image = Capturer::new(&doc)
        .capture(&Target::selector("#hidden"), &CaptureOptions::default())
        .await
        .unwrap();
    assert_eq!((image.width(), image.height()), (1, 1));
}

#[tokio::test]
async fn first_route_failure_falls_back_to_direct_embed() {
    let doc = document();
    let loader = FailsOnce::default();
    let report = Capturer::new(&doc)
        .with_loader(&loader)
        .capture_detailed(&Target::selector("#panel"), &CaptureOptions::default())
        .await
        .unwrap();
    assert_eq!(report.route, RouteKind::DirectVectorEmbed);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].route, RouteKind::ClonedVectorEmbed);
    assert_eq!((report.image.width(), report.image.height()), (200, 100));
}

#[tokio::test]
async fn primitive_route_wraps_long_text() {
    let doc = document();
    let options = CaptureOptions {
        format: ImageFormat::Jpeg,
        quality: 0.7,
        ..Default::default()
    };
    let report = Capturer::new(&doc)
        .with_loader(&Rejecting)
        .capture_detailed(&Target::selector("#note"), &options)
        .await
        .unwrap();
    assert_eq!(report.route, RouteKind::PrimitiveReconstruction);
    assert_eq!(report.image.mime(), "image/jpeg");
    assert_eq!(report.image.width(), 172);

    let resolver = doc.style_resolver();
    let note = doc.resolve(&Target::selector("#note")).unwrap();
    let commands = FallbackRenderer::new(&resolver).basic_commands(note, 172.0, 200.0);
    let lines = commands
        .iter()
        .filter(|c| matches!(c, PaintCommand::Text { .. }))
        .count();
    assert!(lines > 1, "expected wrapped text, got {lines} line(s)");
}

#[tokio::test]
async fn cross_origin_content_is_security_restricted() {
    let doc = document();
    let report = Capturer::new(&doc)
        .capture_detailed(&Target::selector("#remote"), &CaptureOptions::default())
        .await
        .unwrap();
    assert_eq!(report.route, RouteKind::PrimitiveReconstruction);
    assert_eq!(report.failures.len(), 2);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, Error::SecurityRestricted(_))));
}

#[tokio::test(start_paused = true)]
async fn load_timeouts_advance_the_chain() {
    let doc = document();
    let started = tokio::time::Instant::now();
    let report = Capturer::new(&doc)
        .with_loader(&Hangs)
        .capture_detailed(&Target::selector("#panel"), &CaptureOptions::default())
        .await
        .unwrap();
    assert_eq!(report.route, RouteKind::PrimitiveReconstruction);
    assert!(report
        .failures
        .iter()
        .all(|f| matches!(f.error, Error::LoadTimeout(5000))));
    assert!(started.elapsed() >= std::time::Duration::from_millis(10_000));
    assert_eq!(report.live_object_urls, 0);
}

#[tokio::test]
async fn never_rejects_for_a_resolvable_target() {
    let doc = document();
    for selector in ["#panel", "#note", "#hidden", "#remote", "body"] {
        let report = Capturer::new(&doc)
            .with_loader(&Rejecting)
            .capture_detailed(&Target::selector(selector), &CaptureOptions::default())
            .await
            .unwrap_or_else(|e| panic!("{selector}: {e}"));
        assert_eq!(report.live_object_urls, 0, "{selector}");
    }
    let err = Capturer::new(&doc)
        .capture(&Target::selector("#absent"), &CaptureOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ElementNotFound(_)));
}

#[tokio::test]
async fn repeated_captures_are_deterministic() {
    let doc = document().with_device_pixel_ratio(2.0);
    let capturer = Capturer::new(&doc);
    let target = Target::selector("#panel");
    let options = CaptureOptions::default();
    let a = capturer.capture_detailed(&target, &options).await.unwrap();
    let b = capturer.capture_detailed(&target, &options).await.unwrap();
    assert_eq!(a.route, b.route);
    assert_eq!((a.image.width(), a.image.height()), (400, 200));
    assert_eq!((a.image.width(), a.image.height()), (b.image.width(), b.image.height()));
    assert_eq!(a.image.digest(), b.image.digest());
}

#[tokio::test]
async fn interleaved_captures_do_not_share_state() {
    let doc = document();
    let capturer = Capturer::new(&doc);
    let options = CaptureOptions::default();
    let panel_target = Target::selector("#panel");
    let note_target = Target::selector("#note");
    let (panel, note) = futures::join!(
        capturer.capture(&panel_target, &options),
        capturer.capture(&note_target, &options),
    );
    let (panel, note) = (panel.unwrap(), note.unwrap());
    assert_eq!((panel.width(), panel.height()), (200, 100));
    assert_eq!(note.width(), 172);
}
