#![cfg(feature = "fetch")]

use rfsnap::collector::StyleCollector;
use rfsnap::{CaptureOptions, Capturer, Document, FetchConfig, RouteKind, Target};
use tiny_http::{Header, Response, Server};

/// Serves `routes` until the process exits; returns the base URL.
fn serve(routes: Vec<(&'static str, String, &'static str)>) -> String {
    let server = Server::http("127.0.0.1:0").unwrap();
    let addr = server.server_addr();
    std::thread::spawn(move || {
        for req in server.incoming_requests() {
            let found = routes.iter().find(|(path, _, _)| req.url() == *path);
            let _ = match found {
                Some((_, body, mime)) => {
                    let header = Header::from_bytes(&b"Content-Type"[..], mime.as_bytes()).unwrap();
                    req.respond(Response::from_string(body.clone()).with_header(header))
                }
                None => req.respond(Response::from_string("not found").with_status_code(404)),
            };
        }
    });
    format!("http://{}", addr)
}

#[test]
fn cross_origin_sheets_style_the_page_but_stay_unreadable() {
    let cdn = serve(vec![(
        "/theme.css",
        ".card { color: rgb(0, 128, 0) }".to_string(),
        "text/css",
    )]);
    let page = format!(
        r#"<html><head>
            <link rel="stylesheet" href="/app.css">
            <link rel="stylesheet" href="{cdn}/theme.css">
            <link rel="stylesheet" href="/missing.css">
            </head><body><div class="card" id="card">Styled</div></body></html>"#
    );
    let origin = serve(vec![
        ("/", page, "text/html"),
        (
            "/app.css",
            ".card { width: 150px; height: 50px; background: rgb(10, 20, 30) }".to_string(),
            "text/css",
        ),
    ]);

    let doc = Document::fetch(&format!("{origin}/"), &FetchConfig::default()).unwrap();
    assert_eq!(doc.style_sources().len(), 3);
    assert!(doc.style_sources()[0].is_loaded());
    assert!(doc.style_sources()[1].is_loaded());
    assert!(!doc.style_sources()[2].is_loaded());

    let rules = StyleCollector::new(&doc).collect();
    let blob = rules.blob();
    assert!(blob.contains("background: rgb(10, 20, 30)"));
    assert!(!blob.contains("rgb(0, 128, 0)"));
    assert_eq!(rules.inaccessible_count(), 2);

    // the cross-origin sheet still applies to rendering
    let resolver = doc.style_resolver();
    let card = doc.resolve(&Target::selector("#card")).unwrap();
    assert_eq!(resolver.computed(card).value("color"), "rgb(0, 128, 0)");

    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
    let report = runtime
        .block_on(Capturer::new(&doc).capture_detailed(&Target::selector("#card"), &CaptureOptions::default()))
        .unwrap();
    assert_eq!(report.route, RouteKind::ClonedVectorEmbed);
    assert_eq!((report.image.width(), report.image.height()), (150, 50));
}
