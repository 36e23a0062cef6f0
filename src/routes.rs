//! The capture routes and the pipeline that walks them.
//!
//! Routes are tried in order; the first one that yields a buffer which also
//! encodes wins. A route that fails is logged and abandoned, never retried.

use std::fmt;

use futures::future::LocalBoxFuture;
use scraper::ElementRef;

use crate::collector::StyleCollector;
use crate::composer::compose;
use crate::document::Document;
use crate::encode::{encode, EncodedImage, ImageFormat};
use crate::inliner::StyleInliner;
use crate::markup::outer_xhtml;
use crate::rendering::{
    FallbackRenderer, ImageLoader, ImageSource, LayoutEngine, ObjectUrlStore, PixelBuffer, RasterRenderer,
};
use crate::style::{Color, StyleResolver};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RouteKind {
    /// Clone, inline resolved styles, embed as a vector document
    ClonedVectorEmbed,
    /// Embed the original markup with the readable stylesheets
    DirectVectorEmbed,
    /// Paint background, border and wrapped text directly
    PrimitiveReconstruction,
    /// Border plus tag label
    Stub,
}

impl RouteKind {
    pub fn name(&self) -> &'static str {
        match self {
            RouteKind::ClonedVectorEmbed => "cloned-vector-embed",
            RouteKind::DirectVectorEmbed => "direct-vector-embed",
            RouteKind::PrimitiveReconstruction => "primitive-reconstruction",
            RouteKind::Stub => "stub",
        }
    }
}

impl fmt::Display for RouteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Everything a route reads, owned by one capture invocation.
pub struct RouteInput<'a> {
    pub document: &'a Document,
    pub element: ElementRef<'a>,
    pub resolver: &'a StyleResolver,
    /// Logical region size
    pub width: f32,
    pub height: f32,
    pub scale: f32,
    pub background: Option<Color>,
    pub loader: &'a dyn ImageLoader,
    pub urls: &'a ObjectUrlStore,
}

impl RouteInput<'_> {
    /// A fresh buffer for the region, pre-filled with the background.
    pub fn buffer(&self) -> Result<PixelBuffer> {
        PixelBuffer::with_background(self.width, self.height, self.scale, self.background)
    }

    async fn rasterize(&self, markup: &str, style_text: &str, source: ImageSource) -> Result<PixelBuffer> {
        let document = compose(markup, style_text, self.width, self.height);
        let mut buffer = self.buffer()?;
        RasterRenderer::new(self.loader, self.urls, self.document.url())
            .render_from(&document, source, &mut buffer)
            .await?;
        Ok(buffer)
    }
}

/// One strategy in the fallback chain.
pub trait CaptureRoute {
    fn kind(&self) -> RouteKind;

    fn attempt<'a>(&'a self, input: &'a RouteInput<'_>) -> LocalBoxFuture<'a, Result<PixelBuffer>>;
}

/// Route A, loaded from a `data:` URL
#[derive(Debug, Default, Clone, Copy)]
pub struct ClonedVectorEmbed;

impl CaptureRoute for ClonedVectorEmbed {
    fn kind(&self) -> RouteKind {
        RouteKind::ClonedVectorEmbed
    }

    fn attempt<'a>(&'a self, input: &'a RouteInput<'_>) -> LocalBoxFuture<'a, Result<PixelBuffer>> {
        Box::pin(async move {
            let rules = StyleCollector::new(input.document).collect();
            let mut inliner = StyleInliner::new(input.resolver);
            if let Some(layout) = LayoutEngine::new(input.resolver).layout(input.element, input.width) {
                inliner = inliner.with_layout(&layout);
            }
            let fragment = inliner.inline(input.element);
            input
                .rasterize(&fragment.to_xhtml(), &rules.blob(), ImageSource::DataUrl)
                .await
        })
    }
}

/// Route B, loaded from a `blob:` object URL
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectVectorEmbed;

impl CaptureRoute for DirectVectorEmbed {
    fn kind(&self) -> RouteKind {
        RouteKind::DirectVectorEmbed
    }

    fn attempt<'a>(&'a self, input: &'a RouteInput<'_>) -> LocalBoxFuture<'a, Result<PixelBuffer>> {
        Box::pin(async move {
            let rules = StyleCollector::new(input.document).collect();
            input
                .rasterize(&outer_xhtml(input.element), &rules.blob(), ImageSource::ObjectUrl)
                .await
        })
    }
}

/// Route C
#[derive(Debug, Default, Clone, Copy)]
pub struct PrimitiveReconstruction;

impl CaptureRoute for PrimitiveReconstruction {
    fn kind(&self) -> RouteKind {
        RouteKind::PrimitiveReconstruction
    }

    fn attempt<'a>(&'a self, input: &'a RouteInput<'_>) -> LocalBoxFuture<'a, Result<PixelBuffer>> {
        Box::pin(async move {
            let buffer = input.buffer()?;
            Ok(FallbackRenderer::new(input.resolver).render_basic(input.element, buffer))
        })
    }
}

/// Route D
#[derive(Debug, Default, Clone, Copy)]
pub struct Stub;

impl CaptureRoute for Stub {
    fn kind(&self) -> RouteKind {
        RouteKind::Stub
    }

    fn attempt<'a>(&'a self, input: &'a RouteInput<'_>) -> LocalBoxFuture<'a, Result<PixelBuffer>> {
        Box::pin(async move {
            let buffer = input.buffer()?;
            Ok(FallbackRenderer::new(input.resolver).render_stub(input.element, buffer))
        })
    }
}

/// An abandoned route and why.
#[derive(Debug)]
pub struct RouteFailure {
    pub route: RouteKind,
    pub error: Error,
}

/// Outcome of a pipeline run.
#[derive(Debug)]
pub struct CaptureReport {
    pub image: EncodedImage,
    /// The route that produced `image`
    pub route: RouteKind,
    /// Routes abandoned before it, in order
    pub failures: Vec<RouteFailure>,
    /// Object URLs still registered when the run finished
    pub live_object_urls: usize,
}

/// An ordered list of routes. Built per capture; holds no state between runs.
pub struct CapturePipeline {
    routes: Vec<Box<dyn CaptureRoute>>,
}

impl Default for CapturePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl CapturePipeline {
    /// The standard chain: A, B, C, then the stub.
    pub fn new() -> Self {
        Self::with_routes(vec![
            Box::new(ClonedVectorEmbed),
            Box::new(DirectVectorEmbed),
            Box::new(PrimitiveReconstruction),
            Box::new(Stub),
        ])
    }

    pub fn with_routes(routes: Vec<Box<dyn CaptureRoute>>) -> Self {
        Self { routes }
    }

    pub fn kinds(&self) -> Vec<RouteKind> {
        self.routes.iter().map(|r| r.kind()).collect()
    }

    /// Walks the routes until one produces an encodable buffer.
    ///
    /// Encoding failures of intermediate routes advance the chain like any
    /// other route failure; on the last route they are returned.
    pub async fn run(&self, input: &RouteInput<'_>, format: ImageFormat, quality: f32) -> Result<CaptureReport> {
        let mut failures = Vec::new();
        let last = self.routes.len().saturating_sub(1);
        for (i, route) in self.routes.iter().enumerate() {
            let kind = route.kind();
            log::debug!("trying capture route {}", kind);
            let outcome = match route.attempt(input).await {
                Ok(buffer) => encode(&buffer, format, quality).await,
                Err(e) => Err(e),
            };
            match outcome {
                Ok(image) => {
                    log::debug!("route {} produced {}x{} {}", kind, image.width(), image.height(), image.mime());
                    return Ok(CaptureReport {
                        image,
                        route: kind,
                        failures,
                        live_object_urls: input.urls.live(),
                    });
                }
                Err(error) if i < last && error.is_recoverable() => {
                    log::warn!("capture route {} failed: {}", kind, error);
                    failures.push(RouteFailure { route: kind, error });
                }
                Err(error) => return Err(error),
            }
        }
        Err(Error::Render("no capture routes configured".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::{Image, ImageRequest, SvgImageLoader};
    use crate::Target;

    const PAGE: &str = r#"<html><head><style>
        #t { width: 120px; padding: 4px; background: #ddeeff; color: #102030 }
        </style></head><body><div id="t">A few words of text that will wrap</div></body></html>"#;

    struct Rejects;

    impl ImageLoader for Rejects {
        fn load<'a>(&'a self, _request: ImageRequest<'a>) -> LocalBoxFuture<'a, Result<Box<dyn Image>>> {
            Box::pin(async { Err(Error::ImageLoad("blocked".to_string())) })
        }
    }

    /// Rejects every load, remembering the URL scheme it was asked for.
    #[derive(Default)]
    struct Schemes(std::cell::RefCell<Vec<String>>);

    impl ImageLoader for Schemes {
        fn load<'a>(&'a self, request: ImageRequest<'a>) -> LocalBoxFuture<'a, Result<Box<dyn Image>>> {
            let scheme = request.url.split(':').next().unwrap_or_default().to_string();
            self.0.borrow_mut().push(scheme);
            Box::pin(async { Err(Error::ImageLoad("blocked".to_string())) })
        }
    }

    struct Broken(RouteKind);

    impl CaptureRoute for Broken {
        fn kind(&self) -> RouteKind {
            self.0
        }

        fn attempt<'a>(&'a self, _input: &'a RouteInput<'_>) -> LocalBoxFuture<'a, Result<PixelBuffer>> {
            Box::pin(async { Err(Error::Render("broken".to_string())) })
        }
    }

    async fn run_with(pipeline: &CapturePipeline, loader: &dyn ImageLoader) -> Result<CaptureReport> {
        let doc = Document::parse(PAGE, "https://app.example/").unwrap();
        let resolver = doc.style_resolver();
        let element = doc.resolve(&Target::selector("#t")).unwrap();
        let urls = ObjectUrlStore::new(doc.url());
        let input = RouteInput {
            document: &doc,
            element,
            resolver: &resolver,
            width: 128.0,
            height: 40.0,
            scale: 1.0,
            background: Some(Color::WHITE),
            loader,
            urls: &urls,
        };
        pipeline.run(&input, ImageFormat::Png, 1.0).await
    }

    #[tokio::test]
    async fn first_route_wins() {
        let report = run_with(&CapturePipeline::new(), &SvgImageLoader).await.unwrap();
        assert_eq!(report.route, RouteKind::ClonedVectorEmbed);
        assert!(report.failures.is_empty());
        assert_eq!((report.image.width(), report.image.height()), (128, 40));
        assert_eq!(report.live_object_urls, 0);
    }

    #[tokio::test]
    async fn falls_through_in_order() {
        let report = run_with(&CapturePipeline::new(), &Rejects).await.unwrap();
        assert_eq!(report.route, RouteKind::PrimitiveReconstruction);
        let failed: Vec<_> = report.failures.iter().map(|f| f.route).collect();
        assert_eq!(failed, vec![RouteKind::ClonedVectorEmbed, RouteKind::DirectVectorEmbed]);
        assert!(matches!(report.failures[0].error, Error::ImageLoad(_)));
        assert_eq!(report.live_object_urls, 0);
    }

    #[tokio::test]
    async fn vector_routes_load_through_different_urls() {
        let loader = Schemes::default();
        run_with(&CapturePipeline::new(), &loader).await.unwrap();
        assert_eq!(*loader.0.borrow(), vec!["data".to_string(), "blob".to_string()]);
    }

    #[tokio::test]
    async fn stub_terminates_the_chain() {
        let pipeline = CapturePipeline::with_routes(vec![
            Box::new(Broken(RouteKind::ClonedVectorEmbed)),
            Box::new(Broken(RouteKind::DirectVectorEmbed)),
            Box::new(Broken(RouteKind::PrimitiveReconstruction)),
            Box::new(Stub),
        ]);
        let report = run_with(&pipeline, &SvgImageLoader).await.unwrap();
        assert_eq!(report.route, RouteKind::Stub);
        assert_eq!(report.failures.len(), 3);
    }

    #[tokio::test]
    async fn last_route_failure_is_returned() {
        let pipeline = CapturePipeline::with_routes(vec![Box::new(Broken(RouteKind::Stub))]);
        let err = run_with(&pipeline, &SvgImageLoader).await.unwrap_err();
        assert!(matches!(err, Error::Render(_)));
        let empty = CapturePipeline::with_routes(Vec::new());
        assert!(run_with(&empty, &SvgImageLoader).await.is_err());
    }

    #[test]
    fn standard_order() {
        assert_eq!(
            CapturePipeline::new().kinds(),
            vec![
                RouteKind::ClonedVectorEmbed,
                RouteKind::DirectVectorEmbed,
                RouteKind::PrimitiveReconstruction,
                RouteKind::Stub
            ]
        );
        assert_eq!(RouteKind::Stub.to_string(), "stub");
    }
}
