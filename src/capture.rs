//! Capture entry points.

use crate::delivery::{Delivered, DeliveryMode, OutputSink};
use crate::document::{Document, Target};
use crate::encode::EncodedImage;
use crate::rendering::{ImageLoader, LayoutEngine, ObjectUrlStore, SvgImageLoader};
use crate::routes::{CapturePipeline, CaptureReport, RouteInput};
use crate::{CaptureOptions, CaptureRequest, Result};

/// Captures elements of one document.
///
/// Holds no per-capture state: every call builds its own pipeline, buffers
/// and object URLs, so calls may interleave freely.
pub struct Capturer<'a> {
    document: &'a Document,
    loader: &'a dyn ImageLoader,
}

impl<'a> Capturer<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self {
            document,
            loader: &SvgImageLoader,
        }
    }

    /// Replaces the image loader used by the vector routes.
    pub fn with_loader(mut self, loader: &'a dyn ImageLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    /// Captures `target` and reports which route produced the image.
    ///
    /// Fails with `ElementNotFound` before any route runs when the target
    /// does not resolve. Otherwise only an encoding failure of the stub
    /// route surfaces as an error.
    pub async fn capture_detailed(&self, target: &Target, options: &CaptureOptions) -> Result<CaptureReport> {
        let element = self.document.resolve(target)?;
        let resolver = self.document.style_resolver();
        let viewport = self.document.viewport();
        let rect = LayoutEngine::new(&resolver).bounding_rect(
            self.document.html().root_element(),
            element,
            viewport.width as f32,
        );
        let scale = options.effective_scale(self.document.device_pixel_ratio());
        log::debug!(
            "capturing <{}> region {}x{} at scale {}",
            element.value().name(),
            rect.width,
            rect.height,
            scale
        );

        let urls = ObjectUrlStore::new(self.document.url());
        let input = RouteInput {
            document: self.document,
            element,
            resolver: &resolver,
            width: rect.width,
            height: rect.height,
            scale,
            background: options.background.fill(),
            loader: self.loader,
            urls: &urls,
        };
        CapturePipeline::new().run(&input, options.format, options.quality).await
    }

    pub async fn capture(&self, target: &Target, options: &CaptureOptions) -> Result<EncodedImage> {
        Ok(self.capture_detailed(target, options).await?.image)
    }

    pub async fn capture_request(&self, request: &CaptureRequest) -> Result<EncodedImage> {
        self.capture(&request.target, &request.options).await
    }

    /// Captures and delivers according to `options.delivery`.
    pub async fn capture_and_deliver(
        &self,
        target: &Target,
        options: &CaptureOptions,
        sink: &OutputSink<'_>,
    ) -> Result<Delivered> {
        let image = self.capture(target, options).await?;
        sink.deliver(image, options.delivery, &options.filename).await
    }

    /// Captures and writes to the sink's clipboard. Returns whether the image
    /// reached the clipboard; failures are notified, not returned.
    pub async fn copy_to_clipboard(&self, target: &Target, options: &CaptureOptions, sink: &OutputSink<'_>) -> bool {
        let image = match self.capture(target, options).await {
            Ok(image) => image,
            Err(e) => {
                log::warn!("clipboard capture failed: {}", e);
                sink.notifier().error(crate::delivery::COPY_FAILED);
                return false;
            }
        };
        sink.deliver(image, DeliveryMode::Clipboard, &options.filename).await.is_ok()
    }
}

/// Captures `target` of `document` with the default image loader.
pub async fn capture(document: &Document, target: &Target, options: &CaptureOptions) -> Result<EncodedImage> {
    Capturer::new(document).capture(target, options).await
}

/// [`Capturer::copy_to_clipboard`] with the default image loader.
pub async fn copy_to_clipboard(
    document: &Document,
    target: &Target,
    options: &CaptureOptions,
    sink: &OutputSink<'_>,
) -> bool {
    Capturer::new(document).copy_to_clipboard(target, options, sink).await
}
