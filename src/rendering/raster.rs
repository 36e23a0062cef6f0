//! Loading vector documents as images and drawing them onto pixel buffers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;

use base64::Engine as _;
use futures::future::LocalBoxFuture;
use resvg::tiny_skia::Transform;
use resvg::usvg;
use scraper::ElementRef;
use url::Url;

use super::buffer::PixelBuffer;
use super::layout::{LayoutEngine, Rect};
use super::paint::{display_list, svg_options, PaintCommand, Painter};
use crate::composer::{ForeignMarkup, VectorDocument};
use crate::document::{same_origin, Document};
use crate::{Error, Result, Viewport};

/// Upper bound on a single image load.
pub const LOAD_TIMEOUT: Duration = Duration::from_millis(5000);

/// Bytes registered under an object URL.
#[derive(Debug, Clone)]
pub struct Blob {
    pub mime: String,
    pub bytes: Rc<[u8]>,
}

/// Object URLs for one capture invocation.
#[derive(Debug)]
pub struct ObjectUrlStore {
    prefix: String,
    entries: RefCell<HashMap<String, Blob>>,
    next_id: Cell<u64>,
    revoked: Cell<usize>,
}

impl ObjectUrlStore {
    pub fn new(origin: &Url) -> Self {
        Self {
            prefix: format!("blob:{}/", origin.origin().ascii_serialization()),
            entries: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            revoked: Cell::new(0),
        }
    }

    /// Registers `bytes` and returns a handle that revokes the URL when
    /// dropped.
    pub fn create(&self, bytes: &[u8], mime: &str) -> ObjectUrl<'_> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let url = format!("{}{}", self.prefix, id);
        self.entries.borrow_mut().insert(
            url.clone(),
            Blob {
                mime: mime.to_string(),
                bytes: Rc::from(bytes),
            },
        );
        ObjectUrl {
            store: self,
            url,
            released: false,
        }
    }

    pub fn resolve(&self, url: &str) -> Option<Blob> {
        self.entries.borrow().get(url).cloned()
    }

    /// URLs created and not yet revoked
    pub fn live(&self) -> usize {
        self.entries.borrow().len()
    }

    /// Number of revocations performed so far
    pub fn revocations(&self) -> usize {
        self.revoked.get()
    }

    fn revoke(&self, url: &str) {
        if self.entries.borrow_mut().remove(url).is_some() {
            self.revoked.set(self.revoked.get() + 1);
        }
    }
}

/// Guard for a registered object URL. Released exactly once, either through
/// [`ObjectUrl::revoke`] or on drop.
#[derive(Debug)]
pub struct ObjectUrl<'s> {
    store: &'s ObjectUrlStore,
    url: String,
    released: bool,
}

impl ObjectUrl<'_> {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    pub fn revoke(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.store.revoke(&self.url);
        }
    }
}

impl Drop for ObjectUrl<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// A decoded image that can be drawn.
pub trait Image {
    /// Natural size in logical px
    fn size(&self) -> (f32, f32);

    /// False when drawing it would taint the target with cross-origin content.
    fn is_origin_clean(&self) -> bool;

    /// Draws at (0, 0), scaled to the target's logical size.
    fn draw(&self, target: &mut PixelBuffer) -> Result<()>;
}

/// One image load.
#[derive(Debug, Clone, Copy)]
pub struct ImageRequest<'a> {
    pub url: &'a str,
    pub store: &'a ObjectUrlStore,
    /// Origin of the capturing document
    pub origin: &'a Url,
}

/// Loads image resources. Implementations may suspend; the renderer bounds
/// every load with [`LOAD_TIMEOUT`].
pub trait ImageLoader {
    fn load<'a>(&'a self, request: ImageRequest<'a>) -> LocalBoxFuture<'a, Result<Box<dyn Image>>>;
}

/// Default loader: SVG via usvg, with foreign XHTML content laid out and
/// painted by the crate's own layout engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SvgImageLoader;

impl ImageLoader for SvgImageLoader {
    fn load<'a>(&'a self, request: ImageRequest<'a>) -> LocalBoxFuture<'a, Result<Box<dyn Image>>> {
        Box::pin(async move {
            // decoding completes on a later turn of the event loop
            tokio::task::yield_now().await;
            let bytes = fetch_source(&request)?;
            let image = SvgImage::decode(&bytes, request.origin)?;
            Ok(Box::new(image) as Box<dyn Image>)
        })
    }
}

fn fetch_source(request: &ImageRequest<'_>) -> Result<Vec<u8>> {
    if request.url.starts_with("blob:") {
        return request
            .store
            .resolve(request.url)
            .map(|blob| blob.bytes.to_vec())
            .ok_or_else(|| Error::ImageLoad(format!("unknown object url {}", request.url)));
    }
    if let Some(rest) = request.url.strip_prefix("data:") {
        return decode_data_url(rest);
    }
    Err(Error::ImageLoad(format!("unsupported image source {}", request.url)))
}

/// Decodes the part of a data URL after `data:`.
fn decode_data_url(rest: &str) -> Result<Vec<u8>> {
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| Error::ImageLoad("malformed data url".to_string()))?;
    if meta.ends_with(";base64") {
        base64::engine::general_purpose::STANDARD
            .decode(payload.trim())
            .map_err(|e| Error::ImageLoad(format!("invalid base64 payload: {e}")))
    } else {
        Ok(urlencoding::decode_binary(payload.as_bytes()).into_owned())
    }
}

struct SvgImage {
    tree: usvg::Tree,
    foreign: Option<Document>,
    origin_clean: bool,
}

impl SvgImage {
    fn decode(bytes: &[u8], origin: &Url) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::ImageLoad(format!("vector document is not utf-8: {e}")))?;
        let tree = usvg::Tree::from_str(text, &svg_options())
            .map_err(|e| Error::ImageLoad(format!("malformed vector document: {e}")))?;
        let size = tree.size();
        let viewport = Viewport {
            width: size.width().ceil() as u32,
            height: size.height().ceil() as u32,
        };
        let foreign = ForeignMarkup::extract(text)
            .map(|f| Document::from_fragment(&f.markup, &f.style_text, viewport, origin.clone()));
        let origin_clean = match &foreign {
            Some(doc) => {
                let style_text: String = doc
                    .style_sources()
                    .iter()
                    .filter_map(|s| s.text())
                    .collect();
                let foreign_refs: Vec<Url> = external_references(doc, &style_text)
                    .into_iter()
                    .filter(|u| !same_origin(origin, u))
                    .collect();
                for url in &foreign_refs {
                    log::debug!("cross-origin resource in captured content: {}", url);
                }
                foreign_refs.is_empty()
            }
            None => true,
        };
        Ok(Self {
            tree,
            foreign,
            origin_clean,
        })
    }
}

impl Image for SvgImage {
    fn size(&self) -> (f32, f32) {
        let size = self.tree.size();
        (size.width(), size.height())
    }

    fn is_origin_clean(&self) -> bool {
        self.origin_clean
    }

    fn draw(&self, target: &mut PixelBuffer) -> Result<()> {
        let (width, height) = self.size();
        let sx = target.logical_width() * target.scale() / width;
        let sy = target.logical_height() * target.scale() / height;
        if !(sx > 0.0 && sy > 0.0 && sx.is_finite() && sy.is_finite()) {
            return Ok(());
        }
        resvg::render(&self.tree, Transform::from_scale(sx, sy), &mut target.pixmap_mut().as_mut());

        if let Some(doc) = &self.foreign {
            let resolver = doc.style_resolver();
            let root = doc.html().root_element();
            if let Some(tree) = LayoutEngine::new(&resolver).layout(root, width) {
                let mut commands = vec![PaintCommand::PushClip(Rect::new(0.0, 0.0, width, height))];
                commands.extend(display_list(&tree));
                commands.push(PaintCommand::PopClip);
                Painter::new(target.pixmap_mut(), sx).execute(&commands);
            }
        }
        Ok(())
    }
}

const RESOURCE_ATTRIBUTES: &[(&str, &str)] = &[
    ("img", "src"),
    ("image", "href"),
    ("image", "xlink:href"),
    ("link", "href"),
    ("source", "src"),
    ("video", "src"),
    ("video", "poster"),
    ("audio", "src"),
    ("iframe", "src"),
    ("embed", "src"),
    ("object", "data"),
];

/// Every resource the content would load, resolved against the document URL.
/// `data:` and `blob:` resources are local and never reported.
fn external_references(doc: &Document, style_text: &str) -> Vec<Url> {
    let mut raw = Vec::new();
    for el in doc.html().root_element().descendants().filter_map(ElementRef::wrap) {
        let name = el.value().name();
        for (tag, attr) in RESOURCE_ATTRIBUTES {
            if name == *tag {
                if let Some(value) = el.value().attr(attr) {
                    raw.push(value.to_string());
                }
            }
        }
        if let Some(style) = el.value().attr("style") {
            raw.extend(css_urls(style));
        }
    }
    raw.extend(css_urls(style_text));
    raw.into_iter()
        .filter_map(|r| doc.url().join(r.trim()).ok())
        .filter(|u| !matches!(u.scheme(), "data" | "blob"))
        .collect()
}

/// `url(...)` references and `@import "..."` targets in CSS text.
fn css_urls(css: &str) -> Vec<String> {
    let unquote = |s: &str| s.trim().trim_matches(|c| c == '"' || c == '\'').to_string();
    let mut out = Vec::new();
    let mut rest = css;
    while let Some(idx) = rest.find("url(") {
        let body = &rest[idx + 4..];
        let Some(end) = body.find(')') else { break };
        out.push(unquote(&body[..end]));
        rest = &body[end..];
    }
    let mut rest = css;
    while let Some(idx) = rest.find("@import") {
        let body = rest[idx + 7..].trim_start();
        if let Some(quote) = body.chars().next().filter(|c| *c == '"' || *c == '\'') {
            if let Some(end) = body[1..].find(quote) {
                out.push(body[1..end + 1].to_string());
            }
        }
        rest = body;
    }
    out
}

/// How a vector document is handed to the image loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSource {
    /// A `blob:` URL registered in the invocation's object-URL store
    #[default]
    ObjectUrl,
    /// A percent-encoded `data:` URL carrying the document itself
    DataUrl,
}

/// Draws vector documents onto pixel buffers through an [`ImageLoader`].
pub struct RasterRenderer<'a> {
    loader: &'a dyn ImageLoader,
    store: &'a ObjectUrlStore,
    origin: &'a Url,
}

impl<'a> RasterRenderer<'a> {
    pub fn new(loader: &'a dyn ImageLoader, store: &'a ObjectUrlStore, origin: &'a Url) -> Self {
        Self { loader, store, origin }
    }

    /// Loads `document` through an object URL and draws it onto `target`.
    ///
    /// Fails with `LoadTimeout` after [`LOAD_TIMEOUT`] and with
    /// `SecurityRestricted` when the image would taint the buffer. The object
    /// URL created for the load is revoked on every path.
    pub async fn render(&self, document: &VectorDocument, target: &mut PixelBuffer) -> Result<()> {
        self.render_from(document, ImageSource::ObjectUrl, target).await
    }

    pub async fn render_from(
        &self,
        document: &VectorDocument,
        source: ImageSource,
        target: &mut PixelBuffer,
    ) -> Result<()> {
        let image = match source {
            ImageSource::ObjectUrl => {
                let url = self.store.create(document.as_bytes(), VectorDocument::MIME);
                let loaded = self.load(url.as_str()).await;
                url.revoke();
                loaded?
            }
            ImageSource::DataUrl => self.load(&document.to_data_url()).await?,
        };
        if !image.is_origin_clean() {
            return Err(Error::SecurityRestricted(
                "captured content references cross-origin resources".to_string(),
            ));
        }
        image.draw(target)
    }

    async fn load(&self, url: &str) -> Result<Box<dyn Image>> {
        let request = ImageRequest {
            url,
            store: self.store,
            origin: self.origin,
        };
        match tokio::time::timeout(LOAD_TIMEOUT, self.loader.load(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::LoadTimeout(LOAD_TIMEOUT.as_millis() as u64)),
        }
    }
}
