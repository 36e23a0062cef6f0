//! The captured document: parsed markup, its style sources and host metrics.

use ego_tree::NodeId;
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::style::{parse_stylesheet, CssRule, StyleResolver};
use crate::{Error, Result, Viewport};

/// Where a style source came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A `<style>` element
    StyleElement,
    /// A `<link rel="stylesheet">` element
    Link,
}

/// One style source reachable from the document, in document order.
///
/// Linked sheets start without content; their text is supplied by
/// [`Document::attach_stylesheet`] or by [`Document::fetch`].
#[derive(Debug, Clone)]
pub struct StyleSource {
    pub kind: SourceKind,
    pub href: Option<Url>,
    text: Option<String>,
    rules: Vec<CssRule>,
}

impl StyleSource {
    fn inline(text: String) -> Self {
        let rules = parse_stylesheet(&text);
        Self {
            kind: SourceKind::StyleElement,
            href: None,
            text: Some(text),
            rules,
        }
    }

    fn linked(href: Url) -> Self {
        Self {
            kind: SourceKind::Link,
            href: Some(href),
            text: None,
            rules: Vec::new(),
        }
    }

    fn set_text(&mut self, text: String) {
        self.rules = parse_stylesheet(&text);
        self.text = Some(text);
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn rules(&self) -> &[CssRule] {
        &self.rules
    }

    pub fn is_loaded(&self) -> bool {
        self.text.is_some()
    }

    /// Human readable label for logs
    pub fn label(&self) -> String {
        match &self.href {
            Some(href) => href.to_string(),
            None => "<style>".to_string(),
        }
    }
}

/// How to find the element to capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// First element matching a CSS selector
    Selector(String),
    /// The document body
    Body,
    /// A node previously obtained from this document
    Node(NodeId),
}

impl Target {
    pub fn selector(sel: impl Into<String>) -> Self {
        Target::Selector(sel.into())
    }
}

/// A parsed HTML document plus everything the capture pipeline needs to
/// know about its rendering environment.
#[derive(Debug)]
pub struct Document {
    html: Html,
    url: Url,
    sources: Vec<StyleSource>,
    viewport: Viewport,
    device_pixel_ratio: f32,
}

impl Document {
    /// Parses a full document. `base_url` resolves stylesheet links and
    /// defines the document origin.
    pub fn parse(markup: &str, base_url: &str) -> Result<Self> {
        let url = Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid base url {base_url}: {e}")))?;
        let html = Html::parse_document(markup);
        let sources = collect_sources(&html, &url);
        Ok(Self {
            html,
            url,
            sources,
            viewport: Viewport::default(),
            device_pixel_ratio: 1.0,
        })
    }

    /// Builds a standalone document from a markup fragment and a single
    /// style block. Used to render embedded foreign content.
    pub(crate) fn from_fragment(markup: &str, style_text: &str, viewport: Viewport, url: Url) -> Self {
        let html = Html::parse_fragment(markup);
        let mut sources = Vec::new();
        if !style_text.trim().is_empty() {
            sources.push(StyleSource::inline(style_text.to_string()));
        }
        Self {
            html,
            url,
            sources,
            viewport,
            device_pixel_ratio: 1.0,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_device_pixel_ratio(mut self, dpr: f32) -> Self {
        self.device_pixel_ratio = dpr;
        self
    }

    /// Supplies the content of a linked stylesheet. Returns false when no
    /// `<link>` in the document refers to `href`.
    pub fn attach_stylesheet(&mut self, href: &str, css: &str) -> bool {
        let Ok(resolved) = self.url.join(href) else {
            return false;
        };
        let mut attached = false;
        for source in self.sources.iter_mut().filter(|s| s.href.as_ref() == Some(&resolved)) {
            source.set_text(css.to_string());
            attached = true;
        }
        attached
    }

    pub fn html(&self) -> &Html {
        &self.html
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn device_pixel_ratio(&self) -> f32 {
        self.device_pixel_ratio
    }

    pub fn style_sources(&self) -> &[StyleSource] {
        &self.sources
    }

    /// Same-origin check against the document URL. Local files are treated
    /// as one origin.
    pub fn is_same_origin(&self, other: &Url) -> bool {
        same_origin(&self.url, other)
    }

    /// A resolver over every loaded source. Cross-origin sheets still style
    /// the page even though their rules cannot be read back.
    pub fn style_resolver(&self) -> StyleResolver {
        StyleResolver::new(
            self.sources.iter().filter(|s| s.is_loaded()).map(|s| s.rules()),
            self.viewport,
        )
    }

    pub fn body(&self) -> Option<ElementRef<'_>> {
        let sel = Selector::parse("body").ok()?;
        self.html.select(&sel).next()
    }

    /// Resolves a capture target. Fails with `ElementNotFound` for unknown
    /// nodes, unmatched selectors and selectors that do not parse.
    pub fn resolve(&self, target: &Target) -> Result<ElementRef<'_>> {
        match target {
            Target::Body => self
                .body()
                .ok_or_else(|| Error::ElementNotFound("body".to_string())),
            Target::Selector(css) => {
                let sel = Selector::parse(css)
                    .map_err(|_| Error::ElementNotFound(format!("invalid selector `{css}`")))?;
                self.html
                    .select(&sel)
                    .next()
                    .ok_or_else(|| Error::ElementNotFound(css.clone()))
            }
            Target::Node(id) => self
                .html
                .tree
                .get(*id)
                .and_then(ElementRef::wrap)
                .ok_or_else(|| Error::ElementNotFound(format!("node {id:?}"))),
        }
    }

    /// Every element carrying the `data-screenshot` marker.
    pub fn capture_controls(&self) -> Vec<ElementRef<'_>> {
        match Selector::parse("[data-screenshot]") {
            Ok(sel) => self.html.select(&sel).collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Downloads a page and its linked stylesheets.
    ///
    /// Must not be called from inside an async runtime (uses a blocking client).
    #[cfg(feature = "fetch")]
    pub fn fetch(url: &str, config: &FetchConfig) -> Result<Self> {
        use reqwest::blocking::Client;
        use std::time::Duration;

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| Error::Network(format!("Failed to build HTTP client: {}", e)))?;

        let body = client
            .get(url)
            .header("User-Agent", config.user_agent.clone())
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| Error::Network(format!("Failed to fetch {}: {}", url, e)))?
            .text()?;

        let mut doc = Document::parse(&body, url)?;
        for source in doc.sources.iter_mut() {
            let Some(href) = source.href.clone() else { continue };
            let resp = client
                .get(href.as_str())
                .header("User-Agent", config.user_agent.clone())
                .send()
                .and_then(|r| r.error_for_status())
                .and_then(|r| r.text());
            match resp {
                Ok(text) => source.set_text(text),
                Err(e) => log::warn!("failed to fetch stylesheet {}: {}", href, e),
            }
        }
        Ok(doc)
    }
}

/// Settings for [`Document::fetch`]
#[cfg(feature = "fetch")]
#[derive(Debug, Clone)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_ms: u64,
}

#[cfg(feature = "fetch")]
impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/115.0 RFOX/0.3".to_string(),
            timeout_ms: 30000,
        }
    }
}

pub(crate) fn same_origin(a: &Url, b: &Url) -> bool {
    if a.scheme() == "file" && b.scheme() == "file" {
        return true;
    }
    a.origin() == b.origin()
}

fn collect_sources(html: &Html, base: &Url) -> Vec<StyleSource> {
    let Ok(sel) = Selector::parse("style, link") else {
        return Vec::new();
    };
    html.select(&sel)
        .filter_map(|el| match el.value().name() {
            "style" => Some(StyleSource::inline(el.text().collect())),
            _ => {
                let rel = el.value().attr("rel").unwrap_or("");
                let is_sheet = rel
                    .split_whitespace()
                    .any(|r| r.eq_ignore_ascii_case("stylesheet"));
                if !is_sheet {
                    return None;
                }
                let href = el.value().attr("href")?;
                base.join(href).ok().map(StyleSource::linked)
            }
        })
        .collect()
}
