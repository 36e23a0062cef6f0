//! RFox Snap
//!
//! Turns a styled region of a parsed document into a standalone raster
//! image, without a native rendering engine or screen-capture API.
//!
//! # Features
//!
//! - **Fallback routes**: a cloned and style-inlined vector embed, a direct
//!   vector embed, a primitive reconstruction and finally a labelled stub.
//!   A capture of a resolvable element always yields an image.
//! - **Pluggable host**: image loading, downloads, the clipboard and user
//!   notifications are traits with in-process defaults.
//! - **Declarative controls**: `data-screenshot` markers wire capture and
//!   delivery from attributes alone.
//!
//! # Example
//!
//! ```no_run
//! use rfsnap::{CaptureOptions, Capturer, Document, ImageFormat, Target};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let html = r#"<div id="card" style="padding: 8px">Hello</div>"#;
//! let document = Document::parse(html, "https://app.example/")?;
//! let options = CaptureOptions {
//!     format: ImageFormat::Jpeg,
//!     quality: 0.8,
//!     ..Default::default()
//! };
//! let image = Capturer::new(&document).capture(&Target::selector("#card"), &options).await?;
//! println!("{} bytes of {}", image.len(), image.mime());
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub mod error;
pub use error::{Error, Result};

// Style engine and document model
pub mod document;
pub mod markup;
pub mod style;

// Layout, painting and the image pipeline
pub mod rendering;

// Capture stages
pub mod collector;
pub mod composer;
pub mod encode;
pub mod inliner;
pub mod routes;

// Entry points and delivery
pub mod capture;
pub mod control;
pub mod delivery;

pub use capture::{capture, copy_to_clipboard, Capturer};
pub use control::{Activation, CaptureControl};
pub use delivery::{
    Clipboard, ClipboardCapabilities, CommandClipboard, Delivered, DeliveryMode, DirectoryDownloader, Downloader,
    LogNotifier, MemoryClipboard, Notifier, OutputSink,
};
#[cfg(feature = "fetch")]
pub use document::FetchConfig;
pub use document::{Document, SourceKind, StyleSource, Target};
pub use encode::{EncodedImage, ImageFormat};
pub use rendering::{ImageLoader, PixelBuffer, SvgImageLoader};
pub use routes::{CapturePipeline, CaptureReport, RouteKind};
pub use style::Color;

/// Viewport dimensions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

impl FromStr for Viewport {
    type Err = Error;

    /// Parses `WIDTHxHEIGHT`, e.g. `1280x720`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::Config(format!("invalid viewport `{s}`, expected WIDTHxHEIGHT"));
        let (w, h) = s.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
        let width: u32 = w.trim().parse().map_err(|_| invalid())?;
        let height: u32 = h.trim().parse().map_err(|_| invalid())?;
        if width == 0 || height == 0 {
            return Err(invalid());
        }
        Ok(Self { width, height })
    }
}

/// Fill painted under the captured content
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Background {
    Color(Color),
    Transparent,
}

impl Background {
    /// The color to pre-fill buffers with, `None` for transparent.
    pub fn fill(&self) -> Option<Color> {
        match self {
            Background::Color(color) => Some(*color),
            Background::Transparent => None,
        }
    }
}

impl Default for Background {
    fn default() -> Self {
        Background::Color(Color::WHITE)
    }
}

impl FromStr for Background {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let color = Color::parse(s).ok_or_else(|| Error::Config(format!("invalid background `{s}`")))?;
        if color.is_transparent() {
            Ok(Background::Transparent)
        } else {
            Ok(Background::Color(color))
        }
    }
}

impl TryFrom<String> for Background {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Background> for String {
    fn from(value: Background) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Background {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Background::Color(color) => write!(f, "{}", color),
            Background::Transparent => f.write_str("transparent"),
        }
    }
}

/// How a capture is encoded and delivered
///
/// Every field has a default, so partial JSON option files deserialize:
///
/// ```
/// let opts: rfsnap::CaptureOptions = serde_json::from_str(r#"{"format": "jpeg"}"#).unwrap();
/// assert_eq!(opts.filename, "screenshot");
/// assert_eq!(opts.quality, 1.0);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureOptions {
    /// Output encoding
    pub format: ImageFormat,
    /// 0-1, used by lossy formats only
    pub quality: f32,
    /// Fill under the content
    pub background: Background,
    /// Pixels per logical px; the document's device pixel ratio when unset
    pub scale: Option<f32>,
    /// What happens to the encoded image
    pub delivery: DeliveryMode,
    /// File stem for downloads
    pub filename: String,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: 1.0,
            background: Background::default(),
            scale: None,
            delivery: DeliveryMode::Return,
            filename: "screenshot".to_string(),
        }
    }
}

impl CaptureOptions {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| Error::Config(format!("invalid capture options: {e}")))
    }

    /// The scale to render at. Non-finite or non-positive values fall back
    /// to 1.0.
    pub fn effective_scale(&self, device_pixel_ratio: f32) -> f32 {
        let scale = self.scale.unwrap_or(device_pixel_ratio);
        if scale.is_finite() && scale > 0.0 {
            scale
        } else {
            log::warn!("invalid capture scale {}, using 1.0", scale);
            1.0
        }
    }
}

/// A target plus the options to capture it with
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRequest {
    pub target: Target,
    pub options: CaptureOptions,
}

impl CaptureRequest {
    pub fn new(target: Target) -> Self {
        Self {
            target,
            options: CaptureOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CaptureOptions) -> Self {
        self.options = options;
        self
    }
}
