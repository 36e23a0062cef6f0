//! Declarative capture controls.
//!
//! A control is any element carrying `data-screenshot="<selector>"` plus
//! optional `data-screenshot-*` companions:
//!
//! | attribute                  | default      |
//! |----------------------------|--------------|
//! | `data-screenshot-format`   | `png`        |
//! | `data-screenshot-quality`  | `1.0`        |
//! | `data-screenshot-download` | `true`       |
//! | `data-screenshot-filename` | `screenshot` |
//! | `data-screenshot-bg`       | `#ffffff`    |

use std::cell::{Cell, RefCell};

use scraper::ElementRef;

use crate::capture::Capturer;
use crate::delivery::{Delivered, DeliveryMode, OutputSink};
use crate::document::{Document, Target};
use crate::{Background, CaptureOptions, Error, ImageFormat};

pub const MARKER: &str = "data-screenshot";
pub const PENDING_LABEL: &str = "Capturing...";
pub const NOT_FOUND: &str = "Element not found";
pub const CAPTURE_FAILED: &str =
    "Failed to capture screenshot. Some browsers have restrictions on capturing styled content.";

/// Result of activating a control
#[derive(Debug)]
pub enum Activation {
    /// The control was already busy
    Ignored,
    Completed(Delivered),
    Failed(Error),
}

/// A capture trigger read from a marked element.
#[derive(Debug)]
pub struct CaptureControl {
    target: Target,
    options: CaptureOptions,
    label: RefCell<String>,
    disabled: Cell<bool>,
}

impl CaptureControl {
    pub fn from_element(el: ElementRef<'_>) -> Self {
        let attr = |name: &str| el.value().attr(name);

        let target = match attr(MARKER).map(str::trim) {
            Some(sel) if !sel.is_empty() => Target::selector(sel),
            _ => Target::Body,
        };
        let format = match attr("data-screenshot-format") {
            Some(v) => v.parse().unwrap_or_else(|e| {
                log::warn!("{}, using png", e);
                ImageFormat::Png
            }),
            None => ImageFormat::Png,
        };
        let quality = attr("data-screenshot-quality")
            .and_then(|v| v.trim().parse::<f32>().ok())
            .filter(|q| *q != 0.0 && q.is_finite())
            .unwrap_or(1.0);
        let delivery = match attr("data-screenshot-download") {
            Some("false") => DeliveryMode::Return,
            _ => DeliveryMode::Download,
        };
        let filename = attr("data-screenshot-filename").unwrap_or("screenshot").to_string();
        let background = attr("data-screenshot-bg")
            .unwrap_or("#ffffff")
            .parse::<Background>()
            .unwrap_or_default();

        Self {
            target,
            options: CaptureOptions {
                format,
                quality,
                background,
                scale: None,
                delivery,
                filename,
            },
            label: RefCell::new(el.text().collect::<String>().trim().to_string()),
            disabled: Cell::new(false),
        }
    }

    /// Every control in `document`, in document order.
    pub fn discover(document: &Document) -> Vec<Self> {
        document.capture_controls().into_iter().map(Self::from_element).collect()
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    pub fn options(&self) -> &CaptureOptions {
        &self.options
    }

    pub fn label(&self) -> String {
        self.label.borrow().clone()
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.get()
    }

    /// Captures and delivers. The control is disabled and relabelled while
    /// this runs; activating it again meanwhile does nothing.
    pub async fn capture_and_deliver(&self, capturer: &Capturer<'_>, sink: &OutputSink<'_>) -> Activation {
        let Some(_pending) = Pending::begin(self) else {
            log::debug!("capture control busy, ignoring activation");
            return Activation::Ignored;
        };

        let image = match capturer.capture(&self.target, &self.options).await {
            Ok(image) => image,
            Err(e) => {
                log::error!("capture failed: {}", e);
                let message = match e {
                    Error::ElementNotFound(_) => NOT_FOUND,
                    _ => CAPTURE_FAILED,
                };
                sink.notifier().error(message);
                return Activation::Failed(e);
            }
        };
        match sink.deliver(image, self.options.delivery, &self.options.filename).await {
            Ok(delivered) => Activation::Completed(delivered),
            Err(e) => Activation::Failed(e),
        }
    }
}

/// Disables a control and restores it on drop.
struct Pending<'c> {
    control: &'c CaptureControl,
    label: String,
}

impl<'c> Pending<'c> {
    fn begin(control: &'c CaptureControl) -> Option<Self> {
        if control.disabled.replace(true) {
            return None;
        }
        let label = control.label.replace(PENDING_LABEL.to_string());
        Some(Self { control, label })
    }
}

impl Drop for Pending<'_> {
    fn drop(&mut self) {
        *self.control.label.borrow_mut() = std::mem::take(&mut self.label);
        self.control.disabled.set(false);
    }
}
