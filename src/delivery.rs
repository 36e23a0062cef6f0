//! Terminal hand-off of encoded images: downloads, the clipboard, or the
//! caller.

use std::cell::RefCell;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;

use futures::future::LocalBoxFuture;
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::encode::EncodedImage;
use crate::{Error, Result};

pub const DOWNLOADED: &str = "Screenshot downloaded!";
pub const COPIED: &str = "Screenshot copied to clipboard!";
pub const COPY_FAILED: &str = "Failed to copy to clipboard";
pub const DOWNLOAD_FAILED: &str = "Failed to save screenshot";

/// Where a finished capture goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    Download,
    Clipboard,
    /// Hand the image back to the caller
    #[default]
    Return,
}

impl FromStr for DeliveryMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "download" => Ok(DeliveryMode::Download),
            "clipboard" => Ok(DeliveryMode::Clipboard),
            "return" => Ok(DeliveryMode::Return),
            other => Err(Error::Config(format!("unknown delivery mode `{other}`"))),
        }
    }
}

/// What a delivery did
#[derive(Debug)]
pub enum Delivered {
    Downloaded(PathBuf),
    /// Written through the named clipboard writer
    Copied(&'static str),
    Returned(EncodedImage),
}

/// Saves files on the user's behalf.
pub trait Downloader {
    fn download<'a>(&'a self, image: &'a EncodedImage, file_name: &'a str) -> LocalBoxFuture<'a, Result<PathBuf>>;
}

/// Writes downloads into a directory, creating it on first use.
#[derive(Debug, Clone)]
pub struct DirectoryDownloader {
    dir: PathBuf,
}

impl DirectoryDownloader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl Downloader for DirectoryDownloader {
    fn download<'a>(&'a self, image: &'a EncodedImage, file_name: &'a str) -> LocalBoxFuture<'a, Result<PathBuf>> {
        Box::pin(async move {
            tokio::fs::create_dir_all(&self.dir).await?;
            let path = self.dir.join(file_name);
            tokio::fs::write(&path, image.bytes()).await?;
            log::debug!("wrote {} bytes to {}", image.len(), path.display());
            Ok(path)
        })
    }
}

/// What a clipboard accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipboardCapabilities {
    /// Encoded image bytes with a mime type
    pub binary: bool,
    /// Decoded pixels
    pub pixels: bool,
}

pub trait Clipboard {
    fn capabilities(&self) -> ClipboardCapabilities;

    fn write_encoded<'a>(&'a self, image: &'a EncodedImage) -> LocalBoxFuture<'a, Result<()>>;

    fn write_pixels<'a>(&'a self, pixels: &'a RgbaImage) -> LocalBoxFuture<'a, Result<()>>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClipboardContents {
    Encoded(EncodedImage),
    Pixels(RgbaImage),
}

/// In-process clipboard with configurable capabilities.
#[derive(Debug)]
pub struct MemoryClipboard {
    capabilities: ClipboardCapabilities,
    /// Mime types accepted for encoded writes; `None` accepts any
    accepted: Option<Vec<String>>,
    contents: RefCell<Option<ClipboardContents>>,
}

impl MemoryClipboard {
    pub fn new(capabilities: ClipboardCapabilities) -> Self {
        Self {
            capabilities,
            accepted: None,
            contents: RefCell::new(None),
        }
    }

    /// Restricts encoded writes to `mimes`, the way browser clipboards
    /// usually take `image/png` and nothing else.
    pub fn accepting(mut self, mimes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.accepted = Some(mimes.into_iter().map(Into::into).collect());
        self
    }

    pub fn contents(&self) -> Option<ClipboardContents> {
        self.contents.borrow().clone()
    }
}

impl Default for MemoryClipboard {
    fn default() -> Self {
        Self::new(ClipboardCapabilities {
            binary: true,
            pixels: true,
        })
    }
}

impl Clipboard for MemoryClipboard {
    fn capabilities(&self) -> ClipboardCapabilities {
        self.capabilities
    }

    fn write_encoded<'a>(&'a self, image: &'a EncodedImage) -> LocalBoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.capabilities.binary {
                return Err(Error::ClipboardUnavailable(format!("{} writes not supported", image.mime())));
            }
            if let Some(accepted) = &self.accepted {
                if !accepted.iter().any(|m| m == image.mime()) {
                    return Err(Error::ClipboardUnavailable(format!("{} not accepted", image.mime())));
                }
            }
            *self.contents.borrow_mut() = Some(ClipboardContents::Encoded(image.clone()));
            Ok(())
        })
    }

    fn write_pixels<'a>(&'a self, pixels: &'a RgbaImage) -> LocalBoxFuture<'a, Result<()>> {
        Box::pin(async move {
            if !self.capabilities.pixels {
                return Err(Error::ClipboardUnavailable("pixel writes not supported".to_string()));
            }
            *self.contents.borrow_mut() = Some(ClipboardContents::Pixels(pixels.clone()));
            Ok(())
        })
    }
}

/// Pipes encoded bytes into an external clipboard program. The image's
/// mime type is appended to `args`.
#[derive(Debug, Clone)]
pub struct CommandClipboard {
    program: String,
    args: Vec<String>,
}

impl CommandClipboard {
    pub fn new(program: impl Into<String>, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn wl_copy() -> Self {
        Self::new("wl-copy", ["--type"])
    }

    pub fn xclip() -> Self {
        Self::new("xclip", ["-selection", "clipboard", "-t"])
    }

    /// `wl-copy` under Wayland, `xclip` otherwise.
    pub fn detect() -> Self {
        if std::env::var_os("WAYLAND_DISPLAY").is_some() {
            Self::wl_copy()
        } else {
            Self::xclip()
        }
    }
}

impl Clipboard for CommandClipboard {
    fn capabilities(&self) -> ClipboardCapabilities {
        ClipboardCapabilities {
            binary: true,
            pixels: false,
        }
    }

    fn write_encoded<'a>(&'a self, image: &'a EncodedImage) -> LocalBoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut child = tokio::process::Command::new(&self.program)
                .args(&self.args)
                .arg(image.mime())
                .stdin(Stdio::piped())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                .spawn()
                .map_err(|e| Error::ClipboardUnavailable(format!("cannot run {}: {}", self.program, e)))?;
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(image.bytes()).await?;
                stdin.shutdown().await?;
            }
            let output = child.wait_with_output().await?;
            if !output.status.success() {
                return Err(Error::Delivery(format!(
                    "{} exited with {}: {}",
                    self.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                )));
            }
            Ok(())
        })
    }

    fn write_pixels<'a>(&'a self, _pixels: &'a RgbaImage) -> LocalBoxFuture<'a, Result<()>> {
        Box::pin(async move {
            Err(Error::ClipboardUnavailable(format!(
                "{} does not accept raw pixels",
                self.program
            )))
        })
    }
}

/// One way of getting an image onto a clipboard.
pub trait ClipboardWriter {
    fn name(&self) -> &'static str;

    fn write<'a>(&'a self, image: &'a EncodedImage) -> LocalBoxFuture<'a, Result<()>>;
}

/// Writes the encoded bytes as-is.
pub struct DirectWriter<'c> {
    clipboard: &'c dyn Clipboard,
}

impl ClipboardWriter for DirectWriter<'_> {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn write<'a>(&'a self, image: &'a EncodedImage) -> LocalBoxFuture<'a, Result<()>> {
        self.clipboard.write_encoded(image)
    }
}

/// For clipboards without binary support: serialize to a data URL, load it
/// back as an image and write the decoded pixels.
pub struct DataUrlRoundTrip<'c> {
    clipboard: &'c dyn Clipboard,
}

impl ClipboardWriter for DataUrlRoundTrip<'_> {
    fn name(&self) -> &'static str {
        "data-url-round-trip"
    }

    fn write<'a>(&'a self, image: &'a EncodedImage) -> LocalBoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let url = image.to_data_url();
            let pixels = EncodedImage::from_data_url(&url)?.decode()?;
            self.clipboard.write_pixels(&pixels).await
        })
    }
}

/// Picks the writer for `clipboard` from its capabilities.
pub fn select_writer(clipboard: &dyn Clipboard) -> Box<dyn ClipboardWriter + '_> {
    writer_for(clipboard, clipboard.capabilities())
}

fn writer_for(clipboard: &dyn Clipboard, capabilities: ClipboardCapabilities) -> Box<dyn ClipboardWriter + '_> {
    if capabilities.binary {
        Box::new(DirectWriter { clipboard })
    } else {
        Box::new(DataUrlRoundTrip { clipboard })
    }
}

/// User-facing outcome messages.
pub trait Notifier {
    fn success(&self, message: &str);

    fn error(&self, message: &str);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        log::info!("{}", message);
    }

    fn error(&self, message: &str) {
        log::error!("{}", message);
    }
}

/// Delivers encoded images and reports the outcome.
pub struct OutputSink<'s> {
    notifier: &'s dyn Notifier,
    downloader: Option<&'s dyn Downloader>,
    clipboard: Option<&'s dyn Clipboard>,
}

impl fmt::Debug for OutputSink<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSink")
            .field("downloader", &self.downloader.is_some())
            .field("clipboard", &self.clipboard.is_some())
            .finish()
    }
}

impl<'s> OutputSink<'s> {
    pub fn new(notifier: &'s dyn Notifier) -> Self {
        Self {
            notifier,
            downloader: None,
            clipboard: None,
        }
    }

    pub fn with_downloader(mut self, downloader: &'s dyn Downloader) -> Self {
        self.downloader = Some(downloader);
        self
    }

    pub fn with_clipboard(mut self, clipboard: &'s dyn Clipboard) -> Self {
        self.clipboard = Some(clipboard);
        self
    }

    pub fn notifier(&self) -> &'s dyn Notifier {
        self.notifier
    }

    /// Performs exactly one of download, clipboard write or return.
    /// Download and clipboard outcomes are notified; returning is silent.
    pub async fn deliver(&self, image: EncodedImage, mode: DeliveryMode, filename: &str) -> Result<Delivered> {
        match mode {
            DeliveryMode::Return => Ok(Delivered::Returned(image)),
            DeliveryMode::Download => match self.download(&image, filename).await {
                Ok(path) => {
                    self.notifier.success(DOWNLOADED);
                    Ok(Delivered::Downloaded(path))
                }
                Err(e) => {
                    log::warn!("download failed: {}", e);
                    self.notifier.error(DOWNLOAD_FAILED);
                    Err(e)
                }
            },
            DeliveryMode::Clipboard => match self.copy(&image).await {
                Ok(writer) => {
                    self.notifier.success(COPIED);
                    Ok(Delivered::Copied(writer))
                }
                Err(e) => {
                    log::warn!("clipboard write failed: {}", e);
                    self.notifier.error(COPY_FAILED);
                    Err(e)
                }
            },
        }
    }

    async fn download(&self, image: &EncodedImage, filename: &str) -> Result<PathBuf> {
        let downloader = self
            .downloader
            .ok_or_else(|| Error::Delivery("no downloader configured".to_string()))?;
        downloader.download(image, &image.file_name(filename)).await
    }

    async fn copy(&self, image: &EncodedImage) -> Result<&'static str> {
        let clipboard = self
            .clipboard
            .ok_or_else(|| Error::ClipboardUnavailable("no clipboard configured".to_string()))?;
        let capabilities = clipboard.capabilities();
        let writer = writer_for(clipboard, capabilities);
        log::debug!("writing {} to clipboard via {}", image.mime(), writer.name());
        match writer.write(image).await {
            Ok(()) => Ok(writer.name()),
            // a rejected binary write still leaves the pixel path
            Err(Error::ClipboardUnavailable(reason)) if capabilities.binary && capabilities.pixels => {
                log::warn!("{} clipboard write rejected ({}), retrying via data URL", writer.name(), reason);
                let fallback = DataUrlRoundTrip { clipboard };
                fallback.write(image).await?;
                Ok(fallback.name())
            }
            Err(e) => Err(e),
        }
    }
}
