//! Rendering: layout, painting, pixel buffers and the image pipeline.

pub mod buffer;
pub mod fallback;
pub mod layout;
pub mod paint;
pub mod raster;

pub use buffer::PixelBuffer;
pub use fallback::FallbackRenderer;
pub use layout::{LayoutBox, LayoutEngine, Rect};
pub use paint::PaintCommand;
pub use raster::{
    Image, ImageLoader, ImageRequest, ImageSource, ObjectUrl, ObjectUrlStore, RasterRenderer, SvgImageLoader,
    LOAD_TIMEOUT,
};
