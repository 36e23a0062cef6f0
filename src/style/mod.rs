//! Style engine: CSS parsing, cascade and computed values.
//!
//! Computed values mirror what `getComputedStyle` reports in a browser:
//! colors as `rgb()`/`rgba()`, absolute lengths in px, numeric font weights.
//! The capture routes read styles exclusively through [`StyleResolver`].

pub mod cascade;
pub mod color;
pub mod css;

pub use cascade::{ComputedStyle, PropertyDef, Specificity, StyleResolver, PROPERTIES};
pub use color::Color;
pub use css::{parse_declarations, parse_stylesheet, CssRule, Declaration, StyleRule};
