//! Primitive reconstruction and the placeholder stub.
//!
//! Neither path loads anything or suspends: both paint straight from
//! computed values onto the buffer they are handed.

use scraper::ElementRef;

use super::buffer::PixelBuffer;
use super::layout::{wrap_words, Edges, FontSpec, Rect};
use super::paint::{border_commands, PaintCommand};
use crate::style::{Color, StyleResolver};

/// Inset of wrapped text from the buffer edges.
pub const TEXT_PADDING: f32 = 10.0;

const STUB_BORDER: Color = Color::rgb(0x33, 0x33, 0x33);
const STUB_BORDER_WIDTH: f32 = 2.0;
const STUB_LABEL: Color = Color::rgb(0x66, 0x66, 0x66);
const STUB_FONT_SIZE: f32 = 14.0;

/// Label drawn by the stub: `Element: DIV`.
pub fn stub_label(element: ElementRef<'_>) -> String {
    format!("Element: {}", element.value().name().to_ascii_uppercase())
}

pub struct FallbackRenderer<'r> {
    resolver: &'r StyleResolver,
}

impl<'r> FallbackRenderer<'r> {
    pub fn new(resolver: &'r StyleResolver) -> Self {
        Self { resolver }
    }

    /// Approximates `element` from its background, border and flattened text.
    pub fn render_basic(&self, element: ElementRef<'_>, mut target: PixelBuffer) -> PixelBuffer {
        let commands = self.basic_commands(element, target.logical_width(), target.logical_height());
        target.paint(&commands);
        target
    }

    pub fn basic_commands(&self, element: ElementRef<'_>, width: f32, height: f32) -> Vec<PaintCommand> {
        let style = self.resolver.computed(element);
        let mut out = Vec::new();
        let bounds = Rect::new(0.0, 0.0, width, height);

        let bg = style.color("background-color");
        if !bg.is_transparent() {
            out.push(PaintCommand::FillRect { rect: bounds, color: bg });
        }

        let border = style.px("border-top-width");
        if border > 0.0 {
            let color = style.color("border-top-color");
            out.extend(border_commands(bounds, Edges::uniform(border), [color; 4]));
        }

        let text: String = element.text().collect();
        if text.trim().is_empty() {
            return out;
        }
        let font = FontSpec::from_style(&style);
        let color = style.color("color");
        let line_height = font.size * 1.2;
        let mut y = TEXT_PADDING;
        for line in wrap_words(&text, width - TEXT_PADDING * 2.0, &font) {
            if y > height - TEXT_PADDING {
                break;
            }
            out.push(PaintCommand::Text {
                x: TEXT_PADDING,
                y,
                line_height,
                text: line,
                font: font.clone(),
                color,
            });
            y += line_height;
        }
        out
    }

    /// Terminal placeholder: a border around the whole buffer and a centered
    /// label naming the element. Cannot fail.
    pub fn render_stub(&self, element: ElementRef<'_>, mut target: PixelBuffer) -> PixelBuffer {
        let commands = stub_commands(&stub_label(element), target.logical_width(), target.logical_height());
        target.paint(&commands);
        target
    }
}

pub fn stub_commands(label: &str, width: f32, height: f32) -> Vec<PaintCommand> {
    let bounds = Rect::new(0.0, 0.0, width, height);
    let mut out = border_commands(bounds, Edges::uniform(STUB_BORDER_WIDTH), [STUB_BORDER; 4]);
    let font = FontSpec {
        family: "sans-serif".to_string(),
        size: STUB_FONT_SIZE,
        bold: false,
        italic: false,
    };
    let line_height = STUB_FONT_SIZE * 1.2;
    let text_width = font.measure(label);
    out.push(PaintCommand::Text {
        x: (width - text_width) / 2.0,
        y: (height - line_height) / 2.0,
        line_height,
        text: label.to_string(),
        font,
        color: STUB_LABEL,
    });
    out
}
