//! Paint commands and the painter that rasterizes them.

use std::sync::{Arc, OnceLock};

use resvg::tiny_skia::{self, FillRule, Mask, Paint, Path, PathBuilder, Pixmap, PixmapPaint, Transform};
use resvg::usvg::{self, fontdb};

use super::layout::{Edges, FontSpec, LayoutBox, Rect};
use crate::markup::{escape_attr, escape_text};
use crate::style::Color;

#[derive(Debug, Clone, PartialEq)]
pub enum PaintCommand {
    FillRect {
        rect: Rect,
        color: Color,
    },
    FillRoundedRect {
        rect: Rect,
        radius: f32,
        color: Color,
    },
    /// One line of text; `y` is the top of the line box.
    Text {
        x: f32,
        y: f32,
        line_height: f32,
        text: String,
        font: FontSpec,
        color: Color,
    },
    PushClip(Rect),
    PopClip,
}

/// Builds the display list for a laid-out tree in paint order.
pub fn display_list(root: &LayoutBox<'_>) -> Vec<PaintCommand> {
    let mut out = Vec::new();
    paint_box(root, 1.0, &mut out);
    out
}

fn paint_box(b: &LayoutBox<'_>, parent_opacity: f32, out: &mut Vec<PaintCommand>) {
    let style = &b.style;
    let opacity = parent_opacity * style.opacity();
    if opacity <= 0.0 {
        return;
    }
    let visible = style.is_visible();

    if visible {
        let bg = style.color("background-color").with_alpha_factor(opacity);
        if !bg.is_transparent() {
            let radius = first_px(style.value("border-radius"));
            if radius > 0.0 {
                out.push(PaintCommand::FillRoundedRect {
                    rect: b.rect,
                    radius,
                    color: bg,
                });
            } else {
                out.push(PaintCommand::FillRect { rect: b.rect, color: bg });
            }
        }
        let colors = ["top", "right", "bottom", "left"]
            .map(|side| style.color(&format!("border-{side}-color")).with_alpha_factor(opacity));
        out.extend(border_commands(b.rect, b.box_model.border, colors));
    }

    let clip = style.clips_overflow();
    if clip {
        out.push(PaintCommand::PushClip(b.padding_rect()));
    }
    if visible {
        let font = FontSpec::from_style(style);
        let color = style.color("color").with_alpha_factor(opacity);
        let underline = style.value("text-decoration").contains("underline");
        for line in &b.lines {
            out.push(PaintCommand::Text {
                x: line.x,
                y: line.y,
                line_height: line.height,
                text: line.text.clone(),
                font: font.clone(),
                color,
            });
            if underline {
                let thickness = (font.size / 14.0).max(1.0);
                out.push(PaintCommand::FillRect {
                    rect: Rect::new(line.x, baseline(line.y, line.height, font.size) + thickness, line.width, thickness),
                    color,
                });
            }
        }
    }
    for child in &b.children {
        paint_box(child, opacity, out);
    }
    if clip {
        out.push(PaintCommand::PopClip);
    }
}

fn first_px(value: &str) -> f32 {
    value
        .split_whitespace()
        .next()
        .and_then(crate::style::cascade::parse_px)
        .unwrap_or(0.0)
}

fn baseline(top: f32, line_height: f32, font_size: f32) -> f32 {
    top + (line_height - font_size) / 2.0 + font_size * 0.8
}

/// Border bands drawn as filled rects inside `rect`, sides in
/// top/right/bottom/left order.
pub fn border_commands(rect: Rect, widths: Edges, colors: [Color; 4]) -> Vec<PaintCommand> {
    let inner_height = (rect.height - widths.vertical()).max(0.0);
    let bands = [
        Rect::new(rect.x, rect.y, rect.width, widths.top),
        Rect::new(rect.right() - widths.right, rect.y + widths.top, widths.right, inner_height),
        Rect::new(rect.x, rect.bottom() - widths.bottom, rect.width, widths.bottom),
        Rect::new(rect.x, rect.y + widths.top, widths.left, inner_height),
    ];
    bands
        .into_iter()
        .zip(colors)
        .filter(|(band, color)| !band.is_empty() && !color.is_transparent())
        .map(|(rect, color)| PaintCommand::FillRect { rect, color })
        .collect()
}

/// System fonts, loaded once per process.
pub fn font_database() -> Arc<fontdb::Database> {
    static FONTS: OnceLock<Arc<fontdb::Database>> = OnceLock::new();
    FONTS
        .get_or_init(|| {
            let mut db = fontdb::Database::new();
            db.load_system_fonts();
            log::debug!("loaded {} font faces", db.len());
            Arc::new(db)
        })
        .clone()
}

/// usvg options sharing the process-wide font database.
pub fn svg_options() -> usvg::Options<'static> {
    usvg::Options {
        fontdb: font_database(),
        ..usvg::Options::default()
    }
}

fn to_skia_rect(rect: &Rect) -> Option<tiny_skia::Rect> {
    tiny_skia::Rect::from_xywh(rect.x, rect.y, rect.width, rect.height)
}

fn rounded_rect_path(rect: &Rect, radius: f32) -> Option<Path> {
    let r = radius.min(rect.width / 2.0).min(rect.height / 2.0).max(0.0);
    if r <= 0.0 {
        return Some(PathBuilder::from_rect(to_skia_rect(rect)?));
    }
    // offset of the cubic control points from each corner
    let k = r * (1.0 - 0.552_284_8);
    let (x0, y0, x1, y1) = (rect.x, rect.y, rect.right(), rect.bottom());
    let mut pb = PathBuilder::new();
    pb.move_to(x0 + r, y0);
    pb.line_to(x1 - r, y0);
    pb.cubic_to(x1 - k, y0, x1, y0 + k, x1, y0 + r);
    pb.line_to(x1, y1 - r);
    pb.cubic_to(x1, y1 - k, x1 - k, y1, x1 - r, y1);
    pb.line_to(x0 + r, y1);
    pb.cubic_to(x0 + k, y1, x0, y1 - k, x0, y1 - r);
    pb.line_to(x0, y0 + r);
    pb.cubic_to(x0, y0 + k, x0 + k, y0, x0 + r, y0);
    pb.close();
    pb.finish()
}

/// Executes paint commands on a pixmap. Coordinates are logical px; the
/// painter scales them to device pixels.
pub struct Painter<'p> {
    pixmap: &'p mut Pixmap,
    scale: f32,
    transform: Transform,
    clips: Vec<Rect>,
    mask: Option<Mask>,
}

impl<'p> Painter<'p> {
    pub fn new(pixmap: &'p mut Pixmap, scale: f32) -> Self {
        Self {
            pixmap,
            scale,
            transform: Transform::from_scale(scale, scale),
            clips: Vec::new(),
            mask: None,
        }
    }

    pub fn execute(&mut self, commands: &[PaintCommand]) {
        for command in commands {
            self.apply(command);
        }
    }

    fn apply(&mut self, command: &PaintCommand) {
        match command {
            PaintCommand::FillRect { rect, color } => self.fill(rect, 0.0, *color),
            PaintCommand::FillRoundedRect { rect, radius, color } => self.fill(rect, *radius, *color),
            PaintCommand::Text {
                x,
                y,
                line_height,
                text,
                font,
                color,
            } => self.text(*x, baseline(*y, *line_height, font.size), text, font, *color),
            PaintCommand::PushClip(rect) => {
                let clip = match self.clips.last() {
                    Some(current) => current.intersect(rect),
                    None => *rect,
                };
                self.clips.push(clip);
                self.rebuild_mask();
            }
            PaintCommand::PopClip => {
                self.clips.pop();
                self.rebuild_mask();
            }
        }
    }

    fn rebuild_mask(&mut self) {
        self.mask = self.clips.last().and_then(|clip| {
            let mut mask = Mask::new(self.pixmap.width(), self.pixmap.height())?;
            if let Some(rect) = to_skia_rect(clip) {
                mask.fill_path(&PathBuilder::from_rect(rect), FillRule::Winding, false, self.transform);
            }
            Some(mask)
        });
    }

    fn fill(&mut self, rect: &Rect, radius: f32, color: Color) {
        if color.is_transparent() || rect.is_empty() {
            return;
        }
        let mut paint = Paint::default();
        paint.set_color(color.to_skia());
        paint.anti_alias = radius > 0.0;
        if radius > 0.0 {
            if let Some(path) = rounded_rect_path(rect, radius) {
                self.pixmap
                    .fill_path(&path, &paint, FillRule::Winding, self.transform, self.mask.as_ref());
            }
        } else if let Some(r) = to_skia_rect(rect) {
            self.pixmap.fill_rect(r, &paint, self.transform, self.mask.as_ref());
        }
    }

    /// Draws one text run through usvg. Without a usable font the glyphs are
    /// simply absent.
    fn text(&mut self, x: f32, baseline: f32, text: &str, font: &FontSpec, color: Color) {
        if text.trim().is_empty() || color.is_transparent() {
            return;
        }
        let width = self.pixmap.width() as f32 / self.scale;
        let height = self.pixmap.height() as f32 / self.scale;
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}"><text x="{x}" y="{baseline}" font-family="{family}" font-size="{size}" font-weight="{weight}" font-style="{style}" fill="{fill}" fill-opacity="{alpha}" xml:space="preserve">{text}</text></svg>"#,
            family = escape_attr(&font.family),
            size = font.size,
            weight = if font.bold { "bold" } else { "normal" },
            style = if font.italic { "italic" } else { "normal" },
            fill = color.to_hex(),
            alpha = color.a,
            text = escape_text(text),
        );
        let tree = match usvg::Tree::from_str(&svg, &svg_options()) {
            Ok(tree) => tree,
            Err(e) => {
                log::debug!("skipping text run: {}", e);
                return;
            }
        };
        match &self.mask {
            None => resvg::render(&tree, self.transform, &mut self.pixmap.as_mut()),
            Some(mask) => {
                let Some(mut layer) = Pixmap::new(self.pixmap.width(), self.pixmap.height()) else {
                    return;
                };
                resvg::render(&tree, self.transform, &mut layer.as_mut());
                self.pixmap.draw_pixmap(
                    0,
                    0,
                    layer.as_ref(),
                    &PixmapPaint::default(),
                    Transform::identity(),
                    Some(mask),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rendering::layout::LayoutEngine;
    use crate::style::{parse_stylesheet, StyleResolver};
    use crate::Viewport;
    use scraper::Html;

    fn rgba_at(pixmap: &Pixmap, x: u32, y: u32) -> (u8, u8, u8, u8) {
        let p = pixmap.pixel(x, y).unwrap().demultiply();
        (p.red(), p.green(), p.blue(), p.alpha())
    }

    #[test]
    fn display_list_orders_background_border_text() {
        let html = Html::parse_document(r#"<div id="a">hello</div>"#);
        let sheet = parse_stylesheet(
            "body { margin: 0 } #a { width: 50px; background: #ff0000; border: 1px solid #0000ff; border-radius: 4px }",
        );
        let resolver = StyleResolver::new([sheet.as_slice()], Viewport::default());
        let tree = LayoutEngine::new(&resolver).layout(html.root_element(), 100.0).unwrap();
        let list = display_list(&tree);
        let kinds: Vec<&str> = list
            .iter()
            .map(|c| match c {
                PaintCommand::FillRect { .. } => "rect",
                PaintCommand::FillRoundedRect { .. } => "round",
                PaintCommand::Text { .. } => "text",
                PaintCommand::PushClip(_) => "push",
                PaintCommand::PopClip => "pop",
            })
            .collect();
        assert_eq!(kinds, vec!["round", "rect", "rect", "rect", "rect", "text"]);
    }

    #[test]
    fn border_bands_cover_edges() {
        let cmds = border_commands(
            Rect::new(0.0, 0.0, 10.0, 10.0),
            Edges::uniform(2.0),
            [Color::BLACK; 4],
        );
        assert_eq!(cmds.len(), 4);
        assert_eq!(
            cmds[1],
            PaintCommand::FillRect {
                rect: Rect::new(8.0, 2.0, 2.0, 6.0),
                color: Color::BLACK
            }
        );
    }

    #[test]
    fn painter_scales_and_clips() {
        let mut pixmap = Pixmap::new(40, 40).unwrap();
        let mut painter = Painter::new(&mut pixmap, 2.0);
        painter.execute(&[
            PaintCommand::PushClip(Rect::new(0.0, 0.0, 10.0, 10.0)),
            PaintCommand::FillRect {
                rect: Rect::new(0.0, 0.0, 20.0, 20.0),
                color: Color::rgb(0, 128, 0),
            },
            PaintCommand::PopClip,
        ]);
        assert_eq!(rgba_at(&pixmap, 5, 5), (0, 128, 0, 255));
        assert_eq!(rgba_at(&pixmap, 19, 19), (0, 128, 0, 255));
        assert_eq!(rgba_at(&pixmap, 25, 25).3, 0);
    }

    #[test]
    fn opacity_multiplies_through_children() {
        let html = Html::parse_document(r#"<div id="o"><div id="i">x</div></div>"#);
        let sheet = parse_stylesheet("#o { opacity: 0.5 } #i { background: #000 }");
        let resolver = StyleResolver::new([sheet.as_slice()], Viewport::default());
        let tree = LayoutEngine::new(&resolver).layout(html.root_element(), 100.0).unwrap();
        let list = display_list(&tree);
        let bg = list
            .iter()
            .find_map(|c| match c {
                PaintCommand::FillRect { color, .. } => Some(*color),
                _ => None,
            })
            .unwrap();
        assert!((bg.a - 0.5).abs() < 1e-6);
    }
}
