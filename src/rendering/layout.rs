//! Block layout over computed styles.
//!
//! Used for two things: measuring the region a capture covers, and laying out
//! foreign content embedded in a vector document before it is painted.
//! Inline content is flattened into text runs and wrapped greedily; inline
//! boxes do not get their own backgrounds.

use std::rc::Rc;

use ego_tree::NodeId;
use scraper::node::Node;
use scraper::ElementRef;

use crate::style::cascade::parse_px;
use crate::style::{ComputedStyle, StyleResolver};

/// Marks a `<br>` inside a flattened text run.
const FORCED_BREAK: char = '\u{2028}';

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Shrinks the rect by `edges` on each side.
    pub fn inset(&self, edges: Edges) -> Rect {
        Rect {
            x: self.x + edges.left,
            y: self.y + edges.top,
            width: (self.width - edges.horizontal()).max(0.0),
            height: (self.height - edges.vertical()).max(0.0),
        }
    }

    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect::new(x, y, (right - x).max(0.0), (bottom - y).max(0.0))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Edges {
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
    pub left: f32,
}

impl Edges {
    pub fn uniform(v: f32) -> Self {
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn horizontal(&self) -> f32 {
        self.left + self.right
    }

    pub fn vertical(&self) -> f32 {
        self.top + self.bottom
    }

    fn from_style(style: &ComputedStyle, prefix: &str, suffix: &str) -> Self {
        let get = |side: &str| style.px(&format!("{prefix}{side}{suffix}")).max(0.0);
        Self {
            top: get("top"),
            right: get("right"),
            bottom: get("bottom"),
            left: get("left"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BoxModel {
    pub margin: Edges,
    pub border: Edges,
    pub padding: Edges,
}

impl BoxModel {
    pub fn from_style(style: &ComputedStyle) -> Self {
        Self {
            margin: Edges::from_style(style, "margin-", ""),
            border: Edges::from_style(style, "border-", "-width"),
            padding: Edges::from_style(style, "padding-", ""),
        }
    }
}

/// Font parameters needed to measure and draw a text run.
#[derive(Debug, Clone, PartialEq)]
pub struct FontSpec {
    pub family: String,
    pub size: f32,
    pub bold: bool,
    pub italic: bool,
}

impl FontSpec {
    pub fn from_style(style: &ComputedStyle) -> Self {
        Self {
            family: style.value("font-family").to_string(),
            size: style.font_size(),
            bold: style.is_bold(),
            italic: style.is_italic(),
        }
    }

    fn is_monospace(&self) -> bool {
        self.family.to_ascii_lowercase().contains("mono")
    }

    /// Advance-width estimate of `text` in px. Deterministic and font-database
    /// independent so that layout never depends on installed fonts.
    pub fn measure(&self, text: &str) -> f32 {
        let em: f32 = if self.is_monospace() {
            text.chars().count() as f32 * 0.6
        } else {
            text.chars().map(advance).sum()
        };
        let weight = if self.bold { 1.05 } else { 1.0 };
        em * self.size * weight
    }
}

fn advance(c: char) -> f32 {
    match c {
        ' ' | 'i' | 'j' | 'l' | '.' | ',' | '\'' | '!' | '|' | ':' | ';' | 'I' => 0.28,
        'f' | 't' | 'r' | '(' | ')' | '[' | ']' | '-' | '"' => 0.36,
        'm' | 'w' | 'M' | 'W' | '@' => 0.85,
        c if c.is_ascii_uppercase() => 0.66,
        c if c.is_ascii_digit() => 0.56,
        c if c.is_ascii() => 0.52,
        _ => 1.0,
    }
}

/// Greedy word wrap: words are appended while the line fits `max_width`.
/// A single word wider than the line gets a line of its own.
pub fn wrap_words(text: &str, max_width: f32, font: &FontSpec) -> Vec<String> {
    let mut lines = Vec::new();
    let mut line = String::new();
    for word in text.split_whitespace() {
        if line.is_empty() {
            line.push_str(word);
            continue;
        }
        let candidate = format!("{line} {word}");
        if font.measure(&candidate) > max_width {
            lines.push(std::mem::replace(&mut line, word.to_string()));
        } else {
            line = candidate;
        }
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Splits a flattened run into display lines according to `white-space`.
fn break_lines(run: &str, white_space: &str, width: f32, font: &FontSpec) -> Vec<String> {
    if run.trim().is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    for segment in run.split(FORCED_BREAK) {
        match white_space {
            "pre" => out.extend(segment.split('\n').map(|l| l.trim_end_matches('\r').to_string())),
            "pre-wrap" | "pre-line" | "break-spaces" => {
                for l in segment.split('\n') {
                    let wrapped = wrap_words(l, width, font);
                    if wrapped.is_empty() {
                        out.push(String::new());
                    } else {
                        out.extend(wrapped);
                    }
                }
            }
            "nowrap" => {
                let line = collapse_whitespace(segment);
                if !line.is_empty() {
                    out.push(line);
                }
            }
            _ => out.extend(wrap_words(segment, width, font)),
        }
    }
    while out.last().is_some_and(|l| l.trim().is_empty()) {
        out.pop();
    }
    out
}

/// One laid-out line of text, positioned in document coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLine {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct LayoutBox<'a> {
    pub element: ElementRef<'a>,
    pub style: Rc<ComputedStyle>,
    /// Border box
    pub rect: Rect,
    pub box_model: BoxModel,
    pub lines: Vec<TextLine>,
    pub children: Vec<LayoutBox<'a>>,
}

impl<'a> LayoutBox<'a> {
    pub fn padding_rect(&self) -> Rect {
        self.rect.inset(self.box_model.border)
    }

    pub fn content_rect(&self) -> Rect {
        self.padding_rect().inset(self.box_model.padding)
    }

    pub fn outer_width(&self) -> f32 {
        self.rect.width + self.box_model.margin.horizontal()
    }

    pub fn outer_height(&self) -> f32 {
        self.rect.height + self.box_model.margin.vertical()
    }

    /// Depth-first search for the box generated by `id`.
    pub fn find(&self, id: NodeId) -> Option<&LayoutBox<'a>> {
        if self.element.id() == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    /// Every text line in this box and its descendants, in paint order.
    pub fn all_lines(&self) -> Vec<&TextLine> {
        let mut out: Vec<&TextLine> = self.lines.iter().collect();
        for child in &self.children {
            out.extend(child.all_lines());
        }
        out
    }
}

fn is_block_level(display: &str) -> bool {
    matches!(
        display,
        "block" | "flex" | "grid" | "list-item" | "table" | "flow-root" | "table-row" | "table-cell"
    )
}

fn is_flex_row(style: &ComputedStyle) -> bool {
    matches!(style.display(), "flex" | "inline-flex")
        && matches!(style.value("flex-direction"), "row" | "row-reverse")
}

/// Resolves a computed size. `auto`, `none` and unresolvable percentages
/// yield `None`.
fn resolve_length(value: &str, reference: Option<f32>) -> Option<f32> {
    if let Some(pct) = value.strip_suffix('%') {
        let p: f32 = pct.trim().parse().ok()?;
        return reference.map(|r| r * p / 100.0);
    }
    parse_px(value)
}

struct Flow<'a> {
    x: f32,
    width: f32,
    cursor: f32,
    run: String,
    lines: Vec<TextLine>,
    children: Vec<LayoutBox<'a>>,
}

pub struct LayoutEngine<'r> {
    resolver: &'r StyleResolver,
}

impl<'r> LayoutEngine<'r> {
    pub fn new(resolver: &'r StyleResolver) -> Self {
        Self { resolver }
    }

    /// Lays out `root` at the origin with `width` available.
    pub fn layout<'a>(&self, root: ElementRef<'a>, width: f32) -> Option<LayoutBox<'a>> {
        self.layout_block(root, 0.0, 0.0, width, None)
    }

    /// Border box of `target` when the document rooted at `root` is laid out
    /// `viewport_width` wide. Elements inside a hidden subtree measure 0x0;
    /// inline-level targets are measured standalone, shrink-to-fit.
    pub fn bounding_rect(&self, root: ElementRef<'_>, target: ElementRef<'_>, viewport_width: f32) -> Rect {
        if self.resolver.is_hidden(target) {
            return Rect::default();
        }
        if let Some(tree) = self.layout(root, viewport_width) {
            if let Some(found) = tree.find(target.id()) {
                return found.rect;
            }
        }
        let fit = self.preferred_width(target).min(viewport_width);
        self.layout_block(target, 0.0, 0.0, viewport_width, Some(fit))
            .map(|b| b.rect)
            .unwrap_or_default()
    }

    /// `fit` forces the border-box width unless the element has an explicit one.
    fn layout_block<'a>(
        &self,
        el: ElementRef<'a>,
        x: f32,
        y: f32,
        available: f32,
        fit: Option<f32>,
    ) -> Option<LayoutBox<'a>> {
        let style = self.resolver.computed(el);
        if style.display() == "none" {
            return None;
        }
        let box_model = BoxModel::from_style(&style);
        let h_extra = box_model.border.horizontal() + box_model.padding.horizontal();
        let v_extra = box_model.border.vertical() + box_model.padding.vertical();
        let border_box = style.value("box-sizing") == "border-box";

        let width = match (resolve_length(style.value("width"), Some(available)), fit) {
            (Some(w), _) if border_box => w - h_extra,
            (Some(w), _) => w,
            (None, Some(f)) => f - h_extra,
            (None, None) => available - box_model.margin.horizontal() - h_extra,
        };
        let width = clamp_size(&style, width, ("min-width", "max-width"), Some(available), border_box, h_extra);

        let border_x = x + box_model.margin.left;
        let border_y = y + box_model.margin.top;
        let content_x = border_x + box_model.border.left + box_model.padding.left;
        let content_y = border_y + box_model.border.top + box_model.padding.top;

        let mut flow = Flow {
            x: content_x,
            width,
            cursor: content_y,
            run: String::new(),
            lines: Vec::new(),
            children: Vec::new(),
        };
        if is_flex_row(&style) && !has_direct_text(el) {
            self.layout_flex_row(el, &style, &mut flow);
        } else {
            self.layout_flow(el, &style, &mut flow);
        }

        let height = match resolve_length(style.value("height"), None) {
            Some(h) if border_box => h - v_extra,
            Some(h) => h,
            None => flow.cursor - content_y,
        };
        let height = clamp_size(&style, height, ("min-height", "max-height"), None, border_box, v_extra);

        Some(LayoutBox {
            element: el,
            rect: Rect::new(border_x, border_y, width + h_extra, height + v_extra),
            style,
            box_model,
            lines: flow.lines,
            children: flow.children,
        })
    }

    fn layout_flow<'a>(&self, el: ElementRef<'a>, style: &ComputedStyle, flow: &mut Flow<'a>) {
        for child in el.children() {
            match child.value() {
                Node::Text(text) => flow.run.push_str(text),
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else { continue };
                    let display = self.resolver.computed(child_el).display().to_string();
                    if display == "none" {
                        continue;
                    }
                    if is_block_level(&display) {
                        self.flush_text(style, flow);
                        if let Some(b) = self.layout_block(child_el, flow.x, flow.cursor, flow.width, None) {
                            flow.cursor += b.outer_height();
                            flow.children.push(b);
                        }
                    } else {
                        self.inline_text(child_el, &mut flow.run);
                    }
                }
                _ => {}
            }
        }
        self.flush_text(style, flow);
    }

    fn layout_flex_row<'a>(&self, el: ElementRef<'a>, style: &ComputedStyle, flow: &mut Flow<'a>) {
        let gap = style
            .value("gap")
            .split_whitespace()
            .last()
            .and_then(parse_px)
            .unwrap_or(0.0);
        let right = flow.x + flow.width;
        let mut x = flow.x;
        let mut row_height: f32 = 0.0;
        for child_el in el.children().filter_map(ElementRef::wrap) {
            let remaining = (right - x).max(0.0);
            let fit = self.preferred_width(child_el).min(remaining);
            if let Some(b) = self.layout_block(child_el, x, flow.cursor, remaining, Some(fit)) {
                x += b.outer_width() + gap;
                row_height = row_height.max(b.outer_height());
                flow.children.push(b);
            }
        }
        flow.cursor += row_height;
    }

    fn flush_text(&self, style: &ComputedStyle, flow: &mut Flow<'_>) {
        let run = std::mem::take(&mut flow.run);
        let font = FontSpec::from_style(style);
        let line_height = style.line_height();
        for text in break_lines(&run, style.value("white-space"), flow.width, &font) {
            let width = font.measure(&text);
            let x = match style.value("text-align") {
                "center" => flow.x + (flow.width - width) / 2.0,
                "right" | "end" => flow.x + flow.width - width,
                _ => flow.x,
            };
            flow.lines.push(TextLine {
                x,
                y: flow.cursor,
                width,
                height: line_height,
                text,
            });
            flow.cursor += line_height;
        }
    }

    /// Appends the rendered text of an inline element to `out`.
    fn inline_text(&self, el: ElementRef<'_>, out: &mut String) {
        if el.value().name() == "br" {
            out.push(FORCED_BREAK);
            return;
        }
        for child in el.children() {
            match child.value() {
                Node::Text(text) => out.push_str(text),
                Node::Element(_) => {
                    if let Some(child_el) = ElementRef::wrap(child) {
                        if self.resolver.computed(child_el).display() != "none" {
                            self.inline_text(child_el, out);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    /// Shrink-to-fit border-box width: the widest unwrapped line or child.
    fn preferred_width(&self, el: ElementRef<'_>) -> f32 {
        let style = self.resolver.computed(el);
        if style.display() == "none" {
            return 0.0;
        }
        let box_model = BoxModel::from_style(&style);
        let h_extra = box_model.border.horizontal() + box_model.padding.horizontal();
        if let Some(w) = resolve_length(style.value("width"), None) {
            return if style.value("box-sizing") == "border-box" { w } else { w + h_extra };
        }

        let font = FontSpec::from_style(&style);
        let measure_run = |run: &str| -> f32 {
            run.split(FORCED_BREAK)
                .map(|seg| font.measure(&collapse_whitespace(seg)))
                .fold(0.0, f32::max)
        };
        let mut widest: f32 = 0.0;
        let mut run = String::new();
        for child in el.children() {
            match child.value() {
                Node::Text(text) => run.push_str(text),
                Node::Element(_) => {
                    let Some(child_el) = ElementRef::wrap(child) else { continue };
                    let display = self.resolver.computed(child_el).display().to_string();
                    if is_block_level(&display) {
                        widest = widest.max(measure_run(&run));
                        run.clear();
                        let child_margin = BoxModel::from_style(&self.resolver.computed(child_el)).margin;
                        widest = widest.max(self.preferred_width(child_el) + child_margin.horizontal());
                    } else if display != "none" {
                        self.inline_text(child_el, &mut run);
                    }
                }
                _ => {}
            }
        }
        widest = widest.max(measure_run(&run));
        widest.ceil() + h_extra
    }
}

fn has_direct_text(el: ElementRef<'_>) -> bool {
    el.children()
        .any(|c| matches!(c.value(), Node::Text(t) if !t.trim().is_empty()))
}

fn clamp_size(
    style: &ComputedStyle,
    size: f32,
    (min_prop, max_prop): (&str, &str),
    reference: Option<f32>,
    border_box: bool,
    extra: f32,
) -> f32 {
    let adjust = |v: f32| if border_box { v - extra } else { v };
    let mut out = size;
    if let Some(max) = resolve_length(style.value(max_prop), reference) {
        out = out.min(adjust(max));
    }
    if let Some(min) = resolve_length(style.value(min_prop), reference) {
        out = out.max(adjust(min));
    }
    out.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::parse_stylesheet;
    use crate::Viewport;
    use scraper::{Html, Selector};

    fn select<'a>(html: &'a Html, sel: &str) -> ElementRef<'a> {
        html.select(&Selector::parse(sel).unwrap()).next().unwrap()
    }

    fn resolver(css: &str) -> StyleResolver {
        let sheet = parse_stylesheet(css);
        StyleResolver::new([sheet.as_slice()], Viewport::default())
    }

    #[test]
    fn explicit_sizes_with_box_sizing() {
        let html = Html::parse_document(
            r#"<div id="a"></div><div id="b"></div>"#,
        );
        let r = resolver(
            "#a { width: 200px; height: 100px; padding: 10px; border: 2px solid #000 }
             #b { width: 200px; height: 100px; padding: 10px; box-sizing: border-box }",
        );
        let engine = LayoutEngine::new(&r);
        let root = html.root_element();
        let a = engine.bounding_rect(root, select(&html, "#a"), 1280.0);
        assert_eq!((a.width, a.height), (224.0, 124.0));
        let b = engine.bounding_rect(root, select(&html, "#b"), 1280.0);
        assert_eq!((b.width, b.height), (200.0, 100.0));
        // body margin of 8px places the first box
        assert_eq!((a.x, a.y), (8.0, 8.0));
    }

    #[test]
    fn auto_width_fills_container_and_wraps_text() {
        let html = Html::parse_document(
            r#"<div id="c">alpha beta gamma delta epsilon zeta eta theta iota kappa</div>"#,
        );
        let r = resolver("body { margin: 0 } #c { width: 120px; font-size: 10px; line-height: 12px }");
        let engine = LayoutEngine::new(&r);
        let tree = engine.layout(html.root_element(), 800.0).unwrap();
        let c = tree.find(select(&html, "#c").id()).unwrap();
        assert!(c.lines.len() > 1);
        assert!(c.lines.iter().all(|l| l.width <= 120.0));
        assert_eq!(c.rect.height, 12.0 * c.lines.len() as f32);
    }

    #[test]
    fn hidden_subtree_measures_zero() {
        let html = Html::parse_document(r#"<div style="display:none"><p id="p">x</p></div>"#);
        let r = resolver("");
        let engine = LayoutEngine::new(&r);
        let rect = engine.bounding_rect(html.root_element(), select(&html, "#p"), 1280.0);
        assert_eq!(rect, Rect::default());
    }

    #[test]
    fn inline_targets_shrink_to_fit() {
        let html = Html::parse_document(r#"<p>before <span id="s">hello</span> after</p>"#);
        let r = resolver("#s { padding: 2px }");
        let engine = LayoutEngine::new(&r);
        let rect = engine.bounding_rect(html.root_element(), select(&html, "#s"), 1280.0);
        assert!(rect.width > 4.0 && rect.width < 100.0);
        assert!(rect.height > 4.0);
    }

    #[test]
    fn min_max_clamps_apply() {
        let html = Html::parse_document(r#"<div id="a">x</div>"#);
        let r = resolver("#a { max-width: 300px; min-height: 50px }");
        let engine = LayoutEngine::new(&r);
        let rect = engine.bounding_rect(html.root_element(), select(&html, "#a"), 1280.0);
        assert_eq!((rect.width, rect.height), (300.0, 50.0));
    }

    #[test]
    fn text_alignment_and_pre() {
        let html = Html::parse_document("<div id=\"a\">hi</div><pre id=\"p\">one\ntwo  spaced\n</pre>");
        let r = resolver("body { margin: 0 } #a { width: 100px; text-align: center }");
        let engine = LayoutEngine::new(&r);
        let tree = engine.layout(html.root_element(), 400.0).unwrap();
        let a = tree.find(select(&html, "#a").id()).unwrap();
        let line = &a.lines[0];
        assert!((line.x - (100.0 - line.width) / 2.0).abs() < 0.01);
        let p = tree.find(select(&html, "#p").id()).unwrap();
        let texts: Vec<&str> = p.lines.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two  spaced"]);
    }

    #[test]
    fn flex_rows_place_children_side_by_side() {
        let html = Html::parse_document(r#"<div id="row"><div id="l">left</div><div id="r">right</div></div>"#);
        let r = resolver("body { margin: 0 } #row { display: flex; gap: 10px }");
        let engine = LayoutEngine::new(&r);
        let tree = engine.layout(html.root_element(), 600.0).unwrap();
        let l = tree.find(select(&html, "#l").id()).unwrap();
        let rt = tree.find(select(&html, "#r").id()).unwrap();
        assert_eq!(l.rect.y, rt.rect.y);
        assert!((rt.rect.x - (l.rect.right() + 10.0)).abs() < 0.01);
    }

    #[test]
    fn wrap_words_keeps_long_words_whole() {
        let font = FontSpec {
            family: "sans-serif".into(),
            size: 10.0,
            bold: false,
            italic: false,
        };
        let lines = wrap_words("a supercalifragilistic b", 20.0, &font);
        assert_eq!(lines, vec!["a", "supercalifragilistic", "b"]);
    }
}
