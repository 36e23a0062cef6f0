//! Cascade, inheritance and computed values.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use ego_tree::NodeId;
use scraper::{ElementRef, Selector};

use super::color::Color;
use super::css::{expand_shorthand, parse_declarations, parse_stylesheet, split_top_level, CssRule, Declaration, SIDES};
use crate::Viewport;

/// A property the engine computes, with its initial value.
#[derive(Debug, Clone, Copy)]
pub struct PropertyDef {
    pub name: &'static str,
    pub initial: &'static str,
    pub inherited: bool,
}

const fn prop(name: &'static str, initial: &'static str, inherited: bool) -> PropertyDef {
    PropertyDef {
        name,
        initial,
        inherited,
    }
}

/// Longhands known to the engine. `color` comes first so that
/// `currentcolor` can be resolved against it.
pub const PROPERTIES: &[PropertyDef] = &[
    prop("color", "rgb(0, 0, 0)", true),
    prop("font-family", "sans-serif", true),
    prop("font-size", "16px", true),
    prop("font-weight", "400", true),
    prop("font-style", "normal", true),
    prop("line-height", "normal", true),
    prop("text-align", "start", true),
    prop("white-space", "normal", true),
    prop("word-wrap", "normal", true),
    prop("overflow-wrap", "normal", true),
    prop("visibility", "visible", true),
    prop("text-decoration", "none", false),
    prop("background-color", "rgba(0, 0, 0, 0)", false),
    prop("background-image", "none", false),
    prop("padding-top", "0px", false),
    prop("padding-right", "0px", false),
    prop("padding-bottom", "0px", false),
    prop("padding-left", "0px", false),
    prop("margin-top", "0px", false),
    prop("margin-right", "0px", false),
    prop("margin-bottom", "0px", false),
    prop("margin-left", "0px", false),
    prop("border-top-width", "medium", false),
    prop("border-right-width", "medium", false),
    prop("border-bottom-width", "medium", false),
    prop("border-left-width", "medium", false),
    prop("border-top-style", "none", false),
    prop("border-right-style", "none", false),
    prop("border-bottom-style", "none", false),
    prop("border-left-style", "none", false),
    prop("border-top-color", "currentcolor", false),
    prop("border-right-color", "currentcolor", false),
    prop("border-bottom-color", "currentcolor", false),
    prop("border-left-color", "currentcolor", false),
    prop("border-radius", "0px", false),
    prop("box-shadow", "none", false),
    prop("box-sizing", "content-box", false),
    prop("display", "inline", false),
    prop("flex-direction", "row", false),
    prop("align-items", "normal", false),
    prop("justify-content", "normal", false),
    prop("flex-wrap", "nowrap", false),
    prop("gap", "normal", false),
    prop("width", "auto", false),
    prop("height", "auto", false),
    prop("min-width", "auto", false),
    prop("min-height", "auto", false),
    prop("max-width", "none", false),
    prop("max-height", "none", false),
    prop("position", "static", false),
    prop("top", "auto", false),
    prop("left", "auto", false),
    prop("right", "auto", false),
    prop("bottom", "auto", false),
    prop("transform", "none", false),
    prop("opacity", "1", false),
    prop("overflow-x", "visible", false),
    prop("overflow-y", "visible", false),
    prop("z-index", "auto", false),
    prop("vertical-align", "baseline", false),
];

const LENGTH_PROPERTIES: &[&str] = &[
    "padding-top",
    "padding-right",
    "padding-bottom",
    "padding-left",
    "margin-top",
    "margin-right",
    "margin-bottom",
    "margin-left",
    "border-radius",
    "width",
    "height",
    "min-width",
    "min-height",
    "max-width",
    "max-height",
    "top",
    "left",
    "right",
    "bottom",
    "gap",
];

/// Defaults every document gets before author styles apply.
pub const USER_AGENT_CSS: &str = r#"
html, body, div, p, h1, h2, h3, h4, h5, h6, ul, ol, li, dl, dt, dd, section, article,
header, footer, nav, main, aside, form, figure, figcaption, blockquote, pre, table, hr,
address, fieldset, details, summary { display: block; }
head, style, script, title, link, meta, template, noscript, base { display: none; }
button, input, select, textarea, img, canvas, svg, video { display: inline-block; }
body { margin: 8px; }
p, blockquote, ul, ol, dl, figure { margin-top: 1em; margin-bottom: 1em; }
ul, ol { padding-left: 40px; }
h1 { font-size: 2em; margin-top: 0.67em; margin-bottom: 0.67em; font-weight: bold; }
h2 { font-size: 1.5em; margin-top: 0.83em; margin-bottom: 0.83em; font-weight: bold; }
h3 { font-size: 1.17em; margin-top: 1em; margin-bottom: 1em; font-weight: bold; }
h4 { margin-top: 1.33em; margin-bottom: 1.33em; font-weight: bold; }
h5 { font-size: 0.83em; margin-top: 1.67em; margin-bottom: 1.67em; font-weight: bold; }
h6 { font-size: 0.67em; margin-top: 2.33em; margin-bottom: 2.33em; font-weight: bold; }
b, strong, th { font-weight: bold; }
i, em { font-style: italic; }
pre, code { font-family: monospace; }
pre { white-space: pre; }
[hidden] { display: none; }
"#;

const ROOT_FONT_SIZE: f32 = 16.0;

// ============================================================================
// Computed style
// ============================================================================

/// Fully resolved longhand values for one element.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedStyle {
    values: BTreeMap<&'static str, String>,
}

impl Default for ComputedStyle {
    fn default() -> Self {
        let mut values = BTreeMap::new();
        for def in PROPERTIES {
            values.insert(def.name, def.initial.to_string());
        }
        values.insert("font-size", "16px".to_string());
        values.insert("color", "rgb(0, 0, 0)".to_string());
        for side in SIDES {
            values.insert(border_key(side, "width"), "0px".to_string());
            values.insert(border_key(side, "color"), "rgb(0, 0, 0)".to_string());
        }
        Self { values }
    }
}

impl ComputedStyle {
    /// The value a `getPropertyValue` call would report, shorthands included.
    /// Unknown properties yield an empty string.
    pub fn get(&self, name: &str) -> String {
        if let Some(v) = self.values.get(name) {
            return v.clone();
        }
        match name {
            "margin" | "padding" => {
                let sides: Vec<String> = SIDES
                    .iter()
                    .map(|s| self.value(&format!("{name}-{s}")).to_string())
                    .collect();
                collapse_sides(&sides)
            }
            "border-width" | "border-style" | "border-color" => {
                let suffix = &name["border-".len()..];
                let sides: Vec<String> = SIDES
                    .iter()
                    .map(|s| self.value(&format!("border-{s}-{suffix}")).to_string())
                    .collect();
                collapse_sides(&sides)
            }
            "border-top" | "border-right" | "border-bottom" | "border-left" => {
                let side = &name["border-".len()..];
                self.border_side(side)
            }
            "border" => {
                let sides: Vec<String> = SIDES.iter().map(|s| self.border_side(s)).collect();
                if sides.iter().all(|s| *s == sides[0]) {
                    sides[0].clone()
                } else {
                    String::new()
                }
            }
            "background" => {
                let color = self.value("background-color");
                match self.value("background-image") {
                    "none" => color.to_string(),
                    image => format!("{color} {image}"),
                }
            }
            "overflow" => {
                let (x, y) = (self.value("overflow-x"), self.value("overflow-y"));
                if x == y {
                    x.to_string()
                } else {
                    format!("{x} {y}")
                }
            }
            _ => String::new(),
        }
    }

    /// A longhand value; empty for unknown names.
    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or("")
    }

    /// Pixel value of a longhand, 0 for keywords and percentages.
    pub fn px(&self, name: &str) -> f32 {
        parse_px(self.value(name)).unwrap_or(0.0)
    }

    pub fn color(&self, name: &str) -> Color {
        Color::parse(self.value(name)).unwrap_or(Color::BLACK)
    }

    pub fn font_size(&self) -> f32 {
        parse_px(self.value("font-size")).unwrap_or(ROOT_FONT_SIZE)
    }

    /// Used line height in px; `normal` is 1.2 times the font size.
    pub fn line_height(&self) -> f32 {
        let fs = self.font_size();
        let raw = self.value("line-height");
        if raw == "normal" {
            return fs * 1.2;
        }
        if let Some(px) = parse_px(raw) {
            return px;
        }
        raw.parse::<f32>().map(|n| n * fs).unwrap_or(fs * 1.2)
    }

    pub fn display(&self) -> &str {
        self.value("display")
    }

    pub fn is_bold(&self) -> bool {
        self.value("font-weight").parse::<u32>().map(|w| w >= 600).unwrap_or(false)
    }

    pub fn is_italic(&self) -> bool {
        matches!(self.value("font-style"), "italic" | "oblique")
    }

    pub fn opacity(&self) -> f32 {
        self.value("opacity").parse::<f32>().map(|o| o.clamp(0.0, 1.0)).unwrap_or(1.0)
    }

    pub fn is_visible(&self) -> bool {
        !matches!(self.value("visibility"), "hidden" | "collapse")
    }

    pub fn clips_overflow(&self) -> bool {
        self.value("overflow-x") != "visible" || self.value("overflow-y") != "visible"
    }

    fn border_side(&self, side: &str) -> String {
        format!(
            "{} {} {}",
            self.value(&format!("border-{side}-width")),
            self.value(&format!("border-{side}-style")),
            self.value(&format!("border-{side}-color")),
        )
    }
}

fn collapse_sides(sides: &[String]) -> String {
    let [t, r, b, l] = [&sides[0], &sides[1], &sides[2], &sides[3]];
    if t == r && r == b && b == l {
        t.clone()
    } else if t == b && r == l {
        format!("{t} {r}")
    } else if r == l {
        format!("{t} {r} {b}")
    } else {
        format!("{t} {r} {b} {l}")
    }
}

fn border_key(side: &str, suffix: &str) -> &'static str {
    match (side, suffix) {
        ("top", "width") => "border-top-width",
        ("right", "width") => "border-right-width",
        ("bottom", "width") => "border-bottom-width",
        ("left", "width") => "border-left-width",
        ("top", "style") => "border-top-style",
        ("right", "style") => "border-right-style",
        ("bottom", "style") => "border-bottom-style",
        ("left", "style") => "border-left-style",
        ("top", _) => "border-top-color",
        ("right", _) => "border-right-color",
        ("bottom", _) => "border-bottom-color",
        _ => "border-left-color",
    }
}

// ============================================================================
// Values
// ============================================================================

/// Parses `12px` / `12` / `0` to a pixel number.
pub fn parse_px(value: &str) -> Option<f32> {
    let v = value.trim();
    if let Some(n) = v.strip_suffix("px") {
        return n.trim().parse().ok();
    }
    if v == "0" {
        return Some(0.0);
    }
    None
}

/// Formats a pixel value the way computed styles do (`12px`, `12.5px`).
pub fn format_px(px: f32) -> String {
    let rounded = (px * 1000.0).round() / 1000.0;
    if rounded == rounded.trunc() {
        format!("{}px", rounded as i64)
    } else {
        format!("{rounded}px")
    }
}

/// Converts an absolute or font-relative length to px. Percentages and
/// keywords return `None`.
pub fn length_to_px(value: &str, font_size: f32, viewport: Viewport) -> Option<f32> {
    let v = value.trim().to_ascii_lowercase();
    if v == "0" {
        return Some(0.0);
    }
    let split = v
        .find(|c: char| !(c.is_ascii_digit() || c == '.' || c == '-' || c == '+'))
        .unwrap_or(v.len());
    let (num, unit) = v.split_at(split);
    let n: f32 = num.parse().ok()?;
    let px = match unit {
        "px" => n,
        "em" => n * font_size,
        "rem" => n * ROOT_FONT_SIZE,
        "pt" => n * 4.0 / 3.0,
        "pc" => n * 16.0,
        "in" => n * 96.0,
        "cm" => n * 96.0 / 2.54,
        "mm" => n * 96.0 / 25.4,
        "vw" => n * viewport.width as f32 / 100.0,
        "vh" => n * viewport.height as f32 / 100.0,
        _ => return None,
    };
    Some(px)
}

fn resolve_font_size(value: &str, parent: f32, viewport: Viewport) -> Option<f32> {
    let v = value.trim().to_ascii_lowercase();
    let keyword = match v.as_str() {
        "xx-small" => Some(9.0),
        "x-small" => Some(10.0),
        "small" => Some(13.0),
        "medium" => Some(16.0),
        "large" => Some(18.0),
        "x-large" => Some(24.0),
        "xx-large" => Some(32.0),
        "smaller" => Some(parent / 1.2),
        "larger" => Some(parent * 1.2),
        _ => None,
    };
    if keyword.is_some() {
        return keyword;
    }
    if let Some(pct) = v.strip_suffix('%') {
        return pct.trim().parse::<f32>().ok().map(|p| parent * p / 100.0);
    }
    // `em` on font-size is relative to the parent's size
    length_to_px(&v, parent, viewport)
}

fn resolve_font_weight(value: &str, parent: u32) -> String {
    match value.trim() {
        "normal" => "400".to_string(),
        "bold" => "700".to_string(),
        "bolder" => (if parent < 600 { "700" } else { "900" }).to_string(),
        "lighter" => (if parent > 500 { "400" } else { "100" }).to_string(),
        other => other.to_string(),
    }
}

fn border_width_keyword(value: &str) -> Option<f32> {
    match value {
        "thin" => Some(1.0),
        "medium" => Some(3.0),
        "thick" => Some(5.0),
        _ => None,
    }
}

// ============================================================================
// Specificity
// ============================================================================

/// (id, class/attribute/pseudo-class, type/pseudo-element) counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Specificity(pub u32, pub u32, pub u32);

impl Specificity {
    pub fn of(selector: &str) -> Specificity {
        let chars: Vec<char> = selector.chars().collect();
        let mut spec = Specificity::default();
        let mut i = 0;
        let is_ident = |c: char| c.is_alphanumeric() || c == '-' || c == '_' || c == '\\';
        let skip_ident = |mut j: usize| {
            while j < chars.len() && is_ident(chars[j]) {
                j += 1;
            }
            j
        };
        while i < chars.len() {
            match chars[i] {
                '#' => {
                    spec.0 += 1;
                    i = skip_ident(i + 1);
                }
                '.' => {
                    spec.1 += 1;
                    i = skip_ident(i + 1);
                }
                '[' => {
                    spec.1 += 1;
                    while i < chars.len() && chars[i] != ']' {
                        i += 1;
                    }
                    i += 1;
                }
                ':' => {
                    if chars.get(i + 1) == Some(&':') {
                        spec.2 += 1;
                        i = skip_ident(i + 2);
                    } else {
                        let end = skip_ident(i + 1);
                        let name: String = chars[i + 1..end].iter().collect();
                        if name != "where" {
                            spec.1 += 1;
                        }
                        i = end;
                        if chars.get(i) == Some(&'(') {
                            let mut depth = 0;
                            while i < chars.len() {
                                match chars[i] {
                                    '(' => depth += 1,
                                    ')' => {
                                        depth -= 1;
                                        if depth == 0 {
                                            break;
                                        }
                                    }
                                    _ => {}
                                }
                                i += 1;
                            }
                            i += 1;
                        }
                    }
                }
                c if c.is_alphabetic() => {
                    spec.2 += 1;
                    i = skip_ident(i);
                }
                _ => i += 1,
            }
        }
        spec
    }
}

// ============================================================================
// Resolver
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Origin {
    UserAgent,
    Author,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Priority {
    important: bool,
    origin: Origin,
    inline: bool,
    specificity: Specificity,
    order: usize,
}

struct CompiledRule {
    selectors: Vec<(Selector, Specificity)>,
    declarations: Vec<Declaration>,
    origin: Origin,
    order: usize,
}

impl CompiledRule {
    fn matching_specificity(&self, el: &ElementRef<'_>) -> Option<Specificity> {
        self.selectors
            .iter()
            .filter(|(sel, _)| sel.matches(el))
            .map(|(_, spec)| *spec)
            .max()
    }
}

/// Resolves computed styles for the elements of one document.
///
/// Built fresh for every capture; the memo table only lives as long as the
/// resolver.
pub struct StyleResolver {
    rules: Vec<CompiledRule>,
    viewport: Viewport,
    cache: RefCell<HashMap<NodeId, Rc<ComputedStyle>>>,
}

impl StyleResolver {
    /// `author_sheets` are applied in order after the user-agent defaults.
    pub fn new<'s>(author_sheets: impl IntoIterator<Item = &'s [CssRule]>, viewport: Viewport) -> Self {
        let ua = parse_stylesheet(USER_AGENT_CSS);
        let mut rules = Vec::new();
        let mut order = 0;
        let mut push = |sheet: &[CssRule], origin: Origin, rules: &mut Vec<CompiledRule>| {
            for rule in sheet {
                let CssRule::Style(style) = rule else { continue };
                let selectors: Vec<(Selector, Specificity)> = split_top_level(&style.selector_text, b',')
                    .into_iter()
                    .filter_map(|part| {
                        let part = part.trim();
                        Selector::parse(part).ok().map(|sel| (sel, Specificity::of(part)))
                    })
                    .collect();
                if selectors.is_empty() {
                    log::debug!("skipping unsupported selector `{}`", style.selector_text);
                    continue;
                }
                let declarations = style.declarations.iter().flat_map(expand_shorthand).collect();
                rules.push(CompiledRule {
                    selectors,
                    declarations,
                    origin,
                    order,
                });
                order += 1;
            }
        };
        push(&ua, Origin::UserAgent, &mut rules);
        for sheet in author_sheets {
            push(sheet, Origin::Author, &mut rules);
        }
        Self {
            rules,
            viewport,
            cache: RefCell::new(HashMap::new()),
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Computed style of `el`, resolving (and memoizing) its ancestors first.
    pub fn computed(&self, el: ElementRef<'_>) -> Rc<ComputedStyle> {
        if let Some(style) = self.cache.borrow().get(&el.id()) {
            return style.clone();
        }
        let parent = el.parent().and_then(ElementRef::wrap).map(|p| self.computed(p));
        let style = Rc::new(self.compute(el, parent.as_deref()));
        self.cache.borrow_mut().insert(el.id(), style.clone());
        style
    }

    /// True when `el` or any ancestor computes to `display: none`.
    pub fn is_hidden(&self, el: ElementRef<'_>) -> bool {
        let mut current = Some(el);
        while let Some(node) = current {
            if self.computed(node).display() == "none" {
                return true;
            }
            current = node.parent().and_then(ElementRef::wrap);
        }
        false
    }

    fn cascaded(&self, el: ElementRef<'_>) -> HashMap<String, String> {
        let mut matched: Vec<(Priority, &Declaration)> = Vec::new();
        for rule in &self.rules {
            if let Some(specificity) = rule.matching_specificity(&el) {
                for decl in &rule.declarations {
                    let priority = Priority {
                        important: decl.important,
                        origin: rule.origin,
                        inline: false,
                        specificity,
                        order: rule.order,
                    };
                    matched.push((priority, decl));
                }
            }
        }

        let inline: Vec<Declaration> = el
            .value()
            .attr("style")
            .map(parse_declarations)
            .unwrap_or_default()
            .iter()
            .flat_map(expand_shorthand)
            .collect();
        for decl in &inline {
            let priority = Priority {
                important: decl.important,
                origin: Origin::Author,
                inline: true,
                specificity: Specificity::default(),
                order: usize::MAX,
            };
            matched.push((priority, decl));
        }

        matched.sort_by_key(|(priority, _)| *priority);
        let mut out = HashMap::new();
        for (_, decl) in matched {
            out.insert(decl.name.clone(), decl.value.clone());
        }
        out
    }

    fn compute(&self, el: ElementRef<'_>, parent: Option<&ComputedStyle>) -> ComputedStyle {
        let specified = self.cascaded(el);
        let parent_font_size = parent.map(ComputedStyle::font_size).unwrap_or(ROOT_FONT_SIZE);

        let font_size = match specified.get("font-size").map(String::as_str) {
            None | Some("inherit") | Some("unset") => parent_font_size,
            Some("initial") => ROOT_FONT_SIZE,
            Some(v) => resolve_font_size(v, parent_font_size, self.viewport).unwrap_or(parent_font_size),
        };

        let mut values = BTreeMap::new();
        values.insert("font-size", format_px(font_size));

        for def in PROPERTIES.iter().filter(|d| d.name != "font-size") {
            let inherited_value = parent.filter(|_| def.inherited).map(|p| p.value(def.name).to_string());
            let raw = match specified.get(def.name).map(String::as_str) {
                Some("inherit") => match parent {
                    Some(p) => {
                        values.insert(def.name, p.value(def.name).to_string());
                        continue;
                    }
                    None => def.initial.to_string(),
                },
                Some("initial") => def.initial.to_string(),
                Some("unset") | None => match inherited_value {
                    Some(v) => {
                        values.insert(def.name, v);
                        continue;
                    }
                    None => def.initial.to_string(),
                },
                Some(v) => v.to_string(),
            };
            let computed = self.compute_value(def, &raw, font_size, parent, &values);
            values.insert(def.name, computed);
        }

        for side in SIDES {
            let style = values.get(border_key(side, "style")).cloned().unwrap_or_default();
            if style == "none" || style == "hidden" {
                values.insert(border_key(side, "width"), "0px".to_string());
            }
        }

        ComputedStyle { values }
    }

    fn compute_value(
        &self,
        def: &PropertyDef,
        raw: &str,
        font_size: f32,
        parent: Option<&ComputedStyle>,
        so_far: &BTreeMap<&'static str, String>,
    ) -> String {
        let name = def.name;
        let lowered = raw.trim().to_ascii_lowercase();

        if name == "color" {
            if lowered == "currentcolor" {
                return parent.map(|p| p.value("color").to_string()).unwrap_or_else(|| def.initial.to_string());
            }
            return Color::parse(raw)
                .map(|c| c.to_string())
                .or_else(|| parent.map(|p| p.value("color").to_string()))
                .unwrap_or_else(|| def.initial.to_string());
        }
        if name.ends_with("-color") {
            if lowered == "currentcolor" {
                return so_far.get("color").cloned().unwrap_or_else(|| "rgb(0, 0, 0)".to_string());
            }
            return Color::parse(raw).map(|c| c.to_string()).unwrap_or_else(|| {
                if name == "background-color" {
                    Color::TRANSPARENT.to_string()
                } else {
                    so_far.get("color").cloned().unwrap_or_default()
                }
            });
        }
        if name.ends_with("-width") && name.starts_with("border-") {
            let px = border_width_keyword(&lowered).or_else(|| length_to_px(&lowered, font_size, self.viewport));
            return px.map(format_px).unwrap_or_else(|| "3px".to_string());
        }
        if name == "font-weight" {
            let parent_weight = parent
                .and_then(|p| p.value("font-weight").parse::<u32>().ok())
                .unwrap_or(400);
            return resolve_font_weight(&lowered, parent_weight);
        }
        if name == "line-height" {
            if lowered == "normal" || lowered.parse::<f32>().is_ok() {
                return lowered;
            }
            if let Some(pct) = lowered.strip_suffix('%') {
                if let Ok(p) = pct.parse::<f32>() {
                    return format_px(font_size * p / 100.0);
                }
            }
            return length_to_px(&lowered, font_size, self.viewport)
                .map(format_px)
                .unwrap_or_else(|| "normal".to_string());
        }
        if LENGTH_PROPERTIES.contains(&name) {
            if lowered.ends_with('%') || lowered.chars().all(|c| c.is_ascii_alphabetic() || c == '-') {
                return lowered;
            }
            // Multi-value lengths (e.g. `gap: 4px 8px`, `border-radius: 4px 8px`)
            let parts: Vec<String> = lowered
                .split_whitespace()
                .map(|p| length_to_px(p, font_size, self.viewport).map(format_px).unwrap_or_else(|| p.to_string()))
                .collect();
            return parts.join(" ");
        }
        if name == "opacity" {
            return lowered
                .parse::<f32>()
                .map(|o| {
                    let o = o.clamp(0.0, 1.0);
                    format!("{}", (o * 1000.0).round() / 1000.0)
                })
                .unwrap_or_else(|_| def.initial.to_string());
        }
        raw.trim().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn resolver_for(css: &str) -> StyleResolver {
        let sheet = parse_stylesheet(css);
        StyleResolver::new([sheet.as_slice()], Viewport::default())
    }

    fn select<'a>(html: &'a Html, sel: &str) -> ElementRef<'a> {
        html.select(&Selector::parse(sel).unwrap()).next().unwrap()
    }

    #[test]
    fn specificity_counts() {
        assert_eq!(Specificity::of("#a .b p"), Specificity(1, 1, 1));
        assert_eq!(Specificity::of("a[href]:hover::before"), Specificity(0, 2, 2));
        assert_eq!(Specificity::of("*"), Specificity(0, 0, 0));
        assert_eq!(Specificity::of("ul > li:not(.x)"), Specificity(0, 1, 2));
    }

    #[test]
    fn cascade_orders_by_specificity_and_importance() {
        let html = Html::parse_document(r#"<div id="x" class="c" style="color: blue">t</div>"#);
        let resolver = resolver_for("#x { color: red; padding: 4px } .c { padding: 9px; margin: 1em !important } div { margin: 2px }");
        let style = resolver.computed(select(&html, "#x"));
        assert_eq!(style.value("color"), "rgb(0, 0, 255)");
        assert_eq!(style.value("padding-left"), "4px");
        assert_eq!(style.value("margin-top"), "16px");
        assert_eq!(style.get("padding"), "4px");
    }

    #[test]
    fn inherits_typography_but_not_boxes() {
        let html = Html::parse_document(r#"<section class="s"><span>hi</span></section>"#);
        let resolver = resolver_for(".s { color: #336699; font-size: 20px; padding: 3px; background: #eee }");
        let span = resolver.computed(select(&html, "span"));
        assert_eq!(span.value("color"), "rgb(51, 102, 153)");
        assert_eq!(span.value("font-size"), "20px");
        assert_eq!(span.value("padding-top"), "0px");
        assert_eq!(span.value("background-color"), "rgba(0, 0, 0, 0)");
    }

    #[test]
    fn resolves_relative_units_and_keywords() {
        let html = Html::parse_document(r#"<h1><em>x</em></h1>"#);
        let resolver = resolver_for("em { font-size: 50%; line-height: 1.5; margin-left: 2em }");
        let h1 = resolver.computed(select(&html, "h1"));
        assert_eq!(h1.value("font-size"), "32px");
        assert_eq!(h1.value("font-weight"), "700");
        let em = resolver.computed(select(&html, "em"));
        assert_eq!(em.value("font-size"), "16px");
        assert_eq!(em.value("margin-left"), "32px");
        assert_eq!(em.line_height(), 24.0);
        assert!(em.is_italic());
    }

    #[test]
    fn border_width_is_zero_without_style() {
        let html = Html::parse_document(r#"<div class="a">x</div><div class="b">y</div>"#);
        let resolver = resolver_for(".a { border-width: 4px } .b { border: 2px solid red; color: green }");
        let a = resolver.computed(select(&html, ".a"));
        assert_eq!(a.value("border-top-width"), "0px");
        let b = resolver.computed(select(&html, ".b"));
        assert_eq!(b.get("border"), "2px solid rgb(255, 0, 0)");
        assert_eq!(b.get("border-width"), "2px");
    }

    #[test]
    fn currentcolor_follows_color() {
        let html = Html::parse_document(r#"<p class="p">x</p>"#);
        let resolver = resolver_for(".p { color: red; border-style: solid }");
        let p = resolver.computed(select(&html, "p"));
        assert_eq!(p.value("border-left-color"), "rgb(255, 0, 0)");
        assert_eq!(p.value("border-left-width"), "3px");
    }

    #[test]
    fn hidden_ancestors_hide_descendants() {
        let html = Html::parse_document(r#"<div style="display:none"><p id="p">x</p></div><p id="q">y</p>"#);
        let resolver = resolver_for("");
        assert!(resolver.is_hidden(select(&html, "#p")));
        assert!(!resolver.is_hidden(select(&html, "#q")));
    }

    #[test]
    fn px_helpers() {
        assert_eq!(format_px(12.0), "12px");
        assert_eq!(format_px(21.44), "21.44px");
        assert_eq!(parse_px("0"), Some(0.0));
        assert_eq!(length_to_px("12pt", 16.0, Viewport::default()), Some(16.0));
        assert_eq!(length_to_px("auto", 16.0, Viewport::default()), None);
    }
}
