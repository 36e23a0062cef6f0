//! Minimal CSS parsing: rules, declarations and shorthand expansion.
//!
//! This is not a conforming CSS tokenizer. It understands enough of the
//! syntax used by component stylesheets (style rules, `!important`, nested
//! at-rule blocks kept verbatim) to drive the cascade and to reproduce each
//! rule's text for embedding.

use std::fmt;

/// A single `name: value` pair
#[derive(Debug, Clone, PartialEq)]
pub struct Declaration {
    pub name: String,
    pub value: String,
    pub important: bool,
}

impl Declaration {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            important: false,
        }
    }

    pub fn important(mut self, important: bool) -> Self {
        self.important = important;
        self
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.important {
            write!(f, "{}: {} !important;", self.name, self.value)
        } else {
            write!(f, "{}: {};", self.name, self.value)
        }
    }
}

/// A `selector { declarations }` rule
#[derive(Debug, Clone, PartialEq)]
pub struct StyleRule {
    pub selector_text: String,
    pub declarations: Vec<Declaration>,
}

/// A parsed rule; at-rules are preserved as raw text.
#[derive(Debug, Clone, PartialEq)]
pub enum CssRule {
    Style(StyleRule),
    At(String),
}

impl CssRule {
    /// Serialized rule text, the equivalent of `cssText`.
    pub fn css_text(&self) -> String {
        match self {
            CssRule::Style(rule) => {
                let body = rule
                    .declarations
                    .iter()
                    .map(|d| d.to_string())
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("{} {{ {} }}", rule.selector_text, body)
            }
            CssRule::At(text) => text.clone(),
        }
    }
}

/// Parses a stylesheet into rules. Malformed trailing input is dropped.
pub fn parse_stylesheet(text: &str) -> Vec<CssRule> {
    let text = strip_comments(text);
    let bytes = text.as_bytes();
    let mut rules = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        while pos < bytes.len() && bytes[pos].is_ascii_whitespace() {
            pos += 1;
        }
        if pos >= bytes.len() {
            break;
        }

        let prelude_start = pos;
        let Some(stop) = find_top_level(&text, pos, &[b'{', b';']) else {
            break;
        };
        let prelude = text[prelude_start..stop].trim();

        if bytes[stop] == b';' {
            // Statement at-rule such as @import or @charset
            if prelude.starts_with('@') {
                rules.push(CssRule::At(format!("{prelude};")));
            }
            pos = stop + 1;
            continue;
        }

        let Some(close) = matching_brace(&text, stop) else {
            break;
        };
        let body = &text[stop + 1..close];
        if prelude.starts_with('@') {
            rules.push(CssRule::At(format!("{} {{{}}}", prelude, body.trim_end())));
        } else if !prelude.is_empty() {
            rules.push(CssRule::Style(StyleRule {
                selector_text: prelude.split_whitespace().collect::<Vec<_>>().join(" "),
                declarations: parse_declarations(body),
            }));
        }
        pos = close + 1;
    }

    rules
}

/// Parses a declaration block body (also the content of a `style` attribute).
pub fn parse_declarations(body: &str) -> Vec<Declaration> {
    let body = strip_comments(body);
    split_top_level(&body, b';')
        .into_iter()
        .filter_map(|chunk| {
            let (name, value) = chunk.split_once(':')?;
            let name = name.trim().to_ascii_lowercase();
            if name.is_empty() {
                return None;
            }
            let mut value = value.trim().to_string();
            let mut important = false;
            if let Some(idx) = value.to_ascii_lowercase().rfind("!important") {
                if value[idx + "!important".len()..].trim().is_empty() {
                    value.truncate(idx);
                    value = value.trim_end().to_string();
                    important = true;
                }
            }
            if value.is_empty() {
                return None;
            }
            Some(Declaration {
                name,
                value,
                important,
            })
        })
        .collect()
}

/// Expands shorthands into longhands. Non-shorthands are returned unchanged.
pub fn expand_shorthand(decl: &Declaration) -> Vec<Declaration> {
    let make = |name: &str, value: &str| Declaration::new(name, value).important(decl.important);
    let value = decl.value.as_str();

    match decl.name.as_str() {
        "margin" | "padding" => {
            let Some([t, r, b, l]) = four_sides(value) else {
                return vec![decl.clone()];
            };
            let p = &decl.name;
            vec![
                make(&format!("{p}-top"), &t),
                make(&format!("{p}-right"), &r),
                make(&format!("{p}-bottom"), &b),
                make(&format!("{p}-left"), &l),
            ]
        }
        "border-width" | "border-style" | "border-color" => {
            let Some(sides) = four_sides(value) else {
                return vec![decl.clone()];
            };
            let suffix = &decl.name["border-".len()..];
            SIDES
                .iter()
                .zip(sides.iter())
                .map(|(side, v)| make(&format!("border-{side}-{suffix}"), v))
                .collect()
        }
        "border" => SIDES
            .iter()
            .flat_map(|side| expand_border_side(side, value, decl.important))
            .collect(),
        "border-top" | "border-right" | "border-bottom" | "border-left" => {
            expand_border_side(&decl.name["border-".len()..], value, decl.important)
        }
        "background" => {
            let mut out = Vec::new();
            let mut color = "transparent".to_string();
            let mut image = "none".to_string();
            for token in split_top_level(value, b' ') {
                let token = token.trim();
                if token.is_empty() {
                    continue;
                }
                if token.starts_with("url(") || token.contains("gradient(") {
                    image = token.to_string();
                } else if super::color::Color::parse(token).is_some() {
                    color = token.to_string();
                }
            }
            if value.trim().eq_ignore_ascii_case("none") {
                image = "none".to_string();
            }
            out.push(make("background-color", &color));
            out.push(make("background-image", &image));
            out
        }
        "word-wrap" => vec![decl.clone(), make("overflow-wrap", value)],
        "overflow" => {
            let mut parts = value.split_whitespace();
            let x = parts.next().unwrap_or("visible");
            let y = parts.next().unwrap_or(x);
            vec![make("overflow-x", x), make("overflow-y", y)]
        }
        _ => vec![decl.clone()],
    }
}

pub const SIDES: [&str; 4] = ["top", "right", "bottom", "left"];

fn expand_border_side(side: &str, value: &str, important: bool) -> Vec<Declaration> {
    let mut width = "medium".to_string();
    let mut style = "none".to_string();
    let mut color = "currentcolor".to_string();
    for token in split_top_level(value, b' ') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        if BORDER_STYLES.contains(&token) {
            style = token.to_string();
        } else if token
            .chars()
            .next()
            .map(|c| c.is_ascii_digit() || c == '.')
            .unwrap_or(false)
            || matches!(token, "thin" | "medium" | "thick")
        {
            width = token.to_string();
        } else {
            color = token.to_string();
        }
    }
    vec![
        Declaration::new(format!("border-{side}-width"), width).important(important),
        Declaration::new(format!("border-{side}-style"), style).important(important),
        Declaration::new(format!("border-{side}-color"), color).important(important),
    ]
}

const BORDER_STYLES: [&str; 10] = [
    "none", "hidden", "dotted", "dashed", "solid", "double", "groove", "ridge", "inset", "outset",
];

/// CSS 1-4 value side expansion (top, right, bottom, left).
fn four_sides(value: &str) -> Option<[String; 4]> {
    let parts: Vec<String> = split_top_level(value, b' ')
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    match parts.as_slice() {
        [a] => Some([a.clone(), a.clone(), a.clone(), a.clone()]),
        [v, h] => Some([v.clone(), h.clone(), v.clone(), h.clone()]),
        [t, h, b] => Some([t.clone(), h.clone(), b.clone(), h.clone()]),
        [t, r, b, l] => Some([t.clone(), r.clone(), b.clone(), l.clone()]),
        _ => None,
    }
}

fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("/*") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find("*/") {
            Some(end) => rest = &rest[start + 2 + end + 2..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Finds the first of `targets` at nesting depth zero, outside quotes.
fn find_top_level(text: &str, from: usize, targets: &[u8]) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = from;
    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) => {
                if c == b'\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                b'"' | b'\'' => quote = Some(c),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth -= 1,
                _ if depth <= 0 && targets.contains(&c) => return Some(i),
                _ => {}
            },
        }
        i += 1;
    }
    None
}

fn matching_brace(text: &str, open: usize) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0i32;
    let mut quote: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let c = bytes[i];
        match quote {
            Some(q) => {
                if c == b'\\' {
                    i += 1;
                } else if c == q {
                    quote = None;
                }
            }
            None => match c {
                b'"' | b'\'' => quote = Some(c),
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            },
        }
        i += 1;
    }
    None
}

/// Splits on `sep` outside parentheses and quotes.
pub(crate) fn split_top_level(text: &str, sep: u8) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut pos = 0;
    while let Some(idx) = find_top_level(text, pos, &[sep]) {
        parts.push(&text[start..idx]);
        start = idx + 1;
        pos = idx + 1;
    }
    parts.push(&text[start..]);
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_rules_and_at_rules() {
        let css = r#"
            /* header */
            @import url("theme.css");
            .card, #main > p { color: red; padding: 4px 8px !important }
            @media (max-width: 600px) { .card { color: blue; } }
            a[href^="http"] { background: url("x;y.png") no-repeat }
        "#;
        let rules = parse_stylesheet(css);
        assert_eq!(rules.len(), 4);
        assert!(matches!(&rules[0], CssRule::At(t) if t.starts_with("@import")));
        match &rules[1] {
            CssRule::Style(r) => {
                assert_eq!(r.selector_text, ".card, #main > p");
                assert_eq!(r.declarations.len(), 2);
                assert!(r.declarations[1].important);
                assert_eq!(r.declarations[1].value, "4px 8px");
            }
            other => panic!("unexpected rule {other:?}"),
        }
        assert!(matches!(&rules[2], CssRule::At(t) if t.contains(".card { color: blue; }")));
        match &rules[3] {
            CssRule::Style(r) => assert_eq!(r.declarations[0].value, "url(\"x;y.png\") no-repeat"),
            other => panic!("unexpected rule {other:?}"),
        }
    }

    #[test]
    fn css_text_round_trips_declarations() {
        let rules = parse_stylesheet("p{color:red;margin:0 !important}");
        assert_eq!(rules[0].css_text(), "p { color: red; margin: 0 !important; }");
    }

    #[test]
    fn expands_box_shorthands() {
        let out = expand_shorthand(&Declaration::new("padding", "1px 2px 3px"));
        let values: Vec<_> = out.iter().map(|d| (d.name.as_str(), d.value.as_str())).collect();
        assert_eq!(
            values,
            vec![
                ("padding-top", "1px"),
                ("padding-right", "2px"),
                ("padding-bottom", "3px"),
                ("padding-left", "2px")
            ]
        );
    }

    #[test]
    fn expands_border_shorthand() {
        let out = expand_shorthand(&Declaration::new("border", "2px solid #333"));
        assert_eq!(out.len(), 12);
        assert!(out.iter().any(|d| d.name == "border-left-color" && d.value == "#333"));
        assert!(out.iter().any(|d| d.name == "border-top-style" && d.value == "solid"));
    }

    #[test]
    fn expands_background_color() {
        let out = expand_shorthand(&Declaration::new("background", "#eee url(a.png) no-repeat"));
        assert_eq!(out[0].value, "#eee");
        assert_eq!(out[1].value, "url(a.png)");
    }
}
