//! XHTML serialization helpers.
//!
//! Foreign content embedded in an SVG envelope must be well-formed XML, so
//! everything that ends up inside one goes through these functions rather
//! than scraper's HTML serializer.

use scraper::node::Node;
use scraper::ElementRef;

pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track", "wbr",
];

pub fn is_void(tag: &str) -> bool {
    VOID_ELEMENTS.contains(&tag)
}

/// Escapes character data.
pub fn escape_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            c if is_xml_char(c) => out.push(c),
            _ => {}
        }
    }
    out
}

/// Escapes a double-quoted attribute value.
pub fn escape_attr(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\n' => out.push_str("&#10;"),
            c if is_xml_char(c) => out.push(c),
            _ => {}
        }
    }
    out
}

/// Makes arbitrary markup safe to splice into an XML envelope: bare `&`
/// that do not start an entity are escaped and characters XML forbids are
/// dropped.
pub fn sanitize_markup(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut rest = markup;
    while let Some(idx) = rest.find('&') {
        push_xml_chars(&mut out, &rest[..idx]);
        let tail = &rest[idx..];
        if starts_entity(tail) {
            out.push('&');
        } else {
            out.push_str("&amp;");
        }
        rest = &tail[1..];
    }
    push_xml_chars(&mut out, rest);
    out
}

fn push_xml_chars(out: &mut String, s: &str) {
    out.extend(s.chars().filter(|c| is_xml_char(*c)));
}

fn starts_entity(s: &str) -> bool {
    let Some(end) = s.find(';') else {
        return false;
    };
    let body = &s[1..end];
    if let Some(num) = body.strip_prefix('#') {
        return match num.strip_prefix('x').or_else(|| num.strip_prefix('X')) {
            Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
            None => !num.is_empty() && num.chars().all(|c| c.is_ascii_digit()),
        };
    }
    !body.is_empty() && body.len() <= 32 && body.chars().all(|c| c.is_ascii_alphanumeric())
}

fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r') || (c >= ' ' && c != '\u{FFFE}' && c != '\u{FFFF}')
}

/// Attribute name check used to drop framework attributes such as `@click`
/// or `x-on:click`. Only the predeclared `xml:` prefix may carry a colon;
/// any other prefix would be undeclared inside the envelope.
pub fn is_xml_name(name: &str) -> bool {
    match name.strip_prefix("xml:") {
        Some(local) => is_ncname(local),
        None => is_ncname(name),
    }
}

fn is_ncname(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Serializes an element and its subtree as XHTML. Comments are dropped.
pub fn outer_xhtml(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    write_element(&mut out, el);
    out
}

fn write_element(out: &mut String, el: ElementRef<'_>) {
    let name = el.value().name();
    out.push('<');
    out.push_str(name);
    let mut attrs: Vec<(&str, &str)> = el
        .value()
        .attrs()
        .filter(|(key, _)| *key != "xmlns" && is_xml_name(key))
        .collect();
    attrs.sort();
    for (key, value) in attrs {
        out.push_str(&format!(" {}=\"{}\"", key, escape_attr(value)));
    }
    if is_void(name) {
        out.push_str(" />");
        return;
    }
    out.push('>');
    for child in el.children() {
        match child.value() {
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Element(_) => {
                if let Some(child_el) = ElementRef::wrap(child) {
                    write_element(out, child_el);
                }
            }
            _ => {}
        }
    }
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::{Html, Selector};

    #[test]
    fn escapes_text_and_attributes() {
        assert_eq!(escape_text("a < b & c"), "a &lt; b &amp; c");
        assert_eq!(escape_attr("say \"hi\""), "say &quot;hi&quot;");
        assert_eq!(escape_text("bell\u{7}"), "bell");
    }

    #[test]
    fn sanitizes_bare_ampersands_only() {
        assert_eq!(sanitize_markup("Q&A &amp; &#169; &x"), "Q&amp;A &amp; &#169; &amp;x");
    }

    #[test]
    fn prefixed_names_need_a_declared_prefix() {
        assert!(is_xml_name("data-role"));
        assert!(is_xml_name("xml:lang"));
        assert!(!is_xml_name("x-on:click"));
        assert!(!is_xml_name("v:shape"));
        assert!(!is_xml_name("xml:"));
        assert!(!is_xml_name(":click"));
    }

    #[test]
    fn serializes_well_formed_xhtml() {
        let html = Html::parse_fragment(
            r#"<div id="a" @click="go()">x &lt; y<br><img src="i.png"><!-- c --><span>t</span></div>"#,
        );
        let el = html.select(&Selector::parse("#a").unwrap()).next().unwrap();
        assert_eq!(
            outer_xhtml(el),
            r#"<div id="a">x &lt; y<br /><img src="i.png" /><span>t</span></div>"#
        );
    }
}
