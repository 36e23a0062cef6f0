//! SVG envelopes that carry foreign XHTML content.

use std::fmt;

use crate::markup::{sanitize_markup, XHTML_NS};

pub const SVG_NS: &str = "http://www.w3.org/2000/svg";

const CDATA_OPEN: &str = "<![CDATA[";
const CDATA_CLOSE: &str = "]]>";

/// Resets applied to the wrapper around the payload so the embedding
/// context adds no spacing of its own.
const WRAPPER_STYLE: &str = "margin:0;padding:0;box-sizing:border-box;";

/// A self-contained vector document of fixed size embedding one
/// foreign-content payload and one style block. Immutable once composed.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorDocument {
    text: String,
    width: f32,
    height: f32,
}

impl VectorDocument {
    pub const MIME: &'static str = "image/svg+xml";

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn width(&self) -> f32 {
        self.width
    }

    pub fn height(&self) -> f32 {
        self.height
    }

    /// The document as a percent-encoded `data:` URL.
    pub fn to_data_url(&self) -> String {
        format!("data:{};charset=utf-8,{}", Self::MIME, urlencoding::encode(&self.text))
    }
}

impl fmt::Display for VectorDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

/// Wraps `markup` and `style_text` in an SVG envelope of `width` x `height`.
///
/// The style block is CDATA-escaped and bare ampersands in the markup are
/// escaped, so the result stays well-formed XML whatever the inputs contain.
pub fn compose(markup: &str, style_text: &str, width: f32, height: f32) -> VectorDocument {
    let text = format!(
        concat!(
            r#"<svg xmlns="{svg}" width="{w}" height="{h}">"#,
            r#"<defs><style type="text/css">{open}{style}{close}</style></defs>"#,
            r#"<foreignObject width="100%" height="100%">"#,
            r#"<div xmlns="{xhtml}" style="{wrapper}">{markup}</div>"#,
            r#"</foreignObject></svg>"#,
        ),
        svg = SVG_NS,
        xhtml = XHTML_NS,
        w = width,
        h = height,
        open = CDATA_OPEN,
        close = CDATA_CLOSE,
        style = escape_cdata(style_text),
        wrapper = WRAPPER_STYLE,
        markup = sanitize_markup(markup),
    );
    VectorDocument { text, width, height }
}

/// Splits any `]]>` across two CDATA sections.
fn escape_cdata(text: &str) -> String {
    text.replace(CDATA_CLOSE, "]]]]><![CDATA[>")
}

/// The embedded parts of an envelope, recovered by the image loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignMarkup {
    pub style_text: String,
    /// Inner XHTML of the `foreignObject`, wrapper included
    pub markup: String,
}

impl ForeignMarkup {
    /// Returns `None` when the document has no `foreignObject`.
    pub fn extract(svg: &str) -> Option<Self> {
        let markup = element_content(svg, "foreignObject", true)?.to_string();
        let style_text = element_content(svg, "style", false)
            .map(decode_character_data)
            .unwrap_or_default();
        Some(Self { style_text, markup })
    }
}

/// Content of the first `tag` element. `outermost` pairs it with the last
/// closing tag instead of the next one. Tags inside CDATA sections are not
/// matched.
fn element_content<'s>(text: &'s str, tag: &str, outermost: bool) -> Option<&'s str> {
    let open = find_markup(text, 0, &format!("<{tag}"))?;
    let start = open + text[open..].find('>')? + 1;
    if text[..start].ends_with("/>") {
        return Some("");
    }
    let close = format!("</{tag}>");
    let end = if outermost {
        text.rfind(&close)?
    } else {
        find_markup(text, start, &close)?
    };
    (end >= start).then(|| &text[start..end])
}

/// Byte offset of the first `needle` at or after `from` that lies outside
/// any CDATA section.
fn find_markup(text: &str, from: usize, needle: &str) -> Option<usize> {
    let mut pos = from;
    loop {
        let rest = &text[pos..];
        let hit = rest.find(needle)?;
        match rest.find(CDATA_OPEN) {
            Some(cdata) if cdata < hit => {
                let body = pos + cdata + CDATA_OPEN.len();
                pos = body + text[body..].find(CDATA_CLOSE)? + CDATA_CLOSE.len();
            }
            _ => return Some(pos + hit),
        }
    }
}

/// Concatenates CDATA sections and entity-decoded character data.
fn decode_character_data(content: &str) -> String {
    let mut out = String::new();
    let mut rest = content;
    while let Some(idx) = rest.find(CDATA_OPEN) {
        out.push_str(&decode_entities(&rest[..idx]));
        let body = &rest[idx + CDATA_OPEN.len()..];
        match body.find(CDATA_CLOSE) {
            Some(end) => {
                out.push_str(&body[..end]);
                rest = &body[end + CDATA_CLOSE.len()..];
            }
            None => {
                out.push_str(body);
                rest = "";
            }
        }
    }
    out.push_str(&decode_entities(rest));
    out
}

fn decode_entities(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_layout() {
        let doc = compose("<p>hi</p>", "p { color: red }", 200.0, 100.0);
        let text = doc.as_str();
        assert!(text.starts_with(r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100">"#));
        assert!(text.contains("<![CDATA[p { color: red }]]>"));
        assert!(text.contains(r#"<foreignObject width="100%" height="100%">"#));
        assert!(text.contains(
            r#"<div xmlns="http://www.w3.org/1999/xhtml" style="margin:0;padding:0;box-sizing:border-box;"><p>hi</p></div>"#
        ));
        assert_eq!((doc.width(), doc.height()), (200.0, 100.0));
    }

    #[test]
    fn escapes_special_content() {
        let doc = compose("<p>Q&A</p>", "p::after { content: ']]>' }", 10.0, 10.0);
        assert!(doc.as_str().contains("<p>Q&amp;A</p>"));
        assert!(!doc.as_str().contains("content: ']]>'"));
        let back = ForeignMarkup::extract(doc.as_str()).unwrap();
        assert_eq!(back.style_text, "p::after { content: ']]>' }");
    }

    #[test]
    fn closing_tags_inside_cdata_are_not_boundaries() {
        let style = r#"p::before { content: "</style>" } .x { color: red } q::after { content: "<foreignObject" }"#;
        let doc = compose("<p>hi</p>", style, 10.0, 10.0);
        let back = ForeignMarkup::extract(doc.as_str()).unwrap();
        assert_eq!(back.style_text, style);
        assert!(back.markup.ends_with("<p>hi</p></div>"));
        let opts = resvg::usvg::Options::default();
        assert!(resvg::usvg::Tree::from_str(doc.as_str(), &opts).is_ok());
    }

    #[test]
    fn data_url_is_percent_encoded() {
        let doc = compose("<p>50% &amp; #1</p>", "", 4.0, 4.0);
        let url = doc.to_data_url();
        let payload = url.strip_prefix("data:image/svg+xml;charset=utf-8,").unwrap();
        assert!(!payload.contains('#') && !payload.contains('<'));
        assert_eq!(urlencoding::decode(payload).unwrap(), doc.as_str());
    }

    #[test]
    fn envelope_parses_as_svg() {
        let doc = compose("<p>a &amp; b<br/></p>", "", 20.0, 10.0);
        let opts = resvg::usvg::Options::default();
        let tree = resvg::usvg::Tree::from_str(doc.as_str(), &opts).unwrap();
        assert_eq!(tree.size().width(), 20.0);
    }

    #[test]
    fn extract_recovers_payload() {
        let doc = compose(r#"<span class="x">t</span>"#, ".x{color:blue}", 5.0, 5.0);
        let foreign = ForeignMarkup::extract(doc.as_str()).unwrap();
        assert_eq!(foreign.style_text, ".x{color:blue}");
        assert!(foreign.markup.ends_with(r#"<span class="x">t</span></div>"#));
        assert!(ForeignMarkup::extract(r#"<svg xmlns="http://www.w3.org/2000/svg"/>"#).is_none());
    }
}
