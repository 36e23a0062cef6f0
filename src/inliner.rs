//! Rewriting cascaded styles as explicit per-node overrides.

use std::collections::HashMap;

use ego_tree::NodeId;
use scraper::node::Node;
use scraper::ElementRef;

use crate::markup::{escape_attr, escape_text, is_void, is_xml_name};
use crate::rendering::LayoutBox;
use crate::style::cascade::format_px;
use crate::style::{parse_declarations, Declaration, StyleResolver};

/// Visual properties copied onto every node of a fragment.
pub const INLINED_PROPERTIES: &[&str] = &[
    "color",
    "background-color",
    "background",
    "font-family",
    "font-size",
    "font-weight",
    "font-style",
    "line-height",
    "text-align",
    "text-decoration",
    "padding",
    "padding-top",
    "padding-right",
    "padding-bottom",
    "padding-left",
    "margin",
    "margin-top",
    "margin-right",
    "margin-bottom",
    "margin-left",
    "border",
    "border-top",
    "border-right",
    "border-bottom",
    "border-left",
    "border-width",
    "border-style",
    "border-color",
    "border-radius",
    "box-shadow",
    "display",
    "flex-direction",
    "align-items",
    "justify-content",
    "flex-wrap",
    "gap",
    "width",
    "height",
    "min-width",
    "min-height",
    "max-width",
    "max-height",
    "position",
    "top",
    "left",
    "right",
    "bottom",
    "transform",
    "opacity",
    "overflow",
    "overflow-x",
    "overflow-y",
    "z-index",
    "vertical-align",
    "white-space",
    "word-wrap",
];

/// Values that are not worth carrying.
const NO_OP_VALUES: &[&str] = &["none", "normal", "auto", "0px"];

#[derive(Debug, Clone, PartialEq)]
pub enum FragmentChild {
    Element(FragmentNode),
    Text(String),
}

/// A copied element with its resolved-value overrides.
#[derive(Debug, Clone, PartialEq)]
pub struct FragmentNode {
    pub tag: String,
    /// Attributes other than `style`
    pub attrs: Vec<(String, String)>,
    /// The element's own `style` attribute
    pub inline_style: Vec<Declaration>,
    /// Resolved allowlisted values, all `!important`
    pub overrides: Vec<Declaration>,
    pub children: Vec<FragmentChild>,
}

impl FragmentNode {
    pub fn override_value(&self, name: &str) -> Option<&str> {
        self.overrides.iter().find(|d| d.name == name).map(|d| d.value.as_str())
    }

    /// The `style` attribute: the original declarations with every
    /// overridden property replaced.
    pub fn style_attribute(&self) -> String {
        self.inline_style
            .iter()
            .filter(|d| self.override_value(&d.name).is_none())
            .chain(self.overrides.iter())
            .map(|d| d.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn write_xhtml(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        for (key, value) in &self.attrs {
            out.push_str(&format!(" {}=\"{}\"", key, escape_attr(value)));
        }
        let style = self.style_attribute();
        if !style.is_empty() {
            out.push_str(&format!(" style=\"{}\"", escape_attr(&style)));
        }
        if is_void(&self.tag) {
            out.push_str(" />");
            return;
        }
        out.push('>');
        for child in &self.children {
            match child {
                FragmentChild::Element(node) => node.write_xhtml(out),
                FragmentChild::Text(text) => out.push_str(&escape_text(text)),
            }
        }
        out.push_str(&format!("</{}>", self.tag));
    }
}

/// A deep copy of a subtree whose appearance no longer depends on the
/// stylesheets of the document it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct InlinedFragment {
    root: FragmentNode,
}

impl InlinedFragment {
    pub fn root(&self) -> &FragmentNode {
        &self.root
    }

    pub fn to_xhtml(&self) -> String {
        let mut out = String::new();
        self.root.write_xhtml(&mut out);
        out
    }
}

pub struct StyleInliner<'r> {
    resolver: &'r StyleResolver,
    used_sizes: HashMap<NodeId, (f32, f32)>,
}

impl<'r> StyleInliner<'r> {
    pub fn new(resolver: &'r StyleResolver) -> Self {
        Self {
            resolver,
            used_sizes: HashMap::new(),
        }
    }

    /// Reports used widths and heights from `layout` instead of the
    /// specified ones, the way computed style does for rendered boxes.
    pub fn with_layout(mut self, layout: &LayoutBox<'_>) -> Self {
        self.record_sizes(layout);
        self
    }

    fn record_sizes(&mut self, b: &LayoutBox<'_>) {
        let size = if b.style.value("box-sizing") == "border-box" {
            (b.rect.width, b.rect.height)
        } else {
            let content = b.content_rect();
            (content.width, content.height)
        };
        self.used_sizes.insert(b.element.id(), size);
        for child in &b.children {
            self.record_sizes(child);
        }
    }

    pub fn inline(&self, node: ElementRef<'_>) -> InlinedFragment {
        InlinedFragment {
            root: self.copy(node),
        }
    }

    fn copy(&self, el: ElementRef<'_>) -> FragmentNode {
        let mut attrs: Vec<(String, String)> = el
            .value()
            .attrs()
            .filter(|(k, _)| *k != "style" && *k != "xmlns" && is_xml_name(k))
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        attrs.sort();
        let inline_style = el.value().attr("style").map(parse_declarations).unwrap_or_default();

        let children = el
            .children()
            .filter_map(|child| match child.value() {
                Node::Text(text) => Some(FragmentChild::Text(text.to_string())),
                Node::Element(_) => ElementRef::wrap(child).map(|c| FragmentChild::Element(self.copy(c))),
                _ => None,
            })
            .collect();

        FragmentNode {
            tag: el.value().name().to_string(),
            attrs,
            inline_style,
            overrides: self.overrides(el),
            children,
        }
    }

    fn overrides(&self, el: ElementRef<'_>) -> Vec<Declaration> {
        let style = self.resolver.computed(el);
        let used = self.used_sizes.get(&el.id());
        INLINED_PROPERTIES
            .iter()
            .filter_map(|name| {
                let value = match (*name, used) {
                    ("width", Some((w, _))) => format_px(*w),
                    ("height", Some((_, h))) => format_px(*h),
                    _ => style.get(name),
                };
                if value.is_empty() || NO_OP_VALUES.contains(&value.as_str()) {
                    return None;
                }
                Some(Declaration::new(*name, value).important(true))
            })
            .collect()
    }
}
