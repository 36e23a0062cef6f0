//! Gathering the style rules the document lets us read.

use crate::document::Document;

/// One rule's text, tagged with whether its source could be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleFragment {
    /// Label of the source the rule came from
    pub source: String,
    pub text: String,
    pub accessible: bool,
}

/// Ordered rule fragments in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StyleRuleSet {
    fragments: Vec<RuleFragment>,
}

impl StyleRuleSet {
    pub fn fragments(&self) -> &[RuleFragment] {
        &self.fragments
    }

    pub fn accessible(&self) -> impl Iterator<Item = &RuleFragment> {
        self.fragments.iter().filter(|f| f.accessible)
    }

    pub fn inaccessible_count(&self) -> usize {
        self.fragments.iter().filter(|f| !f.accessible).count()
    }

    /// Accessible rule text joined into one stylesheet. Inaccessible
    /// fragments contribute nothing.
    pub fn blob(&self) -> String {
        self.accessible()
            .map(|f| f.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Reads style rules under the same-origin policy: rules of cross-origin
/// or not yet loaded sheets cannot be read back and are skipped.
pub struct StyleCollector<'d> {
    document: &'d Document,
}

impl<'d> StyleCollector<'d> {
    pub fn new(document: &'d Document) -> Self {
        Self { document }
    }

    pub fn collect(&self) -> StyleRuleSet {
        let mut fragments = Vec::new();
        for source in self.document.style_sources() {
            let label = source.label();
            let readable = source.is_loaded()
                && source
                    .href
                    .as_ref()
                    .map_or(true, |href| self.document.is_same_origin(href));
            if !readable {
                log::debug!("cannot read rules of {}, skipping", label);
                fragments.push(RuleFragment {
                    source: label,
                    text: String::new(),
                    accessible: false,
                });
                continue;
            }
            fragments.extend(source.rules().iter().map(|rule| RuleFragment {
                source: label.clone(),
                text: rule.css_text(),
                accessible: true,
            }));
        }
        let set = StyleRuleSet { fragments };
        log::debug!(
            "collected {} style rules ({} sources unreadable)",
            set.accessible().count(),
            set.inaccessible_count()
        );
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <style>.a { color: red }</style>
        <link rel="stylesheet" href="/local.css">
        <link rel="stylesheet" href="https://cdn.other.example/x.css">
        <style>@media print { .a { color: black } } .b { margin: 0 }</style>
        </head><body></body></html>"#;

    #[test]
    fn skips_unreadable_sources_silently() {
        let mut doc = Document::parse(PAGE, "https://app.example/").unwrap();
        doc.attach_stylesheet("/local.css", ".l { padding: 1px }");
        doc.attach_stylesheet("https://cdn.other.example/x.css", ".x { color: blue }");
        let set = StyleCollector::new(&doc).collect();
        assert_eq!(set.inaccessible_count(), 1);
        let blob = set.blob();
        assert!(blob.contains(".a { color: red; }"));
        assert!(blob.contains(".l { padding: 1px; }"));
        assert!(!blob.contains(".x"));
        assert!(blob.contains("@media print"));
    }

    #[test]
    fn unloaded_links_are_inaccessible() {
        let doc = Document::parse(PAGE, "https://app.example/").unwrap();
        let set = StyleCollector::new(&doc).collect();
        assert_eq!(set.inaccessible_count(), 2);
    }

    #[test]
    fn collection_is_deterministic() {
        let doc = Document::parse(PAGE, "https://app.example/").unwrap();
        let collector = StyleCollector::new(&doc);
        assert_eq!(collector.collect().blob(), collector.collect().blob());
    }
}
