//! Citation annotation
//!
//! Wraps every citation occurrence in link markup. Plain-text opinions are
//! emitted inside `<pre class="inline">` blocks that are closed and reopened
//! around each citation; markup opinions get the link markup inserted in
//! place, skipping any insertion that would leave the markup unbalanced.

use crate::citation::Citation;
use crate::resolver::{MatchedTarget, ResolvedCitation};
use crate::text::{SourceKind, SourceText, Span};
use citator_common::config::AnnotationConfig;
use tracing::warn;

const PRE_OPEN: &str = r#"<pre class="inline">"#;
const PRE_CLOSE: &str = "</pre>";

/// Elements that never take a closing tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "wbr",
];

/// Markup to place around one span of the cleaned text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub span: Span,
    pub open: String,
    pub close: String,
}

/// Annotated output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedText {
    pub html: String,
    pub applied: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Annotator {
    link_base: String,
    anchor_prefix: String,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(&AnnotationConfig::default())
    }
}

impl Annotator {
    pub fn new(config: &AnnotationConfig) -> Self {
        Self {
            link_base: config.link_base.trim_end_matches('/').to_string(),
            anchor_prefix: config.anchor_prefix.clone(),
        }
    }

    fn href(&self, opinion_id: i64, pin_page: Option<u32>) -> String {
        match pin_page {
            Some(page) => format!(
                "{}/{}/#{}{}",
                self.link_base, opinion_id, self.anchor_prefix, page
            ),
            None => format!("{}/{}/", self.link_base, opinion_id),
        }
    }

    /// One triple per citation plus one per in-text pin cite
    pub fn annotations(&self, resolved: &[ResolvedCitation]) -> Vec<Annotation> {
        let mut annotations = Vec::with_capacity(resolved.len());

        for citation in resolved {
            match &citation.target {
                MatchedTarget::Document(document) => {
                    annotations.push(Annotation {
                        span: citation.citation.span(),
                        open: format!(
                            r#"<span class="citation" data-id="{}"><a href="{}">"#,
                            document.opinion_id,
                            self.href(document.opinion_id, citation.pin_page)
                        ),
                        close: "</a></span>".to_string(),
                    });

                    if let Citation::Full(full) = &citation.citation {
                        if let Some(pin) = full.pin_cite {
                            annotations.push(Annotation {
                                span: pin.span,
                                open: format!(
                                    r#"<span class="pin-cite"><a href="{}">"#,
                                    self.href(document.opinion_id, Some(pin.page))
                                ),
                                close: "</a></span>".to_string(),
                            });
                        }
                    }
                }
                MatchedTarget::NoMatch => annotations.push(Annotation {
                    span: citation.citation.span(),
                    open: r#"<span class="citation no-link">"#.to_string(),
                    close: "</span>".to_string(),
                }),
            }
        }

        annotations
    }

    /// Insert annotations into the source the text was cleaned from
    pub fn apply(&self, source: &SourceText, mut annotations: Vec<Annotation>) -> AnnotatedText {
        annotations.sort_by_key(|a| (a.span.start, a.span.end));

        match source.kind {
            SourceKind::Plain => apply_plain(&source.source, &annotations),
            SourceKind::Markup => apply_markup(source, &annotations),
        }
    }

    pub fn annotate(&self, source: &SourceText, resolved: &[ResolvedCitation]) -> AnnotatedText {
        self.apply(source, self.annotations(resolved))
    }
}

fn apply_plain(source: &str, annotations: &[Annotation]) -> AnnotatedText {
    let mut html = String::with_capacity(source.len() + annotations.len() * 64);
    let mut cursor = 0;
    let mut applied = 0;
    let mut skipped = 0;

    html.push_str(PRE_OPEN);
    for annotation in annotations {
        let Span { start, end } = annotation.span;
        if start < cursor || annotation.span.is_empty() || source.get(start..end).is_none() {
            warn!(start, end, "Skipping overlapping or out-of-range annotation");
            skipped += 1;
            continue;
        }

        html.push_str(&escape(&source[cursor..start]));
        html.push_str(PRE_CLOSE);
        html.push_str(&annotation.open);
        html.push_str(&escape(&source[start..end]));
        html.push_str(&annotation.close);
        html.push_str(PRE_OPEN);
        cursor = end;
        applied += 1;
    }
    html.push_str(&escape(&source[cursor..]));
    html.push_str(PRE_CLOSE);

    AnnotatedText {
        html,
        applied,
        skipped,
    }
}

fn apply_markup(source: &SourceText, annotations: &[Annotation]) -> AnnotatedText {
    let markup = source.source.as_str();
    let mut html = String::with_capacity(markup.len() + annotations.len() * 64);
    let mut cursor = 0;
    let mut applied = 0;
    let mut skipped = 0;

    for annotation in annotations {
        let mapped = source
            .source_span(annotation.span)
            .filter(|span| span.start >= cursor)
            .and_then(|span| markup.get(span.start..span.end).map(|inner| (span, inner)));

        let Some((span, inner)) = mapped else {
            warn!(
                start = annotation.span.start,
                end = annotation.span.end,
                "Skipping annotation that cannot be mapped into the markup"
            );
            skipped += 1;
            continue;
        };
        if !is_balanced(inner) {
            warn!(fragment = inner, "Skipping annotation that would unbalance the markup");
            skipped += 1;
            continue;
        }

        html.push_str(&markup[cursor..span.start]);
        html.push_str(&annotation.open);
        html.push_str(inner);
        html.push_str(&annotation.close);
        cursor = span.end;
        applied += 1;
    }
    html.push_str(&markup[cursor..]);

    AnnotatedText {
        html,
        applied,
        skipped,
    }
}

/// True when every tag opened in `fragment` is closed in it and nothing
/// outside it is closed
fn is_balanced(fragment: &str) -> bool {
    let mut open: Vec<String> = Vec::new();
    let mut rest = fragment;

    while let Some(lt) = rest.find('<') {
        let after = &rest[lt + 1..];
        let Some(gt) = after.find('>') else {
            return false;
        };
        let tag = after[..gt].trim();
        rest = &after[gt + 1..];

        if tag.starts_with('!') || tag.ends_with('/') {
            continue;
        }
        let (closing, body) = match tag.strip_prefix('/') {
            Some(body) => (true, body),
            None => (false, tag),
        };
        let name: String = body
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_lowercase();
        if name.is_empty() || VOID_ELEMENTS.contains(&name.as_str()) {
            continue;
        }

        if closing {
            if open.pop().as_deref() != Some(name.as_str()) {
                return false;
            }
        } else {
            open.push(name);
        }
    }

    open.is_empty() && !rest.contains('>')
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            other => escaped.push(other),
        }
    }
    escaped
}
