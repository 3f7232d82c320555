//! Markdown to a flat list of styled blocks, ready for layout.

use comrak::nodes::{AstNode, ListType, NodeValue};
use comrak::{parse_document, Arena, Options};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Style {
    pub bold: bool,
    pub italic: bool,
    pub mono: bool,
}

impl Style {
    pub const BOLD: Style = Style {
        bold: true,
        italic: false,
        mono: false,
    };

    fn merge(self, other: Style) -> Style {
        Style {
            bold: self.bold || other.bold,
            italic: self.italic || other.italic,
            mono: self.mono || other.mono,
        }
    }
}

/// A run of text in a single style. A `"\n"` span is a hard line break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub style: Style,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Heading(u8),
    Paragraph,
    /// `depth` starts at 1 for a top-level list.
    ListItem { depth: usize, marker: String },
    Code,
    Rule,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub kind: BlockKind,
    pub spans: Vec<Span>,
    pub quote_depth: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct Context {
    quote_depth: usize,
    list_depth: usize,
}

enum Shape {
    Heading(u8),
    Paragraph,
    List { ordered: bool, start: usize },
    Quote,
    Code(String),
    Html(String),
    Rule,
    Container,
}

pub fn parse(markdown: &str) -> Vec<Block> {
    let arena = Arena::new();
    let options = Options::default();
    let root = parse_document(&arena, markdown, &options);

    let mut blocks = Vec::new();
    collect_children(root, Context::default(), &mut blocks);
    blocks
}

fn shape<'a>(node: &'a AstNode<'a>) -> Shape {
    let data = node.data.borrow();
    match &data.value {
        NodeValue::Heading(heading) => Shape::Heading(heading.level),
        NodeValue::Paragraph => Shape::Paragraph,
        NodeValue::List(list) => Shape::List {
            ordered: list.list_type == ListType::Ordered,
            start: list.start,
        },
        NodeValue::BlockQuote => Shape::Quote,
        NodeValue::CodeBlock(code) => Shape::Code(code.literal.clone()),
        NodeValue::HtmlBlock(html) => Shape::Html(html.literal.clone()),
        NodeValue::ThematicBreak => Shape::Rule,
        _ => Shape::Container,
    }
}

fn collect_children<'a>(node: &'a AstNode<'a>, ctx: Context, out: &mut Vec<Block>) {
    for child in node.children() {
        collect_block(child, ctx, out);
    }
}

fn collect_block<'a>(node: &'a AstNode<'a>, ctx: Context, out: &mut Vec<Block>) {
    let block = |kind, spans| Block {
        kind,
        spans,
        quote_depth: ctx.quote_depth,
    };

    match shape(node) {
        Shape::Heading(level) => out.push(block(BlockKind::Heading(level), inline_spans(node))),
        Shape::Paragraph => out.push(block(BlockKind::Paragraph, inline_spans(node))),
        Shape::List { ordered, start } => {
            let nested = Context {
                list_depth: ctx.list_depth + 1,
                ..ctx
            };
            for (index, item) in node.children().enumerate() {
                let marker = if ordered {
                    format!("{}.", start + index)
                } else {
                    "\u{2022}".to_string()
                };
                collect_item(item, marker, nested, out);
            }
        }
        Shape::Quote => {
            let quoted = Context {
                quote_depth: ctx.quote_depth + 1,
                ..ctx
            };
            collect_children(node, quoted, out);
        }
        Shape::Code(literal) => {
            let text = literal.strip_suffix('\n').unwrap_or(&literal).to_string();
            out.push(block(
                BlockKind::Code,
                vec![Span {
                    text,
                    style: Style {
                        mono: true,
                        ..Style::default()
                    },
                }],
            ));
        }
        Shape::Html(literal) => {
            out.push(block(
                BlockKind::Paragraph,
                vec![Span {
                    text: literal.trim().to_string(),
                    style: Style::default(),
                }],
            ));
        }
        Shape::Rule => out.push(block(BlockKind::Rule, Vec::new())),
        Shape::Container => collect_children(node, ctx, out),
    }
}

/// The first paragraph of an item carries its marker; later paragraphs and
/// nested blocks follow at the same depth without one.
fn collect_item<'a>(item: &'a AstNode<'a>, marker: String, ctx: Context, out: &mut Vec<Block>) {
    let mut marker = Some(marker);
    for part in item.children() {
        if matches!(shape(part), Shape::Paragraph) {
            out.push(Block {
                kind: BlockKind::ListItem {
                    depth: ctx.list_depth,
                    marker: marker.take().unwrap_or_default(),
                },
                spans: inline_spans(part),
                quote_depth: ctx.quote_depth,
            });
        } else {
            if let Some(marker) = marker.take() {
                out.push(Block {
                    kind: BlockKind::ListItem {
                        depth: ctx.list_depth,
                        marker,
                    },
                    spans: Vec::new(),
                    quote_depth: ctx.quote_depth,
                });
            }
            collect_block(part, ctx, out);
        }
    }
    if let Some(marker) = marker {
        out.push(Block {
            kind: BlockKind::ListItem {
                depth: ctx.list_depth,
                marker,
            },
            spans: Vec::new(),
            quote_depth: ctx.quote_depth,
        });
    }
}

fn inline_spans<'a>(node: &'a AstNode<'a>) -> Vec<Span> {
    let mut spans: Vec<Span> = Vec::new();
    for child in node.children() {
        walk_inline(child, Style::default(), &mut spans);
    }
    spans
}

fn walk_inline<'a>(node: &'a AstNode<'a>, style: Style, spans: &mut Vec<Span>) {
    let data = node.data.borrow();
    let child_style = match &data.value {
        NodeValue::Text(text) => return push_text(spans, text, style),
        NodeValue::Code(code) => {
            let mono = Style {
                mono: true,
                ..Style::default()
            };
            return push_text(spans, &code.literal, style.merge(mono));
        }
        NodeValue::HtmlInline(html) => return push_text(spans, html, style),
        NodeValue::SoftBreak => return push_text(spans, " ", style),
        NodeValue::LineBreak => return push_text(spans, "\n", style),
        NodeValue::Strong => style.merge(Style::BOLD),
        NodeValue::Emph => style.merge(Style {
            italic: true,
            ..Style::default()
        }),
        _ => style,
    };
    drop(data);

    for child in node.children() {
        walk_inline(child, child_style, spans);
    }
}

/// Append text, extending the previous span when the style matches.
fn push_text(spans: &mut Vec<Span>, text: &str, style: Style) {
    if text.is_empty() {
        return;
    }
    match spans.last_mut() {
        Some(last) if last.style == style && text != "\n" && last.text != "\n" => {
            last.text.push_str(text)
        }
        _ => spans.push(Span {
            text: text.to_string(),
            style,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(text: &str) -> Span {
        Span {
            text: text.to_string(),
            style: Style::default(),
        }
    }

    #[test]
    fn test_heading_and_bold() {
        let blocks = parse("# H1\n**bold**");
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].kind, BlockKind::Heading(1));
        assert_eq!(blocks[0].spans, vec![plain("H1")]);
        assert_eq!(blocks[1].kind, BlockKind::Paragraph);
        assert_eq!(
            blocks[1].spans,
            vec![Span {
                text: "bold".to_string(),
                style: Style::BOLD
            }]
        );
    }

    #[test]
    fn test_nested_emphasis() {
        let blocks = parse("plain *it **both***");
        let spans = &blocks[0].spans;
        assert_eq!(spans[0], plain("plain "));
        assert_eq!(spans[1].text, "it ");
        assert!(spans[1].style.italic && !spans[1].style.bold);
        assert_eq!(spans[2].text, "both");
        assert!(spans[2].style.italic && spans[2].style.bold);
    }

    #[test]
    fn test_lists() {
        let blocks = parse("- one\n- two\n  1. inner\n\n3. three\n4. four\n");
        let kinds: Vec<_> = blocks.iter().map(|b| b.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                BlockKind::ListItem { depth: 1, marker: "\u{2022}".into() },
                BlockKind::ListItem { depth: 1, marker: "\u{2022}".into() },
                BlockKind::ListItem { depth: 2, marker: "1.".into() },
                BlockKind::ListItem { depth: 1, marker: "3.".into() },
                BlockKind::ListItem { depth: 1, marker: "4.".into() },
            ]
        );
        assert_eq!(blocks[2].spans, vec![plain("inner")]);
    }

    #[test]
    fn test_blockquote_depth() {
        let blocks = parse("> quoted\n>\n> > deeper\n\nafter");
        assert_eq!(blocks[0].quote_depth, 1);
        assert_eq!(blocks[1].quote_depth, 2);
        assert_eq!(blocks[1].spans, vec![plain("deeper")]);
        assert_eq!(blocks[2].quote_depth, 0);
    }

    #[test]
    fn test_code_rule_and_breaks() {
        let blocks = parse("```\nfn main() {}\n```\n\n---\n\nline one  \nline two\nsoft");
        assert_eq!(blocks[0].kind, BlockKind::Code);
        assert_eq!(blocks[0].spans[0].text, "fn main() {}");
        assert!(blocks[0].spans[0].style.mono);
        assert_eq!(blocks[1].kind, BlockKind::Rule);
        let texts: Vec<&str> = blocks[2].spans.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["line one", "\n", "line two soft"]);
    }

    #[test]
    fn test_inline_code_is_monospace() {
        let blocks = parse("call `run()` now");
        assert_eq!(blocks[0].spans.len(), 3);
        assert!(blocks[0].spans[1].style.mono);
        assert_eq!(blocks[0].spans[1].text, "run()");
    }
}
