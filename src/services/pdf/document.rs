//! Page layout and PDF serialization.

use std::collections::BTreeMap;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, Stream, StringFormat};

use super::fonts::{builtin_width, encode_winansi, needs_embedded_glyph, EmbeddedFont};
use super::markup::{Block, BlockKind, Span, Style};
use super::RenderError;

const PAGE_WIDTH: f32 = 595.28;
const PAGE_HEIGHT: f32 = 841.89;
const MARGIN: f32 = 56.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

const TITLE_SIZE: f32 = 24.0;
const INFO_SIZE: f32 = 10.0;
const BODY_SIZE: f32 = 12.0;
const CODE_SIZE: f32 = 10.0;
const LEADING: f32 = 1.4;
const INDENT: f32 = 18.0;
const GRAY: f32 = 0.5;

/// Font resource names. The embedded face only carries characters the
/// base-14 fonts cannot encode.
const F_REGULAR: &str = "F1";
const F_BOLD: &str = "F2";
const F_ITALIC: &str = "F3";
const F_BOLD_ITALIC: &str = "F4";
const F_MONO: &str = "F5";
const F_EMBEDDED: &str = "F0";

/// Heading sizes by level, h3 and deeper share the body size.
pub fn heading_size(level: u8) -> f32 {
    match level {
        1 => 16.0,
        2 => 14.0,
        _ => BODY_SIZE,
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Align {
    Left(f32),
    Center,
}

#[derive(Debug, Clone)]
struct Run {
    text: String,
    style: Style,
    width: f32,
}

#[derive(Debug, Default)]
struct Line {
    runs: Vec<Run>,
    width: f32,
}

impl Line {
    fn push(&mut self, text: &str, style: Style, width: f32) {
        match self.runs.last_mut() {
            Some(last) if last.style == style => {
                last.text.push_str(text);
                last.width += width;
            }
            _ => self.runs.push(Run {
                text: text.to_string(),
                style,
                width,
            }),
        }
        self.width += width;
    }

    fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }
}

enum Token<'s> {
    Word(&'s str),
    Space,
    Break,
}

/// Split text into wrap points: whitespace, hard breaks, and every
/// ideographic character (CJK text has no spaces between words).
fn tokenize(text: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut word_start: Option<usize> = None;

    for (index, ch) in text.char_indices() {
        let boundary = ch.is_whitespace() || is_wide(ch);
        if boundary {
            if let Some(start) = word_start.take() {
                tokens.push(Token::Word(&text[start..index]));
            }
        }
        if ch == '\n' {
            tokens.push(Token::Break);
        } else if ch.is_whitespace() {
            tokens.push(Token::Space);
        } else if is_wide(ch) {
            tokens.push(Token::Word(&text[index..index + ch.len_utf8()]));
        } else if word_start.is_none() {
            word_start = Some(index);
        }
    }
    if let Some(start) = word_start {
        tokens.push(Token::Word(&text[start..]));
    }
    tokens
}

fn is_wide(ch: char) -> bool {
    matches!(ch as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0x20000..=0x3FFFD)
}

/// Lays out blocks onto A4 pages and emits a PDF.
pub struct DocumentWriter<'f> {
    embedded: Option<&'f EmbeddedFont>,
    pages: Vec<Vec<Operation>>,
    y: f32,
    used_glyphs: BTreeMap<u16, char>,
}

impl<'f> DocumentWriter<'f> {
    pub fn new(embedded: Option<&'f EmbeddedFont>) -> Self {
        Self {
            embedded,
            pages: vec![Vec::new()],
            y: PAGE_HEIGHT - MARGIN,
            used_glyphs: BTreeMap::new(),
        }
    }

    pub fn title(&mut self, title: &str) {
        let spans = [Span {
            text: title.to_string(),
            style: Style::BOLD,
        }];
        self.paragraph(&spans, TITLE_SIZE, Align::Center, false);
        self.y -= 30.0;
    }

    pub fn info_line(&mut self, text: &str) {
        let spans = [Span {
            text: text.to_string(),
            style: Style::default(),
        }];
        self.paragraph(&spans, INFO_SIZE, Align::Center, true);
        self.y -= 20.0;
    }

    pub fn block(&mut self, block: &Block) {
        let quote_indent = INDENT * block.quote_depth as f32;
        let quoted = block.quote_depth > 0;
        let spans: Vec<Span> = if quoted {
            block
                .spans
                .iter()
                .map(|span| Span {
                    text: span.text.clone(),
                    style: Style {
                        italic: true,
                        ..span.style
                    },
                })
                .collect()
        } else {
            block.spans.clone()
        };

        match &block.kind {
            BlockKind::Heading(level) => {
                let size = heading_size(*level);
                let bold: Vec<Span> = spans
                    .into_iter()
                    .map(|span| Span {
                        style: Style {
                            bold: true,
                            ..span.style
                        },
                        text: span.text,
                    })
                    .collect();
                self.y -= size * 0.5;
                self.paragraph(&bold, size, Align::Left(quote_indent), quoted);
                self.y -= 4.0;
            }
            BlockKind::Paragraph => {
                self.paragraph(&spans, BODY_SIZE, Align::Left(quote_indent), quoted);
                self.y -= 6.0;
            }
            BlockKind::ListItem { depth, marker } => {
                let indent = quote_indent + INDENT * *depth as f32;
                if !marker.is_empty() {
                    self.ensure_room(BODY_SIZE * LEADING);
                    let width = self.measure(marker, Style::default(), BODY_SIZE);
                    let x = MARGIN + indent - width - 4.0;
                    let baseline = self.y - BODY_SIZE;
                    self.set_color(quoted);
                    self.emit_text(marker, Style::default(), BODY_SIZE, x, baseline);
                }
                if spans.is_empty() {
                    self.y -= BODY_SIZE * LEADING;
                } else {
                    self.paragraph(&spans, BODY_SIZE, Align::Left(indent), quoted);
                }
                self.y -= 2.0;
            }
            BlockKind::Code => {
                for span in &spans {
                    for line in span.text.split('\n') {
                        let code = [Span {
                            text: line.to_string(),
                            style: span.style,
                        }];
                        if line.is_empty() {
                            self.ensure_room(CODE_SIZE * LEADING);
                            self.y -= CODE_SIZE * LEADING;
                        } else {
                            self.paragraph(&code, CODE_SIZE, Align::Left(quote_indent + 12.0), quoted);
                        }
                    }
                }
                self.y -= 6.0;
            }
            BlockKind::Rule => {
                self.ensure_room(12.0);
                let y = self.y - 6.0;
                let page = self.current_page();
                page.push(Operation::new("G", vec![GRAY.into()]));
                page.push(Operation::new("w", vec![0.5f32.into()]));
                page.push(Operation::new("m", vec![MARGIN.into(), y.into()]));
                page.push(Operation::new("l", vec![(PAGE_WIDTH - MARGIN).into(), y.into()]));
                page.push(Operation::new("S", vec![]));
                self.y -= 12.0;
            }
        }
    }

    fn paragraph(&mut self, spans: &[Span], size: f32, align: Align, gray: bool) {
        let indent = match align {
            Align::Left(indent) => indent,
            Align::Center => 0.0,
        };
        let lines = self.wrap(spans, size, CONTENT_WIDTH - indent);
        for line in lines {
            self.ensure_room(size * LEADING);
            let baseline = self.y - size;
            let mut x = match align {
                Align::Left(indent) => MARGIN + indent,
                Align::Center => MARGIN + (CONTENT_WIDTH - line.width).max(0.0) / 2.0,
            };
            self.set_color(gray);
            for run in &line.runs {
                self.emit_text(&run.text, run.style, size, x, baseline);
                x += run.width;
            }
            self.y -= size * LEADING;
        }
    }

    fn wrap(&self, spans: &[Span], size: f32, max_width: f32) -> Vec<Line> {
        let mut lines = Vec::new();
        let mut line = Line::default();
        // Spaces are held back until the next word so none dangle at a line end.
        let mut pending_space: Option<(Style, usize)> = None;

        for span in spans {
            for token in tokenize(&span.text) {
                match token {
                    Token::Break => {
                        lines.push(std::mem::take(&mut line));
                        pending_space = None;
                    }
                    Token::Space => {
                        if !line.is_empty() {
                            let count = pending_space.map_or(0, |(_, n)| n);
                            pending_space = Some((span.style, count + 1));
                        }
                    }
                    Token::Word(word) => {
                        let width = self.measure(word, span.style, size);
                        let space = pending_space.take().map(|(style, n)| {
                            let spaces = " ".repeat(n);
                            let w = self.measure(&spaces, style, size);
                            (spaces, style, w)
                        });
                        let space_width = space.as_ref().map_or(0.0, |(_, _, w)| *w);

                        if !line.is_empty() && line.width + space_width + width > max_width {
                            lines.push(std::mem::take(&mut line));
                        } else if let Some((spaces, style, w)) = space {
                            line.push(&spaces, style, w);
                        }

                        if width <= max_width {
                            line.push(word, span.style, width);
                        } else {
                            self.split_long_word(word, span.style, size, max_width, &mut line, &mut lines);
                        }
                    }
                }
            }
        }
        if !line.is_empty() || lines.is_empty() {
            lines.push(line);
        }
        lines
    }

    fn split_long_word(
        &self,
        word: &str,
        style: Style,
        size: f32,
        max_width: f32,
        line: &mut Line,
        lines: &mut Vec<Line>,
    ) {
        let mut buf = [0u8; 4];
        for ch in word.chars() {
            let piece: &str = ch.encode_utf8(&mut buf);
            let width = self.measure(piece, style, size);
            if !line.is_empty() && line.width + width > max_width {
                lines.push(std::mem::take(line));
            }
            line.push(piece, style, width);
        }
    }

    fn measure(&self, text: &str, style: Style, size: f32) -> f32 {
        let builtin = |ch: char| u32::from(builtin_width(ch, style.bold, style.mono));
        let units: u32 = match self.embedded {
            Some(font) if text.chars().any(needs_embedded_glyph) => {
                let glyphs = font.face.glyph_ids(text);
                text.chars()
                    .zip(glyphs)
                    .map(|(ch, glyph)| {
                        if needs_embedded_glyph(ch) {
                            u32::from(font.face.advance(glyph))
                        } else {
                            builtin(ch)
                        }
                    })
                    .sum()
            }
            _ => text.chars().map(builtin).sum(),
        };
        units as f32 * size / 1000.0
    }

    fn ensure_room(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.pages.push(Vec::new());
            self.y = PAGE_HEIGHT - MARGIN;
        }
    }

    fn current_page(&mut self) -> &mut Vec<Operation> {
        if self.pages.is_empty() {
            self.pages.push(Vec::new());
        }
        let last = self.pages.len() - 1;
        &mut self.pages[last]
    }

    fn set_color(&mut self, gray: bool) {
        let level = if gray { GRAY } else { 0.0 };
        self.current_page()
            .push(Operation::new("g", vec![level.into()]));
    }

    /// Show a run of one style, switching to the embedded face only for the
    /// stretches the base-14 fonts cannot encode.
    fn emit_text(&mut self, text: &str, style: Style, size: f32, x: f32, y: f32) {
        let mut x = x;
        for (segment, embedded) in font_segments(text, self.embedded.is_some()) {
            self.emit_segment(segment, embedded, style, size, x, y);
            x += self.measure(segment, style, size);
        }
    }

    fn emit_segment(
        &mut self,
        text: &str,
        embedded: bool,
        style: Style,
        size: f32,
        x: f32,
        y: f32,
    ) {
        if text.is_empty() {
            return;
        }
        let (font, encoded, fake_bold, fake_italic) = match self.embedded.filter(|_| embedded) {
            Some(font) => {
                let mut bytes = Vec::with_capacity(text.len() * 2);
                for (ch, glyph) in text.chars().zip(font.face.glyph_ids(text)) {
                    self.used_glyphs.entry(glyph).or_insert(ch);
                    bytes.extend_from_slice(&glyph.to_be_bytes());
                }
                let encoded = Object::String(bytes, StringFormat::Hexadecimal);
                (F_EMBEDDED, encoded, style.bold, style.italic)
            }
            None => {
                let font = match (style.mono, style.bold, style.italic) {
                    (true, _, _) => F_MONO,
                    (false, true, true) => F_BOLD_ITALIC,
                    (false, true, false) => F_BOLD,
                    (false, false, true) => F_ITALIC,
                    (false, false, false) => F_REGULAR,
                };
                let encoded = Object::String(encode_winansi(text), StringFormat::Literal);
                (font, encoded, false, false)
            }
        };

        let page = self.current_page();
        page.push(Operation::new("BT", vec![]));
        page.push(Operation::new("Tf", vec![font.into(), size.into()]));
        if fake_bold {
            page.push(Operation::new("Tr", vec![2.into()]));
            page.push(Operation::new("w", vec![(size * 0.03).into()]));
        }
        if fake_italic {
            let matrix = [1.0f32, 0.0, 0.2, 1.0, x, y];
            page.push(Operation::new(
                "Tm",
                matrix.iter().map(|v| Object::from(*v)).collect(),
            ));
        } else {
            page.push(Operation::new("Td", vec![x.into(), y.into()]));
        }
        page.push(Operation::new("Tj", vec![encoded]));
        page.push(Operation::new("ET", vec![]));
        if fake_bold {
            page.push(Operation::new("Tr", vec![0.into()]));
        }
    }

    /// Serialize all pages into a PDF file.
    pub fn finish(self, title: &str, author: &str) -> Result<Vec<u8>, RenderError> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let mut fonts = builtin_font_resources(&mut doc);
        if let Some(font) = self.embedded.filter(|_| !self.used_glyphs.is_empty()) {
            embedded_font_resources(&mut doc, &mut fonts, font, &self.used_glyphs);
        }
        let resources_id = doc.add_object(dictionary! {
            "Font" => fonts,
        });

        let mut kids: Vec<Object> = Vec::with_capacity(self.pages.len());
        for operations in self.pages {
            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), PAGE_WIDTH.into(), PAGE_HEIGHT.into()],
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => text_string(title),
            "Author" => text_string(author),
            "Producer" => Object::string_literal("blogpress"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc.compress();

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes)?;
        Ok(bytes)
    }
}

fn builtin_font_resources(doc: &mut Document) -> Dictionary {
    let mut fonts = Dictionary::new();
    for (name, base) in [
        (F_REGULAR, "Helvetica"),
        (F_BOLD, "Helvetica-Bold"),
        (F_ITALIC, "Helvetica-Oblique"),
        (F_BOLD_ITALIC, "Helvetica-BoldOblique"),
        (F_MONO, "Courier"),
    ] {
        let id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => base,
            "Encoding" => "WinAnsiEncoding",
        });
        fonts.set(name, id);
    }
    fonts
}

/// Embed a TrueType face as a Type0 font with Identity-H encoding, so that
/// two-byte string codes are glyph ids.
fn embedded_font_resources(
    doc: &mut Document,
    fonts: &mut Dictionary,
    font: &EmbeddedFont,
    used_glyphs: &BTreeMap<u16, char>,
) {
    let face = &font.face;
    let name = font.name.as_str();

    let file_id = doc.add_object(Stream::new(
        dictionary! { "Length1" => face.data().len() as i64 },
        face.data().to_vec(),
    ));
    let bbox: Vec<Object> = face.bbox().iter().map(|v| Object::from(*v as i64)).collect();
    let descriptor_id = doc.add_object(dictionary! {
        "Type" => "FontDescriptor",
        "FontName" => name,
        "Flags" => 4,
        "FontBBox" => bbox,
        "ItalicAngle" => 0,
        "Ascent" => face.ascent() as i64,
        "Descent" => face.descent() as i64,
        "CapHeight" => face.ascent() as i64,
        "StemV" => 80,
        "FontFile2" => file_id,
    });

    let mut widths: Vec<Object> = Vec::with_capacity(used_glyphs.len() * 2);
    for glyph in used_glyphs.keys() {
        widths.push((*glyph as i64).into());
        widths.push(vec![Object::from(face.advance(*glyph) as i64)].into());
    }
    let cid_font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "CIDFontType2",
        "BaseFont" => name,
        "CIDSystemInfo" => dictionary! {
            "Registry" => Object::string_literal("Adobe"),
            "Ordering" => Object::string_literal("Identity"),
            "Supplement" => 0,
        },
        "FontDescriptor" => descriptor_id,
        "DW" => 1000,
        "W" => widths,
        "CIDToGIDMap" => "Identity",
    });

    let to_unicode_id = doc.add_object(Stream::new(
        dictionary! {},
        to_unicode_cmap(used_glyphs).into_bytes(),
    ));
    let type0_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type0",
        "BaseFont" => name,
        "Encoding" => "Identity-H",
        "DescendantFonts" => vec![Object::Reference(cid_font_id)],
        "ToUnicode" => to_unicode_id,
    });

    fonts.set(F_EMBEDDED, type0_id);
}

/// Split text into maximal stretches that need the embedded face (`true`)
/// or can use the base-14 fonts (`false`).
fn font_segments(text: &str, have_embedded: bool) -> Vec<(&str, bool)> {
    if !have_embedded {
        return vec![(text, false)];
    }
    let mut segments = Vec::new();
    let mut start = 0;
    let mut current: Option<bool> = None;
    for (index, ch) in text.char_indices() {
        let needs = needs_embedded_glyph(ch);
        match current {
            Some(kind) if kind != needs => {
                segments.push((&text[start..index], kind));
                start = index;
                current = Some(needs);
            }
            None => current = Some(needs),
            _ => {}
        }
    }
    if let Some(kind) = current {
        segments.push((&text[start..], kind));
    }
    segments
}

/// CMap mapping glyph ids back to Unicode so text stays extractable.
fn to_unicode_cmap(used_glyphs: &BTreeMap<u16, char>) -> String {
    let mut cmap = String::from(
        "/CIDInit /ProcSet findresource begin\n12 dict begin\nbegincmap\n\
         /CIDSystemInfo << /Registry (Adobe) /Ordering (UCS) /Supplement 0 >> def\n\
         /CMapName /Adobe-Identity-UCS def\n/CMapType 2 def\n\
         1 begincodespacerange\n<0000> <FFFF>\nendcodespacerange\n",
    );
    let entries: Vec<(&u16, &char)> = used_glyphs.iter().filter(|(g, _)| **g != 0).collect();
    for chunk in entries.chunks(100) {
        cmap.push_str(&format!("{} beginbfchar\n", chunk.len()));
        for (glyph, ch) in chunk {
            let mut units = [0u16; 2];
            let hex: String = ch
                .encode_utf16(&mut units)
                .iter()
                .map(|u| format!("{u:04X}"))
                .collect();
            cmap.push_str(&format!("<{glyph:04X}> <{hex}>\n"));
        }
        cmap.push_str("endbfchar\n");
    }
    cmap.push_str("endcmap\nCMapName currentdict /CMap defineresource pop\nend\nend\n");
    cmap
}

/// PDF text string: literal for ASCII, UTF-16BE with BOM otherwise.
fn text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::string_literal(text)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}
