//! Blog post to PDF rendering.

pub mod document;
pub mod fonts;
pub mod markup;
pub mod truetype;

use std::path::PathBuf;

use crate::models::blog::BlogContent;
use document::DocumentWriter;
use fonts::FontSet;

/// Renders blog posts into standalone PDF documents.
///
/// Rendering is synchronous and CPU-bound; async callers should run it on
/// the blocking pool.
#[derive(Debug, Clone)]
pub struct PdfRenderer {
    fonts: FontSet,
}

impl PdfRenderer {
    pub fn new(fonts: FontSet) -> Self {
        Self { fonts }
    }

    pub fn render(&self, blog: &BlogContent) -> Result<Vec<u8>, RenderError> {
        let info = format!(
            "Author: {}  Published: {}",
            blog.author_name,
            blog.published_at()
        );
        let blocks = markup::parse(&blog.body);

        // The writer only reaches for the embedded face on characters the
        // base-14 fonts cannot encode, and only embeds it if it did.
        let mut writer = DocumentWriter::new(self.fonts.embedded());
        writer.title(&blog.title);
        writer.info_line(&info);
        for block in &blocks {
            writer.block(block);
        }
        writer.finish(&blog.title, &blog.author_name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FontError {
    #[error("Failed to read font {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Unsupported font format: {0}")]
    Unsupported(&'static str),

    #[error("Malformed font: {0}")]
    Parse(#[from] ttf_parser::FaceParsingError),

    #[error("Font is missing the {0} table")]
    MissingTable(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("PDF encoding failed: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("PDF write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Font error: {0}")]
    Font(#[from] FontError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use fonts::{EmbeddedFont, FontSource};
    use lopdf::content::Content;
    use lopdf::{Document, Object};
    use truetype::TrueTypeFace;

    /// (font resource, size, decoded text) for every text show operation.
    fn text_runs(bytes: &[u8]) -> Vec<(String, f32, Vec<u8>)> {
        let doc = Document::load_mem(bytes).unwrap();
        let mut runs = Vec::new();
        for (_, page_id) in doc.get_pages() {
            let page = doc.get_dictionary(page_id).unwrap();
            let content_id = page.get(b"Contents").unwrap().as_reference().unwrap();
            let stream = doc.get_object(content_id).unwrap().as_stream().unwrap();
            let data = if stream.dict.has(b"Filter") {
                stream.decompressed_content().unwrap()
            } else {
                stream.content.clone()
            };
            let content = Content::decode(&data).unwrap();

            let mut font = String::new();
            let mut size = 0.0;
            for op in content.operations {
                match op.operator.as_str() {
                    "Tf" => {
                        font = String::from_utf8(op.operands[0].as_name().unwrap().to_vec()).unwrap();
                        size = op.operands[1].as_float().unwrap();
                    }
                    "Tj" => {
                        if let Object::String(bytes, _) = &op.operands[0] {
                            runs.push((font.clone(), size, bytes.clone()));
                        }
                    }
                    _ => {}
                }
            }
        }
        runs
    }

    fn blog(title: &str, body: &str) -> BlogContent {
        BlogContent {
            id: 42,
            title: title.to_string(),
            tag: "test".to_string(),
            body: body.to_string(),
            author_name: "alice".to_string(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 6, 7, 8, 9).unwrap(),
        }
    }

    #[test]
    fn test_renders_heading_and_bold_styles() {
        let renderer = PdfRenderer::new(FontSet::builtin());
        let bytes = renderer.render(&blog("Hello", "# H1\n**bold**")).unwrap();
        assert!(bytes.starts_with(b"%PDF-1.5"));

        let runs = text_runs(&bytes);
        assert_eq!(runs[0], ("F2".to_string(), 24.0, b"Hello".to_vec()));
        assert_eq!(
            runs[1],
            (
                "F1".to_string(),
                10.0,
                b"Author: alice  Published: 2024-05-06 07:08:09".to_vec()
            )
        );
        assert!(runs.contains(&("F2".to_string(), 16.0, b"H1".to_vec())));
        assert!(runs.contains(&("F2".to_string(), 12.0, b"bold".to_vec())));
    }

    #[test]
    fn test_renders_lists_quotes_and_italics() {
        let renderer = PdfRenderer::new(FontSet::builtin());
        let body = "- first\n- second\n\n> quoted *words*\n\n*slanted*";
        let runs = text_runs(&renderer.render(&blog("T", body)).unwrap());

        assert!(runs.contains(&("F1".to_string(), 12.0, vec![0x95])));
        assert!(runs.contains(&("F1".to_string(), 12.0, b"first".to_vec())));
        assert!(runs.contains(&("F3".to_string(), 12.0, b"quoted words".to_vec())));
        assert!(runs.contains(&("F3".to_string(), 12.0, b"slanted".to_vec())));
    }

    #[test]
    fn test_latin_posts_do_not_embed_font() {
        let face = TrueTypeFace::parse(truetype::tests::sample_font()).unwrap();
        let fonts = FontSet::with_embedded(EmbeddedFont {
            name: "Sample".to_string(),
            source: FontSource::Bundled(PathBuf::from("sample.ttf")),
            face,
        });
        let renderer = PdfRenderer::new(fonts);

        let runs = text_runs(&renderer.render(&blog("Plain", "text")).unwrap());
        assert!(runs.iter().all(|(font, _, _)| font != "F0"));
    }

    #[test]
    fn test_cjk_posts_use_embedded_glyphs() {
        let face = TrueTypeFace::parse(truetype::tests::sample_font()).unwrap();
        let fonts = FontSet::with_embedded(EmbeddedFont {
            name: "Sample".to_string(),
            source: FontSource::Bundled(PathBuf::from("sample.ttf")),
            face,
        });
        let renderer = PdfRenderer::new(fonts);
        let bytes = renderer.render(&blog("\u{4F60}", "A")).unwrap();

        let runs = text_runs(&bytes);
        // The title is glyph 2 as a two-byte code; Latin text stays on the
        // base-14 fonts.
        assert_eq!(runs[0], ("F0".to_string(), 24.0, vec![0x00, 0x02]));
        assert_eq!(runs[1].0, "F1");
        assert!(runs.contains(&("F1".to_string(), 12.0, b"A".to_vec())));

        let doc = Document::load_mem(&bytes).unwrap();
        let has_type0 = doc.objects.values().any(|object| {
            object
                .as_dict()
                .ok()
                .and_then(|dict| dict.get(b"Subtype").ok())
                .and_then(|subtype| subtype.as_name().ok())
                == Some(b"Type0".as_slice())
        });
        assert!(has_type0);
    }

    #[test]
    fn test_mixed_runs_keep_real_bold_for_latin() {
        let face = TrueTypeFace::parse(truetype::tests::sample_font()).unwrap();
        let fonts = FontSet::with_embedded(EmbeddedFont {
            name: "Sample".to_string(),
            source: FontSource::Bundled(PathBuf::from("sample.ttf")),
            face,
        });
        let renderer = PdfRenderer::new(fonts);
        let bytes = renderer
            .render(&blog("Notes", "**Rust \u{4F60}**"))
            .unwrap();

        let runs = text_runs(&bytes);
        assert_eq!(runs[0], ("F2".to_string(), 24.0, b"Notes".to_vec()));
        assert!(runs.iter().any(|(font, size, text)| {
            font == "F2" && *size == 12.0 && String::from_utf8_lossy(text).trim() == "Rust"
        }));
        assert!(runs.contains(&("F0".to_string(), 12.0, vec![0x00, 0x02])));
    }
}
