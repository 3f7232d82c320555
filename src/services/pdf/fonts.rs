use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::truetype::TrueTypeFace;
use super::FontError;

/// Platform fonts known to cover CJK text, tried in order.
#[cfg(target_os = "windows")]
const SYSTEM_FONTS: &[&str] = &[
    "C:/Windows/Fonts/simfang.ttf",
    "C:/Windows/Fonts/simhei.ttf",
    "C:/Windows/Fonts/simkai.ttf",
];

#[cfg(target_os = "macos")]
const SYSTEM_FONTS: &[&str] = &[
    "/Library/Fonts/Arial Unicode.ttf",
    "/System/Library/Fonts/Supplemental/Arial Unicode.ttf",
];

#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const SYSTEM_FONTS: &[&str] = &[
    "/usr/share/fonts/truetype/droid/DroidSansFallbackFull.ttf",
    "/usr/share/fonts/truetype/arphic/uming.ttf",
    "/usr/share/fonts/truetype/wqy/wqy-microhei.ttf",
    "/usr/share/fonts/opentype/noto/NotoSansCJK-Regular.ttf",
];

/// Where an embeddable font was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FontSource {
    Bundled(PathBuf),
    System(PathBuf),
}

impl FontSource {
    pub fn path(&self) -> &Path {
        match self {
            FontSource::Bundled(path) | FontSource::System(path) => path,
        }
    }
}

/// A TrueType face that will be embedded into documents needing it.
#[derive(Debug)]
pub struct EmbeddedFont {
    pub name: String,
    pub source: FontSource,
    pub face: TrueTypeFace,
}

/// Fonts available to the renderer. The base-14 families are always
/// present; an embedded face is optional.
#[derive(Debug, Clone, Default)]
pub struct FontSet {
    embedded: Option<Arc<EmbeddedFont>>,
}

impl FontSet {
    pub fn builtin() -> Self {
        Self { embedded: None }
    }

    pub fn with_embedded(font: EmbeddedFont) -> Self {
        Self {
            embedded: Some(Arc::new(font)),
        }
    }

    pub fn embedded(&self) -> Option<&EmbeddedFont> {
        self.embedded.as_deref()
    }
}

/// Locates a font able to render non-Latin scripts.
///
/// Looks in the bundled font directory first, then at platform fonts.
/// Resolution never fails: anything unreadable is logged and skipped, and
/// the built-in Helvetica family is the last resort.
#[derive(Debug, Clone)]
pub struct FontResolver {
    font_dir: PathBuf,
    use_system_fonts: bool,
}

impl FontResolver {
    pub fn new(font_dir: impl Into<PathBuf>, use_system_fonts: bool) -> Self {
        Self {
            font_dir: font_dir.into(),
            use_system_fonts,
        }
    }

    pub fn resolve(&self) -> FontSet {
        for source in self.candidates() {
            match load(&source) {
                Ok(font) => {
                    tracing::info!(
                        font = %font.name,
                        path = %source.path().display(),
                        "Using embedded font for non-Latin text"
                    );
                    return FontSet::with_embedded(font);
                }
                Err(e) => {
                    tracing::debug!(
                        path = %source.path().display(),
                        error = %e,
                        "Skipping font candidate"
                    );
                }
            }
        }

        tracing::warn!(
            font_dir = %self.font_dir.display(),
            "No embeddable font found, falling back to Helvetica"
        );
        FontSet::builtin()
    }

    fn candidates(&self) -> Vec<FontSource> {
        let mut bundled: Vec<PathBuf> = std::fs::read_dir(&self.font_dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|path| {
                        path.extension()
                            .and_then(|ext| ext.to_str())
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("ttf"))
                    })
                    .collect()
            })
            .unwrap_or_default();
        bundled.sort();

        let mut candidates: Vec<FontSource> =
            bundled.into_iter().map(FontSource::Bundled).collect();

        if self.use_system_fonts {
            candidates.extend(
                SYSTEM_FONTS
                    .iter()
                    .map(PathBuf::from)
                    .filter(|path| path.exists())
                    .map(FontSource::System),
            );
        }
        candidates
    }
}

fn load(source: &FontSource) -> Result<EmbeddedFont, FontError> {
    let path = source.path();
    let data = std::fs::read(path).map_err(|e| FontError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    let face = TrueTypeFace::parse(data)?;
    let name = pdf_font_name(path);
    Ok(EmbeddedFont {
        name,
        source: source.clone(),
        face,
    })
}

/// PDF name for the font derived from its file stem (no spaces or delimiters).
fn pdf_font_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("EmbeddedFont");
    let name: String = stem
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-')
        .collect();
    if name.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        name
    }
}

/// Map a character to its WinAnsi code, the encoding of the base-14 fonts.
pub fn winansi_byte(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => match ch {
            '\u{20AC}' => Some(0x80),
            '\u{201A}' => Some(0x82),
            '\u{0192}' => Some(0x83),
            '\u{201E}' => Some(0x84),
            '\u{2026}' => Some(0x85),
            '\u{2020}' => Some(0x86),
            '\u{2021}' => Some(0x87),
            '\u{02C6}' => Some(0x88),
            '\u{2030}' => Some(0x89),
            '\u{0160}' => Some(0x8A),
            '\u{2039}' => Some(0x8B),
            '\u{0152}' => Some(0x8C),
            '\u{017D}' => Some(0x8E),
            '\u{2018}' => Some(0x91),
            '\u{2019}' => Some(0x92),
            '\u{201C}' => Some(0x93),
            '\u{201D}' => Some(0x94),
            '\u{2022}' => Some(0x95),
            '\u{2013}' => Some(0x96),
            '\u{2014}' => Some(0x97),
            '\u{02DC}' => Some(0x98),
            '\u{2122}' => Some(0x99),
            '\u{0161}' => Some(0x9A),
            '\u{203A}' => Some(0x9B),
            '\u{0153}' => Some(0x9C),
            '\u{017E}' => Some(0x9E),
            '\u{0178}' => Some(0x9F),
            _ => None,
        },
    }
}

/// Encode text for a base-14 font, substituting `?` for unmappable characters.
pub fn encode_winansi(text: &str) -> Vec<u8> {
    text.chars()
        .map(|ch| match ch {
            '\t' => b' ',
            _ => winansi_byte(ch).unwrap_or(b'?'),
        })
        .collect()
}

/// Whether the base-14 fonts cannot show this character.
pub fn needs_embedded_glyph(ch: char) -> bool {
    !ch.is_control() && winansi_byte(ch).is_none()
}

/// Helvetica advance widths for U+0020..=U+007E, in 1/1000 em.
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // ' '..'/'
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // '0'..'?'
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // '@'..'O'
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 'P'..'_'
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // '`'..'o'
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, // 'p'..'~'
];

const COURIER_WIDTH: u16 = 600;

/// Width of a character in the built-in families, in 1/1000 em.
pub fn builtin_width(ch: char, bold: bool, mono: bool) -> u16 {
    if mono {
        return COURIER_WIDTH;
    }
    let base = match ch as u32 {
        code @ 0x20..=0x7E => HELVETICA_WIDTHS[(code - 0x20) as usize],
        _ => 556,
    };
    // Helvetica-Bold runs roughly 6% wider.
    if bold {
        base + base / 16
    } else {
        base
    }
}
