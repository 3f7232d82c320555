//! TrueType faces for CID embedding, read with `ttf-parser`.
//!
//! Metrics are reported in 1/1000 em, the PDF glyph space.

use ttf_parser::{Face, GlyphId};

use super::FontError;

/// Width used for glyphs the face has no metrics for.
const DEFAULT_ADVANCE: u16 = 1000;

/// A validated single-face TrueType font. Holds the raw file for embedding
/// and its advance widths, already scaled.
#[derive(Debug)]
pub struct TrueTypeFace {
    data: Vec<u8>,
    advances: Vec<u16>,
    ascent: i32,
    descent: i32,
    bbox: [i32; 4],
}

impl TrueTypeFace {
    pub fn parse(data: Vec<u8>) -> Result<Self, FontError> {
        if ttf_parser::fonts_in_collection(&data).is_some() {
            return Err(FontError::Unsupported("TrueType collection"));
        }
        // FontFile2 only carries glyf outlines.
        if data.starts_with(b"OTTO") {
            return Err(FontError::Unsupported("CFF-flavoured OpenType"));
        }

        let face = Face::parse(&data, 0)?;
        if face.tables().cmap.is_none() {
            return Err(FontError::MissingTable("cmap"));
        }

        let units_per_em = face.units_per_em();
        let scale = |value: i16| i32::from(value) * 1000 / i32::from(units_per_em);
        let advances = (0..face.number_of_glyphs())
            .map(|id| {
                face.glyph_hor_advance(GlyphId(id))
                    .map(|raw| scale_advance(raw, units_per_em))
                    .unwrap_or(DEFAULT_ADVANCE)
            })
            .collect();
        let rect = face.global_bounding_box();

        let ascent = scale(face.ascender());
        let descent = scale(face.descender());
        let bbox = [
            scale(rect.x_min),
            scale(rect.y_min),
            scale(rect.x_max),
            scale(rect.y_max),
        ];

        Ok(Self {
            data,
            advances,
            ascent,
            descent,
            bbox,
        })
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Glyph for `ch`, or 0 (`.notdef`) when the font has none.
    pub fn glyph_id(&self, ch: char) -> u16 {
        self.face()
            .and_then(|face| face.glyph_index(ch))
            .map_or(0, |glyph| glyph.0)
    }

    /// Glyph ids for every character of `text`, parsing the face once.
    pub fn glyph_ids(&self, text: &str) -> Vec<u16> {
        match self.face() {
            Some(face) => text
                .chars()
                .map(|ch| face.glyph_index(ch).map_or(0, |glyph| glyph.0))
                .collect(),
            None => vec![0; text.chars().count()],
        }
    }

    /// Advance width of a glyph in 1/1000 em.
    pub fn advance(&self, glyph_id: u16) -> u16 {
        self.advances
            .get(usize::from(glyph_id))
            .copied()
            .unwrap_or(DEFAULT_ADVANCE)
    }

    pub fn ascent(&self) -> i32 {
        self.ascent
    }

    pub fn descent(&self) -> i32 {
        self.descent
    }

    pub fn bbox(&self) -> [i32; 4] {
        self.bbox
    }

    // The data was accepted by `parse`, so this only fails if it changed.
    fn face(&self) -> Option<Face<'_>> {
        Face::parse(&self.data, 0).ok()
    }
}

fn scale_advance(raw: u16, units_per_em: u16) -> u16 {
    let scaled = u32::from(raw) * 1000 / u32::from(units_per_em);
    u16::try_from(scaled).unwrap_or(u16::MAX)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    struct Table {
        tag: [u8; 4],
        body: Vec<u8>,
    }

    fn be16(out: &mut Vec<u8>, v: u16) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    fn be32(out: &mut Vec<u8>, v: u32) {
        out.extend_from_slice(&v.to_be_bytes());
    }

    /// Builds a tiny three-glyph font mapping 'A' -> glyph 1 and U+4F60 ->
    /// glyph 2 with a format 4 cmap, 2048 units per em.
    pub(crate) fn sample_font() -> Vec<u8> {
        let mut head = vec![0u8; 54];
        head[18..20].copy_from_slice(&2048u16.to_be_bytes());
        head[36..38].copy_from_slice(&(-100i16).to_be_bytes());
        head[38..40].copy_from_slice(&(-400i16).to_be_bytes());
        head[40..42].copy_from_slice(&2000i16.to_be_bytes());
        head[42..44].copy_from_slice(&1800i16.to_be_bytes());

        let mut hhea = vec![0u8; 36];
        hhea[4..6].copy_from_slice(&1600i16.to_be_bytes());
        hhea[6..8].copy_from_slice(&(-400i16).to_be_bytes());
        hhea[34..36].copy_from_slice(&3u16.to_be_bytes());

        let mut hmtx = Vec::new();
        for advance in [1024u16, 1229, 2048] {
            be16(&mut hmtx, advance);
            be16(&mut hmtx, 0);
        }

        // Segments: [0x41,0x41] delta -0x40, [0x4F60,0x4F60] via glyph array, [0xFFFF].
        let mut sub = Vec::new();
        be16(&mut sub, 4);
        be16(&mut sub, 0); // length, patched below
        be16(&mut sub, 0);
        be16(&mut sub, 6); // segCountX2
        be16(&mut sub, 0);
        be16(&mut sub, 0);
        be16(&mut sub, 0);
        for end in [0x41u16, 0x4F60, 0xFFFF] {
            be16(&mut sub, end);
        }
        be16(&mut sub, 0);
        for start in [0x41u16, 0x4F60, 0xFFFF] {
            be16(&mut sub, start);
        }
        for delta in [0u16.wrapping_sub(0x40), 0, 1] {
            be16(&mut sub, delta);
        }
        // idRangeOffset for segment 1 points 4 bytes ahead, past segment 2's slot.
        for range_offset in [0u16, 4, 0] {
            be16(&mut sub, range_offset);
        }
        be16(&mut sub, 2); // glyphIdArray[0]
        let length = sub.len() as u16;
        sub[2..4].copy_from_slice(&length.to_be_bytes());

        let mut cmap = Vec::new();
        be16(&mut cmap, 0);
        be16(&mut cmap, 1);
        be16(&mut cmap, 3);
        be16(&mut cmap, 1);
        be32(&mut cmap, 12);
        cmap.extend_from_slice(&sub);

        // Version 0.5 maxp: just the glyph count.
        let mut maxp = Vec::new();
        be32(&mut maxp, 0x0000_5000);
        be16(&mut maxp, 3);

        // Table records must be sorted by tag.
        let tables = vec![
            Table { tag: *b"cmap", body: cmap },
            Table { tag: *b"head", body: head },
            Table { tag: *b"hhea", body: hhea },
            Table { tag: *b"hmtx", body: hmtx },
            Table { tag: *b"maxp", body: maxp },
        ];

        let mut out = Vec::new();
        be32(&mut out, 0x0001_0000);
        be16(&mut out, tables.len() as u16);
        out.extend_from_slice(&[0u8; 6]);
        let mut offset = 12 + tables.len() * 16;
        let mut bodies = Vec::new();
        for table in &tables {
            out.extend_from_slice(&table.tag);
            be32(&mut out, 0);
            be32(&mut out, offset as u32);
            be32(&mut out, table.body.len() as u32);
            offset += table.body.len();
            bodies.extend_from_slice(&table.body);
        }
        out.extend_from_slice(&bodies);
        out
    }

    #[test]
    fn test_parse_and_lookup() {
        let face = TrueTypeFace::parse(sample_font()).unwrap();
        assert_eq!(face.glyph_id('A'), 1);
        assert_eq!(face.glyph_id('\u{4F60}'), 2);
        assert_eq!(face.glyph_id('B'), 0);
        assert_eq!(face.glyph_id('\u{1F600}'), 0);
        assert_eq!(face.glyph_ids("A\u{4F60}B"), vec![1, 2, 0]);
    }

    #[test]
    fn test_metrics_are_scaled_to_thousandths() {
        let face = TrueTypeFace::parse(sample_font()).unwrap();
        assert_eq!(face.advance(0), 500);
        assert_eq!(face.advance(1), 600);
        assert_eq!(face.advance(2), 1000);
        // Glyph ids past the face fall back to a full em.
        assert_eq!(face.advance(u16::MAX), 1000);
        assert_eq!(face.ascent(), 781);
        assert_eq!(face.descent(), -195);
        assert_eq!(face.bbox(), [-48, -195, 976, 878]);
    }

    #[test]
    fn test_rejects_collections_and_garbage() {
        let mut ttc = b"ttcf".to_vec();
        ttc.extend_from_slice(&[0u8; 16]);
        assert!(matches!(
            TrueTypeFace::parse(ttc),
            Err(FontError::Unsupported(_))
        ));
        let mut otto = sample_font();
        otto[..4].copy_from_slice(b"OTTO");
        assert!(matches!(
            TrueTypeFace::parse(otto),
            Err(FontError::Unsupported(_))
        ));

        assert!(matches!(
            TrueTypeFace::parse(b"not a font".to_vec()),
            Err(FontError::Parse(_))
        ));
        assert!(TrueTypeFace::parse(Vec::new()).is_err());
    }

    #[test]
    fn test_wide_advances_do_not_wrap() {
        // 16 units per em makes a 65535-unit advance far wider than u16.
        assert_eq!(scale_advance(65535, 16), u16::MAX);
        assert_eq!(scale_advance(2048, 2048), 1000);
    }
}
