use crate::error::RasterError;
use crate::glyph::{Glyph, GlyphBounds, GlyphKind, GlyphPoint};
use crate::reader::TableReader;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SFNT_TRUETYPE: u32 = 0x0001_0000;
const SFNT_APPLE_TRUE: u32 = 0x7472_7565; // 'true'

const FLAG_ON_CURVE: u8 = 0x01;
const FLAG_X_SHORT: u8 = 0x02;
const FLAG_Y_SHORT: u8 = 0x04;
const FLAG_REPEAT: u8 = 0x08;
const FLAG_X_SAME_OR_POSITIVE: u8 = 0x10;
const FLAG_Y_SAME_OR_POSITIVE: u8 = 0x20;

/// Identity of a font's bytes, used in render cache keys.
///
/// Derived from a SHA-256 digest so the same file loaded twice shares cache
/// entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FontId(pub u64);

impl FontId {
    pub fn of_bytes(data: &[u8]) -> FontId {
        let digest = Sha256::digest(data);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        FontId(u64::from_be_bytes(head))
    }
}

impl fmt::Display for FontId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

#[derive(Debug, Clone, Copy)]
struct TableRecord {
    tag: [u8; 4],
    offset: usize,
    length: usize,
}

#[derive(Debug, Clone, Copy)]
struct HeadTable {
    units_per_em: u16,
    bounds: GlyphBounds,
    long_loca: bool,
}

#[derive(Debug, Clone, Copy)]
struct HheaTable {
    ascender: i16,
    descender: i16,
    line_gap: i16,
    number_of_hmetrics: u16,
}

#[derive(Debug, Clone, Default)]
pub struct FontNames {
    pub family: Option<String>,
    pub subfamily: Option<String>,
    pub full_name: Option<String>,
    pub postscript_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmapFormat {
    ByteEncoding,
    SegmentToDelta,
    Trimmed,
    SegmentedCoverage,
}

#[derive(Debug, Clone, Copy)]
struct CmapSubtable {
    offset: usize,
    format: CmapFormat,
}

/// A parsed TrueType font.
///
/// Table offsets are validated up front; glyph outlines are decoded lazily
/// and cached per character for the lifetime of the font.
pub struct TrueTypeFont {
    data: Vec<u8>,
    id: FontId,
    tables: Vec<TableRecord>,
    head: HeadTable,
    hhea: HheaTable,
    num_glyphs: u16,
    names: FontNames,
    cmap: Option<CmapSubtable>,
    glyph_cache: Mutex<HashMap<char, Option<Arc<Glyph>>>>,
}

impl fmt::Debug for TrueTypeFont {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrueTypeFont")
            .field("id", &self.id)
            .field("family", &self.names.family)
            .field("units_per_em", &self.head.units_per_em)
            .field("num_glyphs", &self.num_glyphs)
            .finish()
    }
}

impl TrueTypeFont {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RasterError> {
        let data = std::fs::read(path)?;
        Self::parse(data)
    }

    pub fn parse(data: Vec<u8>) -> Result<Self, RasterError> {
        let tables = parse_table_directory(&data)?;
        let id = FontId::of_bytes(&data);

        let head = {
            let slice = table_slice(&data, &tables, b"head")?
                .ok_or(RasterError::MissingTable("head"))?;
            parse_head(slice)?
        };
        let hhea = {
            let slice = table_slice(&data, &tables, b"hhea")?
                .ok_or(RasterError::MissingTable("hhea"))?;
            parse_hhea(slice)?
        };
        let num_glyphs = {
            let slice = table_slice(&data, &tables, b"maxp")?
                .ok_or(RasterError::MissingTable("maxp"))?;
            let mut r = TableReader::at(slice, 4)?;
            r.u16()?
        };
        let hmtx = table_slice(&data, &tables, b"hmtx")?.ok_or(RasterError::MissingTable("hmtx"))?;
        if hhea.number_of_hmetrics == 0 || hmtx.len() < hhea.number_of_hmetrics as usize * 4 {
            return Err(RasterError::MalformedFont(format!(
                "hmtx holds {} bytes but hhea declares {} metrics",
                hmtx.len(),
                hhea.number_of_hmetrics
            )));
        }
        if table_slice(&data, &tables, b"loca")?.is_none() {
            return Err(RasterError::MissingTable("loca"));
        }
        if table_slice(&data, &tables, b"glyf")?.is_none() {
            return Err(RasterError::MissingTable("glyf"));
        }
        let names = match table_slice(&data, &tables, b"name")? {
            Some(slice) => parse_names(slice)?,
            None => FontNames::default(),
        };
        let cmap = match table_slice(&data, &tables, b"cmap")? {
            Some(slice) => select_cmap_subtable(slice)?,
            None => None,
        };
        if cmap.is_none() {
            log::warn!("font {id} has no usable cmap subtable; characters will not map");
        }

        Ok(Self {
            data,
            id,
            tables,
            head,
            hhea,
            num_glyphs,
            names,
            cmap,
            glyph_cache: Mutex::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> FontId {
        self.id
    }

    pub fn names(&self) -> &FontNames {
        &self.names
    }

    pub fn family_name(&self) -> Option<&str> {
        self.names.family.as_deref()
    }

    /// Design units per em; the denominator for every scale computation.
    pub fn height(&self) -> u16 {
        self.head.units_per_em
    }

    pub fn ascender(&self) -> i16 {
        self.hhea.ascender
    }

    pub fn descender(&self) -> i16 {
        self.hhea.descender
    }

    pub fn line_gap(&self) -> i16 {
        self.hhea.line_gap
    }

    pub fn num_glyphs(&self) -> u16 {
        self.num_glyphs
    }

    pub fn number_of_hmetrics(&self) -> u16 {
        self.hhea.number_of_hmetrics
    }

    pub fn bounds(&self) -> GlyphBounds {
        self.head.bounds
    }

    fn table(&self, tag: &[u8; 4]) -> Option<&[u8]> {
        self.tables
            .iter()
            .find(|t| &t.tag == tag)
            .map(|t| &self.data[t.offset..t.offset + t.length])
    }

    /// Advance width of glyph `index`. Glyphs past the last long metric share
    /// its advance, which is how monospaced fonts compress `hmtx`.
    pub fn glyph_width(&self, index: u16) -> u16 {
        let Some(hmtx) = self.table(b"hmtx") else {
            return 0;
        };
        let count = self.hhea.number_of_hmetrics;
        let entry = index.min(count.saturating_sub(1)) as usize;
        TableReader::at(hmtx, entry * 4)
            .and_then(|mut r| r.ufword())
            .unwrap_or(0)
    }

    pub fn left_side_bearing(&self, index: u16) -> i16 {
        let Some(hmtx) = self.table(b"hmtx") else {
            return 0;
        };
        let count = self.hhea.number_of_hmetrics as usize;
        let offset = if (index as usize) < count {
            index as usize * 4 + 2
        } else {
            count * 4 + (index as usize - count) * 2
        };
        TableReader::at(hmtx, offset)
            .and_then(|mut r| r.fword())
            .unwrap_or(0)
    }

    /// Maps a character through the selected `cmap` subtable; 0 means unmapped.
    pub fn glyph_index(&self, ch: char) -> Result<u16, RasterError> {
        let (Some(cmap), Some(table)) = (self.cmap, self.table(b"cmap")) else {
            return Ok(0);
        };
        let code = ch as u32;
        let index = match cmap.format {
            CmapFormat::ByteEncoding => lookup_format0(table, cmap.offset, code)?,
            CmapFormat::SegmentToDelta => lookup_format4(table, cmap.offset, code)?,
            CmapFormat::Trimmed => lookup_format6(table, cmap.offset, code)?,
            CmapFormat::SegmentedCoverage => lookup_format12(table, cmap.offset, code)?,
        };
        if index >= self.num_glyphs {
            return Ok(0);
        }
        Ok(index)
    }

    /// Decodes the outline for `ch`.
    ///
    /// `Ok(None)` means there is nothing to draw: the character is unmapped
    /// or the glyph is composite.
    pub fn read_glyph(&self, ch: char) -> Result<Option<Arc<Glyph>>, RasterError> {
        if let Ok(cache) = self.glyph_cache.lock() {
            if let Some(entry) = cache.get(&ch) {
                return Ok(entry.clone());
            }
        }
        let index = self.glyph_index(ch)?;
        let glyph = if index == 0 {
            None
        } else {
            self.read_glyph_index(index)?
                .filter(|g| g.kind == GlyphKind::Simple)
                .map(|g| Arc::new(g.with_character(ch)))
        };
        if let Ok(mut cache) = self.glyph_cache.lock() {
            cache.insert(ch, glyph.clone());
        }
        Ok(glyph)
    }

    /// Decodes glyph `index` without consulting the character map.
    /// Composite glyphs come back with no points and `GlyphKind::Composite`.
    pub fn read_glyph_index(&self, index: u16) -> Result<Option<Glyph>, RasterError> {
        if index >= self.num_glyphs {
            return Ok(None);
        }
        let loca = self.table(b"loca").ok_or(RasterError::MissingTable("loca"))?;
        let glyf = self.table(b"glyf").ok_or(RasterError::MissingTable("glyf"))?;
        let (start, end) = glyph_range(loca, index, self.head.long_loca)?;
        let advance = self.glyph_width(index);
        let lsb = self.left_side_bearing(index);
        if start == end {
            let glyph = Glyph::empty(self.id, index, GlyphKind::Simple).with_metrics(
                advance,
                lsb,
                self.hhea.ascender,
            );
            return Ok(Some(glyph));
        }
        if start > end || end > glyf.len() {
            return Err(RasterError::MalformedFont(format!(
                "glyph {index} spans {start}..{end} outside glyf ({} bytes)",
                glyf.len()
            )));
        }
        let glyph = decode_glyph(&glyf[start..end], self.id, index)?;
        Ok(Some(glyph.with_metrics(advance, lsb, self.hhea.ascender)))
    }
}

fn parse_table_directory(data: &[u8]) -> Result<Vec<TableRecord>, RasterError> {
    let mut r = TableReader::new(data);
    let signature = r.u32().map_err(|_| RasterError::NotTrueType)?;
    if signature != SFNT_TRUETYPE && signature != SFNT_APPLE_TRUE {
        return Err(RasterError::NotTrueType);
    }
    let num_tables = r.u16()?;
    r.skip(6)?;
    let mut tables = Vec::with_capacity(num_tables as usize);
    for _ in 0..num_tables {
        let tag = r.tag()?;
        let _checksum = r.u32()?;
        let offset = r.u32()? as usize;
        let length = r.u32()? as usize;
        let end = offset.checked_add(length).filter(|end| *end <= data.len());
        if end.is_none() {
            return Err(RasterError::MalformedFont(format!(
                "table '{}' at {}+{} exceeds file size {}",
                String::from_utf8_lossy(&tag),
                offset,
                length,
                data.len()
            )));
        }
        tables.push(TableRecord {
            tag,
            offset,
            length,
        });
    }
    Ok(tables)
}

fn table_slice<'a>(
    data: &'a [u8],
    tables: &[TableRecord],
    tag: &[u8; 4],
) -> Result<Option<&'a [u8]>, RasterError> {
    let Some(record) = tables.iter().find(|t| &t.tag == tag) else {
        return Ok(None);
    };
    data.get(record.offset..record.offset + record.length)
        .map(Some)
        .ok_or_else(|| {
            RasterError::MalformedFont(format!(
                "table '{}' out of bounds",
                String::from_utf8_lossy(tag)
            ))
        })
}

fn parse_head(data: &[u8]) -> Result<HeadTable, RasterError> {
    let mut r = TableReader::at(data, 18)?;
    let units_per_em = r.u16()?;
    if units_per_em == 0 {
        return Err(RasterError::MalformedFont("head.unitsPerEm is zero".to_string()));
    }
    r.seek(36)?;
    let x_min = r.fword()? as f32;
    let y_min = r.fword()? as f32;
    let x_max = r.fword()? as f32;
    let y_max = r.fword()? as f32;
    r.seek(50)?;
    let long_loca = r.i16()? != 0;
    Ok(HeadTable {
        units_per_em,
        bounds: GlyphBounds {
            x_min,
            y_min,
            x_max,
            y_max,
        },
        long_loca,
    })
}

fn parse_hhea(data: &[u8]) -> Result<HheaTable, RasterError> {
    let mut r = TableReader::at(data, 4)?;
    let ascender = r.fword()?;
    let descender = r.fword()?;
    let line_gap = r.fword()?;
    r.seek(34)?;
    let number_of_hmetrics = r.u16()?;
    Ok(HheaTable {
        ascender,
        descender,
        line_gap,
        number_of_hmetrics,
    })
}

fn parse_names(data: &[u8]) -> Result<FontNames, RasterError> {
    let mut r = TableReader::new(data);
    let _format = r.u16()?;
    let count = r.u16()?;
    let string_offset = r.u16()? as usize;
    let mut names = FontNames::default();
    // Lower rank wins: Windows English, any Windows/Unicode, then Mac.
    let mut ranks: HashMap<u16, u8> = HashMap::new();
    for _ in 0..count {
        let platform = r.u16()?;
        let _encoding = r.u16()?;
        let language = r.u16()?;
        let name_id = r.u16()?;
        let length = r.u16()? as usize;
        let offset = r.u16()? as usize;
        if !matches!(name_id, 1 | 2 | 4 | 6) {
            continue;
        }
        let rank = match (platform, language) {
            (3, 0x0409) => 0,
            (3, _) | (0, _) => 1,
            (1, _) => 2,
            _ => continue,
        };
        if ranks.get(&name_id).is_some_and(|best| *best <= rank) {
            continue;
        }
        r.push(string_offset + offset)?;
        let raw = r.bytes(length)?;
        r.pop();
        let text = if platform == 1 {
            raw.iter().map(|b| *b as char).collect::<String>()
        } else {
            let units: Vec<u16> = raw
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        };
        if text.is_empty() {
            continue;
        }
        ranks.insert(name_id, rank);
        match name_id {
            1 => names.family = Some(text),
            2 => names.subfamily = Some(text),
            4 => names.full_name = Some(text),
            _ => names.postscript_name = Some(text),
        }
    }
    Ok(names)
}

fn select_cmap_subtable(data: &[u8]) -> Result<Option<CmapSubtable>, RasterError> {
    let mut r = TableReader::new(data);
    let _version = r.u16()?;
    let count = r.u16()?;
    let mut best: Option<(u8, CmapSubtable)> = None;
    for _ in 0..count {
        let platform = r.u16()?;
        let encoding = r.u16()?;
        let offset = r.u32()? as usize;
        let format = {
            let mut sub = TableReader::at(data, offset)?;
            sub.u16()?
        };
        let format = match format {
            0 => CmapFormat::ByteEncoding,
            4 => CmapFormat::SegmentToDelta,
            6 => CmapFormat::Trimmed,
            12 => CmapFormat::SegmentedCoverage,
            other => {
                log::debug!("skipping cmap subtable format {other}");
                continue;
            }
        };
        let rank = match (platform, encoding) {
            (3, 10) => 0,
            (0, 4) | (0, 6) => 1,
            (3, 1) => 2,
            (0, _) => 3,
            (3, 0) => 4,
            (1, 0) => 5,
            _ => continue,
        };
        if best.as_ref().is_none_or(|(r, _)| rank < *r) {
            best = Some((rank, CmapSubtable { offset, format }));
        }
    }
    Ok(best.map(|(_, sub)| sub))
}

fn lookup_format0(data: &[u8], offset: usize, code: u32) -> Result<u16, RasterError> {
    if code > 255 {
        return Ok(0);
    }
    let mut r = TableReader::at(data, offset + 6 + code as usize)?;
    Ok(r.u8()? as u16)
}

fn lookup_format4(data: &[u8], offset: usize, code: u32) -> Result<u16, RasterError> {
    if code > 0xFFFF {
        return Ok(0);
    }
    let code = code as u16;
    let mut r = TableReader::at(data, offset + 6)?;
    let seg_count = (r.u16()? / 2) as usize;
    let end_codes = offset + 14;
    let start_codes = end_codes + seg_count * 2 + 2;
    let id_deltas = start_codes + seg_count * 2;
    let id_range_offsets = id_deltas + seg_count * 2;
    for seg in 0..seg_count {
        r.seek(end_codes + seg * 2)?;
        let end = r.u16()?;
        if end < code {
            continue;
        }
        r.seek(start_codes + seg * 2)?;
        let start = r.u16()?;
        if start > code {
            return Ok(0);
        }
        r.seek(id_deltas + seg * 2)?;
        let delta = r.u16()?;
        let range_pos = id_range_offsets + seg * 2;
        r.seek(range_pos)?;
        let range_offset = r.u16()? as usize;
        if range_offset == 0 {
            return Ok(code.wrapping_add(delta));
        }
        let glyph_pos = range_pos + range_offset + (code - start) as usize * 2;
        r.seek(glyph_pos)?;
        let glyph = r.u16()?;
        if glyph == 0 {
            return Ok(0);
        }
        return Ok(glyph.wrapping_add(delta));
    }
    Ok(0)
}

fn lookup_format6(data: &[u8], offset: usize, code: u32) -> Result<u16, RasterError> {
    let mut r = TableReader::at(data, offset + 6)?;
    let first = r.u16()? as u32;
    let count = r.u16()? as u32;
    if code < first || code >= first + count {
        return Ok(0);
    }
    r.skip(((code - first) * 2) as usize)?;
    r.u16()
}

fn lookup_format12(data: &[u8], offset: usize, code: u32) -> Result<u16, RasterError> {
    let mut r = TableReader::at(data, offset + 12)?;
    let groups = r.u32()?;
    for _ in 0..groups {
        let start = r.u32()?;
        let end = r.u32()?;
        let start_glyph = r.u32()?;
        if code >= start && code <= end {
            let glyph = start_glyph + (code - start);
            return Ok(u16::try_from(glyph).unwrap_or(0));
        }
    }
    Ok(0)
}

fn glyph_range(loca: &[u8], index: u16, long: bool) -> Result<(usize, usize), RasterError> {
    let i = index as usize;
    if long {
        let mut r = TableReader::at(loca, i * 4)?;
        Ok((r.u32()? as usize, r.u32()? as usize))
    } else {
        let mut r = TableReader::at(loca, i * 2)?;
        Ok((r.u16()? as usize * 2, r.u16()? as usize * 2))
    }
}

fn decode_glyph(data: &[u8], font: FontId, index: u16) -> Result<Glyph, RasterError> {
    let mut r = TableReader::new(data);
    let contour_count = r.i16()?;
    let bounds = GlyphBounds {
        x_min: r.fword()? as f32,
        y_min: r.fword()? as f32,
        x_max: r.fword()? as f32,
        y_max: r.fword()? as f32,
    };
    if contour_count < 0 {
        let mut glyph = Glyph::empty(font, index, GlyphKind::Composite);
        glyph.bounds = bounds;
        return Ok(glyph);
    }

    let mut contour_ends = Vec::with_capacity(contour_count as usize);
    for _ in 0..contour_count {
        contour_ends.push(r.u16()?);
    }
    let point_count = contour_ends.last().map(|e| *e as usize + 1).unwrap_or(0);
    let instruction_len = r.u16()? as usize;
    r.skip(instruction_len)?;

    let mut flags = Vec::with_capacity(point_count);
    while flags.len() < point_count {
        let flag = r.u8()?;
        flags.push(flag);
        if flag & FLAG_REPEAT != 0 {
            let repeat = r.u8()?;
            for _ in 0..repeat {
                flags.push(flag);
            }
        }
    }
    flags.truncate(point_count);

    let xs = read_coordinates(&mut r, &flags, FLAG_X_SHORT, FLAG_X_SAME_OR_POSITIVE)?;
    let ys = read_coordinates(&mut r, &flags, FLAG_Y_SHORT, FLAG_Y_SAME_OR_POSITIVE)?;
    let points = flags
        .iter()
        .zip(xs.iter().zip(ys.iter()))
        .map(|(flag, (x, y))| GlyphPoint::new(*x as f32, *y as f32, flag & FLAG_ON_CURVE != 0))
        .collect();
    Glyph::new(font, index, GlyphKind::Simple, bounds, points, contour_ends)
}

fn read_coordinates(
    r: &mut TableReader<'_>,
    flags: &[u8],
    short_bit: u8,
    same_bit: u8,
) -> Result<Vec<i32>, RasterError> {
    let mut out = Vec::with_capacity(flags.len());
    let mut value = 0i32;
    for flag in flags {
        if flag & short_bit != 0 {
            let delta = r.u8()? as i32;
            value += if flag & same_bit != 0 { delta } else { -delta };
        } else if flag & same_bit == 0 {
            value += r.i16()? as i32;
        }
        out.push(value);
    }
    Ok(out)
}
