//! In-memory TrueType fixture for tests.
//!
//! Glyphs: 0 `.notdef` (empty), 1 `A` (triangle with a triangular counter),
//! 2 space (empty), 3 `C` (composite referencing `A`), 4 `O` (quadratic
//! square-ish ring with off-curve corners).

pub(crate) const UNITS_PER_EM: u16 = 2048;
pub(crate) const FAMILY: &str = "Glyphcast Test";

struct SimpleGlyph {
    contours: Vec<Vec<(i16, i16, bool)>>,
}

pub(crate) fn build() -> Vec<u8> {
    build_named(FAMILY)
}

pub(crate) fn build_named(family: &str) -> Vec<u8> {
    let a = SimpleGlyph {
        contours: vec![
            vec![(0, 0, true), (600, 1400, true), (1200, 0, true)],
            vec![(400, 300, true), (800, 300, true), (600, 800, true)],
        ],
    };
    let o = SimpleGlyph {
        contours: vec![vec![
            (600, 0, true),
            (0, 0, false),
            (0, 700, true),
            (0, 1400, false),
            (600, 1400, true),
            (1200, 1400, false),
            (1200, 700, true),
            (1200, 0, false),
        ]],
    };

    let glyphs: Vec<Vec<u8>> = vec![
        Vec::new(),
        encode_simple(&a),
        Vec::new(),
        encode_composite(1),
        encode_simple(&o),
    ];

    let mut glyf = Vec::new();
    let mut loca = Vec::new();
    for g in &glyphs {
        loca.extend_from_slice(&(glyf.len() as u32).to_be_bytes());
        glyf.extend_from_slice(g);
        while glyf.len() % 4 != 0 {
            glyf.push(0);
        }
    }
    loca.extend_from_slice(&(glyf.len() as u32).to_be_bytes());

    let tables: Vec<([u8; 4], Vec<u8>)> = vec![
        (*b"cmap", cmap()),
        (*b"glyf", glyf),
        (*b"head", head()),
        (*b"hhea", hhea(3)),
        (*b"hmtx", hmtx()),
        (*b"loca", loca),
        (*b"maxp", maxp(glyphs.len() as u16)),
        (*b"name", name(family)),
    ];
    assemble(tables)
}

fn assemble(tables: Vec<([u8; 4], Vec<u8>)>) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&(tables.len() as u16).to_be_bytes());
    out.extend_from_slice(&[0u8; 6]);
    let mut offset = 12 + tables.len() * 16;
    let mut body = Vec::new();
    for (tag, data) in &tables {
        out.extend_from_slice(tag);
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&(offset as u32).to_be_bytes());
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        body.extend_from_slice(data);
        while body.len() % 4 != 0 {
            body.push(0);
        }
        offset = 12 + tables.len() * 16 + body.len();
    }
    out.extend_from_slice(&body);
    out
}

fn be16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn bei16(out: &mut Vec<u8>, v: i16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn encode_simple(glyph: &SimpleGlyph) -> Vec<u8> {
    let all: Vec<(i16, i16, bool)> = glyph.contours.iter().flatten().copied().collect();
    let mut out = Vec::new();
    bei16(&mut out, glyph.contours.len() as i16);
    let x_min = all.iter().map(|p| p.0).min().unwrap_or(0);
    let y_min = all.iter().map(|p| p.1).min().unwrap_or(0);
    let x_max = all.iter().map(|p| p.0).max().unwrap_or(0);
    let y_max = all.iter().map(|p| p.1).max().unwrap_or(0);
    for v in [x_min, y_min, x_max, y_max] {
        bei16(&mut out, v);
    }
    let mut end = 0u16;
    for c in &glyph.contours {
        end += c.len() as u16;
        be16(&mut out, end - 1);
    }
    be16(&mut out, 0);
    for p in &all {
        out.push(if p.2 { 0x01 } else { 0x00 });
    }
    let mut prev = 0i16;
    for p in &all {
        bei16(&mut out, p.0 - prev);
        prev = p.0;
    }
    prev = 0;
    for p in &all {
        bei16(&mut out, p.1 - prev);
        prev = p.1;
    }
    out
}

fn encode_composite(component: u16) -> Vec<u8> {
    let mut out = Vec::new();
    bei16(&mut out, -1);
    for v in [0i16, 0, 1200, 1400] {
        bei16(&mut out, v);
    }
    be16(&mut out, 0x0001 | 0x0002);
    be16(&mut out, component);
    bei16(&mut out, 0);
    bei16(&mut out, 0);
    out
}

fn head() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.extend_from_slice(&0x5F0F_3CF5u32.to_be_bytes());
    be16(&mut out, 0);
    be16(&mut out, UNITS_PER_EM);
    out.extend_from_slice(&[0u8; 16]);
    for v in [0i16, -400, 1200, 1600] {
        bei16(&mut out, v);
    }
    be16(&mut out, 0);
    be16(&mut out, 8);
    bei16(&mut out, 2);
    bei16(&mut out, 1);
    bei16(&mut out, 0);
    debug_assert_eq!(out.len(), 54);
    out
}

fn hhea(metrics: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x0001_0000u32.to_be_bytes());
    bei16(&mut out, 1600);
    bei16(&mut out, -400);
    bei16(&mut out, 0);
    be16(&mut out, 1200);
    out.extend_from_slice(&[0u8; 22]);
    be16(&mut out, metrics);
    debug_assert_eq!(out.len(), 36);
    out
}

fn hmtx() -> Vec<u8> {
    let mut out = Vec::new();
    for (advance, lsb) in [(500u16, 0i16), (1200, 0), (600, 0)] {
        be16(&mut out, advance);
        bei16(&mut out, lsb);
    }
    bei16(&mut out, 0);
    bei16(&mut out, 30);
    out
}

fn maxp(num_glyphs: u16) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x0000_5000u32.to_be_bytes());
    be16(&mut out, num_glyphs);
    out
}

fn cmap() -> Vec<u8> {
    // (code, glyph) pairs, one segment each, plus the mandatory 0xFFFF.
    let mut segments: Vec<(u16, u16)> = vec![(0x20, 2), (0x41, 1), (0x43, 3), (0x4F, 4)];
    segments.push((0xFFFF, 0));
    let seg_count = segments.len() as u16;

    let mut sub = Vec::new();
    be16(&mut sub, 4);
    be16(&mut sub, 0);
    be16(&mut sub, 0);
    be16(&mut sub, seg_count * 2);
    be16(&mut sub, 0);
    be16(&mut sub, 0);
    be16(&mut sub, 0);
    for (code, _) in &segments {
        be16(&mut sub, *code);
    }
    be16(&mut sub, 0);
    for (code, _) in &segments {
        be16(&mut sub, *code);
    }
    for (code, glyph) in &segments {
        let delta = if *code == 0xFFFF {
            1
        } else {
            glyph.wrapping_sub(*code)
        };
        be16(&mut sub, delta);
    }
    for _ in &segments {
        be16(&mut sub, 0);
    }
    let len = sub.len() as u16;
    sub[2..4].copy_from_slice(&len.to_be_bytes());

    let mut out = Vec::new();
    be16(&mut out, 0);
    be16(&mut out, 1);
    be16(&mut out, 3);
    be16(&mut out, 1);
    out.extend_from_slice(&12u32.to_be_bytes());
    out.extend_from_slice(&sub);
    out
}

fn name(family: &str) -> Vec<u8> {
    let full = format!("{family} Regular");
    let strings: Vec<(u16, Vec<u8>)> = vec![
        (1, utf16(family)),
        (2, utf16("Regular")),
        (4, utf16(&full)),
    ];
    let mut out = Vec::new();
    be16(&mut out, 0);
    be16(&mut out, strings.len() as u16);
    be16(&mut out, 6 + 12 * strings.len() as u16);
    let mut storage = Vec::new();
    for (id, data) in &strings {
        be16(&mut out, 3);
        be16(&mut out, 1);
        be16(&mut out, 0x0409);
        be16(&mut out, *id);
        be16(&mut out, data.len() as u16);
        be16(&mut out, storage.len() as u16);
        storage.extend_from_slice(data);
    }
    out.extend_from_slice(&storage);
    out
}

fn utf16(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
}
