use crate::config::RenderConfig;
use crate::error::RasterError;
use crate::truetype::TrueTypeFont;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

const MAX_SCAN_DEPTH: usize = 4;

/// Name-to-font lookup over a set of directories plus fonts registered from
/// memory.
///
/// Directories are scanned once, on the first lookup that misses the
/// in-memory registrations. Loaded fonts are shared by path for the life of
/// the catalog.
pub struct FontCatalog {
    dirs: Vec<PathBuf>,
    index: OnceLock<HashMap<String, PathBuf>>,
    loaded: Mutex<HashMap<PathBuf, Arc<TrueTypeFont>>>,
    registered: Mutex<HashMap<String, Arc<TrueTypeFont>>>,
}

impl std::fmt::Debug for FontCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontCatalog")
            .field("dirs", &self.dirs)
            .field("scanned", &self.index.get().is_some())
            .finish_non_exhaustive()
    }
}

impl FontCatalog {
    pub fn new(dirs: Vec<PathBuf>) -> Self {
        Self {
            dirs,
            index: OnceLock::new(),
            loaded: Mutex::new(HashMap::new()),
            registered: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &RenderConfig) -> Self {
        let mut dirs = config.all_font_dirs();
        if config.system_fonts {
            for dir in system_font_dirs() {
                if !dirs.contains(&dir) {
                    dirs.push(dir);
                }
            }
        }
        Self::new(dirs)
    }

    pub fn dirs(&self) -> &[PathBuf] {
        &self.dirs
    }

    /// Parses `data` and makes it resolvable by its own names and `alias`.
    pub fn register_bytes(
        &self,
        data: Vec<u8>,
        alias: Option<&str>,
    ) -> Result<Arc<TrueTypeFont>, RasterError> {
        let font = Arc::new(TrueTypeFont::parse(data)?);
        let names = font.names();
        let keys = [
            alias.map(str::to_string),
            names.family.clone(),
            names.full_name.clone(),
            names.postscript_name.clone(),
        ];
        if let Ok(mut registered) = self.registered.lock() {
            for key in keys.into_iter().flatten() {
                let key = normalize_name(&key);
                if !key.is_empty() {
                    registered.entry(key).or_insert_with(|| font.clone());
                }
            }
        }
        Ok(font)
    }

    /// Looks `name` up by family, full or PostScript name. Subset prefixes
    /// (`ABCDEF+`) and `MT`/`PS` suffixes are ignored.
    ///
    /// `Ok(None)` means no font answers to the name; an error means a match
    /// was found but could not be read.
    pub fn resolve(&self, name: &str) -> Result<Option<Arc<TrueTypeFont>>, RasterError> {
        let candidates = name_candidates(name);
        if let Ok(registered) = self.registered.lock() {
            for key in &candidates {
                if let Some(font) = registered.get(key) {
                    return Ok(Some(font.clone()));
                }
            }
        }
        let index = self.index();
        for key in &candidates {
            if let Some(path) = index.get(key) {
                return self.load_path(path).map(Some);
            }
        }
        log::debug!("no font in catalog for {name:?}");
        Ok(None)
    }

    /// Loads `path`, sharing the parsed font with earlier loads.
    pub fn load_path(&self, path: &Path) -> Result<Arc<TrueTypeFont>, RasterError> {
        if let Ok(loaded) = self.loaded.lock() {
            if let Some(font) = loaded.get(path) {
                return Ok(font.clone());
            }
        }
        let font = Arc::new(TrueTypeFont::from_file(path)?);
        if let Ok(mut loaded) = self.loaded.lock() {
            let entry = loaded.entry(path.to_path_buf()).or_insert(font);
            return Ok(entry.clone());
        }
        Ok(font)
    }

    /// Normalized names known from the directory scan, sorted.
    pub fn indexed_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.index().keys().cloned().collect();
        names.sort();
        names
    }

    fn index(&self) -> &HashMap<String, PathBuf> {
        self.index.get_or_init(|| {
            let mut index = HashMap::new();
            for dir in &self.dirs {
                scan_dir(dir, 0, &mut index);
            }
            log::debug!(
                "font catalog indexed {} names from {} directories",
                index.len(),
                self.dirs.len()
            );
            index
        })
    }
}

fn scan_dir(dir: &Path, depth: usize, index: &mut HashMap<String, PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
    paths.sort();
    for path in paths {
        if path.is_dir() {
            if depth < MAX_SCAN_DEPTH {
                scan_dir(&path, depth + 1, index);
            }
        } else if path.is_file() {
            index_file(&path, index);
        }
    }
}

fn index_file(path: &Path, index: &mut HashMap<String, PathBuf>) {
    let Some(ext) = path.extension().and_then(|v| v.to_str()) else {
        return;
    };
    let ext = ext.to_ascii_lowercase();
    if ext != "ttf" && ext != "otf" {
        return;
    }
    let Ok(data) = fs::read(path) else {
        return;
    };
    let Ok(face) = ttf_parser::Face::parse(&data, 0) else {
        return;
    };
    // Only glyf outlines can be rasterised.
    if face.tables().glyf.is_none() {
        return;
    }
    for name in font_names(&face, path) {
        let key = normalize_name(&name);
        if key.is_empty() {
            continue;
        }
        index.entry(key).or_insert_with(|| path.to_path_buf());
    }
}

fn font_names(face: &ttf_parser::Face<'_>, path: &Path) -> Vec<String> {
    use ttf_parser::name::name_id;

    let mut names = Vec::new();
    for entry in face.names() {
        let Some(name) = entry.to_string() else {
            continue;
        };
        match entry.name_id {
            name_id::TYPOGRAPHIC_FAMILY
            | name_id::FAMILY
            | name_id::FULL_NAME
            | name_id::POST_SCRIPT_NAME => names.push(name),
            _ => {}
        }
    }
    if let Some(stem) = path.file_stem().and_then(|v| v.to_str()) {
        names.push(stem.to_string());
    }
    names
}

pub fn system_font_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();

    #[cfg(target_os = "windows")]
    {
        dirs.push(PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(PathBuf::from("/usr/share/fonts"));
        dirs.push(PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join(".fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(PathBuf::from("/System/Library/Fonts"));
        dirs.push(PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(PathBuf::from(home).join("Library/Fonts"));
        }
    }

    dirs
}

/// Lowercased, quote- and separator-free form of a font name, without any
/// six-letter subset tag.
pub fn normalize_name(name: &str) -> String {
    let name = name.trim().trim_matches('"').trim_matches('\'');
    let name = strip_subset_prefix(name);
    name.chars()
        .filter(|c| !matches!(c, ' ' | '-' | '_' | ','))
        .flat_map(char::to_lowercase)
        .collect()
}

fn strip_subset_prefix(name: &str) -> &str {
    match name.split_once('+') {
        Some((tag, rest)) if tag.len() == 6 && tag.bytes().all(|b| b.is_ascii_uppercase()) => rest,
        _ => name,
    }
}

fn name_candidates(name: &str) -> Vec<String> {
    let base = normalize_name(name);
    let mut out = vec![base.clone()];
    for suffix in ["mt", "ps", "regular", "roman"] {
        if let Some(stem) = base.strip_suffix(suffix) {
            if !stem.is_empty() && !out.iter().any(|c| c == stem) {
                out.push(stem.to_string());
            }
        }
    }
    out
}
