//! Semantic file types and the extensions they cover

use tracing::warn;

/// Every known type with its lowercase, dot-prefixed extensions
const CATALOG: &[(&str, &[&str])] = &[
    ("archive", &[".zip", ".rar"]),
    ("audio", &[".mp3"]),
    ("binary", &[".exe", ".dll"]),
    // .mdi is a Microsoft scanned document
    ("bitmap", &[".cr2", ".bmp", ".gif", ".jpg", ".jpeg", ".png", ".tif", ".tiff", ".ico", ".mdi"]),
    ("cad", &[".dwg", ".lcf"]),
    ("config", &[".ini", ".conf", ".yml"]),
    ("database", &[".accdb", ".mdb", ".sql", ".sqlite"]),
    ("document", &[".pdf", ".xls", ".xlsx", ".doc", ".docx", ".ppt", ".pptx", ".odt", ".ods"]),
    ("font", &[".otf", ".ttf"]),
    ("others", &[".msg", ".tmp", ".lnk"]),
    ("package", &[".cab", ".msi", ".pkg", ".deb", ".rpm", ".dmg", ".gpd", ".inf"]),
    ("source", &[".php", ".c"]),
    ("text", &[".txt", ".log", ".csv", ".xml"]),
    ("video", &[".mov", ".avi", ".mp4", ".mkv", ".mpg", ".wmv"]),
];

/// All type names, sorted
pub fn types() -> Vec<&'static str> {
    CATALOG.iter().map(|(name, _)| *name).collect()
}

/// Extensions of a single type, if it exists
pub fn lookup(type_name: &str) -> Option<&'static [&'static str]> {
    CATALOG
        .iter()
        .find(|(name, _)| *name == type_name)
        .map(|(_, exts)| *exts)
}

/// Extensions of all the given types, in the order given.
/// Unknown type names are skipped with a warning.
pub fn extensions_for<S: AsRef<str>>(type_names: &[S]) -> Vec<&'static str> {
    let mut extensions = Vec::new();
    for name in type_names {
        match lookup(name.as_ref()) {
            Some(exts) => extensions.extend_from_slice(exts),
            None => warn!(
                "Unknown file type {:?}, known types: {}",
                name.as_ref(),
                types().join(", ")
            ),
        }
    }
    extensions
}

/// The type an extension belongs to
pub fn type_of(extension: &str) -> Option<&'static str> {
    let extension = extension.to_lowercase();
    CATALOG
        .iter()
        .find(|(_, exts)| exts.contains(&extension.as_str()))
        .map(|(name, _)| *name)
}
