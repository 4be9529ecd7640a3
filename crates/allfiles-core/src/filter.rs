//! Filter settings and the predicates applied to manifest entries

use crate::error::AllfilesError;
use crate::extensions;
use crate::size::parse_size;
use allfiles_types::FilterConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Filter options as the user writes them: size strings, bare extensions
/// and semantic type names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub min_size: String,
    pub max_size: Option<String>,
    pub include_extensions: Vec<String>,
    pub exclude_extensions: Vec<String>,
    pub include_types: Vec<String>,
    pub exclude_types: Vec<String>,
    pub include_paths: Vec<String>,
    pub exclude_paths: Vec<String>,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            min_size: "1".to_string(),
            max_size: None,
            include_extensions: Vec::new(),
            exclude_extensions: Vec::new(),
            include_types: Vec::new(),
            exclude_types: Vec::new(),
            include_paths: Vec::new(),
            exclude_paths: Vec::new(),
        }
    }
}

impl FilterSettings {
    /// Parse sizes and expand types into a [`FilterConfig`].
    ///
    /// # Errors
    ///
    /// Fails with [`AllfilesError::InvalidSize`] on a malformed size, which
    /// must stop the run before any file is looked at.
    pub fn resolve(&self) -> Result<FilterConfig, AllfilesError> {
        let min_size_bytes = parse_size(&self.min_size)?;
        let max_size_bytes = match self.max_size.as_deref() {
            Some(text) if !text.is_empty() => parse_size(text)?,
            _ => 0,
        };

        let mut include_extensions = normalize_extensions(&self.include_extensions);
        include_extensions.extend(normalize_extensions(&extensions::extensions_for(
            &self.include_types,
        )));
        let mut exclude_extensions = normalize_extensions(&self.exclude_extensions);
        exclude_extensions.extend(normalize_extensions(&extensions::extensions_for(
            &self.exclude_types,
        )));

        Ok(FilterConfig {
            min_size_bytes,
            max_size_bytes,
            include_extensions,
            exclude_extensions,
            include_path_prefixes: self.include_paths.iter().cloned().collect(),
            exclude_path_prefixes: self.exclude_paths.iter().cloned().collect(),
        })
    }
}

/// Lowercase and prefix with `.` where missing
pub fn normalize_extensions<S: AsRef<str>>(exts: &[S]) -> BTreeSet<String> {
    exts.iter()
        .map(|ext| {
            let ext = ext.as_ref().to_lowercase();
            if ext.starts_with('.') {
                ext
            } else {
                format!(".{ext}")
            }
        })
        .collect()
}

/// Predicates over a resolved [`FilterConfig`]
#[derive(Debug, Clone)]
pub struct EntryFilter {
    config: FilterConfig,
}

impl EntryFilter {
    pub fn new(config: FilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Exclusions win; otherwise any include prefix must match, if there are any
    pub fn accepts_path(&self, directory: &str) -> bool {
        if self
            .config
            .exclude_path_prefixes
            .iter()
            .any(|prefix| directory.starts_with(prefix.as_str()))
        {
            return false;
        }
        self.config.include_path_prefixes.is_empty()
            || self
                .config
                .include_path_prefixes
                .iter()
                .any(|prefix| directory.starts_with(prefix.as_str()))
    }

    /// Both bounds are inclusive, a zero maximum is unbounded
    pub fn accepts_size(&self, size_bytes: u64) -> bool {
        size_bytes >= self.config.min_size_bytes
            && (self.config.max_size_bytes == 0 || size_bytes <= self.config.max_size_bytes)
    }

    /// A non-empty include list replaces the exclude list entirely
    pub fn accepts_extension(&self, extension: &str) -> bool {
        if !self.config.include_extensions.is_empty() {
            self.config.include_extensions.contains(extension)
        } else {
            !self.config.exclude_extensions.contains(extension)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(config: FilterConfig) -> EntryFilter {
        EntryFilter::new(config)
    }

    #[test]
    fn test_resolve_defaults() {
        let config = FilterSettings::default().resolve().unwrap();
        assert_eq!(config, FilterConfig::default());
    }

    #[test]
    fn test_resolve_sizes_and_extensions() {
        let settings = FilterSettings {
            min_size: "0".to_string(),
            max_size: Some("1.5M".to_string()),
            include_extensions: vec!["MP4".to_string(), ".mkv".to_string()],
            include_types: vec!["audio".to_string()],
            exclude_types: vec!["archive".to_string()],
            ..Default::default()
        };
        let config = settings.resolve().unwrap();
        assert_eq!(config.min_size_bytes, 0);
        assert_eq!(config.max_size_bytes, 1572864);
        let include: Vec<_> = config.include_extensions.iter().map(String::as_str).collect();
        assert_eq!(include, vec![".mkv", ".mp3", ".mp4"]);
        assert!(config.exclude_extensions.contains(".zip"));
        assert!(config.exclude_extensions.contains(".rar"));
    }

    #[test]
    fn test_resolve_rejects_bad_size() {
        let settings = FilterSettings {
            max_size: Some("10X".to_string()),
            ..Default::default()
        };
        assert!(matches!(settings.resolve(), Err(AllfilesError::InvalidSize(_))));

        let settings = FilterSettings {
            min_size: "big".to_string(),
            ..Default::default()
        };
        assert!(matches!(settings.resolve(), Err(AllfilesError::InvalidSize(_))));
    }

    #[test]
    fn test_include_extensions_win_over_exclude() {
        let f = filter(FilterConfig {
            include_extensions: normalize_extensions(&["mp4"]),
            exclude_extensions: normalize_extensions(&["mp4", "txt"]),
            ..Default::default()
        });
        assert!(f.accepts_extension(".mp4"));
        assert!(!f.accepts_extension(".txt"));
        assert!(!f.accepts_extension(".avi"));
    }

    #[test]
    fn test_exclude_extensions_as_denylist() {
        let f = filter(FilterConfig {
            exclude_extensions: normalize_extensions(&["tmp"]),
            ..Default::default()
        });
        assert!(!f.accepts_extension(".tmp"));
        assert!(f.accepts_extension(".pdf"));
        assert!(f.accepts_extension(""));
    }

    #[test]
    fn test_path_exclusion_short_circuits() {
        let f = filter(FilterConfig {
            include_path_prefixes: ["tmp/".to_string(), "docs".to_string()].into(),
            exclude_path_prefixes: ["tmp/".to_string()].into(),
            ..Default::default()
        });
        assert!(!f.accepts_path("tmp/cache"));
        assert!(f.accepts_path("docs/2020"));
        assert!(!f.accepts_path("src"));
    }

    #[test]
    fn test_path_exclusion_only() {
        let f = filter(FilterConfig {
            exclude_path_prefixes: ["tmp/".to_string()].into(),
            ..Default::default()
        });
        assert!(!f.accepts_path("tmp/a"));
        assert!(f.accepts_path("tmp"));
        assert!(f.accepts_path("home/tmp/a"));
    }

    #[test]
    fn test_size_bounds_inclusive() {
        let f = filter(FilterConfig {
            min_size_bytes: 1024,
            max_size_bytes: 2048,
            ..Default::default()
        });
        assert!(!f.accepts_size(512));
        assert!(f.accepts_size(1024));
        assert!(f.accepts_size(2048));
        assert!(!f.accepts_size(2049));

        let unbounded = filter(FilterConfig {
            min_size_bytes: 0,
            ..Default::default()
        });
        assert!(unbounded.accepts_size(0));
        assert!(unbounded.accepts_size(u64::MAX));
    }
}
