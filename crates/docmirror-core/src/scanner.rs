//! Documentation file detection.
//!
//! A path is a documentation file iff it matches one of a fixed, ordered,
//! case-insensitive set of glob patterns. The first matching pattern
//! decides the file's [`DocType`], so more specific locations (ADRs,
//! architecture notes, API specs) are listed before the generic `docs/`
//! buckets.
//!
//! Patterns use `literal_separator`, so `*` never crosses a `/`: the
//! README, CHANGELOG, and CONTRIBUTING patterns match only at the
//! repository root.
//!
//! ```rust
//! use docmirror_core::models::DocType;
//! use docmirror_core::scanner::DocumentScanner;
//!
//! let scanner = DocumentScanner::new().unwrap();
//! assert!(scanner.is_document_file("docs/guide/install.md"));
//! assert_eq!(scanner.classify("docs/adr/0001-use-rust.md"), Some(DocType::Adr));
//! assert!(!scanner.is_document_file("src/main.rs"));
//! ```

use anyhow::Result;
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

use crate::models::DocType;

/// The ordered pattern table. Order is part of the contract.
pub const DOCUMENT_PATTERNS: &[(&str, DocType)] = &[
    ("readme", DocType::Readme),
    ("readme.*", DocType::Readme),
    ("**/{adr,adrs}/**", DocType::Adr),
    ("**/architecture/**", DocType::Architecture),
    ("**/{openapi,swagger}.{json,yaml,yml}", DocType::ApiSpec),
    ("**/*.{openapi,swagger}.{json,yaml,yml}", DocType::ApiSpec),
    ("changelog", DocType::Changelog),
    ("changelog.*", DocType::Changelog),
    ("contributing", DocType::Contributing),
    ("contributing.*", DocType::Contributing),
    ("**/docs/**", DocType::Documentation),
    ("**/documentation/**", DocType::Documentation),
];

/// Compiled matcher over [`DOCUMENT_PATTERNS`].
#[derive(Debug, Clone)]
pub struct DocumentScanner {
    set: GlobSet,
}

impl DocumentScanner {
    pub fn new() -> Result<Self> {
        let mut builder = GlobSetBuilder::new();
        for (pattern, _) in DOCUMENT_PATTERNS {
            builder.add(
                GlobBuilder::new(pattern)
                    .case_insensitive(true)
                    .literal_separator(true)
                    .build()?,
            );
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    /// True iff `path` (repository-relative, `/`-separated) is a documentation file.
    pub fn is_document_file(&self, path: &str) -> bool {
        self.set.is_match(normalize(path))
    }

    /// Document type of the first matching pattern, if any.
    pub fn classify(&self, path: &str) -> Option<DocType> {
        self.set
            .matches(normalize(path))
            .into_iter()
            .min()
            .map(|idx| DOCUMENT_PATTERNS[idx].1)
    }

    /// Filter a list of tree paths down to documentation files, preserving order.
    pub fn filter<'a, I>(&self, paths: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        paths
            .into_iter()
            .filter(|p| self.is_document_file(p))
            .map(str::to_string)
            .collect()
    }
}

fn normalize(path: &str) -> &str {
    path.strip_prefix("./").unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanner() -> DocumentScanner {
        DocumentScanner::new().unwrap()
    }

    #[test]
    fn root_readme_only() {
        let s = scanner();
        assert!(s.is_document_file("README.md"));
        assert!(s.is_document_file("readme"));
        assert!(s.is_document_file("Readme.rst"));
        assert!(!s.is_document_file("src/README.md"));
    }

    #[test]
    fn docs_directories_at_any_depth() {
        let s = scanner();
        assert!(s.is_document_file("docs/a.md"));
        assert!(s.is_document_file("DOCS/Guide.MD"));
        assert!(s.is_document_file("services/api/docs/usage.md"));
        assert!(s.is_document_file("documentation/index.md"));
        assert!(s.is_document_file("architecture/overview.md"));
        assert!(s.is_document_file("adr/0001.md"));
        assert!(s.is_document_file("adrs/0002.md"));
        assert!(!s.is_document_file("docsite/index.md"));
        assert!(!s.is_document_file("src/lib.rs"));
    }

    #[test]
    fn api_specs_changelog_contributing() {
        let s = scanner();
        assert!(s.is_document_file("openapi.yaml"));
        assert!(s.is_document_file("api/swagger.json"));
        assert!(s.is_document_file("api/payments.openapi.yml"));
        assert!(s.is_document_file("CHANGELOG.md"));
        assert!(s.is_document_file("CONTRIBUTING"));
        assert!(!s.is_document_file("pkg/CHANGELOG.md"));
        assert!(!s.is_document_file("openapi.txt"));
    }

    #[test]
    fn classification_follows_pattern_order() {
        let s = scanner();
        assert_eq!(s.classify("README.md"), Some(DocType::Readme));
        assert_eq!(s.classify("docs/adr/0001.md"), Some(DocType::Adr));
        assert_eq!(
            s.classify("docs/architecture/c4.md"),
            Some(DocType::Architecture)
        );
        assert_eq!(s.classify("docs/openapi.yaml"), Some(DocType::ApiSpec));
        assert_eq!(s.classify("docs/guide.md"), Some(DocType::Documentation));
        assert_eq!(s.classify("CHANGELOG.md"), Some(DocType::Changelog));
        assert_eq!(s.classify("main.go"), None);
    }

    #[test]
    fn filter_preserves_order() {
        let s = scanner();
        let paths = ["src/a.rs", "docs/b.md", "README.md", "Cargo.toml"];
        assert_eq!(s.filter(paths), vec!["docs/b.md", "README.md"]);
    }
}
