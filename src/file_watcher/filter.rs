/*!
 * 路径过滤器
 *
 * Decides which paths under the watch root are in scope. The same filter is
 * used by the monitor (which events count) and by the git adapter (which
 * files an auto-commit stages), so both agree on the watch scope.
 *
 * Matching rules:
 * - a path is excluded when any of its components, or the whole relative
 *   path, matches an exclude pattern;
 * - with no include patterns every remaining file is in scope, otherwise the
 *   file name or the whole relative path must match one of them.
 */

use std::path::{Component, Path};

use glob::{MatchOptions, Pattern, PatternError};

/// Version-control internals, dependency/build output and editor scratch
/// files. Always excluded in addition to the user's patterns.
pub const DEFAULT_EXCLUDES: &[&str] = &[
    ".git",
    "node_modules",
    "target",
    "dist",
    "build",
    "__pycache__",
    ".idea",
    "*.swp",
    "*.swo",
    "*.swx",
    "*.tmp",
    "*~",
    "*.bak",
    "*.pyc",
    ".DS_Store",
    "Thumbs.db",
    // vim probes directory writability with this name
    "4913",
];

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl Default for PathFilter {
    fn default() -> Self {
        Self {
            include: Vec::new(),
            exclude: compile(DEFAULT_EXCLUDES.iter().copied()).unwrap_or_default(),
        }
    }
}

impl PathFilter {
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self, PatternError> {
        let mut filter = Self::default();
        filter.include = compile(include.iter().map(String::as_str))?;
        filter
            .exclude
            .extend(compile(exclude.iter().map(String::as_str))?);
        Ok(filter)
    }

    /// `relative` is relative to the watch root.
    pub fn allows(&self, relative: &Path) -> bool {
        let normalized = normalize(relative);
        if normalized.is_empty() {
            return false;
        }

        let excluded = self.exclude.iter().any(|pattern| {
            pattern.matches_with(&normalized, MATCH_OPTIONS)
                || relative.components().any(|c| match c {
                    Component::Normal(part) => {
                        pattern.matches_with(&part.to_string_lossy(), MATCH_OPTIONS)
                    }
                    _ => false,
                })
        });
        if excluded {
            return false;
        }

        if self.include.is_empty() {
            return true;
        }

        let file_name = relative
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.include.iter().any(|pattern| {
            pattern.matches_with(&file_name, MATCH_OPTIONS)
                || pattern.matches_with(&normalized, MATCH_OPTIONS)
        })
    }

    pub fn allows_str(&self, relative: &str) -> bool {
        self.allows(Path::new(relative))
    }
}

fn compile<'a>(patterns: impl Iterator<Item = &'a str>) -> Result<Vec<Pattern>, PatternError> {
    patterns
        .filter(|p| !p.trim().is_empty())
        .map(|p| Pattern::new(p.trim()))
        .collect()
}

/// Forward-slash form of a relative path, without `.` components.
fn normalize(path: &Path) -> String {
    path.components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_excludes_cover_vcs_and_editor_files() {
        let filter = PathFilter::default();
        assert!(!filter.allows_str(".git/index"));
        assert!(!filter.allows_str("web/node_modules/react/index.js"));
        assert!(!filter.allows_str("src/.main.rs.swp"));
        assert!(!filter.allows_str("notes.txt~"));
        assert!(!filter.allows_str("pkg/__pycache__/mod.cpython-311.pyc"));
        assert!(!filter.allows_str("4913"));
        assert!(filter.allows_str("src/main.rs"));
        assert!(filter.allows_str("README.md"));
    }

    #[test]
    fn include_patterns_match_name_or_relative_path() {
        let filter = PathFilter::new(&["*.py".to_string(), "docs/*.md".to_string()], &[]).unwrap();
        assert!(filter.allows_str("app.py"));
        assert!(filter.allows_str("pkg/deep/app.py"));
        assert!(filter.allows_str("docs/index.md"));
        assert!(!filter.allows_str("docs/nested/index.md"));
        assert!(!filter.allows_str("README.md"));
    }

    #[test]
    fn user_excludes_apply_to_components() {
        let filter = PathFilter::new(&[], &["secrets".to_string(), "*.log".to_string()]).unwrap();
        assert!(!filter.allows_str("config/secrets/key.pem"));
        assert!(!filter.allows_str("logs/server.log"));
        assert!(filter.allows_str("config/app.toml"));
    }

    #[test]
    fn exclude_wins_over_include() {
        let filter = PathFilter::new(&["*.py".to_string()], &["generated".to_string()]).unwrap();
        assert!(!filter.allows_str("generated/schema.py"));
        assert!(!filter.allows_str("lib/cache.pyc"));
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(PathFilter::new(&["[".to_string()], &[]).is_err());
    }
}
