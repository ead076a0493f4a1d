use memchr::memmem;
use std::path::{Path, PathBuf};

/// Split a substring filter into whitespace-separated tokens.
///
/// Runs of whitespace never produce empty tokens.
pub fn split_tokens(substring: &str) -> Vec<String> {
    substring.split_whitespace().map(str::to_string).collect()
}

/// Lowercase tokens once so a scan can compare them against many names.
pub fn lowercase_tokens(tokens: &[String]) -> Vec<String> {
    tokens.iter().map(|t| t.to_lowercase()).collect()
}

/// True if `name` contains every token, ignoring case and token order.
pub fn contains_all_tokens(name: &str, tokens: &[String]) -> bool {
    if tokens.is_empty() {
        return true;
    }
    let haystack = name.to_lowercase();
    tokens
        .iter()
        .all(|token| memmem::find(haystack.as_bytes(), token.to_lowercase().as_bytes()).is_some())
}

/// Same as [`contains_all_tokens`] for tokens that are already lowercase.
pub fn contains_all_lowercase(name: &str, lowered: &[String]) -> bool {
    if lowered.is_empty() {
        return true;
    }
    let haystack = name.to_lowercase();
    lowered
        .iter()
        .all(|token| memmem::find(haystack.as_bytes(), token.as_bytes()).is_some())
}

/// Index of the root that contains `path`, compared component-wise.
pub fn containing_root(path: &Path, roots: &[PathBuf]) -> Option<usize> {
    roots.iter().position(|root| path.starts_with(root))
}

/// True if either path lies inside the other.
pub fn paths_overlap(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}
