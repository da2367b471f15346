//! SQL helper functions for the SQLite stores.
//!
//! LIKE wildcard escaping and glob pattern conversion used by fuzzy scope
//! resolution (`find_overlaps`/`consolidate_documents` accept glob patterns
//! over document titles).

/// Escapes SQL LIKE wildcards in a string to make them literal.
///
/// SQL LIKE uses `%` and `_` as wildcards; literal occurrences (and the
/// backslash escape character itself) must be escaped before user input is
/// interpolated into a LIKE parameter.
#[must_use]
pub fn escape_like_wildcards(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            },
            _ => result.push(c),
        }
    }
    result
}

/// Converts a glob-style pattern to a SQL LIKE pattern.
///
/// Glob `*` and `?` become LIKE `%` and `_`; literal LIKE wildcards in the
/// pattern are escaped first so they cannot widen the match.
#[must_use]
pub fn glob_to_like_pattern(pattern: &str) -> String {
    let mut result = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '%' | '_' | '\\' => {
                result.push('\\');
                result.push(c);
            },
            '*' => result.push('%'),
            '?' => result.push('_'),
            _ => result.push(c),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like_wildcards() {
        assert_eq!(escape_like_wildcards("normal"), "normal");
        assert_eq!(escape_like_wildcards("100%"), "100\\%");
        assert_eq!(escape_like_wildcards("user_name"), "user\\_name");
        assert_eq!(escape_like_wildcards("path\\file"), "path\\\\file");
        assert_eq!(escape_like_wildcards(""), "");
    }

    #[test]
    fn test_glob_to_like_pattern() {
        assert_eq!(glob_to_like_pattern("*"), "%");
        assert_eq!(glob_to_like_pattern("auth-*"), "auth-%");
        assert_eq!(glob_to_like_pattern("v?-spec"), "v_-spec");
        assert_eq!(glob_to_like_pattern("100%"), "100\\%");
        assert_eq!(glob_to_like_pattern("foo%*bar"), "foo\\%%bar");
    }
}
