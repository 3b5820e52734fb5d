use crate::database::error::{invalid_argument, DatabaseResult};

/// Splits a slash separated database path into its segments.
pub(crate) fn normalize_path(path: &str) -> DatabaseResult<Vec<String>> {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }
    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err(invalid_argument(
                "Database path cannot contain empty segments",
            ));
        }
        if segment.contains(['.', '#', '$', '[', ']']) {
            return Err(invalid_argument(format!(
                "Database path segment '{segment}' cannot contain '.', '#', '$', '[' or ']'"
            )));
        }
        segments.push(segment.to_string());
    }
    Ok(segments)
}

pub(crate) fn is_prefix(prefix: &[String], path: &[String]) -> bool {
    prefix.len() <= path.len() && prefix.iter().zip(path).all(|(left, right)| left == right)
}

/// True when one path is an ancestor of (or equal to) the other.
pub(crate) fn paths_related(a: &[String], b: &[String]) -> bool {
    is_prefix(a, b) || is_prefix(b, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_outer_slashes() {
        assert_eq!(normalize_path("/users/ada/").unwrap(), vec!["users", "ada"]);
        assert!(normalize_path("/").unwrap().is_empty());
    }

    #[test]
    fn rejects_empty_and_reserved_segments() {
        assert!(normalize_path("users//ada").is_err());
        assert!(normalize_path("users/a.b").is_err());
        assert!(normalize_path("$key").is_err());
    }

    #[test]
    fn related_paths() {
        let parent = vec!["a".to_string()];
        let child = vec!["a".to_string(), "b".to_string()];
        let other = vec!["c".to_string()];
        assert!(paths_related(&parent, &child));
        assert!(paths_related(&child, &parent));
        assert!(!paths_related(&child, &other));
    }
}
