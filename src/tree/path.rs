//! Normalization of upload-relative paths.

/// Normalize a path inside an upload.
///
/// Backslashes count as separators. Empty and `.` segments are dropped and
/// `..` removes the previous segment (never climbing above the root). The
/// result has no leading or trailing slash; the root is `""`.
pub fn normalize_path(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }
    segments.join("/")
}

/// Join a child name onto a normalized directory path.
pub fn join_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        normalize_path(name)
    } else {
        normalize_path(&format!("{}/{}", dir, name))
    }
}

/// Parent directory of a normalized path; `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path.is_empty() {
        return None;
    }
    Some(path.rsplit_once('/').map_or("", |(parent, _)| parent))
}
