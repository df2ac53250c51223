//! Entry path rewriting: component stripping, include filters and
//! containment checks.

use std::path::{Component, Path, PathBuf};

use super::ArchiveError;

/// Removes the first `count` segments from an archive entry name.
///
/// Entry names always use `/` separators. Empty and `.` segments are
/// dropped; a leading `/` counts as one segment so that stripping consumes it
/// first. Returns `None` when nothing is left.
///
/// # Examples
///
/// ```
/// use pinfetch::archive::strip_components;
///
/// assert_eq!(strip_components("a/b/c.txt", 1).as_deref(), Some("b/c.txt"));
/// assert_eq!(strip_components("a/b/c.txt", 3), None);
/// ```
#[must_use]
pub fn strip_components(name: &str, count: usize) -> Option<String> {
    let rooted = name.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    if rooted {
        segments.push("/");
    }
    segments.extend(
        name.split('/')
            .filter(|segment| !segment.is_empty() && *segment != "."),
    );

    let kept = segments.get(count..)?;
    if kept.is_empty() {
        return None;
    }
    let joined = match kept.split_first() {
        Some((&"/", rest)) => format!("/{}", rest.join("/")),
        _ => kept.join("/"),
    };
    Some(joined)
}

/// Reports whether `name` is selected by `filters`.
///
/// An empty filter list selects everything. Otherwise the name must equal a
/// filter or sit below a filter treated as a directory.
#[must_use]
pub fn matches_filters(name: &str, filters: &[String]) -> bool {
    if filters.is_empty() {
        return true;
    }
    filters.iter().any(|filter| {
        let prefix = filter.trim_end_matches('/');
        name == prefix
            || name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'))
    })
}

/// Joins `name` onto `dest`, rejecting anything that would resolve outside.
///
/// The check is lexical: absolute names, drive prefixes and `..` segments
/// that climb above `dest` are rejected.
///
/// # Errors
///
/// Returns [`ArchiveError::UnsafePath`] when the entry escapes `dest`.
pub fn contained_join(dest: &Path, name: &str) -> Result<PathBuf, ArchiveError> {
    let unsafe_path = || ArchiveError::UnsafePath {
        entry: name.to_owned(),
    };
    let mut kept: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => kept.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                kept.pop().ok_or_else(unsafe_path)?;
            }
            Component::RootDir | Component::Prefix(_) => return Err(unsafe_path()),
        }
    }
    Ok(kept
        .into_iter()
        .fold(dest.to_path_buf(), |path, part| path.join(part)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("a/b/c.txt", 0, Some("a/b/c.txt"))]
    #[case("a/b/c.txt", 1, Some("b/c.txt"))]
    #[case("a/b/c.txt", 2, Some("c.txt"))]
    #[case("a/b/c.txt", 3, None)]
    #[case("a/b/c.txt", 7, None)]
    #[case("./a//b/", 1, Some("b"))]
    #[case("pkg/", 1, None)]
    #[case("/etc/passwd", 0, Some("/etc/passwd"))]
    #[case("/etc/passwd", 1, Some("etc/passwd"))]
    #[case("", 0, None)]
    fn strips_leading_segments(
        #[case] name: &str,
        #[case] count: usize,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(strip_components(name, count).as_deref(), expected);
    }

    #[rstest]
    #[case("bin/tool", &[], true)]
    #[case("bin/tool", &["bin/tool"], true)]
    #[case("bin/tool", &["bin"], true)]
    #[case("bin/tool", &["bin/"], true)]
    #[case("binary/tool", &["bin"], false)]
    #[case("docs/readme", &["bin", "lib"], false)]
    #[case("lib/x.so", &["bin", "lib"], true)]
    fn applies_include_filters(#[case] name: &str, #[case] filters: &[&str], #[case] expected: bool) {
        let owned: Vec<String> = filters.iter().map(|f| (*f).to_owned()).collect();
        assert_eq!(matches_filters(name, &owned), expected);
    }

    #[rstest]
    #[case("bin/tool", "bin/tool")]
    #[case("./bin/tool", "bin/tool")]
    #[case("bin/../lib/x", "lib/x")]
    fn joins_contained_names(#[case] name: &str, #[case] relative: &str) {
        let dest = Path::new("/srv/out");
        let joined = contained_join(dest, name).expect("contained");
        assert_eq!(joined, dest.join(relative));
    }

    #[rstest]
    #[case("../outside.txt")]
    #[case("a/../../outside.txt")]
    #[case("/etc/passwd")]
    fn rejects_escaping_names(#[case] name: &str) {
        let result = contained_join(Path::new("/srv/out"), name);
        assert!(matches!(result, Err(ArchiveError::UnsafePath { .. })));
    }
}
