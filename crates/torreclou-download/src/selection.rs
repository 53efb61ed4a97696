//! Selective-file membership rule (§4.7, exact wording). Pure and I/O-free
//! so it is directly unit-testable (Testable Property 7) without a live
//! torrent engine.

/// Priority a file is set to before the engine starts (§4.7 step 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilePriority {
    Normal,
    DoNotDownload,
}

/// Normalizes a path to forward slashes, matching every other path in the
/// comparison so platform separator differences never affect membership.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

/// A file path `p` is "selected" iff there exists a selected entry `s` such
/// that `p == s` (case-insensitive) or `p` starts with `s + "/"`
/// (case-insensitive). An empty `selected` means "all files selected"
/// (§4.7 "Empty selectedFilePaths means all files Normal").
pub fn is_selected(file_path: &str, selected: &[String]) -> bool {
    if selected.is_empty() {
        return true;
    }

    let p = normalize(file_path).to_lowercase();
    selected.iter().any(|s| {
        let s = normalize(s).to_lowercase();
        p == s || p.starts_with(&format!("{s}/"))
    })
}

/// Assigns each file in `files` (relative paths within the torrent) the
/// priority §4.7 step 5 requires given `selected_file_paths`.
pub fn assign_priorities(files: &[String], selected_file_paths: &[String]) -> Vec<(String, FilePriority)> {
    files
        .iter()
        .map(|f| {
            let priority = if is_selected(f, selected_file_paths) {
                FilePriority::Normal
            } else {
                FilePriority::DoNotDownload
            };
            (f.clone(), priority)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_selection_selects_everything() {
        let files = vec!["a/b.txt".to_string(), "d.txt".to_string()];
        let result = assign_priorities(&files, &[]);
        assert!(result.iter().all(|(_, p)| matches!(p, FilePriority::Normal)));
    }

    #[test]
    fn directory_prefix_selects_its_children_only() {
        let files = vec!["a/b.txt".to_string(), "a/c.txt".to_string(), "d.txt".to_string()];
        let result = assign_priorities(&files, &["a".to_string()]);
        let map: std::collections::HashMap<_, _> = result.into_iter().collect();
        assert_eq!(map["a/b.txt"], FilePriority::Normal);
        assert_eq!(map["a/c.txt"], FilePriority::Normal);
        assert_eq!(map["d.txt"], FilePriority::DoNotDownload);
    }

    #[test]
    fn exact_file_selects_only_that_file() {
        let files = vec!["a/b.txt".to_string(), "a/c.txt".to_string(), "d.txt".to_string()];
        let result = assign_priorities(&files, &["a/b.txt".to_string()]);
        let map: std::collections::HashMap<_, _> = result.into_iter().collect();
        assert_eq!(map["a/b.txt"], FilePriority::Normal);
        assert_eq!(map["a/c.txt"], FilePriority::DoNotDownload);
        assert_eq!(map["d.txt"], FilePriority::DoNotDownload);
    }

    #[test]
    fn selection_is_case_insensitive_and_slash_normalized() {
        assert!(is_selected("A\\B.TXT", &["a/b.txt".to_string()]));
        assert!(is_selected("a/b.txt", &["A".to_string()]));
    }

    #[test]
    fn sibling_with_shared_prefix_is_not_selected() {
        // "ab.txt" must not match a selection of "a" (prefix+"/" check, not
        // a raw string prefix check).
        assert!(!is_selected("ab.txt", &["a".to_string()]));
    }
}
