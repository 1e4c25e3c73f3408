//! Path-similarity scoring. Not part of cross-side move detection, which is
//! driven by identity attributes in `classify` — this drives `classify`'s
//! `RenameHint` diagnostic, a human-facing "did you mean this file?" guess
//! for a `new` record that no identity attribute matched.

use std::collections::HashSet;
use std::path::Path;

use strsim::normalized_damerau_levenshtein;

/// Score how likely `path1` and `path2` are the same file under a
/// filename-first heuristic: an exact case-insensitive filename match
/// scores highest, otherwise a weighted blend of filename edit-distance
/// and parent-directory character overlap.
pub fn path_similarity(path1: &Path, path2: &Path) -> f64 {
    let name1 = path1.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let name2 = path2.file_name().and_then(|n| n.to_str()).unwrap_or("");

    if name1.eq_ignore_ascii_case(name2) {
        return 0.95;
    }

    let filename_sim = normalized_damerau_levenshtein(name1, name2);

    let dir1 = path1.parent().map(|p| p.to_string_lossy());
    let dir2 = path2.parent().map(|p| p.to_string_lossy());

    let dir_sim = match (dir1, dir2) {
        (Some(d1), Some(d2)) => simple_string_similarity(&d1, &d2),
        _ => 0.0,
    };

    filename_sim * 0.7 + dir_sim * 0.3
}

/// Jaccard similarity on character sets.
pub fn simple_string_similarity(s1: &str, s2: &str) -> f64 {
    if s1 == s2 {
        return 1.0;
    }
    if s1.is_empty() || s2.is_empty() {
        return 0.0;
    }

    let chars1: HashSet<char> = s1.chars().collect();
    let chars2: HashSet<char> = s2.chars().collect();

    let intersection = chars1.intersection(&chars2).count();
    let union = chars1.union(&chars2).count();

    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn exact_filename_match_scores_high() {
        let sim = path_similarity(Path::new("a/b.txt"), Path::new("c/b.txt"));
        assert!(sim >= 0.95);
    }

    #[test]
    fn case_insensitive_filename_match() {
        let sim = path_similarity(Path::new("a/B.txt"), Path::new("a/b.txt"));
        assert!(sim >= 0.95);
    }

    #[test]
    fn unrelated_filenames_score_low() {
        let sim = path_similarity(Path::new("x/aaaaaaaa.txt"), Path::new("y/zzzzzzzz.md"));
        assert!(sim < 0.5);
    }

    #[test]
    fn string_similarity_identical_is_one() {
        assert_eq!(simple_string_similarity("abc", "abc"), 1.0);
    }

    #[test]
    fn string_similarity_empty_is_zero() {
        assert_eq!(simple_string_similarity("abc", ""), 0.0);
    }

    #[test]
    fn string_similarity_partial_overlap() {
        let sim = simple_string_similarity("abc", "bcd");
        assert!(sim > 0.0 && sim < 1.0);
    }
}
