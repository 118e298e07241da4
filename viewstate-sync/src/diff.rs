use std::path::Path;

use similar::{ChangeTag, TextDiff};

/// Line counts across one or more rewritten files.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DiffStats {
    pub files_changed: usize,
    pub lines_added: usize,
    pub lines_removed: usize,
}

impl DiffStats {
    pub fn is_empty(&self) -> bool {
        self.lines_added == 0 && self.lines_removed == 0
    }

    pub fn print_summary(&self) {
        println!("\nSummary:");
        println!("Files changed: {}", self.files_changed);
        println!("Lines added: {}", self.lines_added);
        println!("Lines removed: {}", self.lines_removed);
    }
}

/// Unified diff of `original` against `modified`, headed with `path`.
pub fn generate_unified_diff(
    path: &Path,
    original: &str,
    modified: &str,
    context_lines: usize,
) -> (String, DiffStats) {
    let diff = TextDiff::from_lines(original, modified);
    let stats = count_changes(&diff);

    let path_str = path.display().to_string();
    let mut output = format!("--- {}\n+++ {}\n", path_str, path_str);
    output.push_str(&diff.unified_diff().context_radius(context_lines).to_string());

    (output, stats)
}

/// One `path:line: + text` entry per added line, numbered against `modified`.
pub fn added_lines(path: &Path, original: &str, modified: &str) -> (Vec<String>, DiffStats) {
    let diff = TextDiff::from_lines(original, modified);
    let stats = count_changes(&diff);

    let lines = diff
        .iter_all_changes()
        .filter(|change| change.tag() == ChangeTag::Insert)
        .filter_map(|change| {
            let line = change.new_index()? + 1;
            Some(format!(
                "{}:{}: + {}",
                path.display(),
                line,
                change.value().trim()
            ))
        })
        .collect();

    (lines, stats)
}

fn count_changes<'a>(diff: &TextDiff<'a, 'a, 'a, str>) -> DiffStats {
    let mut stats = DiffStats::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => stats.lines_added += 1,
            ChangeTag::Delete => stats.lines_removed += 1,
            ChangeTag::Equal => {}
        }
    }
    if !stats.is_empty() {
        stats.files_changed = 1;
    }
    stats
}

/// Prints the diff when there is one.
pub fn print_diff(path: &Path, original: &str, modified: &str) -> DiffStats {
    let (diff_output, stats) = generate_unified_diff(path, original, modified, 3);
    if stats.files_changed > 0 {
        print!("{}", diff_output);
    }
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const ORIGINAL: &str = "class P {\n    val viewStateProxy = object : X {\n    }\n}\n";
    const MODIFIED: &str = "class P {\n    val viewStateProxy = object : X {\n        override val a by owner.delegateFor(\"a\")\n    }\n}\n";

    #[test]
    fn test_generate_unified_diff() {
        let path = PathBuf::from("FeedContract.kt");
        let (diff, stats) = generate_unified_diff(&path, ORIGINAL, MODIFIED, 3);

        assert!(diff.contains("--- FeedContract.kt"));
        assert!(diff.contains("+++ FeedContract.kt"));
        assert!(diff.contains("+        override val a by owner.delegateFor(\"a\")"));

        assert_eq!(stats.files_changed, 1);
        assert_eq!(stats.lines_added, 1);
        assert_eq!(stats.lines_removed, 0);
    }

    #[test]
    fn test_generate_unified_diff_no_changes() {
        let path = PathBuf::from("FeedContract.kt");
        let (diff, stats) = generate_unified_diff(&path, ORIGINAL, ORIGINAL, 3);

        assert!(diff.contains("--- FeedContract.kt"));
        assert!(!diff.contains("@@"));
        assert_eq!(stats, DiffStats::default());
    }

    #[test]
    fn test_added_lines() {
        let path = PathBuf::from("a.kt");
        let (lines, stats) = added_lines(&path, ORIGINAL, MODIFIED);
        assert_eq!(
            lines,
            vec!["a.kt:3: + override val a by owner.delegateFor(\"a\")".to_string()]
        );
        assert_eq!(stats.lines_added, 1);
    }
}
