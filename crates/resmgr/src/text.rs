//! Line-based unified diff used to render drift.

const CONTEXT: usize = 3;

#[derive(Debug, Clone)]
struct Line {
    tag: char, // ' ', '-' or '+'
    a_pos: usize,
    b_pos: usize,
    text: String,
}

/// Renders a unified diff of `old` vs `new` with three lines of context.
/// Returns an empty string when the inputs are identical.
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str) -> String {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();
    let lines = diff_lines(&a, &b);

    if lines.iter().all(|l| l.tag == ' ') {
        return String::new();
    }

    let mut out = format!("--- {old_label}\n+++ {new_label}\n");

    // expand every changed line by the context window, then merge the
    // overlapping ranges into hunks
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if line.tag != ' ' {
            let start = i.saturating_sub(CONTEXT);
            let end = (i + CONTEXT + 1).min(lines.len());
            match ranges.last_mut() {
                Some(last) if start <= last.1 => last.1 = end,
                _ => ranges.push((start, end)),
            }
        }
    }

    for (start, end) in ranges {
        let hunk = &lines[start..end];
        let a_count = hunk.iter().filter(|l| l.tag != '+').count();
        let b_count = hunk.iter().filter(|l| l.tag != '-').count();
        let a_start = if a_count > 0 { hunk[0].a_pos + 1 } else { hunk[0].a_pos };
        let b_start = if b_count > 0 { hunk[0].b_pos + 1 } else { hunk[0].b_pos };
        out.push_str(&format!(
            "@@ -{a_start},{a_count} +{b_start},{b_count} @@\n"
        ));
        for line in hunk {
            out.push(line.tag);
            out.push_str(&line.text);
            out.push('\n');
        }
    }

    out
}

/// Longest-common-subsequence walk producing tagged lines.
fn diff_lines(a: &[&str], b: &[&str]) -> Vec<Line> {
    let n = a.len();
    let m = b.len();
    let mut lcs = vec![vec![0u32; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i][j] = if a[i] == b[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut lines = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0usize, 0usize);
    while i < n && j < m {
        if a[i] == b[j] {
            lines.push(Line { tag: ' ', a_pos: i, b_pos: j, text: a[i].to_string() });
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            lines.push(Line { tag: '-', a_pos: i, b_pos: j, text: a[i].to_string() });
            i += 1;
        } else {
            lines.push(Line { tag: '+', a_pos: i, b_pos: j, text: b[j].to_string() });
            j += 1;
        }
    }
    while i < n {
        lines.push(Line { tag: '-', a_pos: i, b_pos: j, text: a[i].to_string() });
        i += 1;
    }
    while j < m {
        lines.push(Line { tag: '+', a_pos: i, b_pos: j, text: b[j].to_string() });
        j += 1;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_inputs_produce_no_diff() {
        assert_eq!(unified_diff("a\nb\n", "a\nb\n", "live", "merged"), "");
    }

    #[test]
    fn single_line_change() {
        let old = "kind: ConfigMap\ndata:\n  key: old\n";
        let new = "kind: ConfigMap\ndata:\n  key: new\n";
        let diff = unified_diff(old, new, "live", "merged");
        assert!(diff.starts_with("--- live\n+++ merged\n"));
        assert!(diff.contains("-  key: old"));
        assert!(diff.contains("+  key: new"));
        assert!(diff.contains("@@ -1,3 +1,3 @@"));
    }

    #[test]
    fn distant_changes_become_separate_hunks() {
        let old: String = (0..30).map(|i| format!("line{i}\n")).collect();
        let mut changed: Vec<String> = (0..30).map(|i| format!("line{i}")).collect();
        changed[2] = "changed-a".to_string();
        changed[27] = "changed-b".to_string();
        let new = changed.join("\n") + "\n";

        let diff = unified_diff(&old, &new, "live", "merged");
        assert_eq!(diff.matches("@@").count() / 2, 2);
        assert!(diff.contains("+changed-a"));
        assert!(diff.contains("+changed-b"));
    }

    #[test]
    fn pure_addition() {
        let diff = unified_diff("a\n", "a\nb\n", "live", "merged");
        assert!(diff.contains("+b"));
        assert!(!diff.contains("-a"));
    }
}
