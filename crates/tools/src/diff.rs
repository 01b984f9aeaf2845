//! Line diff previews for staged changes.
//!
//! Unchanged prefix and suffix lines are trimmed to a few lines of context;
//! the changed middle is diffed with an LCS table when it is small enough,
//! and shown as a block replacement otherwise.

/// Lines of unchanged context kept around the changed region.
const CONTEXT_LINES: usize = 3;

/// Above this many LCS cells the middle is shown as remove-all/add-all.
const MAX_LCS_CELLS: usize = 250_000;

/// Render a unified-style preview of `before` → `after` for `path`.
///
/// Output lines past `max_lines` are replaced with a single
/// `... (N more lines)` marker.
pub fn render_preview(path: &str, before: &str, after: &str, is_new_file: bool, max_lines: usize) -> String {
    let old: Vec<&str> = before.lines().collect();
    let new: Vec<&str> = after.lines().collect();

    let mut body = Vec::new();

    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();

    for line in &old[prefix.saturating_sub(CONTEXT_LINES)..prefix] {
        body.push(format!(" {line}"));
    }

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];
    if old_mid.len().saturating_mul(new_mid.len()) <= MAX_LCS_CELLS {
        body.extend(lcs_diff(old_mid, new_mid));
    } else {
        body.extend(old_mid.iter().map(|l| format!("-{l}")));
        body.extend(new_mid.iter().map(|l| format!("+{l}")));
    }

    let suffix_start = old.len() - suffix;
    for line in &old[suffix_start..(suffix_start + CONTEXT_LINES).min(old.len())] {
        body.push(format!(" {line}"));
    }

    let mut out = Vec::with_capacity(body.len().min(max_lines) + 3);
    if is_new_file {
        out.push("--- /dev/null".to_string());
    } else {
        out.push(format!("--- a/{path}"));
    }
    out.push(format!("+++ b/{path}"));

    if old_mid.is_empty() && new_mid.is_empty() {
        out.push("(no changes)".to_string());
        return out.join("\n");
    }

    let total = body.len();
    out.extend(body.into_iter().take(max_lines));
    if total > max_lines {
        out.push(format!("... ({} more lines)", total - max_lines));
    }
    out.join("\n")
}

fn lcs_diff(old: &[&str], new: &[&str]) -> Vec<String> {
    let (n, m) = (old.len(), new.len());
    // table[i][j] = LCS length of old[i..] and new[j..]
    let mut table = vec![vec![0usize; m + 1]; n + 1];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            table[i][j] = if old[i] == new[j] {
                table[i + 1][j + 1] + 1
            } else {
                table[i + 1][j].max(table[i][j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(n + m);
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if old[i] == new[j] {
            out.push(format!(" {}", old[i]));
            i += 1;
            j += 1;
        } else if table[i + 1][j] >= table[i][j + 1] {
            out.push(format!("-{}", old[i]));
            i += 1;
        } else {
            out.push(format!("+{}", new[j]));
            j += 1;
        }
    }
    out.extend(old[i..].iter().map(|l| format!("-{l}")));
    out.extend(new[j..].iter().map(|l| format!("+{l}")));
    out
}
