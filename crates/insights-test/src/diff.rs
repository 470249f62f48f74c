//! Line-based unified diff for human-readable mismatch output.

pub const DEFAULT_CONTEXT: usize = 3;

// Above this many DP cells the changed middle is reported as one replace block.
const MAX_LCS_CELLS: usize = 4_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Equal,
    Delete,
    Insert,
}

#[derive(Debug, Clone, Copy)]
struct Edit {
    tag: Tag,
    old: usize,
    new: usize,
}

/// Render a unified diff of `old` → `new`. Returns an empty string when the texts are equal.
pub fn unified_diff(old: &str, new: &str, old_label: &str, new_label: &str, context: usize) -> String {
    if old == new {
        return String::new();
    }
    let a: Vec<&str> = old.split_inclusive('\n').collect();
    let b: Vec<&str> = new.split_inclusive('\n').collect();
    let edits = edit_script(&a, &b);

    let mut out = format!("--- {old_label}\n+++ {new_label}\n");
    for (start, end) in hunks(&edits, context) {
        let hunk = &edits[start..end];
        let old_len = hunk.iter().filter(|e| e.tag != Tag::Insert).count();
        let new_len = hunk.iter().filter(|e| e.tag != Tag::Delete).count();
        out.push_str(&format!(
            "@@ -{} +{} @@\n",
            format_range(hunk[0].old, old_len),
            format_range(hunk[0].new, new_len)
        ));
        for e in hunk {
            let (prefix, line) = match e.tag {
                Tag::Equal => (' ', a[e.old]),
                Tag::Delete => ('-', a[e.old]),
                Tag::Insert => ('+', b[e.new]),
            };
            out.push(prefix);
            out.push_str(line);
            if !line.ends_with('\n') {
                out.push_str("\n\\ No newline at end of file\n");
            }
        }
    }
    out
}

fn format_range(start: usize, len: usize) -> String {
    match len {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{len}", start + 1),
    }
}

fn edit_script(a: &[&str], b: &[&str]) -> Vec<Edit> {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();

    let mut out = Vec::with_capacity(a.len().max(b.len()));
    for i in 0..prefix {
        out.push(Edit { tag: Tag::Equal, old: i, new: i });
    }

    let a_mid = &a[prefix..a.len() - suffix];
    let b_mid = &b[prefix..b.len() - suffix];
    middle_edits(a_mid, b_mid, prefix, &mut out);

    for k in 0..suffix {
        out.push(Edit {
            tag: Tag::Equal,
            old: a.len() - suffix + k,
            new: b.len() - suffix + k,
        });
    }
    out
}

fn middle_edits(a: &[&str], b: &[&str], base: usize, out: &mut Vec<Edit>) {
    let (n, m) = (a.len(), b.len());
    let cells = (n + 1).saturating_mul(m + 1);
    if n == 0 || m == 0 || cells > MAX_LCS_CELLS {
        for i in 0..n {
            out.push(Edit { tag: Tag::Delete, old: base + i, new: base });
        }
        for j in 0..m {
            out.push(Edit { tag: Tag::Insert, old: base + n, new: base + j });
        }
        return;
    }

    // lcs[i * (m + 1) + j] = LCS length of a[i..] and b[j..]
    let mut lcs = vec![0u32; cells];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * (m + 1) + j] = if a[i] == b[j] {
                lcs[(i + 1) * (m + 1) + j + 1] + 1
            } else {
                lcs[(i + 1) * (m + 1) + j].max(lcs[i * (m + 1) + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < n || j < m {
        if i < n && j < m && a[i] == b[j] {
            out.push(Edit { tag: Tag::Equal, old: base + i, new: base + j });
            i += 1;
            j += 1;
        } else if j == m || (i < n && lcs[(i + 1) * (m + 1) + j] >= lcs[i * (m + 1) + j + 1]) {
            out.push(Edit { tag: Tag::Delete, old: base + i, new: base + j });
            i += 1;
        } else {
            out.push(Edit { tag: Tag::Insert, old: base + i, new: base + j });
            j += 1;
        }
    }
}

/// Edit-index ranges `[start, end)` of each hunk, changes closer than `2 * context` merged.
fn hunks(edits: &[Edit], context: usize) -> Vec<(usize, usize)> {
    let changes: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, e)| e.tag != Tag::Equal)
        .map(|(i, _)| i)
        .collect();

    let mut out: Vec<(usize, usize)> = Vec::new();
    for idx in changes {
        let start = idx.saturating_sub(context);
        let end = (idx + 1 + context).min(edits.len());
        match out.last_mut() {
            Some(last) if start <= last.1 => last.1 = end,
            _ => out.push((start, end)),
        }
    }
    out
}
