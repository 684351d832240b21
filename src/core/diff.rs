//! Line diff of two migration bodies, used when a stored body and the file disagree.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffLine<'a> {
    Equal(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

/// Upper bound on LCS table cells (4 bytes each) for the part that differs.
const MAX_TABLE_CELLS: usize = 1 << 22;

/// Line diff of `old` and `new`.
///
/// The common prefix and suffix are matched directly. The differing middle gets a
/// longest-common-subsequence diff while its table stays under [`MAX_TABLE_CELLS`];
/// beyond that it is reported as removed and then added in full.
pub fn diff_lines<'a>(old: &'a str, new: &'a str) -> Vec<DiffLine<'a>> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();

    let prefix = a.iter().zip(&b).take_while(|(x, y)| x == y).count();
    let suffix = a[prefix..]
        .iter()
        .rev()
        .zip(b[prefix..].iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let (mid_a, mid_b) = (&a[prefix..a.len() - suffix], &b[prefix..b.len() - suffix]);

    let mut out = Vec::with_capacity(a.len().max(b.len()));
    out.extend(a[..prefix].iter().copied().map(DiffLine::Equal));
    if (mid_a.len() + 1).saturating_mul(mid_b.len() + 1) <= MAX_TABLE_CELLS {
        lcs_diff(mid_a, mid_b, &mut out);
    } else {
        out.extend(mid_a.iter().copied().map(DiffLine::Removed));
        out.extend(mid_b.iter().copied().map(DiffLine::Added));
    }
    out.extend(a[a.len() - suffix..].iter().copied().map(DiffLine::Equal));
    out
}

fn lcs_diff<'a>(a: &[&'a str], b: &[&'a str], out: &mut Vec<DiffLine<'a>>) {
    // lcs[i * w + j] = length of the LCS of a[i..] and b[j..]
    let w = b.len() + 1;
    let mut lcs = vec![0u32; (a.len() + 1) * w];
    for i in (0..a.len()).rev() {
        for j in (0..b.len()).rev() {
            lcs[i * w + j] = if a[i] == b[j] {
                lcs[(i + 1) * w + j + 1] + 1
            } else {
                lcs[(i + 1) * w + j].max(lcs[i * w + j + 1])
            };
        }
    }

    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i] == b[j] {
            out.push(DiffLine::Equal(a[i]));
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * w + j] >= lcs[i * w + j + 1] {
            out.push(DiffLine::Removed(a[i]));
            i += 1;
        } else {
            out.push(DiffLine::Added(b[j]));
            j += 1;
        }
    }
    out.extend(a[i..].iter().copied().map(DiffLine::Removed));
    out.extend(b[j..].iter().copied().map(DiffLine::Added));
}

pub fn has_changes(lines: &[DiffLine<'_>]) -> bool {
    lines.iter().any(|l| !matches!(l, DiffLine::Equal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical() {
        let d = diff_lines("a\nb", "a\nb");
        assert_eq!(d, vec![DiffLine::Equal("a"), DiffLine::Equal("b")]);
        assert!(!has_changes(&d));
    }

    #[test]
    fn test_changed_middle_line() {
        let d = diff_lines("create table t1(id int);\nselect 1;\nend;", "create table t1(id int);\nselect 2;\nend;");
        assert_eq!(
            d,
            vec![
                DiffLine::Equal("create table t1(id int);"),
                DiffLine::Removed("select 1;"),
                DiffLine::Added("select 2;"),
                DiffLine::Equal("end;"),
            ]
        );
        assert!(has_changes(&d));
    }

    #[test]
    fn test_long_bodies_with_small_change() {
        let old: String = (0..20_000).map(|i| format!("insert into t values ({});\n", i)).collect();
        let new = old.replacen("insert into t values (10000);", "insert into t values (-1);", 1);
        let d = diff_lines(&old, &new);
        assert_eq!(d.len(), 20_001);
        let changes: Vec<_> = d.iter().filter(|l| !matches!(l, DiffLine::Equal(_))).collect();
        assert_eq!(
            changes,
            vec![&DiffLine::Removed("insert into t values (10000);"), &DiffLine::Added("insert into t values (-1);")]
        );
    }

    #[test]
    fn test_large_rewrite_is_reported_whole() {
        let old: String = (0..3_000).map(|i| format!("select {};\n", i)).collect();
        let new: String = (0..3_000).map(|i| format!("select -{};\n", i + 1)).collect();
        let d = diff_lines(&old, &new);
        assert_eq!(d.len(), 6_000);
        assert!(d[..3_000].iter().all(|l| matches!(l, DiffLine::Removed(_))));
        assert!(d[3_000..].iter().all(|l| matches!(l, DiffLine::Added(_))));
    }

    #[test]
    fn test_one_side_empty() {
        assert_eq!(diff_lines("", "x"), vec![DiffLine::Added("x")]);
        assert_eq!(diff_lines("x\ny", ""), vec![DiffLine::Removed("x"), DiffLine::Removed("y")]);
        assert!(diff_lines("", "").is_empty());
    }
}
