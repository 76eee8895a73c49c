use std::collections::{HashMap, VecDeque};

use crate::domain::fingerprint::{fingerprint_row, RowFingerprint};
use crate::domain::reconciliation::MatchResult;
use crate::domain::value::{comparable_text, CellValue, Row};
use crate::domain::value_objects::ExcludedColumns;

// ─── Fingerprint matching ───

/// Pair rows of both sides by fingerprint, multiplicity-aware.
///
/// Each row of A takes the earliest unclaimed row of B with the same
/// fingerprint. Duplicates are kept: three identical rows against two give
/// two pairs and one leftover. Matched pairs follow A's order, `only_in_a`
/// follows A's order and `only_in_b` follows B's order, so the result is
/// fully deterministic for a given input.
pub fn match_rows<'a>(
    rows_a: &'a [Row],
    rows_b: &'a [Row],
    excluded: &ExcludedColumns,
    case_sensitive: bool,
) -> MatchResult<'a> {
    let mut index_b: HashMap<RowFingerprint, VecDeque<usize>> = HashMap::new();
    for (i, row) in rows_b.iter().enumerate() {
        index_b
            .entry(fingerprint_row(row, excluded, case_sensitive))
            .or_default()
            .push_back(i);
    }

    let mut claimed = vec![false; rows_b.len()];
    let mut result = MatchResult::default();

    for row_a in rows_a {
        let fp = fingerprint_row(row_a, excluded, case_sensitive);
        match index_b.get_mut(&fp).and_then(VecDeque::pop_front) {
            Some(j) => {
                claimed[j] = true;
                result.matched.push((row_a, &rows_b[j]));
            }
            None => result.only_in_a.push(row_a),
        }
    }

    result.only_in_b = rows_b
        .iter()
        .zip(&claimed)
        .filter(|(_, taken)| !**taken)
        .map(|(row, _)| row)
        .collect();

    result
}

// ─── Key pairing of leftovers ───

/// Join key values into one comparable string. `None` when any key cell is
/// missing or NULL: such rows are never paired by key.
fn key_of(row: &Row, key_columns: &[String], case_sensitive: bool) -> Option<String> {
    let mut parts = Vec::with_capacity(key_columns.len());
    for col in key_columns {
        match row.get(col) {
            None | Some(CellValue::Null) => return None,
            Some(CellValue::Text(s)) => parts.push(comparable_text(s, case_sensitive)),
            Some(v) => parts.push(v.to_string()),
        }
    }
    Some(parts.join("\u{1f}"))
}

/// Move leftover rows that share the same key values on both sides into
/// `matched`, so an edited row shows up as a field difference rather than
/// as one row only in A plus one row only in B.
///
/// Rows with equal keys pair positionally, in encounter order. Row counts
/// are preserved: the completeness invariant of [`MatchResult`] still holds.
/// Returns the number of pairs added.
pub fn pair_by_key(result: &mut MatchResult<'_>, key_columns: &[String], case_sensitive: bool) -> usize {
    if key_columns.is_empty() || result.only_in_a.is_empty() || result.only_in_b.is_empty() {
        return 0;
    }

    let mut index_b: HashMap<String, VecDeque<usize>> = HashMap::new();
    for (i, row) in result.only_in_b.iter().enumerate() {
        if let Some(key) = key_of(row, key_columns, case_sensitive) {
            index_b.entry(key).or_default().push_back(i);
        }
    }
    if index_b.is_empty() {
        return 0;
    }

    let mut claimed = vec![false; result.only_in_b.len()];
    let mut still_a = Vec::with_capacity(result.only_in_a.len());
    let mut paired = 0;

    for row_a in result.only_in_a.drain(..) {
        let slot = key_of(row_a, key_columns, case_sensitive)
            .and_then(|k| index_b.get_mut(&k).and_then(VecDeque::pop_front));
        match slot {
            Some(j) => {
                claimed[j] = true;
                result.matched.push((row_a, result.only_in_b[j]));
                paired += 1;
            }
            None => still_a.push(row_a),
        }
    }

    result.only_in_a = still_a;
    let only_in_b = std::mem::take(&mut result.only_in_b);
    result.only_in_b = only_in_b
        .into_iter()
        .zip(claimed)
        .filter(|(_, taken)| !taken)
        .map(|(row, _)| row)
        .collect();

    paired
}
