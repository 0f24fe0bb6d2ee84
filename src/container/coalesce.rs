//! Range coalescing for batched container reads.
//!
//! Scattered request indices are stable-sorted and merged into maximal runs of
//! consecutive container rows. Each run becomes a single range read instead of
//! one read per row. Duplicate indices differ by 0 in the sorted order, so
//! they terminate a run and each occurrence is fetched independently.

/// A maximal run of consecutive container rows, plus the request positions it
/// serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRun {
    /// First container row of the run.
    pub start: usize,
    /// Last container row of the run, inclusive.
    pub end: usize,
    /// `(request_position, container_row)` pairs covered by this run, in
    /// sorted row order.
    pub entries: Vec<(usize, usize)>,
}

/// Merge request indices into maximal contiguous runs.
///
/// Runs are produced in ascending row order. Every request position appears in
/// exactly one run, so scattering run results back by position reconstructs
/// the request order.
pub fn coalesce(indices: &[usize]) -> Vec<IndexRun> {
    if indices.is_empty() {
        return Vec::new();
    }

    let mut order: Vec<(usize, usize)> = indices.iter().copied().enumerate().collect();
    order.sort_by_key(|&(_, index)| index);

    let mut runs = Vec::new();
    let mut i = 0;
    while i < order.len() {
        let start = order[i].1;
        let mut j = i;
        while j + 1 < order.len() && order[j + 1].1 == order[j].1 + 1 {
            j += 1;
        }
        runs.push(IndexRun {
            start,
            end: order[j].1,
            entries: order[i..=j].to_vec(),
        });
        i = j + 1;
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bounds(runs: &[IndexRun]) -> Vec<(usize, usize)> {
        runs.iter().map(|r| (r.start, r.end)).collect()
    }

    #[test]
    fn test_empty_indices() {
        assert!(coalesce(&[]).is_empty());
    }

    #[test]
    fn test_three_runs() {
        let runs = coalesce(&[4, 5, 6, 1, 9, 10]);
        assert_eq!(bounds(&runs), vec![(1, 1), (4, 6), (9, 10)]);

        // Every request position appears exactly once across all runs.
        let mut positions: Vec<usize> = runs
            .iter()
            .flat_map(|r| r.entries.iter().map(|&(pos, _)| pos))
            .collect();
        positions.sort();
        assert_eq!(positions, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_single_run_spans_everything() {
        let runs = coalesce(&[2, 0, 1, 3]);
        assert_eq!(bounds(&runs), vec![(0, 3)]);
        assert_eq!(runs[0].entries, vec![(1, 0), (2, 1), (0, 2), (3, 3)]);
    }

    #[test]
    fn test_duplicates_break_runs() {
        // Sorted rows are [2, 2, 3]; the repeated 2 ends the first run.
        let runs = coalesce(&[2, 2, 3]);
        assert_eq!(bounds(&runs), vec![(2, 2), (2, 3)]);
    }

    #[test]
    fn test_single_index() {
        let runs = coalesce(&[7]);
        assert_eq!(bounds(&runs), vec![(7, 7)]);
        assert_eq!(runs[0].entries, vec![(0, 7)]);
    }
}
