//! Longest increasing subsequence.
//!
//! Used by the keyed diff to find the largest set of children that can stay
//! where they are. Runs in O(n log n): `tails[k]` holds the index of the
//! smallest value ending an increasing run of length `k + 1`, and each entry
//! remembers its predecessor so the run can be rebuilt at the end.

/// Indices (ascending) of one longest strictly increasing subsequence of
/// `seq`, skipping `None` entries.
pub fn longest_increasing_subsequence(seq: &[Option<usize>]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut predecessors: Vec<Option<usize>> = vec![None; seq.len()];

    for (index, value) in seq.iter().enumerate() {
        let Some(value) = *value else {
            continue;
        };
        let position = tails.partition_point(|&tail| seq[tail].is_some_and(|tail_value| tail_value < value));
        if position > 0 {
            predecessors[index] = Some(tails[position - 1]);
        }
        if position == tails.len() {
            tails.push(index);
        } else {
            tails[position] = index;
        }
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut current = tails.last().copied();
    while let Some(index) = current {
        result.push(index);
        current = predecessors[index];
    }
    result.reverse();
    result
}
