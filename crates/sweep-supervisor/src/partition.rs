//! Splitting the instruction space across workers.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SupervisorError;

/// Closed interval of instruction encodings, `start ..= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRange {
    pub start: u32,
    pub end: u32,
}

impl SearchRange {
    pub fn new(start: u32, end: u32) -> Result<Self, SupervisorError> {
        if end < start {
            return Err(SupervisorError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of encodings in the range. The full 32-bit space holds 2^32
    /// encodings, one more than `u32::MAX`.
    pub fn instruction_count(&self) -> u64 {
        self.end as u64 - self.start as u64 + 1
    }
}

impl fmt::Display for SearchRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}..{:#010x}", self.start, self.end)
    }
}

/// One worker's share of the search space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerAssignment {
    pub id: usize,
    pub range: SearchRange,
}

/// Split `range` into `workers` contiguous sub-ranges covering it exactly.
///
/// Every worker gets `floor(count / workers)` encodings; the last worker's
/// upper bound is forced to `range.end`, absorbing the division remainder.
pub fn partition(
    range: SearchRange,
    workers: usize,
) -> Result<Vec<WorkerAssignment>, SupervisorError> {
    if workers == 0 {
        return Err(SupervisorError::NoWorkers);
    }
    let total = range.instruction_count();
    let chunk = total / workers as u64;
    if chunk == 0 {
        return Err(SupervisorError::TooManyWorkers {
            workers,
            instructions: total,
        });
    }

    let mut assignments = Vec::with_capacity(workers);
    for id in 0..workers {
        let start = range.start as u64 + chunk * id as u64;
        let end = if id == workers - 1 {
            range.end as u64
        } else {
            start + chunk - 1
        };
        assignments.push(WorkerAssignment {
            id,
            range: SearchRange {
                start: start as u32,
                end: end as u32,
            },
        });
    }
    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(start: u32, end: u32) -> SearchRange {
        SearchRange::new(start, end).unwrap()
    }

    #[test]
    fn test_even_split() {
        let assignments = partition(range(0, 99), 4).unwrap();
        let bounds: Vec<(u32, u32)> = assignments
            .iter()
            .map(|a| (a.range.start, a.range.end))
            .collect();
        assert_eq!(bounds, vec![(0, 24), (25, 49), (50, 74), (75, 99)]);
    }

    #[test]
    fn test_last_worker_absorbs_remainder() {
        let assignments = partition(range(0, 100), 4).unwrap();
        assert_eq!(assignments[2].range.end, 74);
        assert_eq!(assignments[3].range.start, 75);
        assert_eq!(assignments[3].range.end, 100);
    }

    #[test]
    fn test_single_worker_gets_everything() {
        let assignments = partition(range(5, 10), 1).unwrap();
        assert_eq!(assignments.len(), 1);
        assert_eq!(assignments[0].id, 0);
        assert_eq!(assignments[0].range, range(5, 10));
    }

    #[test]
    fn test_full_space_is_covered_without_gaps() {
        let full = range(0, u32::MAX);
        let assignments = partition(full, 12).unwrap();

        assert_eq!(assignments[0].range.start, 0);
        assert_eq!(assignments.last().unwrap().range.end, u32::MAX);
        for pair in assignments.windows(2) {
            assert_eq!(pair[1].range.start, pair[0].range.end + 1);
        }
        for (id, assignment) in assignments.iter().enumerate() {
            assert_eq!(assignment.id, id);
            assert!(assignment.range.start <= assignment.range.end);
        }

        let covered: u64 = assignments
            .iter()
            .map(|a| a.range.instruction_count())
            .sum();
        assert_eq!(covered, full.instruction_count());
    }

    #[test]
    fn test_rejects_zero_workers() {
        assert!(matches!(
            partition(range(0, 99), 0),
            Err(SupervisorError::NoWorkers)
        ));
    }

    #[test]
    fn test_rejects_more_workers_than_instructions() {
        assert!(matches!(
            partition(range(0, 3), 5),
            Err(SupervisorError::TooManyWorkers {
                workers: 5,
                instructions: 4,
            })
        ));
    }

    #[test]
    fn test_rejects_inverted_range() {
        assert!(matches!(
            SearchRange::new(10, 5),
            Err(SupervisorError::InvalidRange { start: 10, end: 5 })
        ));
    }

    #[test]
    fn test_instruction_count_of_full_space() {
        assert_eq!(range(0, u32::MAX).instruction_count(), 1u64 << 32);
    }
}
