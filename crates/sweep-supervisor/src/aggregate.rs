//! Fleet-wide progress arithmetic.

use std::time::Instant;

use sweep_protocol::StatusRecord;

use crate::partition::SearchRange;

/// Totals and derived metrics for one dashboard cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSummary {
    pub checked: u64,
    pub skipped: u64,
    pub filtered: u64,
    pub hidden: u64,
    pub ips: u64,
    pub instructions_so_far: u64,
    pub progress_percent: f64,
    pub elapsed_hours: f64,
    pub eta_hours: f64,
}

impl AggregateSummary {
    /// Combine the latest known records into fleet totals.
    ///
    /// Workers without a record contribute nothing; "no record" is never
    /// treated as zero. The ETA is infinite while the summed rate is zero.
    /// All counter arithmetic saturates: the inputs are whatever the
    /// workers wrote, and may overshoot a sub-range or even the u64 range.
    pub fn compute<'a>(
        records: impl IntoIterator<Item = &'a StatusRecord>,
        range: SearchRange,
        started: Instant,
        now: Instant,
    ) -> Self {
        let mut checked = 0u64;
        let mut skipped = 0u64;
        let mut filtered = 0u64;
        let mut hidden = 0u64;
        let mut ips = 0u64;
        for record in records {
            checked = checked.saturating_add(record.instructions_checked);
            skipped = skipped.saturating_add(record.instructions_skipped);
            filtered = filtered.saturating_add(record.instructions_filtered);
            hidden = hidden.saturating_add(record.hidden_instructions_found);
            ips = ips.saturating_add(record.instructions_per_sec);
        }

        let instructions_so_far = checked.saturating_add(skipped).saturating_add(filtered);
        let total = range.instruction_count();
        let progress_percent = instructions_so_far as f64 / total as f64 * 100.0;
        let elapsed_hours = now.duration_since(started).as_secs_f64() / 3600.0;
        let eta_hours = if ips == 0 {
            f64::INFINITY
        } else {
            total.saturating_sub(instructions_so_far) as f64 / ips as f64 / 3600.0
        };

        Self {
            checked,
            skipped,
            filtered,
            hidden,
            ips,
            instructions_so_far,
            progress_percent,
            elapsed_hours,
            eta_hours,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn record(checked: u64, skipped: u64, filtered: u64, hidden: u64, ips: u64) -> StatusRecord {
        StatusRecord {
            insn: "0x0".to_string(),
            cs_disas: String::new(),
            libopcodes_disas: String::new(),
            instructions_checked: checked,
            instructions_skipped: skipped,
            instructions_filtered: filtered,
            hidden_instructions_found: hidden,
            instructions_per_sec: ips,
        }
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_sums_across_workers() {
        let records = [record(10, 5, 0, 1, 100), record(20, 0, 0, 0, 0)];
        let now = Instant::now();
        let summary =
            AggregateSummary::compute(records.iter(), SearchRange { start: 0, end: 99 }, now, now);

        assert_eq!(summary.checked, 30);
        assert_eq!(summary.skipped, 5);
        assert_eq!(summary.filtered, 0);
        assert_eq!(summary.hidden, 1);
        assert_eq!(summary.ips, 100);
        assert_eq!(summary.instructions_so_far, 35);
        assert!(approx(summary.progress_percent, 35.0));
        assert!(summary.eta_hours.is_finite());
        // 65 instructions left at 100 per second
        assert!(approx(summary.eta_hours, 65.0 / 100.0 / 3600.0));
    }

    #[test]
    fn test_eta_infinite_when_fleet_is_idle() {
        let records = [record(10, 0, 0, 0, 0), record(20, 0, 0, 0, 0)];
        let now = Instant::now();
        let summary =
            AggregateSummary::compute(records.iter(), SearchRange { start: 0, end: 99 }, now, now);

        assert!(summary.eta_hours.is_infinite());
        assert!(summary.eta_hours.is_sign_positive());
    }

    #[test]
    fn test_empty_table_sums_to_zero() {
        let now = Instant::now();
        let summary = AggregateSummary::compute(
            std::iter::empty(),
            SearchRange { start: 0, end: u32::MAX },
            now,
            now,
        );

        assert_eq!(summary.instructions_so_far, 0);
        assert!(approx(summary.progress_percent, 0.0));
        assert!(summary.eta_hours.is_infinite());
    }

    #[test]
    fn test_elapsed_hours() {
        let started = Instant::now();
        let now = started + Duration::from_secs(2 * 3600);
        let summary = AggregateSummary::compute(
            std::iter::empty(),
            SearchRange { start: 0, end: 99 },
            started,
            now,
        );

        assert!(approx(summary.elapsed_hours, 2.0));
    }

    #[test]
    fn test_remaining_saturates_when_counters_overshoot() {
        let records = [record(200, 0, 0, 0, 10)];
        let now = Instant::now();
        let summary =
            AggregateSummary::compute(records.iter(), SearchRange { start: 0, end: 99 }, now, now);

        assert!(approx(summary.eta_hours, 0.0));
        assert!(summary.progress_percent > 100.0);
    }

    #[test]
    fn test_totals_saturate_instead_of_wrapping() {
        let records = [record(u64::MAX, 1, 0, 0, u64::MAX), record(5, 0, 0, 0, 1)];
        let now = Instant::now();
        let summary =
            AggregateSummary::compute(records.iter(), SearchRange { start: 0, end: 99 }, now, now);

        assert_eq!(summary.checked, u64::MAX);
        assert_eq!(summary.ips, u64::MAX);
        assert_eq!(summary.instructions_so_far, u64::MAX);
        assert!(summary.eta_hours.is_finite());
        assert!(summary.eta_hours >= 0.0);
    }
}
