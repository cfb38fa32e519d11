//! Snapshot progress composition.
//!
//! Overall percent is a weighted composite of the generation steps:
//! schema 5%, table export 80%, sequences 5%, checksums 5%, finalizing 5%.
//! Within the table step, completed tables and the in-progress fraction of
//! the current table both count.

/// Generation steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Table enumeration and slot creation.
    Schema,
    /// Per-table export.
    Tables,
    /// Sequence capture.
    Sequences,
    /// Checksum recording.
    Checksums,
    /// Manifest write and status flip.
    Finalizing,
}

const SCHEMA_WEIGHT: f64 = 5.0;
const TABLES_WEIGHT: f64 = 80.0;
const SEQUENCES_WEIGHT: f64 = 5.0;
const CHECKSUMS_WEIGHT: f64 = 5.0;

/// Computes overall percent given the current step and table progress.
///
/// `tables_done_fraction` is `tables_completed + fraction_of_current`,
/// measured against `tables_total`.
pub fn overall_percent(step: Step, tables_done_fraction: f64, tables_total: u32) -> f64 {
    let table_part = if tables_total == 0 {
        1.0
    } else {
        (tables_done_fraction / f64::from(tables_total)).clamp(0.0, 1.0)
    };
    let percent = match step {
        Step::Schema => 0.0,
        Step::Tables => SCHEMA_WEIGHT + TABLES_WEIGHT * table_part,
        Step::Sequences => SCHEMA_WEIGHT + TABLES_WEIGHT,
        Step::Checksums => SCHEMA_WEIGHT + TABLES_WEIGHT + SEQUENCES_WEIGHT,
        Step::Finalizing => SCHEMA_WEIGHT + TABLES_WEIGHT + SEQUENCES_WEIGHT + CHECKSUMS_WEIGHT,
    };
    percent.clamp(0.0, 100.0)
}

/// Step name recorded in the snapshot row.
pub fn step_name(step: Step) -> &'static str {
    match step {
        Step::Schema => "schema",
        Step::Tables => "tables",
        Step::Sequences => "sequences",
        Step::Checksums => "checksums",
        Step::Finalizing => "finalizing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_accumulate() {
        assert_eq!(overall_percent(Step::Schema, 0.0, 10), 0.0);
        assert_eq!(overall_percent(Step::Tables, 0.0, 10), 5.0);
        assert_eq!(overall_percent(Step::Tables, 5.0, 10), 45.0);
        assert_eq!(overall_percent(Step::Tables, 10.0, 10), 85.0);
        assert_eq!(overall_percent(Step::Sequences, 10.0, 10), 85.0);
        assert_eq!(overall_percent(Step::Checksums, 10.0, 10), 90.0);
        assert_eq!(overall_percent(Step::Finalizing, 10.0, 10), 95.0);
    }

    #[test]
    fn partial_table_counts() {
        // 3 of 10 done plus half of the 4th
        let percent = overall_percent(Step::Tables, 3.5, 10);
        assert!((percent - (5.0 + 80.0 * 0.35)).abs() < 1e-9);
    }

    #[test]
    fn zero_tables_does_not_divide() {
        assert_eq!(overall_percent(Step::Tables, 0.0, 0), 85.0);
    }

    #[test]
    fn fraction_is_clamped() {
        assert_eq!(overall_percent(Step::Tables, 99.0, 10), 85.0);
    }
}
