// tests/planner_props.rs
//
// Property tests for part planning and progress aggregation.

use proptest::prelude::*;
use s3mpu::constants::{MAX_MULTIPART_PARTS, MIN_S3_MULTIPART_PART_SIZE};
use s3mpu::{ProgressAggregator, plan};

const MIB: u64 = 1024 * 1024;

proptest! {
    #[test]
    fn props_parts_partition_the_file(
        file_size in 1u64..(200 * MIB),
        part_size in MIN_S3_MULTIPART_PART_SIZE..(64 * MIB),
    ) {
        let plan = plan(file_size, part_size).unwrap();

        prop_assert_eq!(plan.part_count() as u64, file_size.div_ceil(part_size));
        prop_assert_eq!(plan.parts.first().map(|p| p.start), Some(0));
        prop_assert_eq!(plan.parts.last().map(|p| p.end), Some(file_size));

        let mut expected_start = 0;
        for (i, part) in plan.parts.iter().enumerate() {
            prop_assert_eq!(part.part_number as usize, i + 1);
            prop_assert_eq!(part.start, expected_start);
            prop_assert!(!part.is_empty());
            if i + 1 < plan.part_count() {
                prop_assert_eq!(part.len(), part_size);
            } else {
                prop_assert!(part.len() <= part_size);
            }
            expected_start = part.end;
        }
        prop_assert_eq!(plan.parts.iter().map(|p| p.len()).sum::<u64>(), file_size);
    }

    #[test]
    fn props_planning_is_deterministic(
        file_size in 1u64..(1024 * MIB),
        part_size in MIN_S3_MULTIPART_PART_SIZE..(128 * MIB),
    ) {
        prop_assert_eq!(plan(file_size, part_size).unwrap(), plan(file_size, part_size).unwrap());
    }

    #[test]
    fn props_part_limit_is_enforced(
        part_size in MIN_S3_MULTIPART_PART_SIZE..(6 * MIB),
        extra in 1u64..MIB,
    ) {
        let at_limit = part_size * MAX_MULTIPART_PARTS;
        prop_assert!(plan(at_limit, part_size).is_ok());
        prop_assert!(plan(at_limit + extra, part_size).is_err());
    }

    #[test]
    fn props_snapshot_is_sum_of_latest_values(
        updates in prop::collection::vec((1u32..=8, 0u64..=1000), 0..200)
    ) {
        let agg = ProgressAggregator::new(8, 8000);
        let mut latest = [0u64; 8];
        for (part, bytes) in &updates {
            agg.record_part_progress(*part, *bytes);
            latest[(*part - 1) as usize] = *bytes;
        }

        let snap = agg.snapshot();
        let expected: u64 = latest.iter().sum();
        prop_assert_eq!(snap.transferred_bytes, expected);
        prop_assert_eq!(snap.total_bytes, 8000);
        prop_assert!(snap.percentage <= 100);
        prop_assert_eq!(
            snap.percentage as u64,
            ((expected as f64) * 100.0 / 8000.0).round() as u64
        );
    }
}
