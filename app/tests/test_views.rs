//! FILENAME: app/tests/test_views.rs
//! PURPOSE: Tests for materialized views, snapshots and concurrent access.

mod common;

use std::thread;

use aggregate_engine::MaterializedAggregate;
use app_lib::{WarehouseConfig, WarehouseState};
use common::{revenue_rollup, total, TempFiles, TestHarness, DATES_CSV, FEB_2024, PRODUCTS_CSV, SALES_CSV, SEGMENTS_CSV};
use engine::WarehouseError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn grand_total(view: &MaterializedAggregate) -> Option<Decimal> {
    view.result.measure_of(&[total()])
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[test]
fn test_read_is_stale_until_refresh() {
    let harness = TestHarness::with_sample_data();
    harness.state.materialize("by_city", revenue_rollup(&["city"])).unwrap();

    harness.add_sale("S3", FEB_2024, 1, 1, dec!(5.00), 1).unwrap();

    let before = harness.state.read_view("by_city").unwrap();
    assert_eq!(grand_total(&before), Some(dec!(75.00)));
    assert!(harness.state.view_is_stale("by_city").unwrap());

    let refreshed = harness.state.refresh_view("by_city").unwrap();
    assert_eq!(grand_total(&refreshed), Some(dec!(80.00)));
    assert_eq!(grand_total(&harness.state.read_view("by_city").unwrap()), Some(dec!(80.00)));
    assert!(!harness.state.view_is_stale("by_city").unwrap());
}

#[test]
fn test_materialize_name_conflict() {
    let harness = TestHarness::with_sample_data();
    harness.state.materialize("v", revenue_rollup(&["city"])).unwrap();

    let err = harness.state.materialize("v", revenue_rollup(&["year"])).unwrap_err();
    assert!(matches!(err.warehouse(), Some(WarehouseError::NameConflict(_))));
    // The original definition is untouched
    assert_eq!(
        harness.state.read_view("v").unwrap().result.attributes,
        vec!["city".to_string()]
    );
}

#[test]
fn test_drop_then_read_not_found() {
    let harness = TestHarness::with_sample_data();
    harness.state.materialize("v", revenue_rollup(&["city"])).unwrap();

    harness.state.drop_view("v").unwrap();

    let err = harness.state.read_view("v").unwrap_err();
    assert!(matches!(err.warehouse(), Some(WarehouseError::NotFound(_))));
    let err = harness.state.refresh_view("v").unwrap_err();
    assert!(matches!(err.warehouse(), Some(WarehouseError::NotFound(_))));
    assert!(harness.state.view_names().unwrap().is_empty());
}

#[test]
fn test_failed_materialize_adds_nothing() {
    let harness = TestHarness::with_sample_data();
    assert!(harness.state.materialize("v", revenue_rollup(&["colour"])).is_err());
    assert!(harness.state.view_names().unwrap().is_empty());
}

// ============================================================================
// SNAPSHOTS & CONFIG
// ============================================================================

#[test]
fn test_snapshot_round_trip_keeps_views_as_saved() {
    let harness = TestHarness::with_sample_data();
    let files = TempFiles::new();
    let path = files.path("warehouse.starwh");

    harness.state.materialize("by_city", revenue_rollup(&["city"])).unwrap();
    harness.add_sale("S3", FEB_2024, 2, 1, dec!(1.00), 1).unwrap();
    harness.state.save_snapshot(&path).unwrap();

    let reopened = WarehouseState::open_snapshot(&path).unwrap();

    let view = reopened.read_view("by_city").unwrap();
    assert_eq!(grand_total(&view), Some(dec!(75.00)));
    assert!(reopened.view_is_stale("by_city").unwrap());
    assert_eq!(
        reopened.aggregate(&revenue_rollup(&["city"])).unwrap(),
        harness.state.aggregate(&revenue_rollup(&["city"])).unwrap()
    );

    let refreshed = reopened.refresh_view("by_city").unwrap();
    assert_eq!(grand_total(&refreshed), Some(dec!(76.00)));
}

#[test]
fn test_apply_config_loads_sources_then_views() {
    let files = TempFiles::new();
    files.write("dates.csv", DATES_CSV);
    files.write("products.csv", PRODUCTS_CSV);
    files.write("segments.csv", SEGMENTS_CSV);
    files.write("sales.csv", SALES_CSV);
    let config_path = files.write(
        "warehouse.json",
        r#"{
            "sources": [
                { "entity": "dim_date", "path": "dates.csv" },
                { "entity": "dim_product", "path": "products.csv" },
                { "entity": "dim_customer_segment", "path": "segments.csv" },
                { "entity": "fact_sales", "path": "sales.csv" }
            ],
            "views": [{
                "name": "year_city",
                "spec": {
                    "measure": {
                        "aggregation": "Sum",
                        "operand": { "Product": ["price_per_unit", "quantity_sold"] }
                    },
                    "grouping": { "Rollup": ["year", "city"] }
                }
            }]
        }"#,
    );

    let config = WarehouseConfig::load(&config_path).unwrap();
    let harness = TestHarness::new();
    let loads = harness.state.apply_config(&config).unwrap();

    assert_eq!(loads.len(), 4);
    assert_eq!(loads[3].rows_loaded, 2);
    let view = harness.state.read_view("year_city").unwrap();
    assert_eq!(view.result.len(), 4);
    assert_eq!(grand_total_2d(&view), Some(dec!(75.00)));

    // Applying again refreshes the existing view instead of conflicting
    assert!(harness.state.apply_config(&WarehouseConfig { sources: vec![], ..config }).is_ok());
    assert_eq!(harness.state.read_view("year_city").unwrap().refresh_count, 1);
}

fn grand_total_2d(view: &MaterializedAggregate) -> Option<Decimal> {
    view.result.measure_of(&[total(), total()])
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[test]
fn test_readers_see_whole_batches_only() {
    let harness = TestHarness::with_sample_data();
    harness.state.materialize("by_city", revenue_rollup(&["city"])).unwrap();

    thread::scope(|scope| {
        let writer = scope.spawn(|| {
            for i in 0..50 {
                // Each batch adds exactly 1.00 of revenue in two rows
                harness
                    .state
                    .load_batch(
                        engine::star::SALES_FACT,
                        vec![
                            engine::record![format!("A{}", i), FEB_2024, 1, 1, dec!(0.50), 1],
                            engine::record![format!("B{}", i), FEB_2024, 2, 2, dec!(0.50), 1],
                        ],
                    )
                    .unwrap();
                if i % 10 == 0 {
                    harness.state.refresh_view("by_city").unwrap();
                }
            }
        });

        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..50 {
                    let result = harness.state.aggregate(&revenue_rollup(&["city"])).unwrap();
                    let sum = result.measure_of(&[total()]).unwrap();
                    // 75.00 plus a whole number of batches
                    assert_eq!(sum.fract(), Decimal::ZERO);

                    let view = harness.state.read_view("by_city").unwrap();
                    assert_eq!(grand_total(&view).unwrap().fract(), Decimal::ZERO);
                }
            });
        }

        writer.join().unwrap();
    });

    assert_eq!(harness.sales_count(), 102);
    let final_total = harness.state.refresh_view("by_city").unwrap();
    assert_eq!(grand_total(&final_total), Some(dec!(125.00)));
}
