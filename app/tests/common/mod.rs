//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for warehouse integration tests.

use std::path::PathBuf;

use aggregate_engine::{AggregationSpec, AggregationType, GroupValue, GroupingSpec, Measure};
use app_lib::{create_warehouse_state, AppResult, WarehouseState};
use chrono::NaiveDate;
use engine::star::{date_record, DATE_DIMENSION, PRODUCT_DIMENSION, SALES_FACT, SEGMENT_DIMENSION};
use engine::{record, LoadSummary, Value};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

/// Date ids used by the sample data.
pub const FEB_2024: i64 = 1;
pub const NOV_2023: i64 = 2;

/// Segment whose city is unknown.
pub const UNKNOWN_CITY_SEGMENT: i64 = 3;

/// Test harness for creating and managing test state.
pub struct TestHarness {
    pub state: WarehouseState,
}

impl TestHarness {
    /// Create a new test harness with the empty star schema.
    pub fn new() -> Self {
        TestHarness {
            state: create_warehouse_state().unwrap(),
        }
    }

    /// Dimensions plus two 2024 sales:
    /// S1 = NY, Laptop, 10 x 5.00 and S2 = LA, Phone, 5 x 5.00.
    pub fn with_sample_data() -> Self {
        let harness = Self::new();
        harness.populate_dimensions();
        harness.add_sale("S1", FEB_2024, 1, 1, dec!(5.00), 10).unwrap();
        harness.add_sale("S2", FEB_2024, 2, 2, dec!(5.00), 5).unwrap();
        harness
    }

    fn populate_dimensions(&self) {
        self.state
            .load_batch(
                DATE_DIMENSION,
                vec![
                    date_record(FEB_2024, NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()),
                    date_record(NOV_2023, NaiveDate::from_ymd_opt(2023, 11, 20).unwrap()),
                ],
            )
            .unwrap();
        self.state
            .load_batch(PRODUCT_DIMENSION, vec![record![1, "Laptop"], record![2, "Phone"]])
            .unwrap();
        self.state
            .load_batch(
                SEGMENT_DIMENSION,
                vec![
                    record![1, "NY"],
                    record![2, "LA"],
                    record![UNKNOWN_CITY_SEGMENT, Option::<&str>::None],
                ],
            )
            .unwrap();
    }

    /// Loads one sale as its own batch.
    pub fn add_sale(
        &self,
        sales_id: &str,
        date_id: i64,
        product_id: i64,
        segment_id: i64,
        price: Decimal,
        quantity: i64,
    ) -> AppResult<LoadSummary> {
        self.state.load_batch(
            SALES_FACT,
            vec![record![sales_id, date_id, product_id, segment_id, price, quantity]],
        )
    }

    pub fn sales_count(&self) -> usize {
        let catalog = self.state.catalog.read().unwrap();
        catalog.store(SALES_FACT).unwrap().len()
    }

    pub fn version(&self) -> u64 {
        self.state.catalog.read().unwrap().version()
    }
}

/// A temporary directory with helpers for snapshot and CSV files.
pub struct TempFiles {
    pub dir: TempDir,
}

impl TempFiles {
    pub fn new() -> Self {
        TempFiles {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).unwrap();
        path
    }
}

pub fn attrs(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// SUM(price_per_unit * quantity_sold) with a rollup over `names`.
pub fn revenue_rollup(names: &[&str]) -> AggregationSpec {
    AggregationSpec::sales(
        Measure::revenue(AggregationType::Sum),
        GroupingSpec::Rollup(attrs(names)),
    )
}

pub fn total() -> GroupValue {
    GroupValue::Total
}

pub fn v(value: impl Into<Value>) -> GroupValue {
    GroupValue::value(value)
}

pub const DATES_CSV: &str = "date_id,full_date,year,quarter,quarter_label,month,month_name,day,weekday,weekday_name\n\
                             1,2024-02-01,2024,1,Q1,2,February,1,4,Thursday\n\
                             2,2023-11-20,2023,4,Q4,11,November,20,1,Monday\n";

pub const PRODUCTS_CSV: &str = "product_type,product_id\nLaptop,1\nPhone,2\n";

pub const SEGMENTS_CSV: &str = "segment_id,city\n1,NY\n2,LA\n3,\n";

pub const SALES_CSV: &str = "sales_id,date_id,product_id,segment_id,price_per_unit,quantity_sold\n\
                             S1,1,1,1,5.00,10\n\
                             S2,1,2,2,5.00,5\n";
