use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;

use shipdock::analysis::{
    align_nearest, build_package, AnalysisError, MitigationPeriod, NoiseRange, RangeBin,
    TempRange, ViewName,
};
use shipdock::record::{EnvironmentalRecord, FulfillmentRecord, OrderId};

fn at(month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, hour, minute, 0)
        .single()
        .expect("valid timestamp")
}

fn order(id: &str, pack_date: DateTime<Utc>, defect: Option<&str>) -> FulfillmentRecord {
    FulfillmentRecord {
        order_id: OrderId(id.to_string()),
        timestamp: Some(pack_date),
        ship_date: Some(pack_date + chrono::Duration::hours(6)),
        pack_date,
        defect_reported: defect.map(|d| json!(d)),
        metadata: serde_json::Map::new(),
    }
}

fn reading(timestamp: DateTime<Utc>, noise_level: f64, temperature: f64) -> EnvironmentalRecord {
    EnvironmentalRecord {
        timestamp,
        noise_level,
        temperature,
    }
}

/// A few days of orders across both periods with readings every two hours.
fn warehouse_week() -> (Vec<FulfillmentRecord>, Vec<EnvironmentalRecord>) {
    let mut orders = Vec::new();
    let mut readings = Vec::new();

    for (month, day) in [(6, 10), (7, 22), (8, 5), (9, 14)] {
        for hour in (6..20).step_by(2) {
            let noise = 22.0 + f64::from(hour) * 2.7 + f64::from(day % 5);
            let temp = 61.0 + f64::from(hour) * 1.3 + f64::from(month);
            readings.push(reading(at(month, day, hour, 0), noise, temp));
        }
        for i in 0..12u32 {
            let hour = 6 + i;
            let id = format!("{month}-{day}-{i}");
            let defect = (i % 3 == 0).then_some("crushed corner");
            orders.push(order(&id, at(month, day, hour, 17), defect));
        }
    }

    // One reading far outside the bins so some records go unbinned.
    readings.push(reading(at(9, 14, 23, 0), 95.0, 101.0));
    orders.push(order("late", at(9, 14, 22, 50), None));

    (orders, readings)
}

#[test]
fn test_as_of_join_literal_pairings() {
    let orders = vec![
        order("a", at(8, 1, 10, 0), None),
        order("b", at(8, 1, 11, 30), None),
        order("c", at(8, 1, 14, 0), None),
    ];
    let readings = vec![
        reading(at(8, 1, 13, 55), 45.0, 80.0),
        reading(at(8, 1, 10, 5), 35.0, 70.0),
        reading(at(8, 1, 11, 0), 40.0, 75.0),
    ];

    let merged = align_nearest(&orders, &readings).expect("align");

    let pairs: Vec<_> = merged
        .iter()
        .map(|r| (r.order_id.0.as_str(), r.sensor_timestamp))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("a", at(8, 1, 10, 5)),
            ("b", at(8, 1, 11, 0)),
            ("c", at(8, 1, 13, 55)),
        ]
    );
    assert_eq!(merged[1].noise_level, 40.0);
    assert_eq!(merged[1].temperature, 75.0);
}

#[test]
fn test_empty_inputs_are_errors() {
    let orders = vec![order("a", at(6, 1, 9, 0), None)];
    let readings = vec![reading(at(6, 1, 9, 0), 40.0, 70.0)];

    assert_eq!(
        build_package(&[], &readings).err(),
        Some(AnalysisError::EmptyFulfillment)
    );
    assert_eq!(
        build_package(&orders, &[]).err(),
        Some(AnalysisError::EmptyEnvironmental)
    );
}

#[test]
fn test_four_orders_end_to_end() {
    let orders = vec![
        order("1", at(6, 15, 9, 0), Some("scuffed")),
        order("2", at(7, 2, 9, 0), None),
        order("3", at(8, 20, 9, 0), Some("wrong item")),
        order("4", at(9, 3, 9, 0), None),
    ];
    let readings = vec![
        reading(at(6, 15, 9, 0), 55.0, 82.0),
        reading(at(7, 2, 9, 0), 55.0, 82.0),
        reading(at(8, 20, 9, 0), 35.0, 67.0),
        reading(at(9, 3, 9, 0), 35.0, 67.0),
    ];

    let package = build_package(&orders, &readings).expect("package");

    for period in MitigationPeriod::ALL {
        let row = package.grouped_all_defects.get(period).expect("period row");
        assert_eq!(row.total_orders, 2);
        assert_eq!(row.defect_count, 1);
        assert_eq!(row.defect_rate, Some(0.5));
    }

    assert_eq!(
        package
            .pivot_pre
            .cell(TempRange::F80To85, NoiseRange::Db50To60),
        Some(0.5)
    );
    assert_eq!(
        package
            .pivot_post
            .cell(TempRange::F65To70, NoiseRange::Db30To40),
        Some(0.5)
    );
    assert_eq!(
        package
            .pivot_pre
            .cell(TempRange::F65To70, NoiseRange::Db30To40),
        None
    );
}

#[test]
fn test_group_counts_sum_to_record_counts() {
    let (orders, readings) = warehouse_week();
    let package = build_package(&orders, &readings).expect("package");

    assert_eq!(package.merged.len(), orders.len());

    let binned_temp = package
        .merged
        .iter()
        .filter(|r| r.temp_range.is_some())
        .count() as u64;
    let temp_total: u64 = package.grouped_temp.rows.iter().map(|r| r.total_orders).sum();
    assert_eq!(temp_total, binned_temp);
    assert_eq!(temp_total + package.grouped_temp.unbinned, orders.len() as u64);

    let noise_total: u64 = package.grouped_noise.rows.iter().map(|r| r.total_orders).sum();
    assert_eq!(noise_total + package.grouped_noise.unbinned, orders.len() as u64);

    let period_total: u64 = package
        .grouped_all_defects
        .rows
        .iter()
        .map(|r| r.total_orders)
        .sum();
    assert_eq!(period_total, orders.len() as u64);

    let defects = orders.iter().filter(|o| o.has_defect()).count() as u64;
    let period_defects: u64 = package
        .grouped_all_defects
        .rows
        .iter()
        .map(|r| r.defect_count)
        .sum();
    assert_eq!(period_defects, defects);

    for row in &package.grouped_temp.rows {
        assert!(row.defect_count <= row.total_orders);
        match row.defect_rate {
            Some(rate) => assert!((0.0..=1.0).contains(&rate)),
            None => assert_eq!(row.total_orders, 0),
        }
    }
}

#[test]
fn test_pivots_partition_binned_records_by_period() {
    let (orders, readings) = warehouse_week();
    let package = build_package(&orders, &readings).expect("package");

    for period in MitigationPeriod::ALL {
        let binned = package
            .merged
            .iter()
            .filter(|r| r.mitigation_period == period && r.is_binned())
            .count() as u64;
        assert_eq!(package.pivot(period).total_orders(), binned);
    }

    // A cell holds orders from one period only.
    for t in TempRange::ALL {
        for n in NoiseRange::ALL {
            let pre = package.pivot_pre.order_count[t.index()][n.index()];
            let post = package.pivot_post.order_count[t.index()][n.index()];
            let expected = package
                .merged
                .iter()
                .filter(|r| r.temp_range == Some(t) && r.noise_level_range == Some(n))
                .count() as u64;
            assert_eq!(pre + post, expected);
        }
    }
}

#[test]
fn test_rebuilding_is_deterministic() {
    let (orders, readings) = warehouse_week();
    let first = build_package(&orders, &readings).expect("first");
    let second = build_package(&orders, &readings).expect("second");

    for view in ViewName::ALL {
        assert_eq!(
            first.view_json(view).expect("first view"),
            second.view_json(view).expect("second view"),
            "view {view} differs between builds",
        );
    }
}

#[test]
fn test_undefined_rates_serialise_as_null() {
    let orders = vec![order("1", at(6, 3, 12, 0), Some("dent"))];
    let readings = vec![reading(at(6, 3, 12, 0), 45.0, 72.0)];
    let package = build_package(&orders, &readings).expect("package");

    let totals = package
        .view_json(ViewName::GroupedAllDefects)
        .expect("json");
    assert_eq!(totals["rows"][0]["defect_rate"], json!(1.0));
    assert_eq!(totals["rows"][1]["mitigation_period"], json!("post"));
    assert_eq!(totals["rows"][1]["defect_rate"], json!(null));

    let pivot = package.view_json(ViewName::PivotPost).expect("json");
    assert!(pivot["defect_rate"]
        .as_array()
        .expect("rows")
        .iter()
        .flat_map(|row| row.as_array().expect("cells"))
        .all(|cell| cell.is_null()));
}
