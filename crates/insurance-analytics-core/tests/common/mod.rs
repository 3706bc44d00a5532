#![allow(dead_code)]

use std::collections::HashMap;

use insurance_analytics_core::insurers::{InsurerDirectory, InsurerEntry};
use insurance_analytics_core::lines::{LineNode, LineTree};
use insurance_analytics_core::{
    DataStore, FactRecord, Frame, ReportingForm, YearQuarter, ROOT_LINE,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

pub const INSURERS: [&str; 7] = ["1001", "1002", "1003", "1004", "1005", "1006", "1007"];
pub const LEAF_LINES: [&str; 3] = ["3.1", "3.2", "4.1.1"];

/// Metrics sourced in the sample form and their scale against premiums.
pub const RAW_METRICS: [(&str, Decimal); 6] = [
    ("direct_premiums", dec!(1)),
    ("direct_losses", dec!(0.5)),
    ("inward_premiums", dec!(0.1)),
    ("inward_losses", dec!(0.05)),
    ("ceded_premiums", dec!(0.2)),
    ("ceded_losses", dec!(0.08)),
];

pub fn yq(s: &str) -> YearQuarter {
    s.parse().unwrap()
}

pub fn strings(v: &[&str]) -> Vec<String> {
    v.iter().map(|s| s.to_string()).collect()
}

/// 2023Q1 through 2024Q3.
pub fn sample_quarters() -> Vec<YearQuarter> {
    (0..7).map(|i| yq("2023Q1").shift(i)).collect()
}

/// Direct premiums of insurer `i` on leaf line `l` in quarter `q` (all
/// zero-based). Insurer 1001 leads through 2024Q2; in 2024Q3 the order
/// flips and 1007 leads.
pub fn premiums(i: usize, l: usize, q: usize) -> Decimal {
    let base = Decimal::from((7 - i) as u64 * 100);
    let growth = Decimal::from(((q + 1) * 15 * (i + 1)) as u64);
    (base + growth) * Decimal::from((l + 1) as u64)
}

pub fn value(metric_scale: Decimal, i: usize, l: usize, q: usize) -> Decimal {
    premiums(i, l, q) * metric_scale
}

pub fn line_tree() -> LineTree {
    let node = |label: &str, children: &[&str]| LineNode {
        label: label.to_string(),
        children: strings(children),
    };
    LineTree::from_nodes(HashMap::from([
        (ROOT_LINE.to_string(), node("Все линии", &["3", "4"])),
        ("3".to_string(), node("Добровольное имущественное страхование", &["3.1", "3.2"])),
        ("3.1".to_string(), node("Имущество юридических лиц", &[])),
        ("3.2".to_string(), node("Имущество граждан", &[])),
        ("4".to_string(), node("Страхование ответственности", &["4.1"])),
        ("4.1".to_string(), node("Обязательное страхование ответственности", &["4.1.1"])),
        ("4.1.1".to_string(), node("ОСАГО", &[])),
    ]))
}

pub fn directory() -> InsurerDirectory {
    InsurerDirectory::from_entries(
        INSURERS
            .iter()
            .enumerate()
            .map(|(i, id)| InsurerEntry {
                reg_number: id.to_string(),
                short_name: format!("Страховщик {}", i + 1),
            })
            .collect(),
    )
}

/// Long-form table: every raw metric for every insurer on every leaf line,
/// the `все линии` aggregate per insurer and the `total` insurer per line.
pub fn sample_frame() -> Frame {
    let mut frame = Frame::new();
    for (q, quarter) in sample_quarters().into_iter().enumerate() {
        for (metric, scale) in RAW_METRICS {
            let mut market_by_line = vec![Decimal::ZERO; LEAF_LINES.len()];
            for (i, insurer) in INSURERS.iter().enumerate() {
                let mut all_lines = Decimal::ZERO;
                for (l, line) in LEAF_LINES.iter().enumerate() {
                    let v = value(scale, i, l, q);
                    all_lines += v;
                    market_by_line[l] += v;
                    frame.push(FactRecord::new(quarter, metric, insurer, line, v));
                }
                frame.push(FactRecord::new(quarter, metric, insurer, ROOT_LINE, all_lines));
            }
            for (l, line) in LEAF_LINES.iter().enumerate() {
                frame.push(FactRecord::new(quarter, metric, "total", line, market_by_line[l]));
            }
            let market: Decimal = market_by_line.iter().copied().sum();
            frame.push(FactRecord::new(quarter, metric, "total", ROOT_LINE, market));
        }
    }
    frame
}

pub fn store_with(frame: Frame) -> DataStore {
    DataStore::new(directory()).with_form(ReportingForm::Form0420162, frame, line_tree())
}

pub fn sample_store() -> DataStore {
    store_with(sample_frame())
}
