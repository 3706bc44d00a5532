use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AnalyticsError;
use crate::frame::FactRecord;
use crate::metrics::options::OptionItem;
use crate::types::{top_n_id, InsurerKind, OTHERS_INSURER, TOP_N_COHORTS, TOTAL_INSURER};
use crate::AnalyticsResult;

static TOP_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^top-(\d+)$").expect("valid regex"));
static BENCHMARK_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^top-(\d+)-benchmark$").expect("valid regex"));

/// Entry of the insurer dictionary file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurerEntry {
    pub reg_number: String,
    pub short_name: String,
}

/// Insurer id to display-name lookup.
#[derive(Debug, Clone, Default)]
pub struct InsurerDirectory {
    names: HashMap<String, String>,
}

impl InsurerDirectory {
    pub fn from_entries(entries: Vec<InsurerEntry>) -> Self {
        let mut names: HashMap<String, String> = entries
            .into_iter()
            .map(|e| (e.reg_number, e.short_name))
            .collect();
        names.insert(TOTAL_INSURER.to_string(), "Весь рынок".to_string());
        names.insert(OTHERS_INSURER.to_string(), "Остальные".to_string());
        InsurerDirectory { names }
    }

    pub fn from_json(json: &str) -> AnalyticsResult<Self> {
        let entries: Vec<InsurerEntry> = serde_json::from_str(json)?;
        Ok(InsurerDirectory::from_entries(entries))
    }

    pub fn from_path(path: &Path) -> AnalyticsResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| AnalyticsError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        InsurerDirectory::from_json(&json)
    }

    /// Display name of an insurer id. Cohort ids get generated names and
    /// unknown ids pass through.
    pub fn map_insurer(&self, insurer: &str) -> String {
        if let Some(caps) = TOP_PATTERN.captures(insurer) {
            return format!("Топ {}", &caps[1]);
        }
        if let Some(caps) = BENCHMARK_PATTERN.captures(insurer) {
            return format!("Топ {} Бенчмарк", &caps[1]);
        }
        self.names
            .get(insurer)
            .cloned()
            .unwrap_or_else(|| insurer.to_string())
    }

    /// Insurer dropdown: the cohort markers first, then real insurers of
    /// `lines` ordered by descending `metric` value in the latest quarter.
    pub fn options(&self, frame: &[FactRecord], metrics: &[String], lines: &[String]) -> Vec<OptionItem> {
        let mut out: Vec<OptionItem> = TOP_N_COHORTS
            .iter()
            .map(|n| {
                let id = top_n_id(*n);
                OptionItem {
                    label: self.map_insurer(&id),
                    value: id,
                }
            })
            .collect();

        let Some(latest) = frame.iter().map(|r| r.year_quarter).max() else {
            return out;
        };
        let in_latest = |r: &&FactRecord| r.year_quarter == latest;
        let Some(metric) = metrics
            .iter()
            .find(|m| frame.iter().filter(in_latest).any(|r| &r.metric == *m))
        else {
            return out;
        };

        let mut totals: Vec<(String, rust_decimal::Decimal)> = Vec::new();
        for r in frame.iter().filter(in_latest) {
            if &r.metric != metric
                || r.kind() != InsurerKind::Real
                || !lines.contains(&r.linemain)
            {
                continue;
            }
            let v = r.value.unwrap_or_default();
            match totals.iter_mut().find(|(id, _)| id == &r.insurer) {
                Some((_, sum)) => *sum += v,
                None => totals.push((r.insurer.clone(), v)),
            }
        }
        totals.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        out.extend(totals.into_iter().map(|(id, _)| OptionItem {
            label: self.map_insurer(&id),
            value: id,
        }));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::YearQuarter;
    use rust_decimal_macros::dec;

    fn directory() -> InsurerDirectory {
        InsurerDirectory::from_json(
            r#"[{"reg_number": "1", "short_name": "Альфа"}, {"reg_number": "2", "short_name": "Бета"}]"#,
        )
        .unwrap()
    }

    #[test]
    fn test_map_insurer_specials() {
        let d = directory();
        assert_eq!(d.map_insurer("1"), "Альфа");
        assert_eq!(d.map_insurer("total"), "Весь рынок");
        assert_eq!(d.map_insurer("others"), "Остальные");
        assert_eq!(d.map_insurer("top-10"), "Топ 10");
        assert_eq!(d.map_insurer("top-5-benchmark"), "Топ 5 Бенчмарк");
        assert_eq!(d.map_insurer("999"), "999");
    }

    #[test]
    fn test_options_order_by_latest_value() {
        let d = directory();
        let q1 = YearQuarter::new(2024, 1).unwrap();
        let q2 = YearQuarter::new(2024, 2).unwrap();
        let frame = vec![
            FactRecord::new(q1, "direct_premiums", "1", "все линии", dec!(500)),
            FactRecord::new(q2, "direct_premiums", "1", "все линии", dec!(10)),
            FactRecord::new(q2, "direct_premiums", "2", "все линии", dec!(20)),
            FactRecord::new(q2, "direct_premiums", "total", "все линии", dec!(30)),
        ];
        let opts = d.options(
            &frame,
            &["direct_premiums".to_string()],
            &["все линии".to_string()],
        );
        let values: Vec<&str> = opts.iter().map(|o| o.value.as_str()).collect();
        assert_eq!(values, vec!["top-5", "top-10", "top-20", "2", "1"]);
        assert_eq!(opts[3].label, "Бета");
    }
}
