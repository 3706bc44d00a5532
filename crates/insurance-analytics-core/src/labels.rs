use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::metrics::registry::MetricRegistry;
use crate::types::YearQuarter;

static TRANSLATIONS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("ytd", "Нарастающим итогом с начала года (Year-to-Date)"),
        ("qoq", "К предыдущему кварталу"),
        ("yoy_q", "К аналогичному кварталу прошлого года"),
        ("yoy_y", "Данные за последовательные 12 месяцев, год к году"),
        ("mat", "Moving Annual Total"),
        ("direct", "Прямое"),
        ("inward", "Входящее"),
        ("market_share", "доля рынка, %"),
        ("change", "Δ%"),
        ("market_share_change", "Δ доли рынка, п.п."),
        ("insurer", "Страховщик"),
        ("linemain", "Вид страхования"),
        ("N", "Место"),
        ("no_data", "Нет данных"),
    ])
});

/// Human label for a key. Metric names resolve through the registry and
/// unknown keys pass through unchanged.
pub fn translate(key: &str) -> String {
    if let Some(label) = TRANSLATIONS.get(key) {
        return (*label).to_string();
    }
    MetricRegistry::standard().label(key).to_string()
}

/// Cumulative label of a quarter, e.g. `2024 год, 9 месяцев`.
pub fn translate_quarter(quarter: YearQuarter) -> String {
    let months = match quarter.quarter {
        1 => "3 месяца",
        2 => "6 месяцев",
        3 => "9 месяцев",
        _ => "12 месяцев",
    };
    format!("{} год, {}", quarter.year, months)
}
