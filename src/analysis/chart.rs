//! Chart payload for the analysis view: average engagement per post type.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

const SERIES_LABEL: &str = "Average Engagement";
const BORDER_WIDTH: u32 = 1;
const PALETTE: &[(u8, u8, u8)] = &[
    (75, 192, 192),
    (255, 99, 132),
    (255, 206, 86),
    (54, 162, 235),
    (153, 102, 255),
    (255, 159, 64),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chart {
    pub labels: Vec<String>,
    pub datasets: Vec<ChartSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub label: String,
    pub data: Vec<f64>,
    pub background_color: Vec<String>,
    pub border_color: Vec<String>,
    pub border_width: u32,
}

fn rgba((r, g, b): (u8, u8, u8), alpha: f32) -> String {
    format!("rgba({r}, {g}, {b}, {alpha})")
}

fn number(record: &Value, keys: &[&str]) -> f64 {
    keys.iter()
        .find_map(|key| record.get(*key).and_then(Value::as_f64))
        .unwrap_or(0.0)
}

fn post_type(record: &Value) -> Option<&str> {
    ["post_type", "type"]
        .iter()
        .find_map(|key| record.get(*key).and_then(Value::as_str))
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Posts in a record: a stored scrape document nests them under `posts`,
/// anything else is taken as a post itself.
fn posts_of(record: &Value) -> Vec<&Value> {
    match record.get("posts") {
        Some(Value::Object(posts)) => posts.values().collect(),
        Some(Value::Array(posts)) => posts.iter().collect(),
        _ => vec![record],
    }
}

/// Average likes + comments per post type, labels sorted by type.
pub fn engagement_chart(records: &[Value]) -> Chart {
    let mut totals: BTreeMap<String, (f64, u32)> = BTreeMap::new();

    for post in records.iter().flat_map(posts_of) {
        let Some(kind) = post_type(post) else {
            continue;
        };
        let engagement =
            number(post, &["likes", "likesCount"]) + number(post, &["comments", "commentsCount"]);
        let slot = totals.entry(title_case(kind)).or_insert((0.0, 0));
        slot.0 += engagement;
        slot.1 += 1;
    }

    let labels: Vec<String> = totals.keys().map(|kind| format!("{kind} Posts")).collect();
    let data: Vec<f64> = totals
        .values()
        .map(|(sum, count)| (sum / f64::from(*count) * 100.0).round() / 100.0)
        .collect();
    let colors = (0..labels.len()).map(|i| PALETTE[i % PALETTE.len()]);

    Chart {
        datasets: vec![ChartSeries {
            label: SERIES_LABEL.to_string(),
            data,
            background_color: colors.clone().map(|c| rgba(c, 0.6)).collect(),
            border_color: colors.map(|c| rgba(c, 1.0)).collect(),
            border_width: BORDER_WIDTH,
        }],
        labels,
    }
}
