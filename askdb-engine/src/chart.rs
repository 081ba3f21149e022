//! Pie and bar chart rendering over the session's last result set.
//!
//! Each chart kind writes to a fixed well-known path, overwriting any
//! prior file of that kind; callers must consume or rename the file
//! before rendering the same kind again if they need to keep it.

use askdb_core::db::ResultSet;
use plotters::prelude::*;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::format;

pub const PIE_CHART_PATH: &str = "pie_chart.png";
pub const BAR_CHART_PATH: &str = "bar_chart.png";

/// Value-column token meaning "use occurrence counts".
const COUNT_TOKEN: &str = "count";

const SERIES_COLORS: [RGBColor; 8] = [
    RGBColor(31, 119, 180),
    RGBColor(255, 127, 14),
    RGBColor(44, 160, 44),
    RGBColor(214, 39, 40),
    RGBColor(148, 103, 189),
    RGBColor(140, 86, 75),
    RGBColor(227, 119, 194),
    RGBColor(127, 127, 127),
];

#[derive(Debug, Deserialize)]
pub struct PieSpec {
    pub labels_column: Option<String>,
    pub values_column: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BarSpec {
    pub x_column: Option<String>,
    pub y_column: Option<String>,
    pub title: Option<String>,
    /// Literal data for direct plotting, bypassing the last result
    pub labels: Option<Vec<Value>>,
    pub values: Option<Vec<Value>>,
}

fn parse_spec<T: DeserializeOwned>(input: &str) -> EngineResult<T> {
    serde_json::from_str(input)
        .map_err(|_| EngineError::Chart(format!("Invalid JSON in chart input: {input}")))
}

/// Render a pie chart from the last query result.
pub fn render_pie(result: Option<&ResultSet>, input: &str) -> EngineResult<String> {
    let spec: PieSpec = parse_spec(input)?;
    let result = result.ok_or_else(|| {
        EngineError::Chart("No query results available. Run a query first.".to_string())
    })?;

    let (labels_column, values_column) = match (&spec.labels_column, &spec.values_column) {
        (Some(labels), Some(values)) => (labels.as_str(), values.as_str()),
        _ => {
            return Err(EngineError::Chart(format!(
                "'labels_column' and 'values_column' required. Available columns: {}",
                result.columns.join(", ")
            )));
        }
    };

    let slices = aggregate(result, labels_column, values_column)?;
    let title = spec
        .title
        .unwrap_or_else(|| format!("Pie Chart: {values_column} by {labels_column}"));
    draw_pie(&slices, &title)?;
    Ok(format!("Pie chart saved as '{PIE_CHART_PATH}'."))
}

/// Render a bar chart, either from literal label/value arrays or from
/// the last query result.
pub fn render_bar(result: Option<&ResultSet>, input: &str) -> EngineResult<String> {
    let spec: BarSpec = parse_spec(input)?;

    if let (Some(labels), Some(values)) = (&spec.labels, &spec.values) {
        let labels: Vec<String> = labels.iter().map(format::cell_text).collect();
        let values: Vec<f64> = values
            .iter()
            .map(|value| coerce_numeric(value).unwrap_or(0.0))
            .collect();
        let title = spec.title.as_deref().unwrap_or("Bar Chart");
        draw_bar(&labels, &values, "", "value", title)?;
        return Ok(format!("Bar chart saved as '{BAR_CHART_PATH}'."));
    }

    let result = result.ok_or_else(|| {
        EngineError::Chart("No query results available. Run a query first.".to_string())
    })?;

    let (x_column, y_column) = match (&spec.x_column, &spec.y_column) {
        (Some(x), Some(y)) => (x.as_str(), y.as_str()),
        _ => {
            return Err(EngineError::Chart(format!(
                "'x_column' and 'y_column' required. Available columns: {}",
                result.columns.join(", ")
            )));
        }
    };

    let bars = aggregate(result, x_column, y_column)?;
    let labels: Vec<String> = bars.iter().map(|(label, _)| label.clone()).collect();
    let values: Vec<f64> = bars.iter().map(|(_, value)| *value).collect();
    let y_desc = if y_column == COUNT_TOKEN { "Count" } else { y_column };
    let title = spec
        .title
        .unwrap_or_else(|| format!("Bar Chart: {y_column} by {x_column}"));
    draw_bar(&labels, &values, x_column, y_desc, &title)?;
    Ok(format!("Bar chart saved as '{BAR_CHART_PATH}'."))
}

/// Group the result by `label_column`, in first-seen group order.
/// Magnitudes are occurrence counts when `value_column` is the literal
/// `count`; otherwise the per-group sum of `value_column` coerced to
/// numeric. Non-coercible values count as zero, but a value column where
/// every value fails to coerce makes the whole request an error.
pub(crate) fn aggregate(
    result: &ResultSet,
    label_column: &str,
    value_column: &str,
) -> EngineResult<Vec<(String, f64)>> {
    let label_idx = result.column_index(label_column).ok_or_else(|| {
        EngineError::Chart(format!(
            "Column '{label_column}' not found in query results. Available columns: {}",
            result.columns.join(", ")
        ))
    })?;

    let value_idx = if value_column == COUNT_TOKEN {
        None
    } else {
        Some(result.column_index(value_column).ok_or_else(|| {
            EngineError::Chart(format!(
                "Column '{value_column}' not found in query results. Available columns: {}",
                result.columns.join(", ")
            ))
        })?)
    };

    let mut groups: Vec<(String, f64)> = Vec::new();
    let mut any_coerced = false;
    for row in &result.rows {
        let label = format::cell_text(&row[label_idx]);
        let amount = match value_idx {
            None => 1.0,
            Some(idx) => match coerce_numeric(&row[idx]) {
                Some(value) => {
                    any_coerced = true;
                    value
                }
                None => 0.0,
            },
        };
        match groups.iter_mut().find(|(existing, _)| *existing == label) {
            Some((_, total)) => *total += amount,
            None => groups.push((label, amount)),
        }
    }

    if value_idx.is_some() && !any_coerced && !result.rows.is_empty() {
        return Err(EngineError::Chart(format!(
            "Column '{value_column}' has no numeric values to aggregate."
        )));
    }
    Ok(groups)
}

fn coerce_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn draw_pie(slices: &[(String, f64)], title: &str) -> EngineResult<()> {
    let total: f64 = slices.iter().map(|(_, value)| value).sum();
    if total <= 0.0 {
        return Err(EngineError::Chart(
            "Nothing to plot: all slice values are zero.".to_string(),
        ));
    }

    let labels: Vec<String> = slices.iter().map(|(label, _)| label.clone()).collect();
    let sizes: Vec<f64> = slices.iter().map(|(_, value)| *value).collect();
    let colors: Vec<RGBColor> = (0..sizes.len())
        .map(|i| SERIES_COLORS[i % SERIES_COLORS.len()])
        .collect();

    let root = BitMapBackend::new(PIE_CHART_PATH, (800, 640)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_error)?;
    let area = root
        .titled(title, ("sans-serif", 28))
        .map_err(chart_error)?;

    let center = (400, 300);
    let radius = 240.0;
    let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
    pie.label_style(("sans-serif", 18).into_font().color(&BLACK));
    pie.percentages(("sans-serif", 16).into_font().color(&BLACK));
    area.draw(&pie).map_err(chart_error)?;

    root.present().map_err(chart_error)?;
    Ok(())
}

fn draw_bar(
    labels: &[String],
    values: &[f64],
    x_desc: &str,
    y_desc: &str,
    title: &str,
) -> EngineResult<()> {
    let y_max = values.iter().cloned().fold(0.0_f64, f64::max);
    let y_max = if y_max <= 0.0 { 1.0 } else { y_max * 1.1 };

    let root = BitMapBackend::new(BAR_CHART_PATH, (960, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(chart_error)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 28))
        .margin(10)
        .x_label_area_size(60)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (0u32..labels.len() as u32).into_segmented(),
            0f64..y_max,
        )
        .map_err(chart_error)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_label_formatter(&|segment| match segment {
            SegmentValue::CenterOf(i) => labels
                .get(*i as usize)
                .cloned()
                .unwrap_or_default(),
            _ => String::new(),
        })
        .x_desc(x_desc)
        .y_desc(y_desc)
        .draw()
        .map_err(chart_error)?;

    chart
        .draw_series(values.iter().enumerate().map(|(i, value)| {
            Rectangle::new(
                [
                    (SegmentValue::Exact(i as u32), 0.0),
                    (SegmentValue::Exact(i as u32 + 1), *value),
                ],
                SERIES_COLORS[0].filled(),
            )
        }))
        .map_err(chart_error)?;

    root.present().map_err(chart_error)?;
    Ok(())
}

fn chart_error(error: impl std::fmt::Display) -> EngineError {
    EngineError::Chart(format!("Error creating chart: {error}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn result(columns: &[&str], rows: Vec<Vec<Value>>) -> ResultSet {
        ResultSet {
            columns: columns.iter().map(|s| s.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn count_aggregation_yields_occurrence_counts() {
        let result = result(
            &["category"],
            vec![
                vec![json!("A")],
                vec![json!("A")],
                vec![json!("B")],
                vec![json!("C")],
                vec![json!("C")],
            ],
        );
        let slices = aggregate(&result, "category", "count").unwrap();
        assert_eq!(
            slices,
            vec![
                ("A".to_string(), 2.0),
                ("B".to_string(), 1.0),
                ("C".to_string(), 2.0)
            ]
        );
    }

    #[test]
    fn value_aggregation_sums_per_group() {
        let result = result(
            &["city", "sales"],
            vec![
                vec![json!("Pune"), json!(10)],
                vec![json!("Pune"), json!(5)],
                vec![json!("Goa"), json!(2.5)],
            ],
        );
        let slices = aggregate(&result, "city", "sales").unwrap();
        assert_eq!(
            slices,
            vec![("Pune".to_string(), 15.0), ("Goa".to_string(), 2.5)]
        );
    }

    #[test]
    fn numeric_strings_coerce_and_junk_counts_as_zero() {
        let result = result(
            &["k", "v"],
            vec![
                vec![json!("a"), json!("3.5")],
                vec![json!("a"), json!("n/a")],
            ],
        );
        let slices = aggregate(&result, "k", "v").unwrap();
        assert_eq!(slices, vec![("a".to_string(), 3.5)]);
    }

    #[test]
    fn all_non_numeric_values_fail_the_request() {
        let result = result(
            &["k", "v"],
            vec![
                vec![json!("a"), json!("x")],
                vec![json!("b"), json!("y")],
            ],
        );
        let err = aggregate(&result, "k", "v").unwrap_err().to_string();
        assert!(err.contains("no numeric values"));
    }

    #[test]
    fn unknown_columns_report_the_available_ones() {
        let result = result(&["city", "sales"], vec![vec![json!("Pune"), json!(1)]]);
        let err = aggregate(&result, "region", "sales").unwrap_err().to_string();
        assert!(err.contains("region"));
        assert!(err.contains("city, sales"));
    }

    #[test]
    fn pie_requires_a_prior_query_result() {
        let err = render_pie(None, r#"{"labels_column": "a", "values_column": "count"}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("Run a query first"));
    }

    #[test]
    fn pie_requires_both_column_names() {
        let rs = result(&["a"], vec![vec![json!("x")]]);
        let err = render_pie(Some(&rs), r#"{"labels_column": "a"}"#)
            .unwrap_err()
            .to_string();
        assert!(err.contains("'labels_column' and 'values_column' required"));
    }

    #[test]
    fn chart_input_must_be_valid_json() {
        let err = render_bar(None, "{nope").unwrap_err().to_string();
        assert!(err.contains("Invalid JSON in chart input"));
    }
}
