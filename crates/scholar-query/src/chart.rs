use chrono::NaiveDate;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::aggregate::Partition;
use crate::types::SourceTag;

/// One (x, y) point with hover details
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub x: f64,
    pub y: f64,
    pub label: String,
    pub details: BTreeMap<String, String>,
}

/// Count for one day bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimePoint {
    pub date: NaiveDate,
    pub count: u64,
}

/// Day-bucketed counts with their provenance
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    pub source: SourceTag,
    pub points: Vec<TimePoint>,
}

impl TimeSeries {
    pub fn total(&self) -> u64 {
        self.points.iter().map(|p| p.count).sum()
    }

    pub fn mean(&self) -> f64 {
        if self.points.is_empty() {
            0.0
        } else {
            self.total() as f64 / self.points.len() as f64
        }
    }
}

/// Structured data ready for chart rendering
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "chart", rename_all = "snake_case")]
pub enum ChartPayload {
    /// Placeholder panel carrying a message instead of data
    Empty { message: String },
    Bar {
        title: String,
        x_label: String,
        y_label: String,
        categories: Vec<String>,
        values: Vec<f64>,
    },
    Scatter {
        title: String,
        x_label: String,
        y_label: String,
        points: Vec<ScatterPoint>,
    },
    /// Share of a whole (pie / donut)
    Distribution {
        title: String,
        labels: Vec<String>,
        values: Vec<f64>,
    },
    /// Raw values binned by the renderer
    Histogram {
        title: String,
        values: Vec<f64>,
        bins: usize,
    },
    TimeSeries { title: String, series: TimeSeries },
    /// Counts as bars, averages as a line on a secondary axis
    Comparison {
        title: String,
        categories: Vec<String>,
        counts: Vec<u64>,
        averages: Vec<f64>,
    },
    Panels {
        title: String,
        panels: Vec<ChartPayload>,
    },
}

impl ChartPayload {
    pub fn empty(message: impl Into<String>) -> Self {
        ChartPayload::Empty {
            message: message.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ChartPayload::Empty { .. })
    }

    pub fn bar_from_partitions(
        title: impl Into<String>,
        x_label: impl Into<String>,
        y_label: impl Into<String>,
        partitions: &[Partition],
    ) -> Self {
        ChartPayload::Bar {
            title: title.into(),
            x_label: x_label.into(),
            y_label: y_label.into(),
            categories: partitions.iter().map(|p| p.key.label()).collect(),
            values: partitions.iter().map(|p| p.count as f64).collect(),
        }
    }
}

/// Visual payload plus a short statistics digest
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregationResult {
    pub payload: ChartPayload,
    pub summary: String,
}

impl AggregationResult {
    pub fn new(payload: ChartPayload, summary: impl Into<String>) -> Self {
        Self {
            payload,
            summary: summary.into(),
        }
    }

    /// Empty panel whose message doubles as the summary
    pub fn message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            payload: ChartPayload::empty(message.clone()),
            summary: message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarValue;

    #[test]
    fn test_bar_from_partitions_labels_nulls() {
        let partitions = vec![
            Partition {
                key: ScalarValue::Null,
                count: 1,
            },
            Partition {
                key: ScalarValue::Integer(2020),
                count: 4,
            },
        ];

        match ChartPayload::bar_from_partitions("By year", "Year", "Count", &partitions) {
            ChartPayload::Bar {
                categories, values, ..
            } => {
                assert_eq!(categories, vec!["N/A", "2020"]);
                assert_eq!(values, vec![1.0, 4.0]);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_payload_serializes_with_chart_tag() {
        let json = serde_json::to_value(ChartPayload::empty("MongoDB connection not available"))
            .unwrap();
        assert_eq!(json["chart"], "empty");
        assert_eq!(json["message"], "MongoDB connection not available");
    }

    #[test]
    fn test_time_series_mean_of_empty_is_zero() {
        let series = TimeSeries {
            source: SourceTag::Relational,
            points: vec![],
        };
        assert_eq!(series.mean(), 0.0);
        assert_eq!(series.total(), 0);
    }
}
