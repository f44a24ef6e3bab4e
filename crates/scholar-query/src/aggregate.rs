//! Aggregation and statistics over normalized record sets
//!
//! Everything here is pure: no backend I/O, no shared state. Malformed input
//! (unknown field, non-numeric column) is logged and answered with neutral
//! values so a single bad panel never fails the request.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::Rng;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, warn};

use crate::chart::{TimePoint, TimeSeries};
use crate::error::AggregationError;
use crate::types::{FieldDef, FieldSchema, RecordSet, ScalarValue, SourceTag};

/// One partition of a group-count or top-N
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub key: ScalarValue,
    pub count: u64,
}

fn column<'a>(
    set: &'a RecordSet,
    field: &str,
) -> Result<impl Iterator<Item = &'a ScalarValue> + 'a, AggregationError> {
    set.column(field)
        .ok_or_else(|| AggregationError::UnknownField(field.to_string()))
}

/// Count records per distinct value of `field`, keys ascending
///
/// Nulls form their own partition so the counts always sum to `set.len()`.
pub fn group_count(set: &RecordSet, field: &str) -> Vec<Partition> {
    match try_group_count(set, field) {
        Ok(partitions) => partitions,
        Err(e) => {
            warn!("group-count over {} records: {}", set.len(), e);
            Vec::new()
        }
    }
}

fn try_group_count(set: &RecordSet, field: &str) -> Result<Vec<Partition>, AggregationError> {
    let mut counts: BTreeMap<&ScalarValue, u64> = BTreeMap::new();
    for value in column(set, field)? {
        *counts.entry(value).or_insert(0) += 1;
    }

    Ok(counts
        .into_iter()
        .map(|(key, count)| Partition {
            key: key.clone(),
            count,
        })
        .collect())
}

/// The `n` most frequent values of `field`, count descending
///
/// Ties keep the order in which the values were first encountered.
pub fn top_n(set: &RecordSet, field: &str, n: usize) -> Vec<Partition> {
    let values = match column(set, field) {
        Ok(values) => values,
        Err(e) => {
            warn!("top-N over {} records: {}", set.len(), e);
            return Vec::new();
        }
    };

    let mut counts: Vec<(ScalarValue, u64)> = Vec::new();
    let mut positions: HashMap<&ScalarValue, usize> = HashMap::new();
    for value in values {
        match positions.get(value) {
            Some(&idx) => counts[idx].1 += 1,
            None => {
                positions.insert(value, counts.len());
                counts.push((value.clone(), 1));
            }
        }
    }

    rank(counts, n)
        .into_iter()
        .map(|(key, count)| Partition { key, count })
        .collect()
}

/// Stable sort by count descending, then truncate to `n`
pub fn rank<K>(mut counts: Vec<(K, u64)>, n: usize) -> Vec<(K, u64)> {
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.truncate(n);
    counts
}

/// Descriptive statistics over one field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalarStats {
    /// Non-null values considered
    pub count: usize,
    pub sum: f64,
    /// Arithmetic mean of the numeric values; 0 when there are none
    pub mean: f64,
    pub min: Option<ScalarValue>,
    pub max: Option<ScalarValue>,
    /// Most frequent label, smallest value on ties; "N/A" when empty
    pub mode: String,
}

impl ScalarStats {
    pub fn neutral() -> Self {
        Self {
            count: 0,
            sum: 0.0,
            mean: 0.0,
            min: None,
            max: None,
            mode: "N/A".to_string(),
        }
    }

    /// Max rendered for a summary line, 0 when absent
    pub fn max_label(&self) -> String {
        self.max
            .as_ref()
            .map_or_else(|| "0".to_string(), ScalarValue::label)
    }
}

/// Mean, extrema and mode of `field`; never fails
pub fn scalar_stats(set: &RecordSet, field: &str) -> ScalarStats {
    match try_scalar_stats(set, field) {
        Ok(stats) => stats,
        Err(AggregationError::EmptyInput) => ScalarStats::neutral(),
        Err(e) => {
            warn!("scalar stats substituted with neutral values: {}", e);
            ScalarStats::neutral()
        }
    }
}

fn try_scalar_stats(set: &RecordSet, field: &str) -> Result<ScalarStats, AggregationError> {
    let values: Vec<&ScalarValue> = column(set, field)?.filter(|v| !v.is_null()).collect();
    if values.is_empty() {
        return Err(AggregationError::EmptyInput);
    }

    let numbers: Vec<f64> = values.iter().filter_map(|v| v.as_f64()).collect();
    let sum: f64 = numbers.iter().sum();
    let mean = if numbers.is_empty() {
        0.0
    } else {
        sum / numbers.len() as f64
    };

    let mut frequencies: BTreeMap<&ScalarValue, usize> = BTreeMap::new();
    for value in &values {
        *frequencies.entry(*value).or_insert(0) += 1;
    }
    // max_by_key keeps the last maximum, so walk the keys in reverse
    let mode = frequencies
        .iter()
        .rev()
        .max_by_key(|(_, count)| **count)
        .map(|(value, _)| value.label())
        .unwrap_or_else(|| "N/A".to_string());

    Ok(ScalarStats {
        count: values.len(),
        sum,
        mean,
        min: values.iter().min().map(|v| (*v).clone()),
        max: values.iter().max().map(|v| (*v).clone()),
        mode,
    })
}

/// Sum of a numeric field, 0 for nulls and non-numbers
pub fn sum(set: &RecordSet, field: &str) -> f64 {
    set.column(field)
        .map(|values| values.filter_map(ScalarValue::as_f64).sum())
        .unwrap_or(0.0)
}

/// Count records per day of `date_field`, days ascending
///
/// With `weight_field` each record contributes its weight instead of 1,
/// which lets pre-grouped `(day, count)` rows pass through unchanged.
/// Records without a parseable date are skipped.
pub fn time_buckets(set: &RecordSet, date_field: &str, weight_field: Option<&str>) -> TimeSeries {
    let mut buckets: BTreeMap<NaiveDate, u64> = BTreeMap::new();

    let date_idx = set.schema().index_of(date_field);
    let weight_idx = weight_field.and_then(|f| set.schema().index_of(f));
    if date_idx.is_none() {
        warn!(
            "time-bucketing: {}",
            AggregationError::UnknownField(date_field.to_string())
        );
    }

    if let Some(date_idx) = date_idx {
        for record in set.records() {
            let Some(day) = record.value(date_idx).and_then(ScalarValue::as_date) else {
                continue;
            };
            let weight = match weight_idx {
                Some(idx) => record
                    .value(idx)
                    .and_then(ScalarValue::as_i64)
                    .map_or(0, |w| w.max(0) as u64),
                None => 1,
            };
            *buckets.entry(day).or_insert(0) += weight;
        }
    }

    TimeSeries {
        source: set.source,
        points: buckets
            .into_iter()
            .map(|(date, count)| TimePoint { date, count })
            .collect(),
    }
}

/// Days covered by the synthetic series
pub const SYNTHETIC_DAYS: u32 = 365;

/// Field names of the synthetic series
pub fn daily_count_schema() -> FieldSchema {
    FieldSchema::new(vec![FieldDef::date("date"), FieldDef::integer("count")])
}

/// Generated daily counts ending at `end`, tagged as synthetic
///
/// Weekdays start from 5, weekends from 2; each day adds a jitter in
/// `-2..=3` and is clamped at 0.
pub fn synthetic_daily_series<R: Rng>(end: NaiveDate, days: u32, rng: &mut R) -> RecordSet {
    let mut set = RecordSet::empty(SourceTag::SyntheticFallback, daily_count_schema());

    for offset in (0..days).rev() {
        let date = end - Duration::days(i64::from(offset));
        let base: i64 = match date.weekday() {
            Weekday::Sat | Weekday::Sun => 2,
            _ => 5,
        };
        let count = (base + rng.gen_range(-2..=3)).max(0);
        set.push(vec![ScalarValue::Date(date), ScalarValue::Integer(count)]);
    }

    set
}

/// Bucket the first candidate that holds dated records, else synthesize
///
/// Candidates are tried in order; each is expected to carry `date` and
/// `count` fields.
pub fn daily_series_or_fallback<R: Rng>(
    candidates: impl IntoIterator<Item = RecordSet>,
    today: NaiveDate,
    rng: &mut R,
) -> TimeSeries {
    for candidate in candidates {
        let series = time_buckets(&candidate, "date", Some("count"));
        if !series.points.is_empty() {
            return series;
        }
        debug!("No dated records from {}, trying next source", candidate.source);
    }

    debug!("Falling back to a synthetic daily series");
    let synthetic = synthetic_daily_series(today, SYNTHETIC_DAYS, rng);
    time_buckets(&synthetic, "date", Some("count"))
}

/// Tag-list splitting rules
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeywordExplosion {
    pub delimiter: char,
    /// Tokens shorter than this (in characters) are dropped
    pub min_len: usize,
}

impl Default for KeywordExplosion {
    fn default() -> Self {
        Self {
            delimiter: ',',
            min_len: 3,
        }
    }
}

impl KeywordExplosion {
    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    /// Split one tag list into normalized tokens
    pub fn tokens<'a>(&'a self, raw: &'a str) -> impl Iterator<Item = String> + 'a {
        raw.split(self.delimiter)
            .map(|token| token.trim().to_lowercase())
            .filter(move |token| token.chars().count() >= self.min_len)
    }

    /// Token frequencies across every record, first-encountered order
    ///
    /// Each token counts once per record, or `weight_field` times when given.
    pub fn explode(
        &self,
        set: &RecordSet,
        field: &str,
        weight_field: Option<&str>,
    ) -> Vec<(String, u64)> {
        let Some(field_idx) = set.schema().index_of(field) else {
            warn!(
                "keyword explosion: {}",
                AggregationError::UnknownField(field.to_string())
            );
            return Vec::new();
        };
        let weight_idx = weight_field.and_then(|f| set.schema().index_of(f));

        let mut counts: Vec<(String, u64)> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for record in set.records() {
            let Some(raw) = record.value(field_idx).and_then(ScalarValue::as_str) else {
                continue;
            };
            let weight = weight_idx
                .and_then(|idx| record.value(idx))
                .and_then(ScalarValue::as_i64)
                .map_or(1, |w| w.max(0) as u64);

            for token in self.tokens(raw) {
                match positions.get(&token) {
                    Some(&idx) => counts[idx].1 += weight,
                    None => {
                        positions.insert(token.clone(), counts.len());
                        counts.push((token, weight));
                    }
                }
            }
        }

        counts
    }
}

/// Largest h such that h publications have at least h citations each
pub fn h_index(citations: impl IntoIterator<Item = i64>) -> u64 {
    let mut sorted: Vec<i64> = citations.into_iter().collect();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    sorted
        .iter()
        .enumerate()
        .take_while(|&(idx, &c)| c > idx as i64)
        .count() as u64
}

/// Span of years covered, inclusive; 0 without any year
pub fn years_active(years: impl IntoIterator<Item = i64>) -> i64 {
    let (min, max) = years
        .into_iter()
        .fold((None, None), |(min, max): (Option<i64>, Option<i64>), y| {
            (
                Some(min.map_or(y, |m| m.min(y))),
                Some(max.map_or(y, |m| m.max(y))),
            )
        });

    match (min, max) {
        (Some(min), Some(max)) => max - min + 1,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BackendKind;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn publications(rows: &[(&str, Option<i64>, &str, i64)]) -> RecordSet {
        let schema = FieldSchema::new(vec![
            FieldDef::text("title"),
            FieldDef::integer("year"),
            FieldDef::text("venue"),
            FieldDef::integer("citations"),
        ]);
        let mut set = RecordSet::empty(BackendKind::Relational, schema);
        for (title, year, venue, citations) in rows {
            set.push(vec![
                ScalarValue::text(*title),
                ScalarValue::from(*year),
                ScalarValue::text(*venue),
                ScalarValue::Integer(*citations),
            ]);
        }
        set
    }

    fn sample() -> RecordSet {
        publications(&[
            ("A", Some(2021), "VLDB", 10),
            ("B", Some(2019), "SIGMOD", 30),
            ("C", Some(2021), "VLDB", 5),
            ("D", None, "ICDE", 0),
            ("E", Some(2020), "SIGMOD", 55),
            ("F", Some(2021), "ICDE", 12),
        ])
    }

    #[test]
    fn test_group_count_partitions_sum_to_len() {
        let set = sample();
        let partitions = group_count(&set, "year");

        let total: u64 = partitions.iter().map(|p| p.count).sum();
        assert_eq!(total as usize, set.len());

        let keys: BTreeSet<ScalarValue> = partitions.iter().map(|p| p.key.clone()).collect();
        let distinct: BTreeSet<ScalarValue> = set.column("year").unwrap().cloned().collect();
        assert_eq!(keys, distinct);
    }

    #[test]
    fn test_group_count_keys_ascending() {
        let partitions = group_count(&sample(), "year");
        let keys: Vec<String> = partitions.iter().map(|p| p.key.label()).collect();
        assert_eq!(keys, vec!["N/A", "2019", "2020", "2021"]);
        assert_eq!(partitions[3].count, 3);
    }

    #[test]
    fn test_group_count_unknown_field_is_empty() {
        assert!(group_count(&sample(), "publisher").is_empty());
    }

    #[test]
    fn test_top_n_is_bounded_and_sorted() {
        let set = sample();
        let top = top_n(&set, "venue", 2);
        let all = group_count(&set, "venue");

        assert!(top.len() <= 2);
        assert!(top.windows(2).all(|w| w[0].count >= w[1].count));
        for partition in &top {
            assert!(all.contains(partition));
        }
    }

    #[test]
    fn test_top_n_ties_keep_first_encountered_order() {
        let top = top_n(&sample(), "venue", 3);
        let keys: Vec<String> = top.iter().map(|p| p.key.label()).collect();
        // every venue appears twice; VLDB is seen first, then SIGMOD, then ICDE
        assert_eq!(keys, vec!["VLDB", "SIGMOD", "ICDE"]);
    }

    #[test]
    fn test_scalar_stats_numeric() {
        let stats = scalar_stats(&sample(), "citations");
        assert_eq!(stats.count, 6);
        assert_eq!(stats.sum, 112.0);
        assert!((stats.mean - 112.0 / 6.0).abs() < 1e-9);
        assert_eq!(stats.max, Some(ScalarValue::Integer(55)));
        assert_eq!(stats.min, Some(ScalarValue::Integer(0)));
    }

    #[test]
    fn test_scalar_stats_categorical_mode() {
        let stats = scalar_stats(&sample(), "venue");
        assert_eq!(stats.mean, 0.0);
        // three-way tie, smallest value wins
        assert_eq!(stats.mode, "ICDE");
    }

    #[test]
    fn test_scalar_stats_empty_is_neutral() {
        let stats = scalar_stats(&publications(&[]), "citations");
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.max, None);
        assert_eq!(stats.max_label(), "0");
        assert_eq!(stats.mode, "N/A");
    }

    #[test]
    fn test_time_buckets_by_day() {
        let schema = FieldSchema::new(vec![FieldDef::date("date")]);
        let mut set = RecordSet::empty(BackendKind::Document, schema);
        for day in [3, 1, 3, 2, 3] {
            set.push(vec![ScalarValue::Date(
                NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            )]);
        }
        set.push(vec![ScalarValue::Null]);

        let series = time_buckets(&set, "date", None);
        assert_eq!(series.source, SourceTag::Document);
        let counts: Vec<u64> = series.points.iter().map(|p| p.count).collect();
        assert_eq!(counts, vec![1, 1, 3]);
        assert!(series.points.windows(2).all(|w| w[0].date < w[1].date));
    }

    #[test]
    fn test_synthetic_series_shape() {
        let end = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let set = synthetic_daily_series(end, SYNTHETIC_DAYS, &mut rng);

        assert_eq!(set.source, SourceTag::SyntheticFallback);
        assert_eq!(set.len(), 365);
        assert_eq!(set.get(364, "date"), Some(&ScalarValue::Date(end)));
        for count in set.column("count").unwrap() {
            let count = count.as_i64().unwrap();
            assert!((0..=8).contains(&count));
        }
    }

    #[test]
    fn test_fallback_prefers_first_dated_candidate() {
        let today = NaiveDate::from_ymd_opt(2024, 6, 30).unwrap();
        let mut rng = StdRng::seed_from_u64(1);

        let empty = RecordSet::empty(BackendKind::Relational, daily_count_schema());
        let mut graph = RecordSet::empty(BackendKind::Graph, daily_count_schema());
        graph.push(vec![ScalarValue::Date(today), ScalarValue::Integer(4)]);

        let series = daily_series_or_fallback(vec![empty.clone(), graph], today, &mut rng);
        assert_eq!(series.source, SourceTag::Graph);
        assert_eq!(series.total(), 4);

        let series = daily_series_or_fallback(vec![empty], today, &mut rng);
        assert!(series.source.is_synthetic());
        assert_eq!(series.points.len(), 365);
    }

    fn tag_set(values: &[&str]) -> RecordSet {
        let schema = FieldSchema::new(vec![FieldDef::text("keywords")]);
        let mut set = RecordSet::empty(BackendKind::Relational, schema);
        for value in values {
            set.push(vec![ScalarValue::text(*value)]);
        }
        set
    }

    #[test]
    fn test_keyword_explosion_merges_case_variants() {
        let set = tag_set(&["AI, Machine Learning", "ai,NLP"]);
        let counts = KeywordExplosion::default()
            .with_min_len(2)
            .explode(&set, "keywords", None);

        assert_eq!(
            counts,
            vec![
                ("ai".to_string(), 2),
                ("machine learning".to_string(), 1),
                ("nlp".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_keyword_explosion_default_drops_short_tokens() {
        let set = tag_set(&["AI, Machine Learning", "ai,NLP", " , x"]);
        let counts = KeywordExplosion::default().explode(&set, "keywords", None);

        assert_eq!(
            counts,
            vec![("machine learning".to_string(), 1), ("nlp".to_string(), 1)]
        );
    }

    #[test]
    fn test_keyword_explosion_weighted() {
        let schema = FieldSchema::new(vec![FieldDef::text("keywords"), FieldDef::integer("n")]);
        let mut set = RecordSet::empty(BackendKind::Relational, schema);
        set.push(vec![ScalarValue::text("databases, graphs"), ScalarValue::Integer(4)]);
        set.push(vec![ScalarValue::text("Graphs"), ScalarValue::Integer(3)]);

        let counts = KeywordExplosion::default().explode(&set, "keywords", Some("n"));
        let top = rank(counts, 1);
        assert_eq!(top, vec![("graphs".to_string(), 7)]);
    }

    #[test]
    fn test_h_index() {
        assert_eq!(h_index(vec![10, 8, 5, 4, 3]), 4);
        assert_eq!(h_index(vec![25, 8, 5, 3, 3]), 3);
        assert_eq!(h_index(vec![0, 0]), 0);
        assert_eq!(h_index(Vec::new()), 0);
    }

    #[test]
    fn test_years_active() {
        assert_eq!(years_active(vec![2015, 2021, 2018]), 7);
        assert_eq!(years_active(vec![2020]), 1);
        assert_eq!(years_active(Vec::new()), 0);
    }
}
