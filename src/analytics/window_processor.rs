//! The declarative window processor: maintains a sliding time window per
//! metric and recomputes its aggregate on every matching event.

use crate::error::{LogLensError, Result};
use crate::models::metric::{AggregationKind, MetricDef, MetricResult};
use crate::schemas::event::Event;
use std::collections::{HashMap, HashSet, VecDeque};

/// Maintains one ordered event buffer per configured metric and recomputes
/// that metric's aggregate whenever a matching event arrives or an old one
/// expires out of the window.
///
/// Buffers are owned exclusively by this processor (spec.md §3 "Ownership").
/// No operation suspends; every call completes synchronously (spec.md §5).
pub struct WindowProcessor {
    metrics: Vec<MetricDef>,
    buffers: HashMap<String, VecDeque<Event>>,
    results: HashMap<String, MetricResult>,
}

impl WindowProcessor {
    /// Build a processor over the given metric definitions. Fails if two
    /// metrics share a name.
    pub fn new(metrics: Vec<MetricDef>) -> Result<Self> {
        let mut seen = HashSet::new();
        for metric in &metrics {
            if !seen.insert(metric.name.clone()) {
                return Err(LogLensError::InvalidMetric(format!(
                    "duplicate metric name: {}",
                    metric.name
                )));
            }
        }
        Ok(Self {
            metrics,
            buffers: HashMap::new(),
            results: HashMap::new(),
        })
    }

    /// Feed one event through every configured metric. Returns the results of
    /// the metrics whose predicate matched this event, keyed by metric name.
    ///
    /// If a predicate, group-key function, value extractor, or custom
    /// aggregation panics or its invocation's error propagates, the event is
    /// not retained in that metric's buffer and the error propagates to the
    /// caller unchanged (spec.md §7).
    pub fn add_event(&mut self, event: &Event) -> Result<HashMap<String, MetricResult>> {
        let mut updated = HashMap::new();

        for metric in &self.metrics {
            if !(metric.predicate)(event) {
                continue;
            }

            let buffer = self.buffers.entry(metric.name.clone()).or_default();
            buffer.push_back(event.clone());

            let window_start = event.timestamp - metric.window;
            while let Some(front) = buffer.front() {
                if front.timestamp < window_start {
                    buffer.pop_front();
                } else {
                    break;
                }
            }

            let result = compute_metric(metric, buffer, event.timestamp)?;
            self.results.insert(metric.name.clone(), result.clone());
            updated.insert(metric.name.clone(), result);
        }

        Ok(updated)
    }

    /// The last computed result for a metric, if any event has matched it yet.
    pub fn get_metric(&self, name: &str) -> Option<&MetricResult> {
        self.results.get(name)
    }

    /// A snapshot of the last computed result for every metric.
    pub fn get_all_metrics(&self) -> HashMap<String, MetricResult> {
        self.results.clone()
    }

    /// Feed a sequence of events through the processor, collecting every
    /// update for every metric in submission order.
    pub fn process_events(
        &mut self,
        events: impl IntoIterator<Item = Event>,
    ) -> Result<HashMap<String, Vec<MetricResult>>> {
        let mut collected: HashMap<String, Vec<MetricResult>> = HashMap::new();

        for event in events {
            let updates = self.add_event(&event)?;
            for (name, result) in updates {
                collected.entry(name).or_default().push(result);
            }
        }

        Ok(collected)
    }

    /// Reset all per-metric buffers and retained results.
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.results.clear();
    }
}

fn compute_metric(
    metric: &MetricDef,
    buffer: &VecDeque<Event>,
    window_end: chrono::DateTime<chrono::Utc>,
) -> Result<MetricResult> {
    let window_start = window_end - metric.window;
    let events: Vec<Event> = buffer.iter().cloned().collect();

    if let Some(group_key) = &metric.group_key {
        let mut groups: HashMap<String, Vec<Event>> = HashMap::new();
        for event in &events {
            groups.entry(group_key(event)).or_default().push(event.clone());
        }

        let mut grouped = HashMap::new();
        for (key, group_events) in groups {
            let value = apply_aggregation(metric, &group_events)?;
            grouped.insert(key, value);
        }

        Ok(MetricResult::grouped(
            metric.name.clone(),
            window_start,
            window_end,
            grouped,
        ))
    } else {
        let value = apply_aggregation(metric, &events)?;
        Ok(MetricResult::scalar(
            metric.name.clone(),
            window_start,
            window_end,
            value,
        ))
    }
}

fn extract_values(metric: &MetricDef, events: &[Event]) -> Result<Vec<f64>> {
    let extractor = metric.value_extractor.as_ref().ok_or_else(|| {
        LogLensError::MetricConfigError(format!(
            "value_extractor required for {} aggregation",
            metric.aggregation.name()
        ))
    })?;
    Ok(events.iter().map(|e| extractor(e)).collect())
}

/// Apply a metric's aggregation over a matched-event slice, per spec.md §4.3
/// step 5. An empty slice yields `0` for COUNT and `None` for everything else.
fn apply_aggregation(metric: &MetricDef, events: &[Event]) -> Result<Option<f64>> {
    if events.is_empty() {
        return Ok(match metric.aggregation {
            AggregationKind::Count => Some(0.0),
            _ => None,
        });
    }

    match &metric.aggregation {
        AggregationKind::Count => Ok(Some(events.len() as f64)),
        AggregationKind::Rate => {
            let first = events.first().unwrap().timestamp;
            let last = events.last().unwrap().timestamp;
            let span_seconds = (last - first).num_milliseconds() as f64 / 1000.0;
            if span_seconds == 0.0 {
                Ok(Some(events.len() as f64))
            } else if span_seconds > 0.0 {
                Ok(Some(events.len() as f64 / span_seconds))
            } else {
                Ok(Some(0.0))
            }
        }
        AggregationKind::Average => {
            let values = extract_values(metric, events)?;
            if values.is_empty() {
                Ok(Some(0.0))
            } else {
                Ok(Some(values.iter().sum::<f64>() / values.len() as f64))
            }
        }
        AggregationKind::Sum => {
            let values = extract_values(metric, events)?;
            Ok(Some(values.iter().sum()))
        }
        AggregationKind::Min => {
            let values = extract_values(metric, events)?;
            Ok(values.into_iter().fold(None, |acc: Option<f64>, v| match acc {
                Some(a) => Some(a.min(v)),
                None => Some(v),
            }))
        }
        AggregationKind::Max => {
            let values = extract_values(metric, events)?;
            Ok(values.into_iter().fold(None, |acc: Option<f64>, v| match acc {
                Some(a) => Some(a.max(v)),
                None => Some(v),
            }))
        }
        AggregationKind::Percentile(p) => {
            let mut values = extract_values(metric, events)?;
            values.sort_by(|a, b| a.total_cmp(b));
            let index = ((p / 100.0) * (values.len() as f64 - 1.0)).floor() as usize;
            Ok(Some(values[index.min(values.len() - 1)]))
        }
        AggregationKind::UniqueCount => {
            let values = extract_values(metric, events)?;
            let unique: HashSet<u64> = values.iter().map(|v| v.to_bits()).collect();
            Ok(Some(unique.len() as f64))
        }
        AggregationKind::Custom(f) => Ok(f(events)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::event::Level;
    use chrono::Duration;
    use std::sync::Arc;

    fn event_at(level: Level, source: &str, seconds: i64, base: chrono::DateTime<chrono::Utc>) -> Event {
        Event::new(base + Duration::seconds(seconds), level, source, "msg", None).unwrap()
    }

    #[test]
    fn error_count_windowing_scenario() {
        // spec.md §8 scenario 1: events at t+0,10,..90 alternating ERROR/INFO,
        // COUNT/5m on level=ERROR. After the 10th event, result = 5.
        let base = chrono::Utc::now();
        let metric = MetricDef::from_window_str(
            "error_count",
            Arc::new(|e: &Event| e.level == Level::Error),
            AggregationKind::Count,
            "5m",
            None,
            None,
            None,
        )
        .unwrap();
        let mut processor = WindowProcessor::new(vec![metric]).unwrap();

        let mut last_result = None;
        for i in 0..10 {
            let level = if i % 2 == 0 { Level::Error } else { Level::Info };
            let event = event_at(level, "app", i * 10, base);
            let updates = processor.add_event(&event).unwrap();
            last_result = updates.get("error_count").cloned().or(last_result);
        }

        assert_eq!(last_result.unwrap().value, Some(5.0));
    }

    #[test]
    fn rate_with_single_event_is_one() {
        let base = chrono::Utc::now();
        let metric = MetricDef::from_window_str(
            "error_rate",
            Arc::new(|e: &Event| e.level == Level::Error),
            AggregationKind::Rate,
            "1m",
            None,
            None,
            None,
        )
        .unwrap();
        let mut processor = WindowProcessor::new(vec![metric]).unwrap();
        let event = event_at(Level::Error, "app", 0, base);
        let updates = processor.add_event(&event).unwrap();
        assert_eq!(updates.get("error_rate").unwrap().value, Some(1.0));
    }

    #[test]
    fn grouped_source_count_scenario() {
        let base = chrono::Utc::now();
        let metric = MetricDef::from_window_str(
            "events_by_source",
            Arc::new(|_: &Event| true),
            AggregationKind::Count,
            "5m",
            None,
            Some(Arc::new(|e: &Event| e.source.clone())),
            None,
        )
        .unwrap();
        let mut processor = WindowProcessor::new(vec![metric]).unwrap();

        let sources = ["app1", "app2", "app3"];
        let mut last = None;
        for i in 0..9 {
            let source = sources[i % 3];
            let event = event_at(Level::Info, source, i as i64 * 10, base);
            let updates = processor.add_event(&event).unwrap();
            last = updates.get("events_by_source").cloned().or(last);
        }

        let result = last.unwrap();
        assert_eq!(result.value, None);
        let grouped = result.grouped.unwrap();
        assert_eq!(grouped.get("app1"), Some(&Some(3.0)));
        assert_eq!(grouped.get("app2"), Some(&Some(3.0)));
        assert_eq!(grouped.get("app3"), Some(&Some(3.0)));
    }

    #[test]
    fn missing_value_extractor_fails_at_aggregation_time() {
        let base = chrono::Utc::now();
        let metric = MetricDef::from_window_str(
            "avg_latency",
            Arc::new(|_: &Event| true),
            AggregationKind::Average,
            "5m",
            None,
            None,
            None,
        )
        .unwrap();
        let mut processor = WindowProcessor::new(vec![metric]).unwrap();
        let event = event_at(Level::Info, "app", 0, base);
        assert!(processor.add_event(&event).is_err());
    }

    #[test]
    fn window_monotonicity_evicts_expired_events() {
        let base = chrono::Utc::now();
        let metric = MetricDef::from_window_str(
            "count_5m",
            Arc::new(|_: &Event| true),
            AggregationKind::Count,
            "5m",
            None,
            None,
            None,
        )
        .unwrap();
        let mut processor = WindowProcessor::new(vec![metric]).unwrap();

        processor.add_event(&event_at(Level::Info, "app", 0, base)).unwrap();
        processor.add_event(&event_at(Level::Info, "app", 100, base)).unwrap();
        let updates = processor
            .add_event(&event_at(Level::Info, "app", 600, base))
            .unwrap();

        // window is 300s; only the event at t+600 remains (t+0 and t+100 expired).
        assert_eq!(updates.get("count_5m").unwrap().value, Some(1.0));
    }

    #[test]
    fn percentile_uses_nearest_rank_lower_index() {
        let base = chrono::Utc::now();
        let metric = MetricDef::from_window_str(
            "p50_latency",
            Arc::new(|_: &Event| true),
            AggregationKind::Percentile(50.0),
            "5m",
            None,
            None,
            Some(Arc::new(|e: &Event| {
                e.metadata.get("latency").and_then(|v| v.as_f64()).unwrap_or(0.0)
            })),
        )
        .unwrap();
        let mut processor = WindowProcessor::new(vec![metric]).unwrap();

        for (i, latency) in [10.0, 20.0, 30.0, 40.0].iter().enumerate() {
            let mut event = event_at(Level::Info, "app", i as i64, base);
            event.metadata.insert("latency", serde_json::json!(latency));
            let updates = processor.add_event(&event).unwrap();
            if i == 3 {
                // sorted [10,20,30,40], index = floor(0.5*3) = 1 -> 20.0
                assert_eq!(updates.get("p50_latency").unwrap().value, Some(20.0));
            }
        }
    }
}
