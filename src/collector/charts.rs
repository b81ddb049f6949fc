// Chart descriptors published once to the metrics consumer
//
// Each dimension id is a key of the collector's metrics map; the consumer
// looks the value up by that id on every cycle.

use serde::Serialize;

use super::mapping::{
    MonitorCounter, Operation, COMPLETED_OPERATIONS, INITIATED_OPERATIONS,
};
use super::Metrics;

/// First priority assigned to OpenLDAP charts; later charts sort after it.
const PRIORITY_BASE: u32 = 70_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Line,
    Area,
    Stacked,
}

/// How the consumer should treat successive values of a dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Plot the value as is
    Absolute,
    /// Plot the per-second rate of change of a monotonic counter
    Incremental,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dim {
    pub id: &'static str,
    pub name: &'static str,
    pub algorithm: Algorithm,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chart {
    pub id: &'static str,
    pub title: &'static str,
    pub units: &'static str,
    pub family: &'static str,
    pub context: &'static str,
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub priority: u32,
    pub dims: Vec<Dim>,
}

pub type Charts = Vec<Chart>;

fn dim(id: &'static str, name: &'static str, algorithm: Algorithm) -> Dim {
    Dim { id, name, algorithm }
}

/// The full, fixed chart set of the collector.
pub fn charts() -> Charts {
    use Algorithm::{Absolute, Incremental};

    vec![
        Chart {
            id: "current_connections",
            title: "Current Connections",
            units: "connections",
            family: "connections",
            context: "openldap.current_connections",
            chart_type: ChartType::Line,
            priority: PRIORITY_BASE,
            dims: vec![dim(MonitorCounter::CurrentConnections.metric_key(), "active", Absolute)],
        },
        Chart {
            id: "connections",
            title: "Connections",
            units: "connections/s",
            family: "connections",
            context: "openldap.connections",
            chart_type: ChartType::Line,
            priority: PRIORITY_BASE + 1,
            dims: vec![dim(MonitorCounter::TotalConnections.metric_key(), "connections", Incremental)],
        },
        Chart {
            id: "traffic",
            title: "Traffic",
            units: "bytes/s",
            family: "activity",
            context: "openldap.traffic",
            chart_type: ChartType::Area,
            priority: PRIORITY_BASE + 2,
            dims: vec![dim(MonitorCounter::BytesSent.metric_key(), "sent", Incremental)],
        },
        Chart {
            id: "entries",
            title: "Entries",
            units: "entries/s",
            family: "activity",
            context: "openldap.entries",
            chart_type: ChartType::Line,
            priority: PRIORITY_BASE + 3,
            dims: vec![dim(MonitorCounter::EntriesSent.metric_key(), "sent", Incremental)],
        },
        Chart {
            id: "referrals",
            title: "Referrals",
            units: "referrals/s",
            family: "activity",
            context: "openldap.referrals",
            chart_type: ChartType::Line,
            priority: PRIORITY_BASE + 4,
            dims: vec![dim(MonitorCounter::ReferralsSent.metric_key(), "sent", Incremental)],
        },
        Chart {
            id: "operations",
            title: "Operations",
            units: "operations/s",
            family: "operations",
            context: "openldap.operations",
            chart_type: ChartType::Line,
            priority: PRIORITY_BASE + 5,
            dims: vec![
                dim(COMPLETED_OPERATIONS, "completed", Incremental),
                dim(INITIATED_OPERATIONS, "initiated", Incremental),
            ],
        },
        Chart {
            id: "operations_by_type",
            title: "Operations by Type",
            units: "operations/s",
            family: "operations",
            context: "openldap.operations_by_type",
            chart_type: ChartType::Stacked,
            priority: PRIORITY_BASE + 6,
            dims: Operation::ALL
                .into_iter()
                .map(|op| dim(op.completed_key(), op.name(), Incremental))
                .collect(),
        },
        Chart {
            id: "waiters",
            title: "Waiters",
            units: "waiters/s",
            family: "waiters",
            context: "openldap.waiters",
            chart_type: ChartType::Line,
            priority: PRIORITY_BASE + 7,
            dims: vec![
                dim(MonitorCounter::WriteWaiters.metric_key(), "write", Incremental),
                dim(MonitorCounter::ReadWaiters.metric_key(), "read", Incremental),
            ],
        },
    ]
}

/// Dimension ids declared by `charts` that have no value in `mx`.
pub fn missing_dimensions(charts: &[Chart], mx: &Metrics) -> Vec<&'static str> {
    charts
        .iter()
        .flat_map(|chart| chart.dims.iter())
        .map(|dim| dim.id)
        .filter(|id| !mx.contains_key(*id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mapping::metric_keys;
    use std::collections::HashSet;

    #[test]
    fn test_charts_are_not_empty() {
        let charts = charts();
        assert!(!charts.is_empty());
        assert!(charts.iter().all(|chart| !chart.dims.is_empty()));
    }

    #[test]
    fn test_chart_ids_are_unique() {
        let charts = charts();
        let ids: HashSet<_> = charts.iter().map(|chart| chart.id).collect();
        assert_eq!(ids.len(), charts.len());

        for chart in &charts {
            assert_eq!(chart.context, format!("openldap.{}", chart.id));
        }
    }

    #[test]
    fn test_every_dimension_is_a_metric_key() {
        let keys: HashSet<&str> = metric_keys().into_iter().collect();

        for chart in charts() {
            for dim in &chart.dims {
                assert!(keys.contains(dim.id), "{} in chart {}", dim.id, chart.id);
            }
        }
    }

    #[test]
    fn test_missing_dimensions() {
        let charts = charts();
        let mut mx = Metrics::new();
        for key in metric_keys() {
            mx.insert(key.to_string(), 1);
        }
        assert!(missing_dimensions(&charts, &mx).is_empty());

        mx.remove("bytes_sent");
        assert_eq!(missing_dimensions(&charts, &mx), vec!["bytes_sent"]);
    }

    #[test]
    fn test_chart_serializes_type_field() {
        let value = serde_json::to_value(&charts()[0]).unwrap();
        assert_eq!(value["type"], "line");
        assert_eq!(value["dims"][0]["algorithm"], "absolute");
    }
}
