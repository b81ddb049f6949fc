// DN → metric mapping for the OpenLDAP monitor backend
//
// slapd's back-monitor exposes one entry per counter. Which counter an entry
// carries is encoded in its DN, so the mapping below is an explicit table of
// DNs, one row per metric, instead of string inspection at parse time.

use tracing::debug;

use super::Metrics;
use crate::ldap::{dn_equal, Entry, SearchRequest, SearchResult};

pub const MONITOR_BASE_DN: &str = "cn=Monitor";
pub const OPERATIONS_BASE_DN: &str = "cn=Operations,cn=Monitor";

pub const ATTR_MONITOR_COUNTER: &str = "monitorCounter";
pub const ATTR_MONITOR_OP_INITIATED: &str = "monitorOpInitiated";
pub const ATTR_MONITOR_OP_COMPLETED: &str = "monitorOpCompleted";

const FILTER_MONITOR_COUNTERS: &str = "(objectclass=monitorCounterObject)";
const FILTER_MONITOR_OPERATIONS: &str = "(objectclass=monitorOperation)";

pub const INITIATED_OPERATIONS: &str = "initiated_operations";
pub const COMPLETED_OPERATIONS: &str = "completed_operations";

/// Scalar counters found under `cn=Monitor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorCounter {
    CurrentConnections,
    TotalConnections,
    BytesSent,
    ReferralsSent,
    EntriesSent,
    ReadWaiters,
    WriteWaiters,
}

impl MonitorCounter {
    pub const ALL: [MonitorCounter; 7] = [
        MonitorCounter::CurrentConnections,
        MonitorCounter::TotalConnections,
        MonitorCounter::BytesSent,
        MonitorCounter::ReferralsSent,
        MonitorCounter::EntriesSent,
        MonitorCounter::ReadWaiters,
        MonitorCounter::WriteWaiters,
    ];

    pub fn dn(self) -> &'static str {
        match self {
            MonitorCounter::CurrentConnections => "cn=Current,cn=Connections,cn=Monitor",
            MonitorCounter::TotalConnections => "cn=Total,cn=Connections,cn=Monitor",
            MonitorCounter::BytesSent => "cn=Bytes,cn=Statistics,cn=Monitor",
            MonitorCounter::ReferralsSent => "cn=Referrals,cn=Statistics,cn=Monitor",
            MonitorCounter::EntriesSent => "cn=Entries,cn=Statistics,cn=Monitor",
            MonitorCounter::ReadWaiters => "cn=Read,cn=Waiters,cn=Monitor",
            MonitorCounter::WriteWaiters => "cn=Write,cn=Waiters,cn=Monitor",
        }
    }

    pub fn metric_key(self) -> &'static str {
        match self {
            MonitorCounter::CurrentConnections => "current_connections",
            MonitorCounter::TotalConnections => "total_connections",
            MonitorCounter::BytesSent => "bytes_sent",
            MonitorCounter::ReferralsSent => "referrals_sent",
            MonitorCounter::EntriesSent => "entries_sent",
            MonitorCounter::ReadWaiters => "read_waiters",
            MonitorCounter::WriteWaiters => "write_waiters",
        }
    }

    pub fn from_dn(dn: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|counter| dn_equal(counter.dn(), dn))
    }
}

/// LDAP operation types tracked under `cn=Operations,cn=Monitor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Bind,
    Unbind,
    Add,
    Delete,
    Modify,
    Compare,
    Search,
}

impl Operation {
    pub const ALL: [Operation; 7] = [
        Operation::Bind,
        Operation::Unbind,
        Operation::Add,
        Operation::Delete,
        Operation::Modify,
        Operation::Compare,
        Operation::Search,
    ];

    /// Lowercase name, also used as the chart dimension name.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Bind => "bind",
            Operation::Unbind => "unbind",
            Operation::Add => "add",
            Operation::Delete => "delete",
            Operation::Modify => "modify",
            Operation::Compare => "compare",
            Operation::Search => "search",
        }
    }

    pub fn dn(self) -> &'static str {
        match self {
            Operation::Bind => "cn=Bind,cn=Operations,cn=Monitor",
            Operation::Unbind => "cn=Unbind,cn=Operations,cn=Monitor",
            Operation::Add => "cn=Add,cn=Operations,cn=Monitor",
            Operation::Delete => "cn=Delete,cn=Operations,cn=Monitor",
            Operation::Modify => "cn=Modify,cn=Operations,cn=Monitor",
            Operation::Compare => "cn=Compare,cn=Operations,cn=Monitor",
            Operation::Search => "cn=Search,cn=Operations,cn=Monitor",
        }
    }

    pub fn initiated_key(self) -> &'static str {
        match self {
            Operation::Bind => "initiated_bind_operations",
            Operation::Unbind => "initiated_unbind_operations",
            Operation::Add => "initiated_add_operations",
            Operation::Delete => "initiated_delete_operations",
            Operation::Modify => "initiated_modify_operations",
            Operation::Compare => "initiated_compare_operations",
            Operation::Search => "initiated_search_operations",
        }
    }

    pub fn completed_key(self) -> &'static str {
        match self {
            Operation::Bind => "completed_bind_operations",
            Operation::Unbind => "completed_unbind_operations",
            Operation::Add => "completed_add_operations",
            Operation::Delete => "completed_delete_operations",
            Operation::Modify => "completed_modify_operations",
            Operation::Compare => "completed_compare_operations",
            Operation::Search => "completed_search_operations",
        }
    }

    pub fn from_dn(dn: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| dn_equal(op.dn(), dn))
    }
}

/// Every key a complete metrics map carries.
pub fn metric_keys() -> Vec<&'static str> {
    let mut keys: Vec<&'static str> = MonitorCounter::ALL
        .into_iter()
        .map(MonitorCounter::metric_key)
        .collect();

    for op in Operation::ALL {
        keys.push(op.initiated_key());
        keys.push(op.completed_key());
    }

    keys.push(INITIATED_OPERATIONS);
    keys.push(COMPLETED_OPERATIONS);
    keys
}

pub fn counters_request() -> SearchRequest {
    SearchRequest::new(
        MONITOR_BASE_DN,
        FILTER_MONITOR_COUNTERS,
        &[ATTR_MONITOR_COUNTER],
    )
}

pub fn operations_request() -> SearchRequest {
    SearchRequest::new(
        OPERATIONS_BASE_DN,
        FILTER_MONITOR_OPERATIONS,
        &[ATTR_MONITOR_OP_INITIATED, ATTR_MONITOR_OP_COMPLETED],
    )
}

/// Records the scalar counters found in a `cn=Monitor` search.
///
/// Entries whose DN is not in the table (slapd publishes more counters than
/// are charted) and values that are not integers are skipped.
pub fn collect_counters(result: &SearchResult, mx: &mut Metrics) {
    for entry in &result.entries {
        let Some(counter) = MonitorCounter::from_dn(&entry.dn) else {
            continue;
        };

        if let Some(value) = parse_attr(entry, ATTR_MONITOR_COUNTER) {
            mx.insert(counter.metric_key().to_string(), value);
        }
    }
}

/// Records initiated/completed counts per operation type.
pub fn collect_operations(result: &SearchResult, mx: &mut Metrics) {
    for entry in &result.entries {
        let Some(op) = Operation::from_dn(&entry.dn) else {
            continue;
        };

        if let Some(value) = parse_attr(entry, ATTR_MONITOR_OP_INITIATED) {
            mx.insert(op.initiated_key().to_string(), value);
        }
        if let Some(value) = parse_attr(entry, ATTR_MONITOR_OP_COMPLETED) {
            mx.insert(op.completed_key().to_string(), value);
        }
    }
}

/// Adds `initiated_operations` / `completed_operations`, the sums over all
/// operation types.
pub fn add_operation_totals(mx: &mut Metrics) {
    let mut initiated = 0i64;
    let mut completed = 0i64;

    for op in Operation::ALL {
        initiated = initiated.saturating_add(mx.get(op.initiated_key()).copied().unwrap_or(0));
        completed = completed.saturating_add(mx.get(op.completed_key()).copied().unwrap_or(0));
    }

    mx.insert(INITIATED_OPERATIONS.to_string(), initiated);
    mx.insert(COMPLETED_OPERATIONS.to_string(), completed);
}

/// Keys from [`metric_keys`] that `mx` lacks.
pub fn missing_keys(mx: &Metrics) -> Vec<String> {
    metric_keys()
        .into_iter()
        .filter(|key| !mx.contains_key(*key))
        .map(str::to_string)
        .collect()
}

fn parse_attr(entry: &Entry, attr: &str) -> Option<i64> {
    let raw = entry.first_value(attr)?;

    match raw.trim().parse::<i64>() {
        Ok(value) => Some(value),
        Err(e) => {
            debug!("Skipping '{}' of '{}': value '{}' is not an integer ({})", attr, entry.dn, raw, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_keys_are_unique() {
        let keys = metric_keys();
        let unique: HashSet<_> = keys.iter().collect();

        assert_eq!(keys.len(), 23);
        assert_eq!(unique.len(), keys.len());
    }

    #[test]
    fn test_dn_table_round_trips() {
        for counter in MonitorCounter::ALL {
            assert_eq!(MonitorCounter::from_dn(counter.dn()), Some(counter));
        }
        for op in Operation::ALL {
            assert_eq!(Operation::from_dn(op.dn()), Some(op));
            assert!(op.initiated_key().contains(op.name()));
            assert!(op.completed_key().contains(op.name()));
        }

        assert_eq!(
            MonitorCounter::from_dn("cn=max file descriptors,cn=connections,cn=monitor"),
            None
        );
        assert_eq!(Operation::from_dn("cn=Abandon,cn=Operations,cn=Monitor"), None);
    }

    #[test]
    fn test_collect_counters_skips_unknown_and_invalid() {
        let result = SearchResult {
            entries: vec![
                Entry::new("cn=Bytes,cn=Statistics,cn=Monitor")
                    .with_attribute(ATTR_MONITOR_COUNTER, &["4096"]),
                Entry::new("CN=Current, CN=Connections, CN=Monitor")
                    .with_attribute("monitorcounter", &["3"]),
                Entry::new("cn=Max File Descriptors,cn=Connections,cn=Monitor")
                    .with_attribute(ATTR_MONITOR_COUNTER, &["1024"]),
                Entry::new("cn=Entries,cn=Statistics,cn=Monitor")
                    .with_attribute(ATTR_MONITOR_COUNTER, &["many"]),
                Entry::new("cn=Referrals,cn=Statistics,cn=Monitor"),
            ],
        };

        let mut mx = Metrics::new();
        collect_counters(&result, &mut mx);

        assert_eq!(mx.len(), 2);
        assert_eq!(mx["bytes_sent"], 4096);
        assert_eq!(mx["current_connections"], 3);
    }

    #[test]
    fn test_operation_totals() {
        let entries = Operation::ALL
            .into_iter()
            .zip(1..)
            .map(|(op, n): (Operation, i64)| {
                let initiated = (n * 10).to_string();
                let completed = n.to_string();
                Entry::new(op.dn())
                    .with_attribute(ATTR_MONITOR_OP_INITIATED, &[initiated.as_str()])
                    .with_attribute(ATTR_MONITOR_OP_COMPLETED, &[completed.as_str()])
            })
            .collect();

        let mut mx = Metrics::new();
        collect_operations(&SearchResult { entries }, &mut mx);
        add_operation_totals(&mut mx);

        assert_eq!(mx["initiated_bind_operations"], 10);
        assert_eq!(mx["completed_search_operations"], 7);
        assert_eq!(mx[INITIATED_OPERATIONS], 280);
        assert_eq!(mx[COMPLETED_OPERATIONS], 28);
    }

    #[test]
    fn test_missing_keys() {
        let mut mx = Metrics::new();
        assert_eq!(missing_keys(&mx).len(), 23);

        for key in metric_keys() {
            mx.insert(key.to_string(), 0);
        }
        assert!(missing_keys(&mx).is_empty());

        mx.remove("read_waiters");
        assert_eq!(missing_keys(&mx), vec!["read_waiters".to_string()]);
    }
}
