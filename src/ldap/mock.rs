// In-memory LDAP connection for tests
//
// Serves canned results for the two monitor searches and records how often
// each method was called. Clones share the same call counters, so a test can
// keep a handle after moving the mock into a collector.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{Entry, LdapConn, LdapError, SearchRequest, SearchResult};
use crate::collector::mapping::{
    ATTR_MONITOR_COUNTER, ATTR_MONITOR_OP_COMPLETED, ATTR_MONITOR_OP_INITIATED, MONITOR_BASE_DN,
    OPERATIONS_BASE_DN,
};

#[derive(Debug, Default)]
pub struct CallCounts {
    connect: AtomicUsize,
    disconnect: AtomicUsize,
    search: AtomicUsize,
}

impl CallCounts {
    pub fn connects(&self) -> usize {
        self.connect.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnect.load(Ordering::SeqCst)
    }

    pub fn searches(&self) -> usize {
        self.search.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockLdapConn {
    pub err_on_connect: bool,
    /// Fail every search
    pub err_on_search: bool,
    /// Fail only searches below this base DN
    pub err_on_search_base: Option<String>,
    pub err_on_disconnect: bool,
    pub counters: SearchResult,
    pub operations: SearchResult,
    pub(crate) calls: Arc<CallCounts>,
}

impl MockLdapConn {
    pub fn calls(&self) -> Arc<CallCounts> {
        Arc::clone(&self.calls)
    }

    /// Seven monitor counters and seven operations, every value "1".
    pub fn ok() -> Self {
        let counters = [
            "cn=Current,cn=Connections,cn=Monitor",
            "cn=Total,cn=Connections,cn=Monitor",
            "cn=Bytes,cn=Statistics,cn=Monitor",
            "cn=Referrals,cn=Statistics,cn=Monitor",
            "cn=Entries,cn=Statistics,cn=Monitor",
            "cn=Write,cn=Waiters,cn=Monitor",
            "cn=Read,cn=Waiters,cn=Monitor",
        ]
        .into_iter()
        .map(|dn| Entry::new(dn).with_attribute(ATTR_MONITOR_COUNTER, &["1"]))
        .collect();

        let operations = ["Bind", "Unbind", "Add", "Delete", "Modify", "Compare", "Search"]
            .into_iter()
            .map(|op| {
                Entry::new(&format!("cn={},cn=Operations,cn=Monitor", op))
                    .with_attribute(ATTR_MONITOR_OP_INITIATED, &["1"])
                    .with_attribute(ATTR_MONITOR_OP_COMPLETED, &["1"])
            })
            .collect();

        MockLdapConn {
            counters: SearchResult { entries: counters },
            operations: SearchResult { entries: operations },
            ..Default::default()
        }
    }

    pub fn err_on_connect() -> Self {
        MockLdapConn {
            err_on_connect: true,
            ..Default::default()
        }
    }

    pub fn err_on_search() -> Self {
        MockLdapConn {
            err_on_search: true,
            ..Default::default()
        }
    }

    /// Counters search succeeds, operations search fails.
    pub fn err_on_operations_search() -> Self {
        MockLdapConn {
            err_on_search_base: Some(OPERATIONS_BASE_DN.to_string()),
            ..Self::ok()
        }
    }
}

impl LdapConn for MockLdapConn {
    fn connect(&mut self) -> Result<(), LdapError> {
        self.calls.connect.fetch_add(1, Ordering::SeqCst);
        if self.err_on_connect {
            return Err(LdapError::Other("mock.connect() error".to_string()));
        }
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LdapError> {
        self.calls.disconnect.fetch_add(1, Ordering::SeqCst);
        if self.err_on_disconnect {
            return Err(LdapError::Other("mock.disconnect() error".to_string()));
        }
        Ok(())
    }

    fn search(&mut self, request: &SearchRequest) -> Result<SearchResult, LdapError> {
        self.calls.search.fetch_add(1, Ordering::SeqCst);

        let fail_here = self
            .err_on_search_base
            .as_deref()
            .is_some_and(|base| base == request.base_dn);
        if self.err_on_search || fail_here {
            return Err(LdapError::Other("mock.search() error".to_string()));
        }

        match request.base_dn.as_str() {
            MONITOR_BASE_DN => Ok(self.counters.clone()),
            OPERATIONS_BASE_DN => Ok(self.operations.clone()),
            other => Err(LdapError::Other(format!(
                "mock.search(): unknown base DN: {}",
                other
            ))),
        }
    }
}
