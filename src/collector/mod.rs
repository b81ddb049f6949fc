// Collector module - the OpenLDAP monitor collector
//
// Lifecycle: `init` validates the configuration, `check` runs one trial
// collection, `collect` is called once per tick, `cleanup` closes the
// connection on teardown. All of it is synchronous; the scheduler runs it on
// the blocking thread pool.

use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigError};
use crate::ldap::{Ldap3Conn, LdapConn, LdapError, SearchRequest, SearchResult};

pub mod charts;
pub mod mapping;

pub use charts::{Chart, Charts};

/// Metric name → value, for one collection cycle.
pub type Metrics = BTreeMap<String, i64>;

/// Creates a (not yet connected) LDAP connection for the given config.
pub type ConnFactory = Box<dyn Fn(&Config) -> Box<dyn LdapConn> + Send + Sync>;

/// Errors that abort a collection cycle
#[derive(Error, Debug)]
pub enum CollectError {
    #[error("failed to connect to '{url}': {source}")]
    Connect {
        url: String,
        #[source]
        source: LdapError,
    },

    #[error("search under '{base_dn}' failed: {source}")]
    Search {
        base_dn: String,
        #[source]
        source: LdapError,
    },

    #[error("incomplete metrics, missing: {}", .0.join(", "))]
    Incomplete(Vec<String>),
}

/// OpenLDAP monitor collector
///
/// Polls `cn=Monitor` through one long-lived connection. The connection is
/// opened lazily on the first cycle, reused while searches succeed, and
/// dropped as soon as one fails so the next cycle starts from a fresh
/// session.
///
/// # Metrics
/// Every successful cycle yields the full key set listed by
/// [`mapping::metric_keys`]; a failed cycle yields an empty map. Partial maps
/// are never returned.
pub struct OpenLdap {
    config: Config,
    charts: Charts,
    conn: Option<Box<dyn LdapConn>>,
    new_conn: ConnFactory,
}

impl OpenLdap {
    /// Creates a collector that talks to the server through ldap3.
    pub fn new(config: Config) -> Self {
        OpenLdap {
            config,
            charts: charts::charts(),
            conn: None,
            new_conn: Box::new(|config: &Config| -> Box<dyn LdapConn> {
                Box::new(Ldap3Conn::new(config))
            }),
        }
    }

    /// Replaces the connection factory (used to plug in other transports).
    pub fn with_conn_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn(&Config) -> Box<dyn LdapConn> + Send + Sync + 'static,
    {
        self.new_conn = Box::new(factory);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// Validates the configuration. Performs no network I/O.
    pub fn init(&self) -> Result<(), ConfigError> {
        self.config.validate()?;
        info!(
            "OpenLDAP collector initialized for {} (bind DN '{}')",
            self.config.url, self.config.username
        );
        Ok(())
    }

    /// Runs one collection cycle and reports whether it produced metrics.
    ///
    /// A successful check leaves the connection open for the next `collect`.
    pub fn check(&mut self) -> Result<(), CollectError> {
        let mx = self.try_collect()?;
        info!("Check against {} succeeded ({} metrics)", self.config.url, mx.len());
        Ok(())
    }

    /// Runs one collection cycle.
    ///
    /// # Returns
    /// The complete metrics map, or an empty map if the cycle failed (the
    /// failure is logged).
    pub fn collect(&mut self) -> Metrics {
        match self.try_collect() {
            Ok(mx) => mx,
            Err(e) => {
                error!("OpenLDAP collection from {} failed: {}", self.config.url, e);
                Metrics::new()
            }
        }
    }

    pub fn charts(&self) -> &Charts {
        &self.charts
    }

    /// Closes the connection if one is open. Safe to call repeatedly; close
    /// errors are logged and swallowed.
    pub fn cleanup(&mut self) {
        let Some(mut conn) = self.conn.take() else {
            return;
        };

        match conn.disconnect() {
            Ok(()) => debug!("Disconnected from {}", self.config.url),
            Err(e) => debug!("Error while disconnecting from {}: {}", self.config.url, e),
        }
    }

    fn try_collect(&mut self) -> Result<Metrics, CollectError> {
        if self.conn.is_none() {
            let mut conn = (self.new_conn)(&self.config);
            conn.connect().map_err(|source| CollectError::Connect {
                url: self.config.url.clone(),
                source,
            })?;
            debug!("Connected to {}", self.config.url);
            self.conn = Some(conn);
        }

        let mut mx = Metrics::new();

        let counters = self.search(&mapping::counters_request())?;
        mapping::collect_counters(&counters, &mut mx);

        let operations = self.search(&mapping::operations_request())?;
        mapping::collect_operations(&operations, &mut mx);
        mapping::add_operation_totals(&mut mx);

        let missing = mapping::missing_keys(&mx);
        if !missing.is_empty() {
            return Err(CollectError::Incomplete(missing));
        }

        debug!("Collected {} metrics from {}", mx.len(), self.config.url);
        Ok(mx)
    }

    /// Runs a search on the open connection; any failure closes it.
    fn search(&mut self, request: &SearchRequest) -> Result<SearchResult, CollectError> {
        let result = match self.conn.as_mut() {
            Some(conn) => conn.search(request),
            None => Err(LdapError::NotConnected),
        };

        result.map_err(|source| {
            warn!(
                "Search under '{}' failed, closing connection to {}",
                request.base_dn, self.config.url
            );
            self.cleanup();
            CollectError::Search {
                base_dn: request.base_dn.clone(),
                source,
            }
        })
    }
}
