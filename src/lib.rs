//! OpenLDAP monitor collector.
//!
//! Reads connection, traffic, operation and waiter counters from the
//! `cn=Monitor` backend of an OpenLDAP server and publishes them as a fixed
//! metrics set.
//!
//! - [`config`]: connection settings (JSON/YAML) and validation
//! - [`ldap`]: the connection trait and its ldap3-based implementation
//! - [`collector`]: the collector itself, its DN mapping table and charts
//! - [`scheduler`]: interval-driven collection loop
//! - [`storage`]: sinks receiving charts and metrics

pub mod collector;
pub mod config;
pub mod ldap;
pub mod scheduler;
pub mod storage;
