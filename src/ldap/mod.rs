// LDAP module - the connection capability the collector depends on
//
// The collector never talks to ldap3 directly. It goes through the `LdapConn`
// trait so the transport can be swapped (the production client lives in
// `client.rs`, tests use the in-memory fake from `mock.rs`).

use thiserror::Error;

pub mod client;
#[cfg(test)]
pub mod mock;

pub use client::Ldap3Conn;

/// Errors raised by an LDAP transport
#[derive(Error, Debug)]
pub enum LdapError {
    #[error("LDAP operation failed: {0}")]
    Protocol(#[from] ldap3::LdapError),

    #[error("not connected")]
    NotConnected,

    #[error("TLS setup failed: {0}")]
    Tls(String),

    #[error("{0}")]
    Other(String),
}

/// A subtree search below `base_dn`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub filter: String,
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn new(base_dn: &str, filter: &str, attributes: &[&str]) -> Self {
        SearchRequest {
            base_dn: base_dn.to_string(),
            filter: filter.to_string(),
            attributes: attributes.iter().map(|a| a.to_string()).collect(),
        }
    }
}

/// A named attribute and its string values, in server order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Entry {
    pub dn: String,
    pub attributes: Vec<Attribute>,
}

impl Entry {
    pub fn new(dn: &str) -> Self {
        Entry {
            dn: dn.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, name: &str, values: &[&str]) -> Self {
        self.attributes.push(Attribute {
            name: name.to_string(),
            values: values.iter().map(|v| v.to_string()).collect(),
        });
        self
    }

    /// First value of the attribute `name`. Attribute names are matched
    /// case-insensitively, as LDAP does.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
            .and_then(|attr| attr.values.first())
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResult {
    pub entries: Vec<Entry>,
}

/// Connection to a directory server.
///
/// Calls are synchronous and block until the server answers or the
/// transport's timeout fires. Implementations are owned by exactly one
/// collector, so `&mut self` is enough; no internal locking is expected.
pub trait LdapConn: Send {
    /// Opens the session (and binds, for transports that authenticate).
    fn connect(&mut self) -> Result<(), LdapError>;

    /// Closes the session.
    fn disconnect(&mut self) -> Result<(), LdapError>;

    /// Runs a search and returns every entry it produced.
    fn search(&mut self, request: &SearchRequest) -> Result<SearchResult, LdapError>;
}

/// Compares two distinguished names.
///
/// Attribute types and values are compared case-insensitively and whitespace
/// around `,` and `=` is ignored, so `cn=Bytes, cn=Statistics,cn=Monitor`
/// equals `CN=bytes,cn=statistics,cn=monitor`.
pub fn dn_equal(a: &str, b: &str) -> bool {
    let mut left = a.split(',');
    let mut right = b.split(',');

    loop {
        match (left.next(), right.next()) {
            (None, None) => return true,
            (Some(l), Some(r)) if rdn_equal(l, r) => continue,
            _ => return false,
        }
    }
}

fn rdn_equal(a: &str, b: &str) -> bool {
    match (a.split_once('='), b.split_once('=')) {
        (Some((a_type, a_value)), Some((b_type, b_value))) => {
            a_type.trim().eq_ignore_ascii_case(b_type.trim())
                && a_value.trim().eq_ignore_ascii_case(b_value.trim())
        }
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}
