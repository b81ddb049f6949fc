// Production LDAP transport built on the ldap3 crate
//
// Uses the synchronous `ldap3::LdapConn`, which drives its own single-threaded
// runtime. Because of that, every call on this type must happen off the async
// executor threads (the scheduler runs the collector inside `spawn_blocking`).

use ldap3::{LdapConnSettings, Scope, SearchEntry};
use native_tls::{Certificate, Identity, TlsConnector};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::{Attribute, Entry, LdapConn, LdapError, SearchRequest, SearchResult};
use crate::config::Config;

/// LDAP connection backed by `ldap3::LdapConn`.
///
/// `connect` dials the configured URL and performs a simple bind with the
/// configured username/password. The session is kept until `disconnect`.
pub struct Ldap3Conn {
    config: Config,
    session: Option<ldap3::LdapConn>,
}

impl Ldap3Conn {
    pub fn new(config: &Config) -> Self {
        Ldap3Conn {
            config: config.clone(),
            session: None,
        }
    }

    fn settings(&self) -> Result<LdapConnSettings, LdapError> {
        let mut settings = LdapConnSettings::new().set_conn_timeout(self.config.timeout_duration());

        // A custom connector replaces ldap3's default one, which is the only
        // place `set_no_tls_verify` applies; `tls_connector` handles it itself.
        if self.config.tls_ca.is_some() || self.config.tls_cert.is_some() {
            settings = settings.set_connector(self.tls_connector()?);
        } else if self.config.tls_skip_verify {
            settings = settings.set_no_tls_verify(true);
        }

        Ok(settings)
    }

    /// Builds a native-tls connector from the configured CA and client
    /// certificate files.
    fn tls_connector(&self) -> Result<TlsConnector, LdapError> {
        let mut builder = TlsConnector::builder();

        if let Some(ca_path) = &self.config.tls_ca {
            let pem = read_pem(ca_path)?;
            let ca = Certificate::from_pem(&pem).map_err(|e| {
                LdapError::Tls(format!("invalid CA certificate '{}': {}", ca_path.display(), e))
            })?;
            builder.add_root_certificate(ca);
        }

        if let (Some(cert_path), Some(key_path)) = (&self.config.tls_cert, &self.config.tls_key) {
            let cert = read_pem(cert_path)?;
            let key = read_pem(key_path)?;
            let identity = Identity::from_pkcs8(&cert, &key).map_err(|e| {
                LdapError::Tls(format!(
                    "invalid client certificate '{}' / key '{}': {}",
                    cert_path.display(),
                    key_path.display(),
                    e
                ))
            })?;
            builder.identity(identity);
        }

        if self.config.tls_skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }

        builder
            .build()
            .map_err(|e| LdapError::Tls(format!("failed to build TLS connector: {}", e)))
    }
}

impl LdapConn for Ldap3Conn {
    fn connect(&mut self) -> Result<(), LdapError> {
        let settings = self.settings()?;

        debug!("Dialing LDAP server at {}", self.config.url);
        let mut session = ldap3::LdapConn::with_settings(settings, &self.config.url)?;

        session
            .with_timeout(self.config.timeout_duration())
            .simple_bind(&self.config.username, &self.config.password)?
            .success()?;

        debug!("Bound to {} as '{}'", self.config.url, self.config.username);
        self.session = Some(session);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), LdapError> {
        if let Some(mut session) = self.session.take() {
            session.unbind()?;
        }
        Ok(())
    }

    fn search(&mut self, request: &SearchRequest) -> Result<SearchResult, LdapError> {
        let timeout = self.config.timeout_duration();
        let session = self.session.as_mut().ok_or(LdapError::NotConnected)?;

        let (entries, _) = session
            .with_timeout(timeout)
            .search(
                &request.base_dn,
                Scope::Subtree,
                &request.filter,
                request.attributes.as_slice(),
            )?
            .success()?;

        let entries = entries
            .into_iter()
            .map(|raw| {
                let entry = SearchEntry::construct(raw);
                let mut attributes: Vec<Attribute> = entry
                    .attrs
                    .into_iter()
                    .map(|(name, values)| Attribute { name, values })
                    .collect();
                attributes.sort_by(|a, b| a.name.cmp(&b.name));

                Entry {
                    dn: entry.dn,
                    attributes,
                }
            })
            .collect();

        Ok(SearchResult { entries })
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, LdapError> {
    fs::read(path).map_err(|e| LdapError::Tls(format!("failed to read '{}': {}", path.display(), e)))
}
