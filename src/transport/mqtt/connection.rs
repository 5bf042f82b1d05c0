//! Pure connection configuration for the MQTT client
//!
//! Broker URL parsing, rustls client configuration for mutual TLS, and the
//! connection state shared with the event loop driver.

use crate::config::{BrokerSection, TlsSection};
use rumqttc::tokio_rustls::rustls::{
    self,
    pki_types::{CertificateDer, PrivateKeyDer},
    ClientConfig, RootCertStore,
};
use rumqttc::v5::MqttOptions;
use rumqttc::{TlsConfiguration, Transport as RumqttcTransport};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Port AWS IoT Core serves MQTT over TLS on
pub const DEFAULT_TLS_PORT: u16 = 8883;

/// Connection state for MQTT client
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    /// Waiting for CONNACK
    Connecting,
    /// Broker accepted the session
    Connected,
    /// Disconnected with reason
    Disconnected(String),
}

impl ConnectionState {
    pub fn can_publish(&self) -> bool {
        matches!(self, ConnectionState::Connected)
    }
}

/// MQTT transport errors
#[derive(Debug, Error)]
pub enum MqttError {
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Failed to read TLS file {}", path.display())]
    TlsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid TLS material: {0}")]
    InvalidTlsMaterial(String),
    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },
    #[error("Connection failed: {0}")]
    ConnectionFailedStr(String),
}

/// Split an `mqtts://host[:port]` URL into host and port
pub fn parse_broker_url(broker_url: &str) -> Result<(String, u16), MqttError> {
    let url =
        Url::parse(broker_url).map_err(|_| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;

    if url.scheme() != "mqtts" {
        return Err(MqttError::InvalidBrokerUrl(format!(
            "{broker_url} (only mqtts:// is supported)"
        )));
    }

    let host = url
        .host_str()
        .ok_or_else(|| MqttError::InvalidBrokerUrl(broker_url.to_string()))?;
    let port = url.port().unwrap_or(DEFAULT_TLS_PORT);

    Ok((host.to_string(), port))
}

/// Build MQTT options for a mutually authenticated TLS session
pub fn configure_mqtt_options(
    broker: &BrokerSection,
    tls: &TlsSection,
) -> Result<MqttOptions, MqttError> {
    let (host, port) = parse_broker_url(&broker.url)?;

    let mut mqtt_options = MqttOptions::new(broker.client_id.clone(), host, port);

    let tls_config = load_tls_config(tls)?;
    mqtt_options.set_transport(RumqttcTransport::tls_with_config(
        TlsConfiguration::Rustls(Arc::new(tls_config)),
    ));

    mqtt_options.set_keep_alive(Duration::from_secs(broker.keep_alive_secs));

    Ok(mqtt_options)
}

/// Build a TLS 1.2 rustls client config from the CA, certificate and key PEM
/// files
pub fn load_tls_config(tls: &TlsSection) -> Result<ClientConfig, MqttError> {
    let mut roots = RootCertStore::empty();
    for ca in read_certs(&tls.ca_path)? {
        roots
            .add(ca)
            .map_err(|e| MqttError::InvalidTlsMaterial(format!("root CA: {e}")))?;
    }

    let cert_chain = read_certs(&tls.cert_path)?;
    let key = read_private_key(&tls.key_path)?;

    ClientConfig::builder_with_protocol_versions(&[&rustls::version::TLS12])
        .with_root_certificates(roots)
        .with_client_auth_cert(cert_chain, key)
        .map_err(|e| MqttError::InvalidTlsMaterial(format!("client certificate: {e}")))
}

fn open_pem(path: &Path) -> Result<BufReader<File>, MqttError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| MqttError::TlsFile {
            path: path.to_path_buf(),
            source,
        })
}

/// Read every certificate from a PEM file; an empty file is an error
pub fn read_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, MqttError> {
    let mut reader = open_pem(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| MqttError::TlsFile {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(MqttError::InvalidTlsMaterial(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

/// Read the first private key (PKCS#1, PKCS#8 or SEC1) from a PEM file
pub fn read_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, MqttError> {
    let mut reader = open_pem(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| MqttError::TlsFile {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| {
            MqttError::InvalidTlsMaterial(format!("no private key found in {}", path.display()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_broker_url() {
        let (host, port) = parse_broker_url(&BrokerSection::default().url).unwrap();
        assert_eq!(host, "a1amrksqm7ehvm-ats.iot.eu-north-1.amazonaws.com");
        assert_eq!(port, 8883);
    }

    #[test]
    fn test_parse_broker_url_default_port() {
        let (host, port) = parse_broker_url("mqtts://broker.example.com").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, DEFAULT_TLS_PORT);
    }

    #[test]
    fn test_plain_mqtt_is_rejected() {
        let result = parse_broker_url("mqtt://localhost:1883");
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_invalid_broker_url() {
        let result = parse_broker_url("invalid-url");
        assert!(matches!(result, Err(MqttError::InvalidBrokerUrl(_))));
    }

    #[test]
    fn test_missing_tls_file_is_reported_with_path() {
        let dir = tempfile::tempdir().unwrap();
        let tls = TlsSection {
            ca_path: dir.path().join("root-CA.crt"),
            cert_path: dir.path().join("device.cert.pem"),
            key_path: dir.path().join("device.private.key"),
        };

        match load_tls_config(&tls) {
            Err(MqttError::TlsFile { path, source }) => {
                assert_eq!(path, dir.path().join("root-CA.crt"));
                assert_eq!(source.kind(), std::io::ErrorKind::NotFound);
            }
            other => panic!("expected TlsFile error, got {other:?}"),
        }
    }

    #[test]
    fn test_pem_without_certificates_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pem");
        std::fs::write(&path, "not a certificate\n").unwrap();

        assert!(matches!(
            read_certs(&path),
            Err(MqttError::InvalidTlsMaterial(_))
        ));
    }

    #[test]
    fn test_pem_without_key_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.key");
        std::fs::write(&path, "").unwrap();

        assert!(matches!(
            read_private_key(&path),
            Err(MqttError::InvalidTlsMaterial(_))
        ));
    }

    #[test]
    fn test_connection_state_can_publish() {
        assert!(ConnectionState::Connected.can_publish());
        assert!(!ConnectionState::Connecting.can_publish());
        assert!(!ConnectionState::Disconnected("closed".to_string()).can_publish());
    }

    #[test]
    fn test_mqtt_error_display() {
        let errors = vec![
            MqttError::ConnectionFailed("test".to_string().into()),
            MqttError::PublishFailed("test".to_string().into()),
            MqttError::InvalidBrokerUrl("test".to_string()),
            MqttError::InvalidTlsMaterial("test".to_string()),
            MqttError::NotConnected {
                state: ConnectionState::Disconnected("test".to_string()),
            },
            MqttError::ConnectionFailedStr("test".to_string()),
        ];

        for error in errors {
            let error_string = error.to_string();
            assert!(!error_string.is_empty());
        }
    }
}
