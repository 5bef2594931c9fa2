#![allow(dead_code)]
use dnsfilter_infrastructure::dns::ConnectionPool;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_rustls::TlsAcceptor;

/// Self-signed certificate for `localhost` / `127.0.0.1`, with a server
/// acceptor and a client config that trusts it.
pub struct TlsFixture {
    pub acceptor: TlsAcceptor,
    pub client_config: Arc<ClientConfig>,
}

impl TlsFixture {
    pub fn localhost() -> Self {
        let certified = rcgen::generate_simple_self_signed(vec![
            "localhost".to_string(),
            "127.0.0.1".to_string(),
        ])
        .expect("self-signed certificate");

        let cert_der: CertificateDer<'static> = certified.cert.der().clone();
        let key_der = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            certified.key_pair.serialize_der(),
        ));

        let server_config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der.clone()], key_der)
            .expect("server TLS config");

        let mut roots = RootCertStore::empty();
        roots.add(cert_der).expect("trust anchor");

        let client_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();

        Self {
            acceptor: TlsAcceptor::from(Arc::new(server_config)),
            client_config: Arc::new(client_config),
        }
    }

    /// Pool whose TLS connections trust this fixture's certificate.
    pub fn pool(&self, idle_timeout: Duration) -> Arc<ConnectionPool> {
        Arc::new(ConnectionPool::with_tls_config(
            idle_timeout,
            self.client_config.clone(),
        ))
    }
}
