//! Client handoff for confirmed detections.
//!
//! One closed set of client cases: SSH and HTTP(S) wrap external-library
//! clients rather than exposing them raw, Telnet is the built-in engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;

use crate::detector::results::Protocol;
use crate::error::ClientError;
use crate::telnet::TelnetSession;

pub type SshHandle = client::Handle<DetectionHandler>;

/// Handle to whichever client matches a detection.
pub enum ClientHandle {
    Ssh(SshHandle),
    Http(HttpClient),
    Https(HttpClient),
    Telnet(TelnetSession),
}

impl ClientHandle {
    pub fn protocol(&self) -> Protocol {
        match self {
            ClientHandle::Ssh(_) => Protocol::Ssh,
            ClientHandle::Http(_) => Protocol::Http,
            ClientHandle::Https(_) => Protocol::Https,
            ClientHandle::Telnet(_) => Protocol::Telnet,
        }
    }

    pub fn as_telnet_mut(&mut self) -> Option<&mut TelnetSession> {
        match self {
            ClientHandle::Telnet(session) => Some(session),
            _ => None,
        }
    }

    /// Tear the client down. HTTP clients release on drop; SSH and Telnet
    /// get an orderly disconnect.
    pub async fn close(self) -> Result<(), ClientError> {
        match self {
            ClientHandle::Ssh(handle) => {
                handle
                    .disconnect(russh::Disconnect::ByApplication, "", "en")
                    .await?;
                Ok(())
            }
            ClientHandle::Http(_) | ClientHandle::Https(_) => Ok(()),
            ClientHandle::Telnet(mut session) => {
                session.close().await;
                Ok(())
            }
        }
    }
}

/// SSH handler for detection-grade connections. Host-key policy belongs to
/// the caller once the handle is handed over.
pub struct DetectionHandler;

#[async_trait]
impl client::Handler for DetectionHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

pub async fn connect_ssh(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<SshHandle, ClientError> {
    let config = Arc::new(client::Config::default());
    match tokio::time::timeout(
        connect_timeout,
        client::connect(config, (host, port), DetectionHandler),
    )
    .await
    {
        Ok(Ok(handle)) => Ok(handle),
        Ok(Err(e)) => Err(ClientError::Ssh(e)),
        Err(_) => Err(ClientError::ConnectTimeout),
    }
}

/// HTTP(S) client bound to one endpoint.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpClient {
    pub fn new(host: &str, port: u16, tls: bool) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .build()?;
        let scheme = if tls { "https" } else { "http" };
        Ok(Self {
            client,
            base_url: format!("{scheme}://{host}:{port}"),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url, path))
    }

    pub fn inner(&self) -> &reqwest::Client {
        &self.client
    }
}
