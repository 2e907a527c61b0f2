//! HTTP client for the connectivity service.

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use url::Url;

use super::{ConnectionId, ConnectionRegistration, ConnectionRegistry, RegistryError};

const REGISTRY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct PartitionRequest<'a, T> {
    partition: &'a str,
    connections: [&'a T; 1],
}

/// Registry reached over HTTP at `{base}/publish` and `{base}/retract`.
///
/// Requests are scoped to a session partition.
#[derive(Debug, Clone)]
pub struct HttpConnectivityRegistry {
    client: Client,
    publish_url: Url,
    retract_url: Url,
    session: String,
}

impl HttpConnectivityRegistry {
    /// Builds a client for the registry rooted at `base`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Endpoint`] when the endpoint URLs cannot be
    /// derived from `base`, or [`RegistryError::Request`] when the HTTP client
    /// cannot be built.
    pub fn new(base: &Url, session: impl Into<String>) -> Result<Self, RegistryError> {
        let mut root = base.clone();
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        let endpoint = |name: &str| {
            root.join(name).map_err(|source| RegistryError::Endpoint {
                base: base.to_string(),
                source,
            })
        };
        let publish_url = endpoint("publish")?;
        let retract_url = endpoint("retract")?;
        let client = Client::builder()
            .timeout(REGISTRY_TIMEOUT)
            .build()
            .map_err(|source| RegistryError::Request {
                url: base.to_string(),
                source,
            })?;
        Ok(Self {
            client,
            publish_url,
            retract_url,
            session: session.into(),
        })
    }

    fn post<T: Serialize>(&self, url: &Url, connection: &T) -> Result<(), RegistryError> {
        let request = PartitionRequest {
            partition: &self.session,
            connections: [connection],
        };
        let body =
            serde_json::to_vec(&request).map_err(|source| RegistryError::Encode { source })?;
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .map_err(|source| RegistryError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(RegistryError::Rejected {
                url: url.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

impl ConnectionRegistry for HttpConnectivityRegistry {
    fn publish(&self, registration: &ConnectionRegistration) -> Result<(), RegistryError> {
        self.post(&self.publish_url, registration)
    }

    fn retract(&self, id: &ConnectionId) -> Result<(), RegistryError> {
        self.post(&self.retract_url, id)
    }
}
