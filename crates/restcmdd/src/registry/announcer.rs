//! Publishes and retracts the control endpoint registration.

use std::net::{IpAddr, Ipv4Addr, ToSocketAddrs};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{info, warn};

use restcmd_config::defaults::CONTROL_DATA_TYPE;

use super::{
    ConnectionId, ConnectionRegistration, ConnectionRegistry, Direction, REGISTRY_TARGET,
    RegistryError,
};

/// Source of the IPv4 address announced to the registry.
pub type HostResolver = Arc<dyn Fn() -> Result<Ipv4Addr, RegistryError> + Send + Sync>;

/// Announces the bound endpoint through a [`ConnectionRegistry`].
pub struct RegistryAnnouncer {
    registry: Arc<dyn ConnectionRegistry>,
    app_name: String,
    scheme: String,
    resolver: HostResolver,
    announced: Mutex<Option<ConnectionId>>,
}

impl RegistryAnnouncer {
    /// Builds an announcer that resolves the local hostname to IPv4.
    pub fn new(
        registry: Arc<dyn ConnectionRegistry>,
        app_name: impl Into<String>,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            app_name: app_name.into(),
            scheme: scheme.into(),
            resolver: Arc::new(resolve_local_ipv4),
            announced: Mutex::new(None),
        }
    }

    /// Replaces the local address lookup.
    #[must_use]
    pub fn with_resolver(mut self, resolver: HostResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Registration describing `ip:port` for this application.
    #[must_use]
    pub fn registration(&self, ip: Ipv4Addr, port: u16) -> ConnectionRegistration {
        ConnectionRegistration {
            uid: format!("{}_control", self.app_name),
            data_type: CONTROL_DATA_TYPE.to_owned(),
            uri: format!("{}://{ip}:{port}", self.scheme),
            direction: Direction::Bidirectional,
        }
    }

    /// Resolves the local address and publishes the endpoint bound on
    /// `bound_port`.
    ///
    /// A failed publish is logged; the registration is still remembered so
    /// [`RegistryAnnouncer::withdraw`] retracts it.
    ///
    /// # Errors
    ///
    /// Returns the resolution error when the local IPv4 address cannot be
    /// determined. Nothing is published in that case.
    pub fn announce(&self, bound_port: u16) -> Result<ConnectionRegistration, RegistryError> {
        let ip = (self.resolver)()?;
        let registration = self.registration(ip, bound_port);
        match self.registry.publish(&registration) {
            Ok(()) => info!(
                target: REGISTRY_TARGET,
                uid = %registration.uid,
                uri = %registration.uri,
                "endpoint published"
            ),
            Err(error) => warn!(
                target: REGISTRY_TARGET,
                uid = %registration.uid,
                uri = %registration.uri,
                error = %error,
                "failed to publish endpoint"
            ),
        }
        *self.slot() = Some(registration.id());
        Ok(registration)
    }

    /// Retracts the announced registration, if any. Later calls do nothing.
    pub fn withdraw(&self) {
        let Some(id) = self.slot().take() else {
            return;
        };
        match self.registry.retract(&id) {
            Ok(()) => info!(target: REGISTRY_TARGET, uid = %id.uid, "endpoint retracted"),
            Err(error) => warn!(
                target: REGISTRY_TARGET,
                uid = %id.uid,
                error = %error,
                "failed to retract endpoint"
            ),
        }
    }

    /// Identity currently announced.
    #[must_use]
    pub fn announced(&self) -> Option<ConnectionId> {
        self.slot().clone()
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<ConnectionId>> {
        self.announced.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for RegistryAnnouncer {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("RegistryAnnouncer")
            .field("app_name", &self.app_name)
            .field("scheme", &self.scheme)
            .field("announced", &self.announced())
            .finish_non_exhaustive()
    }
}

/// Resolves the machine hostname to its first IPv4 address.
///
/// # Errors
///
/// Returns a resolution [`RegistryError`] when the hostname cannot be read or
/// has no IPv4 address.
pub fn resolve_local_ipv4() -> Result<Ipv4Addr, RegistryError> {
    let host = nix::unistd::gethostname()
        .map_err(|source| RegistryError::Hostname { source })?
        .into_string()
        .map_err(|_| RegistryError::HostnameEncoding)?;
    let addrs = (host.as_str(), 0)
        .to_socket_addrs()
        .map_err(|source| RegistryError::Resolution {
            host: host.clone(),
            source,
        })?;
    addrs
        .map(|addr| addr.ip())
        .find_map(|ip| match ip {
            IpAddr::V4(v4) => Some(v4),
            IpAddr::V6(_) => None,
        })
        .ok_or(RegistryError::NoIpv4Address { host })
}

#[cfg(test)]
mod tests {
    use std::io;

    use mockall::mock;
    use mockall::predicate::eq;
    use rstest::rstest;

    use super::*;

    mock! {
        Registry {}
        impl ConnectionRegistry for Registry {
            fn publish(&self, registration: &ConnectionRegistration) -> Result<(), RegistryError>;
            fn retract(&self, id: &ConnectionId) -> Result<(), RegistryError>;
        }
    }

    fn loopback() -> HostResolver {
        Arc::new(|| Ok(Ipv4Addr::new(10, 1, 2, 3)))
    }

    fn expected_id() -> ConnectionId {
        ConnectionId {
            uid: "robot_control".to_owned(),
            data_type: "RunControlMessage".to_owned(),
        }
    }

    #[test]
    fn announce_publishes_bound_port_and_withdraw_retracts_it() {
        let mut registry = MockRegistry::new();
        registry
            .expect_publish()
            .withf(|registration| {
                registration.uid == "robot_control"
                    && registration.data_type == "RunControlMessage"
                    && registration.uri == "rest://10.1.2.3:40123"
                    && registration.direction == Direction::Bidirectional
            })
            .once()
            .returning(|_| Ok(()));
        registry
            .expect_retract()
            .with(eq(expected_id()))
            .once()
            .returning(|_| Ok(()));

        let announcer =
            RegistryAnnouncer::new(Arc::new(registry), "robot", "rest").with_resolver(loopback());
        let registration = announcer.announce(40123).expect("announce");
        assert_eq!(registration.uri, "rest://10.1.2.3:40123");
        assert_eq!(announcer.announced(), Some(expected_id()));

        announcer.withdraw();
        announcer.withdraw();
        assert!(announcer.announced().is_none());
    }

    #[test]
    fn publish_failure_is_not_fatal() {
        let mut registry = MockRegistry::new();
        registry.expect_publish().once().returning(|_| {
            Err(RegistryError::Rejected {
                url: "http://registry/publish".to_owned(),
                status: 503,
            })
        });
        registry.expect_retract().once().returning(|_| {
            Err(RegistryError::Rejected {
                url: "http://registry/retract".to_owned(),
                status: 503,
            })
        });

        let announcer =
            RegistryAnnouncer::new(Arc::new(registry), "robot", "rest").with_resolver(loopback());
        assert!(announcer.announce(40123).is_ok());
        announcer.withdraw();
    }

    #[rstest]
    #[case::resolution(RegistryError::Resolution {
        host: "ghost".to_owned(),
        source: io::Error::other("lookup failed"),
    })]
    #[case::no_ipv4(RegistryError::NoIpv4Address { host: "v6only".to_owned() })]
    fn resolution_failure_aborts_announcement(#[case] failure: RegistryError) {
        let mut registry = MockRegistry::new();
        registry.expect_publish().never();
        registry.expect_retract().never();

        let failure = Mutex::new(Some(failure));
        let resolver: HostResolver = Arc::new(move || {
            Err(failure
                .lock()
                .expect("resolver lock")
                .take()
                .expect("resolver called once"))
        });
        let announcer =
            RegistryAnnouncer::new(Arc::new(registry), "robot", "rest").with_resolver(resolver);
        let error = announcer.announce(40123).expect_err("resolution fails");
        assert!(error.is_resolution());
        assert!(announcer.announced().is_none());
        announcer.withdraw();
    }
}
