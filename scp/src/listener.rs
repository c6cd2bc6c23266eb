//! Listener loop
//!
//! Binds a TCP port and serves one association at a time:
//! negotiation, DIMSE dispatch, teardown,
//! and then the storage commitment callback if one is pending.
//! A caller-provided stop flag is checked at the top of the loop,
//! so the listener terminates after the current association completes.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};

use snafu::{ResultExt, Snafu};
use tracing::{debug, error, info, warn};

use crate::association::scp::{AeTitleAllowList, ScpAssociationOptions};
use crate::config::ProviderConfig;
use crate::provider::{self, AssociationTermination, ProviderService};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ListenError {
    #[snafu(display("insufficient privileges to open network port {}", port))]
    InsufficientPortPrivileges { port: u16, source: std::io::Error },

    #[snafu(display("failed to bind listener to port {}", port))]
    Bind { port: u16, source: std::io::Error },

    /// failed to inspect the listener socket
    LocalAddr { source: std::io::Error },

    /// invalid provider configuration
    Config { source: crate::config::ConfigError },
}

pub type Result<T, E = ListenError> = std::result::Result<T, E>;

/// A provider instance bound to its TCP port.
#[derive(Debug)]
pub struct Listener {
    listener: TcpListener,
    config: ProviderConfig,
    service: ProviderService,
}

impl Listener {
    /// Validate the configuration and bind the listener socket.
    pub fn bind(config: ProviderConfig, service: ProviderService) -> Result<Self> {
        config.validate().context(ConfigSnafu)?;

        let address = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port);
        let listener = TcpListener::bind(address).map_err(|e| {
            if e.kind() == std::io::ErrorKind::PermissionDenied && config.port < 1024 {
                ListenError::InsufficientPortPrivileges {
                    port: config.port,
                    source: e,
                }
            } else {
                ListenError::Bind {
                    port: config.port,
                    source: e,
                }
            }
        })?;
        Ok(Listener {
            listener,
            config,
            service,
        })
    }

    /// The address the listener is actually bound to.
    ///
    /// Useful when the configured port was 0
    /// and the system assigned an ephemeral one.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().context(LocalAddrSnafu)
    }

    /// Accept and serve associations until the stop flag is raised.
    pub fn run(&self, stop: &AtomicBool) -> Result<()> {
        self.run_with_limit(stop, None)
    }

    /// Accept and serve associations until the stop flag is raised
    /// or the given number of connections has been handled.
    ///
    /// The connection limit is chiefly a testing aid.
    pub fn run_with_limit(
        &self,
        stop: &AtomicBool,
        finite_connections: Option<usize>,
    ) -> Result<()> {
        info!(
            "Listening on tcp://{} ({:?})",
            self.local_addr()?,
            self.service
        );

        let mut remaining = finite_connections;
        loop {
            if stop.load(Ordering::Relaxed) {
                info!("Stop requested, leaving the listener loop");
                break;
            }
            if remaining == Some(0) {
                break;
            }

            match self.listener.accept() {
                Ok((stream, peer)) => {
                    debug!("Accepted connection from {}", peer);
                    if let Some(n) = remaining.as_mut() {
                        *n -= 1;
                    }
                    self.serve_connection(stream);
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Negotiate and serve one association,
    /// then run the commitment callback if one is pending.
    fn serve_connection(&self, stream: TcpStream) {
        let options = ScpAssociationOptions::new()
            .ae_title(self.config.ae_title.as_str())
            .use_called_ae_title(self.config.use_called_ae_title)
            .with_profile(self.config.profile.clone())
            .max_pdu_length(self.config.max_pdu_length)
            .strict(self.config.strict)
            .acse_timeout(Some(self.config.acse_timeout))
            .dimse_timeout(self.config.dimse_timeout)
            .ae_access_control(AeTitleAllowList {
                called: self.config.called_ae_allow_list.clone(),
                calling: self.config.calling_ae_allow_list.clone(),
            });

        let mut association = match options.establish(stream) {
            Ok(association) => association,
            Err(e) => {
                info!("Could not establish association: {}", e);
                return;
            }
        };

        let served = provider::serve_association(&mut association, self.service, &self.config);
        match &served.termination {
            AssociationTermination::Released => {
                info!("Released association with {}", association.peer_ae_title())
            }
            AssociationTermination::PeerAborted => {
                warn!("Association with {} aborted", association.peer_ae_title())
            }
            AssociationTermination::Error(e) => {
                error!("Association ended with error: {}", e)
            }
        }
        // make sure the inbound association is fully torn down
        // before any callback association is opened
        drop(association);
        debug!("+++++++++++++++++++++++++++++");

        if let Some(commitment) = served.pending_commitment {
            if let Err(e) = provider::callback::deliver(commitment, &self.config) {
                error!("Storage commitment callback failed: {}", e);
            }
        }
    }
}
