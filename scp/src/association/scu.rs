//! Association requestor module
//!
//! This module provides the requestor side of the association lifecycle,
//! used by the Storage Commitment provider to open the callback
//! association which carries the deferred `N-EVENT-REPORT`.

use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use dicom_ul::pdu::reader::{read_pdu, DEFAULT_MAX_PDU};
use dicom_ul::pdu::writer::write_pdu;
use dicom_ul::pdu::{
    AbortRQSource, AssociationAC, AssociationRJ, AssociationRQ, Pdu, PresentationContextProposed,
    PresentationContextResultReason, UserVariableItem,
};
use snafu::{ensure, OptionExt, ResultExt};
use tracing::debug;

use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME, STANDARD_APPLICATION_CONTEXT};

use super::{
    uid_equal, Association, AssociationState, ConfigureSocketSnafu, ConnectSnafu, EncodeSnafu,
    MessageIdAllocator, MissingAbstractSyntaxSnafu, NoAcceptedPresentationContextsSnafu,
    PresentationContext, PresentationContextOutcome, ReceiveSnafu, RejectedSnafu, Result,
    UnexpectedPduSnafu, UnknownPduSnafu, WireSendSnafu,
};

/// A DICOM association builder for a requestor node,
/// taking the role of a service class user.
///
/// # Example
///
/// ```no_run
/// # use dicom_scp::association::scu::ScuAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mut association = ScuAssociationOptions::new()
///     .calling_ae_title("STORCMTSCP")
///     .called_ae_title("MODALITY")
///     .with_presentation_context(
///         "1.2.840.10008.1.20.1",
///         vec!["1.2.840.10008.1.2.1", "1.2.840.10008.1.2"],
///     )
///     .establish("192.168.0.5:115")?;
/// association.release()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ScuAssociationOptions {
    /// the calling AE title, referring to this node
    calling_ae_title: String,
    /// the called AE title, referring to the target node
    called_ae_title: String,
    /// the requested application context name
    application_context_name: String,
    /// the presentation contexts to propose:
    /// abstract syntax with its transfer syntaxes
    presentation_contexts: Vec<(String, Vec<String>)>,
    /// the expected protocol version
    protocol_version: u16,
    /// the maximum PDU length this node is willing to receive
    max_pdu_length: u32,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// deadline for the TCP connection attempt
    connection_timeout: Option<Duration>,
    /// deadline for each ACSE PDU exchange
    acse_timeout: Option<Duration>,
    /// deadline for each DIMSE read on the established association
    dimse_timeout: Option<Duration>,
}

impl Default for ScuAssociationOptions {
    fn default() -> Self {
        ScuAssociationOptions {
            calling_ae_title: "THIS-SCU".to_string(),
            called_ae_title: "ANY-SCP".to_string(),
            application_context_name: STANDARD_APPLICATION_CONTEXT.to_string(),
            presentation_contexts: Vec::new(),
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: false,
            connection_timeout: Some(Duration::from_secs(30)),
            acse_timeout: Some(Duration::from_secs(30)),
            dimse_timeout: None,
        }
    }
}

impl ScuAssociationOptions {
    /// Create a new set of options for requesting an association.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the calling application entity title,
    /// which refers to this DICOM node.
    ///
    /// The default is `THIS-SCU`.
    pub fn calling_ae_title(mut self, ae_title: impl Into<String>) -> Self {
        self.calling_ae_title = ae_title.into();
        self
    }

    /// Define the called application entity title,
    /// which refers to the target DICOM node.
    ///
    /// The default is `ANY-SCP`.
    pub fn called_ae_title(mut self, ae_title: impl Into<String>) -> Self {
        self.called_ae_title = ae_title.into();
        self
    }

    /// Propose a presentation context
    /// with the given abstract syntax and transfer syntaxes.
    pub fn with_presentation_context(
        mut self,
        abstract_syntax: impl Into<String>,
        transfer_syntaxes: Vec<impl Into<String>>,
    ) -> Self {
        self.presentation_contexts.push((
            abstract_syntax.into(),
            transfer_syntaxes.into_iter().map(Into::into).collect(),
        ));
        self
    }

    /// Override the maximum expected PDU length.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Set the deadline for the TCP connection attempt.
    pub fn connection_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set the deadline for each PDU exchange during negotiation,
    /// release, and abort.
    pub fn acse_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acse_timeout = timeout;
        self
    }

    /// Set the deadline for each DIMSE read
    /// on the established association
    /// (`None` blocks indefinitely).
    pub fn dimse_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.dimse_timeout = timeout;
        self
    }

    /// Initiate the TCP connection and negotiate the association.
    pub fn establish<T: ToSocketAddrs>(self, address: T) -> Result<ScuAssociation> {
        ensure!(
            !self.presentation_contexts.is_empty(),
            MissingAbstractSyntaxSnafu
        );

        let mut socket = self.connect(address)?;
        socket
            .set_read_timeout(self.acse_timeout)
            .context(ConfigureSocketSnafu)?;
        socket
            .set_write_timeout(self.acse_timeout)
            .context(ConfigureSocketSnafu)?;

        // presentation context identifiers are odd numbers from 1
        let proposed: Vec<PresentationContextProposed> = self
            .presentation_contexts
            .iter()
            .enumerate()
            .map(|(i, (abstract_syntax, transfer_syntaxes))| PresentationContextProposed {
                id: (i as u8) * 2 + 1,
                abstract_syntax: abstract_syntax.clone(),
                transfer_syntaxes: transfer_syntaxes.clone(),
            })
            .collect();

        let msg = Pdu::AssociationRQ(AssociationRQ {
            protocol_version: self.protocol_version,
            calling_ae_title: self.calling_ae_title.clone(),
            called_ae_title: self.called_ae_title.clone(),
            application_context_name: self.application_context_name.clone(),
            presentation_contexts: proposed.clone(),
            user_variables: vec![
                UserVariableItem::MaxLength(self.max_pdu_length),
                UserVariableItem::ImplementationClassUID(IMPLEMENTATION_CLASS_UID.to_string()),
                UserVariableItem::ImplementationVersionName(IMPLEMENTATION_VERSION_NAME.to_string()),
            ],
        });

        let mut buffer: Vec<u8> = Vec::with_capacity(DEFAULT_MAX_PDU as usize);
        write_pdu(&mut buffer, &msg).context(EncodeSnafu)?;
        socket.write_all(&buffer).context(WireSendSnafu)?;

        let msg = read_pdu(&mut socket, self.max_pdu_length, self.strict).context(ReceiveSnafu)?;

        match msg {
            Pdu::AssociationAC(AssociationAC {
                presentation_contexts: results,
                user_variables,
                ..
            }) => {
                let peer_max_pdu_length = user_variables
                    .iter()
                    .find_map(|item| match item {
                        UserVariableItem::MaxLength(len) => Some(*len),
                        _ => None,
                    })
                    .unwrap_or(DEFAULT_MAX_PDU);
                // 0 means practically unlimited
                let peer_max_pdu_length = if peer_max_pdu_length == 0 {
                    u32::MAX
                } else {
                    peer_max_pdu_length
                };

                // match the results against the proposal by identifier
                let presentation_contexts: Vec<PresentationContext> = proposed
                    .into_iter()
                    .map(|pc| {
                        let outcome = results
                            .iter()
                            .find(|r| r.id == pc.id)
                            .map(|r| {
                                if r.reason == PresentationContextResultReason::Acceptance {
                                    PresentationContextOutcome::Accepted {
                                        transfer_syntax: r.transfer_syntax.clone(),
                                    }
                                } else {
                                    PresentationContextOutcome::Rejected {
                                        reason: r.reason.clone(),
                                    }
                                }
                            })
                            .unwrap_or(PresentationContextOutcome::Rejected {
                                reason: PresentationContextResultReason::NoReason,
                            });
                        PresentationContext {
                            id: pc.id,
                            abstract_syntax: pc.abstract_syntax,
                            proposed_transfer_syntaxes: pc.transfer_syntaxes,
                            outcome,
                        }
                    })
                    .collect();

                presentation_contexts
                    .iter()
                    .find(|pc| pc.accepted_transfer_syntax().is_some())
                    .context(NoAcceptedPresentationContextsSnafu)?;

                // switch the socket over to the DIMSE deadline
                socket
                    .set_read_timeout(self.dimse_timeout)
                    .context(ConfigureSocketSnafu)?;

                Ok(ScuAssociation {
                    socket,
                    state: AssociationState::Established,
                    calling_ae_title: self.calling_ae_title,
                    called_ae_title: self.called_ae_title,
                    presentation_contexts,
                    peer_max_pdu_length,
                    max_pdu_length: self.max_pdu_length,
                    strict: self.strict,
                    dimse_timeout: self.dimse_timeout,
                    message_ids: MessageIdAllocator::new(),
                    write_buffer: buffer,
                })
            }
            Pdu::AssociationRJ(AssociationRJ { result, source }) => RejectedSnafu {
                association_result: result,
                association_source: source,
            }
            .fail(),
            pdu @ Pdu::AbortRQ { .. }
            | pdu @ Pdu::ReleaseRQ
            | pdu @ Pdu::AssociationRQ { .. }
            | pdu @ Pdu::PData { .. }
            | pdu @ Pdu::ReleaseRP => UnexpectedPduSnafu { pdu }.fail(),
            pdu @ Pdu::Unknown { .. } => UnknownPduSnafu { pdu }.fail(),
        }
    }

    fn connect<T: ToSocketAddrs>(&self, address: T) -> Result<TcpStream> {
        let addresses: Vec<SocketAddr> = address
            .to_socket_addrs()
            .context(ConnectSnafu)?
            .collect();

        let mut last_error = std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "no socket address to connect to",
        );
        for addr in addresses {
            let attempt = match self.connection_timeout {
                Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
                None => TcpStream::connect(addr),
            };
            match attempt {
                Ok(socket) => return Ok(socket),
                Err(e) => last_error = e,
            }
        }
        Err(last_error).context(ConnectSnafu)
    }
}

/// A DICOM upper level association
/// from the perspective of the requesting application entity.
///
/// If the association is still established
/// when the value falls out of scope,
/// the program will attempt a graceful release
/// and shut down the underlying TCP connection.
#[derive(Debug)]
pub struct ScuAssociation {
    /// The TCP stream to the other DICOM node
    socket: TcpStream,
    /// The current lifecycle state
    state: AssociationState,
    /// The AE title of this node
    calling_ae_title: String,
    /// The AE title of the peer node
    called_ae_title: String,
    /// The negotiated presentation contexts
    presentation_contexts: Vec<PresentationContext>,
    /// The maximum PDU length that the peer accepts
    peer_max_pdu_length: u32,
    /// The maximum PDU length that this node expects to receive
    max_pdu_length: u32,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// deadline for each DIMSE read
    dimse_timeout: Option<Duration>,
    /// message ID allocation for requests issued on this association
    message_ids: MessageIdAllocator,
    /// Reusable buffer for sending PDUs on the wire
    write_buffer: Vec<u8>,
}

impl ScuAssociation {
    /// The current lifecycle state of the association.
    pub fn state(&self) -> AssociationState {
        self.state
    }

    /// The AE title of this node on this association.
    pub fn calling_ae_title(&self) -> &str {
        &self.calling_ae_title
    }

    /// The AE title of the peer node.
    pub fn called_ae_title(&self) -> &str {
        &self.called_ae_title
    }

    /// Find an accepted presentation context
    /// bound to the given abstract syntax and transfer syntax.
    pub fn presentation_context_for(
        &self,
        abstract_syntax: &str,
        transfer_syntax: &str,
    ) -> Option<&PresentationContext> {
        self.presentation_contexts.iter().find(|pc| {
            uid_equal(&pc.abstract_syntax, abstract_syntax)
                && pc
                    .accepted_transfer_syntax()
                    .map(|ts| uid_equal(ts, transfer_syntax))
                    .unwrap_or(false)
        })
    }

    /// Gracefully release the association.
    pub fn release(&mut self) -> Result<()> {
        self.state = AssociationState::Releasing;
        let result = self.release_impl();
        self.state = match result {
            Ok(_) => AssociationState::Closed,
            Err(_) => AssociationState::Aborted,
        };
        let _ = self.socket.shutdown(Shutdown::Both);
        result
    }

    fn release_impl(&mut self) -> Result<()> {
        self.send(&Pdu::ReleaseRQ)?;
        let pdu = self.receive()?;
        match pdu {
            Pdu::ReleaseRP => Ok(()),
            pdu @ Pdu::AbortRQ { .. }
            | pdu @ Pdu::AssociationAC { .. }
            | pdu @ Pdu::AssociationRJ { .. }
            | pdu @ Pdu::AssociationRQ { .. }
            | pdu @ Pdu::PData { .. }
            | pdu @ Pdu::ReleaseRQ => UnexpectedPduSnafu { pdu }.fail(),
            pdu @ Pdu::Unknown { .. } => UnknownPduSnafu { pdu }.fail(),
        }
    }

    /// Abort the association from this side.
    pub fn abort(&mut self) {
        if matches!(
            self.state,
            AssociationState::Established | AssociationState::Releasing
        ) {
            if let Err(e) = self.send(&Pdu::AbortRQ {
                source: AbortRQSource::ServiceUser,
            }) {
                debug!("Failed to send association abort: {}", e);
            }
        }
        self.state = AssociationState::Aborted;
        let _ = self.socket.shutdown(Shutdown::Both);
    }
}

impl Association for ScuAssociation {
    fn send(&mut self, pdu: &Pdu) -> Result<()> {
        self.write_buffer.clear();
        write_pdu(&mut self.write_buffer, pdu).context(EncodeSnafu)?;
        self.socket
            .write_all(&self.write_buffer)
            .context(WireSendSnafu)
    }

    fn receive(&mut self) -> Result<Pdu> {
        read_pdu(&mut self.socket, self.max_pdu_length, self.strict).context(ReceiveSnafu)
    }

    fn receive_deadline(&mut self, deadline: Option<Duration>) -> Result<Pdu> {
        self.socket
            .set_read_timeout(deadline)
            .context(ConfigureSocketSnafu)?;
        let result = self.receive();
        self.socket
            .set_read_timeout(self.dimse_timeout)
            .context(ConfigureSocketSnafu)?;
        result
    }

    fn presentation_contexts(&self) -> &[PresentationContext] {
        &self.presentation_contexts
    }

    fn peer_max_pdu_length(&self) -> u32 {
        self.peer_max_pdu_length
    }

    fn message_ids(&mut self) -> &mut MessageIdAllocator {
        &mut self.message_ids
    }
}

impl Drop for ScuAssociation {
    fn drop(&mut self) {
        if self.state == AssociationState::Established {
            let _ = self.release();
        }
        let _ = self.socket.shutdown(Shutdown::Both);
    }
}
