//! Association acceptor module
//!
//! This module provides the acceptor side of the association lifecycle,
//! from the arrival of an A-ASSOCIATE-RQ on a fresh TCP connection
//! to an established association ready for DIMSE traffic.
//! See [`ScpAssociationOptions`] for the negotiation policy knobs.

use std::borrow::Cow;
use std::io::Write;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use dicom_ul::pdu::reader::{read_pdu, DEFAULT_MAX_PDU};
use dicom_ul::pdu::writer::write_pdu;
use dicom_ul::pdu::{
    AbortRQSource, AssociationAC, AssociationRJ, AssociationRQ, Pdu, PresentationContextResult,
    PresentationContextResultReason, UserVariableItem,
};
use snafu::{ensure, ResultExt};
use tracing::{debug, info, warn};

use crate::config::PresentationProfile;
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME, STANDARD_APPLICATION_CONTEXT};

use super::{
    ae_title_equal, rejection_parameters, trim_uid, uid_equal, AbortedSnafu, Association,
    AssociationState, ConfigureSocketSnafu, EncodeSnafu, Error, MessageIdAllocator,
    MissingAbstractSyntaxSnafu, PresentationContext, PresentationContextOutcome, ReceiveSnafu,
    RefusedSnafu, RejectionCause, Result, UnexpectedPduSnafu, UnknownPduSnafu, WireSendSnafu,
};

/// Common interface for application entity access control policies.
///
/// An implementation decides whether an incoming association request
/// is admitted based on the recorded application entity titles.
pub trait AccessControl {
    /// Obtain the decision of whether to accept an incoming
    /// association request.
    ///
    /// Returns `Ok(())` if the requesting node should be given clearance,
    /// otherwise the concrete rejection cause.
    fn check_access(
        &self,
        this_ae_title: &str,
        calling_ae_title: &str,
        called_ae_title: &str,
    ) -> std::result::Result<(), RejectionCause>;
}

/// An access control rule that accepts any incoming association request.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AcceptAny;

impl AccessControl for AcceptAny {
    fn check_access(
        &self,
        _this_ae_title: &str,
        _calling_ae_title: &str,
        _called_ae_title: &str,
    ) -> std::result::Result<(), RejectionCause> {
        Ok(())
    }
}

/// An access control rule backed by allow lists:
/// an empty list admits any title on that side.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct AeTitleAllowList {
    /// called AE titles this node answers under
    pub called: Vec<String>,
    /// calling AE titles this node admits
    pub calling: Vec<String>,
}

impl AccessControl for AeTitleAllowList {
    fn check_access(
        &self,
        _this_ae_title: &str,
        calling_ae_title: &str,
        called_ae_title: &str,
    ) -> std::result::Result<(), RejectionCause> {
        if !self.called.is_empty()
            && !self
                .called
                .iter()
                .any(|ae| ae_title_equal(ae, called_ae_title))
        {
            return Err(RejectionCause::CalledAeTitleNotRecognized);
        }
        if !self.calling.is_empty()
            && !self
                .calling
                .iter()
                .any(|ae| ae_title_equal(ae, calling_ae_title))
        {
            return Err(RejectionCause::CallingAeTitleNotRecognized);
        }
        Ok(())
    }
}

/// A DICOM association builder for an acceptor node,
/// taking the role of a service class provider.
///
/// A value of this type holds the negotiation policy
/// and can be reused across connections;
/// each call to [`establish`](Self::establish)
/// performs the negotiation on one TCP stream
/// and yields a [`ScpAssociation`] on acceptance.
///
/// The negotiation policy follows the association handling
/// of the DICOM upper layer:
/// the application context must be the standard one,
/// the AE titles go through the configured [`AccessControl`],
/// and each proposed presentation context is accepted
/// if its abstract syntax is in the configured profile
/// and at least one of its transfer syntaxes is in the profile entry,
/// picking the first proposed transfer syntax
/// (in the order proposed by the peer) which the profile admits.
#[derive(Debug, Clone)]
pub struct ScpAssociationOptions<'a, A> {
    /// the application entity access control policy
    ae_access_control: A,
    /// the AE title of this DICOM node
    ae_title: Cow<'a, str>,
    /// whether to respond under the AE title the peer addressed
    use_called_ae_title: bool,
    /// the accepted application context name
    application_context_name: Cow<'a, str>,
    /// the presentation contexts this node accepts
    profile: PresentationProfile,
    /// the expected protocol version
    protocol_version: u16,
    /// the maximum PDU length this node is willing to receive
    max_pdu_length: u32,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// deadline for each ACSE PDU exchange
    acse_timeout: Option<Duration>,
    /// deadline for each DIMSE read on the established association
    dimse_timeout: Option<Duration>,
}

impl Default for ScpAssociationOptions<'_, AcceptAny> {
    fn default() -> Self {
        ScpAssociationOptions {
            ae_access_control: AcceptAny,
            ae_title: "THIS-SCP".into(),
            use_called_ae_title: false,
            application_context_name: STANDARD_APPLICATION_CONTEXT.into(),
            profile: PresentationProfile::default(),
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: false,
            acse_timeout: Some(Duration::from_secs(30)),
            dimse_timeout: None,
        }
    }
}

impl ScpAssociationOptions<'_, AcceptAny> {
    /// Create a new set of options for accepting associations.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a, A> ScpAssociationOptions<'a, A>
where
    A: AccessControl,
{
    /// Change the access control policy.
    ///
    /// The default is to accept any requesting node
    /// regardless of the specified AE titles.
    pub fn ae_access_control<P>(self, access_control: P) -> ScpAssociationOptions<'a, P>
    where
        P: AccessControl,
    {
        let ScpAssociationOptions {
            ae_access_control: _,
            ae_title,
            use_called_ae_title,
            application_context_name,
            profile,
            protocol_version,
            max_pdu_length,
            strict,
            acse_timeout,
            dimse_timeout,
        } = self;

        ScpAssociationOptions {
            ae_access_control: access_control,
            ae_title,
            use_called_ae_title,
            application_context_name,
            profile,
            protocol_version,
            max_pdu_length,
            strict,
            acse_timeout,
            dimse_timeout,
        }
    }

    /// Define the application entity title referring to this DICOM node.
    ///
    /// The default is `THIS-SCP`.
    pub fn ae_title<T>(mut self, ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.ae_title = ae_title.into();
        self
    }

    /// Respond under the AE title the requestor addressed this node as,
    /// instead of the configured AE title.
    pub fn use_called_ae_title(mut self, value: bool) -> Self {
        self.use_called_ae_title = value;
        self
    }

    /// Define the presentation contexts this node accepts.
    pub fn with_profile(mut self, profile: PresentationProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Override the maximum expected PDU length.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override strict mode:
    /// whether receiving PDUs must not
    /// surpass the maximum PDU length.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
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

    /// Negotiate an association on the given TCP stream.
    pub fn establish(&self, mut socket: TcpStream) -> Result<ScpAssociation> {
        ensure!(!self.profile.contexts.is_empty(), MissingAbstractSyntaxSnafu);

        let peer_address = socket.peer_addr().context(ConfigureSocketSnafu)?;
        socket
            .set_read_timeout(self.acse_timeout)
            .context(ConfigureSocketSnafu)?;
        socket
            .set_write_timeout(self.acse_timeout)
            .context(ConfigureSocketSnafu)?;

        let msg = read_pdu(&mut socket, self.max_pdu_length, self.strict).context(ReceiveSnafu)?;

        let mut buffer: Vec<u8> = Vec::with_capacity(DEFAULT_MAX_PDU as usize);
        match self.process_association_rq(msg) {
            Ok((response, negotiated)) => {
                write_pdu(&mut buffer, &response).context(EncodeSnafu)?;
                socket.write_all(&buffer).context(WireSendSnafu)?;

                let Negotiated {
                    local_ae_title,
                    peer_ae_title,
                    peer_max_pdu_length,
                    presentation_contexts,
                } = negotiated;

                info!(
                    "Association received {}: {} -> {}",
                    peer_address, peer_ae_title, local_ae_title
                );
                for pc in &presentation_contexts {
                    match &pc.outcome {
                        PresentationContextOutcome::Accepted { transfer_syntax } => debug!(
                            "  context {} ({}): accepted with {}",
                            pc.id, pc.abstract_syntax, transfer_syntax
                        ),
                        PresentationContextOutcome::Rejected { reason } => debug!(
                            "  context {} ({}): rejected ({:?})",
                            pc.id, pc.abstract_syntax, reason
                        ),
                    }
                }

                // switch the socket over to the DIMSE deadline
                socket
                    .set_read_timeout(self.dimse_timeout)
                    .context(ConfigureSocketSnafu)?;

                Ok(ScpAssociation {
                    socket,
                    state: AssociationState::Established,
                    local_ae_title,
                    peer_ae_title,
                    peer_address,
                    presentation_contexts,
                    peer_max_pdu_length,
                    max_pdu_length: self.max_pdu_length,
                    strict: self.strict,
                    dimse_timeout: self.dimse_timeout,
                    message_ids: MessageIdAllocator::new(),
                    write_buffer: buffer,
                })
            }
            Err((response, err)) => {
                // send the rejection or abort PDU before bailing out
                if let Err(e) = write_pdu(&mut buffer, &response)
                    .context(EncodeSnafu)
                    .and_then(|_| socket.write_all(&buffer).context(WireSendSnafu))
                {
                    warn!("Failed to send association rejection: {}", e);
                }
                let _ = socket.shutdown(Shutdown::Both);
                Err(err)
            }
        }
    }

    /// Process an association request PDU.
    ///
    /// In the success case, returns the A-ASSOCIATE-AC to send back
    /// and the negotiated association properties.
    /// In the error case, returns the PDU to send back
    /// (a rejection, a release response, or an abort)
    /// and the error to report.
    #[allow(clippy::result_large_err)]
    pub(crate) fn process_association_rq(
        &self,
        msg: Pdu,
    ) -> std::result::Result<(Pdu, Negotiated), (Pdu, Error)> {
        let refuse = |cause: RejectionCause| {
            let (result, source) = rejection_parameters(cause);
            (
                Pdu::AssociationRJ(AssociationRJ { result, source }),
                RefusedSnafu { cause }.build(),
            )
        };

        match msg {
            Pdu::AssociationRQ(AssociationRQ {
                protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name,
                presentation_contexts,
                user_variables,
            }) => {
                if protocol_version != self.protocol_version {
                    return Err(refuse(RejectionCause::InternalError));
                }

                if !uid_equal(&application_context_name, &self.application_context_name) {
                    return Err(refuse(RejectionCause::BadApplicationContext));
                }

                let has_implementation_class = user_variables
                    .iter()
                    .any(|v| matches!(v, UserVariableItem::ImplementationClassUID(_)));
                if !has_implementation_class {
                    return Err(refuse(RejectionCause::NoImplementationClassUid));
                }

                if let Err(cause) = self.ae_access_control.check_access(
                    &self.ae_title,
                    &calling_ae_title,
                    &called_ae_title,
                ) {
                    return Err(refuse(cause));
                }

                // respond under the configured title or the one addressed
                let local_ae_title = if self.use_called_ae_title {
                    called_ae_title.trim_end_matches(' ').to_string()
                } else {
                    self.ae_title.to_string()
                };

                // fetch the maximum PDU length the requestor can receive;
                // 0 is treated as practically unlimited
                let peer_max_pdu_length = user_variables
                    .iter()
                    .find_map(|item| match item {
                        UserVariableItem::MaxLength(len) => Some(*len),
                        _ => None,
                    })
                    .unwrap_or(DEFAULT_MAX_PDU);
                let peer_max_pdu_length = if peer_max_pdu_length == 0 {
                    u32::MAX
                } else {
                    peer_max_pdu_length
                };

                let negotiated_contexts: Vec<PresentationContext> = presentation_contexts
                    .into_iter()
                    .map(|pc| {
                        let abstract_syntax = trim_uid(Cow::from(pc.abstract_syntax)).to_string();
                        let outcome = self.negotiate_context(&abstract_syntax, &pc.transfer_syntaxes);
                        PresentationContext {
                            id: pc.id,
                            abstract_syntax,
                            proposed_transfer_syntaxes: pc.transfer_syntaxes,
                            outcome,
                        }
                    })
                    .collect();

                if !negotiated_contexts
                    .iter()
                    .any(|pc| pc.accepted_transfer_syntax().is_some())
                {
                    return Err(refuse(RejectionCause::NoAcceptablePresentationContexts));
                }

                let results: Vec<PresentationContextResult> = negotiated_contexts
                    .iter()
                    .map(|pc| match &pc.outcome {
                        PresentationContextOutcome::Accepted { transfer_syntax } => {
                            PresentationContextResult {
                                id: pc.id,
                                reason: PresentationContextResultReason::Acceptance,
                                transfer_syntax: transfer_syntax.clone(),
                            }
                        }
                        PresentationContextOutcome::Rejected { reason } => {
                            PresentationContextResult {
                                id: pc.id,
                                reason: reason.clone(),
                                transfer_syntax: crate::IMPLICIT_VR_LE.to_string(),
                            }
                        }
                    })
                    .collect();

                let peer_ae_title = calling_ae_title.trim_end_matches(' ').to_string();
                let response = Pdu::AssociationAC(AssociationAC {
                    protocol_version: self.protocol_version,
                    application_context_name,
                    presentation_contexts: results,
                    calling_ae_title,
                    called_ae_title,
                    user_variables: vec![
                        UserVariableItem::MaxLength(self.max_pdu_length),
                        UserVariableItem::ImplementationClassUID(
                            IMPLEMENTATION_CLASS_UID.to_string(),
                        ),
                        UserVariableItem::ImplementationVersionName(
                            IMPLEMENTATION_VERSION_NAME.to_string(),
                        ),
                    ],
                });

                Ok((
                    response,
                    Negotiated {
                        local_ae_title,
                        peer_ae_title,
                        peer_max_pdu_length,
                        presentation_contexts: negotiated_contexts,
                    },
                ))
            }
            Pdu::ReleaseRQ => Err((Pdu::ReleaseRP, AbortedSnafu.build())),
            pdu @ Pdu::AssociationAC(_)
            | pdu @ Pdu::AssociationRJ(_)
            | pdu @ Pdu::PData { .. }
            | pdu @ Pdu::ReleaseRP
            | pdu @ Pdu::AbortRQ { .. } => Err((
                Pdu::AbortRQ {
                    source: AbortRQSource::ServiceUser,
                },
                UnexpectedPduSnafu { pdu }.build(),
            )),
            pdu @ Pdu::Unknown { .. } => Err((
                Pdu::AbortRQ {
                    source: AbortRQSource::ServiceUser,
                },
                UnknownPduSnafu { pdu }.build(),
            )),
        }
    }

    /// Negotiate one presentation context:
    /// the abstract syntax must be in the profile
    /// and the chosen transfer syntax is the first proposed one
    /// (peer order) which the profile entry admits.
    fn negotiate_context(
        &self,
        abstract_syntax: &str,
        proposed_transfer_syntaxes: &[String],
    ) -> PresentationContextOutcome {
        let Some(entry) = self
            .profile
            .contexts
            .iter()
            .find(|c| uid_equal(&c.abstract_syntax, abstract_syntax))
        else {
            return PresentationContextOutcome::Rejected {
                reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
            };
        };

        proposed_transfer_syntaxes
            .iter()
            .find(|proposed| {
                entry
                    .transfer_syntaxes
                    .iter()
                    .any(|ts| uid_equal(ts, proposed.as_str()))
            })
            .map(|ts| PresentationContextOutcome::Accepted {
                transfer_syntax: trim_uid(Cow::from(ts.as_str())).to_string(),
            })
            .unwrap_or(PresentationContextOutcome::Rejected {
                reason: PresentationContextResultReason::TransferSyntaxesNotSupported,
            })
    }
}

/// The outcome of a successful negotiation.
#[derive(Debug)]
pub(crate) struct Negotiated {
    pub local_ae_title: String,
    pub peer_ae_title: String,
    pub peer_max_pdu_length: u32,
    pub presentation_contexts: Vec<PresentationContext>,
}

/// A DICOM upper level association
/// from the perspective of the accepting application entity.
///
/// When the value falls out of scope,
/// the underlying TCP connection is shut down.
#[derive(Debug)]
pub struct ScpAssociation {
    /// The TCP stream to the other DICOM node
    socket: TcpStream,
    /// The current lifecycle state
    state: AssociationState,
    /// The AE title this node responds under
    local_ae_title: String,
    /// The application entity title of the other DICOM node
    peer_ae_title: String,
    /// The socket address of the other DICOM node
    peer_address: SocketAddr,
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

impl ScpAssociation {
    /// The current lifecycle state of the association.
    pub fn state(&self) -> AssociationState {
        self.state
    }

    /// The AE title this node responds under on this association.
    pub fn local_ae_title(&self) -> &str {
        &self.local_ae_title
    }

    /// Obtain the remote DICOM node's application entity title.
    pub fn peer_ae_title(&self) -> &str {
        &self.peer_ae_title
    }

    /// Obtain the remote DICOM node's socket address.
    pub fn peer_address(&self) -> SocketAddr {
        self.peer_address
    }

    /// Look up a presentation context by its identifier,
    /// regardless of its negotiation outcome.
    pub fn presentation_context(&self, id: u8) -> Option<&PresentationContext> {
        self.presentation_contexts.iter().find(|pc| pc.id == id)
    }

    /// Look up an accepted presentation context by its identifier.
    pub fn accepted_presentation_context(&self, id: u8) -> Option<&PresentationContext> {
        self.presentation_context(id)
            .filter(|pc| pc.accepted_transfer_syntax().is_some())
    }

    /// Acknowledge a release request from the peer
    /// and close the association in an orderly fashion.
    pub fn acknowledge_release(&mut self) -> Result<()> {
        self.state = AssociationState::Releasing;
        let result = self.send(&Pdu::ReleaseRP);
        self.state = AssociationState::Closed;
        let _ = self.socket.shutdown(Shutdown::Both);
        result
    }

    /// Abort the association from this side.
    ///
    /// The A-ABORT PDU is sent on a best-effort basis;
    /// the association moves to the aborted state regardless.
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

    /// Record that the peer aborted the association.
    pub fn mark_aborted(&mut self) {
        self.state = AssociationState::Aborted;
        let _ = self.socket.shutdown(Shutdown::Both);
    }
}

impl Association for ScpAssociation {
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
        // restore the association's configured DIMSE deadline
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

impl Drop for ScpAssociation {
    fn drop(&mut self) {
        let _ = self.socket.shutdown(Shutdown::Both);
    }
}

#[cfg(test)]
mod tests {
    use dicom_ul::pdu::{
        AssociationAC, AssociationRJ, AssociationRJResult, AssociationRJServiceUserReason,
        AssociationRJSource, AssociationRQ, Pdu, PresentationContextProposed,
        PresentationContextResultReason, UserVariableItem,
    };

    use crate::config::PresentationProfile;
    use crate::{
        EXPLICIT_VR_BE, EXPLICIT_VR_LE, IMPLICIT_VR_LE, STORAGE_COMMITMENT_SOP_CLASS,
        VERIFICATION_SOP_CLASS,
    };

    use super::super::{Error, PresentationContextOutcome, RejectionCause};
    use super::ScpAssociationOptions;

    fn request(
        application_context: &str,
        presentation_contexts: Vec<PresentationContextProposed>,
    ) -> Pdu {
        Pdu::AssociationRQ(AssociationRQ {
            protocol_version: 1,
            calling_ae_title: "TEST-SCU".to_string(),
            called_ae_title: "STORCMTSCP".to_string(),
            application_context_name: application_context.to_string(),
            presentation_contexts,
            user_variables: vec![
                UserVariableItem::MaxLength(16384),
                UserVariableItem::ImplementationClassUID("1.2.3.4".to_string()),
            ],
        })
    }

    fn options() -> ScpAssociationOptions<'static, super::AcceptAny> {
        ScpAssociationOptions::new()
            .ae_title("STORCMTSCP")
            .with_profile(PresentationProfile::storage_commitment())
    }

    #[test]
    fn negotiation_preserves_order_and_filters() {
        let proposed = vec![
            // abstract syntax not in the profile
            PresentationContextProposed {
                id: 1,
                abstract_syntax: "1.2.840.10008.5.1.4.1.1.7".to_string(),
                transfer_syntaxes: vec![IMPLICIT_VR_LE.to_string()],
            },
            // acceptable: first proposed transfer syntax wins
            PresentationContextProposed {
                id: 3,
                abstract_syntax: STORAGE_COMMITMENT_SOP_CLASS.to_string(),
                transfer_syntaxes: vec![EXPLICIT_VR_BE.to_string(), EXPLICIT_VR_LE.to_string()],
            },
            // acceptable, on a different context id
            PresentationContextProposed {
                id: 5,
                abstract_syntax: VERIFICATION_SOP_CLASS.to_string(),
                transfer_syntaxes: vec!["1.2.840.10008.1.2.4.50".to_string(), IMPLICIT_VR_LE.to_string()],
            },
        ];

        let (response, negotiated) = options()
            .process_association_rq(request(crate::STANDARD_APPLICATION_CONTEXT, proposed))
            .expect("negotiation should succeed");

        // the response carries one result per proposed context, in order
        let Pdu::AssociationAC(AssociationAC {
            presentation_contexts,
            ..
        }) = response
        else {
            panic!("expected an A-ASSOCIATE-AC");
        };
        assert_eq!(
            presentation_contexts.iter().map(|pc| pc.id).collect::<Vec<_>>(),
            vec![1, 3, 5]
        );
        assert_eq!(
            presentation_contexts[0].reason,
            PresentationContextResultReason::AbstractSyntaxNotSupported
        );
        assert_eq!(
            presentation_contexts[1].reason,
            PresentationContextResultReason::Acceptance
        );
        // tie-break favors the peer's order, not the profile preference
        assert_eq!(presentation_contexts[1].transfer_syntax, EXPLICIT_VR_BE);
        assert_eq!(
            presentation_contexts[2].reason,
            PresentationContextResultReason::Acceptance
        );
        assert_eq!(presentation_contexts[2].transfer_syntax, IMPLICIT_VR_LE);

        // every accepted transfer syntax is one the peer proposed
        for pc in &negotiated.presentation_contexts {
            if let PresentationContextOutcome::Accepted { transfer_syntax } = &pc.outcome {
                assert!(pc
                    .proposed_transfer_syntaxes
                    .iter()
                    .any(|ts| ts == transfer_syntax));
            }
        }
    }

    #[test]
    fn bad_application_context_is_a_transient_rejection() {
        let proposed = vec![PresentationContextProposed {
            id: 1,
            abstract_syntax: VERIFICATION_SOP_CLASS.to_string(),
            transfer_syntaxes: vec![IMPLICIT_VR_LE.to_string()],
        }];
        let (pdu, err) = options()
            .process_association_rq(request("1.2.840.10008.3.1.1.9", proposed))
            .expect_err("negotiation should fail");

        assert!(matches!(
            err,
            Error::Refused {
                cause: RejectionCause::BadApplicationContext
            }
        ));
        let Pdu::AssociationRJ(AssociationRJ { result, source }) = pdu else {
            panic!("expected an A-ASSOCIATE-RJ");
        };
        assert_eq!(result, AssociationRJResult::Transient);
        assert_eq!(
            source,
            AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::ApplicationContextNameNotSupported
            )
        );
    }

    #[test]
    fn no_acceptable_context_rejects_the_association() {
        let proposed = vec![PresentationContextProposed {
            id: 1,
            abstract_syntax: STORAGE_COMMITMENT_SOP_CLASS.to_string(),
            transfer_syntaxes: vec!["1.2.840.10008.1.2.4.50".to_string()],
        }];
        let (pdu, err) = options()
            .process_association_rq(request(crate::STANDARD_APPLICATION_CONTEXT, proposed))
            .expect_err("negotiation should fail");

        assert!(matches!(
            err,
            Error::Refused {
                cause: RejectionCause::NoAcceptablePresentationContexts
            }
        ));
        assert!(matches!(pdu, Pdu::AssociationRJ(_)));
    }

    #[test]
    fn missing_implementation_class_uid_is_refused() {
        let mut msg = request(
            crate::STANDARD_APPLICATION_CONTEXT,
            vec![PresentationContextProposed {
                id: 1,
                abstract_syntax: VERIFICATION_SOP_CLASS.to_string(),
                transfer_syntaxes: vec![IMPLICIT_VR_LE.to_string()],
            }],
        );
        if let Pdu::AssociationRQ(AssociationRQ {
            ref mut user_variables,
            ..
        }) = msg
        {
            user_variables.clear();
        }
        let (_, err) = options()
            .process_association_rq(msg)
            .expect_err("negotiation should fail");
        assert!(matches!(
            err,
            Error::Refused {
                cause: RejectionCause::NoImplementationClassUid
            }
        ));
    }

    #[test]
    fn release_during_negotiation_is_answered() {
        let (pdu, err) = options()
            .process_association_rq(Pdu::ReleaseRQ)
            .expect_err("negotiation should fail");
        assert!(matches!(pdu, Pdu::ReleaseRP));
        assert!(matches!(err, Error::Aborted));
    }

    #[test]
    fn called_ae_title_allow_list_is_enforced() {
        let options = options().ae_access_control(super::AeTitleAllowList {
            called: vec!["SOMEONE-ELSE".to_string()],
            calling: vec![],
        });
        let (pdu, err) = options
            .process_association_rq(request(
                crate::STANDARD_APPLICATION_CONTEXT,
                vec![PresentationContextProposed {
                    id: 1,
                    abstract_syntax: VERIFICATION_SOP_CLASS.to_string(),
                    transfer_syntaxes: vec![IMPLICIT_VR_LE.to_string()],
                }],
            ))
            .expect_err("negotiation should fail");
        assert!(matches!(
            err,
            Error::Refused {
                cause: RejectionCause::CalledAeTitleNotRecognized
            }
        ));
        let Pdu::AssociationRJ(AssociationRJ { result, source }) = pdu else {
            panic!("expected an A-ASSOCIATE-RJ");
        };
        assert_eq!(result, AssociationRJResult::Permanent);
        assert_eq!(
            source,
            AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized
            )
        );
    }
}
