//! DICOM association module
//!
//! This module contains the association lifecycle engine
//! shared by the service class providers:
//! the acceptor side in [`scp`], the requestor side in [`scu`],
//! and the P-DATA fragmentation helpers in [`pdata`].
//!
//! Both sides own their TCP stream exclusively
//! and go through the same lifecycle:
//! `idle → negotiating → established → (releasing | aborted) → closed`.

use std::time::Duration;

use dicom_ul::pdu::{
    AssociationRJResult, AssociationRJServiceProviderPresentationReason,
    AssociationRJServiceUserReason, AssociationRJSource, Pdu,
};
use snafu::{ensure, Snafu};

pub mod pdata;
pub mod scp;
pub mod scu;
mod uid;

pub(crate) use uid::{ae_title_equal, trim_uid, uid_equal};

pub use scp::{ScpAssociation, ScpAssociationOptions};
pub use scu::{ScuAssociation, ScuAssociationOptions};

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// missing abstract syntax to begin negotiation
    MissingAbstractSyntax,

    /// could not connect to peer
    Connect { source: std::io::Error },

    /// could not configure the TCP socket
    ConfigureSocket { source: std::io::Error },

    /// failed to encode PDU message
    Encode { source: dicom_ul::pdu::writer::Error },

    /// failed to send PDU message
    WireSend { source: std::io::Error },

    /// failed to receive PDU message
    Receive { source: dicom_ul::pdu::reader::Error },

    #[snafu(display("unexpected PDU `{}`", pdu.short_description()))]
    #[non_exhaustive]
    UnexpectedPdu {
        /// the PDU obtained from the other node
        pdu: Pdu,
    },

    #[snafu(display("unrecognized PDU `{}`", pdu.short_description()))]
    #[non_exhaustive]
    UnknownPdu {
        /// the PDU obtained from the other node, of variant Unknown
        pdu: Pdu,
    },

    #[snafu(display("association refused ({:?})", cause))]
    Refused {
        /// why this node refused the association
        cause: RejectionCause,
    },

    /// association rejected by the peer
    Rejected {
        association_result: AssociationRJResult,
        association_source: AssociationRJSource,
    },

    /// association aborted
    Aborted,

    /// no presentation context accepted
    NoAcceptedPresentationContexts,

    #[snafu(display("message ID {} is still outstanding", id))]
    MessageIdInUse {
        /// the message ID which would collide with an outstanding request
        id: u16,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The lifecycle state of an association.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum AssociationState {
    /// no connection activity yet
    Idle,
    /// A-ASSOCIATE negotiation in progress
    Negotiating,
    /// association accepted, DIMSE traffic may flow
    Established,
    /// an A-RELEASE exchange is in progress
    Releasing,
    /// the association was aborted by either side or by an I/O failure
    Aborted,
    /// the association ended in an orderly fashion
    Closed,
}

/// The reason why an incoming association request is turned down.
///
/// Each cause maps to exactly one wire-level rejection triple
/// through [`rejection_parameters`].
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum RejectionCause {
    /// the node cannot take another association at this time
    TooManyAssociations,
    /// no resources to serve the association
    CannotFork,
    /// the requested application context is not the standard one
    BadApplicationContext,
    /// the called AE title does not address this node
    CalledAeTitleNotRecognized,
    /// the calling AE title is not admitted
    CallingAeTitleNotRecognized,
    /// rejection was requested by the application
    Forced,
    /// the request carried no implementation class UID
    NoImplementationClassUid,
    /// no presentation context could be accepted
    NoAcceptablePresentationContexts,
    /// an internal error prevented negotiation
    InternalError,
}

/// Map a rejection cause to the A-ASSOCIATE-RJ result and source/reason.
///
/// This table is the single source of truth for rejection parameters.
pub fn rejection_parameters(cause: RejectionCause) -> (AssociationRJResult, AssociationRJSource) {
    use RejectionCause::*;
    match cause {
        TooManyAssociations => (
            AssociationRJResult::Transient,
            AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
            ),
        ),
        CannotFork => (
            AssociationRJResult::Permanent,
            AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
            ),
        ),
        BadApplicationContext => (
            AssociationRJResult::Transient,
            AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
            ),
        ),
        CalledAeTitleNotRecognized => (
            AssociationRJResult::Permanent,
            AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CalledAETitleNotRecognized,
            ),
        ),
        CallingAeTitleNotRecognized => (
            AssociationRJResult::Permanent,
            AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::CallingAETitleNotRecognized,
            ),
        ),
        Forced | NoImplementationClassUid | NoAcceptablePresentationContexts | InternalError => (
            AssociationRJResult::Permanent,
            AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::NoReasonGiven),
        ),
    }
}

/// The outcome of negotiating one presentation context.
#[derive(Debug, Clone, PartialEq)]
pub enum PresentationContextOutcome {
    /// the context was accepted with the given transfer syntax
    Accepted {
        /// the accorded transfer syntax UID
        transfer_syntax: String,
    },
    /// the context was turned down
    Rejected {
        reason: dicom_ul::pdu::PresentationContextResultReason,
    },
}

/// One presentation context of an association,
/// unique by identifier within the association.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentationContext {
    /// the context identifier, an odd number between 1 and 255
    pub id: u8,
    /// the abstract syntax UID proposed for this context
    pub abstract_syntax: String,
    /// the transfer syntax UIDs proposed for this context, in peer order
    pub proposed_transfer_syntaxes: Vec<String>,
    /// the outcome of the negotiation
    pub outcome: PresentationContextOutcome,
}

impl PresentationContext {
    /// The accorded transfer syntax UID, if the context was accepted.
    pub fn accepted_transfer_syntax(&self) -> Option<&str> {
        match &self.outcome {
            PresentationContextOutcome::Accepted { transfer_syntax } => Some(transfer_syntax),
            PresentationContextOutcome::Rejected { .. } => None,
        }
    }
}

/// Allocator of DIMSE message identifiers for one association.
///
/// Identifiers start at 1 and wrap around modulo 65 536.
/// Allocating an identifier which is still outstanding
/// is a protocol error on the caller's side.
#[derive(Debug)]
pub struct MessageIdAllocator {
    next: u16,
    outstanding: Vec<u16>,
}

impl MessageIdAllocator {
    pub(crate) fn new() -> Self {
        MessageIdAllocator {
            next: 1,
            outstanding: Vec::new(),
        }
    }

    /// Obtain a fresh message ID for an outbound request.
    pub fn allocate(&mut self) -> Result<u16> {
        let id = self.next;
        ensure!(!self.outstanding.contains(&id), MessageIdInUseSnafu { id });
        self.next = self.next.wrapping_add(1);
        self.outstanding.push(id);
        Ok(id)
    }

    /// Mark an outbound request as responded to.
    pub fn complete(&mut self, id: u16) {
        self.outstanding.retain(|&m| m != id);
    }
}

/// Common interface of an established association,
/// regardless of which side initiated it.
pub trait Association {
    /// Send a PDU message to the other node.
    fn send(&mut self, pdu: &Pdu) -> Result<()>;

    /// Read a PDU message from the other node,
    /// waiting at most for the association's configured receive deadline.
    fn receive(&mut self) -> Result<Pdu>;

    /// Read a PDU message from the other node,
    /// waiting at most for the given deadline
    /// (`None` blocks indefinitely).
    fn receive_deadline(&mut self, deadline: Option<Duration>) -> Result<Pdu>;

    /// Obtain a view of the negotiated presentation contexts.
    fn presentation_contexts(&self) -> &[PresentationContext];

    /// The maximum PDU length the peer is willing to receive.
    fn peer_max_pdu_length(&self) -> u32;

    /// Access the association's message ID allocator.
    fn message_ids(&mut self) -> &mut MessageIdAllocator;
}

/// Whether the error is a read deadline expiration,
/// as opposed to a connection-level failure.
pub fn error_is_timeout(err: &Error) -> bool {
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = current {
        if let Some(io) = e.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            );
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use dicom_ul::pdu::{
        AssociationRJResult, AssociationRJServiceProviderPresentationReason,
        AssociationRJServiceUserReason, AssociationRJSource,
    };

    use super::{rejection_parameters, MessageIdAllocator, RejectionCause};

    #[test]
    fn rejection_table_is_complete() {
        // every cause maps to a full triple; the congestion rows
        // come from the service provider, the rest from the service user
        let (result, source) = rejection_parameters(RejectionCause::TooManyAssociations);
        assert_eq!(result, AssociationRJResult::Transient);
        assert_eq!(
            source,
            AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::LocalLimitExceeded
            )
        );

        let (result, source) = rejection_parameters(RejectionCause::CannotFork);
        assert_eq!(result, AssociationRJResult::Permanent);
        assert_eq!(
            source,
            AssociationRJSource::ServiceProviderPresentation(
                AssociationRJServiceProviderPresentationReason::TemporaryCongestion
            )
        );

        let (result, source) = rejection_parameters(RejectionCause::BadApplicationContext);
        assert_eq!(result, AssociationRJResult::Transient);
        assert_eq!(
            source,
            AssociationRJSource::ServiceUser(
                AssociationRJServiceUserReason::ApplicationContextNameNotSupported
            )
        );

        for cause in [
            RejectionCause::Forced,
            RejectionCause::NoImplementationClassUid,
            RejectionCause::NoAcceptablePresentationContexts,
            RejectionCause::InternalError,
        ] {
            let (result, source) = rejection_parameters(cause);
            assert_eq!(result, AssociationRJResult::Permanent);
            assert_eq!(
                source,
                AssociationRJSource::ServiceUser(AssociationRJServiceUserReason::NoReasonGiven)
            );
        }
    }

    #[test]
    fn message_ids_strictly_increase_until_wrap() {
        let mut ids = MessageIdAllocator::new();
        let first = ids.allocate().unwrap();
        assert_eq!(first, 1);
        let mut previous = first;
        for _ in 0..100 {
            ids.complete(previous);
            let id = ids.allocate().unwrap();
            assert!(id > previous);
            previous = id;
        }
    }

    #[test]
    fn message_id_collision_is_a_protocol_error() {
        // a wrapped counter landing on an identifier
        // which was never responded to must not hand it out again
        let mut ids = MessageIdAllocator {
            next: 17,
            outstanding: vec![17],
        };
        let err = ids.allocate().unwrap_err();
        assert!(matches!(err, super::Error::MessageIdInUse { id: 17 }));

        ids.complete(17);
        assert_eq!(ids.allocate().unwrap(), 17);
    }
}
