//! Service class provider layer
//!
//! The dispatcher in [`dispatch`] reads DIMSE commands
//! from an established acceptor association
//! and routes them to the service handlers:
//! `C-ECHO` for both providers,
//! `N-CREATE`/`N-SET` for the MPPS provider,
//! and `N-ACTION` for the Storage Commitment provider.
//! The [`callback`] module owns the pending commitment
//! and the deferred `N-EVENT-REPORT` delivery.

use snafu::Snafu;

pub mod callback;
pub mod dispatch;
mod echo;
mod mpps;
mod storcmt;

pub use callback::PendingCommitment;
pub use dispatch::{serve_association, AssociationTermination, ServedAssociation};

/// The DIMSE service a provider instance implements.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum ProviderService {
    /// Modality Performed Procedure Step (`N-CREATE`/`N-SET`)
    Mpps,
    /// Storage Commitment Push Model (`N-ACTION`/`N-EVENT-REPORT`)
    StorageCommitment,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// association failure
    Association {
        source: crate::association::Error,
    },

    /// DIMSE message failure
    Dimse { source: crate::dimse::Error },

    #[snafu(display("command received on unacceptable presentation context {}", id))]
    InvalidPresentationContext { id: u8 },

    #[snafu(display("cannot handle DIMSE command 0x{:04X} in this service", field))]
    UnsupportedServiceCommand { field: u16 },

    #[snafu(display("unexpected DIMSE message {:?} while waiting for a response", field))]
    UnexpectedResponse {
        field: crate::dimse::CommandField,
    },

    /// no presentation context accepted for the event report
    NoEventReportContext,

    #[snafu(display("transfer syntax {} not supported by the registry", uid))]
    UnsupportedTransferSyntax { uid: String },

    /// failed to encode data set for delivery
    EncodeDataSet {
        #[snafu(source(from(dicom_object::WriteError, Box::new)))]
        source: Box<dicom_object::WriteError>,
    },

    #[snafu(display("invalid callback host address `{}`", host))]
    InvalidCallbackHost {
        host: String,
        source: std::net::AddrParseError,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
