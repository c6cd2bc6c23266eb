//! DICOM upper layer service class providers
//! for Modality Performed Procedure Step (MPPS)
//! and the Storage Commitment Push Model.
//!
//! This crate contains the building blocks shared by the two providers:
//!
//! - The [`association`] module drives the association lifecycle
//!   (A-ASSOCIATE negotiation, release, and abort)
//!   on both the acceptor and the requestor side,
//!   on top of the protocol data unit codec of [`dicom_ul`].
//! - The [`dimse`] module encodes and decodes DIMSE command sets
//!   (`C-ECHO`, `N-CREATE`, `N-SET`, `N-ACTION`, `N-EVENT-REPORT`).
//! - The [`provider`] module dispatches incoming commands
//!   to the service handlers
//!   and drives the deferred `N-EVENT-REPORT` delivery
//!   of the Storage Commitment service.
//! - The [`listener`] module accepts associations from a TCP port,
//!   one at a time, until told to stop.
//! - The [`config`] module holds the provider configuration
//!   and the built-in presentation context profiles.
//!
//! Datasets are decoded and encoded through [`dicom_object`];
//! this crate never interprets their contents.

pub mod association;
pub mod config;
pub mod dimse;
pub mod listener;
pub mod provider;

/// The application context name of the DICOM standard application context,
/// the only one accepted during association negotiation.
pub const STANDARD_APPLICATION_CONTEXT: &str = "1.2.840.10008.3.1.1.1";

/// SOP class UID of the Verification service (`C-ECHO`).
pub const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";

/// SOP class UID of the Modality Performed Procedure Step service
/// (`N-CREATE`/`N-SET`).
pub const MPPS_SOP_CLASS: &str = "1.2.840.10008.3.1.2.3.3";

/// SOP class UID of the Storage Commitment Push Model service
/// (`N-ACTION`/`N-EVENT-REPORT`).
pub const STORAGE_COMMITMENT_SOP_CLASS: &str = "1.2.840.10008.1.20.1";

/// The well-known SOP instance UID of the Storage Commitment Push Model.
pub const STORAGE_COMMITMENT_SOP_INSTANCE: &str = "1.2.840.10008.1.20.1.1";

/// Transfer syntax UID of Implicit VR Little Endian.
pub const IMPLICIT_VR_LE: &str = "1.2.840.10008.1.2";

/// Transfer syntax UID of Explicit VR Little Endian.
pub const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";

/// Transfer syntax UID of Explicit VR Big Endian.
pub const EXPLICIT_VR_BE: &str = "1.2.840.10008.1.2.2";

/// The implementation class UID reported in association negotiation.
///
/// Automatically generated as per the standard, part 5, section B.2.
pub const IMPLEMENTATION_CLASS_UID: &str = "2.25.304271930834183311619815098269575838435";

/// The implementation version name reported in association negotiation.
pub const IMPLEMENTATION_VERSION_NAME: &str = "dicom-scp 0.1.0";

// re-exports

pub use association::scp::{ScpAssociation, ScpAssociationOptions};
pub use association::scu::{ScuAssociation, ScuAssociationOptions};
pub use config::{EventReportMode, ProviderConfig};
pub use listener::Listener;
pub use provider::ProviderService;
