//! Storage commitment callback driver
//!
//! A [`PendingCommitment`] is created by the `N-ACTION` handler
//! and consumed exactly once:
//! either on the same association (mode A)
//! or by [`deliver`], which opens a fresh association
//! back to the requester once the inbound one has terminated (mode B).
//! The data set moves with the commitment;
//! it is freed when the commitment is dropped after delivery.

use std::net::{IpAddr, SocketAddr};

use dicom_encoding::transfer_syntax::TransferSyntaxIndex;
use dicom_object::{InMemDicomObject, StandardDataDictionary};
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;
use snafu::{OptionExt, ResultExt};
use tracing::{info, warn};

use crate::association::{pdata, Association, ScuAssociationOptions};
use crate::config::ProviderConfig;
use crate::dimse::commands::{NEventReportRq, NEventReportRsp};
use crate::dimse::{self, status, DimseCommand};
use crate::{EXPLICIT_VR_BE, EXPLICIT_VR_LE, IMPLICIT_VR_LE, STORAGE_COMMITMENT_SOP_CLASS};

use super::dispatch::{read_command_event, CommandEvent};
use super::{
    AssociationSnafu, DimseSnafu, EncodeDataSetSnafu, Error, InvalidCallbackHostSnafu,
    NoEventReportContextSnafu, Result, UnexpectedResponseSnafu, UnsupportedTransferSyntaxSnafu,
};

/// A storage commitment recorded by a successful `N-ACTION`,
/// waiting for its `N-EVENT-REPORT` to be delivered.
///
/// At most one pending commitment exists per provider instance;
/// a further `N-ACTION` before delivery supersedes it.
#[derive(Debug)]
pub struct PendingCommitment {
    /// the AE title this node acted under on the inbound association
    pub local_ae_title: String,
    /// the AE title of the node which requested the commitment
    pub remote_ae_title: String,
    /// the IP address of the requesting node
    pub remote_host: String,
    /// the port on which the requesting node
    /// listens for the callback association
    pub remote_port: u16,
    /// the SOP instance UID named by the `N-ACTION` request
    pub sop_instance_uid: String,
    /// the request data set, reported back verbatim
    pub data_set: InMemDicomObject<StandardDataDictionary>,
}

/// Open an association back to the requester
/// and deliver the `N-EVENT-REPORT` (mode B).
///
/// Any failure abandons the commitment; there is no retry.
pub fn deliver(commitment: PendingCommitment, config: &ProviderConfig) -> Result<()> {
    info!(
        "Opening storage commitment callback association to {} ({}:{})",
        commitment.remote_ae_title, commitment.remote_host, commitment.remote_port
    );

    let options = ScuAssociationOptions::new()
        .calling_ae_title(commitment.local_ae_title.clone())
        .called_ae_title(commitment.remote_ae_title.clone())
        .with_presentation_context(
            STORAGE_COMMITMENT_SOP_CLASS,
            vec![EXPLICIT_VR_LE, EXPLICIT_VR_BE, IMPLICIT_VR_LE],
        )
        .max_pdu_length(config.max_pdu_length)
        .connection_timeout(Some(config.acse_timeout))
        .acse_timeout(Some(config.acse_timeout))
        .dimse_timeout(config.dimse_timeout);

    let mut association = if config.disable_host_lookup {
        // connect to the recorded address literally, without resolution
        let ip: IpAddr = commitment
            .remote_host
            .parse()
            .context(InvalidCallbackHostSnafu {
                host: commitment.remote_host.clone(),
            })?;
        options.establish(SocketAddr::new(ip, commitment.remote_port))
    } else {
        options.establish((commitment.remote_host.as_str(), commitment.remote_port))
    }
    .context(AssociationSnafu)?;

    // prefer Explicit VR Little Endian,
    // then Big Endian, then Implicit VR Little Endian
    let (presentation_context_id, transfer_syntax_uid) =
        [EXPLICIT_VR_LE, EXPLICIT_VR_BE, IMPLICIT_VR_LE]
            .iter()
            .find_map(|ts| {
                association
                    .presentation_context_for(STORAGE_COMMITMENT_SOP_CLASS, ts)
                    .map(|pc| (pc.id, (*ts).to_string()))
            })
            .context(NoEventReportContextSnafu)?;

    let status = send_event_report(
        &mut association,
        presentation_context_id,
        STORAGE_COMMITMENT_SOP_CLASS,
        &transfer_syntax_uid,
        commitment,
    )?;

    association.release().context(AssociationSnafu)?;
    info!(
        "Storage commitment event report delivered (status 0x{:04X})",
        status
    );
    Ok(())
}

/// Send the `N-EVENT-REPORT` request carrying the commitment data set
/// and receive the matching response.
///
/// The commitment is consumed by the delivery attempt,
/// successful or not.
pub(crate) fn send_event_report<A: Association>(
    association: &mut A,
    presentation_context_id: u8,
    affected_sop_class_uid: &str,
    transfer_syntax_uid: &str,
    commitment: PendingCommitment,
) -> Result<u16> {
    let message_id = association
        .message_ids()
        .allocate()
        .context(AssociationSnafu)?;

    let request = DimseCommand::NEventReportRq(NEventReportRq {
        message_id,
        affected_sop_class_uid: affected_sop_class_uid.to_string(),
        affected_sop_instance_uid: commitment.sop_instance_uid.clone(),
        event_type_id: 1,
        data_set_present: true,
    });
    info!("Sending N-EVENT-REPORT Request (MsgID {})", message_id);
    dimse::send_command(association, presentation_context_id, &request).context(DimseSnafu)?;

    let ts = TransferSyntaxRegistry
        .get(transfer_syntax_uid)
        .context(UnsupportedTransferSyntaxSnafu {
            uid: transfer_syntax_uid.to_string(),
        })?;
    let mut data = Vec::new();
    commitment
        .data_set
        .write_dataset_with_ts(&mut data, ts)
        .context(EncodeDataSetSnafu)?;
    pdata::write_data_set(association, presentation_context_id, &data)
        .context(AssociationSnafu)?;

    match read_command_event(association, None)? {
        CommandEvent::Command {
            command: DimseCommand::NEventReportRsp(response),
            ..
        } => {
            association.message_ids().complete(message_id);
            finish_event_report(association, message_id, response)
        }
        CommandEvent::Command { command, .. } => UnexpectedResponseSnafu {
            field: command.command_field(),
        }
        .fail(),
        CommandEvent::ReleaseRequested | CommandEvent::PeerAborted => Err(Error::Association {
            source: crate::association::Error::Aborted,
        }),
    }
}

fn finish_event_report<A: Association>(
    association: &mut A,
    message_id: u16,
    response: NEventReportRsp,
) -> Result<u16> {
    if response.message_id_being_responded_to != message_id {
        warn!(
            "N-EVENT-REPORT response refers to message {} (expected {})",
            response.message_id_being_responded_to, message_id
        );
    }
    if response.data_set_present {
        // this should never happen
        match pdata::read_data_set(association) {
            Ok(_) => warn!("Received unexpected data set after N-EVENT-REPORT response, ignoring"),
            Err(e) => return Err(Error::Association { source: e }),
        }
    }
    if response.status != status::SUCCESS {
        warn!(
            "N-EVENT-REPORT response with status 0x{:04X}",
            response.status
        );
    }
    info!("Received N-EVENT-REPORT Response (MsgID {})", message_id);
    Ok(response.status)
}
