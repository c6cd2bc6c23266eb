//! N-ACTION handler of the Storage Commitment provider
//!
//! A successful `N-ACTION` leaves behind a pending commitment:
//! the request data set together with everything needed
//! to reach the requester again.
//! In same-association mode the handler also waits
//! for the commit wait window to elapse
//! and delivers the `N-EVENT-REPORT` on the spot;
//! otherwise the commitment travels up to the listener,
//! which hands it to the callback driver after teardown.

use dicom_encoding::transfer_syntax::TransferSyntaxIndex;
use dicom_object::InMemDicomObject;
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, error, info, warn};

use crate::association::{error_is_timeout, pdata, ScpAssociation};
use crate::config::ProviderConfig;
use crate::dimse::commands::{NActionRq, NActionRsp};
use crate::dimse::{self, status, DimseCommand};
use crate::STORAGE_COMMITMENT_SOP_CLASS;

use super::callback::{self, PendingCommitment};
use super::dispatch::{read_command_event, CommandEvent, CommandOutcome};
use super::{DimseSnafu, Error, Result, UnsupportedTransferSyntaxSnafu};

/// Handle an `N-ACTION` request.
///
/// Returns the pending commitment recorded on success.
pub(crate) fn handle_action(
    association: &mut ScpAssociation,
    presentation_context_id: u8,
    request: NActionRq,
    config: &ProviderConfig,
) -> Result<Option<PendingCommitment>> {
    info!("Received N-ACTION Request (MsgID {})", request.message_id);

    let mut rsp_status = status::SUCCESS;

    let mut data_set = None;
    if !request.data_set_present {
        error!("Received N-ACTION request but no data set announced");
        rsp_status = status::ATTRIBUTE_LIST_ERROR;
    } else {
        match pdata::read_data_set(association) {
            Ok(ds) if ds.presentation_context_id != presentation_context_id => {
                error!(
                    "Presentation Context ID of command ({}) and data set ({}) differs",
                    presentation_context_id, ds.presentation_context_id
                );
                rsp_status = status::ATTRIBUTE_LIST_ERROR;
            }
            Ok(ds) => data_set = Some(ds),
            Err(e) => {
                error!(
                    "Unable to receive N-ACTION data set on presentation context {}: {}",
                    presentation_context_id, e
                );
                rsp_status = status::ATTRIBUTE_LIST_ERROR;
            }
        }
    }

    let supported_sop_class = request.requested_sop_class_uid == STORAGE_COMMITMENT_SOP_CLASS;
    if !supported_sop_class {
        error!(
            "N-ACTION unsupported for SOP class `{}`",
            request.requested_sop_class_uid
        );
        rsp_status = status::NO_SUCH_SOP_CLASS;
    }

    // decode the request data set so that the commitment
    // can be re-encoded in whichever transfer syntax
    // the callback association ends up negotiating
    let mut parsed = None;
    if rsp_status == status::SUCCESS {
        if let Some(ds) = &data_set {
            let transfer_syntax_uid = association
                .accepted_presentation_context(presentation_context_id)
                .and_then(|pc| pc.accepted_transfer_syntax())
                .unwrap_or(crate::IMPLICIT_VR_LE)
                .to_string();
            let ts = TransferSyntaxRegistry
                .get(&transfer_syntax_uid)
                .context(UnsupportedTransferSyntaxSnafu {
                    uid: transfer_syntax_uid.clone(),
                })?;
            match InMemDicomObject::read_dataset_with_ts(ds.data.as_slice(), ts) {
                Ok(obj) => parsed = Some(obj),
                Err(e) => {
                    error!("Received data set is not appropriate: {}", e);
                    rsp_status = status::ATTRIBUTE_LIST_ERROR;
                }
            }
        }
    }

    let suppress_sop_echo = rsp_status == status::NO_SUCH_SOP_CLASS;
    let response = DimseCommand::NActionRsp(NActionRsp {
        message_id_being_responded_to: request.message_id,
        status: rsp_status,
        affected_sop_class_uid: (!suppress_sop_echo)
            .then(|| request.requested_sop_class_uid.clone()),
        affected_sop_instance_uid: (!suppress_sop_echo)
            .then(|| request.requested_sop_instance_uid.clone()),
        action_type_id: (!suppress_sop_echo).then_some(request.action_type_id),
        data_set_present: false,
    });
    dimse::send_command(association, presentation_context_id, &response).context(DimseSnafu)?;
    info!("Sending N-ACTION Response (status 0x{:04X})", rsp_status);

    if rsp_status != status::SUCCESS {
        return Ok(None);
    }
    let Some(parsed) = parsed else {
        return Ok(None);
    };

    Ok(Some(PendingCommitment {
        local_ae_title: association.local_ae_title().to_string(),
        remote_ae_title: association.peer_ae_title().to_string(),
        // the callback dials the peer's address, not its AE title
        remote_host: association.peer_address().ip().to_string(),
        remote_port: config.callback_port,
        sop_instance_uid: request.requested_sop_instance_uid,
        data_set: parsed,
    }))
}

/// Same-association delivery:
/// wait up to the commit wait window for further commands;
/// if none arrives, deliver the `N-EVENT-REPORT`
/// on the presentation context of the triggering `N-ACTION`.
///
/// A release within the window leaves the pending commitment in place,
/// to be delivered on a new association after teardown.
pub(crate) fn wait_and_report(
    association: &mut ScpAssociation,
    presentation_context_id: u8,
    pending: &mut Option<PendingCommitment>,
    config: &ProviderConfig,
) -> Result<CommandOutcome> {
    if !config.commit_wait_timeout.is_zero() {
        match read_command_event(association, Some(config.commit_wait_timeout)) {
            Ok(CommandEvent::ReleaseRequested) => {
                debug!("Association release request received during commit wait");
                info!(
                    "Received release request from {}",
                    association.peer_ae_title()
                );
                if let Err(e) = association.acknowledge_release() {
                    warn!("Failed to acknowledge association release: {}", e);
                }
                return Ok(CommandOutcome::Released);
            }
            Ok(CommandEvent::PeerAborted) => {
                warn!("Association aborted by {}", association.peer_ae_title());
                association.mark_aborted();
                return Ok(CommandOutcome::PeerAborted);
            }
            Ok(CommandEvent::Command { command, .. }) => {
                warn!(
                    "Unrelated command 0x{:04X} during commit wait, dropping it",
                    command.command_field().code()
                );
            }
            Err(e) if is_timeout(&e) => {
                debug!("No further command received, sending N-EVENT-REPORT request");
            }
            Err(e) => return Err(e),
        }
    }

    // the dispatcher only calls in here right after recording a commitment
    let Some(commitment) = pending.take() else {
        return Ok(CommandOutcome::Continue);
    };

    let transfer_syntax_uid = association
        .accepted_presentation_context(presentation_context_id)
        .and_then(|pc| pc.accepted_transfer_syntax())
        .unwrap_or(crate::IMPLICIT_VR_LE)
        .to_string();
    let abstract_syntax = association
        .accepted_presentation_context(presentation_context_id)
        .map(|pc| pc.abstract_syntax.clone())
        .unwrap_or_else(|| STORAGE_COMMITMENT_SOP_CLASS.to_string());

    let status = callback::send_event_report(
        association,
        presentation_context_id,
        &abstract_syntax,
        &transfer_syntax_uid,
        commitment,
    )?;
    info!(
        "Storage commitment event report delivered (status 0x{:04X})",
        status
    );
    Ok(CommandOutcome::Continue)
}

fn is_timeout(err: &Error) -> bool {
    match err {
        Error::Association { source } => error_is_timeout(source),
        Error::Dimse {
            source: dimse::Error::Transport { source },
        } => error_is_timeout(source),
        _ => false,
    }
}
