//! N-CREATE and N-SET handlers of the MPPS provider
//!
//! The handlers read the procedure step data set into memory
//! and validate only that it arrived
//! on the same presentation context as the command;
//! the data set is neither interpreted nor persisted.

use snafu::ResultExt;
use tracing::{error, info};

use crate::association::{pdata, ScpAssociation};
use crate::dimse::commands::{NCreateRq, NCreateRsp, NSetRq, NSetRsp};
use crate::dimse::{self, status, DimseCommand};

use super::{DimseSnafu, Result};

/// Handle an `N-CREATE` request.
pub(crate) fn handle_create(
    association: &mut ScpAssociation,
    presentation_context_id: u8,
    request: NCreateRq,
) -> Result<()> {
    info!("Received N-CREATE Request (MsgID {})", request.message_id);

    let rsp_status = receive_request_data_set(
        association,
        presentation_context_id,
        request.data_set_present,
        "N-CREATE",
    )?;

    let response = DimseCommand::NCreateRsp(NCreateRsp {
        message_id_being_responded_to: request.message_id,
        status: rsp_status,
        affected_sop_class_uid: Some(request.affected_sop_class_uid),
        affected_sop_instance_uid: request.affected_sop_instance_uid,
        data_set_present: false,
    });
    dimse::send_command(association, presentation_context_id, &response).context(DimseSnafu)?;
    info!("Sending N-CREATE Response (status 0x{:04X})", rsp_status);
    Ok(())
}

/// Handle an `N-SET` request.
pub(crate) fn handle_set(
    association: &mut ScpAssociation,
    presentation_context_id: u8,
    request: NSetRq,
) -> Result<()> {
    info!("Received N-SET Request (MsgID {})", request.message_id);

    let rsp_status = receive_request_data_set(
        association,
        presentation_context_id,
        request.data_set_present,
        "N-SET",
    )?;

    let response = DimseCommand::NSetRsp(NSetRsp {
        message_id_being_responded_to: request.message_id,
        status: rsp_status,
        affected_sop_class_uid: Some(request.requested_sop_class_uid),
        affected_sop_instance_uid: Some(request.requested_sop_instance_uid),
        data_set_present: false,
    });
    dimse::send_command(association, presentation_context_id, &response).context(DimseSnafu)?;
    info!("Sending N-SET Response (status 0x{:04X})", rsp_status);
    Ok(())
}

/// Read the request data set and derive the response status:
/// success when it arrived intact on the announcing context,
/// an attribute list error when it could not be read
/// or was never announced,
/// and an invalid attribute value
/// when it arrived on a different presentation context.
fn receive_request_data_set(
    association: &mut ScpAssociation,
    presentation_context_id: u8,
    data_set_present: bool,
    operation: &str,
) -> Result<u16> {
    if !data_set_present {
        error!("Received {} request but no data set announced", operation);
        return Ok(status::ATTRIBUTE_LIST_ERROR);
    }

    let data_set = match pdata::read_data_set(association) {
        Ok(data_set) => data_set,
        Err(e) => {
            error!(
                "Unable to receive {} data set on presentation context {}: {}",
                operation, presentation_context_id, e
            );
            return Ok(status::ATTRIBUTE_LIST_ERROR);
        }
    };

    if data_set.presentation_context_id != presentation_context_id {
        error!(
            "Presentation Context ID of command ({}) and data set ({}) differs",
            presentation_context_id, data_set.presentation_context_id
        );
        // the data set is discarded
        return Ok(status::INVALID_ATTRIBUTE_VALUE);
    }

    // received in memory only; the provider does not store the data set
    Ok(status::SUCCESS)
}
