//! C-ECHO handler

use snafu::ResultExt;
use tracing::info;

use crate::association::ScpAssociation;
use crate::dimse::commands::{CEchoRsp, CEchoRq};
use crate::dimse::{self, status, DimseCommand};

use super::{DimseSnafu, Result};

/// Answer a `C-ECHO` request.
///
/// Cannot fail except on I/O.
pub(crate) fn handle(
    association: &mut ScpAssociation,
    presentation_context_id: u8,
    request: CEchoRq,
) -> Result<()> {
    info!("Received C-ECHO Request (MsgID {})", request.message_id);

    let response = DimseCommand::CEchoRsp(CEchoRsp {
        message_id_being_responded_to: request.message_id,
        status: status::SUCCESS,
    });
    dimse::send_command(association, presentation_context_id, &response).context(DimseSnafu)?;
    info!("Sending C-ECHO Response (Success)");
    Ok(())
}
