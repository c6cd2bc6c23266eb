//! The DIMSE dispatcher
//!
//! While the association is established,
//! the dispatcher repeatedly assembles one command set,
//! validates the presentation context it arrived on,
//! and routes it by command field to the service handlers.
//! The dispatcher owns the decision to continue the loop:
//! it leaves when the peer releases, aborts,
//! or an unrecoverable error occurs.

use std::time::Duration;

use dicom_ul::pdu::{PDataValueType, Pdu};
use snafu::ResultExt;
use tracing::{debug, info, warn};

use crate::association::{Association, ScpAssociation};
use crate::config::{EventReportMode, ProviderConfig};
use crate::dimse::{self, DimseCommand};

use super::callback::PendingCommitment;
use super::{
    echo, mpps, storcmt, AssociationSnafu, DimseSnafu, Error, InvalidPresentationContextSnafu,
    ProviderService, Result, UnsupportedServiceCommandSnafu,
};

/// How an inbound association came to an end.
#[derive(Debug)]
pub enum AssociationTermination {
    /// the peer released and the release was acknowledged
    Released,
    /// the peer aborted the association
    PeerAborted,
    /// this side aborted the association after an error
    Error(Error),
}

/// The outcome of serving one inbound association.
#[derive(Debug)]
pub struct ServedAssociation {
    /// how the association ended
    pub termination: AssociationTermination,
    /// a storage commitment left to be delivered
    /// on a new association, if any
    pub pending_commitment: Option<PendingCommitment>,
}

/// One event obtained from the command stream of an association.
#[derive(Debug)]
pub(crate) enum CommandEvent {
    /// a complete command set arrived
    Command {
        presentation_context_id: u8,
        command: DimseCommand,
    },
    /// the peer requested the release of the association
    ReleaseRequested,
    /// the peer aborted the association
    PeerAborted,
}

/// Read one command set from the association,
/// assembling fragments until the last one.
///
/// The deadline bounds the wait for the first PDU only;
/// further fragments of the same command
/// are read under the association's configured deadline.
pub(crate) fn read_command_event<A: Association>(
    association: &mut A,
    deadline: Option<Duration>,
) -> Result<CommandEvent> {
    let mut data: Vec<u8> = Vec::new();
    let mut presentation_context_id: Option<u8> = None;
    let mut first = true;

    loop {
        let pdu = if first {
            first = false;
            match deadline {
                Some(deadline) => association.receive_deadline(Some(deadline)),
                None => association.receive(),
            }
        } else {
            association.receive()
        }
        .context(AssociationSnafu)?;

        match pdu {
            Pdu::PData { data: pdvs } => {
                let mut pdvs = pdvs.into_iter();
                while let Some(mut pdv) = pdvs.next() {
                    if pdv.value_type != PDataValueType::Command {
                        // a data set fragment with no announcing command
                        return Err(Error::Association {
                            source: crate::association::Error::UnexpectedPdu {
                                pdu: Pdu::PData { data: vec![pdv] },
                            },
                        });
                    }
                    if let Some(id) = presentation_context_id {
                        if id != pdv.presentation_context_id {
                            warn!(
                                "Command fragments on distinct presentation contexts ({} and {})",
                                id, pdv.presentation_context_id
                            );
                        }
                    } else {
                        presentation_context_id = Some(pdv.presentation_context_id);
                    }
                    let is_last = pdv.is_last;
                    let pdv_context_id = pdv.presentation_context_id;
                    data.append(&mut pdv.data);
                    if is_last {
                        if pdvs.next().is_some() {
                            warn!("Discarding presentation data following the command set");
                        }
                        let command = dimse::commands::decode(&data).context(DimseSnafu)?;
                        return Ok(CommandEvent::Command {
                            presentation_context_id: presentation_context_id
                                .unwrap_or(pdv_context_id),
                            command,
                        });
                    }
                }
            }
            Pdu::ReleaseRQ => return Ok(CommandEvent::ReleaseRequested),
            Pdu::AbortRQ { source } => {
                debug!("Association aborted by peer: {:?}", source);
                return Ok(CommandEvent::PeerAborted);
            }
            pdu @ Pdu::Unknown { .. } => {
                return Err(Error::Association {
                    source: crate::association::Error::UnknownPdu { pdu },
                })
            }
            pdu => {
                return Err(Error::Association {
                    source: crate::association::Error::UnexpectedPdu { pdu },
                })
            }
        }
    }
}

/// Serve DIMSE commands on an established association until it ends.
///
/// The returned value tells how the association terminated
/// and whether a pending storage commitment survived it,
/// to be delivered by the callback driver
/// once the association is fully torn down.
pub fn serve_association(
    association: &mut ScpAssociation,
    service: ProviderService,
    config: &ProviderConfig,
) -> ServedAssociation {
    let mut pending: Option<PendingCommitment> = None;

    let termination = loop {
        match read_command_event(association, None) {
            Ok(CommandEvent::Command {
                presentation_context_id,
                command,
            }) => {
                match handle_command(
                    association,
                    service,
                    config,
                    presentation_context_id,
                    command,
                    &mut pending,
                ) {
                    Ok(CommandOutcome::Continue) => {}
                    Ok(CommandOutcome::Released) => break AssociationTermination::Released,
                    Ok(CommandOutcome::PeerAborted) => break AssociationTermination::PeerAborted,
                    Err(e) => {
                        association.abort();
                        break AssociationTermination::Error(e);
                    }
                }
            }
            Ok(CommandEvent::ReleaseRequested) => {
                info!(
                    "Received release request from {}",
                    association.peer_ae_title()
                );
                if let Err(e) = association.acknowledge_release() {
                    warn!("Failed to acknowledge association release: {}", e);
                }
                break AssociationTermination::Released;
            }
            Ok(CommandEvent::PeerAborted) => {
                warn!("Association aborted by {}", association.peer_ae_title());
                association.mark_aborted();
                break AssociationTermination::PeerAborted;
            }
            Err(e) => {
                association.abort();
                break AssociationTermination::Error(e);
            }
        }
    };

    ServedAssociation {
        termination,
        pending_commitment: pending,
    }
}

/// What the dispatcher should do after a handled command.
pub(crate) enum CommandOutcome {
    Continue,
    Released,
    PeerAborted,
}

fn handle_command(
    association: &mut ScpAssociation,
    service: ProviderService,
    config: &ProviderConfig,
    presentation_context_id: u8,
    command: DimseCommand,
    pending: &mut Option<PendingCommitment>,
) -> Result<CommandOutcome> {
    snafu::ensure!(
        association
            .accepted_presentation_context(presentation_context_id)
            .is_some(),
        InvalidPresentationContextSnafu {
            id: presentation_context_id
        }
    );

    match (service, command) {
        (_, DimseCommand::CEchoRq(request)) => {
            echo::handle(association, presentation_context_id, request)?;
            Ok(CommandOutcome::Continue)
        }
        (ProviderService::Mpps, DimseCommand::NCreateRq(request)) => {
            mpps::handle_create(association, presentation_context_id, request)?;
            Ok(CommandOutcome::Continue)
        }
        (ProviderService::Mpps, DimseCommand::NSetRq(request)) => {
            mpps::handle_set(association, presentation_context_id, request)?;
            Ok(CommandOutcome::Continue)
        }
        (ProviderService::StorageCommitment, DimseCommand::NActionRq(request)) => {
            if let Some(commitment) =
                storcmt::handle_action(association, presentation_context_id, request, config)?
            {
                if pending.replace(commitment).is_some() {
                    warn!("Overwriting storage commitment which was not yet delivered");
                }
                if config.event_report_mode == EventReportMode::SameAssociation {
                    return storcmt::wait_and_report(
                        association,
                        presentation_context_id,
                        pending,
                        config,
                    );
                }
            }
            Ok(CommandOutcome::Continue)
        }
        (_, command) => {
            let field = command.command_field().code();
            UnsupportedServiceCommandSnafu { field }.fail()
        }
    }
}
