//! Typed DIMSE command sets
//!
//! Each supported command is represented by a struct
//! carrying its mandatory command set attributes,
//! gathered under the [`DimseCommand`] union.
//! Whether a data set follows is part of the command set
//! (`Command Data Set Type`); the data set itself travels separately.

use dicom_core::{dicom_value, DataElement, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::mem::InMemElement;
use dicom_object::{InMemDicomObject, StandardDataDictionary};
use dicom_transfer_syntax_registry::entries;
use snafu::ResultExt;

use super::{
    data_set_announced, CommandField, DecodeCommandSnafu, EncodeCommandSnafu, InvalidFieldSnafu,
    MissingFieldSnafu, Result, UnsupportedCommandSnafu, DATA_SET_ABSENT, DATA_SET_PRESENT,
};

/// An in-memory DIMSE command set.
pub type CommandSet = InMemDicomObject<StandardDataDictionary>;

/// `C-ECHO-RQ`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CEchoRq {
    pub message_id: u16,
}

/// `C-ECHO-RSP`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CEchoRsp {
    pub message_id_being_responded_to: u16,
    pub status: u16,
}

/// `N-CREATE-RQ`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NCreateRq {
    pub message_id: u16,
    pub affected_sop_class_uid: String,
    /// absent when the SCP is expected to assign the instance UID
    pub affected_sop_instance_uid: Option<String>,
    pub data_set_present: bool,
}

/// `N-CREATE-RSP`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NCreateRsp {
    pub message_id_being_responded_to: u16,
    pub status: u16,
    pub affected_sop_class_uid: Option<String>,
    pub affected_sop_instance_uid: Option<String>,
    pub data_set_present: bool,
}

/// `N-SET-RQ`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NSetRq {
    pub message_id: u16,
    pub requested_sop_class_uid: String,
    pub requested_sop_instance_uid: String,
    pub data_set_present: bool,
}

/// `N-SET-RSP`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NSetRsp {
    pub message_id_being_responded_to: u16,
    pub status: u16,
    pub affected_sop_class_uid: Option<String>,
    pub affected_sop_instance_uid: Option<String>,
    pub data_set_present: bool,
}

/// `N-ACTION-RQ`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NActionRq {
    pub message_id: u16,
    pub requested_sop_class_uid: String,
    pub requested_sop_instance_uid: String,
    pub action_type_id: u16,
    pub data_set_present: bool,
}

/// `N-ACTION-RSP`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NActionRsp {
    pub message_id_being_responded_to: u16,
    pub status: u16,
    pub affected_sop_class_uid: Option<String>,
    pub affected_sop_instance_uid: Option<String>,
    pub action_type_id: Option<u16>,
    pub data_set_present: bool,
}

/// `N-EVENT-REPORT-RQ`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NEventReportRq {
    pub message_id: u16,
    pub affected_sop_class_uid: String,
    pub affected_sop_instance_uid: String,
    pub event_type_id: u16,
    pub data_set_present: bool,
}

/// `N-EVENT-REPORT-RSP`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NEventReportRsp {
    pub message_id_being_responded_to: u16,
    pub status: u16,
    pub affected_sop_class_uid: Option<String>,
    pub affected_sop_instance_uid: Option<String>,
    pub event_type_id: Option<u16>,
    pub data_set_present: bool,
}

/// A DIMSE message, tagged by its command field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DimseCommand {
    CEchoRq(CEchoRq),
    CEchoRsp(CEchoRsp),
    NCreateRq(NCreateRq),
    NCreateRsp(NCreateRsp),
    NSetRq(NSetRq),
    NSetRsp(NSetRsp),
    NActionRq(NActionRq),
    NActionRsp(NActionRsp),
    NEventReportRq(NEventReportRq),
    NEventReportRsp(NEventReportRsp),
}

impl DimseCommand {
    /// The command field of this message.
    pub fn command_field(&self) -> CommandField {
        match self {
            DimseCommand::CEchoRq(_) => CommandField::CEchoRq,
            DimseCommand::CEchoRsp(_) => CommandField::CEchoRsp,
            DimseCommand::NCreateRq(_) => CommandField::NCreateRq,
            DimseCommand::NCreateRsp(_) => CommandField::NCreateRsp,
            DimseCommand::NSetRq(_) => CommandField::NSetRq,
            DimseCommand::NSetRsp(_) => CommandField::NSetRsp,
            DimseCommand::NActionRq(_) => CommandField::NActionRq,
            DimseCommand::NActionRsp(_) => CommandField::NActionRsp,
            DimseCommand::NEventReportRq(_) => CommandField::NEventReportRq,
            DimseCommand::NEventReportRsp(_) => CommandField::NEventReportRsp,
        }
    }

    /// Whether the command set announces a following data set.
    pub fn data_set_present(&self) -> bool {
        match self {
            DimseCommand::CEchoRq(_) | DimseCommand::CEchoRsp(_) => false,
            DimseCommand::NCreateRq(m) => m.data_set_present,
            DimseCommand::NCreateRsp(m) => m.data_set_present,
            DimseCommand::NSetRq(m) => m.data_set_present,
            DimseCommand::NSetRsp(m) => m.data_set_present,
            DimseCommand::NActionRq(m) => m.data_set_present,
            DimseCommand::NActionRsp(m) => m.data_set_present,
            DimseCommand::NEventReportRq(m) => m.data_set_present,
            DimseCommand::NEventReportRsp(m) => m.data_set_present,
        }
    }

    /// Build the command set object for this message.
    pub fn to_command_set(&self) -> CommandSet {
        let mut elements: Vec<InMemElement<StandardDataDictionary>> = Vec::new();
        let field = self.command_field().code();
        let data_set_type = if self.data_set_present() {
            DATA_SET_PRESENT
        } else {
            DATA_SET_ABSENT
        };

        push_u16(&mut elements, tags::COMMAND_FIELD, field);
        push_u16(&mut elements, tags::COMMAND_DATA_SET_TYPE, data_set_type);

        match self {
            DimseCommand::CEchoRq(m) => {
                push_uid(
                    &mut elements,
                    tags::AFFECTED_SOP_CLASS_UID,
                    crate::VERIFICATION_SOP_CLASS,
                );
                push_u16(&mut elements, tags::MESSAGE_ID, m.message_id);
            }
            DimseCommand::CEchoRsp(m) => {
                push_uid(
                    &mut elements,
                    tags::AFFECTED_SOP_CLASS_UID,
                    crate::VERIFICATION_SOP_CLASS,
                );
                push_u16(
                    &mut elements,
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    m.message_id_being_responded_to,
                );
                push_u16(&mut elements, tags::STATUS, m.status);
            }
            DimseCommand::NCreateRq(m) => {
                push_uid(
                    &mut elements,
                    tags::AFFECTED_SOP_CLASS_UID,
                    &m.affected_sop_class_uid,
                );
                push_u16(&mut elements, tags::MESSAGE_ID, m.message_id);
                if let Some(uid) = &m.affected_sop_instance_uid {
                    push_uid(&mut elements, tags::AFFECTED_SOP_INSTANCE_UID, uid);
                }
            }
            DimseCommand::NCreateRsp(m) => {
                push_u16(
                    &mut elements,
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    m.message_id_being_responded_to,
                );
                push_u16(&mut elements, tags::STATUS, m.status);
                if let Some(uid) = &m.affected_sop_class_uid {
                    push_uid(&mut elements, tags::AFFECTED_SOP_CLASS_UID, uid);
                }
                if let Some(uid) = &m.affected_sop_instance_uid {
                    push_uid(&mut elements, tags::AFFECTED_SOP_INSTANCE_UID, uid);
                }
            }
            DimseCommand::NSetRq(m) => {
                push_uid(
                    &mut elements,
                    tags::REQUESTED_SOP_CLASS_UID,
                    &m.requested_sop_class_uid,
                );
                push_u16(&mut elements, tags::MESSAGE_ID, m.message_id);
                push_uid(
                    &mut elements,
                    tags::REQUESTED_SOP_INSTANCE_UID,
                    &m.requested_sop_instance_uid,
                );
            }
            DimseCommand::NSetRsp(m) => {
                push_u16(
                    &mut elements,
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    m.message_id_being_responded_to,
                );
                push_u16(&mut elements, tags::STATUS, m.status);
                if let Some(uid) = &m.affected_sop_class_uid {
                    push_uid(&mut elements, tags::AFFECTED_SOP_CLASS_UID, uid);
                }
                if let Some(uid) = &m.affected_sop_instance_uid {
                    push_uid(&mut elements, tags::AFFECTED_SOP_INSTANCE_UID, uid);
                }
            }
            DimseCommand::NActionRq(m) => {
                push_uid(
                    &mut elements,
                    tags::REQUESTED_SOP_CLASS_UID,
                    &m.requested_sop_class_uid,
                );
                push_u16(&mut elements, tags::MESSAGE_ID, m.message_id);
                push_uid(
                    &mut elements,
                    tags::REQUESTED_SOP_INSTANCE_UID,
                    &m.requested_sop_instance_uid,
                );
                push_u16(&mut elements, tags::ACTION_TYPE_ID, m.action_type_id);
            }
            DimseCommand::NActionRsp(m) => {
                push_u16(
                    &mut elements,
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    m.message_id_being_responded_to,
                );
                push_u16(&mut elements, tags::STATUS, m.status);
                if let Some(uid) = &m.affected_sop_class_uid {
                    push_uid(&mut elements, tags::AFFECTED_SOP_CLASS_UID, uid);
                }
                if let Some(uid) = &m.affected_sop_instance_uid {
                    push_uid(&mut elements, tags::AFFECTED_SOP_INSTANCE_UID, uid);
                }
                if let Some(action_type_id) = m.action_type_id {
                    push_u16(&mut elements, tags::ACTION_TYPE_ID, action_type_id);
                }
            }
            DimseCommand::NEventReportRq(m) => {
                push_uid(
                    &mut elements,
                    tags::AFFECTED_SOP_CLASS_UID,
                    &m.affected_sop_class_uid,
                );
                push_u16(&mut elements, tags::MESSAGE_ID, m.message_id);
                push_uid(
                    &mut elements,
                    tags::AFFECTED_SOP_INSTANCE_UID,
                    &m.affected_sop_instance_uid,
                );
                push_u16(&mut elements, tags::EVENT_TYPE_ID, m.event_type_id);
            }
            DimseCommand::NEventReportRsp(m) => {
                push_u16(
                    &mut elements,
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    m.message_id_being_responded_to,
                );
                push_u16(&mut elements, tags::STATUS, m.status);
                if let Some(uid) = &m.affected_sop_class_uid {
                    push_uid(&mut elements, tags::AFFECTED_SOP_CLASS_UID, uid);
                }
                if let Some(uid) = &m.affected_sop_instance_uid {
                    push_uid(&mut elements, tags::AFFECTED_SOP_INSTANCE_UID, uid);
                }
                if let Some(event_type_id) = m.event_type_id {
                    push_u16(&mut elements, tags::EVENT_TYPE_ID, event_type_id);
                }
            }
        }

        InMemDicomObject::command_from_element_iter(elements)
    }

    /// Interpret a command set object as a typed DIMSE message.
    pub fn from_command_set(obj: &CommandSet) -> Result<Self> {
        let field = require_u16(obj, tags::COMMAND_FIELD, "Command Field")?;
        let command_field =
            CommandField::from_code(field).ok_or(UnsupportedCommandSnafu { field }.build())?;
        let data_set_present = data_set_announced(require_u16(
            obj,
            tags::COMMAND_DATA_SET_TYPE,
            "Command Data Set Type",
        )?);

        match command_field {
            CommandField::CEchoRq => Ok(DimseCommand::CEchoRq(CEchoRq {
                message_id: require_u16(obj, tags::MESSAGE_ID, "Message ID")?,
            })),
            CommandField::CEchoRsp => Ok(DimseCommand::CEchoRsp(CEchoRsp {
                message_id_being_responded_to: require_u16(
                    obj,
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    "Message ID Being Responded To",
                )?,
                status: require_u16(obj, tags::STATUS, "Status")?,
            })),
            CommandField::NCreateRq => Ok(DimseCommand::NCreateRq(NCreateRq {
                message_id: require_u16(obj, tags::MESSAGE_ID, "Message ID")?,
                affected_sop_class_uid: require_uid(
                    obj,
                    tags::AFFECTED_SOP_CLASS_UID,
                    "Affected SOP Class UID",
                )?,
                affected_sop_instance_uid: optional_uid(obj, tags::AFFECTED_SOP_INSTANCE_UID),
                data_set_present,
            })),
            CommandField::NCreateRsp => Ok(DimseCommand::NCreateRsp(NCreateRsp {
                message_id_being_responded_to: require_u16(
                    obj,
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    "Message ID Being Responded To",
                )?,
                status: require_u16(obj, tags::STATUS, "Status")?,
                affected_sop_class_uid: optional_uid(obj, tags::AFFECTED_SOP_CLASS_UID),
                affected_sop_instance_uid: optional_uid(obj, tags::AFFECTED_SOP_INSTANCE_UID),
                data_set_present,
            })),
            CommandField::NSetRq => Ok(DimseCommand::NSetRq(NSetRq {
                message_id: require_u16(obj, tags::MESSAGE_ID, "Message ID")?,
                requested_sop_class_uid: require_uid(
                    obj,
                    tags::REQUESTED_SOP_CLASS_UID,
                    "Requested SOP Class UID",
                )?,
                requested_sop_instance_uid: require_uid(
                    obj,
                    tags::REQUESTED_SOP_INSTANCE_UID,
                    "Requested SOP Instance UID",
                )?,
                data_set_present,
            })),
            CommandField::NSetRsp => Ok(DimseCommand::NSetRsp(NSetRsp {
                message_id_being_responded_to: require_u16(
                    obj,
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    "Message ID Being Responded To",
                )?,
                status: require_u16(obj, tags::STATUS, "Status")?,
                affected_sop_class_uid: optional_uid(obj, tags::AFFECTED_SOP_CLASS_UID),
                affected_sop_instance_uid: optional_uid(obj, tags::AFFECTED_SOP_INSTANCE_UID),
                data_set_present,
            })),
            CommandField::NActionRq => Ok(DimseCommand::NActionRq(NActionRq {
                message_id: require_u16(obj, tags::MESSAGE_ID, "Message ID")?,
                requested_sop_class_uid: require_uid(
                    obj,
                    tags::REQUESTED_SOP_CLASS_UID,
                    "Requested SOP Class UID",
                )?,
                requested_sop_instance_uid: require_uid(
                    obj,
                    tags::REQUESTED_SOP_INSTANCE_UID,
                    "Requested SOP Instance UID",
                )?,
                action_type_id: require_u16(obj, tags::ACTION_TYPE_ID, "Action Type ID")?,
                data_set_present,
            })),
            CommandField::NActionRsp => Ok(DimseCommand::NActionRsp(NActionRsp {
                message_id_being_responded_to: require_u16(
                    obj,
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    "Message ID Being Responded To",
                )?,
                status: require_u16(obj, tags::STATUS, "Status")?,
                affected_sop_class_uid: optional_uid(obj, tags::AFFECTED_SOP_CLASS_UID),
                affected_sop_instance_uid: optional_uid(obj, tags::AFFECTED_SOP_INSTANCE_UID),
                action_type_id: optional_u16(obj, tags::ACTION_TYPE_ID),
                data_set_present,
            })),
            CommandField::NEventReportRq => Ok(DimseCommand::NEventReportRq(NEventReportRq {
                message_id: require_u16(obj, tags::MESSAGE_ID, "Message ID")?,
                affected_sop_class_uid: require_uid(
                    obj,
                    tags::AFFECTED_SOP_CLASS_UID,
                    "Affected SOP Class UID",
                )?,
                affected_sop_instance_uid: require_uid(
                    obj,
                    tags::AFFECTED_SOP_INSTANCE_UID,
                    "Affected SOP Instance UID",
                )?,
                event_type_id: require_u16(obj, tags::EVENT_TYPE_ID, "Event Type ID")?,
                data_set_present,
            })),
            CommandField::NEventReportRsp => Ok(DimseCommand::NEventReportRsp(NEventReportRsp {
                message_id_being_responded_to: require_u16(
                    obj,
                    tags::MESSAGE_ID_BEING_RESPONDED_TO,
                    "Message ID Being Responded To",
                )?,
                status: require_u16(obj, tags::STATUS, "Status")?,
                affected_sop_class_uid: optional_uid(obj, tags::AFFECTED_SOP_CLASS_UID),
                affected_sop_instance_uid: optional_uid(obj, tags::AFFECTED_SOP_INSTANCE_UID),
                event_type_id: optional_u16(obj, tags::EVENT_TYPE_ID),
                data_set_present,
            })),
        }
    }
}

/// Encode a DIMSE message as command set bytes
/// (commands are always in Implicit VR Little Endian).
pub fn encode(command: &DimseCommand) -> Result<Vec<u8>> {
    let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
    let obj = command.to_command_set();
    let mut data = Vec::new();
    obj.write_dataset_with_ts(&mut data, &ts)
        .context(EncodeCommandSnafu)?;
    Ok(data)
}

/// Decode command set bytes into a typed DIMSE message.
pub fn decode(data: &[u8]) -> Result<DimseCommand> {
    let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
    let obj = InMemDicomObject::read_dataset_with_ts(data, &ts).context(DecodeCommandSnafu)?;
    DimseCommand::from_command_set(&obj)
}

fn push_u16(elements: &mut Vec<InMemElement<StandardDataDictionary>>, tag: Tag, value: u16) {
    elements.push(DataElement::new(tag, VR::US, dicom_value!(U16, [value])));
}

fn push_uid(elements: &mut Vec<InMemElement<StandardDataDictionary>>, tag: Tag, value: &str) {
    elements.push(DataElement::new(tag, VR::UI, dicom_value!(Str, value)));
}

fn require_u16(obj: &CommandSet, tag: Tag, name: &'static str) -> Result<u16> {
    obj.element(tag)
        .context(MissingFieldSnafu { name })?
        .to_int::<u16>()
        .context(InvalidFieldSnafu { name })
}

fn optional_u16(obj: &CommandSet, tag: Tag) -> Option<u16> {
    obj.element(tag).ok().and_then(|e| e.to_int::<u16>().ok())
}

fn require_uid(obj: &CommandSet, tag: Tag, name: &'static str) -> Result<String> {
    let value = obj
        .element(tag)
        .context(MissingFieldSnafu { name })?
        .to_str()
        .context(InvalidFieldSnafu { name })?;
    Ok(trim_uid_value(&value))
}

fn optional_uid(obj: &CommandSet, tag: Tag) -> Option<String> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|value| trim_uid_value(&value))
        .filter(|value| !value.is_empty())
}

fn trim_uid_value(value: &str) -> String {
    value
        .trim_end_matches(|c| c == '\0' || c == ' ')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dimse::status;

    fn round_trip(command: DimseCommand) {
        let bytes = encode(&command).expect("command should encode");
        let decoded = decode(&bytes).expect("command should decode");
        assert_eq!(decoded, command);
    }

    #[test]
    fn c_echo_round_trip() {
        round_trip(DimseCommand::CEchoRq(CEchoRq { message_id: 17 }));
        round_trip(DimseCommand::CEchoRsp(CEchoRsp {
            message_id_being_responded_to: 17,
            status: status::SUCCESS,
        }));
    }

    #[test]
    fn n_create_round_trip() {
        round_trip(DimseCommand::NCreateRq(NCreateRq {
            message_id: 4,
            affected_sop_class_uid: crate::MPPS_SOP_CLASS.to_string(),
            affected_sop_instance_uid: Some("1.2.3.4.5".to_string()),
            data_set_present: true,
        }));
        round_trip(DimseCommand::NCreateRq(NCreateRq {
            message_id: 5,
            affected_sop_class_uid: crate::MPPS_SOP_CLASS.to_string(),
            affected_sop_instance_uid: None,
            data_set_present: false,
        }));
        round_trip(DimseCommand::NCreateRsp(NCreateRsp {
            message_id_being_responded_to: 4,
            status: status::SUCCESS,
            affected_sop_class_uid: Some(crate::MPPS_SOP_CLASS.to_string()),
            affected_sop_instance_uid: Some("1.2.3.4.5".to_string()),
            data_set_present: false,
        }));
    }

    #[test]
    fn n_set_round_trip() {
        round_trip(DimseCommand::NSetRq(NSetRq {
            message_id: 9,
            requested_sop_class_uid: crate::MPPS_SOP_CLASS.to_string(),
            requested_sop_instance_uid: "1.2.3.4.5".to_string(),
            data_set_present: true,
        }));
        round_trip(DimseCommand::NSetRsp(NSetRsp {
            message_id_being_responded_to: 9,
            status: status::ATTRIBUTE_LIST_ERROR,
            affected_sop_class_uid: Some(crate::MPPS_SOP_CLASS.to_string()),
            affected_sop_instance_uid: Some("1.2.3.4.5".to_string()),
            data_set_present: false,
        }));
    }

    #[test]
    fn n_action_round_trip() {
        round_trip(DimseCommand::NActionRq(NActionRq {
            message_id: 1,
            requested_sop_class_uid: crate::STORAGE_COMMITMENT_SOP_CLASS.to_string(),
            requested_sop_instance_uid: crate::STORAGE_COMMITMENT_SOP_INSTANCE.to_string(),
            action_type_id: 1,
            data_set_present: true,
        }));
        // a rejection response omits the affected SOP identification
        round_trip(DimseCommand::NActionRsp(NActionRsp {
            message_id_being_responded_to: 1,
            status: status::NO_SUCH_SOP_CLASS,
            affected_sop_class_uid: None,
            affected_sop_instance_uid: None,
            action_type_id: None,
            data_set_present: false,
        }));
        round_trip(DimseCommand::NActionRsp(NActionRsp {
            message_id_being_responded_to: 1,
            status: status::SUCCESS,
            affected_sop_class_uid: Some(crate::STORAGE_COMMITMENT_SOP_CLASS.to_string()),
            affected_sop_instance_uid: Some(crate::STORAGE_COMMITMENT_SOP_INSTANCE.to_string()),
            action_type_id: Some(1),
            data_set_present: false,
        }));
    }

    #[test]
    fn n_event_report_round_trip() {
        round_trip(DimseCommand::NEventReportRq(NEventReportRq {
            message_id: 1,
            affected_sop_class_uid: crate::STORAGE_COMMITMENT_SOP_CLASS.to_string(),
            affected_sop_instance_uid: crate::STORAGE_COMMITMENT_SOP_INSTANCE.to_string(),
            event_type_id: 1,
            data_set_present: true,
        }));
        round_trip(DimseCommand::NEventReportRsp(NEventReportRsp {
            message_id_being_responded_to: 1,
            status: status::SUCCESS,
            affected_sop_class_uid: None,
            affected_sop_instance_uid: None,
            event_type_id: None,
            data_set_present: false,
        }));
    }

    #[test]
    fn unknown_command_field_is_rejected() {
        // craft a C-FIND-RQ, which these providers do not speak
        let obj = InMemDicomObject::command_from_element_iter([
            DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [0x0020])),
            DataElement::new(
                tags::COMMAND_DATA_SET_TYPE,
                VR::US,
                dicom_value!(U16, [super::DATA_SET_PRESENT]),
            ),
            DataElement::new(tags::MESSAGE_ID, VR::US, dicom_value!(U16, [1])),
        ]);
        let mut data = Vec::new();
        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
        obj.write_dataset_with_ts(&mut data, &ts).unwrap();

        let err = decode(&data).unwrap_err();
        assert!(matches!(
            err,
            crate::dimse::Error::UnsupportedCommand { field: 0x0020 }
        ));
    }

    #[test]
    fn uid_padding_is_stripped_on_decode() {
        let obj = InMemDicomObject::command_from_element_iter([
            DataElement::new(tags::COMMAND_FIELD, VR::US, dicom_value!(U16, [0x0130])),
            DataElement::new(
                tags::COMMAND_DATA_SET_TYPE,
                VR::US,
                dicom_value!(U16, [super::DATA_SET_PRESENT]),
            ),
            DataElement::new(tags::MESSAGE_ID, VR::US, dicom_value!(U16, [1])),
            DataElement::new(
                tags::REQUESTED_SOP_CLASS_UID,
                VR::UI,
                dicom_value!(Str, "1.2.840.10008.1.20.1\0"),
            ),
            DataElement::new(
                tags::REQUESTED_SOP_INSTANCE_UID,
                VR::UI,
                dicom_value!(Str, "1.2.840.10008.1.20.1.1\0"),
            ),
            DataElement::new(tags::ACTION_TYPE_ID, VR::US, dicom_value!(U16, [1])),
        ]);
        let mut data = Vec::new();
        let ts = entries::IMPLICIT_VR_LITTLE_ENDIAN.erased();
        obj.write_dataset_with_ts(&mut data, &ts).unwrap();

        let command = decode(&data).unwrap();
        assert_eq!(
            command,
            DimseCommand::NActionRq(NActionRq {
                message_id: 1,
                requested_sop_class_uid: crate::STORAGE_COMMITMENT_SOP_CLASS.to_string(),
                requested_sop_instance_uid: crate::STORAGE_COMMITMENT_SOP_INSTANCE.to_string(),
                action_type_id: 1,
                data_set_present: true,
            })
        );
    }
}
