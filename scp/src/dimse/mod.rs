//! DIMSE message layer
//!
//! Command sets travel as P-DATA fragments of type Command,
//! always encoded in Implicit VR Little Endian.
//! The [`commands`] module maps them
//! to and from typed DIMSE messages.

use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu};
use snafu::{ResultExt, Snafu};

use crate::association::Association;

pub mod commands;

pub use commands::DimseCommand;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// failed to decode DIMSE command set
    DecodeCommand {
        #[snafu(source(from(dicom_object::ReadError, Box::new)))]
        source: Box<dicom_object::ReadError>,
    },

    /// failed to encode DIMSE command set
    EncodeCommand {
        #[snafu(source(from(dicom_object::WriteError, Box::new)))]
        source: Box<dicom_object::WriteError>,
    },

    #[snafu(display("missing mandatory command attribute {}", name))]
    MissingField {
        name: &'static str,
        source: dicom_object::AccessError,
    },

    #[snafu(display("invalid value for command attribute {}", name))]
    InvalidField {
        name: &'static str,
        source: dicom_core::value::ConvertValueError,
    },

    #[snafu(display("unsupported DIMSE command 0x{:04X}", field))]
    UnsupportedCommand { field: u16 },

    /// failed to exchange PDU with the peer
    Transport { source: crate::association::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The command field values of the DIMSE commands
/// spoken by the providers in this crate.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum CommandField {
    CEchoRq,
    CEchoRsp,
    NEventReportRq,
    NEventReportRsp,
    NSetRq,
    NSetRsp,
    NActionRq,
    NActionRsp,
    NCreateRq,
    NCreateRsp,
}

impl CommandField {
    /// Interpret a Command Field (0000,0100) value.
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            0x0030 => Some(CommandField::CEchoRq),
            0x8030 => Some(CommandField::CEchoRsp),
            0x0100 => Some(CommandField::NEventReportRq),
            0x8100 => Some(CommandField::NEventReportRsp),
            0x0120 => Some(CommandField::NSetRq),
            0x8120 => Some(CommandField::NSetRsp),
            0x0130 => Some(CommandField::NActionRq),
            0x8130 => Some(CommandField::NActionRsp),
            0x0140 => Some(CommandField::NCreateRq),
            0x8140 => Some(CommandField::NCreateRsp),
            _ => None,
        }
    }

    /// The Command Field (0000,0100) value of this command.
    pub fn code(self) -> u16 {
        match self {
            CommandField::CEchoRq => 0x0030,
            CommandField::CEchoRsp => 0x8030,
            CommandField::NEventReportRq => 0x0100,
            CommandField::NEventReportRsp => 0x8100,
            CommandField::NSetRq => 0x0120,
            CommandField::NSetRsp => 0x8120,
            CommandField::NActionRq => 0x0130,
            CommandField::NActionRsp => 0x8130,
            CommandField::NCreateRq => 0x0140,
            CommandField::NCreateRsp => 0x8140,
        }
    }
}

/// DIMSE status codes returned by the providers.
pub mod status {
    /// the operation completed without error
    pub const SUCCESS: u16 = 0x0000;
    /// an attribute value was out of range or otherwise inappropriate
    pub const INVALID_ATTRIBUTE_VALUE: u16 = 0x0106;
    /// the attribute list could not be read or applied
    pub const ATTRIBUTE_LIST_ERROR: u16 = 0x0107;
    /// the SOP class is not supported for this operation
    pub const NO_SUCH_SOP_CLASS: u16 = 0x0118;
}

/// The Command Data Set Type value announcing that no data set follows.
pub const DATA_SET_ABSENT: u16 = 0x0101;

/// The Command Data Set Type value used when a data set follows.
pub const DATA_SET_PRESENT: u16 = 0x0000;

/// Whether a Command Data Set Type value announces a data set.
pub fn data_set_announced(value: u16) -> bool {
    value != DATA_SET_ABSENT
}

/// Send a DIMSE command set on the given presentation context.
pub fn send_command<A: Association>(
    association: &mut A,
    presentation_context_id: u8,
    command: &DimseCommand,
) -> Result<()> {
    let data = commands::encode(command)?;
    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id,
                value_type: PDataValueType::Command,
                is_last: true,
                data,
            }],
        })
        .context(TransportSnafu)
}

#[cfg(test)]
mod tests {
    use super::{data_set_announced, CommandField};

    #[test]
    fn command_field_codes_round_trip() {
        for field in [
            CommandField::CEchoRq,
            CommandField::CEchoRsp,
            CommandField::NEventReportRq,
            CommandField::NEventReportRsp,
            CommandField::NSetRq,
            CommandField::NSetRsp,
            CommandField::NActionRq,
            CommandField::NActionRsp,
            CommandField::NCreateRq,
            CommandField::NCreateRsp,
        ] {
            assert_eq!(CommandField::from_code(field.code()), Some(field));
        }
        assert_eq!(CommandField::from_code(0x0001), None);
    }

    #[test]
    fn data_set_type_values() {
        assert!(!data_set_announced(super::DATA_SET_ABSENT));
        assert!(data_set_announced(super::DATA_SET_PRESENT));
        assert!(data_set_announced(0x0102));
    }
}
