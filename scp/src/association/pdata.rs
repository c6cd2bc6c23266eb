//! Helpers for moving data sets through P-DATA PDUs
//!
//! A data set travels as a sequence of presentation data values
//! tagged with the presentation context identifier,
//! the last one carrying the `is_last` marker.
//! These helpers assemble an incoming data set into memory
//! and fragment an outgoing one
//! to honor the maximum PDU length admitted by the peer.

use dicom_ul::pdu::reader::MINIMUM_PDU_SIZE;
use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu};
use tracing::warn;

use super::{AbortedSnafu, Association, Result, UnexpectedPduSnafu, UnknownPduSnafu};

/// Overhead of one presentation data value within a P-DATA PDU:
/// the PDU header plus the item length and identification fields.
const PDV_OVERHEAD: u32 = 12;

/// A data set read from the wire, still encoded
/// in the transfer syntax of its presentation context.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSetBytes {
    /// the presentation context the data set arrived on
    pub presentation_context_id: u8,
    /// the encoded data set
    pub data: Vec<u8>,
}

/// Read one complete data set from the association,
/// accumulating presentation data values until the last fragment.
///
/// The presentation context identifier is taken from the fragments;
/// it is the caller's job to compare it
/// against the context of the command that announced the data set.
pub fn read_data_set<A: Association>(association: &mut A) -> Result<DataSetBytes> {
    let mut data: Vec<u8> = Vec::with_capacity(1024);
    let mut presentation_context_id: Option<u8> = None;

    loop {
        let pdu = association.receive()?;
        match pdu {
            Pdu::PData { data: pdvs } => {
                for mut pdv in pdvs {
                    if pdv.value_type != PDataValueType::Data {
                        return UnexpectedPduSnafu {
                            pdu: Pdu::PData { data: vec![pdv] },
                        }
                        .fail();
                    }
                    match presentation_context_id {
                        None => presentation_context_id = Some(pdv.presentation_context_id),
                        Some(id) if id != pdv.presentation_context_id => {
                            warn!(
                                "Data set fragments on distinct presentation contexts ({} and {})",
                                id, pdv.presentation_context_id
                            );
                            presentation_context_id = Some(pdv.presentation_context_id);
                        }
                        Some(_) => {}
                    }
                    data.append(&mut pdv.data);
                    if pdv.is_last {
                        return Ok(DataSetBytes {
                            presentation_context_id: presentation_context_id
                                .unwrap_or(pdv.presentation_context_id),
                            data,
                        });
                    }
                }
            }
            Pdu::AbortRQ { .. } => return AbortedSnafu.fail(),
            pdu @ Pdu::Unknown { .. } => return UnknownPduSnafu { pdu }.fail(),
            pdu => return UnexpectedPduSnafu { pdu }.fail(),
        }
    }
}

/// Send one complete data set on the given presentation context,
/// fragmenting it to stay within the peer's maximum PDU length.
pub fn write_data_set<A: Association>(
    association: &mut A,
    presentation_context_id: u8,
    data: &[u8],
) -> Result<()> {
    let max_pdu = association.peer_max_pdu_length().max(MINIMUM_PDU_SIZE);
    let chunk_size = (max_pdu - PDV_OVERHEAD) as usize;

    let mut chunks = data.chunks(chunk_size).peekable();
    // an empty data set still takes one last, empty fragment
    if chunks.peek().is_none() {
        return association.send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: Vec::new(),
            }],
        });
    }

    while let Some(chunk) = chunks.next() {
        let is_last = chunks.peek().is_none();
        association.send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id,
                value_type: PDataValueType::Data,
                is_last,
                data: chunk.to_vec(),
            }],
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::time::Duration;

    use dicom_ul::pdu::{PDataValue, PDataValueType, Pdu};

    use super::super::{
        Association, MessageIdAllocator, PresentationContext, Result, UnexpectedPduSnafu,
    };
    use super::{read_data_set, write_data_set};

    /// An association whose wire is a pair of in-memory queues.
    struct FakeAssociation {
        incoming: VecDeque<Pdu>,
        outgoing: Vec<Pdu>,
        peer_max_pdu_length: u32,
        message_ids: MessageIdAllocator,
    }

    impl FakeAssociation {
        fn new(incoming: Vec<Pdu>, peer_max_pdu_length: u32) -> Self {
            FakeAssociation {
                incoming: incoming.into(),
                outgoing: Vec::new(),
                peer_max_pdu_length,
                message_ids: MessageIdAllocator::new(),
            }
        }
    }

    impl Association for FakeAssociation {
        fn send(&mut self, pdu: &Pdu) -> Result<()> {
            self.outgoing.push(pdu.clone());
            Ok(())
        }

        fn receive(&mut self) -> Result<Pdu> {
            self.incoming
                .pop_front()
                .ok_or_else(|| UnexpectedPduSnafu { pdu: Pdu::ReleaseRP }.build())
        }

        fn receive_deadline(&mut self, _deadline: Option<Duration>) -> Result<Pdu> {
            self.receive()
        }

        fn presentation_contexts(&self) -> &[PresentationContext] {
            &[]
        }

        fn peer_max_pdu_length(&self) -> u32 {
            self.peer_max_pdu_length
        }

        fn message_ids(&mut self) -> &mut MessageIdAllocator {
            &mut self.message_ids
        }
    }

    fn data_pdv(presentation_context_id: u8, data: Vec<u8>, is_last: bool) -> PDataValue {
        PDataValue {
            presentation_context_id,
            value_type: PDataValueType::Data,
            is_last,
            data,
        }
    }

    #[test]
    fn data_set_is_assembled_across_pdus() {
        let mut association = FakeAssociation::new(
            vec![
                Pdu::PData {
                    data: vec![data_pdv(3, vec![1, 2, 3], false)],
                },
                Pdu::PData {
                    data: vec![
                        data_pdv(3, vec![4, 5], false),
                        data_pdv(3, vec![6], true),
                    ],
                },
            ],
            16384,
        );

        let data_set = read_data_set(&mut association).unwrap();
        assert_eq!(data_set.presentation_context_id, 3);
        assert_eq!(data_set.data, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn data_set_keeps_the_fragment_context_id() {
        // the caller is responsible for flagging the mismatch
        let mut association = FakeAssociation::new(
            vec![Pdu::PData {
                data: vec![data_pdv(1, vec![1, 2], true)],
            }],
            16384,
        );
        let data_set = read_data_set(&mut association).unwrap();
        assert_eq!(data_set.presentation_context_id, 1);
    }

    #[test]
    fn abort_interrupts_the_data_set() {
        let mut association = FakeAssociation::new(
            vec![
                Pdu::PData {
                    data: vec![data_pdv(3, vec![1, 2, 3], false)],
                },
                Pdu::AbortRQ {
                    source: dicom_ul::pdu::AbortRQSource::ServiceUser,
                },
            ],
            16384,
        );
        assert!(matches!(
            read_data_set(&mut association),
            Err(super::super::Error::Aborted)
        ));
    }

    #[test]
    fn written_data_sets_respect_the_peer_maximum() {
        let mut association = FakeAssociation::new(vec![], 4096);
        let payload: Vec<u8> = (0..10_000u32).map(|i| i as u8).collect();
        write_data_set(&mut association, 5, &payload).unwrap();

        let mut assembled = Vec::new();
        let last = association.outgoing.len() - 1;
        for (i, pdu) in association.outgoing.iter().enumerate() {
            let Pdu::PData { data } = pdu else {
                panic!("expected only P-DATA");
            };
            assert_eq!(data.len(), 1);
            assert_eq!(data[0].presentation_context_id, 5);
            assert_eq!(data[0].value_type, PDataValueType::Data);
            assert!(data[0].data.len() <= 4096 - super::PDV_OVERHEAD as usize);
            assert_eq!(data[0].is_last, i == last);
            assembled.extend_from_slice(&data[0].data);
        }
        assert_eq!(assembled, payload);
    }

    #[test]
    fn empty_data_set_takes_one_last_fragment() {
        let mut association = FakeAssociation::new(vec![], 16384);
        write_data_set(&mut association, 7, &[]).unwrap();
        assert_eq!(association.outgoing.len(), 1);
        let Pdu::PData { data } = &association.outgoing[0] else {
            panic!("expected a P-DATA");
        };
        assert!(data[0].is_last);
        assert!(data[0].data.is_empty());
    }
}
