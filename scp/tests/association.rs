//! Socket-level tests of the association lifecycle:
//! an acceptor on one thread, the requestor on the other.

use std::net::TcpListener;
use std::thread;

use dicom_ul::pdu::Pdu;

use dicom_scp::association::scp::{AeTitleAllowList, ScpAssociationOptions};
use dicom_scp::association::{
    Association, AssociationState, Error as AssociationError, PresentationContextOutcome,
};
use dicom_scp::config::PresentationProfile;
use dicom_scp::{
    ScuAssociationOptions, EXPLICIT_VR_BE, EXPLICIT_VR_LE, IMPLICIT_VR_LE, MPPS_SOP_CLASS,
    STORAGE_COMMITMENT_SOP_CLASS, VERIFICATION_SOP_CLASS,
};

#[test]
fn establish_and_release() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let acceptor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut association = ScpAssociationOptions::new()
            .ae_title("STORCMTSCP")
            .with_profile(PresentationProfile::storage_commitment())
            .establish(stream)
            .expect("acceptor failed to establish");

        assert_eq!(association.state(), AssociationState::Established);
        assert_eq!(association.peer_ae_title(), "REQUESTOR");
        assert_eq!(association.local_ae_title(), "STORCMTSCP");

        match association.receive().unwrap() {
            Pdu::ReleaseRQ => association.acknowledge_release().unwrap(),
            pdu => panic!("expected release request, got {:?}", pdu),
        }
        assert_eq!(association.state(), AssociationState::Closed);
    });

    let mut association = ScuAssociationOptions::new()
        .calling_ae_title("REQUESTOR")
        .called_ae_title("STORCMTSCP")
        .with_presentation_context(
            STORAGE_COMMITMENT_SOP_CLASS,
            vec![EXPLICIT_VR_LE, EXPLICIT_VR_BE, IMPLICIT_VR_LE],
        )
        .with_presentation_context(VERIFICATION_SOP_CLASS, vec![IMPLICIT_VR_LE])
        .establish(addr)
        .expect("requestor failed to establish");

    // odd identifiers assigned in proposal order
    let contexts = association.presentation_contexts();
    assert_eq!(contexts.len(), 2);
    assert_eq!(contexts[0].id, 1);
    assert_eq!(contexts[1].id, 3);

    // the acceptor prefers the first transfer syntax we proposed
    assert_eq!(
        association
            .presentation_context_for(STORAGE_COMMITMENT_SOP_CLASS, EXPLICIT_VR_LE)
            .map(|pc| pc.id),
        Some(1)
    );
    assert_eq!(
        association
            .presentation_context_for(VERIFICATION_SOP_CLASS, IMPLICIT_VR_LE)
            .map(|pc| pc.id),
        Some(3)
    );

    association.release().unwrap();
    assert_eq!(association.state(), AssociationState::Closed);
    acceptor.join().unwrap();
}

#[test]
fn unknown_abstract_syntax_is_rejected_per_context() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let acceptor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut association = ScpAssociationOptions::new()
            .ae_title("MPPSSCP")
            .with_profile(PresentationProfile::mpps())
            .establish(stream)
            .expect("acceptor failed to establish");
        match association.receive().unwrap() {
            Pdu::ReleaseRQ => association.acknowledge_release().unwrap(),
            pdu => panic!("expected release request, got {:?}", pdu),
        }
    });

    let mut association = ScuAssociationOptions::new()
        .calling_ae_title("REQUESTOR")
        .called_ae_title("MPPSSCP")
        // secondary capture storage is not in the MPPS profile
        .with_presentation_context("1.2.840.10008.5.1.4.1.1.7", vec![IMPLICIT_VR_LE])
        .with_presentation_context(MPPS_SOP_CLASS, vec![IMPLICIT_VR_LE])
        .establish(addr)
        .expect("requestor failed to establish");

    let contexts = association.presentation_contexts();
    assert!(matches!(
        contexts[0].outcome,
        PresentationContextOutcome::Rejected { .. }
    ));
    assert_eq!(
        contexts[1].accepted_transfer_syntax(),
        Some(IMPLICIT_VR_LE)
    );

    association.release().unwrap();
    acceptor.join().unwrap();
}

#[test]
fn association_with_no_common_ground_is_rejected() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let acceptor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let err = ScpAssociationOptions::new()
            .ae_title("MPPSSCP")
            .with_profile(PresentationProfile::mpps())
            .establish(stream)
            .expect_err("acceptor should refuse");
        assert!(matches!(err, AssociationError::Refused { .. }));
    });

    let err = ScuAssociationOptions::new()
        .calling_ae_title("REQUESTOR")
        .called_ae_title("MPPSSCP")
        .with_presentation_context("1.2.840.10008.5.1.4.1.1.7", vec![IMPLICIT_VR_LE])
        .establish(addr)
        .expect_err("requestor should be rejected");
    assert!(matches!(err, AssociationError::Rejected { .. }));

    acceptor.join().unwrap();
}

#[test]
fn acceptor_responds_under_the_called_ae_title() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let acceptor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut association = ScpAssociationOptions::new()
            .ae_title("WHO-KNOWS")
            .use_called_ae_title(true)
            .with_profile(PresentationProfile::mpps())
            .establish(stream)
            .expect("acceptor failed to establish");
        assert_eq!(association.local_ae_title(), "ADDRESSED-AS");
        match association.receive().unwrap() {
            Pdu::ReleaseRQ => association.acknowledge_release().unwrap(),
            pdu => panic!("expected release request, got {:?}", pdu),
        }
    });

    let mut association = ScuAssociationOptions::new()
        .calling_ae_title("REQUESTOR")
        .called_ae_title("ADDRESSED-AS")
        .with_presentation_context(VERIFICATION_SOP_CLASS, vec![IMPLICIT_VR_LE])
        .establish(addr)
        .unwrap();
    association.release().unwrap();
    acceptor.join().unwrap();
}

#[test]
fn calling_ae_title_allow_list_rejects_strangers() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let acceptor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let err = ScpAssociationOptions::new()
            .ae_title("MPPSSCP")
            .with_profile(PresentationProfile::mpps())
            .ae_access_control(AeTitleAllowList {
                called: vec![],
                calling: vec!["FRIEND".to_string()],
            })
            .establish(stream)
            .expect_err("acceptor should refuse");
        assert!(matches!(
            err,
            AssociationError::Refused {
                cause: dicom_scp::association::RejectionCause::CallingAeTitleNotRecognized
            }
        ));
    });

    let err = ScuAssociationOptions::new()
        .calling_ae_title("STRANGER")
        .called_ae_title("MPPSSCP")
        .with_presentation_context(VERIFICATION_SOP_CLASS, vec![IMPLICIT_VR_LE])
        .establish(addr)
        .expect_err("requestor should be rejected");
    assert!(matches!(err, AssociationError::Rejected { .. }));

    acceptor.join().unwrap();
}

#[test]
fn abort_from_the_requestor_is_observed() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    let acceptor = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut association = ScpAssociationOptions::new()
            .ae_title("MPPSSCP")
            .with_profile(PresentationProfile::mpps())
            .establish(stream)
            .unwrap();
        match association.receive().unwrap() {
            Pdu::AbortRQ { .. } => association.mark_aborted(),
            pdu => panic!("expected abort, got {:?}", pdu),
        }
        assert_eq!(association.state(), AssociationState::Aborted);
    });

    let mut association = ScuAssociationOptions::new()
        .calling_ae_title("REQUESTOR")
        .called_ae_title("MPPSSCP")
        .with_presentation_context(VERIFICATION_SOP_CLASS, vec![IMPLICIT_VR_LE])
        .establish(addr)
        .unwrap();
    association.abort();
    assert_eq!(association.state(), AssociationState::Aborted);
    acceptor.join().unwrap();
}
