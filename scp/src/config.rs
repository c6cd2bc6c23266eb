//! Provider configuration
//!
//! The configuration gathers everything a provider instance needs
//! before it starts listening:
//! the application entity title and access lists,
//! the presentation context profile to negotiate with,
//! the protocol timeouts,
//! and the knobs of the Storage Commitment callback.
//!
//! An optional TOML profile file can override
//! the built-in presentation context profiles
//! and install AE title allow lists.

use std::path::Path;
use std::time::Duration;

use dicom_ul::pdu::reader::{DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE, MINIMUM_PDU_SIZE};
use serde::Deserialize;
use snafu::{ensure, ResultExt, Snafu};

use crate::{
    EXPLICIT_VR_BE, EXPLICIT_VR_LE, IMPLICIT_VR_LE, MPPS_SOP_CLASS, STORAGE_COMMITMENT_SOP_CLASS,
    VERIFICATION_SOP_CLASS,
};

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ConfigError {
    #[snafu(display("invalid AE title `{}`: must be 1 to 16 ASCII characters", ae_title))]
    InvalidAeTitle { ae_title: String },

    #[snafu(display(
        "maximum PDU length {} out of bounds [{}, {}]",
        value,
        MINIMUM_PDU_SIZE,
        MAXIMUM_PDU_SIZE
    ))]
    MaxPduLengthOutOfBounds { value: u32 },

    #[snafu(display(
        "presentation context for `{}` proposes no transfer syntax",
        abstract_syntax
    ))]
    EmptyTransferSyntaxes { abstract_syntax: String },

    /// the profile offers no presentation context
    EmptyProfile,

    /// failed to load association profile file
    LoadProfile { source: config::ConfigError },
}

pub type Result<T, E = ConfigError> = std::result::Result<T, E>;

/// One entry of a presentation context profile:
/// an abstract syntax together with the transfer syntaxes
/// this node is willing to accept for it, in order of preference.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ProfileContext {
    pub abstract_syntax: String,
    pub transfer_syntaxes: Vec<String>,
}

/// The set of presentation contexts a provider is configured to accept.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PresentationProfile {
    pub contexts: Vec<ProfileContext>,
}

impl PresentationProfile {
    /// The built-in profile of the MPPS provider:
    /// Verification and Modality Performed Procedure Step,
    /// with Implicit VR Little Endian only.
    pub fn mpps() -> Self {
        let transfer_syntaxes = vec![IMPLICIT_VR_LE.to_string()];
        PresentationProfile {
            contexts: vec![
                ProfileContext {
                    abstract_syntax: VERIFICATION_SOP_CLASS.to_string(),
                    transfer_syntaxes: transfer_syntaxes.clone(),
                },
                ProfileContext {
                    abstract_syntax: MPPS_SOP_CLASS.to_string(),
                    transfer_syntaxes,
                },
            ],
        }
    }

    /// The built-in profile of the Storage Commitment provider:
    /// Verification and Storage Commitment Push Model
    /// with the three uncompressed transfer syntaxes,
    /// Explicit VR Little Endian preferred.
    pub fn storage_commitment() -> Self {
        let transfer_syntaxes = vec![
            EXPLICIT_VR_LE.to_string(),
            EXPLICIT_VR_BE.to_string(),
            IMPLICIT_VR_LE.to_string(),
        ];
        PresentationProfile {
            contexts: vec![
                ProfileContext {
                    abstract_syntax: VERIFICATION_SOP_CLASS.to_string(),
                    transfer_syntaxes: transfer_syntaxes.clone(),
                },
                ProfileContext {
                    abstract_syntax: STORAGE_COMMITMENT_SOP_CLASS.to_string(),
                    transfer_syntaxes,
                },
            ],
        }
    }
}

/// How the Storage Commitment provider delivers the `N-EVENT-REPORT`.
#[derive(Debug, Copy, Clone, Eq, Hash, PartialEq)]
pub enum EventReportMode {
    /// deliver on the association that carried the `N-ACTION`,
    /// after waiting for the commit wait timeout
    SameAssociation,
    /// deliver on a fresh association opened to the peer
    /// once the inbound association has terminated
    NewAssociation,
}

/// Complete configuration of one provider instance.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// the application entity title of this node
    pub ae_title: String,
    /// whether to respond under the AE title the peer addressed us as
    pub use_called_ae_title: bool,
    /// the TCP port to listen on
    pub port: u16,
    /// the maximum PDU length this node is willing to receive
    pub max_pdu_length: u32,
    /// whether receiving PDUs must not surpass the maximum PDU length
    pub strict: bool,
    /// deadline for each ACSE PDU read or write
    pub acse_timeout: Duration,
    /// deadline for each DIMSE read (`None` blocks indefinitely)
    pub dimse_timeout: Option<Duration>,
    /// how long mode A waits for further commands
    /// before reporting on the same association
    pub commit_wait_timeout: Duration,
    /// the event report delivery mode
    pub event_report_mode: EventReportMode,
    /// the port on which peers listen for the commitment callback
    pub callback_port: u16,
    /// never resolve host names when opening the callback association
    pub disable_host_lookup: bool,
    /// the presentation contexts this node accepts
    pub profile: PresentationProfile,
    /// calling AE titles admitted (empty admits any)
    pub calling_ae_allow_list: Vec<String>,
    /// called AE titles answered (empty answers any)
    pub called_ae_allow_list: Vec<String>,
}

impl ProviderConfig {
    /// Configuration of an MPPS provider with the built-in defaults.
    pub fn mpps() -> Self {
        ProviderConfig {
            ae_title: "MPPSSCP".to_string(),
            port: 0,
            profile: PresentationProfile::mpps(),
            ..Self::base()
        }
    }

    /// Configuration of a Storage Commitment provider
    /// with the built-in defaults.
    pub fn storage_commitment() -> Self {
        ProviderConfig {
            ae_title: "STORCMTSCP".to_string(),
            port: 104,
            profile: PresentationProfile::storage_commitment(),
            ..Self::base()
        }
    }

    fn base() -> Self {
        ProviderConfig {
            ae_title: String::new(),
            use_called_ae_title: false,
            port: 0,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: false,
            acse_timeout: Duration::from_secs(30),
            dimse_timeout: None,
            commit_wait_timeout: Duration::from_secs(5),
            event_report_mode: EventReportMode::SameAssociation,
            callback_port: 115,
            disable_host_lookup: false,
            profile: PresentationProfile::default(),
            calling_ae_allow_list: Vec::new(),
            called_ae_allow_list: Vec::new(),
        }
    }

    /// Check the configuration for violations
    /// which must be caught before the listener starts.
    pub fn validate(&self) -> Result<()> {
        validate_ae_title(&self.ae_title)?;
        for ae_title in self
            .calling_ae_allow_list
            .iter()
            .chain(&self.called_ae_allow_list)
        {
            validate_ae_title(ae_title)?;
        }
        ensure!(
            (MINIMUM_PDU_SIZE..=MAXIMUM_PDU_SIZE).contains(&self.max_pdu_length),
            MaxPduLengthOutOfBoundsSnafu {
                value: self.max_pdu_length
            }
        );
        ensure!(!self.profile.contexts.is_empty(), EmptyProfileSnafu);
        for context in &self.profile.contexts {
            ensure!(
                !context.transfer_syntaxes.is_empty(),
                EmptyTransferSyntaxesSnafu {
                    abstract_syntax: context.abstract_syntax.clone()
                }
            );
        }
        Ok(())
    }

    /// Override parts of the configuration
    /// from an association profile file in TOML format.
    ///
    /// The file may redefine the presentation context profile
    /// and install calling/called AE title allow lists.
    /// Fields absent from the file keep their current values.
    pub fn load_profile_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let file: ProfileFile = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()
            .context(LoadProfileSnafu)?
            .try_deserialize()
            .context(LoadProfileSnafu)?;

        if !file.presentation_contexts.is_empty() {
            self.profile = PresentationProfile {
                contexts: file.presentation_contexts,
            };
        }
        if !file.calling_ae_titles.is_empty() {
            self.calling_ae_allow_list = file.calling_ae_titles;
        }
        if !file.called_ae_titles.is_empty() {
            self.called_ae_allow_list = file.called_ae_titles;
        }
        Ok(())
    }
}

/// An AE title is 1 to 16 ASCII octets;
/// trailing spaces are not significant.
fn validate_ae_title(ae_title: &str) -> Result<()> {
    let significant = ae_title.trim_end_matches(' ');
    ensure!(
        !significant.is_empty() && ae_title.len() <= 16 && ae_title.is_ascii(),
        InvalidAeTitleSnafu {
            ae_title: ae_title.to_string()
        }
    );
    Ok(())
}

/// The on-disk shape of an association profile file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ProfileFile {
    #[serde(default)]
    presentation_contexts: Vec<ProfileContext>,
    #[serde(default)]
    calling_ae_titles: Vec<String>,
    #[serde(default)]
    called_ae_titles: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ae_title_boundaries() {
        // exactly 16 octets is admitted
        let mut config = ProviderConfig::mpps();
        config.ae_title = "A234567890123456".to_string();
        config.validate().unwrap();

        // 17 octets is rejected at configuration time
        config.ae_title = "A2345678901234567".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAeTitle { .. })
        ));

        // all-spaces titles carry no significant characters
        config.ae_title = "    ".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidAeTitle { .. })
        ));
    }

    #[test]
    fn max_pdu_boundaries() {
        let mut config = ProviderConfig::storage_commitment();
        config.max_pdu_length = MINIMUM_PDU_SIZE;
        config.validate().unwrap();
        config.max_pdu_length = MAXIMUM_PDU_SIZE;
        config.validate().unwrap();
        config.max_pdu_length = MINIMUM_PDU_SIZE - 1;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MaxPduLengthOutOfBounds { .. })
        ));
    }

    #[test]
    fn builtin_profiles() {
        let mpps = PresentationProfile::mpps();
        assert_eq!(mpps.contexts.len(), 2);
        assert!(mpps
            .contexts
            .iter()
            .all(|c| c.transfer_syntaxes == [crate::IMPLICIT_VR_LE]));

        let commitment = PresentationProfile::storage_commitment();
        assert_eq!(commitment.contexts.len(), 2);
        // Explicit VR Little Endian is the preferred transfer syntax
        assert!(commitment
            .contexts
            .iter()
            .all(|c| c.transfer_syntaxes[0] == crate::EXPLICIT_VR_LE));
    }

    #[test]
    fn profile_file_overrides() {
        let dir = std::env::temp_dir().join("dicom-scp-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("profile.toml");
        std::fs::write(
            &path,
            r#"
calling-ae-titles = ["MODALITY1"]

[[presentation-contexts]]
abstract-syntax = "1.2.840.10008.1.20.1"
transfer-syntaxes = ["1.2.840.10008.1.2"]
"#,
        )
        .unwrap();

        let mut config = ProviderConfig::storage_commitment();
        config.load_profile_file(&path).unwrap();
        assert_eq!(config.calling_ae_allow_list, ["MODALITY1"]);
        assert_eq!(config.profile.contexts.len(), 1);
        assert_eq!(
            config.profile.contexts[0].abstract_syntax,
            crate::STORAGE_COMMITMENT_SOP_CLASS
        );
        // the called list was not named in the file and is kept
        assert!(config.called_ae_allow_list.is_empty());
        config.validate().unwrap();
    }
}
