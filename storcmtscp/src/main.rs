//! A server accepting DICOM Storage Commitment Push Model requests
//! and reporting commitment outcomes through N-EVENT-REPORT.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::Parser;
use dicom_scp::listener::ListenError;
use dicom_scp::{EventReportMode, Listener, ProviderConfig, ProviderService};
use snafu::{Report, ResultExt, Whatever};
use tracing::error;

/// DICOM Storage Commitment Push Model SCP
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// TCP port to listen on
    #[arg(value_parser = clap::value_parser!(u16).range(1..))]
    port: u16,
    /// verbose mode
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
    /// set my AE title
    #[arg(long = "aetitle", default_value = "STORCMTSCP")]
    aetitle: String,
    /// respond under the AE title the SCU addressed us as
    #[arg(long = "use-called-aetitle")]
    use_called_aetitle: bool,
    /// port on which peers listen for the commitment callback
    #[arg(long = "peer-port", default_value = "115")]
    peer_port: u16,
    /// seconds to wait for further commands before reporting
    /// on the same association (0 reports immediately)
    #[arg(long = "commit-wait-timeout", default_value = "5")]
    commit_wait_timeout: u64,
    /// how the N-EVENT-REPORT is delivered
    #[arg(long = "event-report-mode", value_enum, default_value_t = ReportMode::SameAssociation)]
    event_report_mode: ReportMode,
    /// ACSE timeout in seconds
    #[arg(long = "acse-timeout", default_value = "30")]
    acse_timeout: u64,
    /// DIMSE timeout in seconds (0 blocks indefinitely)
    #[arg(long = "dimse-timeout", default_value = "0")]
    dimse_timeout: u64,
    /// maximum PDU length
    #[arg(
        long = "max-pdu",
        default_value = "16384",
        value_parser = clap::value_parser!(u32).range(4096..=131_072)
    )]
    max_pdu: u32,
    /// enforce the maximum PDU length on received PDUs
    #[arg(long = "strict")]
    strict: bool,
    /// never resolve host names for the peer
    #[arg(long = "disable-host-lookup")]
    disable_host_lookup: bool,
    /// association profile file (TOML)
    #[arg(long = "config")]
    config: Option<PathBuf>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
enum ReportMode {
    /// report on the association that carried the N-ACTION
    SameAssociation,
    /// report on a new association after the inbound one ends
    NewAssociation,
}

fn main() {
    let app = App::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new(if app.verbose { "debug" } else { "info" })
            }),
        )
        .init();

    run(app).unwrap_or_else(|e| {
        error!("{}", Report::from_error(e));
        std::process::exit(-2);
    });
}

fn run(app: App) -> Result<(), Whatever> {
    let mut config = ProviderConfig::storage_commitment();
    config.ae_title = app.aetitle;
    config.use_called_ae_title = app.use_called_aetitle;
    config.port = app.port;
    config.callback_port = app.peer_port;
    config.commit_wait_timeout = Duration::from_secs(app.commit_wait_timeout);
    config.event_report_mode = match app.event_report_mode {
        ReportMode::SameAssociation => EventReportMode::SameAssociation,
        ReportMode::NewAssociation => EventReportMode::NewAssociation,
    };
    config.max_pdu_length = app.max_pdu;
    config.strict = app.strict;
    config.acse_timeout = Duration::from_secs(app.acse_timeout);
    config.dimse_timeout = (app.dimse_timeout > 0).then(|| Duration::from_secs(app.dimse_timeout));
    config.disable_host_lookup = app.disable_host_lookup;

    if let Some(path) = &app.config {
        config
            .load_profile_file(path)
            .whatever_context("could not load association profile file")?;
    }

    let listener = match Listener::bind(config, ProviderService::StorageCommitment) {
        Ok(listener) => listener,
        Err(
            e @ (ListenError::Bind { .. } | ListenError::InsufficientPortPrivileges { .. }),
        ) => {
            error!("{}", Report::from_error(e));
            std::process::exit(64);
        }
        Err(e) => {
            return Err(e).whatever_context("invalid provider configuration");
        }
    };

    let stop = AtomicBool::new(false);
    listener
        .run(&stop)
        .whatever_context("listener failed")
}
