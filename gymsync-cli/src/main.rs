use std::net::SocketAddr;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use device_sync::logging::{init_logging_from_env, ENV_LOG_MODE};
use device_sync::{
    DeviceAdapter, FailureKind, MemberId, MemberSync, MembershipEvent, MembershipRecord, MembershipType,
    SyncOutcome,
};
use isapi_client::{EventQuery, SharedConfig};
use mock_device::MockDevice;
use tracing::{info, warn};

/// Gym access terminal sync tool
///
/// Device settings come from the environment (DEVICE_HOST, DEVICE_PORT,
/// DEVICE_USER, DEVICE_PASS, DEVICE_DOOR_NO, DEVICE_TIMEOUT_MS,
/// DEVICE_WIRE_FORMAT, DISABLE_DEVICE_SYNC).
#[derive(Parser, Debug)]
#[command(name = "gymsync")]
#[command(about = "Keep a fingerprint access terminal in step with gym memberships")]
#[command(version)]
pub struct Args {
    /// Exit non-zero when the device operation fails
    #[arg(long, global = true)]
    pub strict: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Run the mock terminal until Ctrl-C
    Mock {
        #[arg(long, default_value = "127.0.0.1:8090")]
        bind: SocketAddr,
    },

    /// Read the terminal's identity
    Status,

    /// Unlock a door remotely
    OpenDoor {
        /// Door number, defaults to DEVICE_DOOR_NO
        #[arg(long)]
        door: Option<u32>,
    },

    /// Provision or update a member on the terminal
    PushMember {
        #[arg(long)]
        id: i64,
        #[arg(long)]
        name: String,
        /// First day of the membership (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,
        /// short, medium or long
        #[arg(long = "type", default_value = "short")]
        membership_type: MembershipType,
        #[arg(long)]
        phone: Option<String>,
        /// Push as a renewal rather than a new member
        #[arg(long)]
        renew: bool,
    },

    /// Remove a member from the terminal
    PurgeMember {
        #[arg(long)]
        id: i64,
    },

    /// List badge events recorded by the terminal
    Events {
        /// Earliest event, e.g. 2025-01-10T00:00:00
        #[arg(long)]
        from: Option<NaiveDateTime>,
        #[arg(long)]
        to: Option<NaiveDateTime>,
        #[arg(long, default_value_t = isapi_client::events::DEFAULT_MAX_RESULTS)]
        limit: u32,
    },
}

impl Command {
    fn event(&self) -> Option<MembershipEvent> {
        match self {
            Command::PushMember { renew: true, .. } => Some(MembershipEvent::Renewed),
            Command::PushMember { .. } => Some(MembershipEvent::Created),
            Command::PurgeMember { .. } => Some(MembershipEvent::Retired),
            _ => None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging_from_env()
        .with_context(|| format!("Failed to initialize logging (check {ENV_LOG_MODE})"))?;

    if let Command::Mock { bind } = args.command {
        return run_mock(bind).await;
    }

    let config = SharedConfig::from_env().context("Invalid device configuration")?;
    let sync = MemberSync::new(DeviceAdapter::connect(config));

    let outcome = run_device_command(&sync, &args.command).await;
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("Failed to render outcome")?
    );

    if let Some(notice) = args.command.event().and_then(|e| outcome.operator_notice(e)) {
        warn!("{notice}");
    }

    check_strict(args.strict, &outcome)
}

async fn run_mock(bind: SocketAddr) -> Result<()> {
    let device = MockDevice::start(bind)
        .await
        .with_context(|| format!("Failed to start mock terminal on {bind}"))?;

    info!("Mock terminal listening at {}/ISAPI", device.base_url());
    println!("DEVICE_HOST={} DEVICE_PORT={}", device.addr().ip(), device.port());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    info!("Shutting down mock terminal");
    device.shutdown().await;
    Ok(())
}

async fn run_device_command(sync: &MemberSync, command: &Command) -> SyncOutcome {
    let adapter = sync.adapter();
    match command {
        Command::Status => adapter.device_status().await,
        Command::OpenDoor { door } => adapter.open_door(*door).await,
        Command::PushMember {
            id,
            name,
            start,
            membership_type,
            phone,
            renew,
        } => {
            let mut record =
                MembershipRecord::new(Some(MemberId::new(*id)), name.as_str(), *membership_type, *start);
            if let Some(phone) = phone {
                record = record.with_phone(phone.as_str());
            }
            let event = if *renew {
                MembershipEvent::Renewed
            } else {
                MembershipEvent::Created
            };
            sync.sync_record(event, &record).await
        }
        Command::PurgeMember { id } => adapter.delete_user(&MemberId::new(*id).external_id()).await,
        Command::Events { from, to, limit } => {
            let query = EventQuery {
                start: *from,
                end: *to,
                max_results: *limit,
            };
            adapter.attendance_events(&query).await
        }
        Command::Mock { .. } => {
            SyncOutcome::failed(FailureKind::Internal, "mock is not a device command")
        }
    }
}

fn check_strict(strict: bool, outcome: &SyncOutcome) -> Result<()> {
    match outcome.failure() {
        Some(failure) if strict => Err(anyhow::anyhow!(
            "Device operation failed ({}): {}",
            failure.kind,
            failure.message
        )),
        _ => Ok(()),
    }
}
