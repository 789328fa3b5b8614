use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rentcore::application::settlement::SettlementCoordinator;
use rentcore::config::EngineConfig;
use rentcore::domain::ports::{BookingStoreBox, PaymentStoreBox};
use rentcore::infrastructure::gateway::SandboxGateway;
use rentcore::infrastructure::in_memory::{
    InMemoryBookingStore, InMemoryInventory, InMemoryPaymentStore,
};
use rentcore::interfaces::csv::booking_writer::BookingWriter;
use rentcore::interfaces::csv::command_reader::CommandReader;
use rentcore::interfaces::csv::vehicle_reader::VehicleReader;
use rentcore::interfaces::replay::Replay;
use rentcore::telemetry::init_tracing;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Lifecycle commands CSV file
    input: PathBuf,

    /// Fleet CSV file: vehicle, station, daily_rate, hourly_rate, deposit, capacity
    #[arg(long)]
    vehicles: PathBuf,

    /// TOML configuration file. RENTCORE__* environment variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent database (optional). Requires the `storage-rocksdb` feature.
    #[arg(long)]
    db_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = EngineConfig::load(cli.config.as_deref())?;
    init_tracing(&config.logging);

    let (bookings, payments) = open_stores(cli.db_path.as_deref())?;

    let inventory = InMemoryInventory::new();
    let fleet = File::open(&cli.vehicles).into_diagnostic()?;
    for vehicle in VehicleReader::new(fleet).vehicles() {
        match vehicle {
            Ok(vehicle) => inventory.add_vehicle(vehicle).await,
            Err(e) => warn!(error = %e, "skipping vehicle row"),
        }
    }

    let gateway = SandboxGateway::new(config.gateway.base_url.as_str())
        .with_secret(config.gateway.callback_secret.as_bytes());
    let engine = SettlementCoordinator::new(
        bookings,
        payments,
        Box::new(inventory),
        Box::new(gateway.clone()),
    )
    .with_pricing(config.pricing.clone())
    .with_cancellation(config.cancellation.clone());

    // Replay commands; a failing row is reported and skipped
    let file = File::open(&cli.input).into_diagnostic()?;
    let mut replay = Replay::new(&engine).with_provider(&gateway);
    let (mut applied, mut rejected) = (0usize, 0usize);
    for (row, command) in CommandReader::new(file).commands().enumerate() {
        let outcome = match command {
            Ok(command) => replay.apply(command).await,
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => applied += 1,
            Err(e) => {
                rejected += 1;
                warn!(row = row + 1, error = %e, "command rejected");
            }
        }
    }
    info!(applied, rejected, "replay finished");

    let bookings = engine.list_bookings().await?;
    let stdout = io::stdout();
    let mut writer = BookingWriter::new(stdout.lock());
    writer.write_bookings(
        bookings
            .iter()
            .map(|b| (replay.label_of(&b.id).unwrap_or(b.code.as_str()), b)),
    )?;

    Ok(())
}

fn in_memory_stores() -> (BookingStoreBox, PaymentStoreBox) {
    (
        Box::new(InMemoryBookingStore::new()),
        Box::new(InMemoryPaymentStore::new()),
    )
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<&Path>) -> Result<(BookingStoreBox, PaymentStoreBox)> {
    use rentcore::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path)?;
            info!(path = %path.display(), "using RocksDB storage");
            Ok((Box::new(store.clone()), Box::new(store)))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<&Path>) -> Result<(BookingStoreBox, PaymentStoreBox)> {
    if let Some(path) = db_path {
        warn!(
            path = %path.display(),
            "built without the storage-rocksdb feature, falling back to in-memory storage"
        );
    }
    Ok(in_memory_stores())
}
