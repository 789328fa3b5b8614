use crate::domain::booking::{BookingEvent, BookingRequest};
use crate::domain::identity::Actor;
use crate::domain::payment::{PaymentMethod, PaymentPurpose};
use crate::domain::pricing::RentalOptions;
use crate::domain::vehicle::{StationId, VehicleId};
use crate::domain::window::RentalWindow;
use crate::error::{RentalError, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandKind {
    Book,
    Pay,
    PayRemainder,
    Callback,
    MarkPaid,
    Confirm,
    Start,
    Complete,
    Cancel,
}

/// One raw row of a command script. Columns a command does not use are left
/// empty.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRecord {
    #[serde(rename = "type")]
    pub kind: CommandKind,
    /// Caller-chosen label tying rows to the same booking.
    pub booking: String,
    pub actor: Option<String>,
    pub at: DateTime<Utc>,
    pub vehicle: Option<VehicleId>,
    pub station: Option<StationId>,
    #[serde(alias = "start_time", alias = "startTime")]
    pub pickup: Option<DateTime<Utc>>,
    #[serde(rename = "return", alias = "expected_end_time", alias = "expectedEndTime")]
    pub return_at: Option<DateTime<Utc>>,
    pub method: Option<String>,
    pub insurance: Option<bool>,
    pub result: Option<i32>,
    pub reference: Option<String>,
    /// Provider signature for callbacks; left out, the replay signs as the
    /// sandbox provider.
    pub signature: Option<String>,
}

/// A validated command ready to be applied to the engine.
#[derive(Debug, Clone)]
pub enum Command {
    Book {
        actor: Actor,
        request: BookingRequest,
    },
    Pay {
        actor: Actor,
        method: PaymentMethod,
        purpose: PaymentPurpose,
    },
    /// Wallet provider notification for the booking's open wallet payment.
    Callback {
        result_code: i32,
        transaction_id: String,
        signature: Option<String>,
    },
    MarkPaid {
        actor: Actor,
        reference: String,
    },
    Transition {
        actor: Actor,
        event: BookingEvent,
    },
}

#[derive(Debug, Clone)]
pub struct ScriptedCommand {
    pub label: String,
    pub at: DateTime<Utc>,
    pub command: Command,
}

impl TryFrom<CommandRecord> for ScriptedCommand {
    type Error = RentalError;

    fn try_from(record: CommandRecord) -> Result<Self> {
        let actor = || -> Result<Actor> {
            record
                .actor
                .as_deref()
                .ok_or_else(|| missing("actor", record.kind))?
                .parse()
        };

        let command = match record.kind {
            CommandKind::Book => {
                let pickup = record.pickup.ok_or_else(|| missing("pickup", record.kind))?;
                let return_at = record.return_at.ok_or_else(|| missing("return", record.kind))?;
                Command::Book {
                    actor: actor()?,
                    request: BookingRequest {
                        vehicle_id: record
                            .vehicle
                            .clone()
                            .ok_or_else(|| missing("vehicle", record.kind))?,
                        station_id: record
                            .station
                            .clone()
                            .ok_or_else(|| missing("station", record.kind))?,
                        window: RentalWindow::new(pickup, return_at)?,
                        options: RentalOptions {
                            additional_insurance: record.insurance.unwrap_or(false),
                            ..RentalOptions::default()
                        },
                        pickup_note: None,
                    },
                }
            }
            CommandKind::Pay | CommandKind::PayRemainder => Command::Pay {
                actor: actor()?,
                method: record
                    .method
                    .as_deref()
                    .ok_or_else(|| missing("method", record.kind))?
                    .parse()?,
                purpose: if record.kind == CommandKind::Pay {
                    PaymentPurpose::Deposit
                } else {
                    PaymentPurpose::Remainder
                },
            },
            CommandKind::Callback => Command::Callback {
                result_code: record.result.ok_or_else(|| missing("result", record.kind))?,
                transaction_id: record.reference.clone().unwrap_or_default(),
                signature: record.signature.clone().filter(|s| !s.is_empty()),
            },
            CommandKind::MarkPaid => Command::MarkPaid {
                actor: actor()?,
                reference: record
                    .reference
                    .clone()
                    .ok_or_else(|| missing("reference", record.kind))?,
            },
            CommandKind::Confirm => transition(actor()?, BookingEvent::Confirm),
            CommandKind::Start => transition(actor()?, BookingEvent::StartCheckout),
            CommandKind::Complete => transition(actor()?, BookingEvent::Complete),
            CommandKind::Cancel => transition(actor()?, BookingEvent::Cancel),
        };

        Ok(Self {
            label: record.booking,
            at: record.at,
            command,
        })
    }
}

fn transition(actor: Actor, event: BookingEvent) -> Command {
    Command::Transition { actor, event }
}

fn missing(column: &str, kind: CommandKind) -> RentalError {
    RentalError::Validation(format!("column '{column}' is required for {kind:?} commands"))
}

/// Reads lifecycle commands from a CSV source.
///
/// Wraps `csv::Reader` with whitespace trimming and flexible record lengths,
/// and validates each row into a [`ScriptedCommand`].
pub struct CommandReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> CommandReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily reads and validates commands, one `Result` per row.
    pub fn commands(self) -> impl Iterator<Item = Result<ScriptedCommand>> {
        self.reader
            .into_deserialize::<CommandRecord>()
            .map(|row| ScriptedCommand::try_from(row?))
    }
}
