use crate::application::settlement::SettlementCoordinator;
use crate::domain::booking::{BookingEvent, BookingId};
use crate::domain::identity::RequestContext;
use crate::domain::payment::PaymentMethod;
use crate::domain::ports::GatewayCallback;
use crate::error::{RentalError, Result};
use crate::infrastructure::gateway::SandboxGateway;
use crate::interfaces::csv::command_reader::{Command, ScriptedCommand};
use std::collections::HashMap;
use tracing::debug;

/// Applies scripted commands to a coordinator, resolving the script's booking
/// labels to real booking ids.
pub struct Replay<'a> {
    engine: &'a SettlementCoordinator,
    provider: Option<&'a SandboxGateway>,
    ids: HashMap<String, BookingId>,
    labels: HashMap<BookingId, String>,
}

impl<'a> Replay<'a> {
    pub fn new(engine: &'a SettlementCoordinator) -> Self {
        Self {
            engine,
            provider: None,
            ids: HashMap::new(),
            labels: HashMap::new(),
        }
    }

    /// Callback rows without a signature are signed by `provider`.
    pub fn with_provider(mut self, provider: &'a SandboxGateway) -> Self {
        self.provider = Some(provider);
        self
    }

    /// The script label a booking was created under, if it came from this run.
    pub fn label_of(&self, id: &BookingId) -> Option<&str> {
        self.labels.get(id).map(String::as_str)
    }

    pub async fn apply(&mut self, scripted: ScriptedCommand) -> Result<()> {
        let ScriptedCommand {
            label,
            at,
            command,
        } = scripted;
        debug!(label = %label, command = ?command, "applying command");

        match command {
            Command::Book { actor, request } => {
                if self.ids.contains_key(&label) {
                    return Err(RentalError::Conflict(format!(
                        "booking label '{label}' is already in use"
                    )));
                }
                let booking = self
                    .engine
                    .create_booking(&RequestContext::new(actor, at), request)
                    .await?;
                self.ids.insert(label.clone(), booking.id);
                self.labels.insert(booking.id, label);
            }
            Command::Pay {
                actor,
                method,
                purpose,
            } => {
                let id = self.resolve(&label)?;
                self.engine
                    .initiate_payment(&RequestContext::new(actor, at), id, method, purpose)
                    .await?;
            }
            Command::Callback {
                result_code,
                transaction_id,
                signature,
            } => {
                let id = self.resolve(&label)?;
                let payment = self
                    .engine
                    .payments_for(id)
                    .await?
                    .into_iter()
                    .rev()
                    .find(|p| p.method == PaymentMethod::Wallet && p.status.is_open())
                    .ok_or_else(|| RentalError::not_found("open wallet payment", &label))?;
                let callback = GatewayCallback {
                    order_ref: payment.order_ref,
                    transaction_id,
                    result_code,
                    message: None,
                    signature: signature.clone().unwrap_or_default(),
                };
                let callback = match (signature, self.provider) {
                    (None, Some(provider)) => provider.sign(callback)?,
                    _ => callback,
                };
                self.engine.handle_gateway_callback(callback, at).await?;
            }
            Command::MarkPaid { actor, reference } => {
                let id = self.resolve(&label)?;
                let payment = self
                    .engine
                    .payments_for(id)
                    .await?
                    .into_iter()
                    .rev()
                    .find(|p| p.method.is_manual() && p.status.is_open())
                    .ok_or_else(|| RentalError::not_found("open manual payment", &label))?;
                self.engine
                    .mark_paid_manually(&RequestContext::new(actor, at), id, payment.purpose, &reference)
                    .await?;
            }
            Command::Transition { actor, event } => {
                let id = self.resolve(&label)?;
                let ctx = RequestContext::new(actor, at);
                match event {
                    BookingEvent::Confirm => self.engine.confirm(&ctx, id).await?,
                    BookingEvent::StartCheckout => self.engine.start_rental(&ctx, id).await?,
                    BookingEvent::Complete => self.engine.complete_rental(&ctx, id).await?,
                    BookingEvent::Cancel => self.engine.cancel(&ctx, id).await?,
                };
            }
        }
        Ok(())
    }

    fn resolve(&self, label: &str) -> Result<BookingId> {
        self.ids
            .get(label)
            .copied()
            .ok_or_else(|| RentalError::not_found("booking label", label))
    }
}
