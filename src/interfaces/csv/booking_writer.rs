use crate::domain::booking::Booking;
use crate::domain::money::Money;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// One output row. Money is written through `Display` so values come out
/// without trailing zeros.
#[derive(Debug, Serialize)]
struct BookingRow<'a> {
    booking: &'a str,
    code: &'a str,
    status: String,
    days: i64,
    hours: i64,
    base_price: String,
    total_due: String,
    deposit_due: String,
    deposit_paid: String,
    cancellation_fee: String,
    refund: String,
    late_fee: String,
    balance_due: String,
}

impl<'a> BookingRow<'a> {
    fn new(label: &'a str, booking: &'a Booking) -> Self {
        let (cancellation_fee, refund) = booking
            .cancellation
            .as_ref()
            .map_or((Money::ZERO, Money::ZERO), |c| (c.fee, c.refund));
        let (late_fee, balance_due) = booking
            .return_settlement
            .as_ref()
            .map_or((Money::ZERO, Money::ZERO), |s| (s.late_fee, s.balance_due));

        Self {
            booking: label,
            code: &booking.code,
            status: booking.status.to_string(),
            days: booking.quote.duration_days,
            hours: booking.quote.remainder_hours,
            base_price: booking.quote.base_price.to_string(),
            total_due: booking.quote.total_due.to_string(),
            deposit_due: booking.quote.deposit_due.to_string(),
            deposit_paid: booking.deposit_paid.to_string(),
            cancellation_fee: cancellation_fee.to_string(),
            refund: refund.to_string(),
            late_fee: late_fee.to_string(),
            balance_due: balance_due.to_string(),
        }
    }
}

/// Writes the final booking report as CSV.
pub struct BookingWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BookingWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    /// Writes one row per `(label, booking)` pair, in the order given.
    pub fn write_bookings<'a>(
        &mut self,
        bookings: impl IntoIterator<Item = (&'a str, &'a Booking)>,
    ) -> Result<()> {
        for (label, booking) in bookings {
            self.writer.serialize(BookingRow::new(label, booking))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
