//! Tools the booking agent can call, and their dispatch.

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use cb_api::{FunctionCall, ToolSpec};
use cb_core::constants::tools;
use cb_core::error::{CbError, CbResult};
use cb_models::{Business, Chat, Customer};

use super::summary;
use super::AgentService;
use crate::booking::{booking_result_json, RescheduleOutcome};
use crate::datetime;
use crate::pricing::{self, summary_text};

/// Function schemas offered to the model on every turn.
pub fn tool_specs() -> Vec<ToolSpec> {
    let no_args = json!({"type": "object", "properties": {}});
    vec![
        ToolSpec::function(
            tools::CHECK_AVAILABILITY,
            "Check if a specific date and time is available for booking a cleaning appointment",
            json!({
                "type": "object",
                "properties": {
                    "date": {
                        "type": "string",
                        "description": "The date and time to check, in natural language (e.g. 'tomorrow at 2pm', 'next Monday at 10am')"
                    }
                },
                "required": ["date"]
            }),
        ),
        ToolSpec::function(
            tools::BOOK_APPOINTMENT,
            "Book a cleaning appointment with the collected customer information",
            no_args.clone(),
        ),
        ToolSpec::function(
            tools::CURRENT_TIME,
            "Get the current date and time in the business's timezone",
            no_args.clone(),
        ),
        ToolSpec::function(
            tools::CALCULATE_TOTAL,
            "Calculate the total price for a cleaning based on property details and selected add-ons",
            no_args,
        ),
        ToolSpec::function(
            tools::RESCHEDULE_APPOINTMENT,
            "Move an existing appointment to a new date and time",
            json!({
                "type": "object",
                "properties": {
                    "booking_id": {"type": "string", "description": "The booking id, e.g. BKab12C"},
                    "new_date_time": {"type": "string", "description": "The new date and time in natural language"},
                    "reason": {"type": "string", "description": "Why the customer is rescheduling"}
                },
                "required": ["booking_id", "new_date_time"]
            }),
        ),
        ToolSpec::function(
            tools::CANCEL_APPOINTMENT,
            "Cancel an existing appointment",
            json!({
                "type": "object",
                "properties": {
                    "booking_id": {"type": "string", "description": "The booking id, e.g. BKab12C"},
                    "reason": {"type": "string", "description": "Why the customer is cancelling"}
                },
                "required": ["booking_id"]
            }),
        ),
    ]
}

fn is_known_tool(name: &str) -> bool {
    [
        tools::CHECK_AVAILABILITY,
        tools::BOOK_APPOINTMENT,
        tools::CURRENT_TIME,
        tools::CALCULATE_TOTAL,
        tools::RESCHEDULE_APPOINTMENT,
        tools::CANCEL_APPOINTMENT,
    ]
    .contains(&name)
}

/// `{success: false, error}` as the model sees a failed tool.
pub fn failure(error: impl std::fmt::Display) -> String {
    json!({"success": false, "error": error.to_string()}).to_string()
}

fn arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).map(str::trim).filter(|s| !s.is_empty())
}

impl AgentService {
    /// Run one tool call. The result is what goes back to the model: JSON
    /// for most tools, plain text for `current_time`, and an `Error: ...`
    /// line when the call itself is malformed.
    pub async fn execute_tool(
        &self,
        business: &Business,
        chat: &mut Chat,
        call: &FunctionCall,
        now: DateTime<Utc>,
    ) -> String {
        debug!("tool call {} args={}", call.name, call.arguments);
        if !is_known_tool(&call.name) {
            return format!("Error: Tool '{}' not found", call.name);
        }
        let args = match call.parsed_arguments() {
            Ok(args) => args,
            Err(_) => return "Error: Invalid JSON in tool arguments".to_string(),
        };

        match call.name.as_str() {
            tools::CURRENT_TIME => {
                datetime::format_current_time(now, self.bookings.availability().timezone_of(business))
            }
            tools::CHECK_AVAILABILITY => {
                let Some(date) = arg(&args, "date") else {
                    return "Error: Missing date parameter for check_availability".to_string();
                };
                match self.bookings.availability().check_availability_at(business, date, now) {
                    Ok(check) => serde_json::to_string(&check).unwrap_or_else(failure),
                    Err(e) => failure(e),
                }
            }
            tools::CALCULATE_TOTAL => self.calculate_total(business, chat).unwrap_or_else(failure),
            tools::BOOK_APPOINTMENT => self.book_appointment(business, chat, now).await,
            tools::RESCHEDULE_APPOINTMENT => self.reschedule_appointment(business, &args, now),
            tools::CANCEL_APPOINTMENT => self.cancel_appointment(business, &args, now),
            other => format!("Error: Tool '{other}' not found"),
        }
    }

    /// Price the chat summary, using the customer's own prices when the
    /// summary email matches a known customer.
    fn calculate_total(&self, business: &Business, chat: &Chat) -> CbResult<String> {
        let business_id = business
            .id
            .ok_or_else(|| CbError::Database("business has no id".into()))?;
        let conn = self.ctx.database.conn()?;
        let email = summary_text(&chat.summary, "email");
        let customer = match email.as_deref() {
            Some(email) => Customer::find_by_contact(&conn, business_id, None, Some(email))?,
            None => None,
        };
        let breakdown = pricing::quote(&conn, business, customer.as_ref(), &chat.summary)?;
        Ok(json!({"success": true, "result": breakdown}).to_string())
    }

    /// Re-extract the summary from the whole conversation, store it, then
    /// book from it.
    async fn book_appointment(&self, business: &Business, chat: &mut Chat, now: DateTime<Utc>) -> String {
        match self.refresh_summary(chat).await {
            Ok(()) => {}
            Err(e) => return failure(e),
        }
        match self.bookings.book_chat_at(business, chat, now) {
            Ok(created) => {
                info!("agent booked {} for chat {}", created.booking.booking_id, chat.chat_id);
                booking_result_json(&created).to_string()
            }
            Err(e) => {
                warn!("agent booking for chat {} failed: {e}", chat.chat_id);
                failure(e)
            }
        }
    }

    fn reschedule_appointment(&self, business: &Business, args: &Value, now: DateTime<Utc>) -> String {
        let (Some(booking_id), Some(new_time)) = (arg(args, "booking_id"), arg(args, "new_date_time")) else {
            return failure("booking_id and new_date_time are required");
        };
        match self
            .bookings
            .reschedule_at(business, booking_id, new_time, arg(args, "reason"), now)
        {
            Ok(RescheduleOutcome::Moved(booking)) => json!({
                "success": true,
                "message": "Appointment rescheduled successfully",
                "booking_id": booking.booking_id,
                "new_date_time": booking.starts_at().format("%Y-%m-%d %H:%M").to_string(),
            })
            .to_string(),
            Ok(RescheduleOutcome::Unavailable { alternative_slots }) => json!({
                "success": false,
                "error": "The requested time is not available",
                "alternative_slots": alternative_slots,
            })
            .to_string(),
            Err(e) => failure(e),
        }
    }

    fn cancel_appointment(&self, business: &Business, args: &Value, now: DateTime<Utc>) -> String {
        let Some(booking_id) = arg(args, "booking_id") else {
            return failure("booking_id is required");
        };
        match self.bookings.cancel_at(business, booking_id, arg(args, "reason"), now) {
            Ok(booking) => json!({
                "success": true,
                "message": "Appointment cancelled successfully",
                "booking_id": booking.booking_id,
            })
            .to_string(),
            Err(e) => failure(e),
        }
    }

    /// Extract a fresh summary and merge it into the stored one.
    pub(crate) async fn refresh_summary(&self, chat: &mut Chat) -> CbResult<()> {
        let llm = self.ctx.require_llm()?;
        let messages = {
            let conn = self.ctx.database.conn()?;
            chat.messages(&conn)?
        };
        let fresh = summary::extract_conversation_summary(llm.as_ref(), &self.ctx.config.llm, &messages).await;
        summary::merge_into_stored(&mut chat.summary, &fresh);
        let conn = self.ctx.database.conn()?;
        chat.save(&conn)?;
        Ok(())
    }
}
