//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "CleanBiz";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Database schema version.
pub const DB_SCHEMA_VERSION: i32 = 2;

/// Format used for slot timestamps handed to customers and the LLM.
pub const SLOT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format used for parsed appointment times in tool results.
pub const PARSED_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Public id prefixes. Each id is the prefix followed by five random
/// ASCII letters or digits.
pub mod id_prefix {
    pub const BOOKING: &str = "BK";
    pub const LEAD: &str = "LD";
    pub const INVOICE: &str = "INV";
    pub const PAYMENT: &str = "PY";
    pub const CHAT: &str = "CH";
    pub const CLEANER: &str = "CL";
    pub const CUSTOMER: &str = "CU";
}

/// Length of the random part of a public id.
pub const ID_SUFFIX_LEN: usize = 5;

/// Canonical service types after normalization.
pub mod service_type {
    pub const STANDARD: &str = "standard";
    pub const DEEP: &str = "deep";
    pub const MOVE_IN_MOVE_OUT: &str = "moveinmoveout";
    pub const AIRBNB: &str = "airbnb";

    /// All canonical service types.
    pub const ALL: &[&str] = &[STANDARD, DEEP, MOVE_IN_MOVE_OUT, AIRBNB];
}

/// Recurrence options for bookings.
pub mod recurring {
    pub const ONE_TIME: &str = "one-time";
    pub const WEEKLY: &str = "weekly";
    pub const BIWEEKLY: &str = "biweekly";
    pub const MONTHLY: &str = "monthly";

    pub const ALL: &[&str] = &[ONE_TIME, WEEKLY, BIWEEKLY, MONTHLY];
}

/// Payment status values.
pub mod payment_status {
    pub const PENDING: &str = "PENDING";
    pub const COMPLETED: &str = "COMPLETED";
    pub const SUBMITTED: &str = "SUBMITTED";
    pub const APPROVED: &str = "APPROVED";
    pub const REJECTED: &str = "REJECTED";
    pub const FAILED: &str = "FAILED";

    pub const ALL: &[&str] = &[PENDING, COMPLETED, SUBMITTED, APPROVED, REJECTED, FAILED];
}

/// Cleaner assignment strategies.
pub mod job_assignment {
    pub const HIGH_RATED: &str = "high_rated";
    pub const ALL_AVAILABLE: &str = "all_available";
}

/// Chat message roles.
pub mod role {
    pub const SYSTEM: &str = "system";
    pub const USER: &str = "user";
    pub const ASSISTANT: &str = "assistant";
    pub const TOOL: &str = "tool";
}

/// Agent tool names as exposed to the language model.
pub mod tools {
    pub const CHECK_AVAILABILITY: &str = "check_availability";
    pub const BOOK_APPOINTMENT: &str = "bookAppointment";
    pub const CURRENT_TIME: &str = "current_time";
    pub const CALCULATE_TOTAL: &str = "calculateTotal";
    pub const RESCHEDULE_APPOINTMENT: &str = "reschedule_appointment";
    pub const CANCEL_APPOINTMENT: &str = "cancel_appointment";
}

/// Notification kinds recorded by the notification tracker.
pub mod notification_kind {
    pub const BOOKING_CONFIRMATION: &str = "booking_confirmation";
    pub const PAYMENT_REMINDER: &str = "payment_reminder";
    pub const APPOINTMENT_REMINDER: &str = "appointment_reminder";
    pub const RESCHEDULED: &str = "booking_rescheduled";
    pub const CANCELLED: &str = "booking_cancelled";
    pub const RELEASED: &str = "booking_released";
    pub const LEAD_OUTREACH: &str = "lead_outreach";
    pub const LEAD_CALL: &str = "lead_call";
    pub const FINAL_REMINDER: &str = "final_reminder";
    pub const CLEANER_REMINDER: &str = "cleaner_reminder";
    pub const FOLLOW_UP: &str = "post_service_followup";
}

/// Default fallback reply when the agent cannot phrase a response.
pub const AGENT_FALLBACK_REPLY: &str =
    "I'm sorry, I encountered an error processing the response.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_types() {
        assert_eq!(service_type::ALL.len(), 4);
        assert!(service_type::ALL.contains(&"airbnb"));
    }

    #[test]
    fn test_payment_statuses_are_uppercase() {
        for s in payment_status::ALL {
            assert_eq!(*s, s.to_uppercase());
        }
    }
}
