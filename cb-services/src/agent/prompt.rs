//! Prompt text for the booking agent.

use cb_core::money::format_usd;
use cb_models::{Addon, CustomAddon, PriceSheet};

/// System prompt for a conversation turn.
pub fn system_prompt(agent_name: &str, business_name: &str, agent_prompt: &str, business_context: &str) -> String {
    let mut prompt = format!(
        "You are {agent_name}, virtual customer support and sales representative for {business_name}. \
You are speaking with a potential customer.

## PRIMARY ROLE AND KNOWLEDGE SOURCE
Answer questions about cleaning services using ONLY the information provided by {business_name}. \
Do not make up information or use general cleaning knowledge the business has not provided.
"
    );

    if !agent_prompt.trim().is_empty() {
        prompt.push_str("\n## BUSINESS INSTRUCTIONS\n");
        prompt.push_str(agent_prompt.trim());
        prompt.push('\n');
    }
    if !business_context.is_empty() {
        prompt.push('\n');
        prompt.push_str(business_context);
        prompt.push('\n');
    }

    prompt.push_str(
        "
## TOOL USAGE
You have tools for the booking process. Use them whenever they apply:

1. check_availability: whenever the customer asks about a specific date or time.
   Pass the date and time as the customer said it (e.g. \"tomorrow at 2 PM\").
   If the slot is taken, offer the returned alternative slots.
2. calculateTotal: before booking, once property details are known.
3. bookAppointment: after availability is confirmed and you have the customer's
   first name, phone number, address, city, state, service type, bedrooms,
   bathrooms, square feet and appointment date and time.
4. current_time: when the customer asks what time or day it is.
5. reschedule_appointment: to move an existing booking to a new date and time.
6. cancel_appointment: to cancel an existing booking.

Never invent a price, a booking id or an available time; get them from the tools.
",
    );
    prompt
}

/// System prompt for phrasing tool results as the final reply.
pub fn response_prompt(agent_name: &str) -> String {
    format!(
        "You are {agent_name}, an assistant for a cleaning company. Write a natural, conversational reply \
based on the tool results. Do not mention tools, APIs or systems, and do not use phrases like \
\"the system shows\" or \"I checked and found\". Keep the reply friendly, professional and short. \
Always answer the customer's question directly first, then add context if needed.

For current_time results, reply with the time information only, for example \
\"It's currently 12:49 PM on Friday, March 14th, Central Time.\""
    )
}

/// System prompt for summary extraction.
pub fn summary_extraction_prompt() -> String {
    let mut prompt = String::from(
        "You extract customer booking information from a conversation between a customer and a cleaning \
company's agent. Read the whole conversation.

Respond ONLY with a valid JSON object containing these keys (empty string if not found):
- firstName, lastName: customer's name
- email: customer's email address
- phoneNumber: customer's phone number without spaces or dashes
- address1: street address only (no city, state or zip)
- city: city name
- state: state
- zipCode: 5-digit or 9-digit zip code
- squareFeet: square footage as a numeric string
- bedrooms: number of bedrooms as a numeric string
- bathrooms: number of bathrooms as a numeric string
- serviceType: requested service (e.g. \"standard\", \"deep\", \"move in/out\", \"airbnb\")
- appointmentDateTime: appointment date and time exactly as mentioned
- additionalNotes: special requests or notes
- detailSummary: one-sentence summary of the request
",
    );
    for addon in Addon::ALL {
        prompt.push_str(&format!("- {}: quantity of {}\n", addon.summary_key(), addon.label()));
    }
    prompt.push_str("\nReturn only the JSON object, with no explanation.");
    prompt
}

/// Pricing, services and add-ons the business has configured. Unset
/// prices are left out; an empty sheet gives an empty string.
pub fn business_context(prices: &PriceSheet, custom_addons: &[CustomAddon]) -> String {
    let mut sections = Vec::new();

    let mut pricing = vec!["## PRICING".to_string()];
    if prices.base_price > 0.0 {
        pricing.push(format!("Base price: {}", format_usd(prices.base_price)));
    }
    if prices.bedroom_price > 0.0 {
        pricing.push(format!("Per bedroom: {}", format_usd(prices.bedroom_price)));
    }
    if prices.bathroom_price > 0.0 {
        pricing.push(format!("Per bathroom: {}", format_usd(prices.bathroom_price)));
    }
    if prices.deposit_fee > 0.0 {
        pricing.push(format!("Deposit fee: {}", format_usd(prices.deposit_fee)));
    }
    if prices.tax_percent > 0.0 {
        pricing.push(format!("Tax rate: {}%", prices.tax_percent));
    }
    if pricing.len() > 1 {
        sections.push(pricing.join("\n"));
    }

    let services: Vec<String> = [
        ("Standard cleaning", prices.sqft_multiplier_standard),
        ("Deep cleaning", prices.sqft_multiplier_deep),
        ("Move-in/out cleaning", prices.sqft_multiplier_moveinout),
        ("Airbnb cleaning", prices.sqft_multiplier_airbnb),
    ]
    .iter()
    .filter(|(_, m)| *m > 0.0)
    .map(|(name, m)| format!("- {name}: {m} per sq ft"))
    .collect();
    if !services.is_empty() {
        sections.push(format!("## SERVICES\n{}", services.join("\n")));
    }

    let mut addons: Vec<String> = prices
        .addons
        .iter()
        .filter(|(_, price)| *price > 0.0)
        .map(|(addon, price)| format!("- {}: {} each", addon.label(), format_usd(price)))
        .collect();
    addons.extend(
        custom_addons
            .iter()
            .filter(|a| a.price > 0.0)
            .map(|a| format!("- {}: {} each", a.name, format_usd(a.price))),
    );
    if !addons.is_empty() {
        sections.push(format!("## ADD-ONS\n{}", addons.join("\n")));
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_mentions_business_and_tools() {
        let p = system_prompt("Sarah", "Sparkle Co", "We only serve Austin.", "");
        assert!(p.starts_with("You are Sarah"));
        assert!(p.contains("Sparkle Co"));
        assert!(p.contains("We only serve Austin."));
        assert!(p.contains("check_availability"));
        assert!(p.contains("bookAppointment"));
    }

    #[test]
    fn test_business_context_skips_unset_prices() {
        assert_eq!(business_context(&PriceSheet::default(), &[]), "");

        let mut prices = PriceSheet {
            bedroom_price: 20.0,
            sqft_multiplier_deep: 0.1,
            ..PriceSheet::default()
        };
        prices.addons.set(Addon::Oven, 15.0);
        let extra = CustomAddon::new(1, "Wall Washing", 30.0);
        let ctx = business_context(&prices, &[extra]);
        assert!(ctx.contains("Per bedroom: $20.00"));
        assert!(!ctx.contains("Per bathroom"));
        assert!(ctx.contains("- Deep cleaning: 0.1 per sq ft"));
        assert!(!ctx.contains("Standard cleaning"));
        assert!(ctx.contains("- Oven cleaning: $15.00 each"));
        assert!(ctx.contains("- Wall Washing: $30.00 each"));
    }

    #[test]
    fn test_extraction_prompt_lists_addons() {
        let p = summary_extraction_prompt();
        assert!(p.contains("addonDishes"));
        assert!(p.contains("appointmentDateTime"));
    }
}
