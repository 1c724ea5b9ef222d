//! Quote calculation.
//!
//! A quote is a sum of linear terms over a booking summary: a per-bedroom and
//! per-bathroom price, a square-footage multiplier chosen by service type,
//! flat base and deposit fees, the twelve standard add-ons and any custom
//! add-ons of the business, plus tax on the whole.
//!
//! Summaries are loose JSON objects as extracted from a chat or posted by a
//! booking form, so every numeric field may arrive as a number, a numeric
//! string, an empty string or not at all.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use cb_core::constants::service_type;
use cb_core::error::{CbError, CbResult};
use cb_core::money::round_currency;
use cb_models::{Addon, AddonTable, Business, Customer, CustomAddon, PriceOverrides, PriceSheet};

/// Map free-form service wording onto a canonical service type.
pub fn normalize_service_type(raw: &str) -> &'static str {
    let s = raw.to_lowercase().replace(' ', "");
    if s.contains("regular") || s.contains("standard") {
        service_type::STANDARD
    } else if s.contains("deep") {
        service_type::DEEP
    } else if s.contains("moveinmoveout") || s.contains("move-in") || s.contains("moveout") {
        service_type::MOVE_IN_MOVE_OUT
    } else if s.contains("airbnb") {
        service_type::AIRBNB
    } else {
        service_type::STANDARD
    }
}

/// Square-footage multiplier for a canonical service type.
pub fn sqft_multiplier(prices: &PriceSheet, service: &str) -> f64 {
    match service {
        service_type::DEEP => prices.sqft_multiplier_deep,
        service_type::MOVE_IN_MOVE_OUT => prices.sqft_multiplier_moveinout,
        service_type::AIRBNB => prices.sqft_multiplier_airbnb,
        _ => prices.sqft_multiplier_standard,
    }
}

// ─── Summary field access ───────────────────────────────────────────────────

/// Whether a summary value counts as "not provided".
pub fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        _ => false,
    }
}

/// Read a text field, trimmed. Numbers are rendered as text.
pub fn summary_text(summary: &Value, key: &str) -> Option<String> {
    match summary.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse one numeric summary value. Blank counts as 0.
fn parse_number(key: &str, value: Option<&Value>) -> CbResult<f64> {
    if is_blank(value) {
        return Ok(0.0);
    }
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().replace(',', "").parse::<f64>().ok(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    match parsed {
        Some(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(CbError::Validation(format!(
            "Invalid numeric value for {key}: {}",
            value.map(|v| v.to_string()).unwrap_or_default()
        ))),
    }
}

/// First non-blank of `keys`, parsed as a number.
pub fn summary_number(summary: &Value, keys: &[&str]) -> CbResult<f64> {
    for key in keys {
        let value = summary.get(*key);
        if !is_blank(value) {
            return parse_number(key, value);
        }
    }
    Ok(0.0)
}

/// Whole-unit quantity (add-ons, rooms stored on a booking).
pub fn summary_quantity(summary: &Value, keys: &[&str]) -> CbResult<i64> {
    Ok(summary_number(summary, keys)?.trunc() as i64)
}

/// Standard add-on quantities, read from each add-on's summary key or alias.
pub fn addon_quantities(summary: &Value) -> CbResult<AddonTable<i64>> {
    let mut table = AddonTable::default();
    for addon in Addon::ALL {
        table.set(addon, summary_quantity(summary, &[addon.summary_key(), addon.alias()])?);
    }
    Ok(table)
}

/// Σ quantity × price over the twelve standard add-ons.
pub fn calculate_addons_amount(prices: &PriceSheet, summary: &Value) -> CbResult<f64> {
    let quantities = addon_quantities(summary)?;
    Ok(quantities
        .iter()
        .map(|(addon, qty)| qty as f64 * prices.addons.get(addon))
        .sum())
}

/// One priced custom add-on on a quote.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomAddonLine {
    pub addon_id: i64,
    pub name: String,
    pub data_name: String,
    pub price: f64,
    pub qty: i64,
    pub total: f64,
}

/// Price the custom add-ons of a business. A quantity is looked up in
/// `summary.customAddons[data_name]` first, then `summary[data_name]`.
///
/// Returns the total and the lines with a positive quantity.
pub fn calculate_custom_addons(
    addons: &[CustomAddon],
    summary: &Value,
) -> CbResult<(f64, Vec<CustomAddonLine>)> {
    let nested = summary.get("customAddons").filter(|v| v.is_object());
    let mut lines = Vec::new();
    let mut total = 0.0;

    for addon in addons {
        let qty = match nested.and_then(|n| n.get(&addon.data_name)) {
            Some(v) if !is_blank(Some(v)) => parse_number(&addon.data_name, Some(v))?.trunc() as i64,
            _ => summary_quantity(summary, &[addon.data_name.as_str()])?,
        };
        if qty <= 0 {
            continue;
        }
        let line_total = qty as f64 * addon.price;
        total += line_total;
        lines.push(CustomAddonLine {
            addon_id: addon.id.unwrap_or_default(),
            name: addon.name.clone(),
            data_name: addon.data_name.clone(),
            price: addon.price,
            qty,
            total: round_currency(line_total),
        });
    }

    Ok((total, lines))
}

// ─── Quote ──────────────────────────────────────────────────────────────────

/// Itemized quote. Money values are rounded to cents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base_price: f64,
    pub sqft_price: f64,
    pub bedroom_total: f64,
    pub bathroom_total: f64,
    pub addons_total: f64,
    pub custom_addon_total: f64,
    pub sub_total: f64,
    pub tax: f64,
    pub tax_rate: f64,
    pub total_amount: f64,
    pub used_custom_pricing: bool,
    /// `custom` when customer overrides applied, else `standard`.
    pub pricing_type: String,
    pub service_type: String,
    pub custom_addon_lines: Vec<CustomAddonLine>,
}

/// Quote a summary against a price sheet, optionally with customer overrides.
pub fn calculate_amount(
    settings: &PriceSheet,
    custom_addons: &[CustomAddon],
    summary: &Value,
    overrides: Option<&PriceOverrides>,
) -> CbResult<PriceBreakdown> {
    let (prices, used_custom_pricing) = match overrides {
        Some(o) => settings.with_overrides(o),
        None => (*settings, false),
    };

    let raw_service = summary_text(summary, "serviceType")
        .or_else(|| summary_text(summary, "service_type"))
        .unwrap_or_default();
    let service = normalize_service_type(&raw_service);

    let bedrooms = summary_number(summary, &["bedrooms"])?;
    let bathrooms = summary_number(summary, &["bathrooms"])?;
    let square_feet = summary_number(summary, &["squareFeet", "area"])?;

    let sqft_price = sqft_multiplier(&prices, service) * square_feet;
    let bedroom_total = bedrooms * prices.bedroom_price;
    let bathroom_total = bathrooms * prices.bathroom_price;
    let base_total =
        bedroom_total + bathroom_total + prices.base_price + prices.deposit_fee + sqft_price;

    let addons_total = calculate_addons_amount(&prices, summary)?;
    let (custom_addon_total, custom_addon_lines) = calculate_custom_addons(custom_addons, summary)?;

    let sub_total = base_total + addons_total + custom_addon_total;
    let tax = sub_total * prices.tax_percent / 100.0;
    let total_amount = sub_total + tax;

    Ok(PriceBreakdown {
        base_price: round_currency(prices.base_price),
        sqft_price: round_currency(sqft_price),
        bedroom_total: round_currency(bedroom_total),
        bathroom_total: round_currency(bathroom_total),
        addons_total: round_currency(addons_total),
        custom_addon_total: round_currency(custom_addon_total),
        sub_total: round_currency(sub_total),
        tax: round_currency(tax),
        tax_rate: prices.tax_percent,
        total_amount: round_currency(total_amount),
        used_custom_pricing,
        pricing_type: if used_custom_pricing { "custom" } else { "standard" }.to_string(),
        service_type: service.to_string(),
        custom_addon_lines,
    })
}

/// Quote a summary for a business, applying the customer's overrides when
/// the customer has any.
pub fn quote(
    conn: &Connection,
    business: &Business,
    customer: Option<&Customer>,
    summary: &Value,
) -> CbResult<PriceBreakdown> {
    let settings = business.settings(conn)?;
    let custom_addons = business.custom_addons(conn)?;
    let overrides = match customer {
        Some(c) => c.pricing(conn)?.map(|p| p.overrides),
        None => None,
    };
    calculate_amount(&settings.prices, &custom_addons, summary, overrides.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use cb_models::PriceField;
    use serde_json::json;

    fn sheet() -> PriceSheet {
        let mut s = PriceSheet {
            bedroom_price: 20.0,
            bathroom_price: 15.0,
            deposit_fee: 10.0,
            tax_percent: 8.25,
            base_price: 50.0,
            sqft_multiplier_standard: 0.05,
            sqft_multiplier_deep: 0.1,
            sqft_multiplier_moveinout: 0.12,
            sqft_multiplier_airbnb: 0.07,
            ..PriceSheet::default()
        };
        s.addons.set(Addon::Dishes, 10.0);
        s.addons.set(Addon::Windows, 5.0);
        s.addons.set(Addon::Garage, 25.0);
        s
    }

    fn custom(id: i64, name: &str, price: f64) -> CustomAddon {
        let mut a = CustomAddon::new(1, name, price);
        a.id = Some(id);
        a
    }

    #[test]
    fn test_normalize_service_type() {
        assert_eq!(normalize_service_type("Regular Cleaning"), "standard");
        assert_eq!(normalize_service_type("standard"), "standard");
        assert_eq!(normalize_service_type("Deep clean"), "deep");
        assert_eq!(normalize_service_type("Move-In"), "moveinmoveout");
        assert_eq!(normalize_service_type("move out"), "moveinmoveout");
        assert_eq!(normalize_service_type("Move In Move Out"), "moveinmoveout");
        assert_eq!(normalize_service_type("AirBnB turnover"), "airbnb");
        assert_eq!(normalize_service_type("something else"), "standard");
        assert_eq!(normalize_service_type(""), "standard");
    }

    #[test]
    fn test_standard_quote() {
        let summary = json!({
            "serviceType": "regular",
            "bedrooms": 3,
            "bathrooms": "2",
            "squareFeet": "1500",
            "addonDishes": 1,
            "windows": "2",
        });
        let q = calculate_amount(&sheet(), &[], &summary, None).unwrap();
        // 60 + 30 + 50 + 10 + 75
        assert_eq!(q.sqft_price, 75.0);
        assert_eq!(q.bedroom_total, 60.0);
        assert_eq!(q.bathroom_total, 30.0);
        assert_eq!(q.addons_total, 20.0);
        assert_eq!(q.sub_total, 245.0);
        assert_eq!(q.tax, 20.21);
        assert_eq!(q.total_amount, 265.21);
        assert_eq!(q.pricing_type, "standard");
        assert!(!q.used_custom_pricing);
        assert_eq!(q.service_type, "standard");
    }

    #[test]
    fn test_deep_uses_deep_multiplier_and_area_alias() {
        let summary = json!({"service_type": "deep", "area": 1000});
        let q = calculate_amount(&sheet(), &[], &summary, None).unwrap();
        assert_eq!(q.sqft_price, 100.0);
        assert_eq!(q.service_type, "deep");
    }

    #[test]
    fn test_missing_and_empty_values_count_as_zero() {
        let summary = json!({"serviceType": "", "bedrooms": "", "bathrooms": null});
        let q = calculate_amount(&sheet(), &[], &summary, None).unwrap();
        assert_eq!(q.sub_total, 60.0);
    }

    #[test]
    fn test_non_numeric_is_validation_error() {
        let summary = json!({"bedrooms": "three"});
        let err = calculate_amount(&sheet(), &[], &summary, None).unwrap_err();
        assert!(matches!(err, CbError::Validation(_)));
        assert!(err.to_string().contains("bedrooms"));
    }

    #[test]
    fn test_custom_addons_nested_and_top_level() {
        let addons = vec![custom(1, "Inside Microwave", 12.5), custom(2, "Wall Wash", 30.0)];
        let summary = json!({
            "customAddons": {"inside_microwave": 2},
            "wall_wash": "1",
        });
        let (total, lines) = calculate_custom_addons(&addons, &summary).unwrap();
        assert_eq!(total, 55.0);
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].qty, 2);
        assert_eq!(lines[0].total, 25.0);
        assert_eq!(lines[1].data_name, "wall_wash");
    }

    #[test]
    fn test_custom_addon_zero_quantity_skipped() {
        let addons = vec![custom(1, "Wall Wash", 30.0)];
        let (total, lines) = calculate_custom_addons(&addons, &json!({"wall_wash": 0})).unwrap();
        assert_eq!(total, 0.0);
        assert!(lines.is_empty());
    }

    #[test]
    fn test_customer_overrides() {
        let mut overrides = PriceOverrides::default();
        overrides.set(PriceField::BedroomPrice, Some(10.0));
        overrides.set(PriceField::TaxPercent, Some(0.0));
        let summary = json!({"bedrooms": 2});
        let q = calculate_amount(&sheet(), &[], &summary, Some(&overrides)).unwrap();
        assert_eq!(q.bedroom_total, 20.0);
        assert_eq!(q.tax, 0.0);
        assert_eq!(q.total_amount, 80.0);
        assert!(q.used_custom_pricing);
        assert_eq!(q.pricing_type, "custom");
    }

    #[test]
    fn test_empty_overrides_are_standard() {
        let q = calculate_amount(&sheet(), &[], &json!({}), Some(&PriceOverrides::default())).unwrap();
        assert!(!q.used_custom_pricing);
    }

    #[test]
    fn test_addon_primary_key_wins_over_alias() {
        let summary = json!({"addonGarageSweeping": 1, "garage": 5});
        assert_eq!(calculate_addons_amount(&sheet(), &summary).unwrap(), 25.0);
    }

    #[test]
    fn test_summary_text() {
        let summary = json!({"firstName": "  Ada ", "zipCode": 60601, "city": ""});
        assert_eq!(summary_text(&summary, "firstName").as_deref(), Some("Ada"));
        assert_eq!(summary_text(&summary, "zipCode").as_deref(), Some("60601"));
        assert_eq!(summary_text(&summary, "city"), None);
    }
}
