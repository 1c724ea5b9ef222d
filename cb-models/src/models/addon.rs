//! The twelve standard add-on services and per-add-on value tables.

use serde::{Deserialize, Serialize};

/// A standard add-on every business can price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Addon {
    Dishes,
    Laundry,
    Windows,
    Pets,
    Fridge,
    Oven,
    Baseboard,
    Blinds,
    Green,
    Cabinets,
    Patio,
    Garage,
}

impl Addon {
    pub const ALL: [Addon; 12] = [
        Addon::Dishes,
        Addon::Laundry,
        Addon::Windows,
        Addon::Pets,
        Addon::Fridge,
        Addon::Oven,
        Addon::Baseboard,
        Addon::Blinds,
        Addon::Green,
        Addon::Cabinets,
        Addon::Patio,
        Addon::Garage,
    ];

    /// Position in [`Addon::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }

    /// Key used in booking summaries and forms.
    pub fn summary_key(self) -> &'static str {
        match self {
            Addon::Dishes => "addonDishes",
            Addon::Laundry => "addonLaundryLoads",
            Addon::Windows => "addonWindowCleaning",
            Addon::Pets => "addonPetsCleaning",
            Addon::Fridge => "addonFridgeCleaning",
            Addon::Oven => "addonOvenCleaning",
            Addon::Baseboard => "addonBaseboard",
            Addon::Blinds => "addonBlinds",
            Addon::Green => "addonGreenCleaning",
            Addon::Cabinets => "addonCabinetsCleaning",
            Addon::Patio => "addonPatioSweeping",
            Addon::Garage => "addonGarageSweeping",
        }
    }

    /// Short alias accepted in place of the summary key.
    pub fn alias(self) -> &'static str {
        match self {
            Addon::Dishes => "dishes",
            Addon::Laundry => "laundry",
            Addon::Windows => "windows",
            Addon::Pets => "pets",
            Addon::Fridge => "fridge",
            Addon::Oven => "oven",
            Addon::Baseboard => "baseboard",
            Addon::Blinds => "blinds",
            Addon::Green => "green",
            Addon::Cabinets => "cabinets",
            Addon::Patio => "patio",
            Addon::Garage => "garage",
        }
    }

    /// Column suffix shared by `addon_price_*` and `addon_*` columns.
    pub fn column(self) -> &'static str {
        match self {
            Addon::Windows => "window",
            other => other.alias(),
        }
    }

    /// Price column on `business_settings` and `customer_pricing`.
    pub fn price_column(self) -> String {
        format!("addon_price_{}", self.column())
    }

    /// Quantity column on `bookings`.
    pub fn quantity_column(self) -> String {
        format!("addon_{}", self.column())
    }

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Addon::Dishes => "Dishes",
            Addon::Laundry => "Laundry loads",
            Addon::Windows => "Window cleaning",
            Addon::Pets => "Pet cleaning",
            Addon::Fridge => "Fridge cleaning",
            Addon::Oven => "Oven cleaning",
            Addon::Baseboard => "Baseboards",
            Addon::Blinds => "Blinds",
            Addon::Green => "Green cleaning",
            Addon::Cabinets => "Cabinet cleaning",
            Addon::Patio => "Patio sweeping",
            Addon::Garage => "Garage sweeping",
        }
    }

    /// Resolve a summary key, alias or column name.
    pub fn parse(name: &str) -> Option<Addon> {
        Addon::ALL
            .into_iter()
            .find(|a| a.summary_key() == name || a.alias() == name || a.column() == name)
    }
}

/// One value per standard add-on.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AddonTable<T>(pub [T; 12]);

impl<T: Copy> AddonTable<T> {
    pub fn get(&self, addon: Addon) -> T {
        self.0[addon.index()]
    }

    pub fn set(&mut self, addon: Addon, value: T) {
        self.0[addon.index()] = value;
    }

    /// Iterate `(addon, value)` pairs in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Addon, T)> + '_ {
        Addon::ALL.into_iter().map(move |a| (a, self.get(a)))
    }
}
