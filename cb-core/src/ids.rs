//! Public identifier generation.
//!
//! Records carry a short public id next to their integer row id. Public ids
//! are a type prefix followed by random ASCII letters and digits.

use rand::distributions::Alphanumeric;
use rand::Rng;

use crate::constants::ID_SUFFIX_LEN;

/// Generate a public id such as `BK4fZ9q`.
pub fn generate_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{prefix}{suffix}")
}

/// Generate a business id in the `BUS-nnnn` form.
pub fn generate_business_id() -> String {
    let n: u32 = rand::thread_rng().gen_range(1000..=9999);
    format!("BUS-{n}")
}

/// Whether `id` looks like an id produced by [`generate_id`] with `prefix`.
pub fn has_prefix(id: &str, prefix: &str) -> bool {
    id.strip_prefix(prefix)
        .map(|rest| rest.len() == ID_SUFFIX_LEN && rest.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or(false)
}

/// Derive a machine name for a custom add-on from its display name.
///
/// Lowercases, collapses every run of non-alphanumeric characters into a
/// single `_`, and trims leading and trailing underscores.
pub fn slugify_addon_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_sep = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::id_prefix;

    #[test]
    fn test_generate_id_shape() {
        let id = generate_id(id_prefix::BOOKING);
        assert!(id.starts_with("BK"));
        assert_eq!(id.len(), 2 + ID_SUFFIX_LEN);
        assert!(has_prefix(&id, id_prefix::BOOKING));
        assert!(!has_prefix(&id, id_prefix::LEAD));
    }

    #[test]
    fn test_generate_id_varies() {
        let a = generate_id("INV");
        let b = generate_id("INV");
        let c = generate_id("INV");
        assert!(a != b || b != c);
    }

    #[test]
    fn test_business_id_range() {
        for _ in 0..50 {
            let id = generate_business_id();
            let n: u32 = id.strip_prefix("BUS-").unwrap().parse().unwrap();
            assert!((1000..=9999).contains(&n));
        }
    }

    #[test]
    fn test_slugify_addon_name() {
        assert_eq!(slugify_addon_name("Inside Microwave"), "inside_microwave");
        assert_eq!(slugify_addon_name("  Wall  Washing!! "), "wall_washing");
        assert_eq!(slugify_addon_name("Pet-hair / Removal"), "pet_hair_removal");
        assert_eq!(slugify_addon_name("---"), "");
    }
}
