//! # Validation Module
//!
//! Input checks that run before anything touches the store.
//!
//! ## Validation Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Layer 1: Service facade                                               │
//! │  └── capability checks, identity resolution                            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── required names, quantities, catalog snapshots                     │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Store                                                        │
//! │  ├── UNIQUE till_no, one open till per teller                          │
//! │  └── guarded UPDATE predicates (state = 'pending' AND version = ?)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::ports::CatalogItem;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Placeholder upstream systems use for "no value".
const UNSET_MARKER: &str = "nan";

/// Largest quantity accepted on a single scan.
pub const MAX_LINE_QUANTITY: f64 = 10_000.0;

/// Rejects empty names and the `"nan"` placeholder.
///
/// ## Example
/// ```rust
/// use kassa_core::validation::validate_person;
///
/// assert!(validate_person("teller", "amina").is_ok());
/// assert!(validate_person("supervisor", "nan").is_err());
/// assert!(validate_person("supervisor", "  ").is_err());
/// ```
pub fn validate_person(field: &str, value: &str) -> ValidationResult<()> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(UNSET_MARKER) {
        return Err(ValidationError::required(field));
    }
    Ok(())
}

/// Quantities must be finite, positive and below [`MAX_LINE_QUANTITY`].
pub fn validate_quantity(quantity: f64) -> ValidationResult<()> {
    if !quantity.is_finite() || quantity <= 0.0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }
    if quantity > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 0,
            max: MAX_LINE_QUANTITY as i64,
        });
    }
    Ok(())
}

/// A catalog hit can only be sold if it has a code and a till price.
pub fn validate_catalog_item(item: &CatalogItem) -> ValidationResult<()> {
    if item.item_code.trim().is_empty() {
        return Err(ValidationError::required("item_code"));
    }
    if item.till_price.is_zero() {
        return Err(ValidationError::MustBePositive {
            field: "till_price".to_string(),
        });
    }
    Ok(())
}

/// Till numbers are positive; `0` means "no till".
pub fn validate_till(till_num: i64) -> ValidationResult<()> {
    if till_num <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "till_num".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;

    fn catalog_item(code: &str, till_price: i64) -> CatalogItem {
        CatalogItem {
            item_code: code.into(),
            item_name: "Sugar 1kg".into(),
            item_cost: Money::from_cents(4000),
            till_price: Money::from_cents(till_price),
            vat_alpha: "A".into(),
            vat_percent: 16.0,
            on_offer: false,
        }
    }

    #[test]
    fn test_validate_person() {
        assert!(validate_person("teller", "amina").is_ok());
        assert!(validate_person("teller", "").is_err());
        assert!(validate_person("teller", "NaN").is_err());
    }

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(0.25).is_ok());
        assert!(validate_quantity(0.0).is_err());
        assert!(validate_quantity(-1.0).is_err());
        assert!(validate_quantity(f64::NAN).is_err());
        assert!(matches!(
            validate_quantity(20_000.0),
            Err(ValidationError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_validate_catalog_item() {
        assert!(validate_catalog_item(&catalog_item("SKU1", 5000)).is_ok());
        assert!(validate_catalog_item(&catalog_item("", 5000)).is_err());
        assert!(validate_catalog_item(&catalog_item("SKU1", 0)).is_err());
    }

    #[test]
    fn test_validate_till() {
        assert!(validate_till(202610161).is_ok());
        assert!(validate_till(0).is_err());
    }
}
