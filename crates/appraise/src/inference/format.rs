//! Indian-numbering price formatting for presentation layers.

/// One lakh (10^5).
pub const LAKH: f64 = 1e5;
/// One crore (10^7).
pub const CRORE: f64 = 1e7;

/// Format a rupee amount as lakhs or crores, e.g. `₹45.50 L`, `₹1.25 Cr`.
pub fn format_inr(amount: f64) -> String {
    if amount >= CRORE {
        format!("₹{:.2} Cr", amount / CRORE)
    } else {
        format!("₹{:.2} L", amount / LAKH)
    }
}
