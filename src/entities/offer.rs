// 🏷️ Offer Entity - a member's listing priced in credit units

use serde::{Deserialize, Serialize};

/// Offer row.
///
/// Identity: generated UUID. The seller relationship is the only foreign key
/// the engine has to keep honest; tags live in their own table keyed by
/// (offer_id, tag).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    pub id: String,
    pub seller_id: String,
    pub description: String,
    /// Positive integer, same unit as account balances.
    pub price: i64,
    pub title: String,
}

impl Offer {
    pub fn new(
        seller_id: impl Into<String>,
        description: impl Into<String>,
        price: i64,
        title: impl Into<String>,
    ) -> Self {
        Offer {
            id: uuid::Uuid::new_v4().to_string(),
            seller_id: seller_id.into(),
            description: description.into(),
            price,
            title: title.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offers_get_distinct_ids() {
        let a = Offer::new("seller", "desc", 10, "title");
        let b = Offer::new("seller", "desc", 10, "title");
        assert_ne!(a.id, b.id);
        assert_eq!(a.seller_id, "seller");
        assert_eq!(a.price, 10);
    }
}
