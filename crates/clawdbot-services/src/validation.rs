//! Listing validation — flags suspicious properties.
//!
//! Pure checks over a listing and its peers: same input, same verdict. Used
//! by system maintenance and by moderation previews.

use clawdbot_core::config::PropertyConfig;
use clawdbot_core::domain::Property;

/// Price must sit within this multiple of the category median to pass.
const PRICE_OUTLIER_FACTOR: f64 = 5.0;

/// Verdict for one listing.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ValidationVerdict {
    pub property_id: uuid::Uuid,
    pub suspicious: bool,
    pub reasons: Vec<String>,
}

pub struct ValidationService {
    config: PropertyConfig,
}

impl ValidationService {
    pub fn new(config: PropertyConfig) -> Self {
        Self { config }
    }

    /// Validate one listing against its peers (same category).
    /// `peers` should include the listing itself; it is skipped by id.
    pub fn validate(&self, property: &Property, peers: &[Property]) -> ValidationVerdict {
        let mut reasons = Vec::new();

        if !self.config.validation_enabled {
            return ValidationVerdict {
                property_id: property.id,
                suspicious: false,
                reasons,
            };
        }

        if property.price <= 0 {
            reasons.push("price is zero or negative".to_string());
        }

        if property.title.trim().is_empty() {
            reasons.push("empty title".to_string());
        }

        if self.config.suspicious_detection {
            if let Some(median) = category_median_price(&property.category, property.id, peers) {
                let price = property.price as f64;
                if price > median * PRICE_OUTLIER_FACTOR {
                    reasons.push(format!(
                        "price {} is more than {PRICE_OUTLIER_FACTOR}x the category median {median}",
                        property.price
                    ));
                } else if median > 0.0 && price < median / PRICE_OUTLIER_FACTOR {
                    reasons.push(format!(
                        "price {} is less than 1/{PRICE_OUTLIER_FACTOR} of the category median {median}",
                        property.price
                    ));
                }
            }

            for peer in peers {
                if peer.id == property.id {
                    continue;
                }
                if !property.title.trim().is_empty()
                    && peer.title.trim().eq_ignore_ascii_case(property.title.trim())
                {
                    reasons.push(format!("duplicate title of listing {}", peer.id));
                    break;
                }
                if !property.description.trim().is_empty()
                    && peer.description.trim() == property.description.trim()
                {
                    reasons.push(format!("duplicate description of listing {}", peer.id));
                    break;
                }
            }
        }

        ValidationVerdict {
            property_id: property.id,
            suspicious: !reasons.is_empty(),
            reasons,
        }
    }
}

/// Median price among peers in the same category, excluding the listing under
/// test. None when there are no peers to compare against.
fn category_median_price(category: &str, exclude: uuid::Uuid, peers: &[Property]) -> Option<f64> {
    let mut prices: Vec<i64> = peers
        .iter()
        .filter(|p| p.id != exclude && p.category == category && p.price > 0)
        .map(|p| p.price)
        .collect();
    if prices.is_empty() {
        return None;
    }
    prices.sort_unstable();
    let mid = prices.len() / 2;
    if prices.len() % 2 == 0 {
        Some((prices[mid - 1] + prices[mid]) as f64 / 2.0)
    } else {
        Some(prices[mid] as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn listing(title: &str, price: i64) -> Property {
        let mut p = Property::new(Uuid::new_v4(), title, price, "apartment");
        p.description = format!("description of {title}");
        p
    }

    fn svc() -> ValidationService {
        ValidationService::new(PropertyConfig::default())
    }

    #[test]
    fn test_clean_listing_passes() {
        let peers: Vec<Property> = (0..5).map(|i| listing(&format!("flat {i}"), 1000)).collect();
        let verdict = svc().validate(&peers[0], &peers);
        assert!(!verdict.suspicious, "reasons: {:?}", verdict.reasons);
    }

    #[test]
    fn test_price_outlier_flagged() {
        let mut peers: Vec<Property> = (0..5).map(|i| listing(&format!("flat {i}"), 1000)).collect();
        let outlier = listing("penthouse", 50_000);
        peers.push(outlier.clone());
        let verdict = svc().validate(&outlier, &peers);
        assert!(verdict.suspicious);
        assert!(verdict.reasons[0].contains("median"));
    }

    #[test]
    fn test_duplicate_title_flagged() {
        let a = listing("Sunny 2BR", 1000);
        let mut b = listing("sunny 2br", 1100);
        b.description = "unique text".into();
        let peers = vec![a.clone(), b.clone()];
        let verdict = svc().validate(&b, &peers);
        assert!(verdict.suspicious);
        assert!(verdict.reasons.iter().any(|r| r.contains("duplicate title")));
    }

    #[test]
    fn test_idempotent() {
        let peers: Vec<Property> = (0..4).map(|i| listing(&format!("flat {i}"), 900)).collect();
        let first = svc().validate(&peers[1], &peers);
        let second = svc().validate(&peers[1], &peers);
        assert_eq!(first.suspicious, second.suspicious);
        assert_eq!(first.reasons, second.reasons);
    }

    #[test]
    fn test_disabled_validation_never_flags() {
        let cfg = PropertyConfig { validation_enabled: false, ..Default::default() };
        let svc = ValidationService::new(cfg);
        let bad = listing("", -5);
        let verdict = svc.validate(&bad, &[bad.clone()]);
        assert!(!verdict.suspicious);
    }
}
