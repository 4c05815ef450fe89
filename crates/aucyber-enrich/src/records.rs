//! Records-affected validation, shared by the extractor and the validator.
//!
//! `records_affected` counts people or accounts, never transactions,
//! dollars, or bytes. Values outside policy are nulled rather than
//! clamped: a wrong count is worse than no count. The organisation lists
//! are process-wide constants; reloading them requires redeploy.

/// Global organisations that can plausibly report more than 20M affected
/// individuals.
pub const MAJOR_INTERNATIONAL_ORGANIZATIONS: &[&str] = &[
    "facebook",
    "meta",
    "instagram",
    "whatsapp",
    "google",
    "alphabet",
    "youtube",
    "gmail",
    "microsoft",
    "linkedin",
    "azure",
    "amazon",
    "aws",
    "apple",
    "icloud",
    "twitter",
    "x corp",
    "tiktok",
    "bytedance",
    "yahoo",
    "alibaba",
    "tencent",
    "wechat",
    "uber",
    "lyft",
    "airbnb",
    "booking.com",
    "paypal",
    "venmo",
    "visa",
    "mastercard",
    "equifax",
    "experian",
    "transunion",
    "marriott",
    "starwood",
    "hilton",
    "adobe",
    "salesforce",
    "oracle",
    "ebay",
    "shopify",
    "spotify",
    "netflix",
    "sony",
    "playstation",
    "samsung",
    "ticketmaster",
    "moneygram",
    "western union",
    "canva",
    "gravatar",
    "wordpress",
    "internet archive",
    "dji",
];

/// Major Australian organisations with customer bases large enough for up
/// to 30M records (bounded by Australia's population).
pub const MAJOR_AUSTRALIAN_ORGANIZATIONS: &[&str] = &[
    "commonwealth bank",
    "cba",
    "commbank",
    "westpac",
    "nab",
    "national australia bank",
    "anz",
    "australia and new zealand banking",
    "suncorp",
    "bendigo bank",
    "macquarie",
    "amp",
    "qbe",
    "iag",
    "telstra",
    "optus",
    "vodafone",
    "tpg",
    "medisecure",
    "medibank",
    "bupa",
    "nib",
    "hcf",
    "woolworths",
    "coles",
    "bunnings",
    "jb hi-fi",
    "harvey norman",
    "agl",
    "origin energy",
    "energyaustralia",
    "allianz",
    "zurich",
    "qantas",
    "virgin australia",
    "australia post",
    "latitude",
    "latitude financial",
];

/// Identifiers marking Australian government bodies (same 30M ceiling).
pub const AUSTRALIAN_GOVERNMENT_IDENTIFIERS: &[&str] = &[
    "government",
    "govt",
    "department of",
    "dept of",
    "ministry of",
    "home affairs",
    "foreign affairs",
    "defence",
    "defense",
    "ato",
    "australian taxation office",
    "medicare",
    "centrelink",
    "services australia",
    "treasury",
    "attorney-general",
    "parliament",
    "commission",
    "authority",
    "agency",
    "commonwealth",
];

const MIN_REALISTIC_RECORDS: i64 = 50;
const SMALL_ORG_MAX: i64 = 20_000_000;
const LARGE_AU_ORG_MAX: i64 = 30_000_000;
const MAX_RECORDS: i64 = 1_000_000_000;

/// Validate a records-affected value against the event title. Returns the
/// value unchanged when it is in policy, `None` otherwise.
pub fn validate_records_affected(value: Option<i64>, event_title: &str) -> Option<i64> {
    let value = value?;

    if value <= 0 {
        return None;
    }
    if value < MIN_REALISTIC_RECORDS {
        // Counts this small almost always mean a missed "thousand" or
        // "million" unit.
        tracing::warn!(
            value,
            title = %event_title,
            "Suspiciously low records_affected rejected"
        );
        return None;
    }
    if value > MAX_RECORDS {
        tracing::warn!(value, title = %event_title, "Unrealistic records_affected rejected");
        return None;
    }

    let title = event_title.to_lowercase();
    let is_international = MAJOR_INTERNATIONAL_ORGANIZATIONS
        .iter()
        .any(|org| title.contains(org));
    let is_major_au = MAJOR_AUSTRALIAN_ORGANIZATIONS
        .iter()
        .any(|org| title.contains(org));
    let is_gov = AUSTRALIAN_GOVERNMENT_IDENTIFIERS
        .iter()
        .any(|id| title.contains(id));

    if value > SMALL_ORG_MAX && !(is_international || is_major_au || is_gov) {
        tracing::warn!(
            value,
            title = %event_title,
            cap = SMALL_ORG_MAX,
            "High records_affected rejected for small/unknown organisation"
        );
        return None;
    }

    if value > LARGE_AU_ORG_MAX && (is_major_au || is_gov) && !is_international {
        tracing::warn!(
            value,
            title = %event_title,
            cap = LARGE_AU_ORG_MAX,
            "High records_affected rejected for major Australian organisation"
        );
        return None;
    }

    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_indicate_missed_units() {
        // "6 million" misparsed as 6 must not survive.
        assert_eq!(validate_records_affected(Some(6), "Acme breach"), None);
        assert_eq!(validate_records_affected(Some(0), "Acme breach"), None);
        assert_eq!(validate_records_affected(Some(-5), "Acme breach"), None);
        assert_eq!(
            validate_records_affected(Some(6_000_000), "Acme breach"),
            Some(6_000_000)
        );
    }

    #[test]
    fn small_org_cap_rejects_implausible_counts() {
        // A local clinic cannot plausibly hold 25M records.
        assert_eq!(
            validate_records_affected(
                Some(25_000_000),
                "Local Perth dental clinic suffers data breach"
            ),
            None
        );
        assert_eq!(
            validate_records_affected(Some(19_000_000), "Local Perth dental clinic breach"),
            Some(19_000_000)
        );
    }

    #[test]
    fn major_australian_orgs_get_the_population_ceiling() {
        assert_eq!(
            validate_records_affected(Some(25_000_000), "Optus data breach widens"),
            Some(25_000_000)
        );
        assert_eq!(
            validate_records_affected(Some(35_000_000), "Optus data breach widens"),
            None
        );
    }

    #[test]
    fn international_orgs_allow_up_to_a_billion() {
        assert_eq!(
            validate_records_affected(Some(500_000_000), "Yahoo account breach"),
            Some(500_000_000)
        );
        assert_eq!(
            validate_records_affected(Some(2_000_000_000), "Yahoo account breach"),
            None
        );
    }

    #[test]
    fn government_identifiers_use_the_australian_ceiling() {
        assert_eq!(
            validate_records_affected(Some(28_000_000), "Medicare data exposed by Services Australia"),
            Some(28_000_000)
        );
    }
}
