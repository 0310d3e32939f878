//! Normalization helpers for the upstream feed's quirks: empty region
//! becomes `"global"`, and `eventTypeCode` maps to a human-readable
//! simplified description via a fixed keyword-matching rule table.

/// `region` normalized per the upstream quirk: empty/absent becomes
/// `"global"`.
pub fn normalized_region(region: &str) -> String {
    if region.trim().is_empty() {
        "global".to_string()
    } else {
        region.to_string()
    }
}

/// Derives the simplified, human-readable description shown in dashboards
/// from a service name and an `eventTypeCode`, via fixed keyword rules.
/// Real codes are shaped `AWS_<service>_<CODE>`, so a rule key is never a
/// prefix of the code — matching is substring containment, not a prefix
/// test.
pub fn simplified_description(service: &str, event_type_code: &str) -> String {
    let code = event_type_code.to_ascii_uppercase();

    if code.contains("OPERATIONAL_ISSUE") {
        return format!("{service} - Service disruptions…");
    }
    if code.contains("SECURITY_NOTIFICATION") {
        return format!("{service} - Security-related alerts…");
    }
    if code.contains("PLANNED_LIFECYCLE_EVENT") {
        return format!("{service} - Lifecycle changes…");
    }
    if code.contains("MAINTENANCE_SCHEDULED")
        || code.contains("SYSTEM_MAINTENANCE")
        || code.contains("PATCHING_RETIREMENT")
    {
        return format!("{service} - Routine Maintenance");
    }
    if code.contains("UPDATE_AVAILABLE") {
        return format!("{service} - Available software or system updates");
    }
    if code.contains("VPN_CONNECTIVITY") {
        return "VPN tunnel or connection status alert".to_string();
    }
    if code.contains("BILLING_NOTIFICATION") {
        return format!("{service} - Billing or Cost change notification");
    }
    format!("{service} - Service-specific events")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_region_becomes_global() {
        assert_eq!(normalized_region(""), "global");
        assert_eq!(normalized_region("   "), "global");
        assert_eq!(normalized_region("us-east-1"), "us-east-1");
    }

    #[test]
    fn simplified_description_matches_rule_table() {
        assert_eq!(
            simplified_description("EC2", "OPERATIONAL_ISSUE"),
            "EC2 - Service disruptions…"
        );
        assert_eq!(
            simplified_description("EC2", "SECURITY_NOTIFICATION"),
            "EC2 - Security-related alerts…"
        );
        assert_eq!(
            simplified_description("RDS", "MAINTENANCE_SCHEDULED"),
            "RDS - Routine Maintenance"
        );
        assert_eq!(
            simplified_description("RDS", "SYSTEM_MAINTENANCE"),
            "RDS - Routine Maintenance"
        );
        assert_eq!(
            simplified_description("Direct Connect", "VPN_CONNECTIVITY"),
            "VPN tunnel or connection status alert"
        );
        assert_eq!(
            simplified_description("Billing", "BILLING_NOTIFICATION"),
            "Billing - Billing or Cost change notification"
        );
        assert_eq!(
            simplified_description("S3", "SOME_OTHER_CODE"),
            "S3 - Service-specific events"
        );
    }

    #[test]
    fn simplified_description_matches_realistic_aws_prefixed_codes() {
        assert_eq!(
            simplified_description("EC2", "AWS_EC2_OPERATIONAL_ISSUE"),
            "EC2 - Service disruptions…"
        );
    }
}
