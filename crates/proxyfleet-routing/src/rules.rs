//! Routing rules
//!
//! Clash evaluates rules top to bottom. Domain steering comes first, then the
//! GEOIP rule, then the final MATCH. `RuleSet` only stores the three parts
//! separately, so no other order can be emitted.

use std::fmt;

use serde::{Deserialize, Serialize, Serializer};

use crate::options::GroupNames;

/// Built-in policy for direct connections
pub const DIRECT: &str = "DIRECT";

/// How a domain rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainMatch {
    /// `DOMAIN-SUFFIX`
    Suffix,
    /// `DOMAIN-KEYWORD`
    Keyword,
    /// `DOMAIN`, exact match
    Domain,
}

impl DomainMatch {
    fn keyword(self) -> &'static str {
        match self {
            DomainMatch::Suffix => "DOMAIN-SUFFIX",
            DomainMatch::Keyword => "DOMAIN-KEYWORD",
            DomainMatch::Domain => "DOMAIN",
        }
    }
}

/// Where matching traffic goes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleTarget {
    /// Manual selection group
    Select,
    /// Auto selection group
    Auto,
    Media,
    Fallback,
    Direct,
}

impl RuleTarget {
    /// Policy name in the rendered document
    #[must_use]
    pub fn policy<'a>(self, groups: &'a GroupNames) -> &'a str {
        match self {
            RuleTarget::Select => groups.select.as_str(),
            RuleTarget::Auto => groups.auto.as_str(),
            RuleTarget::Media => groups.media.as_str(),
            RuleTarget::Fallback => groups.fallback.as_str(),
            RuleTarget::Direct => DIRECT,
        }
    }
}

/// A domain steering rule as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    #[serde(rename = "match")]
    pub kind: DomainMatch,
    pub value: String,
    pub target: RuleTarget,
}

impl DomainRule {
    pub fn new(kind: DomainMatch, value: impl Into<String>, target: RuleTarget) -> Self {
        Self {
            kind,
            value: value.into(),
            target,
        }
    }
}

/// A rule with its policy resolved to a group name
#[derive(Debug, Clone, PartialEq, Eq)]
struct ResolvedDomainRule {
    kind: DomainMatch,
    value: String,
    policy: String,
}

impl fmt::Display for ResolvedDomainRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.kind.keyword(), self.value, self.policy)
    }
}

/// Ordered rule list: domain rules, GEOIP, MATCH
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSet {
    domain: Vec<ResolvedDomainRule>,
    geoip_country: String,
    geoip_policy: String,
    final_policy: String,
}

impl RuleSet {
    /// Resolve configured rules against the group names
    #[must_use]
    pub fn new(domain_rules: &[DomainRule], geoip_direct: &str, groups: &GroupNames) -> Self {
        let domain = domain_rules
            .iter()
            .map(|rule| ResolvedDomainRule {
                kind: rule.kind,
                value: rule.value.clone(),
                policy: rule.target.policy(groups).to_string(),
            })
            .collect();

        Self {
            domain,
            geoip_country: geoip_direct.to_string(),
            geoip_policy: DIRECT.to_string(),
            final_policy: groups.fallback.clone(),
        }
    }

    /// Rendered rule lines in evaluation order
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.domain.iter().map(ToString::to_string).collect();
        lines.push(format!("GEOIP,{},{}", self.geoip_country, self.geoip_policy));
        lines.push(format!("MATCH,{}", self.final_policy));
        lines
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.domain.len() + 2
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

impl Serialize for RuleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.lines())
    }
}

/// Rules of the stock document
#[must_use]
pub fn default_domain_rules() -> Vec<DomainRule> {
    use DomainMatch::{Domain, Keyword, Suffix};
    use RuleTarget::{Media, Select};

    vec![
        DomainRule::new(Suffix, "google.com", Select),
        DomainRule::new(Keyword, "google", Select),
        DomainRule::new(Domain, "google.com", Select),
        DomainRule::new(Suffix, "github.com", Select),
        DomainRule::new(Suffix, "twitter.com", Select),
        DomainRule::new(Suffix, "youtube.com", Select),
        DomainRule::new(Suffix, "facebook.com", Select),
        DomainRule::new(Suffix, "instagram.com", Select),
        DomainRule::new(Suffix, "netflix.com", Media),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_order_is_domain_geoip_match() {
        let groups = GroupNames::default();
        let rules = RuleSet::new(&default_domain_rules(), "CN", &groups);
        let lines = rules.lines();

        assert_eq!(lines.len(), rules.len());
        assert_eq!(lines[0], format!("DOMAIN-SUFFIX,google.com,{}", groups.select));
        assert_eq!(lines[1], format!("DOMAIN-KEYWORD,google,{}", groups.select));
        assert_eq!(lines[2], format!("DOMAIN,google.com,{}", groups.select));
        assert_eq!(lines[8], format!("DOMAIN-SUFFIX,netflix.com,{}", groups.media));
        assert_eq!(lines[9], "GEOIP,CN,DIRECT");
        assert_eq!(lines[10], format!("MATCH,{}", groups.fallback));
    }

    #[test]
    fn test_empty_domain_rules_still_end_with_geoip_and_match() {
        let groups = GroupNames::default();
        let lines = RuleSet::new(&[], "CN", &groups).lines();

        assert_eq!(lines, vec!["GEOIP,CN,DIRECT".to_string(), format!("MATCH,{}", groups.fallback)]);
    }

    #[test]
    fn test_direct_target() {
        let groups = GroupNames::default();
        let rules = RuleSet::new(
            &[DomainRule::new(DomainMatch::Suffix, "lan", RuleTarget::Direct)],
            "CN",
            &groups,
        );
        assert_eq!(rules.lines()[0], "DOMAIN-SUFFIX,lan,DIRECT");
    }
}
