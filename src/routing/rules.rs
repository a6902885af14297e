// ABOUTME: Listener routing rules as submitted to the routing layer.
// ABOUTME: Plain data with deterministic ordering so identical inputs compare equal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::fleet::{RouteMatch, TargetGroupKey};

/// Static response returned instead of forwarding (maintenance pages).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixedResponse {
    #[serde(default = "default_fixed_status")]
    pub status_code: u16,

    #[serde(default = "default_content_type")]
    pub content_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

fn default_fixed_status() -> u16 {
    503
}

fn default_content_type() -> String {
    "text/plain".to_string()
}

impl FixedResponse {
    pub fn validate(&self) -> Result<(), String> {
        if !(200..=599).contains(&self.status_code) {
            return Err(format!(
                "fixed response status {} is outside 200-599",
                self.status_code
            ));
        }
        Ok(())
    }
}

/// Redirect issued instead of forwarding. Unset parts keep the request's value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default = "default_redirect_status")]
    pub status_code: u16,
}

fn default_redirect_status() -> u16 {
    302
}

impl Redirect {
    pub fn validate(&self) -> Result<(), String> {
        if self.status_code != 301 && self.status_code != 302 {
            return Err(format!(
                "redirect status must be 301 or 302, got {}",
                self.status_code
            ));
        }
        if self.protocol.is_none() && self.host.is_none() && self.port.is_none() && self.path.is_none()
        {
            return Err("redirect must change at least one of protocol, host, port, path".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeightedTarget {
    pub target_group: TargetGroupKey,
    pub weight: u32,
}

/// What the listener does with a matched request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleAction {
    Forward { target_group: TargetGroupKey },
    WeightedForward { targets: Vec<WeightedTarget> },
    FixedResponse(FixedResponse),
    Redirect(Redirect),
}

impl RuleAction {
    /// Share of matched traffic sent to `key` (0 when not referenced).
    pub fn weight_for(&self, key: &TargetGroupKey) -> u32 {
        match self {
            RuleAction::Forward { target_group } if target_group == key => 100,
            RuleAction::WeightedForward { targets } => targets
                .iter()
                .filter(|t| &t.target_group == key)
                .map(|t| t.weight)
                .sum(),
            _ => 0,
        }
    }

    /// Whether the action mentions `key` at all, even at weight zero.
    pub fn references(&self, key: &TargetGroupKey) -> bool {
        match self {
            RuleAction::Forward { target_group } => target_group == key,
            RuleAction::WeightedForward { targets } => {
                targets.iter().any(|t| &t.target_group == key)
            }
            _ => false,
        }
    }
}

/// A prioritized, conditional listener rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRule {
    pub priority: u32,
    pub conditions: RouteMatch,
    pub action: RuleAction,
}

/// The full listener configuration: ordered rules plus the default action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingRules {
    pub rules: Vec<RoutingRule>,
    pub default_action: RuleAction,
}

impl RoutingRules {
    /// Whether any rule or the default action sends traffic to `key`.
    pub fn receives_traffic(&self, key: &TargetGroupKey) -> bool {
        self.default_action.weight_for(key) > 0
            || self.rules.iter().any(|r| r.action.weight_for(key) > 0)
    }

    pub fn references(&self, key: &TargetGroupKey) -> bool {
        self.default_action.references(key) || self.rules.iter().any(|r| r.action.references(key))
    }

    /// Human-readable differences from `expected`, empty when equal.
    pub fn differences(&self, expected: &RoutingRules) -> Vec<String> {
        let mut out = Vec::new();

        if self.default_action != expected.default_action {
            out.push(format!(
                "default action: expected {}, found {}",
                describe(&expected.default_action),
                describe(&self.default_action)
            ));
        }

        let actual: BTreeMap<u32, &RoutingRule> =
            self.rules.iter().map(|r| (r.priority, r)).collect();
        let wanted: BTreeMap<u32, &RoutingRule> =
            expected.rules.iter().map(|r| (r.priority, r)).collect();

        for (priority, rule) in &wanted {
            match actual.get(priority) {
                None => out.push(format!("rule {priority}: missing")),
                Some(found) if found != rule => out.push(format!(
                    "rule {priority}: expected {}, found {}",
                    describe(&rule.action),
                    describe(&found.action)
                )),
                Some(_) => {}
            }
        }
        for priority in actual.keys().filter(|p| !wanted.contains_key(p)) {
            out.push(format!("rule {priority}: unexpected"));
        }

        out
    }
}

fn describe(action: &RuleAction) -> String {
    match action {
        RuleAction::Forward { target_group } => format!("forward to {target_group}"),
        RuleAction::WeightedForward { targets } => {
            let parts: Vec<String> = targets
                .iter()
                .map(|t| format!("{}={}", t.target_group, t.weight))
                .collect();
            format!("weighted [{}]", parts.join(", "))
        }
        RuleAction::FixedResponse(r) => format!("fixed response {}", r.status_code),
        RuleAction::Redirect(r) => format!("redirect {}", r.status_code),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Color, ResourceName};

    fn key(role: &str, color: Color) -> TargetGroupKey {
        TargetGroupKey {
            role: ResourceName::new(role).unwrap(),
            color,
        }
    }

    #[test]
    fn zero_weight_target_is_referenced_but_idle() {
        let action = RuleAction::WeightedForward {
            targets: vec![
                WeightedTarget {
                    target_group: key("web", Color::Green),
                    weight: 100,
                },
                WeightedTarget {
                    target_group: key("web", Color::Blue),
                    weight: 0,
                },
            ],
        };
        let rules = RoutingRules {
            rules: vec![],
            default_action: action,
        };
        assert!(rules.references(&key("web", Color::Blue)));
        assert!(!rules.receives_traffic(&key("web", Color::Blue)));
        assert!(rules.receives_traffic(&key("web", Color::Green)));
    }

    #[test]
    fn differences_name_the_changed_parts() {
        let expected = RoutingRules {
            rules: vec![RoutingRule {
                priority: 10,
                conditions: RouteMatch {
                    paths: vec!["/api/*".into()],
                    hosts: vec![],
                },
                action: RuleAction::Forward {
                    target_group: key("api", Color::Blue),
                },
            }],
            default_action: RuleAction::Forward {
                target_group: key("web", Color::Blue),
            },
        };
        let actual = RoutingRules {
            rules: vec![],
            default_action: RuleAction::Forward {
                target_group: key("web", Color::Green),
            },
        };

        let diff = actual.differences(&expected);
        assert_eq!(diff.len(), 2);
        assert!(diff[0].contains("expected forward to web-blue"));
        assert_eq!(diff[1], "rule 10: missing");
        assert!(expected.differences(&expected).is_empty());
    }

    #[test]
    fn redirect_requires_a_change() {
        let redirect = Redirect {
            protocol: None,
            host: None,
            port: None,
            path: None,
            status_code: 302,
        };
        assert!(redirect.validate().is_err());
    }
}
