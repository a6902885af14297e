// ABOUTME: Renders the desired listener rules from the traffic split and target groups.
// ABOUTME: Pure and deterministic: the same inputs always produce identical rules.

use crate::config::ListenerOverride;
use crate::fleet::{TargetGroupKey, TargetGroupSpec};
use crate::traffic::{self, InvalidSplitError, TrafficSplit};
use crate::types::Color;

use super::rules::{FixedResponse, RoutingRule, RoutingRules, RuleAction, WeightedTarget};

/// Everything the rendered rules depend on.
#[derive(Debug, Clone, Copy)]
pub struct RenderInput<'a> {
    pub active: Color,
    pub split: &'a TrafficSplit,
    /// Color that stopped taking traffic at the last flip and has not been
    /// retired yet. Kept as a zero-weight target so connections drain.
    pub draining: Option<Color>,
    pub target_groups: &'a [TargetGroupSpec],
    pub listener_override: Option<&'a ListenerOverride>,
}

/// Compute the listener rules for `input`.
///
/// The split is resolved first and errors pass through unchanged. The
/// catch-all role receives the resolved split (a plain forward when one
/// color has everything). Scoped roles always forward to the active color
/// and are ordered by priority, then role name. A listener override
/// replaces only the default action.
pub fn render(input: &RenderInput<'_>) -> Result<RoutingRules, InvalidSplitError> {
    let resolved = traffic::resolve(input.active, input.split)?;

    let default_action = match input.listener_override {
        Some(ListenerOverride::FixedResponse(response)) => {
            RuleAction::FixedResponse(response.clone())
        }
        Some(ListenerOverride::Redirect(redirect)) => RuleAction::Redirect(redirect.clone()),
        None => match input.target_groups.iter().find(|g| !g.is_scoped()) {
            Some(catch_all) => default_forward(catch_all, &resolved, input.draining),
            None => RuleAction::FixedResponse(FixedResponse {
                status_code: 404,
                content_type: "text/plain".to_string(),
                body: None,
            }),
        },
    };

    Ok(RoutingRules {
        rules: scoped_rules(input.target_groups, input.active),
        default_action,
    })
}

fn default_forward(
    group: &TargetGroupSpec,
    resolved: &TrafficSplit,
    draining: Option<Color>,
) -> RuleAction {
    let mut targets: Vec<WeightedTarget> = resolved
        .entries()
        .iter()
        .map(|e| WeightedTarget {
            target_group: group.key(e.color),
            weight: e.weight,
        })
        .collect();

    if let Some(color) = draining
        && !resolved.references(color)
    {
        targets.push(WeightedTarget {
            target_group: group.key(color),
            weight: 0,
        });
    }

    match targets.as_slice() {
        [only] => RuleAction::Forward {
            target_group: only.target_group.clone(),
        },
        _ => RuleAction::WeightedForward { targets },
    }
}

fn scoped_rules(groups: &[TargetGroupSpec], active: Color) -> Vec<RoutingRule> {
    let mut scoped: Vec<&TargetGroupSpec> = groups.iter().filter(|g| g.is_scoped()).collect();
    scoped.sort_by(|a, b| {
        let pa = a.priority.unwrap_or(u32::MAX);
        let pb = b.priority.unwrap_or(u32::MAX);
        pa.cmp(&pb).then_with(|| a.role.cmp(&b.role))
    });

    // Unprioritized roles are numbered after the highest configured priority.
    let mut next = scoped
        .iter()
        .filter_map(|g| g.priority)
        .max()
        .map_or(1, |p| p.saturating_add(1));

    scoped
        .into_iter()
        .map(|group| {
            let priority = group.priority.unwrap_or_else(|| {
                let assigned = next;
                next = next.saturating_add(1);
                assigned
            });
            RoutingRule {
                priority,
                conditions: group.route.clone(),
                action: RuleAction::Forward {
                    target_group: TargetGroupKey {
                        role: group.role.clone(),
                        color: active,
                    },
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HealthCheckSpec;
    use crate::fleet::RouteMatch;
    use crate::types::ResourceName;

    fn group(role: &str, paths: &[&str], priority: Option<u32>) -> TargetGroupSpec {
        TargetGroupSpec {
            role: ResourceName::new(role).unwrap(),
            route: RouteMatch {
                paths: paths.iter().map(|p| p.to_string()).collect(),
                hosts: vec![],
            },
            priority,
            health_check: HealthCheckSpec::default(),
        }
    }

    #[test]
    fn unprioritized_scoped_roles_follow_configured_ones() {
        let groups = vec![
            group("web", &[], None),
            group("ws", &["/ws/*"], None),
            group("api", &["/api/*"], Some(10)),
            group("admin", &["/admin/*"], None),
        ];
        let split = TrafficSplit::empty();
        let rules = render(&RenderInput {
            active: Color::Blue,
            split: &split,
            draining: None,
            target_groups: &groups,
            listener_override: None,
        })
        .unwrap();

        let order: Vec<(u32, &str)> = rules
            .rules
            .iter()
            .map(|r| match &r.action {
                RuleAction::Forward { target_group } => (r.priority, target_group.role.as_str()),
                other => panic!("unexpected action {other:?}"),
            })
            .collect();
        assert_eq!(order, vec![(10, "api"), (11, "admin"), (12, "ws")]);
    }
}
