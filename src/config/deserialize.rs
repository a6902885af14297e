// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Enforces non-empty target group lists at parse time.

use nonempty::NonEmpty;
use serde::Deserialize;

use super::TargetGroupConfig;

pub fn deserialize_target_groups<'de, D>(
    deserializer: D,
) -> Result<NonEmpty<TargetGroupConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let groups: Vec<TargetGroupConfig> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(groups)
        .ok_or_else(|| serde::de::Error::custom("at least one target group is required"))
}
