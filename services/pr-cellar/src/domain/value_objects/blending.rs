//! 混合兼容规则

use std::fmt;

use brewops_config::BlendingRulesConfig;
use serde::{Deserialize, Serialize};

/// 可配置的混合规则，所有启用的规则以 AND 组合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendingConfig {
    pub require_recipe_match: bool,
    pub require_yeast_match: bool,
    pub require_phase_match: bool,
    pub require_style_match: bool,
    pub max_age_difference_days: Option<i64>,
}

impl Default for BlendingConfig {
    fn default() -> Self {
        Self::from(&BlendingRulesConfig::default())
    }
}

impl From<&BlendingRulesConfig> for BlendingConfig {
    fn from(config: &BlendingRulesConfig) -> Self {
        Self {
            require_recipe_match: config.require_recipe_match,
            require_yeast_match: config.require_yeast_match,
            require_phase_match: config.require_phase_match,
            require_style_match: config.require_style_match,
            max_age_difference_days: config.max_age_difference_days,
        }
    }
}

impl BlendingConfig {
    /// 关闭全部规则
    pub fn permissive() -> Self {
        Self {
            require_recipe_match: false,
            require_yeast_match: false,
            require_phase_match: false,
            require_style_match: false,
            max_age_difference_days: None,
        }
    }
}

/// 失败的混合规则，按检查顺序排列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlendRule {
    Recipe,
    Yeast,
    Phase,
    Style,
    Age,
}

impl BlendRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Recipe => "recipe",
            Self::Yeast => "yeast",
            Self::Phase => "phase",
            Self::Style => "style",
            Self::Age => "age",
        }
    }
}

impl fmt::Display for BlendRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
