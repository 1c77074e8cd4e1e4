//! 酒窖领域枚举
//!
//! 数据库中以大写下划线字符串存储，与 JSON 表示一致。

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

macro_rules! string_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} value: {}", stringify!($name), other)),
                }
            }
        }
    };
}

/// 罐型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TankType {
    Fermenter,
    Brite,
    Unitank,
    Conditioning,
    Kettle,
    MashTun,
}

string_enum!(TankType {
    Fermenter => "FERMENTER",
    Brite => "BRITE",
    Unitank => "UNITANK",
    Conditioning => "CONDITIONING",
    Kettle => "KETTLE",
    MashTun => "MASH_TUN",
});

impl TankType {
    /// 该罐型在物理上能承载的阶段
    pub fn permitted_capabilities(&self) -> BTreeSet<BatchPhase> {
        use BatchPhase::*;
        match self {
            Self::Fermenter => BTreeSet::from([Fermenting, Conditioning]),
            Self::Unitank => BTreeSet::from([Fermenting, Conditioning, Ready]),
            Self::Conditioning | Self::Brite => BTreeSet::from([Conditioning, Ready]),
            Self::Kettle | Self::MashTun => BTreeSet::new(),
        }
    }

    /// 未显式配置时的默认能力
    pub fn default_capabilities(&self) -> BTreeSet<BatchPhase> {
        use BatchPhase::*;
        match self {
            Self::Fermenter => BTreeSet::from([Fermenting]),
            Self::Unitank => BTreeSet::from([Fermenting, Conditioning, Ready]),
            Self::Conditioning => BTreeSet::from([Conditioning]),
            Self::Brite => BTreeSet::from([Conditioning, Ready]),
            Self::Kettle | Self::MashTun => BTreeSet::new(),
        }
    }
}

/// 罐状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TankStatus {
    Available,
    Occupied,
    Cleaning,
    Maintenance,
}

string_enum!(TankStatus {
    Available => "AVAILABLE",
    Occupied => "OCCUPIED",
    Cleaning => "CLEANING",
    Maintenance => "MAINTENANCE",
});

/// 批次阶段
///
/// 顺序即合法的前进顺序，`Cancelled` 可从任何非终态进入。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchPhase {
    Planned,
    Brewing,
    Fermenting,
    Conditioning,
    Ready,
    Packaging,
    Completed,
    Cancelled,
}

string_enum!(BatchPhase {
    Planned => "PLANNED",
    Brewing => "BREWING",
    Fermenting => "FERMENTING",
    Conditioning => "CONDITIONING",
    Ready => "READY",
    Packaging => "PACKAGING",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

impl BatchPhase {
    /// 下一个前进阶段
    pub fn next(&self) -> Option<BatchPhase> {
        match self {
            Self::Planned => Some(Self::Brewing),
            Self::Brewing => Some(Self::Fermenting),
            Self::Fermenting => Some(Self::Conditioning),
            Self::Conditioning => Some(Self::Ready),
            Self::Ready => Some(Self::Packaging),
            Self::Packaging => Some(Self::Completed),
            Self::Completed | Self::Cancelled => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// 需要占用罐的阶段
    pub fn is_tank_phase(&self) -> bool {
        matches!(self, Self::Fermenting | Self::Conditioning | Self::Ready)
    }

    pub fn can_transition_to(&self, to: BatchPhase) -> bool {
        if to == Self::Cancelled {
            return !self.is_terminal();
        }
        self.next() == Some(to)
    }
}

/// 酒批状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LotStatus {
    Planned,
    Active,
    Completed,
    Cancelled,
}

string_enum!(LotStatus {
    Planned => "PLANNED",
    Active => "ACTIVE",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

impl LotStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Planned | Self::Active)
    }
}

/// 占罐记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    Planned,
    Active,
    Completed,
    Cancelled,
}

string_enum!(AssignmentStatus {
    Planned => "PLANNED",
    Active => "ACTIVE",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

impl AssignmentStatus {
    /// 仍占用时间窗（参与冲突检查）
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Planned | Self::Active)
    }
}

/// 转罐类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferType {
    FermentToCondition,
    ConditionToBright,
    TankToTank,
    Blend,
    Split,
}

string_enum!(TransferType {
    FermentToCondition => "FERMENT_TO_CONDITION",
    ConditionToBright => "CONDITION_TO_BRIGHT",
    TankToTank => "TANK_TO_TANK",
    Blend => "BLEND",
    Split => "SPLIT",
});

impl TransferType {
    /// 进入某阶段时的转罐类型
    pub fn for_destination(phase: BatchPhase) -> Option<TransferType> {
        match phase {
            BatchPhase::Conditioning => Some(Self::FermentToCondition),
            BatchPhase::Ready => Some(Self::ConditionToBright),
            _ => None,
        }
    }
}

/// 转罐记录状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Planned,
    Completed,
    Cancelled,
}

string_enum!(TransferStatus {
    Planned => "PLANNED",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});
