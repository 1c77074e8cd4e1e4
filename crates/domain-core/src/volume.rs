//! 体积值对象

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

use serde::{Deserialize, Serialize};

/// 体积比较容差（升）
///
/// 分装、混合时各部分体积之和与总量之差不超过该值即视为守恒。
pub const VOLUME_TOLERANCE: f64 = 0.5;

/// 体积值对象，单位为升
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Volume(f64);

impl Volume {
    pub const ZERO: Volume = Volume(0.0);

    pub fn liters(value: f64) -> Self {
        Self(value)
    }

    pub fn as_liters(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0.0
    }

    /// 是否为有限的正数
    pub fn is_valid_quantity(&self) -> bool {
        self.0.is_finite() && self.0 > 0.0
    }

    /// 在容差内相等
    pub fn approx_eq(&self, other: Volume, tolerance: f64) -> bool {
        (self.0 - other.0).abs() <= tolerance
    }

    /// 不超过上限
    pub fn fits_within(&self, limit: Volume) -> bool {
        self.0 <= limit.0
    }

    pub fn min(self, other: Volume) -> Volume {
        Volume(self.0.min(other.0))
    }

    pub fn max(self, other: Volume) -> Volume {
        Volume(self.0.max(other.0))
    }

    /// 按比例缩放
    pub fn scale(self, ratio: f64) -> Volume {
        Volume(self.0 * ratio)
    }

    /// 占另一体积的比例，分母为零时返回 0
    pub fn ratio_of(self, whole: Volume) -> f64 {
        if whole.0 == 0.0 {
            0.0
        } else {
            self.0 / whole.0
        }
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}L", self.0)
    }
}

impl Add for Volume {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        Volume(self.0 + other.0)
    }
}

impl AddAssign for Volume {
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Volume {
    type Output = Self;

    fn sub(self, other: Self) -> Self {
        Volume(self.0 - other.0)
    }
}

impl SubAssign for Volume {
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<f64> for Volume {
    type Output = Self;

    fn mul(self, multiplier: f64) -> Self {
        Volume(self.0 * multiplier)
    }
}

impl Sum for Volume {
    fn sum<I: Iterator<Item = Volume>>(iter: I) -> Self {
        iter.fold(Volume::ZERO, |acc, v| acc + v)
    }
}
