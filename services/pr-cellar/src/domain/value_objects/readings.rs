//! 转罐时记录的读数

use serde::{Deserialize, Serialize};

use crate::error::AllocationError;

/// 比重与温度，均可选
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Readings {
    pub gravity: Option<f64>,
    pub temperature_c: Option<f64>,
}

impl Readings {
    pub fn is_empty(&self) -> bool {
        self.gravity.is_none() && self.temperature_c.is_none()
    }

    pub fn validate(&self) -> Result<(), AllocationError> {
        if let Some(gravity) = self.gravity {
            if !(gravity.is_finite() && (0.9..=1.2).contains(&gravity)) {
                return Err(AllocationError::validation(format!(
                    "gravity {} is outside 0.900..1.200",
                    gravity
                )));
            }
        }
        if let Some(temperature) = self.temperature_c {
            if !(temperature.is_finite() && (-5.0..=100.0).contains(&temperature)) {
                return Err(AllocationError::validation(format!(
                    "temperature {}°C is out of range",
                    temperature
                )));
            }
        }
        Ok(())
    }
}
