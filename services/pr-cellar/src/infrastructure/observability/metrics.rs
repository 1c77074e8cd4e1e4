//! 酒窖业务指标

use std::time::Instant;

use metrics::{counter, histogram};

use crate::domain::enums::TransferType;
use crate::domain::services::ModeKind;
use crate::error::AllocationError;

/// 记录一次成功提交的分配
pub fn record_plan_committed(mode: ModeKind) {
    let labels = [("mode", mode.as_str().to_string())];
    counter!("cellar_plans_committed_total", &labels).increment(1);
}

/// 记录被拒绝的命令
pub fn record_rejection(command: &'static str, error: &AllocationError) {
    let labels = [
        ("command", command.to_string()),
        ("code", error.code().to_string()),
    ];
    counter!("cellar_plan_rejections_total", &labels).increment(1);
}

pub fn record_transfer(transfer_type: TransferType) {
    let labels = [("type", transfer_type.as_str().to_string())];
    counter!("cellar_transfers_total", &labels).increment(1);
}

/// 记录命令耗时
pub fn record_command_duration(command: &'static str, started: Instant, success: bool) {
    let labels = [
        ("command", command.to_string()),
        ("success", success.to_string()),
    ];
    histogram!("cellar_command_duration_seconds", &labels).record(started.elapsed().as_secs_f64());
}
