//! 可用性检查
//!
//! 每次调用都基于传入的占罐记录重新计算，不做缓存。

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::entities::TankAssignment;
use crate::domain::value_objects::{LotId, TankId, TimeWindow};

/// 检查各罐在时间窗内是否空闲
///
/// `ignore_lots` 中的酒批自身的占罐不计为冲突（混合目标、转罐源）。
pub fn check_availability(
    tank_ids: &[TankId],
    window: &TimeWindow,
    assignments: &[TankAssignment],
    ignore_lots: &BTreeSet<LotId>,
) -> BTreeMap<TankId, bool> {
    tank_ids
        .iter()
        .map(|tank_id| {
            let conflict = first_conflict(*tank_id, window, assignments, ignore_lots);
            (*tank_id, conflict.is_none())
        })
        .collect()
}

/// 找到第一条与时间窗冲突的占罐记录
pub fn first_conflict<'a>(
    tank_id: TankId,
    window: &TimeWindow,
    assignments: &'a [TankAssignment],
    ignore_lots: &BTreeSet<LotId>,
) -> Option<&'a TankAssignment> {
    assignments.iter().find(|a| {
        a.tank_id == tank_id && !ignore_lots.contains(&a.lot_id) && a.blocks(window)
    })
}
