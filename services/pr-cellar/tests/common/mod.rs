//! 集成测试公共设施
//!
//! 内存版 Unit of Work：begin 时复制一份已提交状态，commit 时校验版本号，
//! 模拟 SERIALIZABLE 事务的冲突；同时模拟数据库上的排他约束。

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use brewops_common::{TenantId, UserId};
use brewops_domain_core::{TenantOwned, Volume};
use brewops_errors::{AppError, AppResult};
use chrono::{DateTime, TimeZone, Utc};

use pr_cellar::config::PlanningPolicy;
use pr_cellar::domain::entities::{Batch, Lot, Tank, TankAssignment, Transfer};
use pr_cellar::domain::enums::{AssignmentStatus, BatchPhase, TankType};
use pr_cellar::domain::repositories::{
    BatchRepository, LotRepository, TankAssignmentRepository, TankRepository, TransferRepository,
};
use pr_cellar::domain::unit_of_work::{UnitOfWork, UnitOfWorkFactory};
use pr_cellar::domain::value_objects::{
    AssignmentId, BatchId, LotId, Readings, RecipeId, TankId,
};

#[derive(Debug, Clone, Default)]
pub struct State {
    pub tanks: BTreeMap<TankId, Tank>,
    pub batches: BTreeMap<BatchId, Batch>,
    pub lots: BTreeMap<LotId, Lot>,
    pub assignments: BTreeMap<AssignmentId, TankAssignment>,
    pub transfers: Vec<Transfer>,
    pub readings: Vec<(LotId, Readings)>,
}

impl State {
    pub fn lots_of(&self, batch_id: BatchId) -> Vec<&Lot> {
        self.lots.values().filter(|l| l.contains_batch(batch_id)).collect()
    }

    pub fn assignments_on(&self, tank_id: TankId) -> Vec<&TankAssignment> {
        self.assignments.values().filter(|a| a.tank_id == tank_id).collect()
    }

    pub fn transfers_of(&self, batch_id: BatchId) -> Vec<&Transfer> {
        self.transfers.iter().filter(|t| t.batch_id == batch_id).collect()
    }
}

#[derive(Default)]
struct Committed {
    version: u64,
    state: State,
}

/// 内存存储，同时充当 Unit of Work 工厂
#[derive(Clone, Default)]
pub struct MemoryStore {
    committed: Arc<Mutex<Committed>>,
    fail_next_commit: Arc<AtomicBool>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn factory(&self) -> Arc<dyn UnitOfWorkFactory> {
        Arc::new(self.clone())
    }

    pub fn state(&self) -> State {
        lock(&self.committed).state.clone()
    }

    pub fn insert_tank(&self, tank: Tank) -> Tank {
        let mut committed = lock(&self.committed);
        committed.state.tanks.insert(tank.id, tank.clone());
        committed.version += 1;
        tank
    }

    pub fn insert_batch(&self, batch: Batch) -> Batch {
        let mut committed = lock(&self.committed);
        committed.state.batches.insert(batch.id, batch.clone());
        committed.version += 1;
        batch
    }

    pub fn update_tank(&self, tank_id: TankId, f: impl FnOnce(&mut Tank)) {
        let mut committed = lock(&self.committed);
        if let Some(tank) = committed.state.tanks.get_mut(&tank_id) {
            f(tank);
        }
        committed.version += 1;
    }

    /// 下一次提交以存储错误失败
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }

    fn begin_uow(&self, read_only: bool) -> MemoryUnitOfWork {
        let committed = lock(&self.committed);
        MemoryUnitOfWork {
            store: self.clone(),
            base_version: committed.version,
            read_only,
            repo: MemRepo {
                state: Arc::new(Mutex::new(committed.state.clone())),
            },
        }
    }
}

#[async_trait]
impl UnitOfWorkFactory for MemoryStore {
    async fn begin(&self) -> AppResult<Box<dyn UnitOfWork>> {
        let uow = self.begin_uow(false);
        // 让出执行权，并发请求可以在同一份快照上交错执行
        tokio::task::yield_now().await;
        Ok(Box::new(uow))
    }

    async fn begin_read_only(&self) -> AppResult<Box<dyn UnitOfWork>> {
        Ok(Box::new(self.begin_uow(true)))
    }
}

pub struct MemoryUnitOfWork {
    store: MemoryStore,
    base_version: u64,
    read_only: bool,
    repo: MemRepo,
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    fn tanks(&self) -> &dyn TankRepository {
        &self.repo
    }

    fn batches(&self) -> &dyn BatchRepository {
        &self.repo
    }

    fn lots(&self) -> &dyn LotRepository {
        &self.repo
    }

    fn assignments(&self) -> &dyn TankAssignmentRepository {
        &self.repo
    }

    fn transfers(&self) -> &dyn TransferRepository {
        &self.repo
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        if self.read_only {
            return Ok(());
        }
        if self.store.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(AppError::database("connection reset during commit"));
        }
        let mut committed = lock(&self.store.committed);
        if committed.version != self.base_version {
            return Err(AppError::conflict("could not serialize access"));
        }
        committed.state = lock(&self.repo.state).clone();
        committed.version += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> AppResult<()> {
        Ok(())
    }
}

/// 事务内工作副本，五个仓储接口都由它实现
pub struct MemRepo {
    state: Arc<Mutex<State>>,
}

impl MemRepo {
    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

/// 模拟排他约束与“每罐一条 ACTIVE”唯一索引
fn check_constraints(state: &State, assignment: &TankAssignment) -> AppResult<()> {
    if !assignment.is_open() {
        return Ok(());
    }
    for other in state.assignments.values() {
        if other.id == assignment.id
            || other.tank_id != assignment.tank_id
            || other.tenant_id != assignment.tenant_id
            || !other.is_open()
        {
            continue;
        }
        if other.window.overlaps(&assignment.window) {
            return Err(AppError::conflict("Tank window overlaps an open assignment"));
        }
        if other.status == AssignmentStatus::Active && assignment.status == AssignmentStatus::Active {
            return Err(AppError::conflict("Duplicate entry violates unique constraint"));
        }
    }
    Ok(())
}

#[async_trait]
impl TankRepository for MemRepo {
    async fn find_by_id(&self, id: &TankId, tenant_id: &TenantId) -> AppResult<Option<Tank>> {
        Ok(self
            .state()
            .tanks
            .get(id)
            .filter(|t| t.belongs_to(tenant_id))
            .cloned())
    }

    async fn find_by_ids(&self, ids: &[TankId], tenant_id: &TenantId) -> AppResult<Vec<Tank>> {
        let state = self.state();
        let mut tanks: Vec<Tank> = ids
            .iter()
            .filter_map(|id| state.tanks.get(id))
            .filter(|t| t.belongs_to(tenant_id))
            .cloned()
            .collect();
        tanks.sort_by(|a, b| a.name.cmp(&b.name));
        tanks.dedup_by_key(|t| t.id);
        Ok(tanks)
    }

    async fn lock(&self, id: &TankId, tenant_id: &TenantId) -> AppResult<Option<Tank>> {
        TankRepository::find_by_id(self, id, tenant_id).await
    }

    async fn list_by_capability(
        &self,
        phase: BatchPhase,
        tenant_id: &TenantId,
    ) -> AppResult<Vec<Tank>> {
        let mut tanks: Vec<Tank> = self
            .state()
            .tanks
            .values()
            .filter(|t| t.belongs_to(tenant_id) && t.supports(phase))
            .cloned()
            .collect();
        tanks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tanks)
    }

    async fn update(&self, tank: &Tank) -> AppResult<()> {
        let mut state = self.state();
        match state.tanks.get_mut(&tank.id) {
            Some(existing) if existing.tenant_id == tank.tenant_id => {
                *existing = tank.clone();
                Ok(())
            }
            _ => Err(AppError::not_found(format!("Tank {} not found", tank.id))),
        }
    }
}

#[async_trait]
impl BatchRepository for MemRepo {
    async fn find_by_id(&self, id: &BatchId, tenant_id: &TenantId) -> AppResult<Option<Batch>> {
        Ok(self
            .state()
            .batches
            .get(id)
            .filter(|b| b.belongs_to(tenant_id))
            .cloned())
    }

    async fn update(&self, batch: &Batch) -> AppResult<()> {
        let mut state = self.state();
        match state.batches.get_mut(&batch.id) {
            Some(existing) if existing.tenant_id == batch.tenant_id => {
                *existing = batch.clone();
                Ok(())
            }
            _ => Err(AppError::not_found(format!("Batch {} not found", batch.id))),
        }
    }
}

#[async_trait]
impl LotRepository for MemRepo {
    async fn find_by_id(&self, id: &LotId, tenant_id: &TenantId) -> AppResult<Option<Lot>> {
        Ok(self
            .state()
            .lots
            .get(id)
            .filter(|l| l.belongs_to(tenant_id))
            .cloned())
    }

    async fn save(&self, lot: &Lot) -> AppResult<()> {
        let mut state = self.state();
        if state.lots.contains_key(&lot.id) {
            return Err(AppError::conflict("Duplicate entry violates unique constraint"));
        }
        state.lots.insert(lot.id, lot.clone());
        Ok(())
    }

    async fn update(&self, lot: &Lot) -> AppResult<()> {
        let mut state = self.state();
        match state.lots.get_mut(&lot.id) {
            Some(existing) if existing.tenant_id == lot.tenant_id => {
                *existing = lot.clone();
                Ok(())
            }
            _ => Err(AppError::not_found(format!("Lot {} not found", lot.id))),
        }
    }

    async fn find_open_by_batch(
        &self,
        batch_id: &BatchId,
        tenant_id: &TenantId,
    ) -> AppResult<Vec<Lot>> {
        let mut lots: Vec<Lot> = self
            .state()
            .lots
            .values()
            .filter(|l| l.belongs_to(tenant_id) && l.is_open() && l.contains_batch(*batch_id))
            .cloned()
            .collect();
        lots.sort_by(|a, b| (a.created_at, &a.lot_code).cmp(&(b.created_at, &b.lot_code)));
        Ok(lots)
    }

    async fn list_open(
        &self,
        phase: Option<BatchPhase>,
        tenant_id: &TenantId,
    ) -> AppResult<Vec<Lot>> {
        let mut lots: Vec<Lot> = self
            .state()
            .lots
            .values()
            .filter(|l| l.belongs_to(tenant_id) && l.is_open())
            .filter(|l| phase.is_none_or(|p| l.phase == p))
            .cloned()
            .collect();
        lots.sort_by(|a, b| a.lot_code.cmp(&b.lot_code));
        Ok(lots)
    }

    async fn add_reading(
        &self,
        lot_id: &LotId,
        _tenant_id: &TenantId,
        readings: &Readings,
        _recorded_by: Option<UserId>,
    ) -> AppResult<()> {
        self.state().readings.push((*lot_id, *readings));
        Ok(())
    }

    async fn list_readings(&self, lot_id: &LotId, _tenant_id: &TenantId) -> AppResult<Vec<Readings>> {
        Ok(self
            .state()
            .readings
            .iter()
            .filter(|(id, _)| id == lot_id)
            .map(|(_, r)| *r)
            .collect())
    }
}

#[async_trait]
impl TankAssignmentRepository for MemRepo {
    async fn find_by_id(
        &self,
        id: &AssignmentId,
        tenant_id: &TenantId,
    ) -> AppResult<Option<TankAssignment>> {
        Ok(self
            .state()
            .assignments
            .get(id)
            .filter(|a| a.belongs_to(tenant_id))
            .cloned())
    }

    async fn save(&self, assignment: &TankAssignment) -> AppResult<()> {
        let mut state = self.state();
        check_constraints(&state, assignment)?;
        state.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn update(&self, assignment: &TankAssignment) -> AppResult<()> {
        let mut state = self.state();
        if !state.assignments.contains_key(&assignment.id) {
            return Err(AppError::not_found(format!(
                "Assignment {} not found",
                assignment.id
            )));
        }
        check_constraints(&state, assignment)?;
        state.assignments.insert(assignment.id, assignment.clone());
        Ok(())
    }

    async fn find_by_lot(&self, lot_id: &LotId, tenant_id: &TenantId) -> AppResult<Vec<TankAssignment>> {
        let mut assignments: Vec<TankAssignment> = self
            .state()
            .assignments
            .values()
            .filter(|a| a.lot_id == *lot_id && a.belongs_to(tenant_id))
            .cloned()
            .collect();
        assignments.sort_by_key(|a| a.window.start());
        Ok(assignments)
    }

    async fn find_open_by_tanks(
        &self,
        tank_ids: &[TankId],
        tenant_id: &TenantId,
    ) -> AppResult<Vec<TankAssignment>> {
        let mut assignments: Vec<TankAssignment> = self
            .state()
            .assignments
            .values()
            .filter(|a| a.belongs_to(tenant_id) && a.is_open() && tank_ids.contains(&a.tank_id))
            .cloned()
            .collect();
        assignments.sort_by_key(|a| a.window.start());
        Ok(assignments)
    }
}

#[async_trait]
impl TransferRepository for MemRepo {
    async fn save(&self, transfer: &Transfer) -> AppResult<()> {
        self.state().transfers.push(transfer.clone());
        Ok(())
    }

    async fn update(&self, transfer: &Transfer) -> AppResult<()> {
        let mut state = self.state();
        match state.transfers.iter_mut().find(|t| t.id == transfer.id) {
            Some(existing) => {
                *existing = transfer.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!("Transfer {} not found", transfer.id))),
        }
    }

    async fn find_by_batch(&self, batch_id: &BatchId, tenant_id: &TenantId) -> AppResult<Vec<Transfer>> {
        Ok(self
            .state()
            .transfers
            .iter()
            .filter(|t| t.batch_id == *batch_id && t.belongs_to(tenant_id))
            .cloned()
            .collect())
    }
}

// ========== 测试数据 ==========

pub fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
}

pub fn liters(value: f64) -> Volume {
    Volume::liters(value)
}

/// 酒厂夹具：一个租户，一个配方，若干罐
pub struct Cellar {
    pub store: MemoryStore,
    pub tenant_id: TenantId,
    pub recipe_id: RecipeId,
}

impl Cellar {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            tenant_id: TenantId::new(),
            recipe_id: RecipeId::new(),
        }
    }

    pub fn policy(&self) -> PlanningPolicy {
        PlanningPolicy::default()
    }

    pub fn tank(&self, name: &str, tank_type: TankType, capacity: f64) -> Tank {
        let tank = Tank::new(self.tenant_id, name, tank_type, liters(capacity), None).unwrap();
        self.store.insert_tank(tank)
    }

    pub fn batch(&self, number: &str, volume: f64, phase: BatchPhase) -> Batch {
        let mut batch = Batch::new(self.tenant_id, number, "Pale Ale", liters(volume))
            .with_recipe(self.recipe_id)
            .with_yeast("US-05")
            .with_style("APA");
        batch.phase = phase;
        if phase != BatchPhase::Planned {
            batch.brewed_at = Some(day(1));
        }
        self.store.insert_batch(batch)
    }
}
