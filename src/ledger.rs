//! Monthly target ledger and the hierarchical cascade
//!
//! A cascade splits an amount evenly among the ACTIVE members of one tier,
//! then splits each member's share among its own ACTIVE members, down to the
//! partners. Every share is rounded to cents at every tier. A tier with no
//! active members swallows its share; nothing flows back up. An inactive
//! member's row and everything beneath it is zeroed when its parent is
//! recomputed.
//!
//! Cascades are planned in memory first and committed according to
//! [`CommitMode`]. All cascades under one Super Admin for one month are
//! serialised so concurrent membership changes cannot interleave their reads
//! and writes.
use std::collections::HashSet;
use std::sync::Arc;

use crate::config::CommitMode;
use crate::error::{CoreError, CoreResult, StoreError, ValidationError};
use crate::hierarchy::{active_children, require_role, root_admin};
use crate::locks::KeyedLocks;
use crate::period::Period;
use crate::store::Store;
use crate::target::{Target, TargetKey};
use crate::timestamp::TimeStamp;
use crate::user::{Role, User};
use crate::utils::{even_share, round_cents};

/// Destination of committed cascade rows.
pub trait TargetWriter {
    /// Writes all `rows` or none of them.
    fn write_tier(&self, rows: &[Target]) -> Result<(), StoreError>;
}

impl TargetWriter for Store {
    fn write_tier(&self, rows: &[Target]) -> Result<(), StoreError> {
        self.write_targets(rows)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Share {
    Overwrite,
    Add,
}

/// Rows a cascade will write, grouped by tier from the top down.
#[derive(Debug, Default)]
pub struct CascadePlan {
    tiers: Vec<(Role, Vec<Target>)>,
}

impl CascadePlan {
    pub fn push(&mut self, row: Target) {
        match self.tiers.iter_mut().find(|(tier, _)| *tier == row.role) {
            Some((_, rows)) => rows.push(row),
            None => {
                self.tiers.push((row.role, vec![row]));
                self.tiers.sort_by_key(|(tier, _)| *tier);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tiers.iter().map(|(_, rows)| rows.len()).sum()
    }

    pub fn into_rows(self) -> Vec<Target> {
        self.tiers.into_iter().flat_map(|(_, rows)| rows).collect()
    }
}

/// Commits a plan. In `PerTier` mode a failure after the first tier reports the
/// tiers already written as [`CoreError::PartialCascade`].
pub fn commit(writer: &impl TargetWriter, plan: CascadePlan, mode: CommitMode) -> CoreResult<Vec<Target>> {
    match mode {
        CommitMode::Atomic => {
            let rows = plan.into_rows();
            writer.write_tier(&rows)?;
            Ok(rows)
        }
        CommitMode::PerTier => {
            let mut completed = vec![];
            let mut written = vec![];
            for (tier, rows) in plan.tiers {
                if let Err(source) = writer.write_tier(&rows) {
                    if completed.is_empty() {
                        return Err(source.into());
                    }
                    tracing::warn!(?completed, failed = %tier, "cascade stopped part way");
                    return Err(CoreError::PartialCascade { completed, source });
                }
                completed.push(tier);
                written.extend(rows);
            }
            Ok(written)
        }
    }
}

fn validate_amount(total: f64) -> Result<(), ValidationError> {
    if total.is_finite() && total >= 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidTargetValue(total))
    }
}

fn lock_key(root_admin_id: &str, period: Period) -> String {
    format!("{root_admin_id}:{period}")
}

pub struct TargetLedger {
    store: Arc<Store>,
    locks: KeyedLocks,
    commit_mode: CommitMode,
}

impl TargetLedger {
    pub fn new(store: Arc<Store>, commit_mode: CommitMode) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
            commit_mode,
        }
    }

    /// Splits `total_target` across the issuer's active ASMs and down the tree,
    /// overwriting whatever each row held.
    pub fn assign_bulk(
        &self,
        month: &str,
        year: &str,
        total_target: f64,
        issuer_admin_id: &str,
    ) -> CoreResult<Vec<Target>> {
        let period = Period::parse(month, year)?;
        self.assign(period, total_target, issuer_admin_id, Share::Overwrite)
    }

    /// Same traversal as [`assign_bulk`](Self::assign_bulk) but each share is added
    /// to the existing value, for top-ups within a month.
    pub fn assign_bulk_incremental(
        &self,
        month: &str,
        year: &str,
        total_target: f64,
        issuer_admin_id: &str,
    ) -> CoreResult<Vec<Target>> {
        let period = Period::parse(month, year)?;
        self.assign(period, total_target, issuer_admin_id, Share::Add)
    }

    /// Rebalances the parent of `changed_node_id` after it joined, left, moved or
    /// changed status. A parent without a target for the month is left alone.
    pub fn redistribute_on_membership_change(
        &self,
        tier: Role,
        changed_node_id: &str,
        month: &str,
        year: &str,
    ) -> CoreResult<Vec<Target>> {
        let period = Period::parse(month, year)?;
        self.redistribute_for(tier, changed_node_id, period)
    }

    pub fn redistribute_for(&self, tier: Role, changed_node_id: &str, period: Period) -> CoreResult<Vec<Target>> {
        if !tier.carries_targets() {
            return Err(ValidationError::NotATargetTier(tier).into());
        }
        let node = self.store.require_user(changed_node_id)?;
        require_role(&node, tier)?;
        let parent_id = node
            .parent_id()
            .ok_or_else(|| CoreError::not_found("parent of", changed_node_id))?;
        self.rebalance(&[parent_id.to_string()], period)
    }

    /// Re-splits each parent's current target among its active children and
    /// cascades down. Inactive children and their subtrees are zeroed so their
    /// share stays in the total. Under a parent with no row for the month every
    /// child subtree is zeroed.
    pub fn rebalance(&self, parent_ids: &[String], period: Period) -> CoreResult<Vec<Target>> {
        let parents = parent_ids
            .iter()
            .map(|id| self.store.require_user(id))
            .collect::<CoreResult<Vec<_>>>()?;
        let keys = parents
            .iter()
            .map(|parent| -> CoreResult<String> { Ok(lock_key(&root_admin(&self.store, parent)?, period)) })
            .collect::<CoreResult<Vec<_>>>()?;

        self.locks.run(&keys, || -> CoreResult<Vec<Target>> {
            let mut plan = CascadePlan::default();
            for parent in &parents {
                self.plan_rebalance(&mut plan, parent, period)?;
            }
            if plan.is_empty() {
                tracing::debug!(%period, "nothing to rebalance");
                return Ok(vec![]);
            }
            let rows = commit(self.store.as_ref(), plan, self.commit_mode)?;
            tracing::info!(%period, parents = ?parent_ids, rows = rows.len(), "targets rebalanced");
            Ok(rows)
        })
    }

    /// Recomputes `achieved_value` from applications disbursed in the month.
    pub fn refresh_achievement(&self, assignee_id: &str, month: &str, year: &str) -> CoreResult<Target> {
        let period = Period::parse(month, year)?;
        let assignee = self.store.require_user(assignee_id)?;
        let role = assignee.role();
        if !role.carries_targets() {
            return Err(ValidationError::NotATargetTier(role).into());
        }
        let root = root_admin(&self.store, &assignee)?;
        let key = TargetKey::new(assignee_id, role, period);

        self.locks.run(&[lock_key(&root, period)], || -> CoreResult<Target> {
            let mut target = self
                .store
                .target(&key)?
                .ok_or_else(|| CoreError::not_found("target", key.storage_key()))?;

            let asm_rms: HashSet<String> = if role == Role::Asm {
                self.store
                    .children_of(assignee_id, Role::Rm)?
                    .into_iter()
                    .map(|rm| rm.id)
                    .collect()
            } else {
                HashSet::new()
            };

            let achieved: f64 = self
                .store
                .applications()?
                .iter()
                .filter(|app| app.is_payout_eligible())
                .filter(|app| app.disbursed_at().map(Period::containing) == Some(period))
                .filter(|app| match role {
                    Role::Partner => app.partner_id == assignee_id,
                    Role::Rm => app.rm_id == assignee_id,
                    _ => asm_rms.contains(&app.rm_id),
                })
                .filter_map(|app| app.approved_loan_amount)
                .sum();

            target.achieved_value = round_cents(achieved);
            target.updated_at = TimeStamp::new();
            self.store.write_targets(std::slice::from_ref(&target))?;
            Ok(target)
        })
    }

    pub fn target(&self, assignee_id: &str, role: Role, period: Period) -> CoreResult<Option<Target>> {
        self.store.target(&TargetKey::new(assignee_id, role, period))
    }

    /// Every row held by `assignee_id` for the month, one per role it held.
    pub fn targets_for(&self, assignee_id: &str, month: &str, year: &str) -> CoreResult<Vec<Target>> {
        let period = Period::parse(month, year)?;
        Ok(self
            .store
            .targets_for(assignee_id)?
            .into_iter()
            .filter(|row| row.period == period)
            .collect())
    }

    pub fn targets_in(&self, month: &str, year: &str) -> CoreResult<Vec<Target>> {
        self.store.targets_in(Period::parse(month, year)?)
    }

    fn assign(&self, period: Period, total: f64, issuer_admin_id: &str, share: Share) -> CoreResult<Vec<Target>> {
        validate_amount(total)?;
        let admin = self
            .store
            .user(issuer_admin_id)?
            .filter(|user| user.role() == Role::SuperAdmin)
            .ok_or_else(|| CoreError::not_found("super admin", issuer_admin_id))?;

        self.locks.run(&[lock_key(&admin.id, period)], || -> CoreResult<Vec<Target>> {
            let asms = active_children(&self.store, &admin.id, Role::Asm)?;
            if asms.is_empty() {
                return Err(CoreError::NoAssignees {
                    tier: Role::Asm,
                    parent: admin.id.clone(),
                });
            }

            let mut plan = CascadePlan::default();
            if share == Share::Overwrite {
                for asm in self.store.children_of(&admin.id, Role::Asm)? {
                    if !asm.is_active() {
                        self.plan_zero(&mut plan, &admin.id, &asm, period)?;
                    }
                }
            }
            let per_asm = even_share(total, asms.len());
            self.plan_tier(&mut plan, &admin.id, &asms, per_asm, period, share)?;

            let rows = commit(self.store.as_ref(), plan, self.commit_mode)?;
            tracing::info!(
                issuer = %admin.id,
                %period,
                total,
                mode = ?share,
                asms = asms.len(),
                rows = rows.len(),
                "bulk target assignment"
            );
            Ok(rows)
        })
    }

    fn plan_rebalance(&self, plan: &mut CascadePlan, parent: &User, period: Period) -> CoreResult<()> {
        let Some(child_role) = parent.role().child().filter(Role::carries_targets) else {
            return Ok(());
        };
        let children = self.store.children_of(&parent.id, child_role)?;

        // an admin has no row of its own: its total is what its ASMs hold
        let total = if parent.role() == Role::SuperAdmin {
            let mut held = vec![];
            for child in &children {
                if let Some(row) = self.store.target(&TargetKey::new(child.id.clone(), child_role, period))? {
                    held.push(row.target_value);
                }
            }
            if held.is_empty() {
                return Ok(());
            }
            held.iter().sum::<f64>()
        } else {
            match self.store.target(&TargetKey::new(parent.id.clone(), parent.role(), period))? {
                Some(row) => row.target_value,
                None => {
                    // members moved in under a parent with nothing to hand down carry nothing
                    for child in &children {
                        self.plan_zero(plan, &parent.id, child, period)?;
                    }
                    return Ok(());
                }
            }
        };

        let (mut active, inactive): (Vec<User>, Vec<User>) =
            children.into_iter().partition(User::is_active);
        if active.is_empty() {
            tracing::debug!(parent = %parent.id, %period, "no active members, share not cascaded");
            return Ok(());
        }
        active.sort_by(|a, b| a.id.cmp(&b.id));

        for member in &inactive {
            self.plan_zero(plan, &parent.id, member, period)?;
        }

        let share = even_share(total, active.len());
        self.plan_tier(plan, &parent.id, &active, share, period, Share::Overwrite)
    }

    // one row per member, then recurse into each member's own active reports
    fn plan_tier(
        &self,
        plan: &mut CascadePlan,
        assigned_by: &str,
        members: &[User],
        share: f64,
        period: Period,
        mode: Share,
    ) -> CoreResult<()> {
        for member in members {
            let role = member.role();
            let key = TargetKey::new(member.id.clone(), role, period);
            let mut row = match self.store.target(&key)? {
                Some(existing) => existing,
                None => Target::new(key, assigned_by, 0.0),
            };
            row.target_value = match mode {
                Share::Overwrite => share,
                Share::Add => round_cents(row.target_value + share),
            };
            row.assigned_by = assigned_by.to_string();
            row.updated_at = TimeStamp::new();
            tracing::debug!(assignee = %member.id, %role, value = row.target_value, "target planned");
            plan.push(row);

            let Some(child_role) = role.child().filter(Role::carries_targets) else {
                continue;
            };
            let (mut children, inactive): (Vec<User>, Vec<User>) = self
                .store
                .children_of(&member.id, child_role)?
                .into_iter()
                .partition(User::is_active);
            if mode == Share::Overwrite {
                for child in &inactive {
                    self.plan_zero(plan, &member.id, child, period)?;
                }
            }
            if children.is_empty() {
                continue;
            }
            children.sort_by(|a, b| a.id.cmp(&b.id));
            let child_share = even_share(share, children.len());
            self.plan_tier(plan, &member.id, &children, child_share, period, mode)?;
        }
        Ok(())
    }

    /// Zeroes `member`'s row for the month and every row beneath it.
    fn plan_zero(&self, plan: &mut CascadePlan, assigned_by: &str, member: &User, period: Period) -> CoreResult<()> {
        let role = member.role();
        if let Some(mut row) = self.store.target(&TargetKey::new(member.id.clone(), role, period))? {
            if row.target_value != 0.0 {
                row.target_value = 0.0;
                row.assigned_by = assigned_by.to_string();
                row.updated_at = TimeStamp::new();
                plan.push(row);
            }
        }
        let Some(child_role) = role.child().filter(Role::carries_targets) else {
            return Ok(());
        };
        for child in self.store.children_of(&member.id, child_role)? {
            self.plan_zero(plan, &member.id, &child, period)?;
        }
        Ok(())
    }
}
