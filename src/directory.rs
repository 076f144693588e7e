//! Registration and restructuring of the channel hierarchy
//!
//! Every change that alters who reports to whom, or who is ACTIVE, rebalances
//! the affected parents' targets for the given month through the ledger.
use std::sync::Arc;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::hierarchy::require_role;
use crate::ledger::TargetLedger;
use crate::period::Period;
use crate::store::Store;
use crate::target::Target;
use crate::timestamp::TimeStamp;
use crate::user::{NewMember, Profile, Role, User, UserStatus};
use crate::utils::{USER_HRP, format_code, new_uuid_to_bech32};

const EMPLOYEE_PREFIX: &str = "EMP";

fn code_prefix(role: Role) -> Option<&'static str> {
    match role {
        Role::Asm => Some("ASM"),
        Role::Rm => Some("RM"),
        Role::Partner => Some("PTR"),
        Role::SuperAdmin | Role::Customer => None,
    }
}

pub struct Directory {
    store: Arc<Store>,
    ledger: Arc<TargetLedger>,
}

impl Directory {
    pub fn new(store: Arc<Store>, ledger: Arc<TargetLedger>) -> Self {
        Self { store, ledger }
    }

    pub fn get(&self, user_id: &str) -> CoreResult<User> {
        self.store.require_user(user_id)
    }

    pub fn create_admin(&self, member: NewMember) -> CoreResult<User> {
        let user = self.staff(member, Profile::SuperAdmin)?;
        self.store.insert_user(&user)?;
        tracing::info!(id = %user.id, "super admin created");
        Ok(user)
    }

    /// Registers an ASM, RM or partner under `parent_id` and rebalances the
    /// parent's target for `period`.
    pub fn add_subordinate(
        &self,
        parent_id: &str,
        role: Role,
        member: NewMember,
        period: Period,
    ) -> CoreResult<(User, Vec<Target>)> {
        let parent = self.store.require_user(parent_id)?;
        let Some(prefix) = code_prefix(role) else {
            return Err(ValidationError::NotATargetTier(role).into());
        };
        if role.parent() != Some(parent.role()) {
            return Err(ValidationError::InvalidParent {
                child: role,
                parent: parent.role(),
            }
            .into());
        }
        if !parent.is_active() {
            return Err(ValidationError::InactiveUser(parent.id).into());
        }

        let code = format_code(prefix, self.store.next_sequence(prefix)?, 4);
        let parent_link = parent.id.clone();
        let profile = match role {
            Role::Asm => Profile::Asm {
                asm_code: code,
                admin_id: parent_link,
            },
            Role::Rm => Profile::Rm {
                rm_code: code,
                asm_id: parent_link,
            },
            _ => Profile::Partner {
                partner_code: code,
                rm_id: parent_link,
            },
        };
        let user = self.staff(member, profile)?;
        self.store.insert_user(&user)?;
        tracing::info!(id = %user.id, %role, parent = %parent.id, code = ?user.code(), "subordinate added");

        let rows = self.ledger.rebalance(&[parent.id], period)?;
        Ok((user, rows))
    }

    pub fn add_customer(&self, partner_id: &str, member: NewMember) -> CoreResult<User> {
        let partner = self.store.require_user(partner_id)?;
        require_role(&partner, Role::Partner)?;
        if !partner.is_active() {
            return Err(ValidationError::InactiveUser(partner.id).into());
        }

        let user = User {
            id: new_uuid_to_bech32(USER_HRP)?,
            name: member.name,
            email: member.email,
            phone: member.phone,
            employee_id: None,
            status: UserStatus::Active,
            profile: Profile::Customer {
                partner_id: partner.id,
            },
            created_at: TimeStamp::new(),
            deleted_at: None,
        };
        self.store.insert_user(&user)?;
        tracing::info!(id = %user.id, partner = %partner_id, "customer added");
        Ok(user)
    }

    /// Moves `member_ids` from one parent to another of the same tier, then
    /// rebalances both parents. Moved members take their new parent's split.
    pub fn reassign(
        &self,
        from_parent_id: &str,
        to_parent_id: &str,
        member_ids: &[String],
        period: Period,
    ) -> CoreResult<Vec<Target>> {
        let from = self.store.require_user(from_parent_id)?;
        let to = self.store.require_user(to_parent_id)?;
        require_role(&to, from.role())?;
        if !to.is_active() {
            return Err(ValidationError::InactiveUser(to.id).into());
        }
        let child_role = from
            .role()
            .child()
            .ok_or_else(|| CoreError::not_found("subordinates of", from.id.clone()))?;
        if from.id == to.id || member_ids.is_empty() {
            return Ok(vec![]);
        }

        let mut moved = Vec::with_capacity(member_ids.len());
        for id in member_ids {
            let mut member = self.store.require_user(id)?;
            require_role(&member, child_role)?;
            if member.parent_id() != Some(from.id.as_str()) {
                return Err(ValidationError::InvalidParent {
                    child: child_role,
                    parent: from.role(),
                }
                .into());
            }
            member.set_parent_id(to.id.clone());
            moved.push(member);
        }
        self.store.update_users(&moved)?;
        tracing::info!(from = %from.id, to = %to.id, moved = moved.len(), %child_role, "members reassigned");

        if child_role.carries_targets() {
            self.ledger.rebalance(&[from.id, to.id], period)
        } else {
            Ok(vec![])
        }
    }

    /// Activates or deactivates a user and rebalances its parent.
    pub fn set_status(&self, user_id: &str, status: UserStatus, period: Period) -> CoreResult<(User, Vec<Target>)> {
        let mut user = self.store.require_user(user_id)?;
        if user.status == status {
            return Ok((user, vec![]));
        }
        user.status = status;
        self.store.update_users(std::slice::from_ref(&user))?;
        tracing::info!(id = %user.id, role = %user.role(), ?status, "status changed");

        let rows = match user.parent_id() {
            Some(parent_id) if user.role().carries_targets() => {
                self.ledger.rebalance(&[parent_id.to_string()], period)?
            }
            _ => vec![],
        };
        Ok((user, rows))
    }

    fn staff(&self, member: NewMember, profile: Profile) -> CoreResult<User> {
        let employee_id = format_code(EMPLOYEE_PREFIX, self.store.next_sequence(EMPLOYEE_PREFIX)?, 6);
        Ok(User {
            id: new_uuid_to_bech32(USER_HRP)?,
            name: member.name,
            email: member.email,
            phone: member.phone,
            employee_id: Some(employee_id),
            status: UserStatus::Active,
            profile,
            created_at: TimeStamp::new(),
            deleted_at: None,
        })
    }
}
