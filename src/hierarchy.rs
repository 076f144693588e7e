//! Walks over the Admin → ASM → RM → Partner → Customer tree
use crate::application::Application;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::notify::Recipient;
use crate::store::Store;
use crate::user::{Role, User};

// deepest chain is customer → partner → rm → asm → admin
const MAX_DEPTH: usize = 5;

pub fn require_role(user: &User, expected: Role) -> Result<(), ValidationError> {
    if user.role() == expected {
        Ok(())
    } else {
        Err(ValidationError::RoleMismatch {
            id: user.id.clone(),
            expected,
            actual: user.role(),
        })
    }
}

/// ACTIVE direct reports in `role`, ordered by id so cascades are deterministic.
pub fn active_children(store: &Store, parent_id: &str, role: Role) -> CoreResult<Vec<User>> {
    let mut children: Vec<User> = store
        .children_of(parent_id, role)?
        .into_iter()
        .filter(User::is_active)
        .collect();
    children.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(children)
}

pub fn parent_of(store: &Store, user: &User) -> CoreResult<Option<User>> {
    match user.parent_id() {
        Some(parent_id) => Ok(Some(store.require_user(parent_id)?)),
        None => Ok(None),
    }
}

/// Everyone above `user`, nearest first.
pub fn ancestors(store: &Store, user: &User) -> CoreResult<Vec<User>> {
    let mut chain = vec![];
    let mut current = user.clone();
    while let Some(parent) = parent_of(store, &current)? {
        if chain.len() == MAX_DEPTH {
            return Err(CoreError::not_found("admin above", user.id.clone()));
        }
        chain.push(parent.clone());
        current = parent;
    }
    Ok(chain)
}

/// Id of the Super Admin at the top of `user`'s branch.
pub fn root_admin(store: &Store, user: &User) -> CoreResult<String> {
    if user.role() == Role::SuperAdmin {
        return Ok(user.id.clone());
    }
    ancestors(store, user)?
        .into_iter()
        .find(|ancestor| ancestor.role() == Role::SuperAdmin)
        .map(|admin| admin.id)
        .ok_or_else(|| CoreError::not_found("admin above", user.id.clone()))
}

/// Who hears about a status change: the partner, the customer, the RM, the ASM
/// above that RM and every Super Admin. The actor never notifies themselves.
pub fn transition_audience(
    store: &Store,
    app: &Application,
    actor_id: &str,
) -> CoreResult<Vec<Recipient>> {
    let mut audience = vec![
        Recipient::new(app.partner_id.clone(), Role::Partner),
        Recipient::new(app.customer_id.clone(), Role::Customer),
        Recipient::new(app.rm_id.clone(), Role::Rm),
    ];
    if let Some(rm) = store.user(&app.rm_id)? {
        if let Some(asm_id) = rm.parent_id() {
            audience.push(Recipient::new(asm_id.to_string(), Role::Asm));
        }
    }
    for admin in store.users_with_role(Role::SuperAdmin)? {
        audience.push(Recipient::new(admin.id, Role::SuperAdmin));
    }

    let mut seen = std::collections::HashSet::new();
    audience.retain(|recipient| recipient.user_id != actor_id && seen.insert(recipient.user_id.clone()));
    Ok(audience)
}
