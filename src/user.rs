//! Directory records: one base record per user with a role specific profile
use std::fmt;

use chrono::Utc;

use crate::timestamp::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    #[n(0)]
    SuperAdmin,
    #[n(1)]
    Asm,
    #[n(2)]
    Rm,
    #[n(3)]
    Partner,
    #[n(4)]
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "SUPER_ADMIN",
            Role::Asm => "ASM",
            Role::Rm => "RM",
            Role::Partner => "PARTNER",
            Role::Customer => "CUSTOMER",
        }
    }

    /// The tier this role reports to.
    pub fn parent(&self) -> Option<Role> {
        match self {
            Role::SuperAdmin => None,
            Role::Asm => Some(Role::SuperAdmin),
            Role::Rm => Some(Role::Asm),
            Role::Partner => Some(Role::Rm),
            Role::Customer => Some(Role::Partner),
        }
    }

    /// The tier reporting to this role.
    pub fn child(&self) -> Option<Role> {
        match self {
            Role::SuperAdmin => Some(Role::Asm),
            Role::Asm => Some(Role::Rm),
            Role::Rm => Some(Role::Partner),
            Role::Partner => Some(Role::Customer),
            Role::Customer => None,
        }
    }

    /// ASM, RM and Partner carry monthly targets.
    pub fn carries_targets(&self) -> bool {
        matches!(self, Role::Asm | Role::Rm | Role::Partner)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserStatus {
    #[n(0)]
    Active,
    #[n(1)]
    Pending,
    #[n(2)]
    Suspended,
}

// parent links are lookups into the directory, never ownership
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    #[n(0)]
    SuperAdmin,
    #[n(1)]
    Asm {
        #[n(0)]
        asm_code: String,
        #[n(1)]
        admin_id: String,
    },
    #[n(2)]
    Rm {
        #[n(0)]
        rm_code: String,
        #[n(1)]
        asm_id: String,
    },
    #[n(3)]
    Partner {
        #[n(0)]
        partner_code: String,
        #[n(1)]
        rm_id: String,
    },
    #[n(4)]
    Customer {
        #[n(0)]
        partner_id: String,
    },
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct User {
    #[n(0)]
    pub id: String, // bech32 encoded uuid7
    #[n(1)]
    pub name: String,
    #[n(2)]
    pub email: String,
    #[n(3)]
    pub phone: String,
    #[n(4)]
    pub employee_id: Option<String>, // staff only
    #[n(5)]
    pub status: UserStatus,
    #[n(6)]
    pub profile: Profile,
    #[n(7)]
    pub created_at: TimeStamp<Utc>,
    #[n(8)]
    pub deleted_at: Option<TimeStamp<Utc>>,
}

/// Contact details supplied when registering someone.
#[derive(Debug, Clone)]
pub struct NewMember {
    pub name: String,
    pub email: String,
    pub phone: String,
}

impl NewMember {
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }
}

impl Profile {
    pub fn role(&self) -> Role {
        match self {
            Profile::SuperAdmin => Role::SuperAdmin,
            Profile::Asm { .. } => Role::Asm,
            Profile::Rm { .. } => Role::Rm,
            Profile::Partner { .. } => Role::Partner,
            Profile::Customer { .. } => Role::Customer,
        }
    }
}

impl User {
    pub fn role(&self) -> Role {
        self.profile.role()
    }

    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }

    pub fn parent_id(&self) -> Option<&str> {
        match &self.profile {
            Profile::SuperAdmin => None,
            Profile::Asm { admin_id, .. } => Some(admin_id),
            Profile::Rm { asm_id, .. } => Some(asm_id),
            Profile::Partner { rm_id, .. } => Some(rm_id),
            Profile::Customer { partner_id } => Some(partner_id),
        }
    }

    /// Repoints the parent link. The role payload is otherwise unchanged.
    pub fn set_parent_id(&mut self, parent: String) {
        match &mut self.profile {
            Profile::SuperAdmin => {}
            Profile::Asm { admin_id, .. } => *admin_id = parent,
            Profile::Rm { asm_id, .. } => *asm_id = parent,
            Profile::Partner { rm_id, .. } => *rm_id = parent,
            Profile::Customer { partner_id } => *partner_id = parent,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match &self.profile {
            Profile::Asm { asm_code, .. } => Some(asm_code),
            Profile::Rm { rm_code, .. } => Some(rm_code),
            Profile::Partner { partner_code, .. } => Some(partner_code),
            Profile::SuperAdmin | Profile::Customer { .. } => None,
        }
    }

    /// Unique keys the store indexes this user under.
    pub fn unique_keys(&self) -> Vec<String> {
        let mut keys = vec![
            format!("email:{}", self.email.to_ascii_lowercase()),
            format!("phone:{}", self.phone),
        ];
        if let Some(employee_id) = &self.employee_id {
            keys.push(format!("employee:{employee_id}"));
        }
        if let Some(code) = self.code() {
            keys.push(format!("code:{code}"));
        }
        keys
    }
}
