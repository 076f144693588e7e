//! sled persistence for users, targets, applications and payouts
//!
//! Every record is a minicbor document in its own tree. Multi-record writes go
//! through sled batches or transactions so each call is all-or-nothing.
use std::sync::Arc;

use sled::transaction::{ConflictableTransactionError, TransactionError};
use sled::{Batch, Db, Transactional, Tree};

use crate::application::Application;
use crate::config::LedgerConfig;
use crate::error::{CoreError, CoreResult, StoreError, ValidationError};
use crate::payout::Payout;
use crate::period::Period;
use crate::target::{Target, TargetKey};
use crate::user::{Role, User};

fn encode<T: minicbor::Encode<()>>(value: &T) -> Result<Vec<u8>, StoreError> {
    Ok(minicbor::to_vec(value)?)
}

fn decode<T: for<'b> minicbor::Decode<'b, ()>>(bytes: &[u8]) -> Result<T, StoreError> {
    Ok(minicbor::decode(bytes)?)
}

fn decode_all<T: for<'b> minicbor::Decode<'b, ()>>(tree: &Tree) -> Result<Vec<T>, StoreError> {
    let mut out = vec![];
    for item in tree.iter() {
        let (_, value) = item?;
        out.push(decode(&value)?);
    }
    Ok(out)
}

fn abort(err: impl Into<CoreError>) -> ConflictableTransactionError<CoreError> {
    ConflictableTransactionError::Abort(err.into())
}

// index entries: "{parent}/{ROLE}/{user}" and "{customer}/{application}"
fn report_key(parent_id: &str, role: Role, user_id: &str) -> String {
    format!("{parent_id}/{role}/{user_id}")
}

fn index_id(key: &[u8]) -> Option<String> {
    let key = std::str::from_utf8(key).ok()?;
    key.rsplit('/').next().map(str::to_string)
}

fn flatten(err: TransactionError<CoreError>) -> CoreError {
    match err {
        TransactionError::Abort(err) => err,
        TransactionError::Storage(err) => err.into(),
    }
}

pub struct Store {
    instance: Arc<Db>,
    users: Tree,
    reports: Tree,
    unique_keys: Tree,
    targets: Tree,
    applications: Tree,
    customer_applications: Tree,
    payouts: Tree,
    counters: Tree,
}

impl Store {
    pub fn new(instance: Arc<Db>) -> CoreResult<Self> {
        Ok(Self {
            users: instance.open_tree("users")?,
            reports: instance.open_tree("reports")?,
            unique_keys: instance.open_tree("unique_keys")?,
            targets: instance.open_tree("targets")?,
            applications: instance.open_tree("applications")?,
            customer_applications: instance.open_tree("customer_applications")?,
            payouts: instance.open_tree("payouts")?,
            counters: instance.open_tree("counters")?,
            instance,
        })
    }

    pub fn open(config: &LedgerConfig) -> CoreResult<Self> {
        // sled picks a fresh scratch path for temporary databases without an explicit path
        let mut builder = sled::Config::new().temporary(config.temporary);
        if !config.temporary {
            builder = builder.path(&config.db_path);
        }
        Self::new(Arc::new(builder.open()?))
    }

    pub fn flush(&self) -> CoreResult<()> {
        self.instance.flush()?;
        Ok(())
    }

    /// Allocates the next value of a per-prefix sequence, starting at 1.
    /// `update_and_fetch` makes the allocation exactly-once across callers.
    pub fn next_sequence(&self, prefix: &str) -> CoreResult<u64> {
        let stored = self.counters.update_and_fetch(prefix, |old| {
            let current = old
                .and_then(|bytes| <[u8; 8]>::try_from(bytes).ok())
                .map(u64::from_be_bytes)
                .unwrap_or(0);
            Some((current + 1).to_be_bytes().to_vec())
        })?;

        let value = stored
            .and_then(|bytes| <[u8; 8]>::try_from(bytes.as_ref()).ok())
            .map(u64::from_be_bytes)
            .unwrap_or(1);
        Ok(value)
    }

    // users

    pub fn user(&self, id: &str) -> CoreResult<Option<User>> {
        match self.users.get(id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn require_user(&self, id: &str) -> CoreResult<User> {
        self.user(id)?
            .ok_or_else(|| CoreError::not_found("user", id))
    }

    /// Inserts a new user, claiming its unique keys and its slot under its
    /// parent in the same transaction.
    pub fn insert_user(&self, user: &User) -> CoreResult<()> {
        let bytes = encode(user)?;
        let keys = user.unique_keys();
        let report = user.parent_id().map(|parent| report_key(parent, user.role(), &user.id));

        (&self.users, &self.unique_keys, &self.reports)
            .transaction(|(users, unique, reports)| {
                if users.get(user.id.as_bytes())?.is_some() {
                    return Err(abort(ValidationError::DuplicateKey(user.id.clone())));
                }
                for key in &keys {
                    if unique.get(key.as_bytes())?.is_some() {
                        return Err(abort(ValidationError::DuplicateKey(key.clone())));
                    }
                }
                for key in &keys {
                    unique.insert(key.as_bytes(), user.id.as_bytes())?;
                }
                if let Some(report) = &report {
                    reports.insert(report.as_bytes(), b"")?;
                }
                users.insert(user.id.as_bytes(), bytes.clone())?;
                Ok(())
            })
            .map_err(flatten)
    }

    /// Rewrites existing users in one transaction, moving their parent index
    /// entries along. Unique keys are not touched.
    pub fn update_users(&self, updated: &[User]) -> CoreResult<()> {
        let encoded = updated
            .iter()
            .map(|user| Ok((user, encode(user)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        (&self.users, &self.reports)
            .transaction(|(users, reports)| {
                for (user, bytes) in &encoded {
                    let Some(current) = users.get(user.id.as_bytes())? else {
                        return Err(abort(CoreError::not_found("user", user.id.clone())));
                    };
                    let stored: User = decode(&current).map_err(abort)?;
                    if stored.parent_id() != user.parent_id() {
                        if let Some(old) = stored.parent_id() {
                            reports.remove(report_key(old, stored.role(), &user.id).as_bytes())?;
                        }
                        if let Some(new) = user.parent_id() {
                            reports.insert(report_key(new, user.role(), &user.id).as_bytes(), b"")?;
                        }
                    }
                    users.insert(user.id.as_bytes(), bytes.clone())?;
                }
                Ok(())
            })
            .map_err(flatten)
    }

    pub fn users(&self) -> CoreResult<Vec<User>> {
        Ok(decode_all(&self.users)?)
    }

    pub fn users_with_role(&self, role: Role) -> CoreResult<Vec<User>> {
        Ok(self
            .users()?
            .into_iter()
            .filter(|user| user.role() == role)
            .collect())
    }

    /// Direct reports of `parent_id` in the given role, any status.
    pub fn children_of(&self, parent_id: &str, role: Role) -> CoreResult<Vec<User>> {
        let mut out = vec![];
        for item in self.reports.scan_prefix(format!("{parent_id}/{role}/")) {
            let (key, _) = item?;
            if let Some(id) = index_id(&key) {
                out.push(self.require_user(&id)?);
            }
        }
        Ok(out)
    }

    // targets

    pub fn target(&self, key: &TargetKey) -> CoreResult<Option<Target>> {
        match self.targets.get(key.storage_key())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Upserts a set of target rows as one atomic batch.
    pub fn write_targets(&self, rows: &[Target]) -> Result<(), StoreError> {
        let mut batch = Batch::default();
        for row in rows {
            batch.insert(row.key().storage_key().as_bytes(), encode(row)?);
        }
        self.targets.apply_batch(batch)?;
        Ok(())
    }

    pub fn targets_for(&self, assignee: &str) -> CoreResult<Vec<Target>> {
        let mut out = vec![];
        for item in self.targets.scan_prefix(format!("{assignee}/")) {
            let (_, value) = item?;
            out.push(decode(&value)?);
        }
        Ok(out)
    }

    pub fn targets_in(&self, period: Period) -> CoreResult<Vec<Target>> {
        Ok(decode_all::<Target>(&self.targets)?
            .into_iter()
            .filter(|target| target.period == period)
            .collect())
    }

    // applications

    pub fn application(&self, id: &str) -> CoreResult<Option<Application>> {
        match self.applications.get(id)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn require_application(&self, id: &str) -> CoreResult<Application> {
        self.application(id)?
            .ok_or_else(|| CoreError::not_found("application", id))
    }

    pub fn applications(&self) -> CoreResult<Vec<Application>> {
        Ok(decode_all(&self.applications)?)
    }

    /// Applications opened for `customer_id`, oldest id first.
    pub fn applications_of(&self, customer_id: &str) -> CoreResult<Vec<Application>> {
        let mut out = vec![];
        for item in self.customer_applications.scan_prefix(format!("{customer_id}/")) {
            let (key, _) = item?;
            if let Some(id) = index_id(&key) {
                out.push(self.require_application(&id)?);
            }
        }
        Ok(out)
    }

    pub fn insert_application(&self, app: &Application) -> CoreResult<()> {
        let bytes = encode(app)?;
        let index = format!("{}/{}", app.customer_id, app.id);

        (&self.applications, &self.customer_applications)
            .transaction(|(apps, by_customer)| {
                if apps.get(app.id.as_bytes())?.is_some() {
                    return Err(abort(CoreError::Conflict(app.id.clone())));
                }
                apps.insert(app.id.as_bytes(), bytes.clone())?;
                by_customer.insert(index.as_bytes(), b"")?;
                Ok(())
            })
            .map_err(flatten)
    }

    /// Writes `app` if the stored version still equals `app.version`, then bumps
    /// the version. A rejected application's customer is written in the same
    /// transaction.
    pub fn save_application(&self, app: &mut Application, customer: Option<&User>) -> CoreResult<()> {
        let expected = app.version;
        app.version = expected + 1;
        let app_bytes = match encode(app) {
            Ok(bytes) => bytes,
            Err(err) => {
                app.version = expected;
                return Err(err.into());
            }
        };
        let customer_bytes = match customer.map(encode).transpose() {
            Ok(bytes) => bytes,
            Err(err) => {
                app.version = expected;
                return Err(err.into());
            }
        };
        let app_id = app.id.clone();

        let result = (&self.applications, &self.users)
            .transaction(|(apps, users)| {
                let Some(current) = apps.get(app_id.as_bytes())? else {
                    return Err(abort(CoreError::not_found("application", app_id.clone())));
                };
                let stored: Application = decode(&current).map_err(abort)?;
                if stored.version != expected {
                    return Err(abort(CoreError::Conflict(app_id.clone())));
                }
                apps.insert(app_id.as_bytes(), app_bytes.clone())?;
                if let (Some(user), Some(bytes)) = (customer, customer_bytes.as_ref()) {
                    users.insert(user.id.as_bytes(), bytes.clone())?;
                }
                Ok(())
            })
            .map_err(flatten);

        if result.is_err() {
            app.version = expected;
        }
        result
    }

    // payouts

    pub fn payout(&self, application_id: &str, partner_id: &str) -> CoreResult<Option<Payout>> {
        match self.payouts.get(Payout::storage_key(application_id, partner_id))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn put_payout(&self, payout: &Payout) -> CoreResult<()> {
        self.payouts.insert(
            Payout::storage_key(&payout.application_id, &payout.partner_id),
            encode(payout)?,
        )?;
        Ok(())
    }
}
