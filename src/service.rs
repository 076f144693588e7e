//! Back-office facade over the ledger, directory, lifecycle and payouts
//!
//! Callers that want notifications go through here; the underlying services
//! only describe events. Delivery failures are logged and never undo a write.
use std::sync::Arc;

use crate::application::{Application, DocStatus, LoanType};
use crate::config::LedgerConfig;
use crate::directory::Directory;
use crate::error::CoreResult;
use crate::ledger::TargetLedger;
use crate::lifecycle::ApplicationLifecycle;
use crate::notify::{Notification, NotificationSink, TargetEvent, TransitionEvent};
use crate::payout::{Payout, PayoutLedger};
use crate::period::Period;
use crate::store::Store;
use crate::target::Target;
use crate::user::{NewMember, Role, User, UserStatus};

pub struct Backoffice {
    store: Arc<Store>,
    ledger: Arc<TargetLedger>,
    directory: Directory,
    lifecycle: ApplicationLifecycle,
    payouts: PayoutLedger,
    sink: Arc<dyn NotificationSink>,
}

impl Backoffice {
    pub fn open(config: &LedgerConfig, sink: Arc<dyn NotificationSink>) -> CoreResult<Self> {
        let store = Arc::new(Store::open(config)?);
        Ok(Self::with_store(store, config, sink))
    }

    pub fn with_store(store: Arc<Store>, config: &LedgerConfig, sink: Arc<dyn NotificationSink>) -> Self {
        let ledger = Arc::new(TargetLedger::new(store.clone(), config.commit_mode));
        Self {
            directory: Directory::new(store.clone(), ledger.clone()),
            lifecycle: ApplicationLifecycle::new(store.clone(), config.rejection_ttl_days),
            payouts: PayoutLedger::new(store.clone()),
            ledger,
            store,
            sink,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn ledger(&self) -> &TargetLedger {
        &self.ledger
    }

    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    pub fn lifecycle(&self) -> &ApplicationLifecycle {
        &self.lifecycle
    }

    pub fn payouts(&self) -> &PayoutLedger {
        &self.payouts
    }

    // targets

    pub fn assign_bulk(&self, month: &str, year: &str, total_target: f64, issuer_admin_id: &str) -> CoreResult<Vec<Target>> {
        let rows = self.ledger.assign_bulk(month, year, total_target, issuer_admin_id)?;
        self.announce_targets(&rows);
        Ok(rows)
    }

    pub fn assign_bulk_incremental(
        &self,
        month: &str,
        year: &str,
        total_target: f64,
        issuer_admin_id: &str,
    ) -> CoreResult<Vec<Target>> {
        let rows = self
            .ledger
            .assign_bulk_incremental(month, year, total_target, issuer_admin_id)?;
        self.announce_targets(&rows);
        Ok(rows)
    }

    pub fn redistribute_on_membership_change(
        &self,
        tier: Role,
        changed_node_id: &str,
        month: &str,
        year: &str,
    ) -> CoreResult<Vec<Target>> {
        let rows = self
            .ledger
            .redistribute_on_membership_change(tier, changed_node_id, month, year)?;
        self.announce_targets(&rows);
        Ok(rows)
    }

    // hierarchy

    pub fn create_admin(&self, member: NewMember) -> CoreResult<User> {
        self.directory.create_admin(member)
    }

    pub fn add_subordinate(&self, parent_id: &str, role: Role, member: NewMember, period: Period) -> CoreResult<User> {
        let (user, rows) = self.directory.add_subordinate(parent_id, role, member, period)?;
        self.announce_targets(&rows);
        Ok(user)
    }

    pub fn add_customer(&self, partner_id: &str, member: NewMember) -> CoreResult<User> {
        self.directory.add_customer(partner_id, member)
    }

    pub fn reassign(
        &self,
        from_parent_id: &str,
        to_parent_id: &str,
        member_ids: &[String],
        period: Period,
    ) -> CoreResult<Vec<Target>> {
        let rows = self
            .directory
            .reassign(from_parent_id, to_parent_id, member_ids, period)?;
        self.announce_targets(&rows);
        Ok(rows)
    }

    pub fn set_status(&self, user_id: &str, status: UserStatus, period: Period) -> CoreResult<User> {
        let (user, rows) = self.directory.set_status(user_id, status, period)?;
        self.announce_targets(&rows);
        Ok(user)
    }

    // applications

    pub fn create_application(&self, partner_id: &str, customer_id: &str, loan_type: LoanType) -> CoreResult<Application> {
        self.lifecycle.create_application(partner_id, customer_id, loan_type)
    }

    pub fn transition(
        &self,
        application_id: &str,
        actor_id: &str,
        to_status: &str,
        note: &str,
        approved_loan_amount: Option<&str>,
    ) -> CoreResult<(Application, TransitionEvent)> {
        let (app, event) = self
            .lifecycle
            .transition(application_id, actor_id, to_status, note, approved_loan_amount)?;
        self.dispatch(&Notification::StatusChanged(event.clone()));
        Ok((app, event))
    }

    pub fn check_payout_eligibility(&self, application_id: &str) -> CoreResult<bool> {
        self.lifecycle.check_payout_eligibility(application_id)
    }

    pub fn upload_document(&self, application_id: &str, partner_id: &str, doc_type: &str, url: &str) -> CoreResult<Application> {
        self.lifecycle.upload_document(application_id, partner_id, doc_type, url)
    }

    pub fn review_document(
        &self,
        application_id: &str,
        rm_id: &str,
        doc_type: &str,
        verdict: DocStatus,
        remarks: Option<String>,
    ) -> CoreResult<Application> {
        self.lifecycle
            .review_document(application_id, rm_id, doc_type, verdict, remarks)
    }

    pub fn record_payout(&self, application_id: &str, partner_id: &str, amount: f64) -> CoreResult<Payout> {
        self.payouts.record(application_id, partner_id, amount)
    }

    fn announce_targets(&self, rows: &[Target]) {
        for row in rows {
            self.dispatch(&Notification::TargetAssigned(TargetEvent::from(row)));
        }
    }

    fn dispatch(&self, notification: &Notification) {
        if let Err(err) = self.sink.deliver(notification) {
            tracing::warn!(error = %err, message = %notification.message(), "notification not delivered");
        }
    }
}
