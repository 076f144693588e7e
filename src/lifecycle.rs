//! Application lifecycle engine
//!
//! Owns every write to an application after creation: status transitions with
//! their side effects, and the document sub-state. Writes are version checked
//! so two concurrent transitions on one application cannot both land.
use std::sync::Arc;

use crate::application::{Application, ApplicationStatus, DocStatus, LoanType, Origination};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::hierarchy::{require_role, transition_audience};
use crate::locks::KeyedLocks;
use crate::notify::TransitionEvent;
use crate::store::Store;
use crate::timestamp::TimeStamp;
use crate::user::Role;
use crate::utils::{APPLICATION_HRP, format_code, new_uuid_to_bech32};

const APP_NO_PREFIX: &str = "APP";

/// The amount accompanying a DISBURSED transition, as received from the caller.
fn parse_approved_amount(raw: Option<&str>) -> Result<f64, ValidationError> {
    let raw = raw.ok_or(ValidationError::MissingApprovedAmount)?;
    match raw.trim().parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount >= 0.0 => Ok(amount),
        _ => Err(ValidationError::InvalidApprovedAmount(raw.to_string())),
    }
}

pub struct ApplicationLifecycle {
    store: Arc<Store>,
    creation: KeyedLocks,
    rejection_ttl_days: i64,
}

impl ApplicationLifecycle {
    pub fn new(store: Arc<Store>, rejection_ttl_days: i64) -> Self {
        Self {
            store,
            creation: KeyedLocks::new(),
            rejection_ttl_days,
        }
    }

    pub fn get(&self, application_id: &str) -> CoreResult<Application> {
        self.store.require_application(application_id)
    }

    /// Opens a DRAFT application for one of the partner's customers, snapshotting
    /// the partner's current RM.
    pub fn create_application(
        &self,
        partner_id: &str,
        customer_id: &str,
        loan_type: LoanType,
    ) -> CoreResult<Application> {
        let partner = self.store.require_user(partner_id)?;
        require_role(&partner, Role::Partner)?;
        if !partner.is_active() {
            return Err(ValidationError::InactiveUser(partner.id).into());
        }
        let rm_id = partner
            .parent_id()
            .ok_or_else(|| CoreError::not_found("rm of", partner_id))?
            .to_string();

        let customer = self
            .store
            .user(customer_id)?
            .filter(|user| user.role() == Role::Customer && user.parent_id() == Some(partner_id))
            .ok_or_else(|| CoreError::not_found("customer", customer_id))?;
        if customer.deleted_at.is_some() {
            return Err(ValidationError::InactiveUser(customer.id).into());
        }

        self.creation.run(&[customer.id.clone()], || -> CoreResult<Application> {
            let open = self
                .store
                .applications_of(&customer.id)?
                .iter()
                .any(Application::is_open);
            if open {
                return Err(ValidationError::OpenApplicationExists(customer.id.clone()).into());
            }

            let app_no = format_code(APP_NO_PREFIX, self.store.next_sequence(APP_NO_PREFIX)?, 6);
            let app = Application::new(
                new_uuid_to_bech32(APPLICATION_HRP)?,
                app_no,
                loan_type,
                Origination {
                    partner_id: partner.id.clone(),
                    rm_id: rm_id.clone(),
                    customer_id: customer.id.clone(),
                },
                partner.id.clone(),
            );
            self.store.insert_application(&app)?;
            tracing::info!(id = %app.id, app_no = %app.app_no, customer = %customer.id, "application created");
            Ok(app)
        })
    }

    /// Moves an application owned by `actor_id` (its RM) to `to_status`.
    ///
    /// Input is validated before anything is written. A rejection marks both the
    /// application and its customer for purge, in the same write as the status.
    pub fn transition(
        &self,
        application_id: &str,
        actor_id: &str,
        to_status: &str,
        note: &str,
        approved_loan_amount: Option<&str>,
    ) -> CoreResult<(Application, TransitionEvent)> {
        let to: ApplicationStatus = to_status.parse()?;
        let mut app = self
            .store
            .application(application_id)?
            .filter(|app| app.rm_id == actor_id)
            .ok_or_else(|| CoreError::not_found("application", application_id))?;
        let amount = match to {
            ApplicationStatus::Disbursed => Some(parse_approved_amount(approved_loan_amount)?),
            _ => None,
        };

        let from = app.status;
        let at = TimeStamp::new();
        app.apply_transition(to, actor_id, note, at.clone(), amount)?;

        let customer = if to == ApplicationStatus::Rejected {
            let expiry = at.plus_days(self.rejection_ttl_days);
            let mut customer = self.store.require_user(&app.customer_id)?;
            customer.deleted_at = Some(expiry.clone());
            app.deleted_at = Some(expiry);
            Some(customer)
        } else {
            None
        };

        // resolved before the write so a lookup failure leaves nothing stored
        let recipients = transition_audience(&self.store, &app, actor_id)?;
        self.store.save_application(&mut app, customer.as_ref())?;
        tracing::info!(
            app_no = %app.app_no,
            %from,
            %to,
            actor = %actor_id,
            recipients = recipients.len(),
            "application transitioned"
        );

        let event = TransitionEvent {
            application_id: app.id.clone(),
            app_no: app.app_no.clone(),
            from,
            to,
            actor_id: actor_id.to_string(),
            note: note.to_string(),
            at,
            recipients,
        };
        Ok((app, event))
    }

    pub fn check_payout_eligibility(&self, application_id: &str) -> CoreResult<bool> {
        Ok(self.store.require_application(application_id)?.is_payout_eligible())
    }

    /// Uploads or replaces a document. Only the originating partner may upload.
    pub fn upload_document(
        &self,
        application_id: &str,
        partner_id: &str,
        doc_type: &str,
        url: &str,
    ) -> CoreResult<Application> {
        let mut app = self
            .store
            .application(application_id)?
            .filter(|app| app.partner_id == partner_id)
            .ok_or_else(|| CoreError::not_found("application", application_id))?;
        if app.status.is_terminal() {
            return Err(ValidationError::ApplicationClosed(app.id).into());
        }

        let status = app.upsert_document(doc_type, url, TimeStamp::new()).status;
        self.store.save_application(&mut app, None)?;
        tracing::debug!(app_no = %app.app_no, %doc_type, ?status, "document uploaded");
        Ok(app)
    }

    pub fn review_document(
        &self,
        application_id: &str,
        rm_id: &str,
        doc_type: &str,
        verdict: DocStatus,
        remarks: Option<String>,
    ) -> CoreResult<Application> {
        if !matches!(verdict, DocStatus::Verified | DocStatus::Rejected) {
            return Err(ValidationError::InvalidVerdict.into());
        }
        let mut app = self
            .store
            .application(application_id)?
            .filter(|app| app.rm_id == rm_id)
            .ok_or_else(|| CoreError::not_found("application", application_id))?;
        if app.status.is_terminal() {
            return Err(ValidationError::ApplicationClosed(app.id).into());
        }

        if app.review_document(doc_type, verdict, remarks, TimeStamp::new()).is_none() {
            return Err(CoreError::not_found("document", doc_type));
        }
        self.store.save_application(&mut app, None)?;
        tracing::debug!(app_no = %app.app_no, %doc_type, ?verdict, "document reviewed");
        Ok(app)
    }
}
