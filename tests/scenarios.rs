use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Context;
use loan_channel::application::{ApplicationStatus, LoanType};
use loan_channel::config::LedgerConfig;
use loan_channel::notify::{MemorySink, Notification};
use loan_channel::period::Period;
use loan_channel::store::Store;
use loan_channel::target::TargetKey;
use loan_channel::user::{NewMember, Role, User, UserStatus};
use loan_channel::{Backoffice, CoreError, ValidationError};

use tempfile::{TempDir, tempdir}; // Use for test db cleanup.

static PEOPLE: AtomicUsize = AtomicUsize::new(0);

fn person(name: &str) -> NewMember {
    let n = PEOPLE.fetch_add(1, Ordering::SeqCst);
    NewMember::new(format!("{name} {n}"), format!("{name}.{n}@channel.test"), format!("90000{n:05}"))
}

// Each test gets its own sled database under a temp dir, sled holds a file lock per path.
fn backoffice(name: &str) -> anyhow::Result<(TempDir, Backoffice, Arc<MemorySink>)> {
    let temp_dir = tempdir()?;
    let config = LedgerConfig {
        db_path: temp_dir.path().join(format!("{name}.db")),
        ..LedgerConfig::default()
    };
    let sink = Arc::new(MemorySink::new());
    let office = Backoffice::open(&config, sink.clone())?;
    Ok((temp_dir, office, sink))
}

fn june() -> Period {
    Period::new(6, 2024).expect("valid period")
}

fn target_of(office: &Backoffice, user: &User, period: Period) -> anyhow::Result<f64> {
    let row = office
        .store()
        .target(&TargetKey::new(user.id.clone(), user.role(), period))?
        .with_context(|| format!("no target for {}", user.id))?;
    Ok(row.target_value)
}

/// A single branch down to a customer, for lifecycle tests.
struct Branch {
    admin: User,
    asm: User,
    rm: User,
    partner: User,
    customer: User,
}

fn branch(office: &Backoffice) -> anyhow::Result<Branch> {
    let admin = office.create_admin(person("admin"))?;
    let asm = office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?;
    let rm = office.add_subordinate(&asm.id, Role::Rm, person("rm"), june())?;
    let partner = office.add_subordinate(&rm.id, Role::Partner, person("partner"), june())?;
    let customer = office.add_customer(&partner.id, person("customer"))?;
    Ok(Branch {
        admin,
        asm,
        rm,
        partner,
        customer,
    })
}

/// Applies each status in `path` in order, as the owning RM.
fn advance(office: &Backoffice, app_id: &str, rm_id: &str, path: &[&str]) -> anyhow::Result<()> {
    for status in path {
        office.transition(app_id, rm_id, status, "", None)?;
    }
    Ok(())
}

const TO_UNDER_REVIEW: [&str; 3] = ["SUBMITTED", "DOC_COMPLETE", "UNDER_REVIEW"];
const TO_AGREEMENT: [&str; 5] = ["SUBMITTED", "DOC_COMPLETE", "UNDER_REVIEW", "APPROVED", "AGREEMENT"];

#[test]
fn bulk_assign_splits_down_each_tier() -> anyhow::Result<()> {
    let (_dir, office, sink) = backoffice("bulk_assign")?;

    let admin = office.create_admin(person("admin"))?;
    let asm_with_team = office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?;
    let lone_asm_1 = office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?;
    let lone_asm_2 = office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?;

    let mut rms = vec![];
    let mut partners = vec![];
    for _ in 0..2 {
        let rm = office.add_subordinate(&asm_with_team.id, Role::Rm, person("rm"), june())?;
        partners.push(office.add_subordinate(&rm.id, Role::Partner, person("partner"), june())?);
        rms.push(rm);
    }
    // nothing was assigned yet, so registration wrote no targets
    assert!(sink.take().is_empty());

    let rows = office
        .assign_bulk("6", "2024", 120_000.0, &admin.id)
        .context("bulk assignment failed")?;
    assert_eq!(rows.len(), 7);

    for asm in [&asm_with_team, &lone_asm_1, &lone_asm_2] {
        assert_eq!(target_of(&office, asm, june())?, 40_000.0);
    }
    for rm in &rms {
        assert_eq!(target_of(&office, rm, june())?, 20_000.0);
    }
    for partner in &partners {
        assert_eq!(target_of(&office, partner, june())?, 20_000.0);
    }

    let announced = sink.take();
    assert_eq!(announced.len(), 7);
    assert!(announced.iter().all(|n| matches!(n, Notification::TargetAssigned(_))));
    Ok(())
}

/// Month names and numbers address the same rows.
#[test]
fn month_names_normalise() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("month_names")?;
    let admin = office.create_admin(person("admin"))?;
    let asm = office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?;

    office.assign_bulk("June", "2024", 10_000.0, &admin.id)?;
    office.assign_bulk("06", "2024", 12_000.0, &admin.id)?;
    assert_eq!(target_of(&office, &asm, june())?, 12_000.0);

    let err = office.assign_bulk("13", "2024", 1.0, &admin.id).unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::InvalidMonth(_))));
    let err = office.assign_bulk("6", "24", 1.0, &admin.id).unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::InvalidYear(_))));
    Ok(())
}

#[test]
fn bulk_assign_needs_active_asms() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("no_assignees")?;
    let admin = office.create_admin(person("admin"))?;

    let err = office.assign_bulk("6", "2024", 1_000.0, &admin.id).unwrap_err();
    assert!(matches!(err, CoreError::NoAssignees { tier: Role::Asm, .. }));

    let asm = office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?;
    office.set_status(&asm.id, UserStatus::Suspended, june())?;
    let err = office.assign_bulk("6", "2024", 1_000.0, &admin.id).unwrap_err();
    assert!(matches!(err, CoreError::NoAssignees { .. }));

    let err = office.assign_bulk("6", "2024", 1_000.0, &asm.id).unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    Ok(())
}

#[test]
fn repeated_bulk_is_idempotent_incremental_adds() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("idempotence")?;
    let b = branch(&office)?;

    office.assign_bulk("6", "2024", 9_000.0, &b.admin.id)?;
    office.assign_bulk("6", "2024", 9_000.0, &b.admin.id)?;
    assert_eq!(target_of(&office, &b.partner, june())?, 9_000.0);

    office.assign_bulk_incremental("6", "2024", 1_000.0, &b.admin.id)?;
    office.assign_bulk_incremental("6", "2024", 1_000.0, &b.admin.id)?;
    assert_eq!(target_of(&office, &b.asm, june())?, 11_000.0);
    assert_eq!(target_of(&office, &b.partner, june())?, 11_000.0);
    Ok(())
}

/// A new ASM under an admin that already distributed this month takes an even
/// slice of the existing total.
#[test]
fn new_asm_rebalances_admin_total() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("new_asm")?;
    let admin = office.create_admin(person("admin"))?;
    let mut asms = vec![];
    for _ in 0..3 {
        asms.push(office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?);
    }
    office.assign_bulk("6", "2024", 120_000.0, &admin.id)?;

    asms.push(office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?);
    for asm in &asms {
        assert_eq!(target_of(&office, asm, june())?, 30_000.0);
    }
    // another month is untouched
    let july = Period::new(7, 2024)?;
    assert!(office.ledger().targets_in("7", "2024")?.is_empty());
    assert!(office.store().target(&TargetKey::new(asms[0].id.clone(), Role::Asm, july))?.is_none());
    Ok(())
}

#[test]
fn new_rm_splits_asm_target_and_cascades() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("new_rm")?;
    let b = branch(&office)?;
    office.assign_bulk("6", "2024", 50_000.0, &b.admin.id)?;

    let rm2 = office.add_subordinate(&b.asm.id, Role::Rm, person("rm"), june())?;
    let p2 = office.add_subordinate(&rm2.id, Role::Partner, person("partner"), june())?;

    assert_eq!(target_of(&office, &b.rm, june())?, 25_000.0);
    assert_eq!(target_of(&office, &rm2, june())?, 25_000.0);
    assert_eq!(target_of(&office, &b.partner, june())?, 25_000.0);
    assert_eq!(target_of(&office, &p2, june())?, 25_000.0);
    Ok(())
}

/// Moving an RM recomputes both the ASM it left and the ASM it joined.
#[test]
fn reassignment_recomputes_both_parents() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("reassign")?;
    let admin = office.create_admin(person("admin"))?;
    let asm_a = office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?;
    let asm_b = office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?;
    let r1 = office.add_subordinate(&asm_a.id, Role::Rm, person("rm"), june())?;
    let r2 = office.add_subordinate(&asm_a.id, Role::Rm, person("rm"), june())?;
    let r3 = office.add_subordinate(&asm_b.id, Role::Rm, person("rm"), june())?;
    office.assign_bulk("6", "2024", 100_000.0, &admin.id)?;
    assert_eq!(target_of(&office, &r2, june())?, 25_000.0);

    office.reassign(&asm_a.id, &asm_b.id, &[r2.id.clone()], june())?;

    assert_eq!(target_of(&office, &r1, june())?, 50_000.0);
    assert_eq!(target_of(&office, &r2, june())?, 25_000.0);
    assert_eq!(target_of(&office, &r3, june())?, 25_000.0);
    assert_eq!(office.directory().get(&r2.id)?.parent_id(), Some(asm_b.id.as_str()));

    // moving someone who does not report to the source is refused
    let err = office.reassign(&asm_a.id, &asm_b.id, &[r3.id.clone()], june()).unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::InvalidParent { .. })));
    Ok(())
}

/// Suspension zeroes the member's row and hands its share to active siblings.
#[test]
fn suspension_conserves_parent_total() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("suspension")?;
    let b = branch(&office)?;
    let rm2 = office.add_subordinate(&b.asm.id, Role::Rm, person("rm"), june())?;
    office.assign_bulk("6", "2024", 30_000.0, &b.admin.id)?;
    assert_eq!(target_of(&office, &rm2, june())?, 15_000.0);

    office.set_status(&rm2.id, UserStatus::Suspended, june())?;
    assert_eq!(target_of(&office, &rm2, june())?, 0.0);
    assert_eq!(target_of(&office, &b.rm, june())?, 30_000.0);
    assert_eq!(target_of(&office, &b.partner, june())?, 30_000.0);

    office.set_status(&rm2.id, UserStatus::Active, june())?;
    assert_eq!(target_of(&office, &rm2, june())?, 15_000.0);
    assert_eq!(target_of(&office, &b.rm, june())?, 15_000.0);
    Ok(())
}

/// A suspended RM's partners give up their shares along with the RM.
#[test]
fn suspension_zeroes_the_whole_subtree() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("suspension_subtree")?;
    let admin = office.create_admin(person("admin"))?;
    let asm = office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?;
    let r1 = office.add_subordinate(&asm.id, Role::Rm, person("rm"), june())?;
    let r2 = office.add_subordinate(&asm.id, Role::Rm, person("rm"), june())?;
    let p1 = office.add_subordinate(&r1.id, Role::Partner, person("partner"), june())?;
    let p2 = office.add_subordinate(&r2.id, Role::Partner, person("partner"), june())?;
    office.assign_bulk("6", "2024", 100.0, &admin.id)?;

    office.set_status(&r2.id, UserStatus::Suspended, june())?;

    assert_eq!(target_of(&office, &asm, june())?, 100.0);
    assert_eq!(target_of(&office, &r1, june())?, 100.0);
    assert_eq!(target_of(&office, &r2, june())?, 0.0);
    assert_eq!(target_of(&office, &p1, june())?, 100.0);
    assert_eq!(target_of(&office, &p2, june())?, 0.0);

    // a later bulk run keeps the suspended branch at zero
    office.assign_bulk("6", "2024", 300.0, &admin.id)?;
    assert_eq!(target_of(&office, &p1, june())?, 300.0);
    assert_eq!(target_of(&office, &p2, june())?, 0.0);
    Ok(())
}

/// Moving an RM under an ASM with no target for the month leaves it with
/// nothing, while the ASM it left keeps its whole total.
#[test]
fn reassignment_to_unassigned_parent_clears_moved_branch() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("reassign_unassigned")?;
    let admin = office.create_admin(person("admin"))?;
    let other_admin = office.create_admin(person("admin"))?;
    let asm_a = office.add_subordinate(&admin.id, Role::Asm, person("asm"), june())?;
    let asm_b = office.add_subordinate(&other_admin.id, Role::Asm, person("asm"), june())?;
    let r1 = office.add_subordinate(&asm_a.id, Role::Rm, person("rm"), june())?;
    let r2 = office.add_subordinate(&asm_a.id, Role::Rm, person("rm"), june())?;
    let p2 = office.add_subordinate(&r2.id, Role::Partner, person("partner"), june())?;
    office.assign_bulk("6", "2024", 80_000.0, &admin.id)?;
    assert_eq!(target_of(&office, &p2, june())?, 40_000.0);

    office.reassign(&asm_a.id, &asm_b.id, &[r2.id.clone()], june())?;

    assert_eq!(target_of(&office, &r1, june())?, 80_000.0);
    assert_eq!(target_of(&office, &r2, june())?, 0.0);
    assert_eq!(target_of(&office, &p2, june())?, 0.0);
    let rm_total: f64 = office
        .ledger()
        .targets_in("6", "2024")?
        .iter()
        .filter(|row| row.role == Role::Rm)
        .map(|row| row.target_value)
        .sum();
    assert_eq!(rm_total, 80_000.0);
    Ok(())
}

#[test]
fn redistribution_checks_tier_and_is_noop_without_target() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("redistribute")?;
    let b = branch(&office)?;

    let rows = office.redistribute_on_membership_change(Role::Rm, &b.rm.id, "6", "2024")?;
    assert!(rows.is_empty());

    let err = office
        .redistribute_on_membership_change(Role::Partner, &b.rm.id, "6", "2024")
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::RoleMismatch { .. })));
    let err = office
        .redistribute_on_membership_change(Role::Customer, &b.customer.id, "6", "2024")
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::NotATargetTier(_))));

    office.assign_bulk("6", "2024", 8_000.0, &b.admin.id)?;
    let rows = office.redistribute_on_membership_change(Role::Rm, &b.rm.id, "6", "2024")?;
    assert_eq!(rows.len(), 2);
    Ok(())
}

/// Concurrent registrations under one ASM must leave a consistent split.
#[test]
fn concurrent_additions_keep_sums_consistent() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("concurrent")?;
    let b = branch(&office)?;
    office.assign_bulk("6", "2024", 60_000.0, &b.admin.id)?;

    let office = Arc::new(office);
    let handles: Vec<_> = (0..5)
        .map(|_| {
            let office = office.clone();
            let asm_id = b.asm.id.clone();
            std::thread::spawn(move || office.add_subordinate(&asm_id, Role::Rm, person("rm"), june()))
        })
        .collect();
    for handle in handles {
        handle.join().expect("thread panicked")?;
    }

    let rms = office.store().children_of(&b.asm.id, Role::Rm)?;
    assert_eq!(rms.len(), 6);
    for rm in &rms {
        assert_eq!(target_of(&office, rm, june())?, 10_000.0);
    }
    Ok(())
}

#[test]
fn rejection_marks_application_and_customer_for_purge() -> anyhow::Result<()> {
    let (_dir, office, sink) = backoffice("reject")?;
    let b = branch(&office)?;
    let app = office.create_application(&b.partner.id, &b.customer.id, LoanType::Personal)?;
    assert_eq!(app.app_no, "APP000001");
    advance(&office, &app.id, &b.rm.id, &TO_UNDER_REVIEW)?;
    sink.take();

    let (app, event) = office.transition(&app.id, &b.rm.id, "REJECTED", "insufficient income", None)?;

    assert_eq!(app.status, ApplicationStatus::Rejected);
    assert_eq!(app.stage_history().len(), 5);
    let last = app.last_stage().context("history is empty")?;
    assert_eq!(last.note, "insufficient income");
    assert_eq!(last.from, Some(ApplicationStatus::UnderReview));
    assert_eq!(app.approved_loan_amount, None);

    let expiry = last.at.plus_days(90);
    assert_eq!(app.deleted_at.as_ref(), Some(&expiry));
    let customer = office.directory().get(&b.customer.id)?;
    assert_eq!(customer.deleted_at, Some(expiry));

    let ids: Vec<&str> = event.recipients.iter().map(|r| r.user_id.as_str()).collect();
    assert!(!ids.contains(&b.rm.id.as_str()));
    for expected in [&b.partner.id, &b.customer.id, &b.asm.id, &b.admin.id] {
        assert!(ids.contains(&expected.as_str()));
    }
    assert!(matches!(sink.take().as_slice(), [Notification::StatusChanged(_)]));

    let err = office.transition(&app.id, &b.rm.id, "SUBMITTED", "", None).unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::IllegalTransition { .. })));
    Ok(())
}

/// When the notification audience cannot be resolved nothing is written.
#[test]
fn failed_audience_lookup_leaves_application_untouched() -> anyhow::Result<()> {
    let temp_dir = tempdir()?;
    let db = Arc::new(sled::open(temp_dir.path().join("audience.db"))?);
    let store = Arc::new(Store::new(db.clone())?);
    let office = Backoffice::with_store(store, &LedgerConfig::default(), Arc::new(MemorySink::new()));
    let b = branch(&office)?;
    let app = office.create_application(&b.partner.id, &b.customer.id, LoanType::Personal)?;

    // the RM's record no longer decodes
    db.open_tree("users")?.insert(b.rm.id.as_bytes(), &b"\xff\xff"[..])?;

    assert!(office.transition(&app.id, &b.rm.id, "SUBMITTED", "", None).is_err());
    let stored = office.lifecycle().get(&app.id)?;
    assert_eq!(stored.status, ApplicationStatus::Draft);
    assert_eq!(stored.version, app.version);
    assert_eq!(stored.stage_history(), app.stage_history());
    Ok(())
}

#[test]
fn disbursement_requires_amount_then_unlocks_payout() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("disburse")?;
    let b = branch(&office)?;
    let app = office.create_application(&b.partner.id, &b.customer.id, LoanType::HomeLoanSalaried)?;
    advance(&office, &app.id, &b.rm.id, &TO_AGREEMENT)?;

    for amount in [None, Some("four lakh")] {
        let err = office
            .transition(&app.id, &b.rm.id, "DISBURSED", "", amount)
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
    let unchanged = office.lifecycle().get(&app.id)?;
    assert_eq!(unchanged.status, ApplicationStatus::Agreement);
    assert_eq!(unchanged.stage_history().len(), 6);
    assert!(!office.check_payout_eligibility(&app.id)?);
    assert!(office.record_payout(&app.id, &b.partner.id, 1_000.0).is_err());

    let (app, _) = office.transition(&app.id, &b.rm.id, "disbursed", "funds released", Some("450000"))?;
    assert_eq!(app.approved_loan_amount, Some(450_000.0));
    assert!(office.check_payout_eligibility(&app.id)?);
    assert!(app.verify_history()?);

    let payout = office.record_payout(&app.id, &b.partner.id, 4_500.0)?;
    assert_eq!(payout.amount, 4_500.0);
    office.payouts().mark_done(&app.id, &b.partner.id)?;
    assert!(office.record_payout(&app.id, &b.partner.id, 5_000.0).is_err());
    Ok(())
}

#[test]
fn only_the_owning_rm_may_transition() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("ownership")?;
    let b = branch(&office)?;
    let other_rm = office.add_subordinate(&b.asm.id, Role::Rm, person("rm"), june())?;
    let app = office.create_application(&b.partner.id, &b.customer.id, LoanType::Business)?;

    let err = office.transition(&app.id, &other_rm.id, "SUBMITTED", "", None).unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    let err = office.transition(&app.id, &b.rm.id, "ON_HOLD", "", None).unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::UnknownStatus(_))));
    assert_eq!(office.lifecycle().get(&app.id)?.stage_history().len(), 1);
    Ok(())
}

#[test]
fn one_open_application_per_customer() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("one_open")?;
    let b = branch(&office)?;
    office.create_application(&b.partner.id, &b.customer.id, LoanType::Personal)?;

    let err = office
        .create_application(&b.partner.id, &b.customer.id, LoanType::Business)
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::OpenApplicationExists(_))));
    Ok(())
}

#[test]
fn documents_reupload_forces_review() -> anyhow::Result<()> {
    use loan_channel::application::DocStatus;

    let (_dir, office, _sink) = backoffice("documents")?;
    let b = branch(&office)?;
    let app = office.create_application(&b.partner.id, &b.customer.id, LoanType::Personal)?;

    let app = office.upload_document(&app.id, &b.partner.id, "PAN", "s3://docs/pan-v1")?;
    assert_eq!(app.docs[0].status, DocStatus::Pending);
    let app = office.review_document(&app.id, &b.rm.id, "PAN", DocStatus::Verified, Some("ok".into()))?;
    assert_eq!(app.docs[0].status, DocStatus::Verified);

    let app = office.upload_document(&app.id, &b.partner.id, "PAN", "s3://docs/pan-v2")?;
    assert_eq!(app.docs[0].status, DocStatus::Updated);
    assert_eq!(app.docs[0].remarks, None);
    assert_eq!(app.docs[0].url, "s3://docs/pan-v2");

    let err = office
        .review_document(&app.id, &b.rm.id, "PAN", DocStatus::Pending, None)
        .unwrap_err();
    assert!(matches!(err, CoreError::Validation(ValidationError::InvalidVerdict)));
    let err = office
        .upload_document(&app.id, &b.rm.id, "PAN", "s3://docs/pan-v3")
        .unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
    Ok(())
}

/// Achievement is recomputed from disbursals in the target's month.
#[test]
fn achievement_follows_disbursals() -> anyhow::Result<()> {
    let (_dir, office, _sink) = backoffice("achievement")?;
    let b = branch(&office)?;
    let now = Period::current();
    let (month, year) = (now.month().to_string(), now.year().to_string());
    office.assign_bulk(&month, &year, 1_000_000.0, &b.admin.id)?;

    let app = office.create_application(&b.partner.id, &b.customer.id, LoanType::Personal)?;
    advance(&office, &app.id, &b.rm.id, &TO_AGREEMENT)?;
    office.transition(&app.id, &b.rm.id, "DISBURSED", "", Some("450000"))?;

    for who in [&b.partner, &b.rm, &b.asm] {
        let row = office.ledger().refresh_achievement(&who.id, &month, &year)?;
        assert_eq!(row.achieved_value, 450_000.0);
        assert_eq!(row.target_value, 1_000_000.0);
    }
    let rows = office.ledger().targets_for(&b.partner.id, &month, &year)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].achieved_value, 450_000.0);
    Ok(())
}
