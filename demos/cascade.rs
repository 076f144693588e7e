use std::sync::Arc;

use loan_channel::Backoffice;
use loan_channel::application::LoanType;
use loan_channel::config::LedgerConfig;
use loan_channel::logging::init_tracing;
use loan_channel::notify::LogSink;
use loan_channel::period::Period;
use loan_channel::user::{NewMember, Role};

// builds a small channel, splits a month's target down it and walks one loan to disbursal
fn main() -> anyhow::Result<()> {
    let config = LedgerConfig {
        temporary: true,
        ..LedgerConfig::load()?
    };
    init_tracing(&config)?;

    let office = Backoffice::open(&config, Arc::new(LogSink))?;
    let june = Period::new(6, 2024)?;

    let admin = office.create_admin(NewMember::new("Asha", "asha@channel.test", "9000000001"))?;
    let north = office.add_subordinate(&admin.id, Role::Asm, NewMember::new("North", "north@channel.test", "9000000002"), june)?;
    office.add_subordinate(&admin.id, Role::Asm, NewMember::new("South", "south@channel.test", "9000000003"), june)?;
    let rm = office.add_subordinate(&north.id, Role::Rm, NewMember::new("Ravi", "ravi@channel.test", "9000000004"), june)?;
    let partner = office.add_subordinate(&rm.id, Role::Partner, NewMember::new("Priya", "priya@channel.test", "9000000005"), june)?;
    let customer = office.add_customer(&partner.id, NewMember::new("Kiran", "kiran@mail.test", "9000000006"))?;

    for row in office.assign_bulk("June", "2024", 120_000.0, &admin.id)? {
        println!("{:<8} {} {:>12.2}", row.role, row.assigned_to, row.target_value);
    }

    // a second RM under North takes half of Ravi's share
    office.add_subordinate(&north.id, Role::Rm, NewMember::new("Meera", "meera@channel.test", "9000000007"), june)?;
    for row in office.ledger().targets_in("6", "2024")? {
        println!("{:<8} {} {:>12.2}", row.role, row.assigned_to, row.target_value);
    }

    let app = office.create_application(&partner.id, &customer.id, LoanType::Personal)?;
    for status in ["SUBMITTED", "DOC_COMPLETE", "UNDER_REVIEW", "APPROVED", "AGREEMENT"] {
        office.transition(&app.id, &rm.id, status, "", None)?;
    }
    let (app, event) = office.transition(&app.id, &rm.id, "DISBURSED", "funds released", Some("450000"))?;
    println!(
        "{} is {} ({} recipients), payout eligible: {}",
        app.app_no,
        app.status,
        event.recipients.len(),
        office.check_payout_eligibility(&app.id)?
    );
    app.view_history();

    Ok(())
}
