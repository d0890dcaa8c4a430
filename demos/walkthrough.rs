//! Walk through a leave request from sign-in to statistics.
//!
//! Uses `config/default.*` and `LEAVE__*` variables when present, otherwise a
//! throwaway database for the `college.edu` domain.
use anyhow::Context;
use chrono::{Duration, Utc};
use leave_approval::{
    Actor, ContactBlock, EmergencyContact, LeaveApp, LeaveDraft, LeaveError, LeaveResult, LeaveType,
    Role, config::Settings, directory::ProfileAttrs, identity::{IdentityVerifier, VerifiedIdentity},
    session::SessionKeys, telemetry,
};

/// Accepts credentials of the form `demo:<email>`
struct DemoVerifier;

impl IdentityVerifier for DemoVerifier {
    fn verify(&self, credential: &str) -> LeaveResult<VerifiedIdentity> {
        let email = credential
            .strip_prefix("demo:")
            .ok_or(LeaveError::InvalidCredential)?;
        Ok(VerifiedIdentity {
            email: email.to_string(),
            display_name: "Demo Student".to_string(),
            external_id: format!("demo-{email}"),
            avatar_url: None,
        })
    }
}

fn main() -> anyhow::Result<()> {
    telemetry::init("info")?;

    let (app, keys, domain) = match Settings::load() {
        Ok(settings) => (
            LeaveApp::from_settings(&settings)?,
            settings.session_keys(),
            settings.institution.email_domain.clone(),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "no configuration found, using a temporary database");
            let db = sled::Config::new().temporary(true).open()?;
            let domain = "college.edu".to_string();
            (
                LeaveApp::new(&db, &domain)?,
                SessionKeys::new(b"walkthrough-secret", Duration::hours(1)),
                domain,
            )
        }
    };

    // a student signs in for the first time and gets a session token
    let sign_in = app.sign_in(DemoVerifier, keys);
    let session = sign_in
        .sign_in(&format!("demo:student@{domain}"))
        .context("sign-in failed")?;
    let student = sign_in.keys().verify(&session.token)?.actor();

    let warden = app
        .directory
        .find_or_create(&format!("warden@{domain}"), ProfileAttrs::new("Demo Warden", Role::Warden))?;
    let admin = app
        .directory
        .find_or_create(&format!("admin@{domain}"), ProfileAttrs::new("Demo Admin", Role::Admin))?;

    // start after anything booked by earlier runs against the same database
    let start = app
        .leaves
        .list_own(&student)?
        .iter()
        .map(|leave| leave.to_date.to_datetime_utc())
        .fold(Utc::now(), |latest, to| latest.max(to))
        + Duration::days(10);
    let draft = LeaveDraft::new()
        .set_from_date(start.into())
        .set_to_date((start + Duration::days(2)).into())
        .set_reason("Going home for a family function")
        .set_leave_type(LeaveType::Home)
        .set_contact(ContactBlock::new(
            "14 Temple Street, Madurai",
            "9840012345",
            EmergencyContact::new("Lakshmi", "Mother", "9840054321"),
        ));
    let leave = app.leaves.submit(&student, &draft)?;

    let warden = Actor::new(warden.id, warden.role);
    let approved = app
        .leaves
        .approve(&warden, &leave.id, Some("Approved, safe travels"))?;
    tracing::info!(
        leave_id = %approved.id,
        days = approved.duration_days(),
        status = %approved.status,
        "walkthrough request decided"
    );

    let admin = Actor::new(admin.id, admin.role);
    let stats = app.admin.statistics(&admin)?;
    tracing::info!(statistics = %serde_json::to_string(&stats)?, "current statistics");

    Ok(())
}
