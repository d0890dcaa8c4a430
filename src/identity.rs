//! Sign-in through an external identity provider
use super::access::Role;
use super::directory::{ProfileAttrs, StudentProfile, User, UserDirectory};
use super::error::{LeaveError, LeaveResult};
use super::leave::TimeStamp;
use super::session::SessionKeys;
use super::validation;
use std::sync::Arc;

/// What the identity provider asserts about the holder of a credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedIdentity {
    pub email: String,
    pub display_name: String,
    pub external_id: String,
    pub avatar_url: Option<String>,
}

/// Exchanges an opaque credential for a verified identity.
///
/// Implementations return [`LeaveError::InvalidCredential`] when the provider
/// refuses the credential.
pub trait IdentityVerifier: Send + Sync {
    fn verify(&self, credential: &str) -> LeaveResult<VerifiedIdentity>;
}

#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

pub struct SignInService<V> {
    verifier: V,
    directory: Arc<UserDirectory>,
    keys: SessionKeys,
}

impl<V: IdentityVerifier> SignInService<V> {
    pub fn new(verifier: V, directory: Arc<UserDirectory>, keys: SessionKeys) -> Self {
        Self {
            verifier,
            directory,
            keys,
        }
    }

    pub fn keys(&self) -> &SessionKeys {
        &self.keys
    }

    pub fn sign_in(&self, credential: &str) -> LeaveResult<Session> {
        self.sign_in_inner(credential)
            .inspect_err(|e| e.log("sign_in"))
    }

    fn sign_in_inner(&self, credential: &str) -> LeaveResult<Session> {
        let identity = self.verifier.verify(credential)?;

        // the provider's word is not enough, the institution domain is checked here too
        if validation::validate_email_domain(&identity.email, self.directory.email_domain()).is_err() {
            tracing::warn!(email = %identity.email, "sign-in from outside the institution domain");
            return Err(LeaveError::Forbidden(format!(
                "{} is not an institution account",
                identity.email
            )));
        }

        let user = self
            .directory
            .find_or_create(&identity.email, first_sign_in_profile(&identity))?;
        if !user.is_active {
            return Err(LeaveError::Forbidden(format!(
                "account {} is deactivated",
                user.id
            )));
        }

        let user = self.directory.record_login(&user.id, TimeStamp::new())?;
        let token = self.keys.issue(&user.id, user.role)?;
        tracing::info!(user_id = %user.id, role = %user.role, "signed in");
        Ok(Session { token, user })
    }
}

/// New accounts start as first-year students identified by their email's
/// local part until an admin or the student corrects the profile.
fn first_sign_in_profile(identity: &VerifiedIdentity) -> ProfileAttrs {
    let local = identity
        .email
        .split('@')
        .next()
        .unwrap_or_default()
        .to_uppercase();
    ProfileAttrs::new(&identity.display_name, Role::Student)
        .set_student(StudentProfile::new(&local, 1))
        .set_external(&identity.external_id, identity.avatar_url.as_deref())
}
