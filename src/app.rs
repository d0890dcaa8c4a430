//! Wiring of the services over one database
use super::admin::AdminService;
use super::config::Settings;
use super::directory::UserDirectory;
use super::error::LeaveResult;
use super::identity::{IdentityVerifier, SignInService};
use super::service::LeaveService;
use super::session::SessionKeys;
use super::store::LeaveStore;
use std::sync::Arc;

pub struct LeaveApp {
    pub directory: Arc<UserDirectory>,
    pub leaves: LeaveService,
    pub admin: AdminService,
}

impl LeaveApp {
    pub fn new(db: &sled::Db, email_domain: &str) -> LeaveResult<Self> {
        let directory = Arc::new(UserDirectory::open(db, email_domain)?);
        let store = LeaveStore::open(db)?;

        Ok(Self {
            leaves: LeaveService::new(store.clone(), Arc::clone(&directory)),
            admin: AdminService::new(Arc::clone(&directory), store),
            directory,
        })
    }

    pub fn from_settings(settings: &Settings) -> LeaveResult<Self> {
        let db = settings.open_database()?;
        Self::new(&db, &settings.institution.email_domain)
    }

    pub fn sign_in<V: IdentityVerifier>(&self, verifier: V, keys: SessionKeys) -> SignInService<V> {
        SignInService::new(verifier, Arc::clone(&self.directory), keys)
    }
}
