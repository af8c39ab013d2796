//! Application services, one per resource, sharing the repositories and collaborators.

use std::sync::Arc;

use crate::integrations::{DelayedDispatch, EmailSender, EventBus, ObjectStorage};
use crate::store::Repositories;

pub mod analytics;
pub mod auth;
pub mod catalog;
pub mod coupons;
pub mod customers;
pub mod orders;
pub mod referrals;
pub mod reminders;
pub mod uploads;
pub mod verification;

pub use analytics::AnalyticsService;
pub use auth::TokenService;
pub use catalog::CatalogService;
pub use coupons::CouponService;
pub use customers::CustomerService;
pub use orders::OrderService;
pub use referrals::ReferralService;
pub use reminders::ReminderService;
pub use uploads::UploadService;
pub use verification::VerificationService;

/// External collaborators the services are built from.
#[derive(Clone)]
pub struct Collaborators {
    pub dispatcher: Arc<dyn DelayedDispatch>,
    pub email: Arc<dyn EmailSender>,
    pub storage: Arc<dyn ObjectStorage>,
    pub events: EventBus,
}

/// Reminder scheduling settings.
#[derive(Clone, Debug, Default)]
pub struct ReminderSettings {
    pub app_base_url: Option<String>,
    pub delays_secs: Vec<u64>,
}

#[derive(Clone)]
pub struct Services {
    pub catalog: CatalogService,
    pub customers: CustomerService,
    pub verification: VerificationService,
    pub coupons: CouponService,
    pub referrals: ReferralService,
    pub orders: OrderService,
    pub reminders: ReminderService,
    pub analytics: AnalyticsService,
    pub uploads: UploadService,
}

impl Services {
    pub fn new(repos: Repositories, collaborators: Collaborators, tokens: TokenService, reminders: ReminderSettings) -> Self {
        let Collaborators { dispatcher, email, storage, events } = collaborators;
        let coupons = CouponService::new(repos.clone());
        let referrals = ReferralService::new(repos.clone());
        let reminder_service = ReminderService::new(
            repos.clone(),
            dispatcher,
            email.clone(),
            reminders.app_base_url.as_deref(),
            &reminders.delays_secs,
        );
        Self {
            catalog: CatalogService::new(repos.clone(), storage.clone()),
            customers: CustomerService::new(repos.clone(), coupons.clone(), tokens.clone()),
            verification: VerificationService::new(repos.clone(), email.clone(), tokens),
            orders: OrderService::new(repos.clone(), referrals.clone(), coupons.clone(), reminder_service.clone(), email, events),
            analytics: AnalyticsService::new(repos),
            uploads: UploadService::new(storage),
            reminders: reminder_service,
            coupons,
            referrals,
        }
    }

    pub fn tokens(&self) -> &TokenService { self.customers.tokens() }
}
