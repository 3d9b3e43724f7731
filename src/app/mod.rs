pub mod engagement;
pub mod notifications;
pub mod reports;
pub mod validation;
pub mod verification;
