pub mod announcements;
pub mod attendance;
pub mod auth;
pub mod children;
pub mod classes;
pub mod core;
pub mod incidents;
pub mod notifications;
pub mod parents;
pub mod payments;
pub mod reports;
pub mod settings;
pub mod teachers;
