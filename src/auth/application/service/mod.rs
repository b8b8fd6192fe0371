pub mod credential_service;
pub mod login_service;
