//! Authentication module for Hangar.
//!
//! Password hashing and the account operations that produce the
//! [`Principal`](crate::db::Principal) the file engine consumes.

mod account;
mod password;

pub use account::{Accounts, Profile, RegistrationRequest};
pub use password::{
    hash_password, validate_password, verify_password, PasswordError, MAX_PASSWORD_LENGTH,
    MIN_PASSWORD_LENGTH,
};
