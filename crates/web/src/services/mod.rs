//! Business logic services.
//!
//! # Services
//!
//! - `auth` - Registration, login, profile updates and password reset
//! - `email` - Password reset email delivery
//! - `stores` - Store writes with slug assignment, ownership, reviews and hearts
//! - `uploads` - Photo validation, resizing and storage

pub mod auth;
pub mod email;
pub mod stores;
pub mod uploads;

pub use auth::{AuthError, AuthService, Registration};
pub use email::{EmailError, EmailService};
pub use stores::{StoreError, StorePage, StoreService};
pub use uploads::{PhotoUpload, UploadError};
