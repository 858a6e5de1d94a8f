//! Data models for carelink entities.
//!
//! This module contains the payloads exchanged with the backend:
//!
//! - `User`, `Role`: the signed-in account, cached alongside the tokens
//! - `LoginResponse`, `RefreshResponse`: token issuing endpoints
//! - `Appointment`: patient/doctor appointments
//! - `MedicalRecord`: records attached to a patient
//! - `Conversation`, `Message`: polled messaging

pub mod appointment;
pub mod message;
pub mod record;
pub mod user;

pub use appointment::{Appointment, AppointmentStatus};
pub use message::{Conversation, Message, NewMessage};
pub use record::MedicalRecord;
pub use user::{LoginRequest, LoginResponse, RefreshRequest, RefreshResponse, Role, User};
