pub mod article;
pub mod beneficiary;
pub mod common;
pub mod donor;
pub mod email;
pub mod finance;
pub mod forms;
pub mod loan;
pub mod notification;
pub mod profile;
