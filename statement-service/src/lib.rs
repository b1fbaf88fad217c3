//! statement-service: turns uploaded bank-statement PDFs into ledger-ready
//! spreadsheets and tracks every extraction attempt.

pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod startup;
