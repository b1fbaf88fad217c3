pub mod dashboard;
pub mod health;
pub mod statements;

pub use dashboard::{admin_dashboard, dashboard_stats, users_stats};
pub use health::{health_check, metrics_endpoint, root, simple_health_check};
pub use statements::{extract_batch, extract_statement};
