pub mod dashboard;

pub use dashboard::{
    success_rate, AdminDashboardResponse, RecentFile, UserDashboardResponse, UserStatsRow,
    UsersStatsResponse,
};
