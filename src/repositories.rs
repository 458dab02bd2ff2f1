pub mod ads;
pub mod games;
pub mod points;
pub mod protection;
pub mod referrals;
pub mod sessions;
pub mod stats;
pub mod users;
pub mod withdrawals;
