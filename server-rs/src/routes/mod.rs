pub mod achievements;
pub mod admin;
pub mod bonus;
pub mod health;
pub mod payments;
pub mod referrals;
pub mod subscription;
