pub mod achievement;
pub mod bonus;
pub mod entitlement;
pub mod product;
pub mod referral;

pub use achievement::*;
pub use bonus::*;
pub use entitlement::*;
pub use product::*;
pub use referral::*;
