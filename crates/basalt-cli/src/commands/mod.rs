pub mod migrate;
pub mod pool_auth;

pub use migrate::MigrateCommand;
pub use pool_auth::PoolAuthCommand;
