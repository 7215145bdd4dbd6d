pub const SHORT: &str = env!("CARGO_PKG_VERSION");
pub const LONG: &str = SHORT;
