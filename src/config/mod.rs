pub mod load;
pub mod model;

pub use load::load_config;
pub use model::RuntimeConfig;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/xocopy.yaml";
