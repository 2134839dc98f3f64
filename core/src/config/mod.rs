pub mod load;
pub mod types;

pub use load::{apply_env_overrides, get_data_dir, load_default, load_from_path};
pub use types::{
    ApiConfig, AppConfig, HttpServerConfig, LoggingConfig, ReconnectConfig, ReconnectKind,
    StreamConfig,
};
