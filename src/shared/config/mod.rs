/// 環境設定
pub mod environment;

pub use environment::{
    get_database_filename, get_env_filename, get_environment, initialize_logging_system,
    load_environment_variables, Environment, EnvironmentConfig,
};
