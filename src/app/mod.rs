pub mod common;
pub mod display;
pub mod env;
pub mod error;
pub mod plan;
pub mod sections;
pub mod shell;

pub use env::handle_env;
pub use plan::{handle_deploy, handle_shutdown, handle_withdraw};
pub use sections::handle_list_sections;
pub use shell::handle_shell;
