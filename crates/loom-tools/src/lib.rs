pub mod paths;
pub mod registration;
pub mod tools;

pub use registration::register_builtin_tools;
