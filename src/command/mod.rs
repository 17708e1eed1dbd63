pub mod install;
pub mod list;
pub mod run;
pub mod use_version;
