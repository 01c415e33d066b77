pub mod class;
pub mod config;
pub mod consts;
pub mod descriptor;
pub mod runtime;
