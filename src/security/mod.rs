//! Token privilege management

pub mod privileges;
