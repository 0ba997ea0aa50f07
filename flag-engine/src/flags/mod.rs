pub mod evaluation_reason;
pub mod flag_admin;
pub mod flag_matching;
pub mod flag_models;
pub mod flag_service;
pub mod flag_store;
