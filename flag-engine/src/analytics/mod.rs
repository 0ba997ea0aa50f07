pub mod evaluation_models;
pub mod evaluation_sink;
