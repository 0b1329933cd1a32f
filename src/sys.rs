pub mod dialog;
pub mod script;
