pub(crate) mod config;
pub(crate) mod exit;
pub(crate) mod input;
pub(crate) mod progress;
pub(crate) mod terminal;
