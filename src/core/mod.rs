pub mod broadcast;
pub mod config;
pub mod lifecycle;
pub mod provider;
pub mod qr;
pub mod templates;
pub mod terminal;
