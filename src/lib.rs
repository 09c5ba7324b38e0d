pub mod analysis;
pub mod config;
pub mod consts;
pub mod flow;
pub mod prompts;
pub mod scrape;
pub mod server;
pub mod store;
