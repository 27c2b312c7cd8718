#![forbid(unsafe_code)]

pub mod build;
pub mod cli;
pub mod covers;
pub mod formats;
pub mod http;
pub mod logging;
pub mod parse;
pub mod render;
pub mod scrape;
