#![forbid(unsafe_code)]

pub mod anthropic;
pub mod cli;
pub mod command;
pub mod config;
pub mod content;
pub mod epub;
pub mod error;
pub mod formats;
pub mod generate;
pub mod logging;
pub mod map_reduce;
pub mod nav;
pub mod openai;
pub mod prompt;
pub mod refine;
pub mod resolve;
pub mod spine;
pub mod summarize;
