pub mod cli;
pub mod config;
pub mod drain;
pub mod error;
pub mod export;
pub mod kinesis;
pub mod logging;
pub mod retry;
pub mod scanner;
pub mod shutdown;
pub mod sqs;
