//! Logprocessor - Firehose transformation of CloudWatch Logs into Splunk events.

pub mod assemble;
pub mod aws_streams;
pub mod budget;
pub mod classify;
pub mod config;
pub mod decode;
pub mod destination;
pub mod processor;
pub mod reingest;
pub mod types;
