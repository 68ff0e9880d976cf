//! Agent bridge core library: upstream candidate matrix, trigger and poll engine, and the
//! HTTP gateway used by the CLI.

pub mod bridge;
pub mod config;
pub mod gateway;
pub mod init;
pub mod upstream;
