pub mod ask;
pub mod config_cmd;
pub mod init;
pub mod serve;
pub mod topics;
