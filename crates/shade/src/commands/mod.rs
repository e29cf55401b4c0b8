pub mod history;
pub mod init;
pub mod restore;
pub mod tx;
