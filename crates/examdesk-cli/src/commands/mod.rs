pub mod init;
pub mod result;
pub mod take;
