pub mod bedmethyl;
pub mod export;
pub mod ipc;
pub mod table;
