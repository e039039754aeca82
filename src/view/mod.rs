pub mod list;
pub mod notice;
pub mod table;
