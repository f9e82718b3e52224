pub mod application;
pub mod call_record;
pub mod experience;
pub mod keyword;
pub mod research;
