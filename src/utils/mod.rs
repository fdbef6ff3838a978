pub mod attendance_status;
pub mod db_utils;
pub mod query_builder;
