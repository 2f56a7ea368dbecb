pub mod advisory;
pub mod package_record;
