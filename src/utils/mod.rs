//! Generic containers used by the driver

pub mod slot_list;
pub mod work_queue;
