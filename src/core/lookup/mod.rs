pub mod finger_table;
pub mod successor_list;
