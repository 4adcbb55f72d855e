pub mod fm;
pub mod sa;
