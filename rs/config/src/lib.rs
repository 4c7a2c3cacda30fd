pub mod enums;
pub mod ring;
