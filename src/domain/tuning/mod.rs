pub mod enemy;
pub mod progression;
