pub mod film;
pub mod genre;
