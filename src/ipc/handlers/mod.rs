pub mod admin;
pub mod announcements;
pub mod classes;
pub mod core;
pub mod events;
pub mod grades;
pub mod lessons;
pub mod reports;
pub mod students;
